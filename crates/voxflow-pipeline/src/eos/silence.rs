//! Silence-based end-of-speech detection
//!
//! A monotonically increasing generation counter is bumped on every input;
//! each armed timer captures its generation and is ignored at firing time if
//! the generation has moved on. A repeated STT transcript (same normalized
//! text as the previous STT activity) halves the silence window so the turn
//! completes quickly after the provider re-emits a stable transcript.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use voxflow_core::{Options, Result};

use super::{EndOfSpeech, EndOfSpeechResult, EosCallback, EosInput};

const DEFAULT_TIMEOUT_MS: f64 = 300.0;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Activity {
    None,
    User,
    System,
    Stt,
}

struct State {
    generation: u64,
    started_at: Option<SystemTime>,
    speech: String,
    last_activity: Activity,
    last_stt_norm: String,
}

impl State {
    fn reset(&mut self) {
        self.generation += 1;
        self.started_at = None;
        self.speech.clear();
        self.last_activity = Activity::None;
        self.last_stt_norm.clear();
    }
}

/// Silence-window end-of-speech detector
pub struct SilenceEndOfSpeech {
    callback: EosCallback,
    base_threshold: Duration,
    state: Arc<Mutex<State>>,
    token: CancellationToken,
}

impl SilenceEndOfSpeech {
    /// `microphone.eos.timeout` (float milliseconds) sets the base silence
    /// window; the token cancels any armed timer.
    pub fn new(callback: EosCallback, options: &Options, token: CancellationToken) -> Self {
        let timeout_ms = options
            .get_f64("microphone.eos.timeout")
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        Self {
            callback,
            base_threshold: Duration::from_micros((timeout_ms * 1000.0) as u64),
            state: Arc::new(Mutex::new(State {
                generation: 0,
                started_at: None,
                speech: String::new(),
                last_activity: Activity::None,
                last_stt_norm: String::new(),
            })),
            token: token.child_token(),
        }
    }

    fn epoch_seconds(t: SystemTime) -> f64 {
        t.duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Fire the callback with the current utterance and reset for the next
    /// one. Must be called without the state lock held.
    fn invoke(callback: &EosCallback, state: &Mutex<State>) {
        let result = {
            let mut st = state.lock();
            let start = st.started_at.unwrap_or_else(SystemTime::now);
            let result = EndOfSpeechResult {
                start_at: Self::epoch_seconds(start),
                end_at: Self::epoch_seconds(SystemTime::now()),
                speech: st.speech.clone(),
            };
            st.reset();
            result
        };
        (callback)(result);
    }

    /// Arm the silence timer for the current generation
    fn arm(&self, threshold: Duration) {
        let generation = self.state.lock().generation;
        let state = Arc::clone(&self.state);
        let callback = Arc::clone(&self.callback);
        let token = self.token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(threshold) => {
                    let stale = state.lock().generation != generation;
                    if stale {
                        debug!(generation, "silence timer superseded");
                        return;
                    }
                    Self::invoke(&callback, &state);
                }
            }
        });
    }
}

/// Lowercase and strip everything that is not alphanumeric or whitespace,
/// collapsing runs of whitespace
pub(crate) fn normalize_transcript(text: &str) -> String {
    let filtered: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl EndOfSpeech for SilenceEndOfSpeech {
    fn name(&self) -> &'static str {
        "silence_end_of_speech"
    }

    async fn analyze(&self, input: EosInput) -> Result<()> {
        if self.token.is_cancelled() {
            return Ok(());
        }
        match input {
            EosInput::User { message, time } => {
                if message.trim().is_empty() {
                    return Ok(());
                }
                {
                    let mut st = self.state.lock();
                    st.generation += 1;
                    st.started_at.get_or_insert(time);
                    st.speech = message;
                    st.last_activity = Activity::User;
                }
                Self::invoke(&self.callback, &self.state);
            }
            EosInput::System { time } => {
                let mut st = self.state.lock();
                st.generation += 1;
                st.started_at.get_or_insert(time);
                st.last_activity = Activity::System;
                drop(st);
                self.arm(self.base_threshold);
            }
            EosInput::Stt {
                message,
                is_complete,
                time,
            } => {
                if message.trim().is_empty() {
                    return Ok(());
                }
                let norm = normalize_transcript(&message);
                let threshold = {
                    let mut st = self.state.lock();
                    st.generation += 1;
                    st.started_at.get_or_insert(time);
                    let repeated = is_complete
                        && st.last_activity == Activity::Stt
                        && st.last_stt_norm == norm;
                    st.speech = message;
                    st.last_activity = Activity::Stt;
                    st.last_stt_norm = norm;
                    if repeated {
                        self.base_threshold / 2
                    } else {
                        self.base_threshold
                    }
                };
                self.arm(threshold);
            }
        }
        Ok(())
    }

    fn close(&self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use tokio::sync::mpsc;

    fn detector(
        timeout_ms: f64,
    ) -> (
        SilenceEndOfSpeech,
        mpsc::UnboundedReceiver<EndOfSpeechResult>,
        CancellationToken,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: EosCallback = Arc::new(move |res| {
            let _ = tx.send(res);
        });
        let opts = Options::new().with("microphone.eos.timeout", timeout_ms);
        let token = CancellationToken::new();
        (
            SilenceEndOfSpeech::new(callback, &opts, token.clone()),
            rx,
            token,
        )
    }

    async fn recv_within(
        rx: &mut mpsc::UnboundedReceiver<EndOfSpeechResult>,
        ms: u64,
    ) -> Option<EndOfSpeechResult> {
        tokio::time::timeout(Duration::from_millis(ms), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_user_input_triggers_immediately() {
        let (eos, mut rx, _) = detector(1000.0);
        let start = Instant::now();
        eos.analyze(EosInput::user("user said something")).await.unwrap();
        let res = recv_within(&mut rx, 200).await.expect("callback");
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(res.speech, "user said something");
        assert!(res.end_at >= res.start_at);
        assert!(res.start_at > 0.0);
    }

    #[tokio::test]
    async fn test_empty_user_input_ignored() {
        let (eos, mut rx, _) = detector(100.0);
        eos.analyze(EosInput::user("   ")).await.unwrap();
        assert!(recv_within(&mut rx, 250).await.is_none());
    }

    #[tokio::test]
    async fn test_system_input_arms_base_window() {
        let (eos, mut rx, _) = detector(150.0);
        let start = Instant::now();
        eos.analyze(EosInput::system()).await.unwrap();
        recv_within(&mut rx, 500).await.expect("callback");
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(135) && elapsed <= Duration::from_millis(220),
            "elapsed {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_incomplete_stt_uses_base_window() {
        let (eos, mut rx, _) = detector(150.0);
        let start = Instant::now();
        eos.analyze(EosInput::stt("hello world", false)).await.unwrap();
        recv_within(&mut rx, 500).await.expect("callback");
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(135) && elapsed <= Duration::from_millis(220),
            "elapsed {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_repeated_transcript_halves_window() {
        let (eos, mut rx, _) = detector(300.0);
        eos.analyze(EosInput::stt("hello world", true)).await.unwrap();
        let start = Instant::now();
        eos.analyze(EosInput::stt("hello world", true)).await.unwrap();
        recv_within(&mut rx, 600).await.expect("callback");
        let elapsed = start.elapsed();
        // 300 / 2 = 150ms
        assert!(
            elapsed >= Duration::from_millis(120) && elapsed <= Duration::from_millis(230),
            "elapsed {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_normalized_match_halves_window() {
        let (eos, mut rx, _) = detector(250.0);
        eos.analyze(EosInput::stt("Hello, World!", true)).await.unwrap();
        let start = Instant::now();
        eos.analyze(EosInput::stt("hello world", true)).await.unwrap();
        recv_within(&mut rx, 600).await.expect("callback");
        let elapsed = start.elapsed();
        // 250 / 2 = 125ms
        assert!(
            elapsed >= Duration::from_millis(95) && elapsed <= Duration::from_millis(200),
            "elapsed {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_different_transcript_keeps_base_window() {
        let (eos, mut rx, _) = detector(100.0);
        eos.analyze(EosInput::stt("hello", true)).await.unwrap();
        let start = Instant::now();
        eos.analyze(EosInput::stt("goodbye", true)).await.unwrap();
        recv_within(&mut rx, 400).await.expect("callback");
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(85) && elapsed <= Duration::from_millis(170),
            "elapsed {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_system_activity_blocks_adjustment() {
        let (eos, mut rx, _) = detector(150.0);
        eos.analyze(EosInput::system()).await.unwrap();
        let start = Instant::now();
        eos.analyze(EosInput::stt("stt text", true)).await.unwrap();
        recv_within(&mut rx, 500).await.expect("callback");
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(135) && elapsed <= Duration::from_millis(220),
            "elapsed {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_new_input_invalidates_pending_timer() {
        let (eos, mut rx, _) = detector(300.0);
        eos.analyze(EosInput::system()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        eos.analyze(EosInput::system()).await.unwrap();
        // 300ms past the first arming, only 150ms past the second
        tokio::time::sleep(Duration::from_millis(160)).await;
        assert!(rx.try_recv().is_err(), "superseded timer fired");
        // The second arming fires on schedule
        recv_within(&mut rx, 400).await.expect("callback");
    }

    #[tokio::test]
    async fn test_at_most_one_firing_per_arming() {
        let count = Arc::new(AtomicUsize::new(0));
        let cb_count = Arc::clone(&count);
        let callback: EosCallback = Arc::new(move |_| {
            cb_count.fetch_add(1, Ordering::SeqCst);
        });
        let opts = Options::new().with("microphone.eos.timeout", 100.0);
        let eos = SilenceEndOfSpeech::new(callback, &opts, CancellationToken::new());

        eos.analyze(EosInput::system()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Reusable for the next utterance
        eos.analyze(EosInput::user("next")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancellation_suppresses_callback() {
        let (eos, mut rx, token) = detector(200.0);
        eos.analyze(EosInput::system()).await.unwrap();
        token.cancel();
        assert!(recv_within(&mut rx, 400).await.is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (eos, mut rx, _) = detector(100.0);
        eos.close();
        eos.close();
        eos.analyze(EosInput::system()).await.unwrap();
        assert!(recv_within(&mut rx, 250).await.is_none());
    }

    #[test]
    fn test_normalize_transcript() {
        for (input, expected) in [
            ("hello world", "hello world"),
            ("Hello World", "hello world"),
            ("hello, world!", "hello world"),
            ("Hello, WORLD!!!", "hello world"),
            ("123 abc 456", "123 abc 456"),
            ("test@#$%", "test"),
            ("café", "café"),
        ] {
            assert_eq!(normalize_transcript(input), expected, "input {input:?}");
        }
    }
}
