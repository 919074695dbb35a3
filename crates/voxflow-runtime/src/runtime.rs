//! The packet dispatcher and conversation lifecycle

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use voxflow_audio::CallRecorder;
use voxflow_core::comm::PacketSender;
use voxflow_core::packet::{Action, InterruptionSource};
use voxflow_core::{Actor, Communication, Packet, Result};
use voxflow_llm::AssistantExecutor;
use voxflow_pipeline::eos::{EndOfSpeech, EosCallback, EosInput};
use voxflow_pipeline::stt::{SpeechToText, TranscriptCallback};
use voxflow_pipeline::tts::{SpeakOptions, TextToSpeech, TtsCallbacks};
use voxflow_text::{SentenceTokenizer, SpeechNormalizer};

use crate::context::ConversationContext;
use crate::messaging::{Messaging, StateEvent};
use crate::output::{OutputEvent, TransportOutput};

/// Packets queued between producers and the dispatcher. TTS audio rides the
/// same channel; on overflow a frame is dropped and counted rather than
/// stalling the call.
const PACKET_BUFFER: usize = 256;

/// VAD firings earlier than this many seconds into a turn are noise
const VAD_EARLY_CUTOFF_SECS: f64 = 3.0;

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Everything a conversation runtime is built from
pub struct RuntimeDeps {
    pub comm: Arc<ConversationContext>,
    pub output: Arc<dyn TransportOutput>,
    pub executor: Arc<dyn AssistantExecutor>,
    pub stt: Option<Arc<dyn SpeechToText>>,
    pub tts: Option<Arc<dyn TextToSpeech>>,
    pub eos: Option<Arc<dyn EndOfSpeech>>,
    pub recorder: Option<Arc<CallRecorder>>,
    pub token: CancellationToken,
}

/// The conversation runtime: single owner of the messaging state, fed by one
/// packet channel, writing to one transport
pub struct ConversationRuntime {
    comm: Arc<ConversationContext>,
    output: Arc<dyn TransportOutput>,
    executor: Arc<dyn AssistantExecutor>,
    stt: Option<Arc<dyn SpeechToText>>,
    tts: Option<Arc<dyn TextToSpeech>>,
    eos: Option<Arc<dyn EndOfSpeech>>,
    recorder: Option<Arc<CallRecorder>>,
    messaging: Messaging,
    tokenizer: Arc<SentenceTokenizer>,
    normalizer: Arc<SpeechNormalizer>,
    packet_tx: PacketSender,
    idle_generation: AtomicU64,
    idle_count: Mutex<u32>,
    degraded: AtomicBool,
    closed: AtomicBool,
    token: CancellationToken,
    weak_self: Weak<ConversationRuntime>,
}

/// The bounded packet channel a conversation runs on. Created before the
/// runtime so providers can be built with the sender half.
pub fn packet_channel() -> (PacketSender, mpsc::Receiver<Packet>) {
    mpsc::channel(PACKET_BUFFER)
}

impl ConversationRuntime {
    /// Build the runtime and start its dispatcher and speech-pump tasks.
    /// Returns the runtime and the packet sender that providers feed.
    pub fn start(deps: RuntimeDeps) -> (Arc<Self>, PacketSender) {
        let (packet_tx, packet_rx) = packet_channel();
        Self::start_with_channel(deps, packet_tx, packet_rx)
    }

    /// Start on an existing packet channel whose sender is already wired
    /// into the providers
    pub fn start_with_channel(
        deps: RuntimeDeps,
        packet_tx: PacketSender,
        packet_rx: mpsc::Receiver<Packet>,
    ) -> (Arc<Self>, PacketSender) {
        let options = deps.comm.assistant().options.clone();
        let (tokenizer, tokenizer_rx) = SentenceTokenizer::new(&options);
        let normalizer = Arc::new(SpeechNormalizer::new(&options));
        let input_mode = deps.comm.conversation().input_mode;

        let runtime = Arc::new_cyclic(|weak| Self {
            comm: deps.comm,
            output: deps.output,
            executor: deps.executor,
            stt: deps.stt,
            tts: deps.tts,
            eos: deps.eos,
            recorder: deps.recorder,
            messaging: Messaging::new(input_mode),
            tokenizer: Arc::new(tokenizer),
            normalizer,
            packet_tx: packet_tx.clone(),
            idle_generation: AtomicU64::new(0),
            idle_count: Mutex::new(0),
            degraded: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            token: deps.token,
            weak_self: weak.clone(),
        });

        tokio::spawn(Self::dispatch_loop(Arc::clone(&runtime), packet_rx));
        tokio::spawn(Self::speech_pump(Arc::clone(&runtime), tokenizer_rx));
        (runtime, packet_tx)
    }

    // Accessors shared with the behaviors module

    pub(crate) fn comm(&self) -> &Arc<ConversationContext> {
        &self.comm
    }

    pub(crate) fn messaging(&self) -> &Messaging {
        &self.messaging
    }

    pub(crate) fn idle_generation(&self) -> &AtomicU64 {
        &self.idle_generation
    }

    pub(crate) fn idle_count(&self) -> &Mutex<u32> {
        &self.idle_count
    }

    pub(crate) fn weak(&self) -> Weak<Self> {
        self.weak_self.clone()
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The active turn id, falling back to the conversation id before any
    /// turn exists
    pub(crate) fn context_or_conversation(&self) -> String {
        self.messaging
            .current_context()
            .unwrap_or_else(|| self.comm.conversation().id.to_string())
    }

    pub fn packet_sender(&self) -> PacketSender {
        self.packet_tx.clone()
    }

    /// Initialize providers and run the start-of-conversation behaviors.
    /// Configuration failures abort the conversation with a clean close.
    pub async fn begin(&self) -> Result<()> {
        if let Some(stt) = &self.stt {
            if let Err(e) = stt.initialize().await {
                self.close("stt initialization failed").await;
                return Err(e);
            }
        }
        if let Some(tts) = &self.tts {
            if let Err(e) = tts.initialize().await {
                self.close("tts initialization failed").await;
                return Err(e);
            }
        }
        if let Err(e) = self.executor.initialize(self.packet_tx.clone()).await {
            self.close("executor initialization failed").await;
            return Err(e);
        }
        self.initialize_behavior().await;
        metrics::counter!("voxflow_conversations_started_total").increment(1);
        Ok(())
    }

    async fn dispatch_loop(runtime: Arc<Self>, mut rx: mpsc::Receiver<Packet>) {
        loop {
            tokio::select! {
                _ = runtime.token.cancelled() => return,
                packet = rx.recv() => {
                    let Some(packet) = packet else { return };
                    trace!(kind = packet.kind(), "dispatching packet");
                    runtime.handle_packet(packet).await;
                }
            }
        }
    }

    /// Tokenized sentences flow through normalization into the TTS provider
    async fn speech_pump(
        runtime: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<Packet>,
    ) {
        loop {
            tokio::select! {
                _ = runtime.token.cancelled() => return,
                packet = rx.recv() => {
                    let Some(packet) = packet else { return };
                    let Some(tts) = &runtime.tts else { continue };
                    match packet {
                        Packet::Text { context_id, text } => {
                            let spoken = runtime.normalizer.normalize(&text);
                            if spoken.is_empty() {
                                continue;
                            }
                            let opts = SpeakOptions {
                                context_id,
                                is_complete: false,
                            };
                            if let Err(e) = tts.transform(&spoken, &opts).await {
                                error!(error = %e, "unable to speak for the user");
                            }
                        }
                        Packet::Flush { context_id } => {
                            let opts = SpeakOptions {
                                context_id,
                                is_complete: true,
                            };
                            if let Err(e) = tts.transform("", &opts).await {
                                error!(error = %e, "unable to flush speech");
                            }
                        }
                        other => trace!(kind = other.kind(), "speech pump ignoring packet"),
                    }
                }
            }
        }
    }

    /// Queue a packet for dispatch, counting (never blocking on) overflow
    pub(crate) fn dispatch(&self, packet: Packet) {
        if self.packet_tx.try_send(packet).is_err() {
            metrics::counter!("voxflow_packets_dropped_total").increment(1);
            warn!("packet channel full, dropping packet");
        }
    }

    async fn notify(&self, event: OutputEvent) -> Result<()> {
        self.output.notify(event).await
    }

    /// Push one text chunk of an assistant turn into the speech path
    fn speak(&self, context_id: &str, text: &str) {
        self.tokenizer.tokenize(vec![Packet::Text {
            context_id: context_id.to_string(),
            text: text.to_string(),
        }]);
    }

    fn speak_flush(&self, context_id: &str) {
        self.tokenizer.tokenize(vec![Packet::Flush {
            context_id: context_id.to_string(),
        }]);
    }

    // Transport-facing input surface

    /// One carrier audio frame
    pub async fn input_audio(&self, bytes: Vec<u8>) {
        self.dispatch(Packet::UserAudio { bytes });
    }

    /// One carrier text input. Opens a fresh user turn, preempting any
    /// agent speech in flight.
    pub async fn input_text(&self, text: String) {
        let _ = self.messaging.transition(StateEvent::Interrupted);
        let message = self.messaging.begin(Actor::User, &text);
        if let Err(e) = self
            .notify(OutputEvent::UserText {
                id: message.id.clone(),
                text: message.text(),
                completed: false,
            })
            .await
        {
            trace!(error = %e, "error while notifying the text input from user");
        }
        self.dispatch(Packet::UserText {
            context_id: message.id,
            text,
        });
    }

    /// The single logical packet handler
    pub async fn handle_packet(&self, packet: Packet) {
        match packet {
            Packet::UserAudio { bytes } => self.on_user_audio(bytes).await,
            Packet::UserText { text, .. } => self.on_user_text(text).await,
            Packet::SpeechToText {
                script, interim, ..
            } => self.on_transcript(script, interim).await,
            Packet::EndOfSpeech { speech, .. } => self.on_end_of_speech(speech).await,
            Packet::Interruption {
                context_id,
                source,
                start_at,
                ..
            } => self.on_interruption(&context_id, source, start_at).await,
            Packet::LlmStream { context_id, text } => self.on_llm_stream(&context_id, text).await,
            Packet::LlmMessage { context_id, text } => {
                self.on_llm_message(&context_id, text).await
            }
            Packet::LlmTool {
                context_id,
                action,
                name,
                ..
            } => self.on_llm_tool(&context_id, action, name).await,
            Packet::Static { context_id, text } => self.on_static(&context_id, text).await,
            Packet::TextToSpeech { context_id, audio } => {
                self.on_speech_audio(&context_id, audio).await
            }
            Packet::TextToSpeechFlush { context_id } => self.on_speech_flush(&context_id).await,
            Packet::Metric {
                context_id,
                metrics,
            } => {
                let comm = Arc::clone(&self.comm);
                tokio::spawn(async move {
                    comm.record_metrics(&context_id, &metrics).await;
                });
            }
            packet @ (Packet::Text { .. } | Packet::Flush { .. }) => {
                // Tokenizer traffic that reached the dispatcher goes back to
                // the tokenizer
                self.tokenizer.tokenize(vec![packet]);
            }
        }
    }

    async fn on_user_audio(&self, bytes: Vec<u8>) {
        let Some(stt) = &self.stt else {
            trace!("audio input without stt provider, dropping frame");
            return;
        };
        match stt.transform(&bytes).await {
            Ok(()) => {
                if let Some(recorder) = &self.recorder {
                    recorder.user(&bytes);
                }
            }
            Err(e) => {
                error!(error = %e, "stt stream write failed");
                // One apology per degradation, not one per frame
                if !self.degraded.swap(true, Ordering::SeqCst) {
                    self.on_error(&self.context_or_conversation()).await;
                }
            }
        }
    }

    async fn on_user_text(&self, text: String) {
        self.touch_idle(true);
        let _ = self.messaging.transition(StateEvent::UserSpeaking);
        match &self.eos {
            Some(eos) => {
                if let Err(e) = eos.analyze(EosInput::user(text)).await {
                    warn!(error = %e, "end-of-speech analysis failed");
                }
            }
            None => {
                // No detector configured: the turn is complete as delivered
                let now = unix_now();
                self.dispatch(Packet::EndOfSpeech {
                    speech: text,
                    start_at: now,
                    end_at: now,
                });
            }
        }
    }

    async fn on_transcript(&self, script: String, interim: bool) {
        self.touch_idle(true);
        let _ = self.messaging.transition(StateEvent::UserSpeaking);

        if !interim {
            let message = self.messaging.append_transcript(&script);
            if let Err(e) = self
                .notify(OutputEvent::UserText {
                    id: message.id.clone(),
                    text: message.text(),
                    completed: false,
                })
                .await
            {
                trace!(error = %e, "error while notifying interim user message");
            }
        }

        match &self.eos {
            Some(eos) => {
                if let Err(e) = eos.analyze(EosInput::stt(script, !interim)).await {
                    warn!(error = %e, "end-of-speech analysis failed");
                }
            }
            None if !interim => {
                let now = unix_now();
                let speech = self.messaging.current(Actor::User).text();
                self.dispatch(Packet::EndOfSpeech {
                    speech,
                    start_at: now,
                    end_at: now,
                });
            }
            None => {}
        }
    }

    async fn on_end_of_speech(&self, speech: String) {
        self.touch_idle(true);
        let Some(message) = self.messaging.complete(Actor::User) else {
            warn!("end of speech without a current user message");
            return;
        };
        let text = if message.text().is_empty() {
            speech
        } else {
            message.text()
        };

        if let Err(e) = self
            .notify(OutputEvent::UserText {
                id: message.id.clone(),
                text: text.clone(),
                completed: true,
            })
            .await
        {
            trace!(error = %e, "duplicate completed user message, cutting it out");
            return;
        }

        if let Err(e) = self.messaging.transition(StateEvent::UserCompleted) {
            debug!(error = %e, "state transition skipped");
        }
        if let Err(e) = self.messaging.transition(StateEvent::LlmGenerating) {
            debug!(error = %e, "state transition skipped");
        }

        let started = std::time::Instant::now();
        if let Err(e) = self
            .executor
            .execute(Packet::UserText {
                context_id: message.id.clone(),
                text,
            })
            .await
        {
            error!(error = %e, "assistant executor error");
            self.on_error(&message.id).await;
            return;
        }
        metrics::histogram!("voxflow_executor_dispatch_seconds")
            .record(started.elapsed().as_secs_f64());
    }

    async fn on_interruption(&self, context_id: &str, source: InterruptionSource, start_at: f64) {
        if source == InterruptionSource::Vad && start_at < VAD_EARLY_CUTOFF_SECS {
            warn!(start_at, "interrupt: very early interruption");
            return;
        }
        if source == InterruptionSource::Word {
            self.touch_idle(true);
        }
        if self.messaging.transition(StateEvent::Interrupted).is_err() {
            return;
        }
        // Anything still buffered for this turn is preempted
        self.tokenizer.discard(context_id);
        if self.messaging.input_mode().audio() {
            if let Some(recorder) = &self.recorder {
                recorder.interrupt();
            }
        }
        metrics::counter!("voxflow_interruptions_total", "source" => match source {
            InterruptionSource::Word => "word",
            InterruptionSource::Vad => "vad",
        })
        .increment(1);
        if let Err(e) = self
            .notify(OutputEvent::Interruption {
                source,
                time: unix_now(),
            })
            .await
        {
            trace!(error = %e, "error while notifying interruption");
        }
    }

    async fn on_llm_stream(&self, context_id: &str, text: String) {
        self.touch_idle(false);
        if self.messaging.transition(StateEvent::AgentSpeaking).is_err() {
            // Interrupted turns stop producing
            return;
        }
        self.messaging.append(Actor::Assistant, &text);
        if let Err(e) = self
            .notify(OutputEvent::AssistantText {
                id: context_id.to_string(),
                text: text.clone(),
                completed: false,
            })
            .await
        {
            trace!(error = %e, "error while outputting chunk to the user");
        }
        if self.messaging.input_mode().audio() {
            self.speak(context_id, &text);
        }
    }

    async fn on_llm_message(&self, context_id: &str, text: String) {
        self.touch_idle(false);
        if self.messaging.input_mode().audio() {
            self.speak_flush(context_id);
        }
        if let Err(e) = self
            .notify(OutputEvent::AssistantText {
                id: context_id.to_string(),
                text,
                completed: true,
            })
            .await
        {
            trace!(error = %e, "error while outputting chunk to the user");
        }
        self.messaging.complete(Actor::Assistant);
        if let Err(e) = self.messaging.transition(StateEvent::AgentCompleted) {
            debug!(error = %e, "state transition skipped");
        }
    }

    async fn on_llm_tool(&self, context_id: &str, action: Action, name: Option<String>) {
        if let Err(e) = self
            .notify(OutputEvent::Action {
                name: name.unwrap_or_else(|| context_id.to_string()),
                action,
            })
            .await
        {
            trace!(error = %e, "error while notifying action");
        }
        if action == Action::EndConversation {
            self.close("end_of_conversation").await;
        }
    }

    async fn on_static(&self, context_id: &str, text: String) {
        {
            let comm = Arc::clone(&self.comm);
            let context_id = context_id.to_string();
            let text = text.clone();
            tokio::spawn(async move {
                comm.record_event(
                    "static_message",
                    json!({ "context_id": context_id, "text": text }),
                )
                .await;
            });
        }

        // Notify first so a client that ignores audio still sees the text
        if let Err(e) = self
            .notify(OutputEvent::AssistantText {
                id: context_id.to_string(),
                text: text.clone(),
                completed: true,
            })
            .await
        {
            trace!(error = %e, "error while outputting static text");
        }

        if self.messaging.input_mode().audio() {
            self.speak(context_id, &text);
            self.speak_flush(context_id);
        }

        // The executor appends scripted text to its history
        if let Err(e) = self
            .executor
            .execute(Packet::Static {
                context_id: context_id.to_string(),
                text,
            })
            .await
        {
            debug!(error = %e, "executor ignored static packet");
        }

        if let Err(e) = self.messaging.transition(StateEvent::AgentCompleted) {
            debug!(error = %e, "state transition skipped");
        }
    }

    async fn on_speech_audio(&self, context_id: &str, audio: Vec<u8>) {
        // Preempted synthesis: the turn has moved on, drop the frame before
        // the wire and the recorder alike
        let current = self.messaging.current_context();
        if current.as_deref() != Some(context_id) {
            trace!(context_id, "dropping audio for preempted context");
            return;
        }
        if self.messaging.transition(StateEvent::AgentSpeaking).is_err() {
            return;
        }
        if let Some(recorder) = &self.recorder {
            recorder.assistant(&audio);
        }
        match self
            .notify(OutputEvent::AssistantAudio {
                id: context_id.to_string(),
                bytes: audio,
            })
            .await
        {
            Ok(()) => {
                if let Some(recorder) = &self.recorder {
                    recorder.commit();
                }
            }
            Err(e) => trace!(error = %e, "error while outputting audio to the user"),
        }
    }

    async fn on_speech_flush(&self, context_id: &str) {
        if let Err(e) = self
            .notify(OutputEvent::AssistantText {
                id: context_id.to_string(),
                text: String::new(),
                completed: true,
            })
            .await
        {
            trace!(error = %e, "error while notifying speech completion");
        }
        if let Err(e) = self.messaging.transition(StateEvent::AgentCompleted) {
            debug!(error = %e, "state transition skipped");
        }
    }

    /// Run the close path once: flush providers, hand the recording over,
    /// cancel every task
    pub async fn close(&self, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(reason, "closing conversation");

        if let Some(tts) = &self.tts {
            let _ = tts.close().await;
        }
        if let Some(stt) = &self.stt {
            let _ = stt.close().await;
        }
        if let Some(eos) = &self.eos {
            eos.close();
        }
        let _ = self.executor.close().await;

        if let Some(recorder) = &self.recorder {
            let (user, assistant) = recorder.finish();
            self.comm
                .record_event(
                    "recording",
                    json!({
                        "user_bytes": user.len(),
                        "assistant_bytes": assistant.len(),
                        "interruptions": recorder.interruption_count(),
                    }),
                )
                .await;
        }
        self.comm
            .record_event("closed", json!({ "reason": reason }))
            .await;
        metrics::counter!("voxflow_conversations_closed_total").increment(1);
        self.token.cancel();
    }
}

#[async_trait::async_trait]
impl voxflow_core::Dispatcher for ConversationRuntime {
    async fn on_packet(&self, packets: Vec<Packet>) -> Result<()> {
        for packet in packets {
            self.handle_packet(packet).await;
        }
        Ok(())
    }
}

// Provider callback glue: each provider receives only the callback shapes it
// needs, never the runtime itself.

/// Transcript events become `SpeechToText` packets
pub fn stt_callback(tx: PacketSender) -> TranscriptCallback {
    Arc::new(move |transcript| {
        let _ = tx.try_send(Packet::SpeechToText {
            script: transcript.text,
            confidence: transcript.confidence,
            language: transcript.language,
            interim: !transcript.is_final,
        });
    })
}

/// Detector firings become `EndOfSpeech` packets
pub fn eos_callback(tx: PacketSender) -> EosCallback {
    Arc::new(move |result| {
        let _ = tx.try_send(Packet::EndOfSpeech {
            speech: result.speech,
            start_at: result.start_at,
            end_at: result.end_at,
        });
    })
}

/// Synthesized audio and flush acknowledgements become `TextToSpeech` /
/// `TextToSpeechFlush` packets. Overflowed frames are dropped and counted,
/// preferring freshness on a live call over completeness.
pub fn tts_callbacks(tx: PacketSender) -> TtsCallbacks {
    let speech_tx = tx.clone();
    TtsCallbacks {
        on_speech: Arc::new(move |context_id, audio| {
            if speech_tx
                .try_send(Packet::TextToSpeech { context_id, audio })
                .is_err()
            {
                metrics::counter!("voxflow_tts_frames_dropped_total").increment(1);
            }
        }),
        on_complete: Arc::new(move |context_id| {
            let _ = tx.try_send(Packet::TextToSpeechFlush { context_id });
        }),
    }
}
