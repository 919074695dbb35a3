//! Call recorder tap
//!
//! Accumulates the user and assistant audio tracks of a conversation.
//! Assistant audio is staged in a pending queue and only committed once the
//! frame has actually been delivered; an interruption drops whatever is still
//! queued so preempted audio never reaches the recording.

use parking_lot::Mutex;

use voxflow_core::audio::AudioConfig;

#[derive(Default)]
struct Tracks {
    user: Vec<u8>,
    assistant: Vec<u8>,
    pending_assistant: Vec<Vec<u8>>,
    interruptions: u32,
}

/// Per-conversation recording tap
pub struct CallRecorder {
    config: AudioConfig,
    tracks: Mutex<Tracks>,
}

impl CallRecorder {
    pub fn new(config: AudioConfig) -> Self {
        Self {
            config,
            tracks: Mutex::new(Tracks::default()),
        }
    }

    pub fn config(&self) -> AudioConfig {
        self.config
    }

    /// Append a chunk of user audio
    pub fn user(&self, bytes: &[u8]) {
        self.tracks.lock().user.extend_from_slice(bytes);
    }

    /// Stage a chunk of assistant audio; it is recorded on the next commit
    pub fn assistant(&self, bytes: &[u8]) {
        self.tracks.lock().pending_assistant.push(bytes.to_vec());
    }

    /// Commit staged assistant audio after delivery to the carrier
    pub fn commit(&self) {
        let mut tracks = self.tracks.lock();
        let pending = std::mem::take(&mut tracks.pending_assistant);
        for chunk in pending {
            tracks.assistant.extend_from_slice(&chunk);
        }
    }

    /// The user barged in: drop staged assistant audio
    pub fn interrupt(&self) {
        let mut tracks = self.tracks.lock();
        tracks.pending_assistant.clear();
        tracks.interruptions += 1;
    }

    /// Finish the recording, returning (user track, assistant track)
    pub fn finish(&self) -> (Vec<u8>, Vec<u8>) {
        let mut tracks = self.tracks.lock();
        tracks.pending_assistant.clear();
        (
            std::mem::take(&mut tracks.user),
            std::mem::take(&mut tracks.assistant),
        )
    }

    pub fn interruption_count(&self) -> u32 {
        self.tracks.lock().interruptions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_committed_audio_is_recorded() {
        let rec = CallRecorder::new(AudioConfig::mulaw_8khz_mono());
        rec.user(&[1, 2]);
        rec.assistant(&[3, 4]);
        rec.commit();
        let (user, assistant) = rec.finish();
        assert_eq!(user, vec![1, 2]);
        assert_eq!(assistant, vec![3, 4]);
    }

    #[test]
    fn test_interrupt_drops_staged_audio() {
        let rec = CallRecorder::new(AudioConfig::mulaw_8khz_mono());
        rec.assistant(&[3, 4]);
        rec.interrupt();
        rec.commit();
        let (_, assistant) = rec.finish();
        assert!(assistant.is_empty());
        assert_eq!(rec.interruption_count(), 1);
    }

    #[test]
    fn test_uncommitted_audio_never_persists() {
        let rec = CallRecorder::new(AudioConfig::mulaw_8khz_mono());
        rec.assistant(&[9, 9]);
        let (_, assistant) = rec.finish();
        assert!(assistant.is_empty());
    }
}
