//! Streaming sentence tokenizer
//!
//! Buffers streamed LLM text per context and cuts on a configurable set of
//! sentence boundary characters, emitting one `Text` packet per complete
//! sentence. A `Flush` packet drains residual text as a final sentence even
//! without a boundary. The concatenation of emitted sentences always equals
//! the concatenation of the inputs: whitespace collapse is the consumer's
//! job.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use voxflow_core::{Options, Packet};

const DEFAULT_BOUNDARIES: &str = ".?!";

/// Default streaming sentence tokenizer
pub struct SentenceTokenizer {
    boundaries: Vec<char>,
    buffers: Mutex<HashMap<String, String>>,
    output: mpsc::UnboundedSender<Packet>,
}

impl SentenceTokenizer {
    /// Boundary characters come from `speaker.sentence.boundaries`; the
    /// receiver yields one `Text` packet per sentence plus the flushed
    /// remainder.
    pub fn new(options: &Options) -> (Self, mpsc::UnboundedReceiver<Packet>) {
        let boundaries = options
            .get_string("speaker.sentence.boundaries")
            .unwrap_or_else(|| DEFAULT_BOUNDARIES.to_string())
            .chars()
            .collect();
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                boundaries,
                buffers: Mutex::new(HashMap::new()),
                output: tx,
            },
            rx,
        )
    }

    /// Consume tokenizer inputs: `Text` chunks accumulate, `Flush` drains.
    /// Other packet kinds are ignored.
    pub fn tokenize(&self, packets: Vec<Packet>) {
        for packet in packets {
            match packet {
                Packet::Text { context_id, text } => self.push_text(&context_id, &text),
                Packet::Flush { context_id } => self.flush(&context_id),
                other => trace!(kind = other.kind(), "tokenizer ignoring packet"),
            }
        }
    }

    fn push_text(&self, context_id: &str, text: &str) {
        let mut buffers = self.buffers.lock();
        let buffer = buffers.entry(context_id.to_string()).or_default();
        buffer.push_str(text);

        // Cut after every boundary character, keeping the remainder buffered
        loop {
            let cut = buffer
                .char_indices()
                .find(|(_, c)| self.boundaries.contains(c))
                .map(|(i, c)| i + c.len_utf8());
            let Some(cut) = cut else { break };
            let sentence: String = buffer.drain(..cut).collect();
            let _ = self.output.send(Packet::Text {
                context_id: context_id.to_string(),
                text: sentence,
            });
        }
    }

    fn flush(&self, context_id: &str) {
        let residual = self.buffers.lock().remove(context_id);
        if let Some(text) = residual {
            if !text.is_empty() {
                let _ = self.output.send(Packet::Text {
                    context_id: context_id.to_string(),
                    text,
                });
            }
        }
        let _ = self.output.send(Packet::Flush {
            context_id: context_id.to_string(),
        });
    }

    /// Drop any buffered text for a preempted context without emitting it
    pub fn discard(&self, context_id: &str) {
        self.buffers.lock().remove(context_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer(boundaries: Option<&str>) -> (SentenceTokenizer, mpsc::UnboundedReceiver<Packet>) {
        let mut options = Options::new();
        if let Some(b) = boundaries {
            options.insert("speaker.sentence.boundaries", b);
        }
        SentenceTokenizer::new(&options)
    }

    fn text(context_id: &str, text: &str) -> Packet {
        Packet::Text {
            context_id: context_id.into(),
            text: text.into(),
        }
    }

    fn drain_texts(rx: &mut mpsc::UnboundedReceiver<Packet>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(p) = rx.try_recv() {
            if let Packet::Text { text, .. } = p {
                out.push(text);
            }
        }
        out
    }

    #[test]
    fn test_cut_on_default_boundaries() {
        let (tok, mut rx) = tokenizer(None);
        tok.tokenize(vec![text("m1", "Hello there. How are you? Good")]);
        assert_eq!(drain_texts(&mut rx), vec!["Hello there.", " How are you?"]);
        tok.tokenize(vec![Packet::Flush {
            context_id: "m1".into(),
        }]);
        assert_eq!(drain_texts(&mut rx), vec![" Good"]);
    }

    #[test]
    fn test_sentence_spans_multiple_chunks() {
        let (tok, mut rx) = tokenizer(None);
        tok.tokenize(vec![text("m1", "The refund ")]);
        tok.tokenize(vec![text("m1", "takes three")]);
        assert!(drain_texts(&mut rx).is_empty());
        tok.tokenize(vec![text("m1", " days.")]);
        assert_eq!(drain_texts(&mut rx), vec!["The refund takes three days."]);
    }

    #[test]
    fn test_no_loss_across_flush() {
        let (tok, mut rx) = tokenizer(None);
        let inputs = ["First sentence.", " Second sentence!", " trailing bits"];
        for chunk in inputs {
            tok.tokenize(vec![text("m1", chunk)]);
        }
        tok.tokenize(vec![Packet::Flush {
            context_id: "m1".into(),
        }]);
        let emitted = drain_texts(&mut rx).concat();
        assert_eq!(emitted, inputs.concat());
    }

    #[test]
    fn test_custom_boundaries() {
        let (tok, mut rx) = tokenizer(Some(".;"));
        tok.tokenize(vec![text("m1", "one; two. three? four")]);
        assert_eq!(drain_texts(&mut rx), vec!["one;", " two."]);
    }

    #[test]
    fn test_contexts_are_independent() {
        let (tok, mut rx) = tokenizer(None);
        tok.tokenize(vec![text("m1", "alpha"), text("m2", "beta.")]);
        let texts = drain_texts(&mut rx);
        assert_eq!(texts, vec!["beta."]);
        tok.tokenize(vec![Packet::Flush {
            context_id: "m1".into(),
        }]);
        assert_eq!(drain_texts(&mut rx), vec!["alpha"]);
    }

    #[test]
    fn test_flush_always_emits_flush_packet() {
        let (tok, mut rx) = tokenizer(None);
        tok.tokenize(vec![Packet::Flush {
            context_id: "m1".into(),
        }]);
        let packet = rx.try_recv().unwrap();
        assert!(matches!(packet, Packet::Flush { context_id } if context_id == "m1"));
    }

    #[test]
    fn test_discard_drops_buffered_text() {
        let (tok, mut rx) = tokenizer(None);
        tok.tokenize(vec![text("m1", "never spoken")]);
        tok.discard("m1");
        tok.tokenize(vec![Packet::Flush {
            context_id: "m1".into(),
        }]);
        assert!(drain_texts(&mut rx).is_empty());
    }

    #[test]
    fn test_multibyte_boundary_safety() {
        let (tok, mut rx) = tokenizer(None);
        tok.tokenize(vec![text("m1", "café ready. très bien")]);
        assert_eq!(drain_texts(&mut rx), vec!["café ready."]);
    }
}
