//! Transport adapters
//!
//! A transport adapter terminates one carrier session and converts carrier
//! frames into normalized inputs for the conversation runtime, and runtime
//! outputs back into carrier frames. The wire protocol is selected per
//! session: a browser JSON envelope or a telephony media stream. Transient
//! errors (isolated malformed frames) are logged and skipped; a carrier
//! close is final.

mod browser;
mod media_stream;
mod session;
mod telephony;

pub use browser::BrowserProtocol;
pub use media_stream::MediaStreamProtocol;
pub use session::{CarrierFrame, TransportSession, WireMessage, WireProtocol};
pub use telephony::{answer_document, CallControl, HttpCallControl};
