//! Line-oriented JSON signaling for natty.
//!
//! Two natty processes exchange session descriptions and ICE candidates as
//! one JSON object per line. This crate holds the message shapes, the input
//! line classification (`exit`, blank lines, messages) and an async writer
//! that targets stdout or a file.

#![warn(rust_2018_idioms)]

mod error;
pub mod input;
pub mod message;
pub mod writer;

pub use error::{Error, Result};
pub use input::InputLine;
pub use message::{ErrorMessage, IceCandidate, SdpType, SessionDescription, SignalMessage};
pub use writer::SignalWriter;
