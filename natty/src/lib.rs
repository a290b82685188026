//! # natty
//!
//! A command-line WebRTC peer that opens a single data channel to another
//! process. Signaling travels as one JSON object per line: session
//! descriptions and ICE candidates are read from the input and written to
//! stdout (or a file), so two natty processes can be wired together with a
//! pipe, a relay, or anything else that moves lines.
//!
//! ```text
//! natty --offer  ──{"type":"offer","sdp":...}──────────────▶  natty
//!                ◀─{"type":"answer","sdp":...}─────────────
//!                ◀─{"sdpMid":..,"sdpMLineIndex":..,"candidate":..}─▶
//! ```
//!
//! ICE, DTLS and SCTP are provided by the [`webrtc`] engine. This crate
//! configures it, forwards its observer callbacks into signaling messages,
//! and applies the messages received from the remote side.
//!
//! ## Embedding
//!
//! ```no_run
//! use natty::{NattyConfig, Role, session};
//! use signal::SignalWriter;
//! use tokio::io::BufReader;
//! use tokio::sync::broadcast;
//!
//! # async fn example() -> natty::Result<()> {
//! let config = NattyConfig::new(Role::Offerer);
//! let (_stop_tx, stop_rx) = broadcast::channel::<()>(1);
//! let input = BufReader::new(tokio::io::stdin());
//! let exit = session::run(&config, input, SignalWriter::stdout(), stop_rx).await?;
//! println!("session ended: {exit:?}");
//! # Ok(())
//! # }
//! ```

#![warn(rust_2018_idioms)]

pub mod config;
mod error;
pub mod peer;
pub mod session;

pub use config::{NattyConfig, Role};
pub use error::{Error, Result};
pub use peer::{Natty, PeerStatus, SignalSink};
pub use session::Exit;
