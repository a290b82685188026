use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("natty: peer connection is closed")]
    ErrClosed,

    #[error("{0}")]
    WebRTC(#[from] webrtc::Error),
    #[error("{0}")]
    Signal(#[from] signal::Error),
    #[error("{0}")]
    Io(#[from] io::Error),
}
