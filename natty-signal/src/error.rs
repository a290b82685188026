use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("signal: message is not a JSON object")]
    ErrInvalidJson,
    #[error("signal: missing or malformed field `{0}`")]
    ErrMissingField(&'static str),
    #[error("signal: unknown session description type `{0}`")]
    ErrUnknownSdpType(String),

    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Io(#[from] io::Error),
}
