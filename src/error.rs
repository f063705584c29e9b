//! Error handling for the playback engine.
//!
//! Provides a unified error handling system categorized by the taxonomy
//! the pipeline's failure modes actually fall into, with mapping from
//! various underlying errors into the right category.
//!
//! # Example
//!
//! ```rust
//! use mediacore::error::{Error, ErrorKind, Result};
//!
//! fn do_something() -> Result<()> {
//!     if false {
//!         return Err(Error::not_found("stream index out of range"));
//!     }
//!
//!     let _file = std::fs::File::open("movie.mp4")?;
//!
//!     Ok(())
//! }
//! ```

#![allow(clippy::enum_glob_use)]

use std::fmt;
use thiserror::Error;

/// Main error type combining error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error, matching the taxonomy of the pipeline's
    /// component design.
    pub kind: ErrorKind,

    /// Details of the underlying error.
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

impl Error {
    /// Attempts to downcast the underlying error to a concrete type.
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }
}

/// Standard result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories, matching the taxonomy of the component design.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
pub enum ErrorKind {
    /// Transport failure, range rejection, or truncated read from a
    /// [`crate::source::Source`].
    #[error("source I/O failed")]
    SourceIo,

    /// The demuxer failed to open or parse the container.
    #[error("container could not be parsed")]
    ContainerParse,

    /// Neither the hardware nor the software decoder can handle this codec.
    #[error("codec is not supported")]
    UnsupportedCodec,

    /// A single packet failed to decode.
    #[error("packet failed to decode")]
    Decode,

    /// The demuxer seek failed, including its fallback.
    #[error("seek failed")]
    Seek,

    /// The packet buffer was too small; callers should grow and retry.
    #[error("buffer too small")]
    BufferTooSmall,

    /// Operation was cancelled (e.g. superseded by a later seek).
    #[error("operation was cancelled")]
    Cancelled,

    /// The requested operation is invalid for the controller's current state.
    #[error("invalid state for this operation")]
    InvalidState,

    /// A requested resource (track, stream, device) does not exist.
    #[error("not found")]
    NotFound,

    /// Unrecoverable controller error; requires `close()` to reset.
    #[error("fatal error")]
    Fatal,
}

impl Error {
    /// Creates a new error with the specified kind and details.
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// Creates a `SourceIo` error.
    pub fn source_io<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::SourceIo, error)
    }

    /// Creates a `ContainerParse` error.
    pub fn container_parse<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::ContainerParse, error)
    }

    /// Creates an `UnsupportedCodec` error.
    pub fn unsupported_codec<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::UnsupportedCodec, error)
    }

    /// Creates a `Decode` error.
    pub fn decode<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Decode, error)
    }

    /// Creates a `Seek` error.
    pub fn seek<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Seek, error)
    }

    /// Creates a `BufferTooSmall` error.
    pub fn buffer_too_small<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::BufferTooSmall, error)
    }

    /// Creates a `Cancelled` error.
    pub fn cancelled<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Cancelled, error)
    }

    /// Creates an `InvalidState` error.
    pub fn invalid_state<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidState, error)
    }

    /// Creates a `NotFound` error.
    pub fn not_found<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::NotFound, error)
    }

    /// Creates a `Fatal` error.
    pub fn fatal<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Fatal, error)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

impl From<std::io::Error> for Error {
    /// Converts standard IO errors into the closest matching source/decode
    /// category.
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            NotFound => Self::not_found(err),
            UnexpectedEof => Self::source_io(err),
            Interrupted | WouldBlock => Self::cancelled(err),
            TimedOut | ConnectionReset | ConnectionAborted | BrokenPipe => Self::source_io(err),
            InvalidInput | InvalidData => Self::container_parse(err),
            _ => Self::fatal(err),
        }
    }
}

impl From<reqwest::Error> for Error {
    /// Converts HTTP client errors raised by the ranged-HTTP source variant.
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return Self::source_io(err);
        }
        if err.is_status() {
            return Self::source_io(err);
        }
        if err.is_body() || err.is_decode() {
            return Self::source_io(err);
        }
        Self::fatal(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::invalid_state(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::fatal(e.to_string())
    }
}

impl From<symphonia::core::errors::Error> for Error {
    /// Converts Symphonia demux/decode errors into the pipeline's taxonomy.
    ///
    /// `ResetRequired` is handled by callers before it reaches here; any
    /// instance seen at this conversion point is treated as a decode error.
    fn from(err: symphonia::core::errors::Error) -> Self {
        use symphonia::core::errors::Error::*;
        match err {
            IoError(e) => Self::source_io(e),
            DecodeError(e) => Self::decode(e),
            SeekError(_) => Self::seek(err.to_string()),
            Unsupported(e) => Self::unsupported_codec(e),
            LimitError(e) => Self::buffer_too_small(e),
            ResetRequired => Self::decode("decoder reset required"),
        }
    }
}

impl From<rodio::StreamError> for Error {
    fn from(e: rodio::StreamError) -> Self {
        Self::fatal(e.to_string())
    }
}

impl From<rodio::PlayError> for Error {
    fn from(e: rodio::PlayError) -> Self {
        Self::fatal(e.to_string())
    }
}

impl From<cpal::SupportedStreamConfigsError> for Error {
    fn from(e: cpal::SupportedStreamConfigsError) -> Self {
        Self::fatal(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<std::sync::MutexGuard<'_, T>>> for Error {
    fn from(e: std::sync::PoisonError<std::sync::MutexGuard<'_, T>>) -> Self {
        Self::fatal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_prefix() {
        let err = Error::not_found("stream 4");
        assert_eq!(err.to_string(), "not found: stream 4");
    }

    #[test]
    fn downcast_recovers_concrete_type() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err = Error::from(io_err);
        assert!(err.downcast::<std::io::Error>().is_some());
    }

    #[test]
    fn io_unexpected_eof_maps_to_source_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err = Error::from(io_err);
        assert_eq!(err.kind, ErrorKind::SourceIo);
    }
}
