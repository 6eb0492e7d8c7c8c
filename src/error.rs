/*
    SPDX-License-Identifier: AGPL-3.0-or-later
*/
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Status codes returned by XFlash's `ProtocolFlow` status frames.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum XFlashError {
    #[error("XFlash checksum error")]
    Checksum,
    #[error("XFlash unsupported command")]
    Unsupported,
    #[error("XFlash device reported status 0x{0:08X}")]
    Status(u32),
}

impl XFlashError {
    pub fn from_code(code: u32) -> Self {
        match code {
            0x0002 => XFlashError::Checksum,
            0x0001 => XFlashError::Unsupported,
            other => XFlashError::Status(other),
        }
    }
}

/// Failure kinds surfaced by XML-DA's text-based `CMD:...` exchanges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlErrorKind {
    UnsupportedCmd,
    Device,
    ResyncFailed,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("XML-DA error: {message}")]
pub struct XmlError {
    pub kind: XmlErrorKind,
    pub message: String,
}

impl XmlError {
    /// Classifies a raw device response: `ERR!UNSUPPORTED...` is a soft failure
    /// callers may choose to ignore, anything else is a hard device error.
    pub fn from_message(raw: &[u8]) -> Self {
        let message = String::from_utf8_lossy(raw).trim_end_matches('\0').to_string();
        let kind = if message.contains("ERR!UNSUPPORTED") {
            XmlErrorKind::UnsupportedCmd
        } else {
            XmlErrorKind::Device
        };
        XmlError { kind, message }
    }

    pub fn resync_failed() -> Self {
        XmlError {
            kind: XmlErrorKind::ResyncFailed,
            message: "no frame magic found in scan window".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("link error: {0}")]
    Link(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("SLA authentication required")]
    AuthRequiredSla,

    #[error("preloader DAA authentication required (status 0x{0:04X})")]
    AuthRequiredPreloaderDaa(u16),

    #[error("DAA triggered (status 0x{0:04X}); device may re-enumerate")]
    DaaTriggered(u16),

    #[error("DA container error: {0}")]
    Container(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    XFlash(#[from] XFlashError),

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("mtkflash error: {0}")]
    Other(String),
}

impl Error {
    pub fn conn(msg: impl Into<String>) -> Self {
        Error::Link(msg.into())
    }

    pub fn proto(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Error::Io(std::io::Error::new(std::io::ErrorKind::Other, msg.into()))
    }

    pub fn container(msg: impl Into<String>) -> Self {
        Error::Container(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }
}
