//! Error types for the BSL protocol engine.

use std::io;
use thiserror::Error;

/// Result type for `axdl` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for `axdl` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport was used before `open` succeeded.
    #[error("transport is not open")]
    NotOpen,

    /// Underlying USB I/O error other than a timeout.
    #[error("USB I/O error: {0}")]
    UsbIo(#[from] rusb::Error),

    /// A read returned no bytes within the deadline.
    #[error("timed out waiting for a reply")]
    Timeout,

    /// A reply frame failed to decode (bad magic, too short, checksum
    /// mismatch).
    #[error("received an invalid frame")]
    FrameInvalid,

    /// A reply decoded but its command byte was not the one expected.
    #[error("unexpected reply command: {0:#06x}")]
    WrongReply(u16),

    /// The manifest is missing a required descriptor, or references a
    /// bundle file that cannot be resolved.
    #[error("invalid manifest: {0}")]
    ManifestInvalid(String),

    /// A blob file referenced by the manifest vanished between load and
    /// burn.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Local file I/O error (reading a loader or image blob).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The claimed interface/alt-setting doesn't expose the bulk endpoint
    /// the BSL requires (wrong interface, wrong alt setting, or a
    /// different device reusing the same VID/PID).
    #[error("device does not expose expected bulk endpoint {0:#04x}")]
    MissingEndpoint(u8),
}
