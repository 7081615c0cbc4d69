//! Error types for `RwTxd`

use std::path::PathBuf;

use thiserror::Error;

/// The error type for `RwTxd` operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    // ==================== IO Errors ====================
    /// IO error from stream or file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory traversal error.
    #[error("directory walk error: {0}")]
    WalkDirError(String),

    /// Invalid file path.
    #[error("invalid path: {0}")]
    InvalidPath(PathBuf),

    // ==================== Block Stream Errors ====================
    /// A block is truncated or its contents contradict its header.
    #[error("corrupt block: {message}")]
    CorruptBlock {
        /// What was wrong with the block.
        message: String,
    },

    /// A block with an unexpected chunk id was found where a specific one was required.
    #[error("unexpected chunk 0x{found:08X} (expected 0x{expected:08X})")]
    UnknownChunk {
        /// The chunk id the reader required.
        expected: u32,
        /// The chunk id found in the stream.
        found: u32,
    },

    /// `leave_context` was called for a block that is not the innermost open one.
    #[error("block context unbalanced: {message}")]
    BlockContextUnbalanced {
        /// Description of the mismatch.
        message: String,
    },

    // ==================== Raster Errors ====================
    /// No native texture handler is registered for the requested platform.
    #[error("unsupported native platform: {platform}")]
    UnsupportedNativePlatform {
        /// Platform name or id as found.
        platform: String,
    },

    /// Raster dimensions violate the size rules of the native platform.
    #[error("invalid raster dimensions {width}x{height}: {reason}")]
    InvalidDimension {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// The rule that was violated.
        reason: String,
    },

    /// The raster has no native data body yet.
    #[error("raster has no native data")]
    RasterEmpty,

    /// The conversion cannot be performed on this raster.
    #[error("unsupported conversion: {message}")]
    UnsupportedConversion {
        /// Description of the rejected conversion.
        message: String,
    },

    /// A pixel or block-compression kernel failed.
    #[error("codec failure: {message}")]
    CodecFailure {
        /// The kernel error message.
        message: String,
    },

    /// An allocation for pixel data would exceed sane limits.
    #[error("out of memory: {bytes} bytes requested")]
    OutOfMemory {
        /// Size of the rejected allocation.
        bytes: u64,
    },

    // ==================== Texture Errors ====================
    /// A texture or mask name is too long or contains reserved characters.
    #[error("invalid texture name '{name}': {reason}")]
    InvalidTextureName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The serialized object is not of the requested kind.
    #[error("unexpected object type: {message}")]
    UnexpectedObject {
        /// Description of the mismatch.
        message: String,
    },

    // ==================== Imaging Errors ====================
    /// No imaging format with that name is registered.
    #[error("unknown image format: {0}")]
    UnknownImageFormat(String),

    /// Decoding an image stream failed.
    #[error("failed to decode {format} image: {message}")]
    ImageDecodeFailed {
        /// Format that was tried.
        format: String,
        /// The decoder message.
        message: String,
    },

    /// Encoding an image stream failed.
    #[error("failed to encode {format} image: {message}")]
    ImageEncodeFailed {
        /// Format that was requested.
        format: String,
        /// The encoder message.
        message: String,
    },

    // ==================== Archive Errors ====================
    /// An IMG archive is malformed.
    #[error("invalid archive: {message}")]
    ArchiveFormat {
        /// Description of the problem.
        message: String,
    },

    /// ZIP archive error.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ==================== Runtime Errors ====================
    /// The running thread was asked to terminate.
    #[error("cancellation requested")]
    CancellationRequested,

    /// Two readers tried to upgrade the same lock to writer at once.
    #[error("lock upgrade conflict: another reader is already upgrading")]
    LockUpgradeConflict,

    /// A configuration value is missing or malformed.
    #[error("invalid configuration '{key}': {message}")]
    InvalidConfiguration {
        /// The configuration key.
        key: String,
        /// What is wrong with it.
        message: String,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for [`Error::CorruptBlock`].
    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        Error::CorruptBlock {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::CodecFailure`].
    pub(crate) fn codec(message: impl Into<String>) -> Self {
        Error::CodecFailure {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::UnsupportedConversion`].
    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Error::UnsupportedConversion {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::ArchiveFormat`].
    pub(crate) fn archive(message: impl Into<String>) -> Self {
        Error::ArchiveFormat {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::ImageDecodeFailed`].
    pub(crate) fn decode_failed(format: &str, message: impl Into<String>) -> Self {
        Error::ImageDecodeFailed {
            format: format.to_string(),
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::ImageEncodeFailed`].
    pub(crate) fn encode_failed(format: &str, message: impl Into<String>) -> Self {
        Error::ImageEncodeFailed {
            format: format.to_string(),
            message: message.into(),
        }
    }

    /// Returns true if this error unwinds a cancelled task rather than reporting a failure.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::CancellationRequested)
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::WalkDirError(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::ImageDecodeFailed {
            format: "image".to_string(),
            message: err.to_string(),
        }
    }
}

/// A specialized Result type for `RwTxd` operations.
pub type Result<T> = std::result::Result<T, Error>;
