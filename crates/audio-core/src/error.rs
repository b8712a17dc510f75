//! Error handling for audio devices and format conversion
//!
//! Device-level failures here surface as `DeviceFault` at the session layer;
//! the bridge treats them as fatal to the owning session only.

use thiserror::Error;

/// Result type alias for audio operations
pub type AudioResult<T> = std::result::Result<T, AudioError>;

/// Error type for audio device and codec operations
#[derive(Error, Debug, Clone)]
pub enum AudioError {
    /// Device not found during enumeration or lookup
    #[error("Audio device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    /// Device is already reserved by another port
    #[error("Audio device is already in use: {device_id}")]
    DeviceInUse { device_id: String },

    /// Requested format is not supported by the device
    #[error("Audio format {format} not supported by device: {device_id}")]
    FormatNotSupported { format: String, device_id: String },

    /// Platform/backend-specific error
    #[error("Platform audio error: {message}")]
    PlatformError { message: String },

    /// Read/write failure on an open stream
    #[error("Audio I/O error: {message}")]
    IoError { message: String },

    /// Invalid port or device configuration
    #[error("Audio configuration error: {message}")]
    ConfigurationError { message: String },

    /// Sample conversion failed
    #[error("Format conversion failed ({source_format} -> {target_format}): {reason}")]
    ConversionFailed {
        source_format: String,
        target_format: String,
        reason: String,
    },
}

impl AudioError {
    /// Create a new device-not-found error
    pub fn device_not_found(device_id: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            device_id: device_id.into(),
        }
    }

    /// Create a new platform error
    pub fn platform(message: impl Into<String>) -> Self {
        Self::PlatformError {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::IoError {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable by reopening the device
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::DeviceNotFound { .. }
            | Self::FormatNotSupported { .. }
            | Self::ConfigurationError { .. } => false,
            Self::DeviceInUse { .. }
            | Self::PlatformError { .. }
            | Self::IoError { .. }
            | Self::ConversionFailed { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AudioError::device_not_found("cable-output");
        assert!(err.to_string().contains("cable-output"));
    }

    #[test]
    fn test_error_recoverability() {
        assert!(AudioError::io("stream closed").is_recoverable());
        assert!(!AudioError::configuration("bad format").is_recoverable());
    }
}
