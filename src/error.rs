use std::fmt;
use std::io;
use std::time::Duration;

/// Custom error types for the print completion notifier.
///
/// Each stage of the run (serial watch, camera capture, email notification,
/// configuration) has its own error enum so callers can tell failure kinds
/// apart instead of catching everything as one generic failure.

/// Main error type for print-complete operations.
#[derive(Debug)]
pub enum PrintCompleteError {
    /// Errors while waiting for the completion marker on the serial line.
    Watch(WatchError),

    /// Errors while grabbing or saving the camera frame.
    Capture(CaptureError),

    /// Errors while building or sending the notification email.
    Notify(NotifyError),

    /// Configuration and setup errors.
    Config(ConfigError),
}

/// Errors specific to the serial completion watcher.
#[derive(Debug)]
pub enum WatchError {
    /// The serial port could not be opened.
    Open { port: String, reason: String },

    /// The device stopped producing data (unplugged or stream closed).
    Disconnected,

    /// No completion marker arrived before the configured deadline.
    TimedOut { after: Duration },

    /// The wait was cancelled through its cancel token.
    Cancelled,

    /// Reading from or resetting the device failed.
    Io(io::Error),
}

/// Errors specific to camera capture.
#[derive(Debug)]
pub enum CaptureError {
    /// The binary was built without native camera support.
    Unsupported,

    /// The capture device could not be opened or read.
    Device { reason: String },

    /// The device returned a frame with no pixels.
    EmptyFrame,

    /// The frame could not be written to disk.
    Encode { path: String, reason: String },
}

/// Errors specific to the email notifier.
#[derive(Debug)]
pub enum NotifyError {
    /// The image file could not be read.
    Io { path: String, source: io::Error },

    /// An address was invalid or the message could not be assembled.
    Message { reason: String },

    /// The SMTP server could not be reached, or the TLS upgrade failed.
    Connection { reason: String },

    /// The SMTP server rejected the credentials.
    Authentication { reason: String },

    /// The SMTP server refused the message.
    Rejected { reason: String },
}

/// Errors related to configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Required environment variable is missing.
    MissingEnvVar { var_name: String },

    /// Invalid configuration values provided.
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl NotifyError {
    /// Short name of the failure kind, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            NotifyError::Io { .. } => "io",
            NotifyError::Message { .. } => "message",
            NotifyError::Connection { .. } => "connection",
            NotifyError::Authentication { .. } => "authentication",
            NotifyError::Rejected { .. } => "rejected",
        }
    }
}

impl fmt::Display for PrintCompleteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrintCompleteError::Watch(e) => write!(f, "Serial watch error: {}", e),
            PrintCompleteError::Capture(e) => write!(f, "Capture error: {}", e),
            PrintCompleteError::Notify(e) => write!(f, "Notification error: {}", e),
            PrintCompleteError::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchError::Open { port, reason } => {
                write!(f, "Failed to open serial port '{}': {}", port, reason)
            }
            WatchError::Disconnected => write!(f, "Serial device disconnected"),
            WatchError::TimedOut { after } => {
                write!(
                    f,
                    "No completion marker seen within {} seconds",
                    after.as_secs_f64()
                )
            }
            WatchError::Cancelled => write!(f, "Wait for print completion was cancelled"),
            WatchError::Io(e) => write!(f, "Serial read failed: {}", e),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Unsupported => {
                write!(f, "Camera support not compiled in (enable the 'camera' feature)")
            }
            CaptureError::Device { reason } => write!(f, "Camera device error: {}", reason),
            CaptureError::EmptyFrame => write!(f, "Camera returned an empty frame"),
            CaptureError::Encode { path, reason } => {
                write!(f, "Failed to save image to '{}': {}", path, reason)
            }
        }
    }
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::Io { path, source } => {
                write!(f, "Failed to read image '{}': {}", path, source)
            }
            NotifyError::Message { reason } => write!(f, "Failed to build email: {}", reason),
            NotifyError::Connection { reason } => {
                write!(f, "Could not connect to SMTP server: {}", reason)
            }
            NotifyError::Authentication { reason } => {
                write!(f, "SMTP authentication failed: {}", reason)
            }
            NotifyError::Rejected { reason } => {
                write!(f, "SMTP server rejected the message: {}", reason)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingEnvVar { var_name } => {
                write!(f, "Required environment variable '{}' is not set", var_name)
            }
            ConfigError::InvalidValue {
                field,
                value,
                reason,
            } => {
                write!(
                    f,
                    "Invalid value '{}' for field '{}': {}",
                    value, field, reason
                )
            }
        }
    }
}

impl std::error::Error for PrintCompleteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PrintCompleteError::Watch(e) => Some(e),
            PrintCompleteError::Capture(e) => Some(e),
            PrintCompleteError::Notify(e) => Some(e),
            PrintCompleteError::Config(e) => Some(e),
        }
    }
}

impl std::error::Error for WatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WatchError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for NotifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NotifyError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl std::error::Error for CaptureError {}
impl std::error::Error for ConfigError {}

impl From<io::Error> for WatchError {
    fn from(err: io::Error) -> Self {
        WatchError::Io(err)
    }
}

impl From<WatchError> for PrintCompleteError {
    fn from(err: WatchError) -> Self {
        PrintCompleteError::Watch(err)
    }
}

impl From<CaptureError> for PrintCompleteError {
    fn from(err: CaptureError) -> Self {
        PrintCompleteError::Capture(err)
    }
}

impl From<NotifyError> for PrintCompleteError {
    fn from(err: NotifyError) -> Self {
        PrintCompleteError::Notify(err)
    }
}

impl From<ConfigError> for PrintCompleteError {
    fn from(err: ConfigError) -> Self {
        PrintCompleteError::Config(err)
    }
}
