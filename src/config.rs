use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for the print completion notifier, loaded from environment variables.
///
/// Every component receives the part of this struct it needs; nothing is kept
/// in module-level state.
#[derive(Debug, Clone)]
pub struct Config {
    pub serial: SerialConfig,
    pub camera: CameraConfig,
    pub email: EmailConfig,
}

/// Serial line settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Serial device the printer is attached to (e.g. `/dev/ttyUSB0`, `COM27`).
    /// Environment variable: `SERIAL_PORT`
    pub port: String,

    /// Environment variable: `BAUD_RATE`
    pub baud_rate: u32,

    /// Text that marks the end of a print, matched anywhere in a line.
    /// Environment variable: `COMPLETION_MARKER`
    pub marker: String,

    /// Give up waiting after this long. `None` waits forever.
    /// Environment variable: `WATCH_TIMEOUT_SECS`
    pub timeout: Option<Duration>,
}

/// Camera settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConfig {
    /// Capture device index.
    /// Environment variable: `CAMERA_INDEX`
    pub index: u32,

    /// Where the captured frame is written (PNG).
    /// Environment variable: `IMAGE_PATH`
    pub output_path: PathBuf,

    /// Flip the frame vertically, for cameras mounted upside-down.
    /// Environment variable: `FLIP_IMAGE`
    pub flip_vertical: bool,
}

/// Email and SMTP settings.
#[derive(Clone, PartialEq, Eq)]
pub struct EmailConfig {
    /// Environment variable: `SMTP_HOST`
    pub smtp_host: String,

    /// Environment variable: `SMTP_PORT`
    pub smtp_port: u16,

    /// Sender address, also the SMTP login.
    /// Environment variable: `EMAIL_ADDRESS`
    pub address: String,

    /// SMTP password. For Gmail this must be an app password.
    /// Environment variable: `EMAIL_PASSWORD`
    pub password: String,

    /// Environment variable: `EMAIL_TO` (defaults to the sender)
    pub recipient: String,

    /// Environment variable: `EMAIL_SUBJECT`
    pub subject: String,

    /// Connect/read timeout for the SMTP session.
    /// Environment variable: `SMTP_TIMEOUT_SECS`
    pub timeout: Duration,
}

impl fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("address", &self.address)
            .field("password", &"<redacted>")
            .field("recipient", &self.recipient)
            .field("subject", &self.subject)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value cannot be parsed:
    /// - `SERIAL_PORT`: Serial device (default: "/dev/ttyUSB0")
    /// - `BAUD_RATE`: Baud rate (default: "115200")
    /// - `COMPLETION_MARKER`: Completion marker (default: "M31")
    /// - `WATCH_TIMEOUT_SECS`: Give up waiting after N seconds (default: wait forever)
    /// - `CAMERA_INDEX`: Camera index (default: "0")
    /// - `IMAGE_PATH`: Output image (default: "3D_Print_Complete.png")
    /// - `FLIP_IMAGE`: Flip the frame vertically (default: "false")
    /// - `SMTP_HOST`: SMTP server (default: "smtp.gmail.com")
    /// - `SMTP_PORT`: SMTP port (default: "587")
    /// - `EMAIL_ADDRESS`: Sender address and login (required)
    /// - `EMAIL_PASSWORD`: SMTP password (required)
    /// - `EMAIL_TO`: Recipient (default: `EMAIL_ADDRESS`)
    /// - `EMAIL_SUBJECT`: Subject line (default: "3D Printing Complete")
    /// - `SMTP_TIMEOUT_SECS`: SMTP timeout (default: "30")
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("SERIAL_PORT").unwrap_or_else(|| constants::DEFAULT_SERIAL_PORT.into());
        let baud_rate = parse_or("BAUD_RATE", &lookup, constants::DEFAULT_BAUD_RATE)?;

        let marker = lookup("COMPLETION_MARKER")
            .unwrap_or_else(|| constants::DEFAULT_COMPLETION_MARKER.to_string());
        if marker.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "COMPLETION_MARKER".into(),
                value: marker,
                reason: "marker must not be empty".into(),
            });
        }

        let timeout = parse_optional::<u64, _>("WATCH_TIMEOUT_SECS", &lookup)?
            .map(Duration::from_secs);

        let index = parse_or("CAMERA_INDEX", &lookup, 0u32)?;
        let output_path = PathBuf::from(
            lookup("IMAGE_PATH").unwrap_or_else(|| constants::DEFAULT_IMAGE_FILE.to_string()),
        );
        let flip_vertical = parse_or("FLIP_IMAGE", &lookup, false)?;

        let smtp_host =
            lookup("SMTP_HOST").unwrap_or_else(|| constants::DEFAULT_SMTP_HOST.to_string());
        let smtp_port = parse_or("SMTP_PORT", &lookup, constants::DEFAULT_SMTP_PORT)?;
        let address = required("EMAIL_ADDRESS", &lookup)?;
        let password = required("EMAIL_PASSWORD", &lookup)?;
        let recipient = lookup("EMAIL_TO").unwrap_or_else(|| address.clone());
        let subject =
            lookup("EMAIL_SUBJECT").unwrap_or_else(|| constants::DEFAULT_SUBJECT.to_string());
        let smtp_timeout = parse_or(
            "SMTP_TIMEOUT_SECS",
            &lookup,
            constants::DEFAULT_SMTP_TIMEOUT_SECONDS,
        )?;

        Ok(Config {
            serial: SerialConfig {
                port,
                baud_rate,
                marker,
                timeout,
            },
            camera: CameraConfig {
                index,
                output_path,
                flip_vertical,
            },
            email: EmailConfig {
                smtp_host,
                smtp_port,
                address,
                password,
                recipient,
                subject,
                timeout: Duration::from_secs(smtp_timeout),
            },
        })
    }
}

fn required<F>(name: &str, lookup: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnvVar {
            var_name: name.to_string(),
        }),
    }
}

fn parse_optional<T, F>(name: &str, lookup: &F) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                field: name.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

fn parse_or<T, F>(name: &str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_optional(name, lookup)?.unwrap_or(default))
}

/// Application constants used throughout the system.
pub mod constants {
    use std::time::Duration;

    /// Serial device used when `SERIAL_PORT` is unset.
    pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";

    /// Ender 3 V2 firmware talks at 115200 baud.
    pub const DEFAULT_BAUD_RATE: u32 = 115200;

    /// M31 (print time report) is emitted when a print job ends.
    pub const DEFAULT_COMPLETION_MARKER: &str = "M31";

    pub const DEFAULT_IMAGE_FILE: &str = "3D_Print_Complete.png";

    pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";

    /// STARTTLS submission port.
    pub const DEFAULT_SMTP_PORT: u16 = 587;

    pub const DEFAULT_SUBJECT: &str = "3D Printing Complete";

    pub const DEFAULT_SMTP_TIMEOUT_SECONDS: u64 = 30;

    /// How long a single serial read may block before the watcher re-checks
    /// its deadline and cancel token.
    pub const SERIAL_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Longest serial line inspected for the marker. Longer runs of bytes
    /// without a newline (e.g. noise from a baud mismatch) are dropped.
    pub const MAX_LINE_BYTES: usize = 4096;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_credentials_are_set() {
        let config = Config::from_lookup(lookup_from(&[
            ("EMAIL_ADDRESS", "maker@example.com"),
            ("EMAIL_PASSWORD", "app-password"),
        ]))
        .unwrap();

        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.serial.marker, "M31");
        assert_eq!(config.serial.timeout, None);
        assert_eq!(config.camera.index, 0);
        assert_eq!(
            config.camera.output_path,
            PathBuf::from("3D_Print_Complete.png")
        );
        assert!(!config.camera.flip_vertical);
        assert_eq!(config.email.smtp_host, "smtp.gmail.com");
        assert_eq!(config.email.smtp_port, 587);
        assert_eq!(config.email.recipient, "maker@example.com");
        assert_eq!(config.email.subject, "3D Printing Complete");
        assert_eq!(config.email.timeout, Duration::from_secs(30));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("SERIAL_PORT", "COM27"),
            ("BAUD_RATE", "250000"),
            ("COMPLETION_MARKER", "Done printing"),
            ("WATCH_TIMEOUT_SECS", "3600"),
            ("CAMERA_INDEX", "2"),
            ("FLIP_IMAGE", "true"),
            ("SMTP_PORT", "2525"),
            ("EMAIL_ADDRESS", "maker@example.com"),
            ("EMAIL_PASSWORD", "app-password"),
            ("EMAIL_TO", "someone@example.org"),
        ]))
        .unwrap();

        assert_eq!(config.serial.port, "COM27");
        assert_eq!(config.serial.baud_rate, 250000);
        assert_eq!(config.serial.marker, "Done printing");
        assert_eq!(config.serial.timeout, Some(Duration::from_secs(3600)));
        assert_eq!(config.camera.index, 2);
        assert!(config.camera.flip_vertical);
        assert_eq!(config.email.smtp_port, 2525);
        assert_eq!(config.email.recipient, "someone@example.org");
    }

    #[test]
    fn missing_password_is_reported_by_name() {
        let err = Config::from_lookup(lookup_from(&[("EMAIL_ADDRESS", "maker@example.com")]))
            .unwrap_err();
        match err {
            ConfigError::MissingEnvVar { var_name } => assert_eq!(var_name, "EMAIL_PASSWORD"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_numbers_and_empty_marker_are_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("BAUD_RATE", "fast"),
            ("EMAIL_ADDRESS", "maker@example.com"),
            ("EMAIL_PASSWORD", "app-password"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "BAUD_RATE"));

        let err = Config::from_lookup(lookup_from(&[
            ("COMPLETION_MARKER", ""),
            ("EMAIL_ADDRESS", "maker@example.com"),
            ("EMAIL_PASSWORD", "app-password"),
        ]))
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "COMPLETION_MARKER")
        );
    }

    #[test]
    fn debug_output_hides_the_password() {
        let config = Config::from_lookup(lookup_from(&[
            ("EMAIL_ADDRESS", "maker@example.com"),
            ("EMAIL_PASSWORD", "hunter2"),
        ]))
        .unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
