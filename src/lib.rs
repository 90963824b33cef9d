//! Print Complete - photo email notification when a 3D print finishes.
//!
//! Watches the printer's serial output for the completion marker (`M31` on
//! Marlin-based printers such as the Ender 3 V2), takes one photo of the bed
//! with a webcam and emails it.
//!
//! # Core Components
//!
//! * [`config`] - Configuration loaded from environment variables
//! * [`printer`] - Serial connection to the printer
//! * [`detector`] - Completion marker detection on the serial line
//! * [`camera`] - Single-frame webcam capture
//! * [`alerts`] - Email notification over SMTP with STARTTLS
//! * [`error`] - Error types for each stage
//!
//! # Quick Start
//!
//! ```no_run
//! use print_complete::*;
//!
//! # fn main() -> Result<(), PrintCompleteError> {
//! let config = Config::load()?;
//!
//! let mut line = SerialLine::open(&config.serial)?;
//! CompletionWatcher::from_config(&config.serial).wait_for_completion(&mut line)?;
//!
//! let photo = camera::capture_image(&config.camera)?;
//! EmailNotifier::smtp(&config.email)?.send_image(&photo)?;
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod camera;
pub mod config;
pub mod detector;
pub mod error;
pub mod printer;

// Re-export commonly used types for convenience
pub use alerts::{EmailNotifier, Mailer};
pub use camera::{CameraCapture, FrameSource};
pub use config::Config;
pub use detector::{CancelToken, CompletionLine, CompletionWatcher, Interrupt};
pub use error::{CaptureError, ConfigError, NotifyError, PrintCompleteError, WatchError};
pub use printer::{LineSource, SerialLine};
