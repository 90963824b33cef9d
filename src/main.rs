use anyhow::{Context, Result};
use log::{error, info, warn};

use print_complete::{
    CancelToken, CompletionWatcher, Config, EmailNotifier, Interrupt, SerialLine, camera,
};

/// Print Complete - emails a photo of the print bed when a 3D print finishes.
///
/// Connect the printer over USB, point a webcam at the bed, then run the binary.
/// It waits for the completion marker on the serial line, takes one photo, emails
/// it, and exits.
///
/// # Environment Variables
///
/// Required:
/// * `EMAIL_ADDRESS` - Sender address and SMTP login
/// * `EMAIL_PASSWORD` - SMTP password (an app password for Gmail with 2FA)
///
/// Optional (with defaults):
/// * `SERIAL_PORT` - Printer serial device (default: "/dev/ttyUSB0")
/// * `BAUD_RATE` - Serial baud rate (default: "115200")
/// * `COMPLETION_MARKER` - Text that ends the wait (default: "M31")
/// * `WATCH_TIMEOUT_SECS` - Stop waiting after N seconds (default: never)
/// * `CAMERA_INDEX` - Webcam index (default: "0")
/// * `IMAGE_PATH` - Photo file (default: "3D_Print_Complete.png")
/// * `FLIP_IMAGE` - Flip the photo vertically (default: "false")
/// * `SMTP_HOST` / `SMTP_PORT` - Mail server (default: "smtp.gmail.com" / "587")
/// * `EMAIL_TO` - Recipient (default: `EMAIL_ADDRESS`)
/// * `EMAIL_SUBJECT` - Subject (default: "3D Printing Complete")
///
/// # Usage
///
/// ```bash
/// export SERIAL_PORT="/dev/ttyUSB0"
/// export EMAIL_ADDRESS="maker@gmail.com"
/// export EMAIL_PASSWORD="abcd efgh ijkl mnop"
/// ./print-complete
/// ```
fn main() -> Result<()> {
    // Initialize logger to output to stdout, using RUST_LOG env var or info level by default
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Stdout)
        .filter_level(
            std::env::var("RUST_LOG")
                .ok()
                .and_then(|level| level.parse().ok())
                .unwrap_or(log::LevelFilter::Info),
        )
        .init();

    let config = Config::load().context(
        "Failed to load configuration. Please ensure all required environment variables are set.",
    )?;

    info!("Print Complete starting...");
    info!(
        "Watching {} at {} baud for '{}'",
        config.serial.port, config.serial.baud_rate, config.serial.marker
    );

    if !camera::SUPPORTED {
        warn!(
            "Built without the 'camera' feature: the photo step will fail once the print completes"
        );
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_token.interrupt() == Interrupt::Terminate {
            std::process::exit(130);
        }
    })
    .context("Failed to set Ctrl+C handler")?;

    // Step 1: block until the printer reports completion
    let mut line = SerialLine::open(&config.serial)?;
    let completion = CompletionWatcher::from_config(&config.serial)
        .with_cancel_token(cancel.clone())
        .wait_for_completion(&mut line)
        .with_context(|| format!("Stopped watching {}", line.port_name()))?;
    cancel.finish();
    drop(line);

    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    info!(
        "{}: Print complete after {} serial lines",
        timestamp, completion.lines_read
    );

    // Step 2: one photo of the bed
    let photo = camera::capture_image(&config.camera).context("Failed to capture photo")?;

    // Step 3: email it; a failed send is reported but does not fail the run
    let sent = EmailNotifier::smtp(&config.email).and_then(|notifier| notifier.send_image(&photo));
    if let Err(e) = sent {
        error!("Error sending e-mail ({} failure): {}", e.kind(), e);
    }

    Ok(())
}
