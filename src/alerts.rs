use std::fs;
use std::path::Path;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::stub::StubTransport;
use lettre::{Message, SmtpTransport, Transport};
use log::info;

use crate::config::EmailConfig;
use crate::error::NotifyError;

/// Something that can deliver a finished email.
pub trait Mailer {
    fn deliver(&self, message: &Message) -> Result<(), NotifyError>;
}

impl Mailer for SmtpTransport {
    fn deliver(&self, message: &Message) -> Result<(), NotifyError> {
        self.send(message).map(|_| ()).map_err(classify_smtp_error)
    }
}

impl Mailer for StubTransport {
    fn deliver(&self, message: &Message) -> Result<(), NotifyError> {
        self.send(message).map_err(|e| NotifyError::Rejected {
            reason: e.to_string(),
        })
    }
}

/// Email notification service for print completion photos.
///
/// Builds a multipart message (short text part plus the photo as an
/// attachment) and hands it to a [`Mailer`]. One attempt, no retry.
pub struct EmailNotifier<M> {
    mailer: M,
    from: Mailbox,
    to: Mailbox,
    subject: String,
}

impl EmailNotifier<SmtpTransport> {
    /// Create a notifier that sends through the configured SMTP server.
    ///
    /// The connection is upgraded with STARTTLS before logging in with the
    /// configured address and password.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS parameters for the host cannot be built or
    /// an address in the configuration is invalid.
    pub fn smtp(config: &EmailConfig) -> Result<Self, NotifyError> {
        let transport = SmtpTransport::starttls_relay(&config.smtp_host)
            .map_err(classify_smtp_error)?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.address.clone(),
                config.password.clone(),
            ))
            .timeout(Some(config.timeout))
            .build();

        Self::with_mailer(transport, config)
    }
}

impl<M: Mailer> EmailNotifier<M> {
    /// Create a notifier around an arbitrary mailer.
    pub fn with_mailer(mailer: M, config: &EmailConfig) -> Result<Self, NotifyError> {
        Ok(Self {
            mailer,
            from: parse_mailbox(&config.address)?,
            to: parse_mailbox(&config.recipient)?,
            subject: config.subject.clone(),
        })
    }

    pub fn mailer(&self) -> &M {
        &self.mailer
    }

    /// Build the notification email for `image_path` without sending it.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Io`] if the image cannot be read, or
    /// [`NotifyError::Message`] if the message cannot be assembled.
    pub fn build_message(&self, image_path: &Path) -> Result<Message, NotifyError> {
        let image_data = fs::read(image_path).map_err(|source| NotifyError::Io {
            path: image_path.display().to_string(),
            source,
        })?;

        let filename = image_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "print.png".to_string());

        let body = format!(
            "Your 3D print finished at {}.\nA photo of the print bed is attached.",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );

        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(self.subject.clone())
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(body))
                    .singlepart(
                        Attachment::new(filename).body(image_data, content_type_for(image_path)),
                    ),
            )
            .map_err(|e| NotifyError::Message {
                reason: e.to_string(),
            })
    }

    /// Read `image_path` and email it.
    ///
    /// # Errors
    ///
    /// The returned [`NotifyError`] tells apart file, connection,
    /// authentication and rejection failures.
    pub fn send_image(&self, image_path: &Path) -> Result<(), NotifyError> {
        let message = self.build_message(image_path)?;
        self.mailer.deliver(&message)?;

        info!("Email with photo attachment sent to {}", self.to);
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse::<Mailbox>().map_err(|e| NotifyError::Message {
        reason: format!("invalid address '{}': {}", address, e),
    })
}

/// MIME type for the attachment, picked from the file extension.
fn content_type_for(path: &Path) -> ContentType {
    let mime = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    };
    ContentType::parse(mime).unwrap_or(ContentType::TEXT_PLAIN)
}

fn classify_smtp_error(err: lettre::transport::smtp::Error) -> NotifyError {
    let status = err.status().map(|code| code.to_string());
    let reason = err.to_string();
    kind_for_status(
        status.as_deref(),
        err.is_permanent() || err.is_transient(),
        reason,
    )
}

/// Map an SMTP reply code onto a failure kind.
///
/// 530/534/535 are the authentication replies. 454 is also sent when
/// STARTTLS is unavailable, so it counts as a connection failure along with
/// failures that never got a reply. Any other server reply is a rejection.
fn kind_for_status(status: Option<&str>, is_server_reply: bool, reason: String) -> NotifyError {
    match status {
        Some("530" | "534" | "535") => NotifyError::Authentication { reason },
        Some("454") => NotifyError::Connection { reason },
        _ if is_server_reply => NotifyError::Rejected { reason },
        _ => NotifyError::Connection { reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_type_follows_extension() {
        assert_eq!(
            content_type_for(Path::new("3D_Print_Complete.png")),
            ContentType::parse("image/png").unwrap()
        );
        assert_eq!(
            content_type_for(Path::new("bed.JPG")),
            ContentType::parse("image/jpeg").unwrap()
        );
        assert_eq!(
            content_type_for(Path::new("capture")),
            ContentType::parse("application/octet-stream").unwrap()
        );
    }

    #[test]
    fn smtp_reply_codes_map_to_failure_kinds() {
        assert!(matches!(
            kind_for_status(Some("535"), true, "bad credentials".into()),
            NotifyError::Authentication { .. }
        ));
        assert!(matches!(
            kind_for_status(Some("554"), true, "spam".into()),
            NotifyError::Rejected { .. }
        ));
        assert!(matches!(
            kind_for_status(Some("454"), true, "TLS not available".into()),
            NotifyError::Connection { .. }
        ));
        assert!(matches!(
            kind_for_status(None, false, "connection refused".into()),
            NotifyError::Connection { .. }
        ));
    }
}
