//! Push delivery verification helper.
//!
//! Subscribers of the webhook bus receive one POST per notification. The
//! body is a JSON [`NotificationRepresentation`]; the metadata headers repeat
//! its type name, id and occurrence time.

use crate::objects::NotificationRepresentation;
use crate::signature::{SignatureError, verify_body};

/// A verified push delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct PushedNotification {
    /// The `Notilog-Notification-Id` header value.
    pub message_id: String,
    pub notification: NotificationRepresentation,
}

/// Verify and deserialize an incoming push delivery.
///
/// * `signature_header` – value of the `Notilog-Signature` header.
/// * `message_id_header` – value of the `Notilog-Notification-Id` header.
/// * `body` – raw request body.
/// * `secret` – the subscriber secret shared with the server.
///
/// Deliveries are at-least-once: deduplicate on `notification.id`.
pub fn verify_push(
    signature_header: &str,
    message_id_header: &str,
    body: &[u8],
    secret: &[u8],
) -> Result<PushedNotification, SignatureError> {
    verify_body(signature_header, body, secret)?;
    let notification: NotificationRepresentation = serde_json::from_slice(body)?;
    if notification.id.to_string() != message_id_header {
        return Err(SignatureError::SignatureMismatch);
    }
    Ok(PushedNotification {
        message_id: message_id_header.to_owned(),
        notification,
    })
}
