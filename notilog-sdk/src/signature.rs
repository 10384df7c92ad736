//! Signature algorithm and verification for notilog.
//!
//! Two places carry an HMAC-SHA256 signature:
//!
//! * **Event ingestion** (`POST /events`): the producer signs the JSON body
//!   with the producer secret.
//! * **Push delivery** (webhook bus): the publisher signs every notification
//!   body with the subscriber's secret.
//!
//! In both cases the signed data is `"{timestamp}." ++ body` and the header
//! wire format is:
//!
//! ```text
//! Notilog-Signature: {unix_timestamp}.{base64_signature}
//! ```

use ring::hmac;

/// Header name for the HMAC signature.
pub const SIGNATURE_HEADER: &str = "Notilog-Signature";

/// Header name for admin API authentication (plaintext secret).
pub const ADMIN_AUTH_HEADER: &str = "Notilog-Admin-Authorization";

/// Push metadata: the notification's event type name.
pub const TYPE_NAME_HEADER: &str = "Notilog-Type-Name";

/// Push metadata: the notification id as a decimal string.
pub const NOTIFICATION_ID_HEADER: &str = "Notilog-Notification-Id";

/// Push metadata: the RFC 3339 occurrence timestamp.
pub const OCCURRED_ON_HEADER: &str = "Notilog-Occurred-On";

/// Maximum allowed age of a signature (in seconds).
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

/// Marker trait for request bodies that can be signed via [`SignedObject`].
pub trait Signature: for<'de> serde::Deserialize<'de> + serde::Serialize {}

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

fn signing_input(timestamp: i64, body: &[u8]) -> Vec<u8> {
    let prefix = format!("{timestamp}.");
    let mut data = Vec::with_capacity(prefix.len() + body.len());
    data.extend_from_slice(prefix.as_bytes());
    data.extend_from_slice(body);
    data
}

// ---------------------------------------------------------------------------
// Raw body signing
// ---------------------------------------------------------------------------

/// Sign `body` at the given timestamp and return the header value.
pub fn sign_body_at(body: &[u8], key: &[u8], timestamp: i64) -> String {
    let tag = hmac::sign(
        &hmac::Key::new(hmac::HMAC_SHA256, key),
        &signing_input(timestamp, body),
    );
    format_signature_header(timestamp, tag.as_ref())
}

/// Sign `body` with the current time and return the header value.
pub fn sign_body(body: &[u8], key: &[u8]) -> String {
    sign_body_at(body, key, time::OffsetDateTime::now_utc().unix_timestamp())
}

/// Verify a `Notilog-Signature` header value against a raw body.
pub fn verify_body(header_value: &str, body: &[u8], key: &[u8]) -> Result<(), SignatureError> {
    let (timestamp, signature) = parse_signature_header(header_value)?;
    hmac::verify(
        &hmac::Key::new(hmac::HMAC_SHA256, key),
        &signing_input(timestamp, body),
        &signature,
    )?;
    check_timestamp(timestamp)
}

// ---------------------------------------------------------------------------
// SignedObject - typed JSON body signing
// ---------------------------------------------------------------------------

/// A signed request body carrying its typed payload, timestamp, raw JSON,
/// and HMAC-SHA256 signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedObject<T: Signature> {
    pub body: T,
    pub timestamp: i64,
    pub json: String,
    pub signature: Box<[u8]>,
}

impl<T: Signature> SignedObject<T> {
    /// Serialize `body` and sign it with the current time.
    pub fn new(body: T, key: &[u8]) -> Result<Self, serde_json::Error> {
        let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
        let json = serde_json::to_string(&body)?;
        let tag = hmac::sign(
            &hmac::Key::new(hmac::HMAC_SHA256, key),
            &signing_input(timestamp, json.as_bytes()),
        );
        Ok(Self {
            body,
            timestamp,
            json,
            signature: tag.as_ref().to_owned().into_boxed_slice(),
        })
    }

    /// Reconstruct a [`SignedObject`] from a raw header value and the JSON
    /// request body.
    ///
    /// This parses the header and deserializes the body but does **not**
    /// verify the HMAC - call [`verify`](Self::verify) for that.
    pub fn from_header_and_body(
        header_value: &str,
        body_json: String,
    ) -> Result<Self, SignatureError> {
        let (timestamp, signature) = parse_signature_header(header_value)?;
        let body: T = serde_json::from_str(&body_json)?;
        Ok(Self {
            body,
            timestamp,
            json: body_json,
            signature,
        })
    }

    /// Verify the HMAC signature and timestamp freshness, consuming `self`
    /// and returning the authenticated payload.
    pub fn verify(self, key: &[u8]) -> Result<T, SignatureError> {
        hmac::verify(
            &hmac::Key::new(hmac::HMAC_SHA256, key),
            &signing_input(self.timestamp, self.json.as_bytes()),
            self.signature.as_ref(),
        )?;
        check_timestamp(self.timestamp)?;
        Ok(self.body)
    }

    /// Format the full `Notilog-Signature` header value.
    pub fn to_header(&self) -> String {
        format_signature_header(self.timestamp, &self.signature)
    }
}

// ---------------------------------------------------------------------------
// Header parsing / formatting
// ---------------------------------------------------------------------------

/// Parse a `{timestamp}.{base64}` header value into its parts.
pub fn parse_signature_header(value: &str) -> Result<(i64, Box<[u8]>), SignatureError> {
    let (timestamp, signature) = value.split_once('.').ok_or(SignatureError::InvalidFormat)?;
    let timestamp: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidFormat)?;
    let signature = fast32::base64::RFC4648_NOPAD
        .decode_str(signature)
        .map_err(|_| SignatureError::InvalidBase64)?
        .into_boxed_slice();
    Ok((timestamp, signature))
}

/// Format a `{timestamp}.{base64}` header value from its parts.
pub fn format_signature_header(timestamp: i64, signature: &[u8]) -> String {
    format!(
        "{}.{}",
        timestamp,
        fast32::base64::RFC4648_NOPAD.encode(signature)
    )
}

/// Check that a signature timestamp is within [`MAX_SIGNATURE_AGE`].
pub fn check_timestamp(timestamp: i64) -> Result<(), SignatureError> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    if now - timestamp > MAX_SIGNATURE_AGE {
        return Err(SignatureError::Expired);
    }
    Ok(())
}
