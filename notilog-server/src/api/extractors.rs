//! Custom Axum extractors for request authentication.
//!
//! Provides:
//! - `SignedBody<T>`: verifies the `Notilog-Signature` header against a signed
//!   JSON body (used by event ingestion).
//! - `AdminAuth`: checks the `Notilog-Admin-Authorization` header against the
//!   argon2-hashed admin secret (used by the admin API).
//!
//! All cryptographic operations on bodies are delegated to [`notilog_sdk::signature`].

use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use notilog_sdk::signature::{
    ADMIN_AUTH_HEADER, SIGNATURE_HEADER, Signature, SignatureError, SignedObject,
};

use crate::state::AppState;

/// Largest accepted event body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// SignedBody - producer authentication via signed JSON body
// ---------------------------------------------------------------------------

/// An Axum extractor that verifies the `Notilog-Signature` header and
/// deserializes + authenticates the JSON request body.
///
/// # Header format
///
/// ```text
/// Notilog-Signature: {unix_timestamp}.{base64_signature}
/// ```
///
/// The signature is computed as `HMAC-SHA256("{timestamp}.{json_body}", producer_secret)`.
pub struct SignedBody<T: Signature>(pub T);

/// Errors that can occur during signed-body verification.
#[derive(Debug, thiserror::Error)]
pub enum SignedBodyError {
    #[error("missing Notilog-Signature header")]
    MissingHeader,
    #[error("invalid Notilog-Signature header format")]
    InvalidHeader,
    #[error("invalid signature encoding")]
    InvalidBase64,
    #[error("failed to read request body")]
    BodyReadError,
    #[error("invalid JSON body: {0}")]
    JsonError(serde_json::Error),
    #[error("signature verification failed")]
    VerificationFailed,
}

impl From<SignatureError> for SignedBodyError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::InvalidFormat => Self::InvalidHeader,
            SignatureError::InvalidBase64 => Self::InvalidBase64,
            SignatureError::Json(e) => Self::JsonError(e),
            SignatureError::SignatureMismatch | SignatureError::Expired => Self::VerificationFailed,
        }
    }
}

impl IntoResponse for SignedBodyError {
    fn into_response(self) -> Response {
        let status = match self {
            SignedBodyError::MissingHeader | SignedBodyError::VerificationFailed => {
                StatusCode::UNAUTHORIZED
            }
            SignedBodyError::InvalidHeader
            | SignedBodyError::InvalidBase64
            | SignedBodyError::BodyReadError
            | SignedBodyError::JsonError(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

impl<T: Signature + Send> FromRequest<AppState> for SignedBody<T> {
    type Rejection = SignedBodyError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let header_value = req
            .headers()
            .get(SIGNATURE_HEADER)
            .ok_or(SignedBodyError::MissingHeader)?
            .to_str()
            .map_err(|_| SignedBodyError::InvalidHeader)?
            .to_owned();

        let body_bytes = axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|_| SignedBodyError::BodyReadError)?;

        let json =
            String::from_utf8(body_bytes.to_vec()).map_err(|_| SignedBodyError::BodyReadError)?;

        let signed = SignedObject::<T>::from_header_and_body(&header_value, json)?;

        let producer = state.config.producer.read().await;
        let verified_body = signed.verify(producer.secret_bytes())?;
        drop(producer);

        Ok(SignedBody(verified_body))
    }
}

// ---------------------------------------------------------------------------
// AdminAuth - admin API authentication
// ---------------------------------------------------------------------------

/// Marker extractor: the request carried the admin secret.
pub struct AdminAuth;

#[derive(Debug, thiserror::Error)]
pub enum AdminAuthError {
    #[error("missing Notilog-Admin-Authorization header")]
    MissingHeader,
    #[error("invalid admin secret")]
    InvalidSecret,
}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AdminAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let secret = parts
            .headers
            .get(ADMIN_AUTH_HEADER)
            .ok_or(AdminAuthError::MissingHeader)?
            .to_str()
            .map_err(|_| AdminAuthError::InvalidSecret)?;

        let admin = state.config.admin.read().await.clone();
        if !admin.verify_secret(secret) {
            tracing::warn!("Rejected admin request with a wrong secret");
            return Err(AdminAuthError::InvalidSecret);
        }
        Ok(AdminAuth)
    }
}
