//! Response envelope builder — the gateway's uniform response contract.
//!
//! Every route returns either `{"success":true,"data":…,"timestamp":…}` or
//! `{"success":false,"error":{"kind":…,"message":…}}`; exactly one of the
//! two shapes, never a mix. Gracefully degraded responses are still
//! successes but carry a `degraded` list naming the optional sources that
//! failed, so callers can tell "fully fresh" from "enrichment missing".

use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;

use crate::StatusCode;
use crate::aggregate::GatewayError;

/// Machine-readable failure kinds exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UpstreamTimeout,
    UpstreamUnavailable,
    NotFound,
    InternalJoinError,
    Internal,
}

impl ErrorKind {
    /// The `kind` string written into error envelopes.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UpstreamTimeout => "UpstreamTimeout",
            Self::UpstreamUnavailable => "UpstreamUnavailable",
            Self::NotFound => "NotFound",
            Self::InternalJoinError => "InternalJoinError",
            Self::Internal => "Internal",
        }
    }

    /// The HTTP status this failure maps to.
    pub fn status(self) -> StatusCode {
        match self {
            Self::UpstreamTimeout => StatusCode::GatewayTimeout,
            Self::UpstreamUnavailable => StatusCode::BadGateway,
            Self::NotFound => StatusCode::NotFound,
            Self::InternalJoinError | Self::Internal => StatusCode::InternalServerError,
        }
    }
}

impl From<&GatewayError> for ErrorKind {
    fn from(err: &GatewayError) -> Self {
        match err {
            GatewayError::UpstreamTimeout { .. } => Self::UpstreamTimeout,
            GatewayError::UpstreamUnavailable { .. } => Self::UpstreamUnavailable,
            GatewayError::NotFound { .. } => Self::NotFound,
            GatewayError::Join(_) => Self::InternalJoinError,
            GatewayError::Encode(_) | GatewayError::Internal(_) => Self::Internal,
        }
    }
}

#[derive(Serialize)]
struct SuccessEnvelope<'a, T: Serialize> {
    success: bool,
    data: &'a T,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    degraded: Option<&'a [&'a str]>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    kind: &'static str,
    message: &'a str,
}

#[derive(Serialize)]
struct FailureEnvelope<'a> {
    success: bool,
    error: ErrorBody<'a>,
}

fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Serializes a success envelope around `data`.
pub fn success<T: Serialize>(data: &T) -> Result<Bytes, GatewayError> {
    let body = serde_json::to_vec(&SuccessEnvelope {
        success: true,
        data,
        timestamp: timestamp(),
        degraded: None,
    })?;
    Ok(Bytes::from(body))
}

/// Serializes a degraded-success envelope: still `success:true`, with the
/// failed optional sources listed under `degraded`.
pub fn degraded<T: Serialize>(data: &T, sources: &[&str]) -> Result<Bytes, GatewayError> {
    let body = serde_json::to_vec(&SuccessEnvelope {
        success: true,
        data,
        timestamp: timestamp(),
        degraded: Some(sources),
    })?;
    Ok(Bytes::from(body))
}

/// Serializes a failure envelope with an explicit kind and message.
pub fn failure(kind: ErrorKind, message: &str) -> Bytes {
    let envelope = FailureEnvelope {
        success: false,
        error: ErrorBody {
            kind: kind.as_str(),
            message,
        },
    };
    // A three-field struct of strings cannot fail to serialize.
    let body = serde_json::to_vec(&envelope).unwrap_or_else(|_| {
        br#"{"success":false,"error":{"kind":"Internal","message":"encoding failure"}}"#.to_vec()
    });
    Bytes::from(body)
}

/// Maps a classified gateway error to its HTTP status and failure envelope.
pub fn from_error(err: &GatewayError) -> (StatusCode, Bytes) {
    let kind = ErrorKind::from(err);
    (kind.status(), failure(kind, &err.to_string()))
}
