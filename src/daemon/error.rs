//! Boundary error codes and their HTTP rendering

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Rejection returned by the network boundary
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BoundaryError {
    #[error("{0}")]
    RoleInvalid(String),
    #[error("{0}")]
    SignatureMissing(String),
    #[error("{0}")]
    SignatureInvalid(String),
    #[error("{0}")]
    BadJson(String),
    #[error("{0}")]
    ShardInvalid(String),
    #[error("{0}")]
    TimestampInvalid(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    GossipPublishFailed(String),
    #[error("{0}")]
    NotFound(String),
    /// The node is not running
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl BoundaryError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            BoundaryError::RoleInvalid(_) => "ROLE_INVALID",
            BoundaryError::SignatureMissing(_) => "SIGNATURE_MISSING",
            BoundaryError::SignatureInvalid(_) => "SIGNATURE_INVALID",
            BoundaryError::BadJson(_) => "BAD_JSON",
            BoundaryError::ShardInvalid(_) => "SHARD_INVALID",
            BoundaryError::TimestampInvalid(_) => "TIMESTAMP_INVALID",
            BoundaryError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            BoundaryError::GossipPublishFailed(_) => "GOSSIP_PUBLISH_FAILED",
            BoundaryError::NotFound(_) => "NOT_FOUND",
            BoundaryError::Unavailable(_) => "NODE_UNAVAILABLE",
            BoundaryError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            BoundaryError::BadJson(_)
            | BoundaryError::ShardInvalid(_)
            | BoundaryError::TimestampInvalid(_) => StatusCode::BAD_REQUEST,
            BoundaryError::RoleInvalid(_)
            | BoundaryError::SignatureMissing(_)
            | BoundaryError::SignatureInvalid(_) => StatusCode::UNAUTHORIZED,
            BoundaryError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            BoundaryError::NotFound(_) => StatusCode::NOT_FOUND,
            BoundaryError::GossipPublishFailed(_)
            | BoundaryError::Unavailable(_)
            | BoundaryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show callers
    fn public_message(&self) -> String {
        match self {
            BoundaryError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<crate::error::Error> for BoundaryError {
    fn from(err: crate::error::Error) -> Self {
        BoundaryError::Internal(err.to_string())
    }
}

impl IntoResponse for BoundaryError {
    fn into_response(self) -> Response {
        if let BoundaryError::Internal(detail) = &self {
            tracing::error!("Internal boundary error: {}", detail);
        }
        let body = json!({
            "ok": false,
            "error": self.code(),
            "message": self.public_message(),
        });
        (self.status(), Json(body)).into_response()
    }
}
