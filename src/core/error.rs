// Centralized error handling for the tracker

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

use crate::db::StoreError;
use crate::models::admin::StatusResp;
use crate::proto::response::encode_failure;

/// Errors produced by the announce path.
///
/// Every variant maps to a bencoded `failure reason` body carried over
/// HTTP 200; non-2xx statuses are reserved for transport faults. The
/// variant messages below are the exact client-visible reasons.
#[derive(Error, Debug)]
pub enum AnnounceError {
    #[error("malformed request")]
    Malformed,

    #[error("invalid info hash")]
    InvalidInfoHash,

    #[error("unauthorized")]
    Unauthorized,

    #[error("client not allowed")]
    ClientNotAllowed,

    /// Torrent disabled by an operator; the stored reason passes through to
    /// the client verbatim.
    #[error("{0}")]
    TorrentDisabled(String),

    #[error("announce too frequent")]
    RequestTooFrequent,

    #[error("not supported")]
    NotSupported,

    #[error("internal error")]
    Internal,
}

impl From<StoreError> for AnnounceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AnnounceError::InvalidInfoHash,
            _ => AnnounceError::Internal,
        }
    }
}

impl IntoResponse for AnnounceError {
    fn into_response(self) -> Response {
        let body = encode_failure(&self.to_string());

        Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain")
            .body(body.into())
            .expect("static response construction")
    }
}

/// Errors produced by the admin JSON surface.
#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Invalid API key")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AdminError {
    /// Store failures on a named entity keep the entity in the message.
    pub fn from_store(err: StoreError, entity: &str) -> Self {
        match err {
            StoreError::NotFound => AdminError::NotFound(format!("{} not found", entity)),
            StoreError::Duplicate => AdminError::Duplicate(format!("{} already exists", entity)),
            StoreError::Backend(e) => AdminError::Internal(e),
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdminError::Unauthorized => StatusCode::UNAUTHORIZED,
            AdminError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AdminError::NotFound(_) => StatusCode::NOT_FOUND,
            AdminError::Duplicate(_) => StatusCode::CONFLICT,
            AdminError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(StatusResp {
                error: Some(self.to_string()),
                message: None,
            }),
        )
            .into_response()
    }
}
