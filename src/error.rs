use thiserror::Error;
use uuid::Uuid;

use crate::models::{AppPhase, DesignId};
use crate::orchestrator::BatchToken;

/// The submitted photo could not be turned into a preprocessed image.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid base64 payload: {0}")] Base64(#[from] base64::DecodeError),
    #[error("unreadable image: {0}")] Image(#[from] image::ImageError),
    #[error("empty image payload")] Empty,
    #[error("preprocessing task failed: {0}")] Task(String),
}

/// A single generate or edit call against the image backend failed.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("HTTP error: {0}")] Http(String),
    #[error("backend returned status={status} body={body}")] Status { status: u16, body: String },
    #[error("no image data in response")] EmptyResponse,
    #[error("Other: {0}")] Other(String),
}

/// Every style in a batch settled without producing a design.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("batch {token} produced no designs ({attempted} styles attempted)")]
pub struct BatchFailure {
    pub token: BatchToken,
    pub attempted: usize,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("missing {0}; provide a token and an owner/name repository")] MissingCredentials(&'static str),
    #[error("repository must look like owner/name, got {0:?}")] InvalidRepository(String),
    #[error("file path must not be empty")] EmptyPath,
    #[error("HTTP error: {0}")] Http(String),
    /// Provider refused the upload; `message` is the provider's own wording.
    #[error("{message}")] Rejected { status: u16, message: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} not found")] NotFound(Uuid),
    #[error("design {0} not found")] UnknownDesign(DesignId),
    #[error("cannot {action} while {from}")] InvalidTransition { from: AppPhase, action: &'static str },
    #[error("an edit is already in progress")] EditInFlight,
}

/// Everything the service layer can hand back to a caller.
#[derive(Debug, Error)]
pub enum StudioError {
    #[error(transparent)] Session(#[from] SessionError),
    #[error(transparent)] Decode(#[from] DecodeError),
    #[error(transparent)] Upload(#[from] UploadError),
}
