use rocket::{
    http::{Status, StatusClass},
    response::{self, status::Custom, Responder},
    Request,
};
use thiserror::Error;

use crate::model::signature::SignatureError;

pub type Result<T> = std::result::Result<T, Error>;

/// Every way a request to either server can fail.
#[derive(Debug, Error)]
pub enum Error {
    // Authentication.
    #[error("Invalid identity or secret")]
    AuthenticationFailed,
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Cryptographic verification.
    #[error("Signature verification failed: {0}")]
    Verification(#[from] SignatureError),
    #[error("Failed to sign payload: {0}")]
    Signing(#[from] rsa::signature::Error),

    // State conflicts.
    #[error("Validation number has already been submitted")]
    DuplicateToken,
    #[error("Tracking ID is already in use")]
    DuplicateTracking,
    #[error("Validation number does not exist")]
    UnknownToken,
    #[error("Validation number has already voted")]
    AlreadySpent,
    #[error("Invalid vote: no candidate named '{0}'")]
    InvalidCandidate(String),

    // Election lifecycle.
    #[error("Voting has ended")]
    Closed,
    #[error("Voting has already ended")]
    AlreadyClosed,
    #[error("Voting has not ended")]
    NotClosed,

    // Counterpart service.
    #[error("Could not retrieve voters: {0}")]
    CertificationUnavailable(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl Error {
    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::AuthenticationFailed | Self::AlreadySpent => Status::Forbidden,
            Self::Unauthorized(_) | Self::UnknownToken | Self::Closed | Self::NotClosed => {
                Status::Unauthorized
            }
            Self::Verification(_) | Self::InvalidCandidate(_) | Self::BadRequest(_) => {
                Status::BadRequest
            }
            Self::DuplicateToken | Self::DuplicateTracking | Self::AlreadyClosed => {
                Status::Conflict
            }
            Self::CertificationUnavailable(_) => Status::BadGateway,
            Self::Signing(_) => Status::InternalServerError,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        match status.class() {
            StatusClass::ServerError => error!("{} {}: {self}", req.method(), req.uri()),
            _ => warn!("{} {}: {self}", req.method(), req.uri()),
        }
        Custom(status, self.to_string()).respond_to(req)
    }
}
