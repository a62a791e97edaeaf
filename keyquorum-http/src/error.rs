use std::{error::Error, fmt};

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;

use keyquorum_core::{actix_web, anyhow, serde_json};
use keyquorum_encryption::EnvelopeError;
use keyquorum_kms::KmsError;

/// Protocol errors of approval tasks, shared by the coordinator and approver endpoints
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApprovalError {
    DuplicateTask,
    UnknownTask,
    DuplicateVote,
    TaskAlreadyTerminal,
    UnknownApprover,
    EmptyApproverSet,
    DuplicateApprover,
    InvalidThreshold,
}

impl fmt::Display for ApprovalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Error for ApprovalError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HttpError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Rejected,
    BadGateway(String),
    ServerError,
}

impl HttpError {
    fn name(&self) -> &'static str {
        match self {
            HttpError::BadRequest(_) => "BadRequest",
            HttpError::NotFound(_) => "NotFound",
            HttpError::Conflict(_) => "Conflict",
            HttpError::Rejected => "Rejected",
            HttpError::BadGateway(_) => "BadGateway",
            HttpError::ServerError => "ServerError",
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HttpError::BadRequest(msg)
            | HttpError::NotFound(msg)
            | HttpError::Conflict(msg)
            | HttpError::BadGateway(msg) => write!(f, "{}", msg),
            HttpError::Rejected => write!(f, "Rejected"),
            HttpError::ServerError => write!(f, "ServerError"),
        }
    }
}

impl Error for HttpError {}

impl ResponseError for HttpError {
    fn error_response(&self) -> HttpResponse {
        let body = json!({
            "error": self.name(),
            "message": self.to_string(),
        });

        HttpResponse::build(self.status_code()).json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::Conflict(_) => StatusCode::CONFLICT,
            HttpError::Rejected => StatusCode::FORBIDDEN,
            HttpError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            HttpError::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ApprovalError> for HttpError {
    fn from(err: ApprovalError) -> Self {
        let msg = err.to_string();
        match err {
            ApprovalError::UnknownTask => HttpError::NotFound(msg),
            ApprovalError::DuplicateTask
            | ApprovalError::DuplicateVote
            | ApprovalError::TaskAlreadyTerminal => HttpError::Conflict(msg),
            ApprovalError::UnknownApprover
            | ApprovalError::EmptyApproverSet
            | ApprovalError::DuplicateApprover
            | ApprovalError::InvalidThreshold => HttpError::BadRequest(msg),
        }
    }
}

impl From<KmsError> for HttpError {
    fn from(err: KmsError) -> Self {
        let msg = err.to_string();
        match err {
            KmsError::KmsUnavailable(_) => HttpError::BadGateway(msg),
            KmsError::KeyNotFound(_) => HttpError::NotFound(msg),
            KmsError::UnsupportedKeyType(_) | KmsError::InvalidWrappedKey => {
                HttpError::BadRequest(msg)
            }
        }
    }
}

impl From<EnvelopeError> for HttpError {
    fn from(err: EnvelopeError) -> Self {
        HttpError::BadRequest(err.to_string())
    }
}

/// Recovers the protocol error carried by an `anyhow::Error`, or a bare `ServerError`
pub fn http_error(err: anyhow::Error) -> HttpError {
    let err = match err.downcast::<HttpError>() {
        Ok(err) => return err,
        Err(err) => err,
    };
    let err = match err.downcast::<ApprovalError>() {
        Ok(err) => return err.into(),
        Err(err) => err,
    };
    let err = match err.downcast::<KmsError>() {
        Ok(err) => return err.into(),
        Err(err) => err,
    };
    err.downcast::<EnvelopeError>()
        .map(HttpError::from)
        .unwrap_or(HttpError::ServerError)
}
