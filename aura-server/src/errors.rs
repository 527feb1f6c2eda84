use aura_collab::{DatabaseError, PartyError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource} not found")]
    NotFound { resource: &'static str },
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("Only the party admin can do this")]
    NotAuthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

/// Errors that prevent the server from starting
#[derive(Debug, Error)]
pub enum StartError {
    #[error("AURA_SERVER_PORT must be a number, got {0}")]
    InvalidPort(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::NotAuthorized => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound { resource, .. } => Self::NotFound { resource },
            DatabaseError::Conflict {
                resource,
                field,
                value,
            } => Self::Conflict {
                resource,
                field,
                value,
            },
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<PartyError> for ServerError {
    fn from(value: PartyError) -> Self {
        match value {
            PartyError::NotAuthorized => Self::NotAuthorized,
            PartyError::NotFound(resource) => Self::NotFound { resource },
            PartyError::Database(e) => e.into(),
            e @ (PartyError::NotAMember
            | PartyError::Validation(_)
            | PartyError::RequestAlreadyResolved) => Self::BadRequest(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_party_errors_map_to_statuses() {
        let cases = [
            (PartyError::NotAuthorized, StatusCode::FORBIDDEN),
            (PartyError::NotFound("party"), StatusCode::NOT_FOUND),
            (PartyError::NotAMember, StatusCode::BAD_REQUEST),
            (PartyError::RequestAlreadyResolved, StatusCode::BAD_REQUEST),
            (
                PartyError::Database(DatabaseError::Conflict {
                    resource: "party member",
                    field: "user_id",
                    value: "3".into(),
                }),
                StatusCode::CONFLICT,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(ServerError::from(error).as_status_code(), status);
        }
    }
}
