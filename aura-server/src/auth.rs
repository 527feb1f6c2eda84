use aura_collab::{SessionData, UserData};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Query},
    http::{header, request::Parts, StatusCode},
    routing::get,
    Json,
};
use serde::Deserialize;

use crate::{
    serialized::{ToSerialized, User},
    Router, ServerContext,
};

/// Wraps [SessionData] so [FromRequestParts] can be implemented for it
pub struct Session(SessionData);

#[derive(Deserialize)]
struct TokenQuery {
    token: String,
}

impl Session {
    /// Returns the user of the session
    pub fn user(&self) -> UserData {
        self.0.user.clone()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    ServerContext: FromRef<S>,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let context = ServerContext::from_ref(state);

        // Browsers can't set headers on websocket upgrades, so those pass the token in the query
        let token = match parts.headers.get(header::AUTHORIZATION) {
            Some(value) => {
                let value = value
                    .to_str()
                    .map_err(|_| (StatusCode::BAD_REQUEST, "Authorization must be Bearer"))?;

                let parts: Vec<_> = value.split_ascii_whitespace().collect();

                match parts.as_slice() {
                    ["Bearer", token] => token.to_string(),
                    _ => return Err((StatusCode::BAD_REQUEST, "Authorization must be Bearer")),
                }
            }
            None => Query::<TokenQuery>::try_from_uri(&parts.uri)
                .map(|q| q.0.token)
                .map_err(|_| (StatusCode::UNAUTHORIZED, "Missing authorization"))?,
        };

        let session = context
            .collab
            .database
            .session_by_token(&token)
            .await
            .map_err(|_| (StatusCode::UNAUTHORIZED, "Session does not exist"))?;

        Ok(Self(session))
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/user",
    tag = "auth",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = User),
        (status = 401, description = "Missing authorization")
    )
)]
async fn user(session: Session) -> Json<User> {
    Json(session.user().to_serialized())
}

pub fn router() -> Router {
    Router::new().route("/user", get(user))
}
