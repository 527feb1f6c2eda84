use std::borrow::BorrowMut;

use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{auth, channel, parties, schemas, serialized, sse};

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::user,
        channel::channel,
        sse::event_stream,
        parties::list_parties,
        parties::my_parties,
        parties::party,
        parties::create_party,
        parties::delete_party,
        parties::join_party,
        parties::leave_party,
        parties::kick_member,
        parties::add_member,
        parties::request_join,
        parties::join_requests,
        parties::resolve_join_request,
        parties::messages,
        parties::send_message,
    ),
    components(schemas(
        serialized::User,
        serialized::PartyType,
        serialized::Party,
        serialized::JoinRequest,
        serialized::JoinResult,
        serialized::Message,
        schemas::NewPartySchema,
        schemas::UserSchema,
        schemas::MessageSchema,
        schemas::ResolveAction,
        schemas::ResolveRequestSchema,
        sse::LobbyEvent,
    )),
    modifiers(&Security),
    info(
        description = "aura-server exposes watch parties, their room channel, and lobby events"
    )
)]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.borrow_mut() {
            let scheme = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("Bearer <token>")
                .build();

            components.add_security_scheme("BearerAuth", SecurityScheme::Http(scheme))
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_every_party_route() {
        let api = ApiDoc::openapi();
        let paths = api.paths.paths;

        for path in [
            "/v1/parties",
            "/v1/parties/{id}/requests/{request_id}",
            "/v1/parties/{id}/add-member",
            "/v1/channel",
            "/v1/events",
        ] {
            assert!(paths.contains_key(path), "{path} is documented");
        }
    }
}
