use aura_collab::{NewPartyRequest, RequestAction};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json,
};

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{
        MessageSchema, NewPartySchema, ResolveAction, ResolveRequestSchema, UserSchema,
        ValidatedJson,
    },
    serialized::{JoinRequest, JoinResult, Message, Party, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/parties",
    tag = "parties",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Party>)
    )
)]
async fn list_parties(_session: Session, State(context): State<ServerContext>) -> Json<Vec<Party>> {
    Json(context.collab.parties.list_active().to_serialized())
}

#[utoipa::path(
    get,
    path = "/v1/parties/my",
    tag = "parties",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Party>, description = "The parties the user is a member of")
    )
)]
async fn my_parties(session: Session, State(context): State<ServerContext>) -> Json<Vec<Party>> {
    let user = session.user();

    Json(context.collab.parties.list_for_user(user.id).to_serialized())
}

#[utoipa::path(
    get,
    path = "/v1/parties/{id}",
    tag = "parties",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Party)
    )
)]
async fn party(
    _session: Session,
    State(context): State<ServerContext>,
    Path(party_id): Path<i32>,
) -> ServerResult<Json<Party>> {
    let party = context.collab.parties.get(party_id)?;

    Ok(Json(party.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/parties",
    tag = "parties",
    request_body = NewPartySchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Party)
    )
)]
async fn create_party(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewPartySchema>,
) -> ServerResult<Json<Party>> {
    let party = context
        .collab
        .parties
        .create(
            session.user().id,
            NewPartyRequest {
                name: body.name,
                visibility: body.party_type.into(),
                media_ref: body.media_ref,
            },
        )
        .await?;

    Ok(Json(party.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/parties/{id}",
    tag = "parties",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204, description = "Party was deleted, and everyone in it was removed"),
        (status = 403, description = "Only the admin can delete a party")
    )
)]
async fn delete_party(
    session: Session,
    State(context): State<ServerContext>,
    Path(party_id): Path<i32>,
) -> ServerResult<StatusCode> {
    context
        .collab
        .parties
        .delete(party_id, session.user().id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/parties/{id}/join",
    tag = "parties",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = JoinResult),
        (status = 403, description = "The party is private, and no join request was approved")
    )
)]
async fn join_party(
    session: Session,
    State(context): State<ServerContext>,
    Path(party_id): Path<i32>,
) -> ServerResult<Json<JoinResult>> {
    let parties = &context.collab.parties;
    let outcome = parties.join(party_id, session.user().id).await?;
    let party = parties.get(party_id)?;

    Ok(Json(JoinResult::new(outcome, party.to_serialized())))
}

#[utoipa::path(
    post,
    path = "/v1/parties/{id}/leave",
    tag = "parties",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204, description = "User left the party")
    )
)]
async fn leave_party(
    session: Session,
    State(context): State<ServerContext>,
    Path(party_id): Path<i32>,
) -> ServerResult<StatusCode> {
    context
        .collab
        .parties
        .leave(party_id, session.user().id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/parties/{id}/kick",
    tag = "parties",
    request_body = UserSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204, description = "User was removed from the party")
    )
)]
async fn kick_member(
    session: Session,
    State(context): State<ServerContext>,
    Path(party_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<UserSchema>,
) -> ServerResult<StatusCode> {
    context
        .collab
        .parties
        .kick(party_id, session.user().id, body.user_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/parties/{id}/add-member",
    tag = "parties",
    request_body = UserSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = JoinResult)
    )
)]
async fn add_member(
    session: Session,
    State(context): State<ServerContext>,
    Path(party_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<UserSchema>,
) -> ServerResult<Json<JoinResult>> {
    let parties = &context.collab.parties;
    let outcome = parties
        .add_member(party_id, session.user().id, body.user_id)
        .await?;
    let party = parties.get(party_id)?;

    Ok(Json(JoinResult::new(outcome, party.to_serialized())))
}

#[utoipa::path(
    post,
    path = "/v1/parties/{id}/request",
    tag = "parties",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = JoinRequest, description = "The pending request to join")
    )
)]
async fn request_join(
    session: Session,
    State(context): State<ServerContext>,
    Path(party_id): Path<i32>,
) -> ServerResult<Json<JoinRequest>> {
    let request = context
        .collab
        .parties
        .request_join(party_id, session.user().id)
        .await?;

    Ok(Json(request.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/parties/{id}/requests",
    tag = "parties",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<JoinRequest>, description = "Pending join requests")
    )
)]
async fn join_requests(
    session: Session,
    State(context): State<ServerContext>,
    Path(party_id): Path<i32>,
) -> ServerResult<Json<Vec<JoinRequest>>> {
    let requests = context
        .collab
        .parties
        .list_requests(party_id, session.user().id)
        .await?;

    Ok(Json(requests.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/parties/{id}/requests/{request_id}",
    tag = "parties",
    request_body = ResolveRequestSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = JoinRequest, description = "The resolved request")
    )
)]
async fn resolve_join_request(
    session: Session,
    State(context): State<ServerContext>,
    Path((party_id, request_id)): Path<(i32, i32)>,
    ValidatedJson(body): ValidatedJson<ResolveRequestSchema>,
) -> ServerResult<Json<JoinRequest>> {
    let action = match body.action {
        ResolveAction::Approve => RequestAction::Approve,
        ResolveAction::Reject => RequestAction::Reject,
    };

    let request = context
        .collab
        .parties
        .resolve_join_request(party_id, request_id, session.user().id, action)
        .await?;

    Ok(Json(request.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/parties/{id}/messages",
    tag = "parties",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Message>, description = "The most recent messages, oldest first")
    )
)]
async fn messages(
    session: Session,
    State(context): State<ServerContext>,
    Path(party_id): Path<i32>,
) -> ServerResult<Json<Vec<Message>>> {
    let messages = context
        .collab
        .parties
        .messages(party_id, session.user().id)
        .await?;

    Ok(Json(messages.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/parties/{id}/messages",
    tag = "parties",
    request_body = MessageSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Message)
    )
)]
async fn send_message(
    session: Session,
    State(context): State<ServerContext>,
    Path(party_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<MessageSchema>,
) -> ServerResult<Json<Message>> {
    let message = context
        .collab
        .parties
        .send_message(party_id, session.user().id, &body.message)
        .await?;

    Ok(Json(message.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_parties))
        .route("/", post(create_party))
        .route("/my", get(my_parties))
        .route("/:id", get(party))
        .route("/:id", delete(delete_party))
        .route("/:id/join", post(join_party))
        .route("/:id/leave", post(leave_party))
        .route("/:id/kick", post(kick_member))
        .route("/:id/add-member", post(add_member))
        .route("/:id/request", post(request_join))
        .route("/:id/requests", get(join_requests))
        .route("/:id/requests/:request_id", post(resolve_join_request))
        .route("/:id/messages", get(messages))
        .route("/:id/messages", post(send_message))
}
