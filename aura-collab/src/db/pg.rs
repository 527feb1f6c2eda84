use async_trait::async_trait;
use aura_core::RequestStatus;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, query, query_as, Error as SqlxError, FromRow, PgPool};

use crate::{
    Database, DatabaseError, DatabaseResult, IntoDatabaseError, JoinRequestData, NewJoinRequest,
    NewParty, NewPartyMember, NewPartyMessage, PartyData, PartyMemberData, PartyMessageData,
    PrimaryKey, Result, SessionData, UserData,
};

const MEMBER_COLUMNS: &str = "
    party_members.id,
    party_members.joined_at,
    party_members.user_id,
    users.username,
    users.display_name";

const REQUEST_COLUMNS: &str = "
    requests.id,
    requests.party_id,
    requests.status,
    requests.created_at,
    requests.user_id,
    users.username,
    users.display_name";

/// A postgres database implementation for parties
pub struct PgDatabase {
    pool: PgPool,
}

#[derive(FromRow)]
struct UserRow {
    id: PrimaryKey,
    username: String,
    display_name: String,
}

#[derive(FromRow)]
struct SessionRow {
    id: PrimaryKey,
    token: String,
    expires_at: DateTime<Utc>,
    user_id: PrimaryKey,
    username: String,
    display_name: String,
}

#[derive(FromRow)]
struct PartyRow {
    id: PrimaryKey,
    name: String,
    visibility: String,
    media_ref: String,
    admin_id: PrimaryKey,
    is_active: bool,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct MemberRow {
    id: PrimaryKey,
    joined_at: DateTime<Utc>,
    user_id: PrimaryKey,
    username: String,
    display_name: String,
}

#[derive(FromRow)]
struct JoinRequestRow {
    id: PrimaryKey,
    party_id: PrimaryKey,
    status: String,
    created_at: DateTime<Utc>,
    user_id: PrimaryKey,
    username: String,
    display_name: String,
}

#[derive(FromRow)]
struct MessageRow {
    id: PrimaryKey,
    party_id: PrimaryKey,
    content: String,
    created_at: DateTime<Utc>,
    user_id: PrimaryKey,
    username: String,
    display_name: String,
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }

    async fn party_members(&self, party_id: PrimaryKey) -> Result<Vec<PartyMemberData>> {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS}
            FROM party_members
                INNER JOIN users ON party_members.user_id = users.id
            WHERE party_id = $1
            ORDER BY party_members.joined_at, party_members.id"
        );

        let rows: Vec<MemberRow> = query_as(&sql)
            .bind(party_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn with_members(&self, row: PartyRow) -> Result<PartyData> {
        let members = self.party_members(row.id).await?;
        let mut party = row.into_data()?;

        party.members = members;
        Ok(party)
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        query_as::<_, UserRow>("SELECT id, username, display_name FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("user", "id"))
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let row: SessionRow = query_as(
            "SELECT
                sessions.id,
                sessions.token,
                sessions.expires_at,
                sessions.user_id,
                users.username,
                users.display_name
            FROM sessions
                INNER JOIN users ON sessions.user_id = users.id
            WHERE token = $1 AND sessions.expires_at > now()",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("session", "token"))?;

        Ok(SessionData {
            id: row.id,
            token: row.token,
            expires_at: row.expires_at,
            user: UserData {
                id: row.user_id,
                username: row.username,
                display_name: row.display_name,
            },
        })
    }

    async fn party_by_id(&self, party_id: PrimaryKey) -> Result<PartyData> {
        let row: PartyRow = query_as("SELECT * FROM parties WHERE id = $1")
            .bind(party_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("party", "id"))?;

        self.with_members(row).await
    }

    async fn list_active_parties(&self) -> Result<Vec<PartyData>> {
        let rows: Vec<PartyRow> =
            query_as("SELECT * FROM parties WHERE is_active = true ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| e.any())?;

        let mut parties = Vec::with_capacity(rows.len());

        for row in rows {
            parties.push(self.with_members(row).await?);
        }

        Ok(parties)
    }

    async fn create_party(&self, new_party: NewParty) -> Result<PartyData> {
        // Ensure the admin exists
        let _ = self.user_by_id(new_party.admin_id).await?;

        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let (party_id,): (PrimaryKey,) = query_as(
            "INSERT INTO parties (name, visibility, media_ref, admin_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id",
        )
        .bind(&new_party.name)
        .bind(new_party.visibility.to_string())
        .bind(&new_party.media_ref)
        .bind(new_party.admin_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        // The creator is the first member
        query("INSERT INTO party_members (party_id, user_id) VALUES ($1, $2)")
            .bind(party_id)
            .bind(new_party.admin_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;

        self.party_by_id(party_id).await
    }

    async fn update_party_admin(&self, party_id: PrimaryKey, admin_id: PrimaryKey) -> Result<()> {
        let result = query("UPDATE parties SET admin_id = $1 WHERE id = $2")
            .bind(admin_id)
            .bind(party_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "party",
                identifier: "id",
            });
        }

        Ok(())
    }

    async fn deactivate_party(&self, party_id: PrimaryKey) -> Result<()> {
        query("UPDATE parties SET is_active = false WHERE id = $1")
            .bind(party_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn delete_party(&self, party_id: PrimaryKey) -> Result<()> {
        // Ensure party exists
        let _ = self.party_by_id(party_id).await?;

        // Members, messages, and requests cascade
        query("DELETE FROM parties WHERE id = $1")
            .bind(party_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn create_party_member(&self, new_member: NewPartyMember) -> Result<PartyMemberData> {
        // Ensure the user isn't a member of this party already
        query_as::<_, (PrimaryKey,)>(
            "SELECT id FROM party_members WHERE party_id = $1 AND user_id = $2",
        )
        .bind(new_member.party_id)
        .bind(new_member.user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("", ""))
        .conflict_or_ok(
            "party member",
            "party:user",
            &format!("{}:{}", new_member.party_id, new_member.user_id),
        )?;

        let (member_id,): (PrimaryKey,) = query_as(
            "INSERT INTO party_members (party_id, user_id) VALUES ($1, $2) RETURNING id",
        )
        .bind(new_member.party_id)
        .bind(new_member.user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        let sql = format!(
            "SELECT {MEMBER_COLUMNS}
            FROM party_members
                INNER JOIN users ON party_members.user_id = users.id
            WHERE party_members.id = $1"
        );

        query_as::<_, MemberRow>(&sql)
            .bind(member_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("party member", "id"))
    }

    async fn delete_party_member(&self, party_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        let (member_id,): (PrimaryKey,) =
            query_as("SELECT id FROM party_members WHERE party_id = $1 AND user_id = $2")
                .bind(party_id)
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| e.not_found_or("party member", "party_id:user_id"))?;

        query("DELETE FROM party_members WHERE id = $1")
            .bind(member_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn join_request_by_id(&self, request_id: PrimaryKey) -> Result<JoinRequestData> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS}
            FROM party_join_requests AS requests
                INNER JOIN users ON requests.user_id = users.id
            WHERE requests.id = $1"
        );

        query_as::<_, JoinRequestRow>(&sql)
            .bind(request_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("join request", "id"))?
            .into_data()
    }

    async fn latest_join_request(
        &self,
        party_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<JoinRequestData> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS}
            FROM party_join_requests AS requests
                INNER JOIN users ON requests.user_id = users.id
            WHERE requests.party_id = $1 AND requests.user_id = $2
            ORDER BY requests.created_at DESC, requests.id DESC
            LIMIT 1"
        );

        query_as::<_, JoinRequestRow>(&sql)
            .bind(party_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("join request", "party_id:user_id"))?
            .into_data()
    }

    async fn list_join_requests(
        &self,
        party_id: PrimaryKey,
        status: RequestStatus,
    ) -> Result<Vec<JoinRequestData>> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS}
            FROM party_join_requests AS requests
                INNER JOIN users ON requests.user_id = users.id
            WHERE requests.party_id = $1 AND requests.status = $2
            ORDER BY requests.created_at, requests.id"
        );

        query_as::<_, JoinRequestRow>(&sql)
            .bind(party_id)
            .bind(status.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?
            .into_iter()
            .map(JoinRequestRow::into_data)
            .collect()
    }

    async fn create_join_request(&self, new_request: NewJoinRequest) -> Result<JoinRequestData> {
        let (request_id,): (PrimaryKey,) = query_as(
            "INSERT INTO party_join_requests (party_id, user_id, status)
            VALUES ($1, $2, $3)
            RETURNING id",
        )
        .bind(new_request.party_id)
        .bind(new_request.user_id)
        .bind(RequestStatus::Pending.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.join_request_by_id(request_id).await
    }

    async fn update_join_request(
        &self,
        request_id: PrimaryKey,
        status: RequestStatus,
    ) -> Result<JoinRequestData> {
        // Ensure request exists
        let _ = self.join_request_by_id(request_id).await?;

        query("UPDATE party_join_requests SET status = $1 WHERE id = $2")
            .bind(status.to_string())
            .bind(request_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        self.join_request_by_id(request_id).await
    }

    async fn create_party_message(&self, new_message: NewPartyMessage) -> Result<PartyMessageData> {
        let row: MessageRow = query_as(
            "WITH inserted AS (
                INSERT INTO party_messages (party_id, user_id, content)
                VALUES ($1, $2, $3)
                RETURNING *
            )
            SELECT
                inserted.id,
                inserted.party_id,
                inserted.content,
                inserted.created_at,
                inserted.user_id,
                users.username,
                users.display_name
            FROM inserted
                INNER JOIN users ON inserted.user_id = users.id",
        )
        .bind(new_message.party_id)
        .bind(new_message.user_id)
        .bind(&new_message.content)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(row.into())
    }

    async fn list_party_messages(
        &self,
        party_id: PrimaryKey,
        limit: usize,
    ) -> Result<Vec<PartyMessageData>> {
        let rows: Vec<MessageRow> = query_as(
            "SELECT
                messages.id,
                messages.party_id,
                messages.content,
                messages.created_at,
                messages.user_id,
                users.username,
                users.display_name
            FROM party_messages AS messages
                INNER JOIN users ON messages.user_id = users.id
            WHERE messages.party_id = $1
            ORDER BY messages.created_at DESC, messages.id DESC
            LIMIT $2",
        )
        .bind(party_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        // Newest were fetched first
        Ok(rows.into_iter().rev().map(Into::into).collect())
    }
}

impl PartyRow {
    fn into_data(self) -> Result<PartyData> {
        let visibility = self
            .visibility
            .parse()
            .map_err(|e: String| DatabaseError::Internal(e.into()))?;

        Ok(PartyData {
            id: self.id,
            name: self.name,
            visibility,
            media_ref: self.media_ref,
            admin_id: self.admin_id,
            is_active: self.is_active,
            created_at: self.created_at,
            members: vec![],
        })
    }
}

impl JoinRequestRow {
    fn into_data(self) -> Result<JoinRequestData> {
        let status = self
            .status
            .parse()
            .map_err(|e: String| DatabaseError::Internal(e.into()))?;

        Ok(JoinRequestData {
            id: self.id,
            party_id: self.party_id,
            status,
            created_at: self.created_at,
            user: UserData {
                id: self.user_id,
                username: self.username,
                display_name: self.display_name,
            },
        })
    }
}

impl From<UserRow> for UserData {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            display_name: row.display_name,
        }
    }
}

impl From<MemberRow> for PartyMemberData {
    fn from(row: MemberRow) -> Self {
        Self {
            id: row.id,
            joined_at: row.joined_at,
            user: UserData {
                id: row.user_id,
                username: row.username,
                display_name: row.display_name,
            },
        }
    }
}

impl From<MessageRow> for PartyMessageData {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            party_id: row.party_id,
            content: row.content,
            created_at: row.created_at,
            user: UserData {
                id: row.user_id,
                username: row.username,
                display_name: row.display_name,
            },
        }
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
