use std::time::Duration;

use {
    accord_store::ChatExportData,
    chrono::Utc,
    serde::{Deserialize, Serialize},
    sqlx::{
        Row,
        postgres::{PgPool, PgPoolOptions, PgRow},
    },
    tracing::{info, warn},
    uuid::Uuid,
};

use crate::{
    cards::{Card, CardCategory, CardData, CardLocation, CardPosition, CardUser},
    error::{Context, Error, Result},
};

const MIN_CONNECTIONS: u32 = 2;
const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// How a chat terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndType {
    UserExit,
    AgreedClosure,
}

impl EndType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserExit => "user_exit",
            Self::AgreedClosure => "agreed_closure",
        }
    }
}

/// PostgreSQL-backed archive for terminated chats.
#[derive(Clone)]
pub struct ChatArchive {
    pool: PgPool,
}

impl ChatArchive {
    /// Connect the pool. Bounded at 2–10 connections with a 10 s acquire
    /// deadline, so slow exports backpressure handlers instead of piling up.
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("connecting to relational archive");
        let pool = PgPoolOptions::new()
            .min_connections(MIN_CONNECTIONS)
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await?;
        info!("relational archive connected");
        Ok(Self { pool })
    }

    /// Insert a new chat_log row in `active` state. Returns the generated id.
    pub async fn create_chat_log(&self, chat_request_id: &str) -> Result<String> {
        let request_id = Uuid::parse_str(chat_request_id)
            .with_context(|| format!("chat request id {chat_request_id} is not a uuid"))?;
        let row = sqlx::query(
            "INSERT INTO chat_log (chat_request_id, start_time, status)
             VALUES ($1, $2, 'active')
             RETURNING id",
        )
        .bind(request_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        let chat_id: Uuid = row.try_get("id")?;
        info!(chat_id = %chat_id, chat_request_id, "chat_log created");
        Ok(chat_id.to_string())
    }

    /// Recover the ordered participant pair `[initiator, responder]` for a
    /// chat that was started via the direct event rather than pub/sub.
    pub async fn get_chat_participants(&self, chat_id: &str) -> Result<Option<Vec<String>>> {
        let chat_id = Uuid::parse_str(chat_id)
            .with_context(|| format!("chat id {chat_id} is not a uuid"))?;
        let row = sqlx::query(
            "SELECT cr.initiator_user_id, up.user_id AS responder_user_id
             FROM chat_log cl
             JOIN chat_request cr ON cl.chat_request_id = cr.id
             JOIN user_position up ON cr.user_position_id = up.id
             WHERE cl.id = $1",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let initiator: Uuid = row.try_get("initiator_user_id")?;
        let responder: Uuid = row.try_get("responder_user_id")?;
        Ok(Some(vec![initiator.to_string(), responder.to_string()]))
    }

    /// Write the chat snapshot and mark the row archived. This is the point
    /// of durability: only after this returns may the KV state be deleted.
    pub async fn export_chat(
        &self,
        chat_id: &str,
        export_data: &ChatExportData,
        end_type: EndType,
    ) -> Result<()> {
        let id = Uuid::parse_str(chat_id)
            .with_context(|| format!("chat id {chat_id} is not a uuid"))?;
        let log = serde_json::to_value(export_data)?;

        let result = sqlx::query(
            "UPDATE chat_log
             SET log = $1, end_time = $2, end_type = $3, status = 'archived'
             WHERE id = $4",
        )
        .bind(log)
        .bind(Utc::now())
        .bind(end_type.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(chat_id, "export target chat_log row missing");
            return Err(Error::ChatLogNotFound(chat_id.to_string()));
        }

        info!(chat_id, end_type = end_type.as_str(), "chat archived");
        Ok(())
    }

    /// Pending chat requests targeting positions the user owns, newest
    /// first, shaped as cards for catch-up delivery on reconnect.
    pub async fn get_pending_chat_requests(&self, user_id: &str) -> Result<Vec<Card>> {
        let user_id = Uuid::parse_str(user_id)
            .with_context(|| format!("user id {user_id} is not a uuid"))?;
        let rows = sqlx::query(
            "SELECT
                cr.id,
                cr.user_position_id,
                cr.response,
                TO_CHAR(cr.created_time, 'YYYY-MM-DD\"T\"HH24:MI:SS.MS\"Z\"') AS created_time,
                u.id AS initiator_id,
                u.display_name AS initiator_display_name,
                u.username AS initiator_username,
                u.status AS initiator_status,
                u.trust_score::float8 AS initiator_trust_score,
                u.avatar_url AS initiator_avatar_url,
                u.avatar_icon_url AS initiator_avatar_icon_url,
                p.id AS position_id,
                p.statement AS position_statement,
                pc.label AS position_category_label,
                loc.code AS position_location_code,
                loc.name AS position_location_name,
                author.id AS author_id,
                author.display_name AS author_display_name,
                author.username AS author_username,
                author.status AS author_status,
                author.trust_score::float8 AS author_trust_score,
                author.avatar_url AS author_avatar_url,
                author.avatar_icon_url AS author_avatar_icon_url
             FROM chat_request cr
             JOIN user_position up ON cr.user_position_id = up.id
             JOIN users u ON cr.initiator_user_id = u.id
             JOIN position p ON up.position_id = p.id
             JOIN users author ON up.user_id = author.id
             LEFT JOIN position_category pc ON p.category_id = pc.id
             LEFT JOIN location loc ON p.location_id = loc.id
             WHERE up.user_id = $1
               AND cr.response = 'pending'
             ORDER BY cr.created_time DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let cards = rows
            .iter()
            .map(row_to_card)
            .collect::<Result<Vec<_>>>()?;
        info!(user_id = %user_id, count = cards.len(), "pending chat requests fetched");
        Ok(cards)
    }

    /// One-to-one lookup from the identity provider's subject to the
    /// internal user id.
    pub async fn resolve_subject(&self, keycloak_id: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT id FROM users WHERE keycloak_id = $1")
            .bind(keycloak_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let id: Uuid = row.try_get("id")?;
                Ok(Some(id.to_string()))
            },
            None => Ok(None),
        }
    }
}

fn row_to_card(row: &PgRow) -> Result<Card> {
    let requester = CardUser {
        id: row.try_get::<Uuid, _>("initiator_id")?.to_string(),
        display_name: row.try_get("initiator_display_name")?,
        username: row.try_get("initiator_username")?,
        status: row.try_get("initiator_status")?,
        trust_score: row.try_get("initiator_trust_score")?,
        avatar_url: row.try_get("initiator_avatar_url")?,
        avatar_icon_url: row.try_get("initiator_avatar_icon_url")?,
    };
    let creator = CardUser {
        id: row.try_get::<Uuid, _>("author_id")?.to_string(),
        display_name: row.try_get("author_display_name")?,
        username: row.try_get("author_username")?,
        status: row.try_get("author_status")?,
        trust_score: row.try_get("author_trust_score")?,
        avatar_url: row.try_get("author_avatar_url")?,
        avatar_icon_url: row.try_get("author_avatar_icon_url")?,
    };

    let category = row
        .try_get::<Option<String>, _>("position_category_label")?
        .map(|label| CardCategory { label });
    let location = row
        .try_get::<Option<String>, _>("position_location_code")?
        .map(|code| -> Result<CardLocation> {
            Ok(CardLocation {
                code,
                name: row.try_get("position_location_name")?,
            })
        })
        .transpose()?;

    let position = CardPosition {
        id: row.try_get::<Uuid, _>("position_id")?.to_string(),
        statement: row.try_get("position_statement")?,
        creator,
        category,
        location,
    };

    Ok(Card::chat_request(CardData {
        id: row.try_get::<Uuid, _>("id")?.to_string(),
        requester,
        user_position_id: row.try_get::<Uuid, _>("user_position_id")?.to_string(),
        position,
        response: row.try_get("response")?,
        created_time: row.try_get("created_time")?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_type_strings_match_archive_contract() {
        assert_eq!(EndType::UserExit.as_str(), "user_exit");
        assert_eq!(EndType::AgreedClosure.as_str(), "agreed_closure");
        assert_eq!(
            serde_json::to_value(EndType::AgreedClosure).unwrap(),
            "agreed_closure"
        );
    }
}
