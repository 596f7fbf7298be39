//! Card payloads for chat-request catch-up delivery.
//!
//! The REST side assembles the card queue; the chat server only re-shapes
//! pending chat requests into the same card form so a reconnecting client
//! sees exactly what it would have been shown live.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub r#type: String, // always "chat_request"
    pub data: CardData,
}

impl Card {
    pub fn chat_request(data: CardData) -> Self {
        Self {
            r#type: "chat_request".into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardData {
    pub id: String,
    pub requester: CardUser,
    pub user_position_id: String,
    pub position: CardPosition,
    pub response: String,
    pub created_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardUser {
    pub id: String,
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub status: Option<String>,
    pub trust_score: Option<f64>,
    pub avatar_url: Option<String>,
    pub avatar_icon_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPosition {
    pub id: String,
    pub statement: String,
    pub creator: CardUser,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<CardCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<CardLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardCategory {
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardLocation {
    pub code: String,
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> CardUser {
        CardUser {
            id: id.into(),
            display_name: Some("Jo".into()),
            username: Some("jo".into()),
            status: Some("active".into()),
            trust_score: Some(0.8),
            avatar_url: None,
            avatar_icon_url: None,
        }
    }

    #[test]
    fn card_serializes_expected_shape() {
        let card = Card::chat_request(CardData {
            id: "R1".into(),
            requester: user("u1"),
            user_position_id: "up1".into(),
            position: CardPosition {
                id: "p1".into(),
                statement: "statement".into(),
                creator: user("u2"),
                category: Some(CardCategory {
                    label: "economy".into(),
                }),
                location: None,
            },
            response: "pending".into(),
            created_time: Some("2026-01-01T00:00:00.000Z".into()),
        });

        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["type"], "chat_request");
        assert_eq!(json["data"]["requester"]["id"], "u1");
        assert_eq!(json["data"]["userPositionId"], "up1");
        assert_eq!(json["data"]["position"]["category"]["label"], "economy");
        // Absent location is omitted, not null.
        assert!(json["data"]["position"].get("location").is_none());
    }
}
