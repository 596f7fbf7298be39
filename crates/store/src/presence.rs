//! Per-user presence keys and availability computation.
//!
//! Two short-lived keys track what a user is doing right now: `swiping` is
//! set when they fetch the card queue, `in_app` by any heartbeat. Both
//! expire on their own — no cleanup on disconnect is needed or attempted.

use {
    redis::AsyncCommands,
    serde::{Deserialize, Serialize},
};

use crate::{ChatStore, error::Result, keys};

/// TTL for the swiping key: the card queue refreshes well inside this.
pub const SWIPING_TTL_SECS: u64 = 45;
/// TTL for the in-app key, refreshed by every heartbeat.
pub const IN_APP_TTL_SECS: u64 = 60;

/// Snapshot of a user's presence keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Presence {
    pub swiping: bool,
    pub in_app: bool,
}

impl Presence {
    pub fn online(&self) -> bool {
        self.swiping || self.in_app
    }
}

/// Whether a position's owner can be engaged right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Online,
    Notifiable,
    None,
}

/// The recipient's presence state at the moment a chat request is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryContext {
    Swiping,
    InApp,
    Notification,
}

/// Availability of a user given their presence and whether they can receive
/// push notifications.
pub fn availability(presence: Presence, notifiable: bool) -> Availability {
    if presence.online() {
        Availability::Online
    } else if notifiable {
        Availability::Notifiable
    } else {
        Availability::None
    }
}

/// How a chat request created right now would reach this user.
pub fn delivery_context(presence: Presence) -> DeliveryContext {
    if presence.swiping {
        DeliveryContext::Swiping
    } else if presence.in_app {
        DeliveryContext::InApp
    } else {
        DeliveryContext::Notification
    }
}

impl ChatStore {
    /// Mark the user as actively viewing cards.
    pub async fn record_swiping(&self, user_id: &str) -> Result<()> {
        let mut con = self.connection();
        let _: () = con
            .set_ex(keys::swiping(user_id), 1, SWIPING_TTL_SECS)
            .await?;
        Ok(())
    }

    /// Mark the user as present in the app. Called on handshake and on every
    /// heartbeat.
    pub async fn record_in_app(&self, user_id: &str) -> Result<()> {
        let mut con = self.connection();
        let _: () = con
            .set_ex(keys::in_app(user_id), 1, IN_APP_TTL_SECS)
            .await?;
        Ok(())
    }

    pub async fn presence_of(&self, user_id: &str) -> Result<Presence> {
        let mut con = self.connection();
        let swiping: bool = con.exists(keys::swiping(user_id)).await?;
        let in_app: bool = con.exists(keys::in_app(user_id)).await?;
        Ok(Presence { swiping, in_app })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONLINE: Presence = Presence {
        swiping: true,
        in_app: true,
    };
    const IN_APP_ONLY: Presence = Presence {
        swiping: false,
        in_app: true,
    };
    const AWAY: Presence = Presence {
        swiping: false,
        in_app: false,
    };

    #[test]
    fn online_beats_notifiable() {
        assert_eq!(availability(ONLINE, true), Availability::Online);
        assert_eq!(availability(IN_APP_ONLY, false), Availability::Online);
    }

    #[test]
    fn away_user_falls_back_to_notification_eligibility() {
        assert_eq!(availability(AWAY, true), Availability::Notifiable);
        assert_eq!(availability(AWAY, false), Availability::None);
    }

    #[test]
    fn delivery_context_prefers_swiping() {
        assert_eq!(delivery_context(ONLINE), DeliveryContext::Swiping);
        assert_eq!(delivery_context(IN_APP_ONLY), DeliveryContext::InApp);
        assert_eq!(delivery_context(AWAY), DeliveryContext::Notification);
    }

    #[test]
    fn availability_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(Availability::Notifiable).unwrap(),
            "notifiable"
        );
        assert_eq!(serde_json::to_value(Availability::None).unwrap(), "none");
        assert_eq!(
            serde_json::to_value(DeliveryContext::InApp).unwrap(),
            "in_app"
        );
    }
}
