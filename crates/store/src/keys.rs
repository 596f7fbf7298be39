//! Redis key layout for chat and presence state.

pub fn messages(chat_id: &str) -> String {
    format!("chat:{chat_id}:messages")
}

pub fn positions(chat_id: &str) -> String {
    format!("chat:{chat_id}:positions")
}

pub fn closure(chat_id: &str) -> String {
    format!("chat:{chat_id}:closure")
}

pub fn metadata(chat_id: &str) -> String {
    format!("chat:{chat_id}:metadata")
}

pub fn user_active_chats(user_id: &str) -> String {
    format!("user:{user_id}:active_chats")
}

pub fn swiping(user_id: &str) -> String {
    format!("presence:swiping:{user_id}")
}

pub fn in_app(user_id: &str) -> String {
    format!("presence:in_app:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_keys_embed_chat_id() {
        assert_eq!(messages("c1"), "chat:c1:messages");
        assert_eq!(positions("c1"), "chat:c1:positions");
        assert_eq!(closure("c1"), "chat:c1:closure");
        assert_eq!(metadata("c1"), "chat:c1:metadata");
    }

    #[test]
    fn user_and_presence_keys() {
        assert_eq!(user_active_chats("u1"), "user:u1:active_chats");
        assert_eq!(swiping("u1"), "presence:swiping:u1");
        assert_eq!(in_app("u1"), "presence:in_app:u1");
    }
}
