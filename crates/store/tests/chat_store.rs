//! Integration tests against a live Redis.
//!
//! Run with `cargo test -p accord-store -- --ignored` and a Redis reachable
//! at TEST_REDIS_URL (default redis://localhost:6379/1).

use {
    accord_store::{
        Availability, ChatStore, DeliveryContext, MessageType, ProposalStatus,
        presence::{availability, delivery_context},
    },
    uuid::Uuid,
};

fn redis_url() -> String {
    std::env::var("TEST_REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/1".into())
}

async fn store() -> ChatStore {
    ChatStore::connect(&redis_url(), 300).await.unwrap()
}

fn ids() -> (String, String, String) {
    (
        Uuid::new_v4().to_string(),
        Uuid::new_v4().to_string(),
        Uuid::new_v4().to_string(),
    )
}

#[tokio::test]
#[ignore = "requires redis"]
async fn create_chat_registers_both_participants() {
    let store = store().await;
    let (chat_id, u1, u2) = ids();

    store
        .create_chat(&chat_id, &[u1.clone(), u2.clone()])
        .await
        .unwrap();

    assert!(store.is_chat_participant(&chat_id, &u1).await.unwrap());
    assert!(store.is_chat_participant(&chat_id, &u2).await.unwrap());
    assert!(!store.is_chat_participant(&chat_id, "someone-else").await.unwrap());
    assert_eq!(store.get_user_active_chats(&u1).await.unwrap(), vec![chat_id.clone()]);

    store.delete_chat(&chat_id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires redis"]
async fn empty_chat_returns_empty_history_not_null() {
    let store = store().await;
    let (chat_id, u1, u2) = ids();
    store
        .create_chat(&chat_id, &[u1.clone(), u2.clone()])
        .await
        .unwrap();

    let messages = store.get_messages(&chat_id, 0, -1).await.unwrap();
    assert!(messages.is_empty());

    store.delete_chat(&chat_id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires redis"]
async fn added_message_is_last_in_history() {
    let store = store().await;
    let (chat_id, u1, u2) = ids();
    store
        .create_chat(&chat_id, &[u1.clone(), u2.clone()])
        .await
        .unwrap();

    store
        .add_message(&chat_id, &u1, MessageType::Text, "first")
        .await
        .unwrap();
    let sent = store
        .add_message(&chat_id, &u2, MessageType::Text, "second")
        .await
        .unwrap();

    let messages = store.get_messages(&chat_id, 0, -1).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages.last().unwrap(), &sent);

    store.delete_chat(&chat_id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires redis"]
async fn proposal_status_changes_exactly_once() {
    let store = store().await;
    let (chat_id, u1, u2) = ids();
    store
        .create_chat(&chat_id, &[u1.clone(), u2.clone()])
        .await
        .unwrap();

    let proposal = store
        .add_agreed_position(&chat_id, &u1, "common ground", false, None)
        .await
        .unwrap();
    assert_eq!(proposal.status, ProposalStatus::Pending);

    let accepted = store
        .update_agreed_position_status(&chat_id, &proposal.id, ProposalStatus::Accepted)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(accepted.status, ProposalStatus::Accepted);

    // A second transition must be refused: the proposal left `pending`.
    let again = store
        .update_agreed_position_status(&chat_id, &proposal.id, ProposalStatus::Rejected)
        .await;
    assert!(again.is_err());

    let reread = store
        .get_agreed_position(&chat_id, &proposal.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reread.status, ProposalStatus::Accepted);

    store.delete_chat(&chat_id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires redis"]
async fn closure_singleton_overwrites_and_clears() {
    let store = store().await;
    let (chat_id, u1, u2) = ids();
    store
        .create_chat(&chat_id, &[u1.clone(), u2.clone()])
        .await
        .unwrap();

    store
        .set_closure_proposal(&chat_id, &u1, "first closure")
        .await
        .unwrap();
    store
        .set_closure_proposal(&chat_id, &u2, "second closure")
        .await
        .unwrap();

    let current = store.get_closure_proposal(&chat_id).await.unwrap().unwrap();
    assert_eq!(current.content, "second closure");
    assert_eq!(current.proposer_id, u2);

    store.clear_closure_proposal(&chat_id).await.unwrap();
    assert!(store.get_closure_proposal(&chat_id).await.unwrap().is_none());

    store.delete_chat(&chat_id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires redis"]
async fn delete_chat_leaves_no_trace() {
    let store = store().await;
    let (chat_id, u1, u2) = ids();
    store
        .create_chat(&chat_id, &[u1.clone(), u2.clone()])
        .await
        .unwrap();
    store
        .add_message(&chat_id, &u1, MessageType::Text, "hi")
        .await
        .unwrap();
    store
        .add_agreed_position(&chat_id, &u1, "closure", true, None)
        .await
        .unwrap();
    store
        .set_closure_proposal(&chat_id, &u1, "closure")
        .await
        .unwrap();

    store.delete_chat(&chat_id).await.unwrap();

    assert!(store.get_chat_metadata(&chat_id).await.unwrap().is_none());
    assert!(store.get_messages(&chat_id, 0, -1).await.unwrap().is_empty());
    assert!(store.get_all_agreed_positions(&chat_id).await.unwrap().is_empty());
    assert!(store.get_closure_proposal(&chat_id).await.unwrap().is_none());
    for user in [&u1, &u2] {
        assert!(!store.is_chat_participant(&chat_id, user).await.unwrap());
        assert!(!store.get_user_active_chats(user).await.unwrap().contains(&chat_id));
    }

    // Idempotent: deleting again is a no-op.
    store.delete_chat(&chat_id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires redis"]
async fn presence_keys_drive_availability() {
    let store = store().await;
    let (user_id, _, _) = ids();

    // Nothing recorded: offline, reachable only by notification.
    let presence = store.presence_of(&user_id).await.unwrap();
    assert!(!presence.online());
    assert_eq!(availability(presence, true), Availability::Notifiable);
    assert_eq!(availability(presence, false), Availability::None);
    assert_eq!(delivery_context(presence), DeliveryContext::Notification);

    store.record_in_app(&user_id).await.unwrap();
    let presence = store.presence_of(&user_id).await.unwrap();
    assert!(presence.in_app && !presence.swiping);
    assert_eq!(availability(presence, false), Availability::Online);
    assert_eq!(delivery_context(presence), DeliveryContext::InApp);

    store.record_swiping(&user_id).await.unwrap();
    let presence = store.presence_of(&user_id).await.unwrap();
    assert!(presence.swiping);
    assert_eq!(delivery_context(presence), DeliveryContext::Swiping);
}

#[tokio::test]
#[ignore = "requires redis"]
async fn export_snapshot_reflects_everything() {
    let store = store().await;
    let (chat_id, u1, u2) = ids();
    store
        .create_chat(&chat_id, &[u1.clone(), u2.clone()])
        .await
        .unwrap();
    store
        .add_message(&chat_id, &u1, MessageType::Text, "hello")
        .await
        .unwrap();
    store
        .add_agreed_position(&chat_id, &u2, "middle ground", false, None)
        .await
        .unwrap();
    store
        .set_closure_proposal(&chat_id, &u1, "wrap up")
        .await
        .unwrap();

    let export = store.get_chat_export_data(&chat_id).await.unwrap();
    assert_eq!(export.messages.len(), 1);
    assert_eq!(export.agreed_positions.len(), 1);
    assert_eq!(export.agreed_closure.unwrap().content, "wrap up");
    assert_eq!(export.metadata.unwrap().participant_ids, vec![u1, u2]);

    store.delete_chat(&chat_id).await.unwrap();
}
