//! The agreed-position negotiation protocol.
//!
//! One method, four actions: propose, accept, reject, modify. A proposal in
//! `pending` is the only one whose status can change, and every transition
//! is final. Transitions for a chat are serialized behind the chat's lock so
//! concurrent accepts resolve to exactly one winner. Accepting a closure
//! proposal terminates the chat: archive first, then broadcast, then delete.

use {
    accord_archive::EndType,
    accord_protocol::{ErrorShape, MAX_PROPOSAL_CHARS, error_codes, events},
    accord_rooms::RoomManager,
    accord_store::{AgreedPosition, ProposalStatus},
    serde_json::json,
    tracing::{info, warn},
};

use crate::broadcast::{EmitOpts, emit_to_room};

use super::{MethodContext, MethodRegistry, MethodResult, require_participant, store_error};

// ── Transition guards ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProposalAction {
    Accept,
    Reject,
    Modify,
}

impl ProposalAction {
    fn own_proposal_code(self) -> &'static str {
        match self {
            Self::Accept => error_codes::CANNOT_ACCEPT_OWN,
            Self::Reject => error_codes::CANNOT_REJECT_OWN,
            Self::Modify => error_codes::CANNOT_MODIFY_OWN,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Modify => "modify",
        }
    }
}

/// Whether `actor` may apply `action` to `position` right now.
pub(crate) fn transition_guard(
    position: &AgreedPosition,
    actor: &str,
    action: ProposalAction,
) -> Result<(), ErrorShape> {
    if position.status != ProposalStatus::Pending {
        return Err(ErrorShape::new(
            error_codes::PROPOSAL_NOT_PENDING,
            "Proposal is no longer pending",
        ));
    }
    if position.proposer_id == actor {
        return Err(ErrorShape::new(
            action.own_proposal_code(),
            format!("Cannot {} your own proposal", action.verb()),
        ));
    }
    Ok(())
}

fn check_content_length(content: &str) -> Result<(), ErrorShape> {
    if content.chars().count() > MAX_PROPOSAL_CHARS {
        return Err(ErrorShape::new(
            error_codes::CONTENT_TOO_LONG,
            "Proposal must be 1000 characters or less",
        ));
    }
    Ok(())
}

// ── Method ───────────────────────────────────────────────────────────────────

pub(super) fn register(reg: &mut MethodRegistry) {
    reg.register(
        "agreed_position",
        Box::new(|ctx| {
            Box::pin(async move {
                let user_id = ctx.user_id()?;
                let chat_id = ctx.require_str(
                    "chatId",
                    error_codes::MISSING_CHAT_ID,
                    "Missing chatId",
                )?;

                let action = ctx.optional_str("action").unwrap_or_default();
                if !matches!(action.as_str(), "propose" | "accept" | "reject" | "modify") {
                    return Err(ErrorShape::new(
                        error_codes::INVALID_ACTION,
                        "Invalid action. Must be propose, accept, reject, or modify",
                    ));
                }

                require_participant(&ctx.state, &chat_id, &user_id).await?;

                // Serialize proposal state transitions per chat: the second
                // of two racing accepts must observe `accepted` and fail
                // with PROPOSAL_NOT_PENDING.
                let lock = ctx.state.chat_lock(&chat_id);
                let _guard = lock.lock().await;

                match action.as_str() {
                    "propose" => handle_propose(&ctx, &chat_id, &user_id).await,
                    "accept" => handle_accept(&ctx, &chat_id, &user_id).await,
                    "reject" => handle_reject(&ctx, &chat_id, &user_id).await,
                    _ => handle_modify(&ctx, &chat_id, &user_id).await,
                }
            })
        }),
    );
}

async fn handle_propose(ctx: &MethodContext, chat_id: &str, user_id: &str) -> MethodResult {
    let content = ctx.require_str(
        "content",
        error_codes::MISSING_CONTENT,
        "Content is required for propose action",
    )?;
    check_content_length(&content)?;
    let is_closure = ctx
        .params
        .get("isClosure")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let position = ctx
        .state
        .store
        .add_agreed_position(chat_id, user_id, &content, is_closure, None)
        .await
        .map_err(store_error)?;

    if is_closure {
        ctx.state
            .store
            .set_closure_proposal(chat_id, user_id, &content)
            .await
            .map_err(store_error)?;
    }

    emit_to_room(
        &ctx.state,
        &RoomManager::chat_room(chat_id),
        events::AGREED_POSITION,
        json!({
            "chatId": chat_id,
            "action": "propose",
            "proposal": position,
            "proposerId": user_id,
            "isClosure": is_closure,
        }),
        EmitOpts::default(),
    )
    .await;

    info!(
        user_id,
        chat_id,
        proposal_id = %position.id,
        is_closure,
        "proposal created"
    );
    Ok(json!({ "status": "proposed", "proposalId": position.id }))
}

async fn handle_accept(ctx: &MethodContext, chat_id: &str, user_id: &str) -> MethodResult {
    let proposal_id = ctx.require_str(
        "proposalId",
        error_codes::MISSING_PROPOSAL_ID,
        "proposalId is required for accept action",
    )?;

    let position = ctx
        .state
        .store
        .get_agreed_position(chat_id, &proposal_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| ErrorShape::new(error_codes::PROPOSAL_NOT_FOUND, "Proposal not found"))?;
    transition_guard(&position, user_id, ProposalAction::Accept)?;

    let position = ctx
        .state
        .store
        .update_agreed_position_status(chat_id, &proposal_id, ProposalStatus::Accepted)
        .await
        .map_err(store_error)?
        .ok_or_else(|| ErrorShape::new(error_codes::PROPOSAL_NOT_FOUND, "Proposal not found"))?;

    emit_to_room(
        &ctx.state,
        &RoomManager::chat_room(chat_id),
        events::AGREED_POSITION,
        json!({
            "chatId": chat_id,
            "action": "accept",
            "proposal": position,
            "accepterId": user_id,
            "isClosure": position.is_closure,
        }),
        EmitOpts::default(),
    )
    .await;

    info!(user_id, chat_id, proposal_id, "proposal accepted");

    if position.is_closure {
        return end_chat_with_closure(ctx, chat_id, &position.content).await;
    }

    Ok(json!({ "status": "accepted", "proposalId": proposal_id }))
}

async fn handle_reject(ctx: &MethodContext, chat_id: &str, user_id: &str) -> MethodResult {
    let proposal_id = ctx.require_str(
        "proposalId",
        error_codes::MISSING_PROPOSAL_ID,
        "proposalId is required for reject action",
    )?;

    let position = ctx
        .state
        .store
        .get_agreed_position(chat_id, &proposal_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| ErrorShape::new(error_codes::PROPOSAL_NOT_FOUND, "Proposal not found"))?;
    transition_guard(&position, user_id, ProposalAction::Reject)?;

    let position = ctx
        .state
        .store
        .update_agreed_position_status(chat_id, &proposal_id, ProposalStatus::Rejected)
        .await
        .map_err(store_error)?
        .ok_or_else(|| ErrorShape::new(error_codes::PROPOSAL_NOT_FOUND, "Proposal not found"))?;

    // A rejected closure is no longer current.
    if position.is_closure {
        ctx.state
            .store
            .clear_closure_proposal(chat_id)
            .await
            .map_err(store_error)?;
    }

    emit_to_room(
        &ctx.state,
        &RoomManager::chat_room(chat_id),
        events::AGREED_POSITION,
        json!({
            "chatId": chat_id,
            "action": "reject",
            "proposal": position,
            "rejecterId": user_id,
            "isClosure": position.is_closure,
        }),
        EmitOpts::default(),
    )
    .await;

    info!(user_id, chat_id, proposal_id, "proposal rejected");
    Ok(json!({ "status": "rejected", "proposalId": proposal_id }))
}

async fn handle_modify(ctx: &MethodContext, chat_id: &str, user_id: &str) -> MethodResult {
    let proposal_id = ctx.require_str(
        "proposalId",
        error_codes::MISSING_PROPOSAL_ID,
        "proposalId is required for modify action",
    )?;
    let content = ctx.require_str(
        "content",
        error_codes::MISSING_CONTENT,
        "content is required for modify action",
    )?;
    check_content_length(&content)?;

    let original = ctx
        .state
        .store
        .get_agreed_position(chat_id, &proposal_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| ErrorShape::new(error_codes::PROPOSAL_NOT_FOUND, "Proposal not found"))?;
    transition_guard(&original, user_id, ProposalAction::Modify)?;

    ctx.state
        .store
        .update_agreed_position_status(chat_id, &proposal_id, ProposalStatus::Modified)
        .await
        .map_err(store_error)?;

    // The counter-proposal supersedes the original and inherits its closure
    // flag.
    let new_position = ctx
        .state
        .store
        .add_agreed_position(
            chat_id,
            user_id,
            &content,
            original.is_closure,
            Some(&proposal_id),
        )
        .await
        .map_err(store_error)?;

    if original.is_closure {
        ctx.state
            .store
            .set_closure_proposal(chat_id, user_id, &content)
            .await
            .map_err(store_error)?;
    }

    emit_to_room(
        &ctx.state,
        &RoomManager::chat_room(chat_id),
        events::AGREED_POSITION,
        json!({
            "chatId": chat_id,
            "action": "modify",
            "originalProposalId": proposal_id,
            "proposal": new_position,
            "proposerId": user_id,
            "isClosure": original.is_closure,
        }),
        EmitOpts::default(),
    )
    .await;

    info!(
        user_id,
        chat_id,
        original = %proposal_id,
        replacement = %new_position.id,
        "proposal modified"
    );
    Ok(json!({ "status": "modified", "proposalId": new_position.id }))
}

/// Terminate a chat whose closure proposal was just accepted: archive the
/// snapshot, tell the room, tear the room down, delete the KV state.
async fn end_chat_with_closure(
    ctx: &MethodContext,
    chat_id: &str,
    closure_content: &str,
) -> MethodResult {
    let export_data = ctx
        .state
        .store
        .get_chat_export_data(chat_id)
        .await
        .map_err(store_error)?;
    let metadata = export_data.metadata.clone();

    if let Err(e) = ctx
        .state
        .archive
        .export_chat(chat_id, &export_data, EndType::AgreedClosure)
        .await
    {
        warn!(chat_id, error = %e, "closure export failed, chat stays live");
        return Err(ErrorShape::new(
            error_codes::EXPORT_FAILED,
            "Failed to export chat",
        ));
    }

    let chat_room = RoomManager::chat_room(chat_id);
    emit_to_room(
        &ctx.state,
        &chat_room,
        events::STATUS,
        json!({
            "chatId": chat_id,
            "status": "ended",
            "endType": "agreed_closure",
            "agreedClosure": closure_content,
        }),
        EmitOpts::default(),
    )
    .await;

    if let Some(metadata) = &metadata {
        for participant_id in &metadata.participant_ids {
            for sid in ctx.state.room_manager.get_user_sids(participant_id) {
                ctx.state.leave_room(&sid, &chat_room).await;
            }
        }
    }

    if let Err(e) = ctx.state.store.delete_chat(chat_id).await {
        // Archived but not cleaned: the TTL bounds the leak.
        warn!(chat_id, error = %e, "kv cleanup after closure export failed");
    }
    ctx.state.release_chat_lock(chat_id);

    info!(chat_id, "chat ended with agreed closure");
    Ok(json!({
        "status": "ended",
        "chatId": chat_id,
        "endType": "agreed_closure",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(proposer: &str) -> AgreedPosition {
        AgreedPosition::new(proposer, "common ground", false, None)
    }

    #[test]
    fn non_proposer_may_act_on_pending() {
        let p = pending("u1");
        for action in [
            ProposalAction::Accept,
            ProposalAction::Reject,
            ProposalAction::Modify,
        ] {
            assert!(transition_guard(&p, "u2", action).is_ok());
        }
    }

    #[test]
    fn proposer_cannot_self_act() {
        let p = pending("u1");
        let codes: Vec<_> = [
            ProposalAction::Accept,
            ProposalAction::Reject,
            ProposalAction::Modify,
        ]
        .into_iter()
        .map(|a| transition_guard(&p, "u1", a).unwrap_err().code)
        .collect();
        assert_eq!(
            codes,
            vec!["CANNOT_ACCEPT_OWN", "CANNOT_REJECT_OWN", "CANNOT_MODIFY_OWN"]
        );
        // The proposal is untouched by refused actions.
        assert_eq!(p.status, ProposalStatus::Pending);
    }

    #[test]
    fn terminal_proposal_refuses_all_transitions() {
        for status in [
            ProposalStatus::Accepted,
            ProposalStatus::Rejected,
            ProposalStatus::Modified,
        ] {
            let mut p = pending("u1");
            p.status = status;
            let err = transition_guard(&p, "u2", ProposalAction::Accept).unwrap_err();
            assert_eq!(err.code, error_codes::PROPOSAL_NOT_PENDING);
        }
    }

    #[test]
    fn content_boundary_is_exactly_one_thousand_chars() {
        assert!(check_content_length(&"x".repeat(1000)).is_ok());
        let err = check_content_length(&"x".repeat(1001)).unwrap_err();
        assert_eq!(err.code, error_codes::CONTENT_TOO_LONG);
    }
}
