use chrono::{DateTime, Duration, Utc};
use shared::domain::{MessageId, RoleId, ServerId, UserId};
use shared::protocol::{Message, ReplySnapshot, Role, ServerMember, User};

use super::process_messages;
use crate::reply::resolve_reply;
use crate::resolve::{ConversationContext, ServerSnapshot, UNKNOWN_USERNAME};

fn base() -> DateTime<Utc> {
    "2024-05-01T12:00:00Z".parse().expect("timestamp")
}

fn message(id: &str, author: &str, offset_secs: i64, text: &str) -> Message {
    Message {
        id: MessageId::new(id),
        text: text.to_string(),
        created_at: base() + Duration::seconds(offset_secs),
        author_id: Some(UserId::new(author)),
        webhook: None,
        reply_to: None,
        reply_snapshot: None,
        reactions: Vec::new(),
    }
}

fn snapshot() -> ServerSnapshot {
    ServerSnapshot::from_collections(
        [
            ServerMember {
                server_id: ServerId::new("s1"),
                user: User {
                    id: UserId::new("u1"),
                    username: "ada".to_string(),
                    avatar_url: None,
                },
                role_ids: vec![RoleId::new("mod")],
            },
            ServerMember {
                server_id: ServerId::new("s1"),
                user: User {
                    id: UserId::new("u2"),
                    username: "grace".to_string(),
                    avatar_url: None,
                },
                role_ids: Vec::new(),
            },
        ],
        [Role {
            id: RoleId::new("mod"),
            server_id: ServerId::new("s1"),
            name: "mod".to_string(),
            color: Some("#ff0000".to_string()),
            position: 5,
            separate_from_other_roles: false,
            icon: None,
        }],
    )
}

#[test]
fn reply_to_a_loaded_message_resolves_text_and_sender() {
    let snapshot = snapshot();
    let context = ConversationContext::Server(&snapshot);
    let target = message("m1", "u1", 0, "original");
    let mut replying = message("m2", "u2", 60, "answer");
    replying.reply_to = Some(MessageId::new("m1"));
    let loaded = vec![target, replying.clone()];

    let preview = resolve_reply(&replying, &loaded, &context).expect("preview");
    assert_eq!(preview.text, "original");
    assert_eq!(preview.user.username, "ada");
    assert_eq!(preview.role.expect("role").id, RoleId::new("mod"));
}

#[test]
fn reply_outside_the_window_uses_the_embedded_snapshot() {
    let snapshot = snapshot();
    let context = ConversationContext::Server(&snapshot);
    let mut replying = message("m2", "u2", 60, "answer");
    replying.reply_to = Some(MessageId::new("m-ancient"));
    replying.reply_snapshot = Some(ReplySnapshot {
        username: "ada".to_string(),
        text: "from long ago".to_string(),
    });
    let loaded = vec![replying.clone()];

    let preview = resolve_reply(&replying, &loaded, &context).expect("preview");
    assert_eq!(preview.text, "from long ago");
    assert_eq!(preview.user.username, "ada");
    assert!(preview.role.is_none());
}

#[test]
fn reply_outside_the_window_without_snapshot_still_yields_a_preview() {
    let snapshot = snapshot();
    let context = ConversationContext::Server(&snapshot);
    let mut replying = message("m2", "u2", 60, "answer");
    replying.reply_to = Some(MessageId::new("m-ancient"));
    let loaded = vec![replying.clone()];

    let preview = resolve_reply(&replying, &loaded, &context).expect("preview");
    assert_eq!(preview.user.username, UNKNOWN_USERNAME);
    assert!(preview.text.is_empty());
}

#[test]
fn non_replies_have_no_preview() {
    let snapshot = snapshot();
    let context = ConversationContext::Server(&snapshot);
    let plain = message("m1", "u1", 0, "hello");
    assert!(resolve_reply(&plain, &[plain.clone()], &context).is_none());
}

#[test]
fn pipeline_resolves_identity_reply_and_grouping_in_one_pass() {
    let snapshot = snapshot();
    let context = ConversationContext::Server(&snapshot);

    let mut third = message("m3", "u2", 120, "answer");
    third.reply_to = Some(MessageId::new("m1"));
    let messages = vec![
        message("m1", "u1", 0, "first"),
        message("m2", "u1", 60, "follow-up"),
        third,
        message("m4", "u1", 700, "much later"),
    ];

    let processed = process_messages(&messages, &context);
    assert_eq!(processed.len(), 4);

    assert!(processed[0].start_of_group);
    assert_eq!(processed[0].user.username, "ada");
    assert_eq!(processed[0].role.as_ref().expect("role").id, RoleId::new("mod"));

    // Same sender one minute later: grouped.
    assert!(!processed[1].start_of_group);

    // Sender switch breaks the group; the reply resolves in-window.
    assert!(processed[2].start_of_group);
    let reply = processed[2].reply.as_ref().expect("reply preview");
    assert_eq!(reply.text, "first");
    assert_eq!(reply.user.username, "ada");

    // Different sender from its predecessor: a new group starts.
    assert!(processed[3].start_of_group);
    assert!(processed[3].reply.is_none());
}
