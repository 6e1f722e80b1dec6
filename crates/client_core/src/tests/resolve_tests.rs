use chrono::{DateTime, Utc};
use shared::domain::{MessageId, RoleId, ServerId, UserId};
use shared::protocol::{Message, Role, ServerMember, User, WebhookAuthor};

use super::{highest_role, resolve_identity, ConversationContext, ServerSnapshot, UNKNOWN_USERNAME};
use crate::roster::build_roster;

fn user(id: &str, username: &str) -> User {
    User {
        id: UserId::new(id),
        username: username.to_string(),
        avatar_url: None,
    }
}

fn role(id: &str, position: i32) -> Role {
    Role {
        id: RoleId::new(id),
        server_id: ServerId::new("s1"),
        name: id.to_string(),
        color: None,
        position,
        separate_from_other_roles: false,
        icon: None,
    }
}

fn member(user_id: &str, username: &str, role_ids: &[&str]) -> ServerMember {
    ServerMember {
        server_id: ServerId::new("s1"),
        user: user(user_id, username),
        role_ids: role_ids.iter().map(|r| RoleId::new(*r)).collect(),
    }
}

fn message_from(author: Option<&str>) -> Message {
    Message {
        id: MessageId::new("m1"),
        text: "hello".to_string(),
        created_at: "2024-05-01T12:00:00Z".parse::<DateTime<Utc>>().expect("timestamp"),
        author_id: author.map(UserId::new),
        webhook: None,
        reply_to: None,
        reply_snapshot: None,
        reactions: Vec::new(),
    }
}

#[test]
fn highest_role_picks_the_greatest_position() {
    let snapshot = ServerSnapshot::from_collections(
        [member("u1", "ada", &["a", "b", "c"])],
        [role("a", 1), role("b", 5), role("c", 3)],
    );
    let best = highest_role(
        &snapshot.members[&UserId::new("u1")].role_ids,
        &snapshot.roles,
        |_| true,
    )
    .expect("a role");
    assert_eq!(best.id, RoleId::new("b"));
}

#[test]
fn highest_role_tie_goes_to_the_first_assigned() {
    let snapshot = ServerSnapshot::from_collections(
        [member("u1", "ada", &["second", "first"])],
        [role("first", 5), role("second", 5)],
    );
    // "second" comes first in the assignment list, so it wins the tie.
    let best = highest_role(
        &snapshot.members[&UserId::new("u1")].role_ids,
        &snapshot.roles,
        |_| true,
    )
    .expect("a role");
    assert_eq!(best.id, RoleId::new("second"));
}

#[test]
fn highest_role_skips_unresolvable_role_ids() {
    let snapshot = ServerSnapshot::from_collections(
        [member("u1", "ada", &["ghost", "real"])],
        [role("real", 2)],
    );
    let best = highest_role(
        &snapshot.members[&UserId::new("u1")].role_ids,
        &snapshot.roles,
        |_| true,
    )
    .expect("a role");
    assert_eq!(best.id, RoleId::new("real"));
}

#[test]
fn server_context_resolves_member_with_role_and_independent_icon_role() {
    let mut moderator = role("mod", 5);
    moderator.separate_from_other_roles = true;
    let mut artist = role("artist", 3);
    artist.icon = Some("palette.png".to_string());

    let snapshot = ServerSnapshot::from_collections(
        [member("u1", "ada", &["artist", "mod"])],
        [moderator, artist],
    );
    let resolved = resolve_identity(&message_from(Some("u1")), &ConversationContext::Server(&snapshot));

    assert_eq!(resolved.user.username, "ada");
    assert_eq!(resolved.role.expect("role").id, RoleId::new("mod"));
    // The icon role is computed over the icon-bearing subset only.
    assert_eq!(resolved.icon_role.expect("icon role").id, RoleId::new("artist"));
}

#[test]
fn unknown_member_degrades_to_placeholder_identity() {
    let snapshot = ServerSnapshot::default();
    let resolved = resolve_identity(&message_from(Some("u404")), &ConversationContext::Server(&snapshot));

    assert_eq!(resolved.user.id, UserId::new("u404"));
    assert_eq!(resolved.user.username, UNKNOWN_USERNAME);
    assert!(resolved.role.is_none());
    assert!(resolved.icon_role.is_none());
}

#[test]
fn direct_context_matches_either_participant_and_never_assigns_roles() {
    let me = user("u1", "ada");
    let them = user("u2", "grace");
    let context = ConversationContext::Direct {
        current_user: &me,
        other_user: &them,
    };

    let mine = resolve_identity(&message_from(Some("u1")), &context);
    assert_eq!(mine.user.username, "ada");
    assert!(mine.role.is_none());

    let theirs = resolve_identity(&message_from(Some("u2")), &context);
    assert_eq!(theirs.user.username, "grace");

    let stranger = resolve_identity(&message_from(Some("u3")), &context);
    assert_eq!(stranger.user.username, UNKNOWN_USERNAME);
}

#[test]
fn webhook_messages_bypass_lookup_with_a_non_colliding_id() {
    let snapshot = ServerSnapshot::from_collections(
        [member("u1", "ada", &[])],
        [role("mod", 5)],
    );
    let mut message = message_from(Some("u1"));
    message.webhook = Some(WebhookAuthor {
        username: "deploy-bot".to_string(),
        avatar_url: Some("https://cdn.test/bot.png".to_string()),
    });

    let resolved = resolve_identity(&message, &ConversationContext::Server(&snapshot));
    assert_eq!(resolved.user.username, "deploy-bot");
    assert_eq!(resolved.user.id, UserId::new("webhook:m1"));
    assert_eq!(resolved.user.avatar_url.as_deref(), Some("https://cdn.test/bot.png"));
    assert!(resolved.role.is_none());
    assert!(resolved.icon_role.is_none());
}

#[test]
fn roster_sections_by_hoisted_role_in_descending_position() {
    let mut admin = role("admin", 9);
    admin.separate_from_other_roles = true;
    let mut moderator = role("mod", 5);
    moderator.separate_from_other_roles = true;
    let plain = role("member", 1);

    let snapshot = ServerSnapshot::from_collections(
        [
            member("u1", "zoe", &["mod"]),
            member("u2", "ada", &["admin", "mod"]),
            member("u3", "bob", &["member"]),
            member("u4", "amy", &["mod", "member"]),
        ],
        [admin, moderator, plain],
    );

    let roster = build_roster(&snapshot);
    assert_eq!(roster.len(), 3);

    assert_eq!(roster[0].role.as_ref().expect("role").id, RoleId::new("admin"));
    let admins: Vec<_> = roster[0].members.iter().map(|m| m.user.username.as_str()).collect();
    assert_eq!(admins, vec!["ada"]);

    assert_eq!(roster[1].role.as_ref().expect("role").id, RoleId::new("mod"));
    let mods: Vec<_> = roster[1].members.iter().map(|m| m.user.username.as_str()).collect();
    assert_eq!(mods, vec!["amy", "zoe"]);

    // "member" is not hoisted, so bob lands in the default section.
    assert!(roster[2].role.is_none());
    let rest: Vec<_> = roster[2].members.iter().map(|m| m.user.username.as_str()).collect();
    assert_eq!(rest, vec!["bob"]);
}
