use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ChannelId, ConversationKey, MessageId, RoleId, ServerId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A server-scoped role. `position` orders seniority: higher wins. `color`
/// is either a solid color or a gradient descriptor, passed through opaquely.
/// Roles carrying an `icon` form the subset eligible for icon-role display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub server_id: ServerId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub position: i32,
    #[serde(default)]
    pub separate_from_other_roles: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// A user's membership in a server. Embeds a denormalized user snapshot;
/// `role_ids` preserves assignment order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMember {
    pub server_id: ServerId,
    pub user: User,
    #[serde(default)]
    pub role_ids: Vec<RoleId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub count: u32,
    #[serde(default)]
    pub reacted: bool,
}

/// Synthetic sender identity carried on webhook-authored messages. Its
/// presence is the webhook marker: such messages bypass member lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookAuthor {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Denormalized copy of a replied-to message, when the origin already had it
/// server-side. Used as the fallback for reply targets outside the loaded
/// window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplySnapshot {
    pub username: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookAuthor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_snapshot: Option<ReplySnapshot>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

/// Response body of the reaction mutation endpoints. The caller patches the
/// `reactions` field of exactly the matching cached message with this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionsPatch {
    pub reactions: Vec<Reaction>,
}

// ---------------------------------------------------------------------------
// Gateway wire protocol
// ---------------------------------------------------------------------------

/// Server->client wire frame: `{"event":{"type":...,"payload":...},"meta":{...}}`.
/// A frame without `event.type` fails to decode and is dropped by the reader.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub event: EventFrame,
    #[serde(default)]
    pub meta: EventMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Frame metadata. Unknown keys are ignored; `ts` is epoch milliseconds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventMeta {
    #[serde(default)]
    pub ts: i64,
}

/// The closed set of gateway event kinds this client understands. Frames
/// with any other `event.type` are dropped, which keeps the wire protocol
/// forward compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageCreated,
    MessageDeleted,
    ReactionAdded,
    ReactionRemoved,
    TypingStarted,
    PresenceUpdated,
    FriendRequestCreated,
    FriendRequestAccepted,
    FriendRemoved,
    ServerMemberJoined,
    ServerMemberLeft,
    RoleUpdated,
}

impl EventKind {
    pub fn from_wire(kind: &str) -> Option<Self> {
        Some(match kind {
            "message_created" => Self::MessageCreated,
            "message_deleted" => Self::MessageDeleted,
            "reaction_added" => Self::ReactionAdded,
            "reaction_removed" => Self::ReactionRemoved,
            "typing_started" => Self::TypingStarted,
            "presence_updated" => Self::PresenceUpdated,
            "friend_request_created" => Self::FriendRequestCreated,
            "friend_request_accepted" => Self::FriendRequestAccepted,
            "friend_removed" => Self::FriendRemoved,
            "server_member_joined" => Self::ServerMemberJoined,
            "server_member_left" => Self::ServerMemberLeft,
            "role_updated" => Self::RoleUpdated,
            _ => return None,
        })
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::MessageCreated => "message_created",
            Self::MessageDeleted => "message_deleted",
            Self::ReactionAdded => "reaction_added",
            Self::ReactionRemoved => "reaction_removed",
            Self::TypingStarted => "typing_started",
            Self::PresenceUpdated => "presence_updated",
            Self::FriendRequestCreated => "friend_request_created",
            Self::FriendRequestAccepted => "friend_request_accepted",
            Self::FriendRemoved => "friend_removed",
            Self::ServerMemberJoined => "server_member_joined",
            Self::ServerMemberLeft => "server_member_left",
            Self::RoleUpdated => "role_updated",
        }
    }
}

/// Client->server commands. `Identify` must be the first frame after every
/// socket open; `Subscribe` replaces the channel interest set wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientCommand {
    Identify { token: String },
    Subscribe { channel_ids: Vec<ChannelId> },
}

// ---------------------------------------------------------------------------
// Typed payloads for the main gateway events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub conversation: ConversationKey,
    pub message: Message,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDeleted {
    pub conversation: ConversationKey,
    pub message_id: MessageId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionUpdate {
    pub conversation: ConversationKey,
    pub message_id: MessageId,
    pub reactions: Vec<Reaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceUpdate {
    pub user_id: UserId,
    pub online: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingStarted {
    pub conversation: ConversationKey,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberUpdate {
    pub server_id: ServerId,
    pub member: ServerMember,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_decodes_with_and_without_meta() {
        let with_meta = r#"{"event":{"type":"presence_updated","payload":{"user_id":"u1","online":true}},"meta":{"ts":1700000000000,"node":"gw-3"}}"#;
        let envelope: Envelope = serde_json::from_str(with_meta).expect("decode");
        assert_eq!(envelope.event.kind, "presence_updated");
        assert_eq!(envelope.meta.ts, 1_700_000_000_000);

        let without_meta = r#"{"event":{"type":"typing_started","payload":{}}}"#;
        let envelope: Envelope = serde_json::from_str(without_meta).expect("decode");
        assert_eq!(envelope.meta.ts, 0);
    }

    #[test]
    fn envelope_without_event_type_is_a_decode_error() {
        let frame = r#"{"event":{"payload":{}},"meta":{"ts":1}}"#;
        assert!(serde_json::from_str::<Envelope>(frame).is_err());
    }

    #[test]
    fn event_kind_round_trips_known_names_and_rejects_unknown() {
        for kind in [
            EventKind::MessageCreated,
            EventKind::ReactionRemoved,
            EventKind::ServerMemberLeft,
        ] {
            assert_eq!(EventKind::from_wire(kind.as_wire()), Some(kind));
        }
        assert_eq!(EventKind::from_wire("voice_state_updated"), None);
    }

    #[test]
    fn message_tolerates_missing_optional_fields() {
        let raw = r#"{"id":"m1","text":"hi","created_at":"2024-05-01T12:00:00Z"}"#;
        let message: Message = serde_json::from_str(raw).expect("decode");
        assert!(message.author_id.is_none());
        assert!(message.webhook.is_none());
        assert!(message.reactions.is_empty());
    }
}
