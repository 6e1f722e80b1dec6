use shared::domain::UserId;
use shared::protocol::Message;

/// Two messages from the same sender closer than this are rendered as one
/// visual group (repeated avatar/name suppressed).
const GROUP_WINDOW_MS: i64 = 5 * 60 * 1000;

#[derive(PartialEq)]
enum SenderKey<'a> {
    Id(&'a UserId),
    Name(&'a str),
}

fn sender_key(message: &Message) -> Option<SenderKey<'_>> {
    if let Some(id) = &message.author_id {
        return Some(SenderKey::Id(id));
    }
    if let Some(webhook) = &message.webhook {
        return Some(SenderKey::Name(&webhook.username));
    }
    None
}

/// Whether `curr` should render grouped with `prev`: same sender identity
/// (by id, falling back to the display name when no id is present) and
/// timestamps strictly less than five minutes apart. Symmetric in its
/// arguments; purely a rendering decision.
pub fn should_group(prev: &Message, curr: &Message) -> bool {
    let (Some(a), Some(b)) = (sender_key(prev), sender_key(curr)) else {
        return false;
    };
    if a != b {
        return false;
    }
    let delta_ms = (curr.created_at - prev.created_at).num_milliseconds().abs();
    delta_ms < GROUP_WINDOW_MS
}
