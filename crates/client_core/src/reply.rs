use shared::domain::UserId;
use shared::protocol::{Message, Role, User};

use crate::resolve::{placeholder_user, resolve_identity, ConversationContext};

/// Lightweight projection of a replied-to message, rendered above the
/// replying message.
#[derive(Debug, Clone)]
pub struct ReplyPreview {
    pub user: User,
    pub role: Option<Role>,
    pub text: String,
}

/// Resolves a message's reply reference against the loaded window.
///
/// Returns `None` only for messages that do not reply to anything. When the
/// target is inside `loaded` the preview carries its text and its identity
/// resolved under the same context. When the target is outside the window
/// (older than any loaded page, or the cache was cleared) the preview falls
/// back to the embedded snapshot when the origin supplied one, else to the
/// `Unknown` placeholder — the preview itself is never omitted, so the UI
/// still shows that a reply exists. This is a purely client-side join; no
/// fetch is issued for out-of-window targets.
pub fn resolve_reply(
    message: &Message,
    loaded: &[Message],
    context: &ConversationContext<'_>,
) -> Option<ReplyPreview> {
    let target_id = message.reply_to.as_ref()?;

    if let Some(target) = loaded.iter().find(|candidate| candidate.id == *target_id) {
        let identity = resolve_identity(target, context);
        return Some(ReplyPreview {
            user: identity.user,
            role: identity.role,
            text: target.text.clone(),
        });
    }

    if let Some(snapshot) = &message.reply_snapshot {
        return Some(ReplyPreview {
            user: User {
                id: UserId::new("unknown"),
                username: snapshot.username.clone(),
                avatar_url: None,
            },
            role: None,
            text: snapshot.text.clone(),
        });
    }

    Some(ReplyPreview {
        user: placeholder_user(UserId::new("unknown")),
        role: None,
        text: String::new(),
    })
}
