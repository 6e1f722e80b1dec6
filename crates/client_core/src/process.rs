use shared::protocol::{Message, Role, User};

use crate::grouping::should_group;
use crate::reply::{resolve_reply, ReplyPreview};
use crate::resolve::{resolve_identity, ConversationContext};

/// A message enriched with everything the renderer needs: the resolved
/// sender, its highest role and icon role, the resolved reply preview, and
/// whether the message opens a new visual group. Purely a view projection —
/// recomputed on demand from the flattened window and the current
/// snapshots, never stored.
#[derive(Debug, Clone)]
pub struct ProcessedMessage {
    pub message: Message,
    pub user: User,
    pub role: Option<Role>,
    pub icon_role: Option<Role>,
    pub reply: Option<ReplyPreview>,
    pub start_of_group: bool,
}

/// Projects a flattened, chronologically ordered window into display form.
/// Reply targets are looked up in the same slice, so live-appended messages
/// are immediately resolvable as targets.
pub fn process_messages(
    messages: &[Message],
    context: &ConversationContext<'_>,
) -> Vec<ProcessedMessage> {
    let mut processed = Vec::with_capacity(messages.len());
    for (index, message) in messages.iter().enumerate() {
        let identity = resolve_identity(message, context);
        let reply = resolve_reply(message, messages, context);
        let start_of_group = match index.checked_sub(1).and_then(|prev| messages.get(prev)) {
            Some(prev) => !should_group(prev, message),
            None => true,
        };
        processed.push(ProcessedMessage {
            message: message.clone(),
            user: identity.user,
            role: identity.role,
            icon_role: identity.icon_role,
            reply,
            start_of_group,
        });
    }
    processed
}

#[cfg(test)]
#[path = "tests/process_tests.rs"]
mod tests;
