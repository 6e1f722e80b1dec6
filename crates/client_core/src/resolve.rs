use std::collections::HashMap;

use shared::domain::{MessageId, RoleId, UserId};
use shared::protocol::{Message, Role, ServerMember, User, WebhookAuthor};

/// Display name used whenever identity data has not loaded (or never will).
/// The UI always renders something for every message, so resolution degrades
/// to this placeholder instead of failing.
pub const UNKNOWN_USERNAME: &str = "Unknown";

/// Read-only lookup state for a server conversation. Recomputed wholesale
/// whenever the source collections change; resolvers never mutate it.
#[derive(Debug, Clone, Default)]
pub struct ServerSnapshot {
    pub members: HashMap<UserId, ServerMember>,
    pub roles: HashMap<RoleId, Role>,
}

impl ServerSnapshot {
    pub fn from_collections(
        members: impl IntoIterator<Item = ServerMember>,
        roles: impl IntoIterator<Item = Role>,
    ) -> Self {
        Self {
            members: members
                .into_iter()
                .map(|member| (member.user.id.clone(), member))
                .collect(),
            roles: roles.into_iter().map(|role| (role.id.clone(), role)).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConversationContext<'a> {
    Direct {
        current_user: &'a User,
        other_user: &'a User,
    },
    Server(&'a ServerSnapshot),
}

#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub user: User,
    pub role: Option<Role>,
    pub icon_role: Option<Role>,
}

/// Resolves who a message should display as.
///
/// Webhook messages bypass lookup entirely. In a direct conversation the
/// sender is whichever participant matches the author id; roles never apply.
/// In a server conversation the sender comes from the membership map, with
/// the highest-position role and, independently, the highest-position role
/// carrying an icon. Missing data resolves to the `Unknown` placeholder.
pub fn resolve_identity(message: &Message, context: &ConversationContext<'_>) -> ResolvedIdentity {
    if let Some(webhook) = &message.webhook {
        return ResolvedIdentity {
            user: webhook_user(webhook, &message.id),
            role: None,
            icon_role: None,
        };
    }

    match context {
        ConversationContext::Direct {
            current_user,
            other_user,
        } => {
            let user = match &message.author_id {
                Some(id) if *id == current_user.id => (*current_user).clone(),
                Some(id) if *id == other_user.id => (*other_user).clone(),
                Some(id) => placeholder_user(id.clone()),
                None => placeholder_user(UserId::new("unknown")),
            };
            ResolvedIdentity {
                user,
                role: None,
                icon_role: None,
            }
        }
        ConversationContext::Server(snapshot) => {
            let Some(author_id) = &message.author_id else {
                return ResolvedIdentity {
                    user: placeholder_user(UserId::new("unknown")),
                    role: None,
                    icon_role: None,
                };
            };
            match snapshot.members.get(author_id) {
                Some(member) => {
                    let role = highest_role(&member.role_ids, &snapshot.roles, |_| true);
                    let icon_role =
                        highest_role(&member.role_ids, &snapshot.roles, |role| role.icon.is_some());
                    ResolvedIdentity {
                        user: member.user.clone(),
                        role: role.cloned(),
                        icon_role: icon_role.cloned(),
                    }
                }
                None => ResolvedIdentity {
                    user: placeholder_user(author_id.clone()),
                    role: None,
                    icon_role: None,
                },
            }
        }
    }
}

/// The role with the greatest `position` among `role_ids`, restricted to
/// roles accepted by `eligible`. The scan walks assignment order with a
/// strict comparison, so the first role seen at the maximal position wins —
/// the documented tie-break. Unknown role ids are skipped.
pub fn highest_role<'a>(
    role_ids: &[RoleId],
    roles: &'a HashMap<RoleId, Role>,
    mut eligible: impl FnMut(&Role) -> bool,
) -> Option<&'a Role> {
    let mut best: Option<&Role> = None;
    for role_id in role_ids {
        let Some(role) = roles.get(role_id) else {
            continue;
        };
        if !eligible(role) {
            continue;
        }
        if best.map_or(true, |current| role.position > current.position) {
            best = Some(role);
        }
    }
    best
}

/// The synthetic id embeds the message id so webhook identities can never
/// collide with real user ids.
fn webhook_user(webhook: &WebhookAuthor, message_id: &MessageId) -> User {
    User {
        id: UserId::new(format!("webhook:{message_id}")),
        username: webhook.username.clone(),
        avatar_url: webhook.avatar_url.clone(),
    }
}

pub(crate) fn placeholder_user(id: UserId) -> User {
    User {
        id,
        username: UNKNOWN_USERNAME.to_string(),
        avatar_url: None,
    }
}

#[cfg(test)]
#[path = "tests/resolve_tests.rs"]
mod tests;
