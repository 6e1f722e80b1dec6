use shared::protocol::{Role, ServerMember};

use crate::resolve::{highest_role, ServerSnapshot};

/// One member-list section: members whose highest hoisted role is `role`,
/// or the trailing default section (`role: None`) for everyone else.
#[derive(Debug, Clone)]
pub struct RosterSection {
    pub role: Option<Role>,
    pub members: Vec<ServerMember>,
}

/// Sections the member list the way the sidebar renders it: each member
/// lands under their highest role flagged `separate_from_other_roles`
/// (same highest-position scan as message resolution), sections ordered by
/// descending position, unsectioned members last, alphabetical within a
/// section.
pub fn build_roster(snapshot: &ServerSnapshot) -> Vec<RosterSection> {
    let mut sectioned: Vec<(Role, Vec<ServerMember>)> = Vec::new();
    let mut unsectioned: Vec<ServerMember> = Vec::new();

    for member in snapshot.members.values() {
        let hoisted = highest_role(&member.role_ids, &snapshot.roles, |role| {
            role.separate_from_other_roles
        });
        match hoisted {
            Some(role) => {
                match sectioned.iter_mut().find(|(existing, _)| existing.id == role.id) {
                    Some((_, members)) => members.push(member.clone()),
                    None => sectioned.push((role.clone(), vec![member.clone()])),
                }
            }
            None => unsectioned.push(member.clone()),
        }
    }

    sectioned.sort_by(|(a, _), (b, _)| b.position.cmp(&a.position));

    let mut sections: Vec<RosterSection> = sectioned
        .into_iter()
        .map(|(role, mut members)| {
            members.sort_by(|a, b| a.user.username.cmp(&b.user.username));
            RosterSection {
                role: Some(role),
                members,
            }
        })
        .collect();

    if !unsectioned.is_empty() {
        unsectioned.sort_by(|a, b| a.user.username.cmp(&b.user.username));
        sections.push(RosterSection {
            role: None,
            members: unsectioned,
        });
    }
    sections
}
