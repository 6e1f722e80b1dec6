use std::collections::HashSet;

use shared::domain::MessageId;
use shared::protocol::{Message, Reaction};

/// Fixed page size for history fetches. A returned page shorter than this
/// marks the backward walk exhausted.
pub const PAGE_SIZE: u32 = 50;

/// The loaded slice of one conversation: history pages in fetch order (the
/// first page is the newest window, later pages extend backward in time)
/// plus a tail of live-appended messages.
#[derive(Debug, Default)]
pub struct MessageWindow {
    pages: Vec<Vec<Message>>,
    live: Vec<Message>,
    exhausted: bool,
}

impl MessageWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fetched page. Pages are ascending by time internally.
    pub fn push_page(&mut self, page: Vec<Message>) {
        if page.len() < PAGE_SIZE as usize {
            self.exhausted = true;
        }
        self.pages.push(page);
    }

    pub fn append_live(&mut self, message: Message) {
        self.live.push(message);
    }

    /// Whether another backward page may exist.
    pub fn has_more(&self) -> bool {
        !self.exhausted
    }

    /// Pagination cursor: the id of the oldest loaded history message, used
    /// as the `before` parameter of the next backward fetch.
    pub fn oldest_id(&self) -> Option<&MessageId> {
        self.pages
            .iter()
            .rev()
            .find_map(|page| page.first())
            .map(|message| &message.id)
    }

    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|page| page.is_empty()) && self.live.is_empty()
    }

    /// One chronologically ascending view over everything loaded. The sort
    /// is stable so equal timestamps keep input order (oldest page first,
    /// live tail last); duplicates by id keep the first occurrence, which
    /// collapses a message that arrived both live and in a history page.
    pub fn flattened(&self) -> Vec<Message> {
        let capacity = self.pages.iter().map(Vec::len).sum::<usize>() + self.live.len();
        let mut merged = Vec::with_capacity(capacity);
        for page in self.pages.iter().rev() {
            merged.extend(page.iter().cloned());
        }
        merged.extend(self.live.iter().cloned());
        merged.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let mut seen = HashSet::with_capacity(merged.len());
        merged.retain(|message| seen.insert(message.id.clone()));
        merged
    }

    /// Replaces the reaction list of the matching message wherever it is
    /// cached. Everything else about a received message stays immutable.
    pub fn patch_reactions(&mut self, message_id: &MessageId, reactions: &[Reaction]) {
        for message in self
            .pages
            .iter_mut()
            .flat_map(|page| page.iter_mut())
            .chain(self.live.iter_mut())
        {
            if message.id == *message_id {
                message.reactions = reactions.to_vec();
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/timeline_tests.rs"]
mod tests;
