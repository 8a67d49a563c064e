//! Round-robin cursor over the activity feed.

use crate::types::Activity;

#[derive(Debug, Clone)]
pub struct ActivityCycler {
    feed: Vec<Activity>,
    cursor: usize,
}

impl ActivityCycler {
    pub fn new(feed: Vec<Activity>) -> Self {
        Self { feed, cursor: 0 }
    }

    /// Returns the activity under the cursor and advances it, wrapping at the
    /// end. `None` only for an empty feed.
    pub fn next(&mut self) -> Option<&Activity> {
        if self.feed.is_empty() {
            return None;
        }
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.feed.len();
        self.feed.get(index)
    }

    pub fn len(&self) -> usize {
        self.feed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feed.is_empty()
    }

    pub fn position(&self) -> usize {
        self.cursor
    }
}
