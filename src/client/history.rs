//! Recent command recall for the prompt.

use std::collections::VecDeque;

/// Maximum number of remembered commands.
pub const MAX_RECENT_COMMANDS: usize = 50;

/// Bounded, most-recent-first command list with a recall cursor.
///
/// The cursor starts at the "newest" position, which recalls an empty
/// string. `up` walks towards older entries and stops at the oldest; `down`
/// walks back and stops at the newest position.
#[derive(Debug, Clone, Default)]
pub struct RecentCommandHistory {
    entries: VecDeque<String>,
    cursor: Option<usize>,
}

impl RecentCommandHistory {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `command` as the most recent entry and reset the cursor.
    pub fn record(&mut self, command: impl Into<String>) {
        self.entries.push_front(command.into());
        self.entries.truncate(MAX_RECENT_COMMANDS);
        self.cursor = None;
    }

    /// Recall the next older command.
    pub fn up(&mut self) -> &str {
        let next = match self.cursor {
            None if !self.entries.is_empty() => Some(0),
            Some(i) if i + 1 < self.entries.len() => Some(i + 1),
            other => other,
        };
        self.cursor = next;
        self.current()
    }

    /// Recall the next newer command, or `""` past the newest.
    pub fn down(&mut self) -> &str {
        self.cursor = match self.cursor {
            Some(0) | None => None,
            Some(i) => Some(i - 1),
        };
        self.current()
    }

    /// Text at the cursor.
    #[must_use]
    pub fn current(&self) -> &str {
        self.cursor
            .and_then(|i| self.entries.get(i))
            .map_or("", String::as_str)
    }

    /// Number of stored commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no command has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored commands, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}
