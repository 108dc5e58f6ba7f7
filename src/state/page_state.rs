/// Discovery state definitions for tracking traversal progress
///
/// This module defines the states a URL moves through while the frontier explores a site.
use std::fmt;

/// Represents the current state of a URL during discovery
///
/// ```text
/// unseen -> enqueued -> fetched -> links_extracted
///                          \------> skipped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageState {
    /// Never encountered in this traversal
    Unseen,

    /// Accepted into the queue with its first-seen depth
    Enqueued,

    /// Fetch attempted and answered
    Fetched,

    /// Children were extracted and offered to the queue
    LinksExtracted,

    /// No children explored: fetch failed, policy refused, or the page was not markup
    Skipped,
}

impl PageState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LinksExtracted | Self::Skipped)
    }

    /// Returns true once the URL has been through the queue
    ///
    /// Anything past `Unseen` counts as visited for deduplication.
    pub fn is_seen(&self) -> bool {
        !matches!(self, Self::Unseen)
    }

    /// Checks whether moving to `next` follows the state machine
    pub fn can_transition_to(&self, next: PageState) -> bool {
        matches!(
            (self, next),
            (Self::Unseen, Self::Enqueued)
                | (Self::Enqueued, Self::Fetched)
                | (Self::Enqueued, Self::Skipped)
                | (Self::Fetched, Self::LinksExtracted)
                | (Self::Fetched, Self::Skipped)
        )
    }

    /// Short lowercase name used in log output
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unseen => "unseen",
            Self::Enqueued => "enqueued",
            Self::Fetched => "fetched",
            Self::LinksExtracted => "links_extracted",
            Self::Skipped => "skipped",
        }
    }
}

impl Default for PageState {
    fn default() -> Self {
        Self::Unseen
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
