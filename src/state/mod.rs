//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `PageState`: Tracks a URL through discovery (unseen, enqueued, fetched, links extracted, skipped)
//! - `Pacer`: Per-domain pacing clocks that serialize and space requests to one domain
//! - `DomainClock`: The timing state behind each pacing clock

mod pacing;
mod page_state;

// Re-export main types
pub use pacing::{DomainClock, Pacer, PacingPermit};
pub use page_state::PageState;
