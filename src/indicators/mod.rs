// Indicator handling - normalization, type detection, hashing, moderation
// state and blocklist lookups.

pub mod blocklist;
pub mod detect;
pub mod normalize;
pub mod store;

pub use blocklist::{BlocklistMatcher, Verdict};
pub use store::{AddSummary, Feed, FeedWindow, IndicatorStore, Submission};
