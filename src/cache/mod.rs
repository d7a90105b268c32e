// Cache module for aggregated results.
// Bounded in-memory TTL store plus the clocks that drive its expiry.

pub mod clock;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{CacheStats, CachedData, DEFAULT_MAX_ENTRIES, DEFAULT_TTL, TtlCache};
