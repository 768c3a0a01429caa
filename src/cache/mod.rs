pub mod clock;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{
    CacheEntry, CacheKey, Checkout, RefreshStatus, RefreshTicket, RefreshWaiter, SnapshotCache,
};
