pub mod metric;
pub mod snapshot;
pub mod state;

pub use metric::*;
pub use snapshot::*;
pub use state::*;
