pub mod dashboard;
pub mod system;

pub use dashboard::*;
pub use system::*;
