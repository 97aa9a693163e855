pub mod budget;
pub mod metrics;

pub use budget::*;
pub use metrics::*;
