pub mod config;
pub mod layer;
pub mod points;

pub use config::*;
pub use layer::*;
pub use points::*;
