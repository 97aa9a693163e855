pub mod attr_label;
pub mod payload;
pub mod tooltip;

pub use attr_label::*;
pub use payload::*;
pub use tooltip::*;
