pub mod dataset;
pub mod grid;
pub mod link;
pub mod picking;
pub mod point;
pub mod query;
pub mod selection;
pub mod spatial;
pub mod visibility;

pub use dataset::Dataset;
pub use grid::{CellKey, DensityGrid, PrioritizedPoint};
pub use point::{AttrValue, Point};
pub use query::{FilterChain, FilterOp, FilterPredicate, FilteredView, apply_filters};
pub use selection::SelectionSet;
