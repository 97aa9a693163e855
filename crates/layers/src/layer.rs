#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u64);

/// A map layer the host can address and draw.
pub trait Layer {
    fn id(&self) -> LayerId;

    /// Whether the layer holds data it can render.
    fn is_ready(&self) -> bool;
}
