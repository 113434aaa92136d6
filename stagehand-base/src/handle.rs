/// Loading ID allocated by the asset manager to track one resident (or loading) asset. Zero is
/// never allocated.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub struct LoadHandle(pub u64);

/// Operations on an asset reference. Handles send these when they are canceled or dropped so that
/// ref counting happens during the asset manager's update, never from inside a drop.
#[derive(Debug, PartialEq, Eq)]
pub enum RefOp {
    Decrease(LoadHandle),
}
