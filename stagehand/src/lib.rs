#[cfg(feature = "stagehand-base")]
pub use stagehand_base as base;

#[cfg(feature = "stagehand-loader")]
pub use stagehand_loader as loader;

#[cfg(feature = "stagehand-mixin")]
pub use stagehand_mixin as mixin;
