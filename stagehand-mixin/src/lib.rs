//! Ordered async loading for game objects.
//!
//! An owner queues a sequence of steps (asset loads, primary asset preloads, polled conditions,
//! plain events), each with a callback. Steps may finish in any order, callbacks run strictly in
//! the order they were queued. Cancelling (or dropping the owner) stops everything without running
//! any more callbacks.
//!
//! Everything here is single threaded. Drive it from the game loop:
//!
//! ```ignore
//! loop {
//!     asset_manager.update();
//!     stagehand_base::ticker::tick(frame_time);
//! }
//! ```

mod config;
pub use config::async_mixin_config;
pub use config::set_async_mixin_config;
pub use config::AsyncMixinConfig;
pub use config::AsyncMixinConfigJson;

mod condition;
pub use condition::AsyncCondition;
pub use condition::AsyncConditionPredicate;
pub use condition::AsyncConditionResult;

mod step;

mod loading_state;

pub mod registry;
pub use registry::OwnerId;

mod mixin;
pub use mixin::AsyncMixin;
pub use mixin::LoadingHooks;
