use crate::condition::AsyncCondition;
use crate::loading_state::LoadingState;
use crate::registry::{self, OwnerId};
use stagehand_base::{AssetPath, BundleName, PrimaryAssetId};
use stagehand_loader::{AssetManager, LoadedAsset};
use std::rc::{Rc, Weak};

/// Notifications an owner gets about its loading sequence. Both may queue more work and start
/// loading again.
pub trait LoadingHooks {
    // The first time a sequence starts after being idle
    fn on_started_loading(&self) {}

    // Every queued callback has run
    fn on_finished_loading(&self) {}
}

/// Owner-side entry point for ordered async loading.
///
/// Queue loads, preloads, conditions, and plain events, and their callbacks run in the order they
/// were queued no matter which finishes first. Loading starts on the next tick if the owner doesn't
/// call [`AsyncMixin::start_async_loading`] itself.
///
/// Typically embedded in the object that does the loading, with that object passed in as the
/// [`LoadingHooks`]:
///
/// ```ignore
/// let widget = Rc::new_cyclic(|weak: &Weak<Widget>| Widget {
///     loading: AsyncMixin::with_hooks(&asset_manager, weak.clone()),
/// });
/// ```
///
/// Without hooks it is a standalone loading scope. Dropping the mixin cancels everything it queued.
pub struct AsyncMixin {
    id: OwnerId,
    asset_manager: AssetManager,
    hooks: Option<Weak<dyn LoadingHooks>>,
}

impl AsyncMixin {
    pub fn new(asset_manager: &AssetManager) -> Self {
        AsyncMixin {
            id: OwnerId::next(),
            asset_manager: asset_manager.clone(),
            hooks: None,
        }
    }

    pub fn with_hooks(
        asset_manager: &AssetManager,
        hooks: Weak<dyn LoadingHooks>,
    ) -> Self {
        AsyncMixin {
            id: OwnerId::next(),
            asset_manager: asset_manager.clone(),
            hooks: Some(hooks),
        }
    }

    pub fn owner_id(&self) -> OwnerId {
        self.id
    }

    pub fn asset_manager(&self) -> &AssetManager {
        &self.asset_manager
    }

    fn loading_state(&self) -> Rc<LoadingState> {
        registry::get_or_create_loading_state(self.id, self.hooks.clone())
    }

    /// Loads one asset, then calls `callback` when its turn comes
    pub fn async_load(
        &self,
        path: impl Into<AssetPath>,
        callback: impl FnOnce() + 'static,
    ) {
        let path = path.into();
        self.loading_state()
            .async_load(&self.asset_manager, &[path], Box::new(callback));
    }

    /// Loads several assets as one step
    pub fn async_load_many(
        &self,
        paths: &[AssetPath],
        callback: impl FnOnce() + 'static,
    ) {
        self.loading_state()
            .async_load(&self.asset_manager, paths, Box::new(callback));
    }

    /// Loads one asset and hands it to `callback`, or `None` if it could not be loaded
    pub fn async_load_then(
        &self,
        path: impl Into<AssetPath>,
        callback: impl FnOnce(Option<LoadedAsset>) + 'static,
    ) {
        let path = path.into();
        let asset_manager = self.asset_manager.clone();
        let requested_path = path.clone();
        self.loading_state().async_load(
            &self.asset_manager,
            &[path],
            Box::new(move || callback(asset_manager.get_asset(&requested_path))),
        );
    }

    /// Preloads primary assets along with the given bundles. The assets stay resident until
    /// loading is canceled, even after the sequence finishes. With no ids this is just an event.
    pub fn async_preload_primary_assets_and_bundles(
        &self,
        ids: &[PrimaryAssetId],
        bundles: &[BundleName],
        callback: impl FnOnce() + 'static,
    ) {
        self.loading_state().async_preload_primary_assets_and_bundles(
            &self.asset_manager,
            ids,
            bundles,
            Box::new(callback),
        );
    }

    /// Waits for `condition` to complete
    pub fn async_condition(
        &self,
        condition: Rc<AsyncCondition>,
        callback: impl FnOnce() + 'static,
    ) {
        self.loading_state()
            .async_condition(condition, Box::new(callback));
    }

    /// A step that is complete as soon as it is reached, useful for running code in sequence
    pub fn async_event(
        &self,
        callback: impl FnOnce() + 'static,
    ) {
        self.loading_state().async_event(Box::new(callback));
    }

    /// Starts now instead of waiting for the next tick. Safe to call repeatedly. With nothing
    /// queued, both hooks are called right away.
    pub fn start_async_loading(&self) {
        if self.is_loading_in_progress_or_pending() {
            if let Some(loading_state) = registry::find_loading_state(self.id) {
                loading_state.start();
            }
        } else {
            // Nothing to do, don't allocate a loading state just to throw it away
            let hooks = self.hooks.as_ref().and_then(|x| x.upgrade());
            if let Some(hooks) = hooks {
                hooks.on_started_loading();
                hooks.on_finished_loading();
            }
        }
    }

    /// Drops everything queued without running any callbacks and releases retained preloads
    pub fn cancel_async_loading(&self) {
        if let Some(loading_state) = registry::find_loading_state(self.id) {
            loading_state.cancel_and_destroy();
        }
    }

    pub fn is_async_loading_in_progress(&self) -> bool {
        registry::find_loading_state(self.id)
            .map(|x| x.is_loading_in_progress())
            .unwrap_or(false)
    }

    pub fn is_loading_in_progress_or_pending(&self) -> bool {
        registry::find_loading_state(self.id)
            .map(|x| x.is_loading_in_progress_or_pending())
            .unwrap_or(false)
    }

    pub fn has_loading_state(&self) -> bool {
        registry::has_loading_state(self.id)
    }

    pub fn is_pending_destroy(&self) -> bool {
        registry::find_loading_state(self.id)
            .map(|x| x.is_pending_destroy())
            .unwrap_or(false)
    }

    pub fn is_retaining_preload(&self) -> bool {
        registry::find_loading_state(self.id)
            .map(|x| x.is_retaining_preload())
            .unwrap_or(false)
    }
}

impl Drop for AsyncMixin {
    fn drop(&mut self) {
        // A callback that is running right now may still hold the state, cancel it so nothing
        // else fires for this owner
        if let Some(loading_state) = registry::remove_loading_state(self.id) {
            loading_state.cancel_only(true);
        }
    }
}

impl std::fmt::Debug for AsyncMixin {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("AsyncMixin")
            .field("id", &self.id)
            .field("has_hooks", &self.hooks.is_some())
            .field("has_loading_state", &self.has_loading_state())
            .finish()
    }
}
