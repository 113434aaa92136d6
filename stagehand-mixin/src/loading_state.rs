use crate::condition::AsyncCondition;
use crate::config::async_mixin_config;
use crate::mixin::LoadingHooks;
use crate::registry::{self, OwnerId};
use crate::step::{AsyncStep, CompletionSource, StepCallback};
use stagehand_base::{ticker, AssetPath, BundleName, PrimaryAssetId, TickerHandle};
use stagehand_loader::AssetManager;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

// The per-owner sequencer. Steps complete in whatever order their sources finish, but user
// callbacks always run in the order the steps were queued.
//
// Nothing here holds a RefCell borrow while calling out to user code (step callbacks, hooks,
// predicates), since any of them may queue more work, start, cancel, or drop the owner.
pub(crate) struct LoadingState {
    owner: OwnerId,
    hooks: Option<Weak<dyn LoadingHooks>>,

    steps: RefCell<Vec<Rc<AsyncStep>>>,
    // Steps from the last cancel. They are already inert, this only defers freeing them.
    steps_pending_destruction: RefCell<Vec<Rc<AsyncStep>>>,
    // Index of the first step whose callback has not run. Everything before it is done.
    current_step: Cell<usize>,

    has_started: Cell<bool>,
    // A preload is keeping assets resident, so the state must outlive the sequence
    preloaded_bundles: Cell<bool>,

    start_timer: Cell<Option<TickerHandle>>,
    destroy_timer: Cell<Option<TickerHandle>>,
}

impl LoadingState {
    pub fn new(
        owner: OwnerId,
        hooks: Option<Weak<dyn LoadingHooks>>,
    ) -> Self {
        LoadingState {
            owner,
            hooks,
            steps: Default::default(),
            steps_pending_destruction: Default::default(),
            current_step: Cell::new(0),
            has_started: Cell::new(false),
            preloaded_bundles: Cell::new(false),
            start_timer: Cell::new(None),
            destroy_timer: Cell::new(None),
        }
    }

    fn step_count(&self) -> usize {
        self.steps.borrow().len()
    }

    fn push_step(
        self: &Rc<Self>,
        callback: StepCallback,
        source: CompletionSource,
    ) {
        self.steps
            .borrow_mut()
            .push(AsyncStep::new(Some(callback), source));
        self.try_schedule_start();
    }

    pub fn async_load(
        self: &Rc<Self>,
        asset_manager: &AssetManager,
        paths: &[AssetPath],
        callback: StepCallback,
    ) {
        log::debug!("[{:?}] AsyncLoad {:?}", self.owner, paths);

        let handle = asset_manager.request_async_load(paths, "AsyncMixin");
        self.push_step(callback, CompletionSource::Handle(handle));
    }

    pub fn async_preload_primary_assets_and_bundles(
        self: &Rc<Self>,
        asset_manager: &AssetManager,
        ids: &[PrimaryAssetId],
        bundles: &[BundleName],
        callback: StepCallback,
    ) {
        log::debug!(
            "[{:?}] AsyncPreload Assets {:?}, Bundles {:?}",
            self.owner,
            ids,
            bundles
        );

        let mut source = CompletionSource::None;
        if !ids.is_empty() {
            self.preloaded_bundles.set(true);
            if let Some(handle) = asset_manager.preload_primary_assets(ids, bundles) {
                source = CompletionSource::Handle(handle);
            }
        }

        self.push_step(callback, source);
    }

    pub fn async_condition(
        self: &Rc<Self>,
        condition: Rc<AsyncCondition>,
        callback: StepCallback,
    ) {
        log::debug!("[{:?}] AsyncCondition {:?}", self.owner, condition);
        self.push_step(callback, CompletionSource::Condition(condition));
    }

    pub fn async_event(
        self: &Rc<Self>,
        callback: StepCallback,
    ) {
        log::debug!("[{:?}] AsyncEvent", self.owner);
        self.push_step(callback, CompletionSource::None);
    }

    // New work arrived, so stay alive and make sure the sequence gets started even if the owner
    // never calls start. A running sequence reaches the new step on its own.
    fn try_schedule_start(self: &Rc<Self>) {
        self.cancel_destroy(false);

        if !self.has_started.get() && self.start_timer.get().is_none() {
            let weak_self = Rc::downgrade(self);
            let handle = ticker::add_ticker(async_mixin_config().start_delay, move |_| {
                profiling::scope!("LoadingState auto start");
                if let Some(loading_state) = weak_self.upgrade() {
                    loading_state.start_timer.set(None);
                    loading_state.start();
                }
                false
            });
            self.start_timer.set(Some(handle));
        }
    }

    fn cancel_start_timer(&self) {
        if let Some(handle) = self.start_timer.take() {
            ticker::remove_ticker(handle);
        }
    }

    pub fn start(self: &Rc<Self>) {
        log::debug!(
            "[{:?}] Start (Current Progress {}/{})",
            self.owner,
            self.current_step.get() + 1,
            self.step_count()
        );

        self.cancel_start_timer();

        if !self.has_started.get() {
            self.has_started.set(true);
            self.notify_started();
        }

        self.try_complete_async_loading();
    }

    #[profiling::function]
    fn try_complete_async_loading(self: &Rc<Self>) {
        // Not started means this sequence already finished (or was canceled) and this is a
        // stale notification arriving on the same stack
        if !self.has_started.get() {
            return;
        }

        log::debug!(
            "[{:?}] TryCompleteAsyncLoading - (Current Progress {}/{})",
            self.owner,
            self.current_step.get() + 1,
            self.step_count()
        );

        loop {
            let index = self.current_step.get();
            let step = self.steps.borrow().get(index).cloned();
            let Some(step) = step else {
                break;
            };

            if step.is_loading_in_progress() {
                if step.is_complete_delegate_bound() {
                    log::debug!(
                        "[{:?}] Step {} - Still Loading (Waiting)",
                        self.owner,
                        index + 1
                    );
                    break;
                }

                log::debug!(
                    "[{:?}] Step {} - Still Loading (Listening)",
                    self.owner,
                    index + 1
                );
                let weak_self = Rc::downgrade(self);
                let bound = step.bind_complete_delegate(Box::new(move || {
                    if let Some(loading_state) = weak_self.upgrade() {
                        loading_state.try_complete_async_loading();
                    }
                }));

                if bound {
                    break;
                }

                // It finished between the check and the bind, go around again and take it
                log::warn!(
                    "[{:?}] Step {} ({}) completed while binding its listener",
                    self.owner,
                    index + 1,
                    step.describe()
                );
            } else {
                log::debug!(
                    "[{:?}] Step {} - Completed (Calling User)",
                    self.owner,
                    index + 1
                );

                // Advance first. The callback may queue more work and start again, and that nested
                // pass must pick up after this step.
                self.current_step.set(index + 1);
                step.execute_user_callback();
            }
        }

        // A callback may have queued and started more work, which can finish on a nested pass.
        // Only the pass that still sees has_started may complete the sequence.
        if self.is_loading_complete() && self.has_started.get() {
            self.complete_async_loading();
        }
    }

    fn complete_async_loading(&self) {
        log::debug!("[{:?}] CompleteAsyncLoading", self.owner);

        if self.has_started.get() {
            self.has_started.set(false);
            self.notify_finished();
        }

        // The finished hook may have queued more work
        if self.is_loading_complete()
            && !self.preloaded_bundles.get()
            && !self.is_loading_in_progress_or_pending()
        {
            self.request_destroy();
        }
    }

    fn notify_started(&self) {
        let hooks = self.hooks.as_ref().and_then(|x| x.upgrade());
        if let Some(hooks) = hooks {
            hooks.on_started_loading();
        }
    }

    fn notify_finished(&self) {
        let hooks = self.hooks.as_ref().and_then(|x| x.upgrade());
        if let Some(hooks) = hooks {
            hooks.on_finished_loading();
        }
    }

    /// Cancels every step without running callbacks and resets the sequence. `destroying` only
    /// affects logging.
    pub fn cancel_only(
        &self,
        destroying: bool,
    ) {
        if !destroying {
            log::debug!("[{:?}] Cancel", self.owner);
        }

        self.cancel_start_timer();

        let steps = std::mem::take(&mut *self.steps.borrow_mut());
        for step in &steps {
            step.cancel();
        }

        let previous = std::mem::replace(&mut *self.steps_pending_destruction.borrow_mut(), steps);
        drop(previous);

        self.preloaded_bundles.set(false);
        self.has_started.set(false);
        self.current_step.set(0);
    }

    pub fn cancel_and_destroy(&self) {
        self.cancel_only(false);
        self.request_destroy();
    }

    fn cancel_destroy(
        &self,
        destroying: bool,
    ) {
        if let Some(handle) = self.destroy_timer.take() {
            if !destroying {
                log::debug!("[{:?}] Destroy LoadingState (Canceled)", self.owner);
            }
            ticker::remove_ticker(handle);
        }
    }

    fn request_destroy(&self) {
        if self.is_pending_destroy() {
            return;
        }

        log::debug!("[{:?}] Destroy LoadingState (Requested)", self.owner);

        let owner = self.owner;
        let handle = ticker::add_ticker(std::time::Duration::ZERO, move |_| {
            let removed = registry::remove_loading_state(owner);
            if let Some(loading_state) = &removed {
                loading_state.destroy_timer.set(None);
            }
            drop(removed);
            false
        });
        self.destroy_timer.set(Some(handle));
    }

    pub fn is_loading_in_progress(&self) -> bool {
        let steps = self.steps.borrow();
        let current_step = self.current_step.get();
        if current_step >= steps.len() {
            return false;
        }

        if current_step == steps.len() - 1 {
            // Clone out, the step may evaluate a user predicate
            let step = steps[current_step].clone();
            drop(steps);
            return step.is_loading_in_progress();
        }

        // A valid step that isn't the last one means there is still loading to do
        true
    }

    pub fn is_loading_complete(&self) -> bool {
        !self.is_loading_in_progress()
    }

    pub fn is_loading_in_progress_or_pending(&self) -> bool {
        self.start_timer.get().is_some() || self.is_loading_in_progress()
    }

    pub fn is_pending_destroy(&self) -> bool {
        self.destroy_timer.get().is_some()
    }

    pub fn is_retaining_preload(&self) -> bool {
        self.preloaded_bundles.get()
    }
}

impl Drop for LoadingState {
    fn drop(&mut self) {
        log::debug!("[{:?}] Destroy LoadingState (Done)", self.owner);

        // Already on the way out, so cancel what we were doing and any pending destroy
        self.cancel_only(true);
        self.cancel_destroy(true);
    }
}
