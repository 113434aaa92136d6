//! Owner -> loading state table for the current thread.
//!
//! A loading state only exists while an owner has queued work (or is retaining preloaded assets),
//! so most owners never have an entry.

use crate::loading_state::LoadingState;
use crate::mixin::LoadingHooks;
use stagehand_base::hashing::HashMap;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies the owner of a loading sequence. Ids are unique for the life of the process.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct OwnerId(u64);

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

impl OwnerId {
    pub fn next() -> Self {
        OwnerId(NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

thread_local! {
    static LOADING_STATES: RefCell<HashMap<OwnerId, Rc<LoadingState>>> = RefCell::new(HashMap::default());
}

pub(crate) fn get_or_create_loading_state(
    owner: OwnerId,
    hooks: Option<Weak<dyn LoadingHooks>>,
) -> Rc<LoadingState> {
    LOADING_STATES.with(|loading_states| {
        loading_states
            .borrow_mut()
            .entry(owner)
            .or_insert_with(|| {
                log::debug!("[{:?}] Create LoadingState", owner);
                Rc::new(LoadingState::new(owner, hooks))
            })
            .clone()
    })
}

pub(crate) fn find_loading_state(owner: OwnerId) -> Option<Rc<LoadingState>> {
    LOADING_STATES
        .try_with(|loading_states| loading_states.borrow().get(&owner).cloned())
        .ok()
        .flatten()
}

/// Drops the registry's reference. If nothing else holds the state it is destroyed here, which
/// cancels anything it was still waiting on.
pub(crate) fn remove_loading_state(owner: OwnerId) -> Option<Rc<LoadingState>> {
    let removed = LOADING_STATES
        .try_with(|loading_states| loading_states.borrow_mut().remove(&owner))
        .ok()
        .flatten();

    if removed.is_some() {
        log::debug!("[{:?}] Remove LoadingState", owner);
    }

    removed
}

pub fn has_loading_state(owner: OwnerId) -> bool {
    LOADING_STATES
        .try_with(|loading_states| loading_states.borrow().contains_key(&owner))
        .unwrap_or(false)
}

pub fn loading_state_count() -> usize {
    LOADING_STATES
        .try_with(|loading_states| loading_states.borrow().len())
        .unwrap_or(0)
}

/// Cancels and drops every loading state on this thread. No callbacks or hooks run. Intended for
/// shutdown, before the asset manager goes away.
pub fn clear_loading_states() {
    let loading_states: Vec<_> = LOADING_STATES
        .try_with(|loading_states| loading_states.borrow_mut().drain().collect())
        .unwrap_or_default();

    log::info!("Clearing {} loading states", loading_states.len());
    for (_, loading_state) in &loading_states {
        loading_state.cancel_only(true);
    }
}
