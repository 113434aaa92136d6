use crate::config::async_mixin_config;
use stagehand_base::{ticker, TickerHandle};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AsyncConditionResult {
    TryAgain,
    Complete,
}

pub type AsyncConditionPredicate = Box<dyn FnMut() -> AsyncConditionResult>;

/// A completion gate driven by a predicate. Nothing is polled until something waits on it, then
/// the predicate is re-evaluated every poll interval until it answers Complete.
///
/// Conditions are shared: keep an `Rc` if you want to query it yourself, the loading sequence
/// holds another. Dropping the last reference stops any polling.
///
/// The predicate is evaluated whenever anyone asks, not only on poll ticks. A loading sequence that
/// reaches a condition step checks it several times in the same call (once to see if it is done,
/// again when attaching its listener), so a predicate that counts its calls will see more than one
/// call per poll interval. Base the answer on the state being waited for, not on call counts.
pub struct AsyncCondition {
    // Cleared once it answers Complete, so a complete condition is never asked again
    user_condition: RefCell<Option<AsyncConditionPredicate>>,
    completion: RefCell<Option<Box<dyn FnOnce()>>>,
    repeat_handle: Cell<Option<TickerHandle>>,
    poll_interval: Duration,
}

impl AsyncCondition {
    pub fn new(condition: impl FnMut() -> AsyncConditionResult + 'static) -> Rc<Self> {
        Self::with_poll_interval(async_mixin_config().condition_poll_interval, condition)
    }

    pub fn with_poll_interval(
        poll_interval: Duration,
        condition: impl FnMut() -> AsyncConditionResult + 'static,
    ) -> Rc<Self> {
        Rc::new(AsyncCondition {
            user_condition: RefCell::new(Some(Box::new(condition))),
            completion: Default::default(),
            repeat_handle: Cell::new(None),
            poll_interval,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn is_polling(&self) -> bool {
        self.repeat_handle.get().is_some()
    }

    /// Evaluates the predicate once. A condition without a predicate is complete.
    pub fn is_complete(&self) -> bool {
        // Take the predicate out while it runs, it may query this condition
        let Some(mut condition) = self.user_condition.borrow_mut().take() else {
            return true;
        };

        match condition() {
            AsyncConditionResult::Complete => true,
            AsyncConditionResult::TryAgain => {
                let mut user_condition = self.user_condition.borrow_mut();
                if user_condition.is_none() {
                    *user_condition = Some(condition);
                }
                false
            }
        }
    }

    /// Sets the callback to run when the condition completes, replacing any earlier one, and
    /// starts polling. Returns false if the condition is already complete, in which case the
    /// callback is dropped and will never run.
    pub fn bind_complete_delegate(
        self: &Rc<Self>,
        callback: impl FnOnce() + 'static,
    ) -> bool {
        if self.is_complete() {
            return false;
        }

        let old = self.completion.borrow_mut().replace(Box::new(callback));
        drop(old);

        if self.repeat_handle.get().is_none() {
            let weak_self = Rc::downgrade(self);
            let handle = ticker::add_ticker(self.poll_interval, move |_| {
                Self::poll(&weak_self)
            });
            self.repeat_handle.set(Some(handle));
        }

        true
    }

    /// Drops the bound callback without running it and stops polling. The predicate is kept, so
    /// the condition can be bound again later.
    pub fn unbind_complete_delegate(&self) {
        if let Some(handle) = self.repeat_handle.take() {
            ticker::remove_ticker(handle);
        }

        let old = self.completion.borrow_mut().take();
        drop(old);
    }

    fn poll(weak_self: &Weak<Self>) -> bool {
        match weak_self.upgrade() {
            Some(condition) => condition.try_to_continue(),
            None => false,
        }
    }

    // Returns true to keep polling
    #[profiling::function]
    fn try_to_continue(&self) -> bool {
        log::trace!("[{:p}] AsyncCondition poll", self);

        if !self.is_complete() {
            return true;
        }

        // Returning false ends the repeating ticker
        self.repeat_handle.set(None);
        let completion = self.completion.borrow_mut().take();
        if let Some(completion) = completion {
            completion();
        }
        false
    }
}

impl Drop for AsyncCondition {
    fn drop(&mut self) {
        if let Some(handle) = self.repeat_handle.take() {
            ticker::remove_ticker(handle);
        }
    }
}

impl std::fmt::Debug for AsyncCondition {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("AsyncCondition")
            .field("has_predicate", &self.user_condition.borrow().is_some())
            .field("polling", &self.is_polling())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(160);

    #[test]
    fn polls_until_complete_then_stops() {
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let condition = AsyncCondition::with_poll_interval(INTERVAL, move || {
            calls_clone.set(calls_clone.get() + 1);
            if calls_clone.get() > 3 {
                AsyncConditionResult::Complete
            } else {
                AsyncConditionResult::TryAgain
            }
        });

        let fired = Rc::new(Cell::new(0));
        let fired_clone = fired.clone();
        assert!(condition.bind_complete_delegate(move || fired_clone.set(fired_clone.get() + 1)));
        // Binding evaluates once
        assert_eq!(calls.get(), 1);
        assert!(condition.is_polling());

        ticker::tick(INTERVAL);
        ticker::tick(INTERVAL);
        assert_eq!(fired.get(), 0);
        ticker::tick(INTERVAL);
        assert_eq!(fired.get(), 1);
        assert_eq!(calls.get(), 4);
        assert!(!condition.is_polling());

        for _ in 0..5 {
            ticker::tick(INTERVAL);
        }
        assert_eq!(fired.get(), 1);
        assert_eq!(calls.get(), 4);
        assert!(condition.is_complete());
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn complete_condition_rejects_delegate() {
        let condition =
            AsyncCondition::with_poll_interval(INTERVAL, || AsyncConditionResult::Complete);
        assert!(!condition.bind_complete_delegate(|| panic!("must not run")));
        assert!(!condition.is_polling());
        ticker::tick(INTERVAL);
    }

    #[test]
    fn last_delegate_wins() {
        let done = Rc::new(Cell::new(false));
        let done_clone = done.clone();
        let condition = AsyncCondition::with_poll_interval(INTERVAL, move || {
            if done_clone.get() {
                AsyncConditionResult::Complete
            } else {
                AsyncConditionResult::TryAgain
            }
        });

        let first = Rc::new(Cell::new(false));
        let second = Rc::new(Cell::new(false));
        let first_clone = first.clone();
        let second_clone = second.clone();
        assert!(condition.bind_complete_delegate(move || first_clone.set(true)));
        assert!(condition.bind_complete_delegate(move || second_clone.set(true)));

        done.set(true);
        ticker::tick(INTERVAL);
        assert!(!first.get());
        assert!(second.get());
    }

    #[test]
    fn unbind_stops_polling_and_allows_rebind() {
        let done = Rc::new(Cell::new(false));
        let done_clone = done.clone();
        let condition = AsyncCondition::with_poll_interval(INTERVAL, move || {
            if done_clone.get() {
                AsyncConditionResult::Complete
            } else {
                AsyncConditionResult::TryAgain
            }
        });

        assert!(condition.bind_complete_delegate(|| panic!("must not run")));
        assert!(condition.is_polling());
        condition.unbind_complete_delegate();
        assert!(!condition.is_polling());

        done.set(true);
        ticker::tick(INTERVAL);
        assert!(!condition.is_polling());

        // Still answers once asked again
        done.set(false);
        let fired = Rc::new(Cell::new(false));
        let fired_clone = fired.clone();
        assert!(condition.bind_complete_delegate(move || fired_clone.set(true)));
        done.set(true);
        ticker::tick(INTERVAL);
        assert!(fired.get());
    }

    #[test]
    fn dropping_condition_stops_polling() {
        let before = ticker::ticker_count();
        let condition =
            AsyncCondition::with_poll_interval(INTERVAL, || AsyncConditionResult::TryAgain);
        let fired = Rc::new(Cell::new(false));
        let fired_clone = fired.clone();
        condition.bind_complete_delegate(move || fired_clone.set(true));
        assert_eq!(ticker::ticker_count(), before + 1);

        drop(condition);
        assert_eq!(ticker::ticker_count(), before);
        ticker::tick(INTERVAL);
        assert!(!fired.get());
    }
}
