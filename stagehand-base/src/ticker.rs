//! A cooperative scheduler for work that should happen on a later turn of the game loop.
//!
//! Everything that wants to "run next frame" or "poll every so often" registers a callback here.
//! The game loop calls [`tick`] once per frame with the elapsed time. Callbacks run on the calling
//! thread, in registration order, and return `true` to stay registered or `false` to be removed.
//!
//! The ticker never holds its internal borrow while a callback runs, so callbacks may freely add
//! or remove tickers (including themselves).

use crate::hashing::HashSet;
use std::cell::RefCell;
use std::time::Duration;

/// Identifies a registered callback so it can be removed later. Handles are never reused.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct TickerHandle(u64);

type TickerCallback = Box<dyn FnMut(Duration) -> bool>;

struct TickerEntry {
    handle: TickerHandle,
    delay: Duration,
    fire_time: Duration,
    callback: TickerCallback,
}

#[derive(Default)]
struct TickerInner {
    next_handle_index: u64,
    current_time: Duration,
    tickers: Vec<TickerEntry>,
    // Entries taken out of `tickers` by the tick that is currently running
    executing: HashSet<TickerHandle>,
    // Entries removed by a callback while they were out for execution. They must not be
    // re-registered even if their callback asks to continue.
    removed_while_executing: HashSet<TickerHandle>,
}

#[derive(Default)]
pub struct Ticker {
    inner: RefCell<TickerInner>,
}

impl Ticker {
    /// Registers a callback that first fires once `delay` has elapsed. A zero delay fires on the
    /// next call to [`Ticker::tick`], never during the tick that registered it. If the callback
    /// returns `true` it fires again after another `delay`.
    pub fn add_ticker(
        &self,
        delay: Duration,
        callback: impl FnMut(Duration) -> bool + 'static,
    ) -> TickerHandle {
        let mut inner = self.inner.borrow_mut();
        inner.next_handle_index += 1;
        let handle = TickerHandle(inner.next_handle_index);
        let fire_time = inner.current_time + delay;
        inner.tickers.push(TickerEntry {
            handle,
            delay,
            fire_time,
            callback: Box::new(callback),
        });
        handle
    }

    pub fn remove_ticker(
        &self,
        handle: TickerHandle,
    ) {
        let removed = {
            let mut inner = self.inner.borrow_mut();
            if let Some(index) = inner.tickers.iter().position(|x| x.handle == handle) {
                Some(inner.tickers.remove(index))
            } else {
                if inner.executing.contains(&handle) {
                    inner.removed_while_executing.insert(handle);
                } else {
                    log::trace!("remove_ticker {:?} is not registered", handle);
                }
                None
            }
        };

        // The callback may own things whose drop removes other tickers, so drop it after the
        // borrow ends
        drop(removed);
    }

    pub fn is_registered(
        &self,
        handle: TickerHandle,
    ) -> bool {
        let inner = self.inner.borrow();
        inner.tickers.iter().any(|x| x.handle == handle)
            || (inner.executing.contains(&handle)
                && !inner.removed_while_executing.contains(&handle))
    }

    pub fn ticker_count(&self) -> usize {
        let inner = self.inner.borrow();
        inner.tickers.len() + inner.executing.len() - inner.removed_while_executing.len()
    }

    pub fn current_time(&self) -> Duration {
        self.inner.borrow().current_time
    }

    #[profiling::function]
    pub fn tick(
        &self,
        delta: Duration,
    ) {
        let due = {
            let mut inner = self.inner.borrow_mut();
            inner.current_time += delta;
            let current_time = inner.current_time;
            let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.tickers)
                .into_iter()
                .partition(|x| x.fire_time <= current_time);
            inner.tickers = waiting;
            for entry in &due {
                inner.executing.insert(entry.handle);
            }
            due
        };

        for mut entry in due {
            // An earlier callback in this same tick may have removed this one
            let removed_already = self
                .inner
                .borrow()
                .removed_while_executing
                .contains(&entry.handle);
            let keep = !removed_already && (entry.callback)(delta);

            let discarded = {
                let mut inner = self.inner.borrow_mut();
                inner.executing.remove(&entry.handle);
                let removed = inner.removed_while_executing.remove(&entry.handle);
                if keep && !removed {
                    entry.fire_time = inner.current_time + entry.delay;
                    inner.tickers.push(entry);
                    None
                } else {
                    Some(entry)
                }
            };
            drop(discarded);
        }
    }
}

thread_local! {
    static CORE_TICKER: Ticker = Ticker::default();
}

/// Registers a callback on this thread's core ticker. See [`Ticker::add_ticker`].
pub fn add_ticker(
    delay: Duration,
    callback: impl FnMut(Duration) -> bool + 'static,
) -> TickerHandle {
    CORE_TICKER.with(|ticker| ticker.add_ticker(delay, callback))
}

/// Removes a callback from this thread's core ticker. Safe to call from inside a callback and
/// during thread shutdown (it does nothing once the ticker is gone).
pub fn remove_ticker(handle: TickerHandle) {
    let _ = CORE_TICKER.try_with(|ticker| ticker.remove_ticker(handle));
}

pub fn is_registered(handle: TickerHandle) -> bool {
    CORE_TICKER
        .try_with(|ticker| ticker.is_registered(handle))
        .unwrap_or(false)
}

pub fn ticker_count() -> usize {
    CORE_TICKER.with(|ticker| ticker.ticker_count())
}

pub fn current_time() -> Duration {
    CORE_TICKER.with(|ticker| ticker.current_time())
}

/// Advances this thread's core ticker. Call once per frame from the game loop.
pub fn tick(delta: Duration) {
    CORE_TICKER.with(|ticker| ticker.tick(delta))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    const FRAME: Duration = Duration::from_millis(16);

    #[test]
    fn zero_delay_fires_next_tick_only() {
        let ticker = Ticker::default();
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        ticker.add_ticker(Duration::ZERO, move |_| {
            count_clone.set(count_clone.get() + 1);
            false
        });

        assert_eq!(count.get(), 0);
        ticker.tick(FRAME);
        assert_eq!(count.get(), 1);
        ticker.tick(FRAME);
        assert_eq!(count.get(), 1);
        assert_eq!(ticker.ticker_count(), 0);
    }

    #[test]
    fn repeating_ticker_respects_delay() {
        let ticker = Ticker::default();
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let handle = ticker.add_ticker(Duration::from_millis(48), move |_| {
            count_clone.set(count_clone.get() + 1);
            true
        });

        ticker.tick(FRAME);
        ticker.tick(FRAME);
        assert_eq!(count.get(), 0);
        ticker.tick(FRAME);
        assert_eq!(count.get(), 1);
        for _ in 0..3 {
            ticker.tick(FRAME);
        }
        assert_eq!(count.get(), 2);

        ticker.remove_ticker(handle);
        assert!(!ticker.is_registered(handle));
        for _ in 0..10 {
            ticker.tick(FRAME);
        }
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn ticker_added_during_tick_waits_for_next_tick() {
        let ticker = Rc::new(Ticker::default());
        let fired = Rc::new(Cell::new(false));

        let ticker_clone = ticker.clone();
        let fired_clone = fired.clone();
        ticker.add_ticker(Duration::ZERO, move |_| {
            let fired_clone = fired_clone.clone();
            ticker_clone.add_ticker(Duration::ZERO, move |_| {
                fired_clone.set(true);
                false
            });
            false
        });

        ticker.tick(FRAME);
        assert!(!fired.get());
        ticker.tick(FRAME);
        assert!(fired.get());
    }

    #[test]
    fn callback_can_remove_itself_and_later_tickers() {
        let ticker = Rc::new(Ticker::default());
        let second_fired = Rc::new(Cell::new(false));
        let own_handle = Rc::new(Cell::new(None));
        let second_handle = Rc::new(Cell::new(None));

        let ticker_clone = ticker.clone();
        let own_handle_clone = own_handle.clone();
        let second_handle_clone = second_handle.clone();
        let first = ticker.add_ticker(Duration::ZERO, move |_| {
            // Returning true would normally keep it alive, removal wins
            ticker_clone.remove_ticker(own_handle_clone.get().unwrap());
            ticker_clone.remove_ticker(second_handle_clone.get().unwrap());
            true
        });
        own_handle.set(Some(first));

        let second_fired_clone = second_fired.clone();
        let second = ticker.add_ticker(Duration::ZERO, move |_| {
            second_fired_clone.set(true);
            true
        });
        second_handle.set(Some(second));

        ticker.tick(FRAME);
        assert!(!second_fired.get());
        assert!(!ticker.is_registered(first));
        assert!(!ticker.is_registered(second));
        assert_eq!(ticker.ticker_count(), 0);
    }

    #[test]
    fn core_ticker_is_per_thread() {
        let handle = add_ticker(Duration::ZERO, |_| true);
        assert!(is_registered(handle));
        let other_thread_count = std::thread::spawn(ticker_count).join().unwrap();
        assert_eq!(other_thread_count, 0);
        remove_ticker(handle);
        assert!(!is_registered(handle));
    }
}
