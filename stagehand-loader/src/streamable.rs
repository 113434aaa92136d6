use crossbeam_channel::Sender;
use stagehand_base::{AssetPath, LoadHandle, RefOp};
use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

pub type CompleteDelegate = Box<dyn FnOnce()>;

/// An in-flight (or finished) request for a set of assets. As long as the handle is alive and not
/// canceled, everything it requested stays resident.
///
/// Completion means every requested asset either loaded or failed to load. The handle does not
/// say which, look at the asset itself.
///
/// Handles are created and used on the thread that owns the [`AssetManager`](crate::AssetManager).
/// The completion delegate is invoked from `AssetManager::update()`.
pub struct StreamableHandle {
    debug_name: String,
    requested_paths: Vec<AssetPath>,
    load_handles: Vec<LoadHandle>,
    ref_op_tx: Sender<RefOp>,
    completed: Cell<bool>,
    released: Cell<bool>,
    complete_delegate: RefCell<Option<CompleteDelegate>>,
}

impl StreamableHandle {
    pub(crate) fn new(
        debug_name: &str,
        requested_paths: Vec<AssetPath>,
        load_handles: Vec<LoadHandle>,
        ref_op_tx: Sender<RefOp>,
    ) -> Rc<Self> {
        Rc::new(StreamableHandle {
            debug_name: debug_name.to_string(),
            requested_paths,
            load_handles,
            ref_op_tx,
            completed: Cell::new(false),
            released: Cell::new(false),
            complete_delegate: Default::default(),
        })
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    pub fn requested_paths(&self) -> &[AssetPath] {
        &self.requested_paths
    }

    pub(crate) fn load_handles(&self) -> &[LoadHandle] {
        &self.load_handles
    }

    pub fn has_load_completed(&self) -> bool {
        self.completed.get()
    }

    /// False once the handle was canceled. An inactive handle never completes.
    pub fn is_active(&self) -> bool {
        !self.released.get()
    }

    /// Sets the delegate to call when loading completes, replacing any previous one. Passing
    /// `None` unbinds. Returns false (and stores nothing) if the handle already completed or was
    /// canceled, since the delegate would never be called.
    pub fn bind_complete_delegate(
        &self,
        delegate: Option<CompleteDelegate>,
    ) -> bool {
        if self.has_load_completed() || !self.is_active() {
            return false;
        }

        *self.complete_delegate.borrow_mut() = delegate;
        true
    }

    /// Stops caring about the request. The delegate is dropped without being called and the
    /// references keeping the assets resident are released.
    pub fn cancel(&self) {
        log::debug!("Cancel streamable handle {:?}", self);
        let delegate = self.complete_delegate.borrow_mut().take();
        drop(delegate);
        self.release();
    }

    // Called by the asset manager. Returns the delegate so it can be invoked after the manager
    // releases its own state.
    pub(crate) fn complete(&self) -> Option<CompleteDelegate> {
        self.completed.set(true);
        self.complete_delegate.borrow_mut().take()
    }

    pub(crate) fn mark_completed(&self) {
        self.completed.set(true);
    }

    fn release(&self) {
        if !self.released.replace(true) {
            for load_handle in &self.load_handles {
                let _ = self.ref_op_tx.send(RefOp::Decrease(*load_handle));
            }
        }
    }
}

impl Drop for StreamableHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl Debug for StreamableHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("StreamableHandle")
            .field("debug_name", &self.debug_name)
            .field("requested_paths", &self.requested_paths)
            .field("completed", &self.completed.get())
            .field("active", &self.is_active())
            .finish()
    }
}
