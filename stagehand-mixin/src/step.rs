use crate::condition::AsyncCondition;
use stagehand_loader::StreamableHandle;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub type StepCallback = Box<dyn FnOnce()>;

// What decides that a step is done
#[derive(Clone)]
pub(crate) enum CompletionSource {
    // Complete as soon as the sequence reaches it
    None,
    Handle(Rc<StreamableHandle>),
    Condition(Rc<AsyncCondition>),
}

impl std::fmt::Debug for CompletionSource {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            CompletionSource::None => write!(f, "Event"),
            CompletionSource::Handle(handle) => write!(f, "Handle({})", handle.debug_name()),
            CompletionSource::Condition(_) => write!(f, "Condition"),
        }
    }
}

// One entry in a loading sequence. Completeness is always read from the source, the step itself
// only remembers whether it has a listener attached.
pub(crate) struct AsyncStep {
    user_callback: RefCell<Option<StepCallback>>,
    source: RefCell<CompletionSource>,
    is_completion_delegate_bound: Cell<bool>,
}

impl AsyncStep {
    pub fn new(
        user_callback: Option<StepCallback>,
        source: CompletionSource,
    ) -> Rc<Self> {
        Rc::new(AsyncStep {
            user_callback: RefCell::new(user_callback),
            source: RefCell::new(source),
            is_completion_delegate_bound: Cell::new(false),
        })
    }

    // Cloned out so no borrow is held while a source runs user code
    fn source(&self) -> CompletionSource {
        self.source.borrow().clone()
    }

    pub fn is_complete(&self) -> bool {
        match self.source() {
            CompletionSource::None => true,
            CompletionSource::Handle(handle) => handle.has_load_completed(),
            CompletionSource::Condition(condition) => condition.is_complete(),
        }
    }

    pub fn is_loading_in_progress(&self) -> bool {
        !self.is_complete()
    }

    pub fn is_complete_delegate_bound(&self) -> bool {
        self.is_completion_delegate_bound.get()
    }

    /// Returns false if the source already completed (nothing is bound and the step is unchanged)
    pub fn bind_complete_delegate(
        &self,
        delegate: StepCallback,
    ) -> bool {
        if self.is_complete() {
            return false;
        }

        let bound = match self.source() {
            CompletionSource::None => false,
            CompletionSource::Handle(handle) => handle.bind_complete_delegate(Some(delegate)),
            CompletionSource::Condition(condition) => condition.bind_complete_delegate(delegate),
        };

        if bound {
            self.is_completion_delegate_bound.set(true);
        }

        bound
    }

    pub fn execute_user_callback(&self) {
        let user_callback = self.user_callback.borrow_mut().take();
        if let Some(user_callback) = user_callback {
            user_callback();
        }
    }

    /// Detaches from the source and lets go of it. The user callback is dropped without running.
    pub fn cancel(&self) {
        let source = std::mem::replace(&mut *self.source.borrow_mut(), CompletionSource::None);
        match &source {
            CompletionSource::None => {}
            CompletionSource::Handle(handle) => {
                handle.bind_complete_delegate(None);
                handle.cancel();
            }
            CompletionSource::Condition(condition) => {
                // A condition has one listener, only unbind if this step attached it
                if self.is_completion_delegate_bound.get() {
                    condition.unbind_complete_delegate();
                }
            }
        }

        self.is_completion_delegate_bound.set(false);
        let user_callback = self.user_callback.borrow_mut().take();

        drop(source);
        drop(user_callback);
    }

    pub fn describe(&self) -> String {
        format!("{:?}", &*self.source.borrow())
    }
}
