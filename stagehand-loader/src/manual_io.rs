use crate::loader_io::{AssetData, LoaderEvent, LoaderIO, RequestDataResult};
use crossbeam_channel::Sender;
use stagehand_base::{AssetPath, LoadHandle};
use std::sync::{Arc, Mutex};

struct ManualLoaderIOInner {
    events_tx: Sender<LoaderEvent>,
    pending_requests: Vec<(LoadHandle, AssetPath)>,
}

/// A LoaderIO that never completes anything on its own. Requests are recorded and the caller
/// decides when (and in what order) each one finishes. Useful for tools that synthesize content,
/// and for tests that need loads to finish out of order.
///
/// Clones share the same request list.
#[derive(Clone)]
pub struct ManualLoaderIO {
    inner: Arc<Mutex<ManualLoaderIOInner>>,
}

impl ManualLoaderIO {
    pub fn new(events_tx: Sender<LoaderEvent>) -> Self {
        let inner = ManualLoaderIOInner {
            events_tx,
            pending_requests: Default::default(),
        };

        ManualLoaderIO {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub fn pending_requests(&self) -> Vec<AssetPath> {
        self.inner
            .lock()
            .unwrap()
            .pending_requests
            .iter()
            .map(|(_, path)| path.clone())
            .collect()
    }

    pub fn is_requested(
        &self,
        path: &AssetPath,
    ) -> bool {
        self.inner
            .lock()
            .unwrap()
            .pending_requests
            .iter()
            .any(|(_, x)| x == path)
    }

    /// Finishes every outstanding request for `path` successfully. Returns false if nothing was
    /// waiting on that path. Results are seen on the next AssetManager::update().
    pub fn complete(
        &self,
        path: &AssetPath,
        data: Vec<u8>,
    ) -> bool {
        self.finish(path, || Ok(AssetData { data: data.clone() }))
    }

    /// Finishes every outstanding request for `path` with an IO error
    pub fn fail(
        &self,
        path: &AssetPath,
        kind: std::io::ErrorKind,
    ) -> bool {
        self.finish(path, || Err(kind.into()))
    }

    fn finish(
        &self,
        path: &AssetPath,
        result: impl Fn() -> std::io::Result<AssetData>,
    ) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let mut finished = Vec::default();
        inner.pending_requests.retain(|(load_handle, x)| {
            if x == path {
                finished.push(*load_handle);
                false
            } else {
                true
            }
        });

        for load_handle in &finished {
            let _ = inner
                .events_tx
                .send(LoaderEvent::DataRequestComplete(RequestDataResult {
                    load_handle: *load_handle,
                    path: path.clone(),
                    result: result(),
                }));
        }

        !finished.is_empty()
    }
}

impl LoaderIO for ManualLoaderIO {
    fn request_data(
        &self,
        load_handle: LoadHandle,
        path: &AssetPath,
    ) {
        log::debug!("request_data {:?} {:?}", load_handle, path);
        self.inner
            .lock()
            .unwrap()
            .pending_requests
            .push((load_handle, path.clone()));
    }
}
