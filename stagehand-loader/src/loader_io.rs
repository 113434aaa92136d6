use stagehand_base::{AssetPath, LoadHandle};

// The raw bytes of an asset as read by a LoaderIO
pub struct AssetData {
    pub data: Vec<u8>,
}

impl std::fmt::Debug for AssetData {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("AssetData")
            .field("data_length", &self.data.len())
            .finish()
    }
}

// When IO completes a request for asset data, it will send us a loader event containing this
#[derive(Debug)]
pub struct RequestDataResult {
    pub load_handle: LoadHandle,
    pub path: AssetPath,
    pub result: std::io::Result<AssetData>,
}

// Represents a data source from which we can load content. Requests are fire-and-forget, the
// implementation answers later (from any thread) by sending a DataRequestComplete event.
pub trait LoaderIO: Sync + Send {
    fn request_data(
        &self,
        load_handle: LoadHandle,
        path: &AssetPath,
    );
}

//
// Loader events which drive state changes for loaded assets. They are produced by ref count changes
// on the game thread and by LoaderIO results from worker threads, and are only ever consumed by
// AssetManager::update() on the game thread.
//
#[derive(Debug)]
pub enum LoaderEvent {
    // Sent when asset ref count goes from 0 to 1
    TryLoad(LoadHandle),
    // Sent when asset ref count goes from 1 to 0
    TryUnload(LoadHandle),
    // Sent by LoaderIO when data request succeeds or fails
    DataRequestComplete(RequestDataResult),
}
