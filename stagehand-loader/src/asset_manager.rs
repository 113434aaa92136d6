use crate::disk_io::{DiskAssetIO, DiskAssetIOConfig};
use crate::error::LoaderResult;
use crate::loader_io::{LoaderEvent, LoaderIO, RequestDataResult};
use crate::manifest::{PrimaryAssetData, PrimaryAssetManifest, PRIMARY_ASSET_MANIFEST_FILE_NAME};
use crate::manual_io::ManualLoaderIO;
use crate::streamable::StreamableHandle;
use crossbeam_channel::{Receiver, Sender};
use serde::de::DeserializeOwned;
use stagehand_base::hashing::HashMap;
use stagehand_base::{AssetPath, BundleName, LoadHandle, PrimaryAssetId, RefOp};
use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::{Rc, Weak};
use std::sync::Arc;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoadState {
    // Not loaded, and we haven't started trying to load it. Ref count > 0 implies we want to start
    // loading.
    Unloaded,
    // Data request is in flight
    WaitingForData,
    // Data is resident and can be read with get_asset()
    Loaded,
    // The data request failed. Anything waiting on this asset is still allowed to proceed.
    Failed,
}

impl LoadState {
    // Loaded or failed, either way there is nothing more to wait for
    pub fn is_resolved(&self) -> bool {
        matches!(self, LoadState::Loaded | LoadState::Failed)
    }
}

/// The bytes of a resident asset. Cloning is cheap, and a clone keeps the bytes alive even after
/// the asset manager unloads the asset.
#[derive(Clone)]
pub struct LoadedAsset {
    path: AssetPath,
    data: Arc<Vec<u8>>,
}

impl LoadedAsset {
    pub fn path(&self) -> &AssetPath {
        &self.path
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn as_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    pub fn deserialize_json<T: DeserializeOwned>(&self) -> LoaderResult<T> {
        Ok(serde_json::from_slice(&self.data)?)
    }
}

impl Debug for LoadedAsset {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LoadedAsset")
            .field("path", &self.path)
            .field("data_length", &self.data.len())
            .finish()
    }
}

struct LoadHandleInfo {
    path: AssetPath,
    // Number of live, non-canceled streamable handles that requested this asset (counted once per
    // request). The asset stays resident while this is non-zero.
    ref_count: u32,
    load_state: LoadState,
    data: Option<Arc<Vec<u8>>>,
}

struct AssetManagerInner {
    next_handle_index: u64,

    // The data source we will load content from
    loader_io: Box<dyn LoaderIO>,

    // The event queue that drives asset load states changing. Events are produced by ref count
    // changes and LoaderIO results.
    events_tx: Sender<LoaderEvent>,
    events_rx: Receiver<LoaderEvent>,

    // Streamable handles release their references through this channel when dropped
    ref_op_tx: Sender<RefOp>,
    ref_op_rx: Receiver<RefOp>,

    path_to_handle: HashMap<AssetPath, LoadHandle>,
    // We never delete load handles, an unloaded asset keeps its handle for reuse
    load_handle_infos: HashMap<LoadHandle, LoadHandleInfo>,

    primary_assets: HashMap<PrimaryAssetId, PrimaryAssetData>,

    // Handles that have not completed yet. Weak so that dropping a handle is enough to forget it.
    pending_handles: Vec<Weak<StreamableHandle>>,
}

impl AssetManagerInner {
    fn get_or_insert_load_handle(
        &mut self,
        path: &AssetPath,
    ) -> LoadHandle {
        let next_handle_index = &mut self.next_handle_index;
        let load_handle_infos = &mut self.load_handle_infos;
        *self
            .path_to_handle
            .entry(path.clone())
            .or_insert_with(|| {
                let load_handle = LoadHandle(*next_handle_index);
                *next_handle_index += 1;

                log::debug!("Allocate load handle {:?} for path {:?}", load_handle, path);

                load_handle_infos.insert(
                    load_handle,
                    LoadHandleInfo {
                        path: path.clone(),
                        ref_count: 0,
                        load_state: LoadState::Unloaded,
                        data: None,
                    },
                );

                load_handle
            })
    }

    fn add_ref(
        &mut self,
        load_handle: LoadHandle,
    ) {
        if let Some(load_handle_info) = self.load_handle_infos.get_mut(&load_handle) {
            load_handle_info.ref_count += 1;

            // If this is the first reference to the asset, put it in the queue to be loaded
            if load_handle_info.ref_count == 1 {
                let _ = self.events_tx.send(LoaderEvent::TryLoad(load_handle));
            }
        }
    }

    fn remove_ref(
        &mut self,
        load_handle: LoadHandle,
    ) {
        if let Some(load_handle_info) = self.load_handle_infos.get_mut(&load_handle) {
            if load_handle_info.ref_count == 0 {
                log::error!("Released load handle {:?} more times than it was referenced", load_handle);
                return;
            }

            load_handle_info.ref_count -= 1;

            // If this was the last reference to the asset, put it in queue to be dropped
            if load_handle_info.ref_count == 0 {
                let _ = self.events_tx.send(LoaderEvent::TryUnload(load_handle));
            }
        }
    }

    fn process_ref_ops(&mut self) {
        while let Ok(ref_op) = self.ref_op_rx.try_recv() {
            match ref_op {
                RefOp::Decrease(load_handle) => self.remove_ref(load_handle),
            }
        }
    }

    fn process_events(&mut self) {
        while let Ok(loader_event) = self.events_rx.try_recv() {
            log::trace!("handle event {:?}", loader_event);
            match loader_event {
                LoaderEvent::TryLoad(load_handle) => self.handle_try_load(load_handle),
                LoaderEvent::TryUnload(load_handle) => self.handle_try_unload(load_handle),
                LoaderEvent::DataRequestComplete(result) => self.handle_request_data_result(result),
            }
        }
    }

    fn handle_try_load(
        &mut self,
        load_handle: LoadHandle,
    ) {
        let Some(load_handle_info) = self.load_handle_infos.get_mut(&load_handle) else {
            return;
        };

        log::debug!("handle_try_load {:?} {:?}", load_handle, load_handle_info.path);

        if load_handle_info.load_state == LoadState::Unloaded {
            if load_handle_info.ref_count > 0 {
                // Still referenced, so start loading it now
                self.loader_io
                    .request_data(load_handle, &load_handle_info.path);
                load_handle_info.load_state = LoadState::WaitingForData;
            } else {
                // Not referenced anymore, don't bother loading it. If it becomes referenced again
                // later, we will get another TryLoad event
            }
        } else {
            // Already loading, loaded, or failed. Nothing to do.
        }
    }

    fn handle_try_unload(
        &mut self,
        load_handle: LoadHandle,
    ) {
        let Some(load_handle_info) = self.load_handle_infos.get_mut(&load_handle) else {
            return;
        };

        log::debug!("handle_try_unload {:?} {:?}", load_handle, load_handle_info.path);

        if load_handle_info.ref_count > 0 {
            // Referenced again since the unload was queued
            return;
        }

        // If a request is in flight, its result will be dropped when it arrives
        load_handle_info.data = None;
        load_handle_info.load_state = LoadState::Unloaded;
    }

    fn handle_request_data_result(
        &mut self,
        result: RequestDataResult,
    ) {
        let Some(load_handle_info) = self.load_handle_infos.get_mut(&result.load_handle) else {
            log::warn!("Data arrived for unknown load handle {:?}", result.load_handle);
            return;
        };

        log::debug!(
            "handle_request_data_result {:?} {:?}",
            result.load_handle,
            load_handle_info.path
        );

        // Bail if the asset was unloaded (or already finished by an earlier request)
        if load_handle_info.load_state != LoadState::WaitingForData {
            return;
        }

        match result.result {
            Ok(asset_data) => {
                load_handle_info.data = Some(Arc::new(asset_data.data));
                load_handle_info.load_state = LoadState::Loaded;
            }
            Err(e) => {
                log::warn!("Failed to load {:?}: {}", load_handle_info.path, e);
                load_handle_info.load_state = LoadState::Failed;
            }
        }
    }

    fn all_resolved(
        load_handle_infos: &HashMap<LoadHandle, LoadHandleInfo>,
        load_handles: &[LoadHandle],
    ) -> bool {
        load_handles.iter().all(|load_handle| {
            load_handle_infos
                .get(load_handle)
                .map(|x| x.load_state.is_resolved())
                .unwrap_or(true)
        })
    }

    fn take_completed_handles(&mut self) -> Vec<Rc<StreamableHandle>> {
        let load_handle_infos = &self.load_handle_infos;
        let mut completed = Vec::default();
        self.pending_handles.retain(|pending| {
            let Some(handle) = pending.upgrade() else {
                return false;
            };

            if !handle.is_active() {
                false
            } else if Self::all_resolved(load_handle_infos, handle.load_handles()) {
                completed.push(handle);
                false
            } else {
                true
            }
        });

        completed
    }
}

/// Loads assets on request and keeps them resident while any [`StreamableHandle`] wants them.
///
/// This is a cheap-to-clone reference to state owned by the game thread. IO happens elsewhere
/// (see [`LoaderIO`]), results are only applied during [`AssetManager::update`].
#[derive(Clone)]
pub struct AssetManager {
    inner: Rc<RefCell<AssetManagerInner>>,
}

impl AssetManager {
    pub fn new(
        loader_io: Box<dyn LoaderIO>,
        events_tx: Sender<LoaderEvent>,
        events_rx: Receiver<LoaderEvent>,
    ) -> Self {
        let (ref_op_tx, ref_op_rx) = crossbeam_channel::unbounded();

        let inner = AssetManagerInner {
            // start at 1 because 0 means null
            next_handle_index: 1,
            loader_io,
            events_tx,
            events_rx,
            ref_op_tx,
            ref_op_rx,
            path_to_handle: Default::default(),
            load_handle_infos: Default::default(),
            primary_assets: Default::default(),
            pending_handles: Default::default(),
        };

        AssetManager {
            inner: Rc::new(RefCell::new(inner)),
        }
    }

    /// Reads assets from disk. If the root contains a primary asset manifest it is registered.
    pub fn new_disk(config: &DiskAssetIOConfig) -> LoaderResult<Self> {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let asset_io = DiskAssetIO::new(config, events_tx.clone())?;
        let asset_manager = AssetManager::new(Box::new(asset_io), events_tx, events_rx);

        let manifest_path = config.root_path.join(PRIMARY_ASSET_MANIFEST_FILE_NAME);
        if manifest_path.exists() {
            let manifest = PrimaryAssetManifest::read_from_path(&manifest_path)?;
            log::info!(
                "Registered {} primary assets from {:?}",
                manifest.primary_assets.len(),
                manifest_path
            );
            asset_manager.register_primary_assets(manifest);
        } else {
            log::info!("No primary asset manifest found, preloads will find nothing");
        }

        Ok(asset_manager)
    }

    /// An asset manager whose IO requests are completed by hand through the returned
    /// [`ManualLoaderIO`]
    pub fn new_manual() -> (Self, ManualLoaderIO) {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let manual_io = ManualLoaderIO::new(events_tx.clone());
        let asset_manager = AssetManager::new(Box::new(manual_io.clone()), events_tx, events_rx);
        (asset_manager, manual_io)
    }

    pub fn register_primary_asset(
        &self,
        id: PrimaryAssetId,
        data: PrimaryAssetData,
    ) {
        let old = self.inner.borrow_mut().primary_assets.insert(id.clone(), data);
        if old.is_some() {
            log::warn!("Primary asset {} was registered twice, using the latest", id);
        }
    }

    pub fn register_primary_assets(
        &self,
        manifest: PrimaryAssetManifest,
    ) {
        for (id, data) in manifest.primary_assets {
            self.register_primary_asset(id, data);
        }
    }

    /// Requests the given assets be loaded as a unit. The returned handle completes once all of
    /// them loaded or failed. If they already are, the handle is complete on return.
    pub fn request_async_load(
        &self,
        paths: &[AssetPath],
        debug_name: &str,
    ) -> Rc<StreamableHandle> {
        let mut inner = self.inner.borrow_mut();

        let mut load_handles = Vec::with_capacity(paths.len());
        for path in paths {
            let load_handle = inner.get_or_insert_load_handle(path);
            inner.add_ref(load_handle);
            load_handles.push(load_handle);
        }

        let handle = StreamableHandle::new(
            debug_name,
            paths.to_vec(),
            load_handles,
            inner.ref_op_tx.clone(),
        );

        if AssetManagerInner::all_resolved(&inner.load_handle_infos, handle.load_handles()) {
            handle.mark_completed();
        } else {
            inner.pending_handles.push(Rc::downgrade(&handle));
        }

        log::debug!("request_async_load {:?}", handle);
        handle
    }

    /// Loads the given primary assets and everything in the named bundles they reference, as one
    /// request. Unknown ids are skipped. Returns `None` if there is nothing to load at all.
    pub fn preload_primary_assets(
        &self,
        ids: &[PrimaryAssetId],
        bundles: &[BundleName],
    ) -> Option<Rc<StreamableHandle>> {
        let mut paths: Vec<AssetPath> = Vec::default();
        {
            let inner = self.inner.borrow();
            for id in ids {
                match inner.primary_assets.get(id) {
                    Some(data) => {
                        for path in data.paths_for_bundles(bundles) {
                            if !paths.contains(&path) {
                                paths.push(path);
                            }
                        }
                    }
                    None => log::warn!("Cannot preload unknown primary asset {}", id),
                }
            }
        }

        if paths.is_empty() {
            return None;
        }

        Some(self.request_async_load(&paths, "Preload"))
    }

    /// Applies everything that happened since the last update: handle drops, IO results, and
    /// unloads. Handles that finished have their completion delegates called, in request order,
    /// after the manager's own state is released, so delegates may freely request more loads.
    #[profiling::function]
    pub fn update(&self) {
        let completed = {
            let mut inner = self.inner.borrow_mut();
            inner.process_ref_ops();
            inner.process_events();
            inner.take_completed_handles()
        };

        for handle in completed {
            // An earlier delegate in this loop may have canceled it
            if !handle.is_active() {
                continue;
            }

            log::debug!("Streamable handle complete {:?}", handle);
            if let Some(delegate) = handle.complete() {
                delegate();
            }
        }
    }

    pub fn load_state(
        &self,
        path: &AssetPath,
    ) -> LoadState {
        let inner = self.inner.borrow();
        inner
            .path_to_handle
            .get(path)
            .and_then(|load_handle| inner.load_handle_infos.get(load_handle))
            .map(|x| x.load_state)
            .unwrap_or(LoadState::Unloaded)
    }

    /// Returns the asset if it is resident
    pub fn get_asset(
        &self,
        path: &AssetPath,
    ) -> Option<LoadedAsset> {
        let inner = self.inner.borrow();
        let load_handle = inner.path_to_handle.get(path)?;
        let data = inner.load_handle_infos.get(load_handle)?.data.clone()?;
        Some(LoadedAsset {
            path: path.clone(),
            data,
        })
    }

    /// Number of live requests holding this asset resident
    pub fn reference_count(
        &self,
        path: &AssetPath,
    ) -> u32 {
        let inner = self.inner.borrow();
        inner
            .path_to_handle
            .get(path)
            .and_then(|load_handle| inner.load_handle_infos.get(load_handle))
            .map(|x| x.ref_count)
            .unwrap_or(0)
    }

    pub fn loaded_asset_count(&self) -> usize {
        self.inner
            .borrow()
            .load_handle_infos
            .values()
            .filter(|x| x.load_state == LoadState::Loaded)
            .count()
    }

    pub fn pending_handle_count(&self) -> usize {
        self.inner.borrow().pending_handles.len()
    }
}
