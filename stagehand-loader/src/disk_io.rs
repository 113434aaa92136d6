use crate::error::LoaderResult;
use crate::loader_io::{AssetData, LoaderEvent, LoaderIO, RequestDataResult};
use crossbeam_channel::{Receiver, Sender};
use stagehand_base::{AssetPath, LoadHandle};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

#[derive(Debug, Clone)]
pub struct DiskAssetIOConfig {
    // Directory that asset paths are relative to
    pub root_path: PathBuf,
    // Number of threads reading files. This is also the max number of reads in flight
    pub worker_thread_count: usize,
}

impl DiskAssetIOConfig {
    pub fn new(root_path: PathBuf) -> Self {
        DiskAssetIOConfig {
            root_path,
            worker_thread_count: 4,
        }
    }
}

struct DiskAssetIORequest {
    load_handle: LoadHandle,
    path: AssetPath,
}

// Asset paths must stay inside the root directory
fn resolve_asset_path(
    root_path: &Path,
    path: &AssetPath,
) -> std::io::Result<PathBuf> {
    let relative = Path::new(path.as_str());
    let escapes_root = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes_root || path.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("asset path {:?} is not relative to the data root", path),
        ));
    }

    Ok(root_path.join(relative))
}

fn read_asset(
    root_path: &Path,
    path: &AssetPath,
) -> std::io::Result<AssetData> {
    let file_path = resolve_asset_path(root_path, path)?;
    let data = {
        profiling::scope!("std::fs::read");
        std::fs::read(file_path)?
    };
    Ok(AssetData { data })
}

// Thread that tries to take jobs out of the request channel and ends when the finish channel is signalled
struct DiskAssetIOWorkerThread {
    finish_tx: Sender<()>,
    join_handle: JoinHandle<()>,
}

impl DiskAssetIOWorkerThread {
    fn new(
        root_path: Arc<PathBuf>,
        request_rx: Receiver<DiskAssetIORequest>,
        result_tx: Sender<LoaderEvent>,
        active_request_count: Arc<AtomicUsize>,
        thread_index: usize,
    ) -> std::io::Result<Self> {
        let (finish_tx, finish_rx) = crossbeam_channel::bounded(1);
        let join_handle = std::thread::Builder::new()
            .name(format!("IO Thread {}", thread_index))
            .spawn(move || {
                profiling::register_thread!(&format!("DiskAssetIOWorkerThread {}", thread_index));
                loop {
                    crossbeam_channel::select! {
                        recv(request_rx) -> msg => {
                            let msg = match msg {
                                Ok(msg) => msg,
                                // All senders are gone, nothing more will arrive
                                Err(_) => return,
                            };

                            profiling::scope!("DiskAssetIORequest");
                            log::trace!("Start read {:?}", msg.path);
                            let result = read_asset(&root_path, &msg.path);
                            if let Err(e) = &result {
                                log::trace!("Failed read {:?}: {}", msg.path, e);
                            }

                            let _ = result_tx.send(LoaderEvent::DataRequestComplete(RequestDataResult {
                                load_handle: msg.load_handle,
                                path: msg.path,
                                result,
                            }));
                            active_request_count.fetch_sub(1, Ordering::Release);
                        },
                        recv(finish_rx) -> _msg => {
                            return;
                        }
                    }
                }
            })?;

        Ok(DiskAssetIOWorkerThread {
            finish_tx,
            join_handle,
        })
    }
}

// Spawns N threads, proxies messages to/from them, and kills the threads when the pool is dropped
struct DiskAssetIOThreadPool {
    worker_threads: Vec<DiskAssetIOWorkerThread>,
    request_tx: Sender<DiskAssetIORequest>,
    active_request_count: Arc<AtomicUsize>,
}

impl DiskAssetIOThreadPool {
    fn new(
        root_path: Arc<PathBuf>,
        max_requests_in_flight: usize,
        result_tx: Sender<LoaderEvent>,
    ) -> std::io::Result<Self> {
        let (request_tx, request_rx) = crossbeam_channel::unbounded::<DiskAssetIORequest>();
        let active_request_count = Arc::new(AtomicUsize::new(0));

        let mut worker_threads = Vec::with_capacity(max_requests_in_flight);
        for thread_index in 0..max_requests_in_flight {
            let worker = DiskAssetIOWorkerThread::new(
                root_path.clone(),
                request_rx.clone(),
                result_tx.clone(),
                active_request_count.clone(),
                thread_index,
            )?;
            worker_threads.push(worker);
        }

        Ok(DiskAssetIOThreadPool {
            request_tx,
            worker_threads,
            active_request_count,
        })
    }

    fn add_request(
        &self,
        request: DiskAssetIORequest,
    ) {
        self.active_request_count.fetch_add(1, Ordering::Release);
        if self.request_tx.send(request).is_err() {
            self.active_request_count.fetch_sub(1, Ordering::Release);
            log::error!("Disk IO worker threads are gone, dropping request");
        }
    }

    fn finish(self) {
        for worker_thread in &self.worker_threads {
            let _ = worker_thread.finish_tx.send(());
        }

        for worker_thread in self.worker_threads {
            if worker_thread.join_handle.join().is_err() {
                log::error!("Disk IO worker thread panicked");
            }
        }
    }
}

/// Reads assets from files under a root directory using a small pool of worker threads
pub struct DiskAssetIO {
    thread_pool: Option<DiskAssetIOThreadPool>,
    root_path: Arc<PathBuf>,
}

impl Drop for DiskAssetIO {
    fn drop(&mut self) {
        if let Some(thread_pool) = self.thread_pool.take() {
            thread_pool.finish();
        }
    }
}

impl DiskAssetIO {
    pub fn new(
        config: &DiskAssetIOConfig,
        tx: Sender<LoaderEvent>,
    ) -> LoaderResult<Self> {
        if !config.root_path.is_dir() {
            return Err(format!(
                "Asset data root {:?} is not a directory",
                config.root_path
            )
            .into());
        }

        if config.worker_thread_count == 0 {
            return Err("DiskAssetIO needs at least one worker thread".into());
        }

        log::info!(
            "Reading assets from {:?} with {} IO threads",
            config.root_path,
            config.worker_thread_count
        );

        let root_path = Arc::new(config.root_path.clone());
        let thread_pool = Some(DiskAssetIOThreadPool::new(
            root_path.clone(),
            config.worker_thread_count,
            tx,
        )?);

        Ok(DiskAssetIO {
            thread_pool,
            root_path,
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn active_request_count(&self) -> usize {
        self.thread_pool
            .as_ref()
            .map(|x| x.active_request_count.load(Ordering::Acquire))
            .unwrap_or(0)
    }
}

impl LoaderIO for DiskAssetIO {
    fn request_data(
        &self,
        load_handle: LoadHandle,
        path: &AssetPath,
    ) {
        log::debug!("request_data {:?} {:?}", load_handle, path);

        // Queue up the work
        if let Some(thread_pool) = &self.thread_pool {
            thread_pool.add_request(DiskAssetIORequest {
                load_handle,
                path: path.clone(),
            });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    fn temp_root() -> PathBuf {
        let path = std::env::temp_dir().join(format!("stagehand-disk-io-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(path.join("ui")).unwrap();
        path
    }

    fn wait_for_result(rx: &Receiver<LoaderEvent>) -> RequestDataResult {
        match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
            LoaderEvent::DataRequestComplete(result) => result,
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn rejects_missing_root() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let config = DiskAssetIOConfig::new(std::env::temp_dir().join("stagehand-does-not-exist"));
        assert!(DiskAssetIO::new(&config, tx).is_err());
    }

    #[test]
    fn reads_files_relative_to_root() {
        let root = temp_root();
        std::fs::write(root.join("ui/title.txt"), b"Samurai").unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut config = DiskAssetIOConfig::new(root.clone());
        config.worker_thread_count = 2;
        let io = DiskAssetIO::new(&config, tx).unwrap();
        assert_eq!(io.root_path(), root.as_path());

        io.request_data(LoadHandle(1), &AssetPath::new("ui/title.txt"));
        let result = wait_for_result(&rx);
        assert_eq!(result.load_handle, LoadHandle(1));
        assert_eq!(result.result.unwrap().data, b"Samurai".to_vec());

        io.request_data(LoadHandle(2), &AssetPath::new("ui/missing.txt"));
        let result = wait_for_result(&rx);
        assert_eq!(result.load_handle, LoadHandle(2));
        assert_eq!(
            result.result.unwrap_err().kind(),
            std::io::ErrorKind::NotFound
        );

        drop(io);
        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn paths_cannot_escape_root() {
        let root = PathBuf::from("/data");
        assert!(resolve_asset_path(&root, &AssetPath::new("../secret")).is_err());
        assert!(resolve_asset_path(&root, &AssetPath::new("/etc/passwd")).is_err());
        assert!(resolve_asset_path(&root, &AssetPath::new("")).is_err());
        assert_eq!(
            resolve_asset_path(&root, &AssetPath::new("ui/./a.png")).unwrap(),
            root.join("ui/./a.png")
        );
    }
}
