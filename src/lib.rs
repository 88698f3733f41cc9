// Asynchronous HTTP image cache, the public lifecycle controller.
//
// Callers get four operations: ImageCache::init, ImageCache::load,
// ImageCache::remove, and the implicit teardown performed by Drop (also
// callable early and explicitly via ImageCache::shutdown). Everything
// else (fetch stage, worker stage, ETag index, cache eviction) is private
// machinery coordinated by this struct and owned per-instance rather than
// held in any global or static state.

mod cache_dir;
pub mod config;
pub mod error;
mod etag;
mod fetch;
mod hash;
mod queue;
mod worker;

use std::fs;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

pub use config::Config;
pub use error::CacheError;

use etag::EtagIndex;
use fetch::FetchStage;
use queue::{LoadItem, SharedQueue, WorkItem};
use worker::WorkerStage;

pub(crate) const ETAG_FILE_NAME: &str = ".etags";

// One delivered image: served from disk, freshly downloaded, or empty
// (the host must tolerate an empty delivery as the outcome of a failed
// load).
#[derive(Debug, Clone)]
pub struct ImageData {
    pub url: String,
    pub bytes: Vec<u8>,
    pub size: usize,
}

// A single cache instance, owning its cache_dir, its ETag index, and the
// two long-lived background threads (worker, fetch) that do the work.
//
// No global/static instance here. Embedding applications that want a
// process-wide cache own one ImageCache in a static or an Arc, the same
// way they'd own any other resource.
pub struct ImageCache {
    config: Config,
    index: Arc<RwLock<EtagIndex>>,
    load_queue: Arc<SharedQueue<LoadItem>>,
    work_queue: Arc<SharedQueue<WorkItem>>,
    worker_handle: Option<std::thread::JoinHandle<()>>,
    fetch_handle: Option<std::thread::JoinHandle<()>>,
}

impl ImageCache {
    // Bootstrap the cache directory (load the ETag index, run
    // clean_cache), then start the worker thread, which in turn starts
    // the fetch thread. on_image is invoked from the worker thread for
    // every delivery, cached or fresh. The worker-starts-fetch ordering
    // dependency is kept, but made explicit here rather than being a
    // thread's own side effect.
    pub fn init(
        config: Config,
        on_image: impl Fn(ImageData) + Send + Sync + 'static,
    ) -> Result<Self, CacheError> {
        fs::create_dir_all(config.cache_dir())
            .map_err(|e| CacheError::io(config.cache_dir(), e))?;

        let index = Arc::new(RwLock::new(worker::bootstrap(&config)));
        let load_queue = SharedQueue::new();
        let work_queue = SharedQueue::new();

        let callback: worker::Callback = Arc::new(on_image);
        let worker_stage = Arc::new(WorkerStage::new(&config, work_queue.clone(), callback));
        let worker_handle = worker_stage.spawn();

        let fetch_stage = Arc::new(FetchStage::new(
            &config,
            index.clone(),
            load_queue.clone(),
            work_queue.clone(),
        ));
        let fetch_handle = fetch_stage.spawn();

        Ok(Self {
            config,
            index,
            load_queue,
            work_queue,
            worker_handle: Some(worker_handle),
            fetch_handle: Some(fetch_handle),
        })
    }

    // If a cached copy exists, queue an immediate disk-serve, and always
    // also queue a revalidation fetch. Callers must tolerate the callback
    // firing twice for one load(): once with the (possibly stale) cached
    // bytes, once with the revalidated or refreshed bytes.
    pub fn load(&self, url: impl Into<String>) {
        let url = url.into();

        if cache_dir::exists(self.config.cache_dir(), &url) {
            self.work_queue.push(WorkItem {
                url: url.clone(),
                bytes: None,
                request_failed: false,
            });
        }

        self.load_queue.push(LoadItem { url });
    }

    // Delete the cached file (if any), clear its ETag, and persist the
    // index. The index itself is thread-safe (RwLock), so this can run
    // concurrently with the fetch thread without any external timing
    // assumption.
    pub fn remove(&self, url: &str) {
        if !cache_dir::exists(self.config.cache_dir(), url) {
            return;
        }

        let path = hash::full_path(self.config.cache_dir(), &hash::filename_of(url));
        if let Err(err) = fs::remove_file(&path) {
            warn!(target: "image_cache", url = %url, path = ?path, error = %err, "failed to remove cache file");
        }

        let mut index = self.index.write();
        index.clear_etag(url);
        index.mark_dirty();
        let etag_path = self.config.cache_dir().join(ETAG_FILE_NAME);
        if let Err(err) = index.persist(&etag_path) {
            warn!(target: "image_cache", error = %err, "failed to persist etag index after remove");
        }
    }

    // Signal both threads to stop and join them worker-first, mirroring
    // the start order (the worker owns the fetch thread's lifecycle).
    // Idempotent: a second call is a no-op because the handles have
    // already been taken.
    pub fn shutdown(&mut self) {
        self.work_queue.stop();
        self.load_queue.stop();

        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.fetch_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ImageCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}
