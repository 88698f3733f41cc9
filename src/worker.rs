// Bootstrap, serve cached hits, persist new bytes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::cache_dir;
use crate::config::Config;
use crate::etag::EtagIndex;
use crate::hash::{filename_of, full_path};
use crate::queue::{SharedQueue, WorkItem};
use crate::{ImageData, ETAG_FILE_NAME};

pub(crate) type Callback = Arc<dyn Fn(ImageData) + Send + Sync>;

// Runs once, synchronously, before either background thread starts, so
// the load-then-evict ordering dependency lives explicitly in the
// controller's init sequence rather than as a thread's side effect.
pub(crate) fn bootstrap(config: &Config) -> EtagIndex {
    let etag_path = config.cache_dir().join(ETAG_FILE_NAME);
    let mut index = EtagIndex::load_from(&etag_path);

    if let Err(err) = cache_dir::clean_cache(
        config.cache_dir(),
        &mut index,
        config.cache_max_size,
        config.cache_max_time,
        config.sort_survivors_by_atime,
    ) {
        warn!(target: "image_cache", error = %err, "clean_cache failed during bootstrap");
    }

    index
}

pub(crate) struct WorkerStage {
    cache_dir: PathBuf,
    work_queue: Arc<SharedQueue<WorkItem>>,
    callback: Callback,
}

impl WorkerStage {
    pub fn new(config: &Config, work_queue: Arc<SharedQueue<WorkItem>>, callback: Callback) -> Self {
        Self {
            cache_dir: config.cache_dir().to_path_buf(),
            work_queue,
            callback,
        }
    }

    pub fn spawn(self: Arc<Self>) -> std::thread::JoinHandle<()> {
        std::thread::Builder::new()
            .name("image-cache-worker".into())
            .spawn(move || self.run())
            .expect("failed to spawn worker thread")
    }

    fn run(&self) {
        loop {
            if !self.work_queue.wait_while_empty_and_running() {
                break;
            }

            // Move every queued item into a local batch; items are only
            // guaranteed to be seen exactly once, not processed in any
            // particular cross-batch order, so draining the whole queue
            // per wake is correct.
            let batch = self.work_queue.drain_all();
            for item in batch {
                self.process(item);
            }
        }
    }

    fn process(&self, item: WorkItem) {
        match item {
            WorkItem {
                url,
                bytes: Some(bytes),
                request_failed: _,
            } if !bytes.is_empty() => {
                self.save_and_deliver(&url, bytes);
            }
            WorkItem {
                url,
                request_failed: true,
                ..
            } => {
                self.serve_from_disk_or_empty(&url);
            }
            WorkItem { url, .. } => {
                // bytes = None (or empty) and request_failed = false:
                // revalidation succeeded, or this is the disk-cache fast
                // path queued straight from `load()`.
                self.serve_from_disk_or_empty(&url);
            }
        }
    }

    fn save_and_deliver(&self, url: &str, bytes: Vec<u8>) {
        let path = full_path(&self.cache_dir, &filename_of(url));

        if let Err(err) = write_file(&path, &bytes) {
            error!(target: "image_cache", url = %url, path = ?path, error = %err, "failed writing cache file, removing partial file");
            let _ = std::fs::remove_file(&path);
        } else {
            debug!(target: "image_cache", url = %url, bytes = bytes.len(), "saved updated image to cache");
        }

        // The host still gets the image it was promised, even if the
        // write-through to disk failed.
        (self.callback)(ImageData {
            url: url.to_string(),
            size: bytes.len(),
            bytes,
        });
    }

    fn serve_from_disk_or_empty(&self, url: &str) {
        let path = full_path(&self.cache_dir, &filename_of(url));

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(target: "image_cache", url = %url, path = ?path, error = %err, "failed reading cached file, delivering empty bytes");
                }
                Vec::new()
            }
        };

        (self.callback)(ImageData {
            url: url.to_string(),
            size: bytes.len(),
            bytes,
        });
    }

}

fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, bytes)
}
