// Enumerate, evict and probe cache files on disk.

use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::error::CacheError;
use crate::etag::EtagIndex;
use crate::hash::{bytes_from_hex, full_path, is_cache_filename, filename_of, FILENAME_LEN};

// Plain existence probe for the cache file backing url, nothing more.
pub fn exists(cache_dir: &Path, url: &str) -> bool {
    full_path(cache_dir, &filename_of(url)).exists()
}

struct Candidate {
    path: std::path::PathBuf,
    hash_hex: String,
    atime: SystemTime,
}

// Enforce the count bound and the age bound against cache_dir in a single
// pass, invalidating the ETag entry for every file removed, then
// persisting the index if anything changed.
//
// Not a true LRU, it's a bounded survivor set. Sorting survivors by
// access time before applying the count bound (oldest evicted first) is
// the default (Config::sort_survivors_by_atime), with a fallback to raw
// directory-iteration order for hosts that need parity with naive
// count-bound eviction. See DESIGN.md for why both are kept.
pub fn clean_cache(
    cache_dir: &Path,
    index: &mut EtagIndex,
    cache_max_size: usize,
    cache_max_time: Duration,
    sort_by_atime: bool,
) -> Result<(), CacheError> {
    let entries = std::fs::read_dir(cache_dir).map_err(|e| CacheError::io(cache_dir, e))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!(target: "image_cache", error = %err, "skipping unreadable directory entry during clean_cache");
                continue;
            }
        };

        let name = entry.file_name();
        let name = match name.to_str() {
            Some(n) => n,
            None => continue,
        };

        if !is_cache_filename(name) {
            continue;
        }

        let hash_hex = name[2..FILENAME_LEN].to_string();
        if bytes_from_hex(&hash_hex).is_none() {
            continue;
        }

        let atime = match entry.metadata().and_then(|m| m.accessed()) {
            Ok(t) => t,
            Err(err) => {
                warn!(target: "image_cache", path = ?entry.path(), error = %err, "could not stat cache file, skipping");
                continue;
            }
        };

        candidates.push(Candidate {
            path: entry.path(),
            hash_hex,
            atime,
        });
    }

    if sort_by_atime {
        // Most-recently-accessed first, so the oldest files are the ones
        // that run out of room under the count bound below.
        candidates.sort_by(|a, b| b.atime.cmp(&a.atime));
    }

    let now = SystemTime::now();
    let mut dirty = false;
    let mut survivors = 0usize;

    for candidate in candidates {
        let remove = if survivors >= cache_max_size {
            true
        } else {
            let age = now
                .duration_since(candidate.atime)
                .unwrap_or(Duration::ZERO);
            age > cache_max_time
        };

        if remove {
            if let Err(err) = std::fs::remove_file(&candidate.path) {
                warn!(target: "image_cache", path = ?candidate.path, error = %err, "failed to remove evicted cache file");
            } else {
                debug!(target: "image_cache", path = ?candidate.path, "evicted cache file");
            }

            if let Some(hash) = bytes_from_hex(&candidate.hash_hex) {
                if index.clear_etag_by_hash(&hash) {
                    dirty = true;
                }
            }
        } else {
            survivors += 1;
        }
    }

    if dirty {
        index.mark_dirty();
        let etag_path = cache_dir.join(crate::ETAG_FILE_NAME);
        index.persist(&etag_path)?;
    }

    Ok(())
}
