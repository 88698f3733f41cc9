use std::path::{Path, PathBuf};
use std::time::Duration;

// Tunables for one ImageCache instance. No env var or CLI surface for
// any of this, the cache is a library core meant to be embedded and
// configured by a host application, not driven from a command line.
#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) cache_dir: PathBuf,
    pub(crate) max_parallel: usize,
    pub(crate) cache_max_size: usize,
    pub(crate) cache_max_time: Duration,
    pub(crate) request_timeout: Duration,
    pub(crate) danger_accept_invalid_certs: bool,
    pub(crate) sort_survivors_by_atime: bool,
}

impl Config {
    // max_parallel = 4, cache_max_size = 3, cache_max_time = 7 days,
    // request_timeout = 60s.
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            max_parallel: 4,
            cache_max_size: 3,
            cache_max_time: Duration::from_secs(60 * 60 * 24 * 7),
            request_timeout: Duration::from_secs(60),
            // Skipping certificate verification by default matches the
            // common case of talking to an internal image origin, exposed
            // as a knob rather than a hard-coded constant so a host can
            // turn verification back on.
            danger_accept_invalid_certs: true,
            sort_survivors_by_atime: true,
        }
    }

    pub fn with_max_parallel(mut self, n: usize) -> Self {
        assert!(n > 0, "max_parallel must be at least 1");
        self.max_parallel = n;
        self
    }

    pub fn with_cache_max_size(mut self, n: usize) -> Self {
        self.cache_max_size = n;
        self
    }

    pub fn with_cache_max_time(mut self, d: Duration) -> Self {
        self.cache_max_time = d;
        self
    }

    pub fn with_request_timeout(mut self, d: Duration) -> Self {
        self.request_timeout = d;
        self
    }

    pub fn with_tls_verification(mut self, verify: bool) -> Self {
        self.danger_accept_invalid_certs = !verify;
        self
    }

    // clean_cache can enforce its count bound either over survivors
    // sorted by access time (oldest evicted first, the default) or over
    // raw directory-iteration order. The latter is exposed for hosts that
    // need eviction order to match plain readdir order exactly.
    pub fn with_sort_survivors_by_atime(mut self, sort: bool) -> Self {
        self.sort_survivors_by_atime = sort;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}
