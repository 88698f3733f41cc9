//! Unit-level checks of the public surface that don't need a live
//! origin: `Config`'s defaults and builder, and `ImageData`'s shape.
//! Module-internal invariants (hashing, ETag parsing, eviction math) have
//! their own `#[cfg(test)]` blocks next to the code they test.

use imgcache::{Config, ImageData};

#[test]
fn config_new_accepts_any_path_like_argument() {
    let _from_str = Config::new("relative/path");
    let _from_pathbuf = Config::new(std::path::PathBuf::from("/tmp/abs"));
    let _from_path = Config::new(std::path::Path::new("/tmp/abs2"));
}

#[test]
fn config_cache_dir_roundtrips() {
    let config = Config::new("/tmp/example-cache");
    assert_eq!(config.cache_dir(), std::path::Path::new("/tmp/example-cache"));
}

#[test]
fn config_builder_methods_chain() {
    let config = Config::new("/tmp/cache")
        .with_max_parallel(8)
        .with_cache_max_size(10)
        .with_cache_max_time(std::time::Duration::from_secs(3600))
        .with_request_timeout(std::time::Duration::from_secs(5))
        .with_tls_verification(true)
        .with_sort_survivors_by_atime(false);

    // The builder consumes and returns `Self`; reaching here without a
    // type error confirms every setter is chainable in any order.
    assert_eq!(config.cache_dir(), std::path::Path::new("/tmp/cache"));
}

#[test]
#[should_panic(expected = "max_parallel must be at least 1")]
fn config_rejects_zero_max_parallel() {
    let _ = Config::new("/tmp/cache").with_max_parallel(0);
}

#[test]
fn image_data_is_plain_and_clonable() {
    let data = ImageData {
        url: "http://host/a.png".to_string(),
        bytes: vec![1, 2, 3],
        size: 3,
    };
    let cloned = data.clone();
    assert_eq!(cloned.url, data.url);
    assert_eq!(cloned.bytes, data.bytes);
    assert_eq!(cloned.size, data.size);
}
