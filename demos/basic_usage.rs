// Minimal host-application wiring for imgcache.
//
// Run with: cargo run --example basic_usage -- <cache-dir> <url> [url...]

use std::sync::mpsc;
use std::time::Duration;

use imgcache::{Config, ImageCache, ImageData};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let cache_dir = args
        .next()
        .unwrap_or_else(|| "./image-cache-demo".to_string());
    let urls: Vec<String> = args.collect();

    if urls.is_empty() {
        eprintln!("usage: basic_usage <cache-dir> <url> [url...]");
        std::process::exit(1);
    }

    let (tx, rx) = mpsc::channel::<ImageData>();

    let mut cache = ImageCache::init(Config::new(&cache_dir), move |image: ImageData| {
        let _ = tx.send(image);
    })
    .expect("failed to initialize image cache");

    for url in &urls {
        cache.load(url.clone());
    }

    let mut remaining = urls.len();
    while remaining > 0 {
        match rx.recv_timeout(Duration::from_secs(65)) {
            Ok(image) => {
                println!("delivered {} bytes for {}", image.size, image.url);
                remaining -= 1;
            }
            Err(_) => {
                eprintln!("timed out waiting for a delivery");
                break;
            }
        }
    }

    cache.shutdown();
}
