// Bounded-concurrency HTTP fetch with conditional revalidation. One
// dedicated OS thread owns a small current-thread tokio runtime and
// drives up to max_parallel concurrent transfers via a JoinSet, the same
// multi-transfer-over-one-thread shape a libcurl multi-handle with a
// select() loop would give you.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::Client;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cache_dir;
use crate::config::Config;
use crate::etag::EtagIndex;
use crate::queue::{LoadItem, SharedQueue, WorkItem};
use crate::ETAG_FILE_NAME;

enum FetchOutcome {
    Success {
        url: String,
        sent_etag: Option<String>,
        response_etag: Option<String>,
        body: Vec<u8>,
    },
    Failure {
        url: String,
    },
}

pub(crate) struct FetchStage {
    client: Client,
    cache_dir: PathBuf,
    index: Arc<RwLock<EtagIndex>>,
    max_parallel: usize,
    request_timeout: Duration,
    load_queue: Arc<SharedQueue<LoadItem>>,
    work_queue: Arc<SharedQueue<WorkItem>>,
}

impl FetchStage {
    pub fn new(
        config: &Config,
        index: Arc<RwLock<EtagIndex>>,
        load_queue: Arc<SharedQueue<LoadItem>>,
        work_queue: Arc<SharedQueue<WorkItem>>,
    ) -> Self {
        let client = Client::builder()
            .danger_accept_invalid_certs(config.danger_accept_invalid_certs)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .expect("reqwest client configuration is always valid");

        Self {
            client,
            cache_dir: config.cache_dir().to_path_buf(),
            index,
            max_parallel: config.max_parallel,
            request_timeout: config.request_timeout,
            load_queue,
            work_queue,
        }
    }

    // Spawn the fetch thread. Blocks the calling thread only long enough
    // to hand off, the returned handle is joined from destroy().
    pub fn spawn(self: Arc<Self>) -> std::thread::JoinHandle<()> {
        std::thread::Builder::new()
            .name("image-cache-fetch".into())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build fetch stage runtime");
                runtime.block_on(self.run());
            })
            .expect("failed to spawn fetch thread")
    }

    async fn run(self: Arc<Self>) {
        let mut in_flight: JoinSet<FetchOutcome> = JoinSet::new();

        loop {
            if !self.load_queue.is_running() {
                break;
            }

            let free_slots = self.max_parallel.saturating_sub(in_flight.len());
            if free_slots > 0 {
                for item in self.load_queue.drain_up_to(free_slots) {
                    self.spawn_transfer(&mut in_flight, item);
                }
            }

            if in_flight.is_empty() {
                if !self.load_queue.wait_while_empty_and_running() {
                    break;
                }
                continue;
            }

            let outcome = tokio::select! {
                res = in_flight.join_next() => res,
                _ = tokio::time::sleep(Duration::from_secs(1)) => None,
            };

            let mut dirty = false;
            if let Some(res) = outcome {
                match res {
                    Ok(outcome) => {
                        if self.handle_outcome(outcome) {
                            dirty = true;
                        }
                    }
                    Err(join_err) => {
                        warn!(target: "image_cache", error = %join_err, "fetch task panicked");
                    }
                }

                // Opportunistically drain any other transfers that
                // completed in the same tick instead of handling one and
                // looping back around.
                while let Some(res) = in_flight.try_join_next() {
                    match res {
                        Ok(outcome) => {
                            if self.handle_outcome(outcome) {
                                dirty = true;
                            }
                        }
                        Err(join_err) => {
                            warn!(target: "image_cache", error = %join_err, "fetch task panicked");
                        }
                    }
                }
            }

            if dirty {
                let path = self.cache_dir.join(ETAG_FILE_NAME);
                let mut index = self.index.write();
                if let Err(err) = index.persist(&path) {
                    warn!(target: "image_cache", error = %err, "failed to persist etag index");
                }
            }
        }

        in_flight.abort_all();
    }

    fn spawn_transfer(&self, in_flight: &mut JoinSet<FetchOutcome>, item: LoadItem) {
        let sent_etag = if cache_dir::exists(&self.cache_dir, &item.url) {
            self.index.read().get(&item.url)
        } else {
            None
        };

        let client = self.client.clone();
        let url = item.url;
        let timeout = self.request_timeout;
        let etag_for_header = sent_etag.clone();

        if let Some(etag) = &sent_etag {
            debug!(target: "image_cache", url = %url, etag = %etag, "revalidating with If-None-Match");
        }

        in_flight.spawn(async move {
            let mut request = client.get(&url).timeout(timeout);
            if let Some(etag) = &etag_for_header {
                request = request.header(reqwest::header::IF_NONE_MATCH, format!("\"{etag}\""));
            }

            match request.send().await {
                Ok(response) => {
                    let response_etag = response
                        .headers()
                        .get(reqwest::header::ETAG)
                        .and_then(|v| v.to_str().ok())
                        .map(|s| extract_quoted(s).to_string());

                    match response.bytes().await {
                        Ok(body) => FetchOutcome::Success {
                            url,
                            sent_etag,
                            response_etag,
                            body: body.to_vec(),
                        },
                        Err(err) => {
                            warn!(target: "image_cache", url = %url, error = %err, "failed reading response body");
                            FetchOutcome::Failure { url }
                        }
                    }
                }
                Err(err) => {
                    warn!(target: "image_cache", url = %url, error = %err, "http transfer failed");
                    FetchOutcome::Failure { url }
                }
            }
        });
    }

    // Returns true if the etag index became dirty as a result.
    fn handle_outcome(&self, outcome: FetchOutcome) -> bool {
        match outcome {
            FetchOutcome::Success {
                url,
                sent_etag,
                response_etag,
                body,
            } => {
                let mut index = self.index.write();
                index.ensure(&url, sent_etag.clone());

                if !body.is_empty() {
                    self.work_queue.push(WorkItem {
                        url: url.clone(),
                        bytes: Some(body),
                        request_failed: false,
                    });

                    let old_had_etag = index.get(&url).is_some();
                    let new_has_etag = response_etag.is_some();
                    let dirty = old_had_etag || new_has_etag;

                    index.set(&url, response_etag);
                    dirty
                } else {
                    self.work_queue.push(WorkItem {
                        url,
                        bytes: None,
                        request_failed: false,
                    });
                    false
                }
            }
            FetchOutcome::Failure { url } => {
                self.work_queue.push(WorkItem {
                    url,
                    bytes: None,
                    request_failed: true,
                });
                false
            }
        }
    }
}

// Extract the token between the first pair of double quotes. Falls back
// to the raw value if the server sent an unquoted (weak or otherwise
// malformed) ETag.
fn extract_quoted(value: &str) -> &str {
    let bytes = value.as_bytes();
    if let Some(first) = bytes.iter().position(|&b| b == b'"') {
        if let Some(rel) = bytes[first + 1..].iter().position(|&b| b == b'"') {
            return &value[first + 1..first + 1 + rel];
        }
    }
    value
}
