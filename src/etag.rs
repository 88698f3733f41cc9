// In-memory URL -> ETag index, persisted as a flat text file, one
// "URL SP ETAG LF" record per line. An entry with no ETag (None) is never
// written out, so the file is always a subset of the in-memory index.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::hash::hash_from_url;

// URL -> ETag mapping. None means "known URL, no server validator yet".
#[derive(Debug, Default)]
pub struct EtagIndex {
    entries: FxHashMap<String, Option<String>>,
    dirty: bool,
}

impl EtagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // Tolerates a missing file (warn, start empty) and a truncated
    // trailing record (silently dropped).
    pub fn load_from(path: &Path) -> Self {
        let mut index = EtagIndex::new();

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(target: "image_cache", path = %path.display(), error = %err, "etag file missing or unreadable, starting with an empty index");
                return index;
            }
        };

        index.parse_into(&bytes);
        index
    }

    fn parse_into(&mut self, bytes: &[u8]) {
        let mut start = 0usize;
        let len = bytes.len();
        let mut line_no = 0usize;

        while start < len {
            line_no += 1;

            let line_end = bytes[start..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|p| start + p);

            let (line, next_start) = match line_end {
                Some(end) => (&bytes[start..end], end + 1),
                None => {
                    // Trailing partial record with no terminating LF, ignore.
                    debug!(target: "image_cache", "ignoring truncated trailing etag record");
                    break;
                }
            };

            let line = strip_trailing_cr(line);

            match split_url_etag(line) {
                Some((url, etag)) if !url.is_empty() && !etag.is_empty() => {
                    self.entries.insert(url.to_string(), Some(etag.to_string()));
                }
                _ => {
                    debug!(target: "image_cache", line = line_no, "skipping malformed etag record");
                }
            }

            start = next_start;
        }
    }

    pub fn get(&self, url: &str) -> Option<String> {
        self.entries.get(url).and_then(|e| e.clone())
    }

    // Insert an entry for url if one isn't already present. Used by the
    // fetch stage when a transfer completes for a URL not yet in the index.
    pub fn ensure(&mut self, url: &str, etag: Option<String>) {
        self.entries.entry(url.to_string()).or_insert(etag);
    }

    // Upsert, replacing any existing ETag (including None).
    pub fn set(&mut self, url: &str, etag: Option<String>) {
        self.entries.insert(url.to_string(), etag);
    }

    // Find the entry for url and set its ETag to None. The entry itself
    // remains, recording "known URL without validator".
    pub fn clear_etag(&mut self, url: &str) {
        if let Some(slot) = self.entries.get_mut(url) {
            *slot = None;
        }
    }

    // Rehash every URL in the index and remove the first one whose hash
    // matches. Used by eviction, which only knows the filename (hash) of
    // the file it removed.
    pub fn clear_etag_by_hash(&mut self, hash: &[u8; 16]) -> bool {
        let found = self
            .entries
            .keys()
            .find(|url| &hash_from_url(url) == hash)
            .cloned();

        match found {
            Some(url) => {
                self.entries.remove(&url);
                true
            }
            None => false,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // Write-to-temp-then-rename, avoids corrupting the file on a crash
    // mid-write.
    pub fn persist(&mut self, path: &Path) -> Result<(), CacheError> {
        let tmp_path = path.with_extension("tmp");

        let mut buf = Vec::new();
        for (url, etag) in &self.entries {
            if url.is_empty() {
                continue;
            }
            if let Some(etag) = etag {
                if etag.is_empty() {
                    continue;
                }
                buf.extend_from_slice(url.as_bytes());
                buf.push(b' ');
                buf.extend_from_slice(etag.as_bytes());
                buf.push(b'\n');
            }
        }

        {
            let mut file =
                File::create(&tmp_path).map_err(|e| CacheError::io(tmp_path.clone(), e))?;
            file.write_all(&buf)
                .map_err(|e| CacheError::io(tmp_path.clone(), e))?;
        }

        fs::rename(&tmp_path, path).map_err(|e| CacheError::io(path.to_path_buf(), e))?;

        self.dirty = false;
        Ok(())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn strip_trailing_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

fn split_url_etag(line: &[u8]) -> Option<(&str, &str)> {
    let space = line.iter().position(|&b| b == b' ')?;
    let (url, rest) = line.split_at(space);
    let etag = &rest[1..];
    let url = std::str::from_utf8(url).ok()?;
    let etag = std::str::from_utf8(etag).ok()?;
    Some((url, etag))
}
