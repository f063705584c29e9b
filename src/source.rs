//! Byte-addressable media sources.
//!
//! Mirrors the `ReadSeek`/concrete-source split used for audio streams
//! elsewhere in this crate's ancestry: a narrow trait plus a couple of
//! concrete implementations, with no opinions about caching or preload
//! (that lives in [`crate::cache`] and [`crate::preload`]).

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
};

use reqwest::blocking::Client;
use url::Url;

use crate::error::{Error, Result};

/// A byte-addressable source of media data.
///
/// Implementations must be safe to call from the demuxer's read callback
/// path while preload reads are in flight elsewhere, so they take `&self`
/// rather than `&mut self`.
pub trait Source: Send + Sync {
    /// Total byte length of the source, finalized on first call.
    fn size(&self) -> Result<u64>;

    /// Returns exactly the bytes in `[offset, offset + length)`, or fewer
    /// at end of source. Must never silently return truncated data except
    /// at EOF.
    fn read(&self, offset: u64, length: u32) -> Result<Vec<u8>>;

    /// Hints that future reads will be near `offset`. Optional; callers
    /// must tolerate sources that ignore it.
    fn seek(&self, _offset: u64) {}

    /// Releases any resources held by the source.
    fn close(&self) {}

    /// A stable key identifying this source, used to partition the chunk
    /// cache. For files: name+size+mtime; for URLs: the URL itself.
    fn cache_key(&self) -> String;
}

/// Local-file source. Always supports seek; random access is O(1).
pub struct FileSource {
    file: std::sync::Mutex<File>,
    size: u64,
    key: String,
}

impl FileSource {
    /// Opens a local file as a [`Source`].
    ///
    /// # Errors
    ///
    /// Returns [`Error`] if the file cannot be opened or its metadata
    /// cannot be read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let metadata = file.metadata()?;
        let size = metadata.len();
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs());

        let key = format!("file:{}:{size}:{mtime}", path.display());

        Ok(Self {
            file: std::sync::Mutex::new(file),
            size,
            key,
        })
    }
}

impl Source for FileSource {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn read(&self, offset: u64, length: u32) -> Result<Vec<u8>> {
        let mut file = self.file.lock()?;
        file.seek(SeekFrom::Start(offset))?;

        let mut buf = vec![0u8; length as usize];
        let mut filled = 0;
        loop {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    fn seek(&self, offset: u64) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.seek(SeekFrom::Start(offset));
        }
    }

    fn cache_key(&self) -> String {
        self.key.clone()
    }
}

/// Ranged-HTTP source. Requires server support for byte-range GET;
/// fails with [`crate::error::ErrorKind::SourceIo`] when a range is
/// rejected.
pub struct HttpSource {
    client: Client,
    url: Url,
    size: std::sync::OnceLock<u64>,
}

impl HttpSource {
    /// Creates a new ranged-HTTP source for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error`] if the underlying HTTP client cannot be built.
    pub fn new(url: Url) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            url,
            size: std::sync::OnceLock::new(),
        })
    }
}

impl Source for HttpSource {
    fn size(&self) -> Result<u64> {
        if let Some(&size) = self.size.get() {
            return Ok(size);
        }

        let response = self.client.head(self.url.clone()).send()?;
        let size = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| Error::source_io("server did not report Content-Length"))?;

        Ok(*self.size.get_or_init(|| size))
    }

    fn read(&self, offset: u64, length: u32) -> Result<Vec<u8>> {
        let end = offset.saturating_add(u64::from(length)).saturating_sub(1);
        let range = format!("bytes={offset}-{end}");

        let response = self
            .client
            .get(self.url.clone())
            .header(reqwest::header::RANGE, range)
            .send()?;

        if response.status() == reqwest::StatusCode::RANGE_NOT_SATISFIABLE {
            return Err(Error::source_io("server rejected byte-range request"));
        }
        if !(response.status().is_success()) {
            return Err(Error::source_io(format!(
                "unexpected HTTP status {}",
                response.status()
            )));
        }

        Ok(response.bytes()?.to_vec())
    }

    fn cache_key(&self) -> String {
        format!("url:{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_source_reads_exact_range() {
        let path = write_temp_file(b"0123456789");

        let source = FileSource::open(&path).unwrap();
        assert_eq!(source.size().unwrap(), 10);
        assert_eq!(source.read(3, 4).unwrap(), b"3456");

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn file_source_truncates_at_eof() {
        let path = write_temp_file(b"short");

        let source = FileSource::open(&path).unwrap();
        assert_eq!(source.read(2, 100).unwrap(), b"ort");

        let _ = std::fs::remove_file(path);
    }

    fn write_temp_file(contents: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "mediacore-test-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        file.write_all(contents).unwrap();
        path
    }
}
