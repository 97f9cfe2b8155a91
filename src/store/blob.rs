//! Raw detail documents stored as one JSON object per activity
//!
//! Objects are named `<activity_id>.json`, or `<activity_id>.json.gz` when
//! compression is enabled. Both forms are readable regardless of the setting.

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{RawDetailReader, RawDetailWriter};
use crate::error::{ActivityError, StoreError};
use crate::models::ActivityId;
use crate::series::RawActivityDetail;

const PLAIN_SUFFIX: &str = ".json";
const GZIP_SUFFIX: &str = ".json.gz";

/// Directory-backed detail store
#[derive(Debug, Clone)]
pub struct DetailStore {
    root: PathBuf,
    compress: bool,
}

impl DetailStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn new<P: AsRef<Path>>(root: P, compress: bool) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root, compress })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, activity_id: ActivityId, suffix: &str) -> PathBuf {
        self.root.join(format!("{}{}", activity_id, suffix))
    }

    fn read_object(&self, activity_id: ActivityId) -> io::Result<Option<Vec<u8>>> {
        let gz_path = self.object_path(activity_id, GZIP_SUFFIX);
        if gz_path.is_file() {
            let mut decoder = GzDecoder::new(fs::File::open(&gz_path)?);
            let mut bytes = Vec::new();
            decoder.read_to_end(&mut bytes)?;
            return Ok(Some(bytes));
        }

        let plain_path = self.object_path(activity_id, PLAIN_SUFFIX);
        if plain_path.is_file() {
            return fs::read(&plain_path).map(Some);
        }

        Ok(None)
    }
}

/// Activity id encoded in an object file name, if it is one
fn parse_object_name(name: &str) -> Option<ActivityId> {
    name.strip_suffix(GZIP_SUFFIX)
        .or_else(|| name.strip_suffix(PLAIN_SUFFIX))
        .and_then(|stem| stem.parse().ok())
}

impl RawDetailReader for DetailStore {
    fn fetch(&self, activity_id: ActivityId) -> Result<RawActivityDetail, ActivityError> {
        let unreadable = |reason: String| ActivityError::Integrity {
            activity_id,
            sample: 0,
            elapsed: "n/a".to_string(),
            reason,
        };

        let bytes = self
            .read_object(activity_id)
            .map_err(|e| unreadable(format!("detail object unreadable: {}", e)))?
            .ok_or(ActivityError::NotFound { activity_id })?;

        serde_json::from_slice(&bytes).map_err(|e| unreadable(format!("malformed detail document: {}", e)))
    }

    fn list_ids(&self) -> Result<Vec<ActivityId>, StoreError> {
        let io_err = |source: io::Error| StoreError::Io {
            path: self.root.clone(),
            source,
        };

        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let name = entry.file_name();
            match name.to_str().and_then(parse_object_name) {
                Some(id) => ids.push(id),
                None => warn!(file = ?name, "Ignoring unrecognised object in detail store"),
            }
        }

        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}

impl RawDetailWriter for DetailStore {
    fn put(&self, activity_id: ActivityId, detail: &RawActivityDetail) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(detail)?;
        let (path, stale) = if self.compress {
            (self.object_path(activity_id, GZIP_SUFFIX), self.object_path(activity_id, PLAIN_SUFFIX))
        } else {
            (self.object_path(activity_id, PLAIN_SUFFIX), self.object_path(activity_id, GZIP_SUFFIX))
        };
        let io_err = |source: io::Error| StoreError::Io {
            path: path.clone(),
            source,
        };

        if self.compress {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&json).map_err(io_err)?;
            fs::write(&path, encoder.finish().map_err(io_err)?).map_err(io_err)?;
        } else {
            fs::write(&path, &json).map_err(io_err)?;
        }

        // Only one object per activity, the other form would shadow or duplicate it
        if stale.is_file() {
            fs::remove_file(&stale).map_err(|source| StoreError::Io { path: stale.clone(), source })?;
        }

        debug!(activity_id, path = %path.display(), bytes = json.len(), "Detail object written");
        Ok(())
    }
}
