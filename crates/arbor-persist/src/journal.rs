//! Journal marker for durable writes.
//!
//! Before the temporary file is renamed over the target, a marker naming
//! the temporary file and its checksum is written next to the target and
//! fsynced. If the process dies between the marker and the cleanup, the next
//! load can tell whether the temporary file is complete and finish the
//! rename, or throw it away.
//!
//! On-disk format (same framing as a WAL entry):
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (JSON-serialized JournalMarker)]
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Record of an in-flight atomic replace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalMarker {
    /// File name (no directory) of the temporary file.
    pub temp_name: String,
    /// Length of the temporary file's contents.
    pub len: u64,
    /// CRC32 of the temporary file's contents.
    pub crc32: u32,
}

impl JournalMarker {
    /// Describe `contents` written to the temporary file `temp_name`.
    pub fn new(temp_name: impl Into<String>, contents: &[u8]) -> Self {
        Self {
            temp_name: temp_name.into(),
            len: contents.len() as u64,
            crc32: crc32fast::hash(contents),
        }
    }

    /// Returns `true` if `contents` is exactly what the marker describes.
    pub fn matches(&self, contents: &[u8]) -> bool {
        contents.len() as u64 == self.len && crc32fast::hash(contents) == self.crc32
    }

    /// Returns `true` if `temp_name` is a bare file name.
    pub fn is_well_formed(&self) -> bool {
        Path::new(&self.temp_name).file_name().and_then(|n| n.to_str())
            == Some(self.temp_name.as_str())
    }

    /// Write the framed marker to `path` and fsync it.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        let payload = serde_json::to_vec(self).map_err(io::Error::other)?;
        let length = payload.len() as u32;
        let crc = crc32fast::hash(&payload);

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&length.to_le_bytes())?;
        file.write_all(&crc.to_le_bytes())?;
        file.write_all(&payload)?;
        file.sync_all()
    }

    /// Read a marker from `path`.
    ///
    /// Returns `Ok(None)` if the file is missing, truncated, or fails its
    /// CRC check; a torn marker means the rename it guards never started.
    pub fn read(path: &Path) -> io::Result<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        if bytes.len() < HEADER_SIZE {
            warn!(path = %path.display(), len = bytes.len(), "truncated journal header");
            return Ok(None);
        }
        let length = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let expected_crc = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

        let Some(payload) = bytes.get(HEADER_SIZE..HEADER_SIZE + length) else {
            warn!(path = %path.display(), length, "truncated journal payload");
            return Ok(None);
        };
        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            warn!(
                path = %path.display(),
                expected = expected_crc,
                actual = actual_crc,
                "journal CRC mismatch"
            );
            return Ok(None);
        }

        match serde_json::from_slice::<JournalMarker>(payload) {
            Ok(marker) => Ok(Some(marker)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "undecodable journal marker");
                Ok(None)
            }
        }
    }
}

/// What recovery did with leftovers of an interrupted write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// No journal and no stray temporary files.
    Clean,
    /// A complete temporary file was renamed over the target.
    RolledForward,
    /// Leftover artifacts were removed; the target was left as it was.
    Discarded,
}

/// fsync a directory so a rename inside it is durable.
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
        Ok(())
    }
}
