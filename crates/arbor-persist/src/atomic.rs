//! Crash-safe replacement of a target file.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use arbor_types::{StoreError, StoreResult};
use memmap2::MmapMut;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::journal::{sync_dir, JournalMarker, RecoveryOutcome};
use crate::options::WriteOptions;

/// Steps of the durable write protocol, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WriteStage {
    /// Creating the temporary file next to the target.
    CreateTemp,
    /// Writing serialized contents into the temporary file.
    WriteTemp,
    /// fsync of the temporary file (journaled writes only).
    SyncTemp,
    /// Recording the journal marker (journaled writes only).
    Journal,
    /// Renaming the temporary file over the target.
    Rename,
}

impl WriteStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateTemp => "create-temp",
            Self::WriteTemp => "write-temp",
            Self::SyncTemp => "sync-temp",
            Self::Journal => "journal",
            Self::Rename => "rename",
        }
    }
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A target file replaced atomically on every write.
///
/// Temporary files are named `.<target>.<random>.tmp` and the journal
/// `<target>.journal`, both in the target's directory so the final rename
/// never crosses a filesystem.
#[derive(Clone, Debug)]
pub struct AtomicFile {
    target: PathBuf,
    options: WriteOptions,
    #[cfg(any(test, feature = "failpoints"))]
    fault: Option<WriteStage>,
}

impl AtomicFile {
    pub fn new(target: impl Into<PathBuf>, options: WriteOptions) -> Self {
        Self {
            target: target.into(),
            options,
            #[cfg(any(test, feature = "failpoints"))]
            fault: None,
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Point at a different target file.
    pub fn set_target(&mut self, target: impl Into<PathBuf>) {
        self.target = target.into();
    }

    /// Path of the journal marker for this target.
    pub fn journal_path(&self) -> PathBuf {
        let mut name = self.file_name();
        name.push_str(".journal");
        self.target.with_file_name(name)
    }

    /// Make every following write fail at `stage` (or stop failing on `None`).
    #[cfg(any(test, feature = "failpoints"))]
    pub fn inject_fault(&mut self, stage: Option<WriteStage>) {
        self.fault = stage;
    }

    /// Read the target's contents, or `None` if it does not exist yet.
    pub fn read(&self) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(&self.target) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the target with `contents`.
    ///
    /// On error the target is exactly as it was before the call and no
    /// temporary file or journal is left behind.
    pub fn write(&self, contents: &[u8]) -> StoreResult<()> {
        let dir = self.dir();
        fs::create_dir_all(&dir).map_err(|e| self.failed(WriteStage::CreateTemp, e))?;

        let temp = self
            .check(WriteStage::CreateTemp)
            .and_then(|()| {
                tempfile::Builder::new()
                    .prefix(&self.temp_prefix())
                    .suffix(".tmp")
                    .tempfile_in(&dir)
            })
            .map_err(|e| self.failed(WriteStage::CreateTemp, e))?;

        self.check(WriteStage::WriteTemp)
            .and_then(|()| self.fill(&temp, contents))
            .map_err(|e| self.failed(WriteStage::WriteTemp, e))?;

        let journal = if self.options.use_journal {
            self.check(WriteStage::SyncTemp)
                .and_then(|()| temp.as_file().sync_all())
                .map_err(|e| self.failed(WriteStage::SyncTemp, e))?;

            let temp_name = temp
                .path()
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let journal = self.journal_path();
            let recorded = self
                .check(WriteStage::Journal)
                .and_then(|()| JournalMarker::new(temp_name, contents).write(&journal));
            if let Err(e) = recorded {
                remove_quietly(&journal);
                return Err(self.failed(WriteStage::Journal, e));
            }
            Some(journal)
        } else {
            None
        };

        let renamed = self
            .check(WriteStage::Rename)
            .and_then(|()| temp.persist(&self.target).map(drop).map_err(|e| e.error));
        if let Err(e) = renamed {
            // The temporary file was dropped with the error; only the journal
            // can still be on disk.
            if let Some(journal) = &journal {
                remove_quietly(journal);
            }
            warn!(target = %self.target.display(), error = %e, "atomic rename failed");
            return Err(self.failed(WriteStage::Rename, e));
        }

        if let Some(journal) = journal {
            if let Err(e) = sync_dir(&dir) {
                warn!(dir = %dir.display(), error = %e, "directory fsync failed");
            }
            remove_quietly(&journal);
        }

        debug!(
            target = %self.target.display(),
            bytes = contents.len(),
            journal = self.options.use_journal,
            mmap = self.options.write_mmap,
            "atomic write complete"
        );
        Ok(())
    }

    /// Finish or discard an interrupted write, then remove stray temporary
    /// files belonging to this target.
    pub fn recover(&self) -> StoreResult<RecoveryOutcome> {
        let journal = self.journal_path();
        let mut outcome = RecoveryOutcome::Clean;

        match JournalMarker::read(&journal)? {
            Some(marker) if marker.is_well_formed() => {
                let temp = self.dir().join(&marker.temp_name);
                let complete = match fs::read(&temp) {
                    Ok(bytes) => marker.matches(&bytes),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => false,
                    Err(e) => return Err(e.into()),
                };
                if complete {
                    fs::rename(&temp, &self.target)?;
                    sync_dir(&self.dir())?;
                    info!(target = %self.target.display(), "rolled interrupted write forward");
                    outcome = RecoveryOutcome::RolledForward;
                } else {
                    warn!(target = %self.target.display(), "discarding incomplete write");
                    outcome = RecoveryOutcome::Discarded;
                }
                fs::remove_file(&journal)?;
            }
            _ if journal.exists() => {
                warn!(journal = %journal.display(), "discarding unreadable journal");
                fs::remove_file(&journal)?;
                outcome = RecoveryOutcome::Discarded;
            }
            _ => {}
        }

        if self.sweep_temp_files()? > 0 && outcome == RecoveryOutcome::Clean {
            outcome = RecoveryOutcome::Discarded;
        }
        Ok(outcome)
    }

    fn sweep_temp_files(&self) -> StoreResult<usize> {
        let dir = self.dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let prefix = self.temp_prefix();
        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(&prefix) && name.ends_with(".tmp") {
                warn!(file = name, "removing stray temporary file");
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn fill(&self, temp: &NamedTempFile, contents: &[u8]) -> io::Result<()> {
        let file = temp.as_file();
        if self.options.write_mmap && !contents.is_empty() {
            file.set_len(contents.len() as u64)?;
            // SAFETY: the temporary file was just created by us, is exclusively
            // owned by this call, and has been sized to exactly `contents`.
            let mut map = unsafe { MmapMut::map_mut(file)? };
            map.copy_from_slice(contents);
            map.flush()
        } else {
            let mut writer: &File = file;
            writer.write_all(contents)?;
            writer.flush()
        }
    }

    fn dir(&self) -> PathBuf {
        match self.target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn file_name(&self) -> String {
        self.target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string())
    }

    fn temp_prefix(&self) -> String {
        format!(".{}.", self.file_name())
    }

    fn failed(&self, stage: WriteStage, source: io::Error) -> StoreError {
        StoreError::WriteFailed {
            path: self.target.clone(),
            stage: stage.as_str(),
            source,
        }
    }

    #[cfg(any(test, feature = "failpoints"))]
    fn check(&self, stage: WriteStage) -> io::Result<()> {
        if self.fault == Some(stage) {
            return Err(io::Error::other(format!("injected fault at {stage}")));
        }
        Ok(())
    }

    #[cfg(not(any(test, feature = "failpoints")))]
    fn check(&self, _stage: WriteStage) -> io::Result<()> {
        Ok(())
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove journal");
        }
    }
}
