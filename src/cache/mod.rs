//! On-disk bounded store for metrics awaiting a sender pass (§4.4, §4.7).
//!
//! Three record families, each in their own file under `directory`, plus a
//! small metafile recording the on-disk format version. `store` appends
//! length-prefixed records until the configured byte budget is exhausted,
//! at which point the cache latches into `Capacity::Max` and silently drops
//! further writes rather than growing unbounded. `drain` reads every
//! family fully before committing to a purge, so a corrupt or truncated
//! record file never causes partial, silent data loss — either the whole
//! drain succeeds and the cache is cleared, or it fails and nothing on
//! disk changes.

pub mod record;

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use crate::config::{CURRENT_CACHE_VERSION, HIGH_CAPACITY_THRESHOLD};
use crate::types::Capacity;

use record::{
    decode_aggregate, decode_individual, decode_sequence, encode_aggregate, encode_individual,
    encode_sequence, framed_record_size, read_framed_record, write_framed_record, AggregateRecord,
    IndividualRecord, SequenceRecord,
};

const METAFILE_NAME: &str = "cache.version";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Individual,
    Aggregate,
    Sequence,
}

impl Family {
    const ALL: [Family; 3] = [Family::Individual, Family::Aggregate, Family::Sequence];

    fn file_name(self) -> &'static str {
        match self {
            Family::Individual => "cache_individual.metrics",
            Family::Aggregate => "cache_aggregate.metrics",
            Family::Sequence => "cache_sequence.metrics",
        }
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache: failed to create directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("cache: failed to read metafile {path}: {source}")]
    ReadMetafile {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("cache: failed to write metafile {path}: {source}")]
    WriteMetafile {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("cache: failed to purge {path}: {source}")]
    Purge {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("cache: failed to measure directory size at {path}: {source}")]
    Measure {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("cache: I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("cache: record in {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },
}

#[allow(dead_code)]
impl CacheError {
    pub fn kind(&self) -> &str {
        match *self {
            CacheError::CreateDir { .. } => "CreateDir",
            CacheError::ReadMetafile { .. } => "ReadMetafile",
            CacheError::WriteMetafile { .. } => "WriteMetafile",
            CacheError::Purge { .. } => "Purge",
            CacheError::Measure { .. } => "Measure",
            CacheError::Io { .. } => "Io",
            CacheError::Corrupt { .. } => "Corrupt",
        }
    }
}

struct CacheState {
    size: u64,
    capacity: Capacity,
}

pub struct PersistentCache {
    directory: PathBuf,
    max_size: u64,
    state: Mutex<CacheState>,
}

impl PersistentCache {
    fn family_path(&self, family: Family) -> PathBuf {
        self.directory.join(family.file_name())
    }

    fn metafile_path(&self) -> PathBuf {
        self.directory.join(METAFILE_NAME)
    }

    /// Open (creating if absent) the cache at `directory`, bounded to
    /// `max_size` bytes. Purges all family files and rewrites the metafile
    /// whenever the on-disk version is absent, unreadable, or does not
    /// match [`CURRENT_CACHE_VERSION`] — no migration between versions is
    /// attempted (§4.7).
    pub fn init(directory: impl Into<PathBuf>, max_size: u64) -> Result<Self, CacheError> {
        let directory = directory.into();
        DirBuilder::new()
            .recursive(true)
            .mode(0o777)
            .create(&directory)
            .map_err(|source| CacheError::CreateDir {
                path: directory.display().to_string(),
                source,
            })?;

        let cache = PersistentCache {
            directory: directory.clone(),
            max_size,
            state: Mutex::new(CacheState {
                size: 0,
                capacity: Capacity::Low,
            }),
        };

        let on_disk_version = cache.read_version();
        if on_disk_version != Some(CURRENT_CACHE_VERSION) {
            log::info!(
                "cache: version {:?} at {} does not match current version {}, purging",
                on_disk_version,
                directory.display(),
                CURRENT_CACHE_VERSION
            );
            cache.purge_all()?;
            cache.write_version(CURRENT_CACHE_VERSION)?;
        }

        let size = cache.measure_size()?;
        let mut state = cache.state.lock().expect("cache state mutex poisoned");
        state.size = size;
        state.capacity =
            Capacity::from_size(Capacity::Low, size, cache.max_size, HIGH_CAPACITY_THRESHOLD);
        drop(state);

        Ok(cache)
    }

    fn read_version(&self) -> Option<u32> {
        let contents = fs::read_to_string(self.metafile_path()).ok()?;
        contents.trim().parse().ok()
    }

    fn write_version(&self, version: u32) -> Result<(), CacheError> {
        let path = self.metafile_path();
        fs::write(&path, version.to_string()).map_err(|source| CacheError::WriteMetafile {
            path: path.display().to_string(),
            source,
        })
    }

    fn purge_all(&self) -> Result<(), CacheError> {
        for family in Family::ALL {
            let path = self.family_path(family);
            if path.exists() {
                fs::remove_file(&path).map_err(|source| CacheError::Purge {
                    path: path.display().to_string(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    fn measure_size(&self) -> Result<u64, CacheError> {
        let mut total = 0u64;
        for family in Family::ALL {
            let path = self.family_path(family);
            match fs::metadata(&path) {
                Ok(meta) => total += meta.len(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(CacheError::Measure {
                        path: path.display().to_string(),
                        source,
                    })
                }
            }
        }
        Ok(total)
    }

    fn append_record(&self, family: Family, bytes: &[u8]) -> Result<bool, CacheError> {
        let mut state = self.state.lock().expect("cache state mutex poisoned");
        if state.capacity == Capacity::Max {
            return Ok(false);
        }

        let record_size = framed_record_size(bytes.len());
        if state.size + record_size > self.max_size {
            log::warn!(
                "cache: {} would exceed the {} byte budget, dropping record and latching capacity to Max",
                self.directory.display(),
                self.max_size
            );
            state.capacity = Capacity::Max;
            return Ok(false);
        }

        let path = self.family_path(family);
        // private mode at creation time only, matching the original's
        // G_FILE_CREATE_PRIVATE; an existing file's mode is left alone.
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o600)
            .open(&path)
            .map_err(|source| CacheError::Io {
                path: path.display().to_string(),
                source,
            })?;
        write_framed_record(&mut file, bytes).map_err(|source| CacheError::Io {
            path: path.display().to_string(),
            source,
        })?;

        state.size += record_size;
        state.capacity = Capacity::from_size(
            state.capacity,
            state.size,
            self.max_size,
            HIGH_CAPACITY_THRESHOLD,
        );
        Ok(true)
    }

    /// Append every given record, stopping silently (per record) once the
    /// budget would be exceeded. Returns the capacity state after the
    /// attempted writes, so callers can decide whether to trigger a drain.
    pub fn store(
        &self,
        individual: &[IndividualRecord],
        aggregate: &[AggregateRecord],
        sequence: &[SequenceRecord],
    ) -> Result<Capacity, CacheError> {
        for record in individual {
            self.append_record(Family::Individual, &encode_individual(record))?;
        }
        for record in aggregate {
            self.append_record(Family::Aggregate, &encode_aggregate(record))?;
        }
        for record in sequence {
            self.append_record(Family::Sequence, &encode_sequence(record))?;
        }
        Ok(self.state.lock().expect("cache state mutex poisoned").capacity)
    }

    fn read_all_framed(path: &Path) -> Result<Vec<Vec<u8>>, CacheError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        loop {
            match read_framed_record(&mut reader) {
                Ok(Some(bytes)) => records.push(bytes),
                Ok(None) => break,
                Err(source) => {
                    return Err(CacheError::Io {
                        path: path.display().to_string(),
                        source,
                    })
                }
            }
        }
        Ok(records)
    }

    /// Read every record from every family file, decode them all, and only
    /// then purge the on-disk files and reset the in-memory state. If any
    /// read or decode fails, the error is returned and the on-disk state is
    /// left completely untouched (§4.7).
    pub fn drain(
        &self,
    ) -> Result<(Vec<IndividualRecord>, Vec<AggregateRecord>, Vec<SequenceRecord>), CacheError> {
        let individual_path = self.family_path(Family::Individual);
        let aggregate_path = self.family_path(Family::Aggregate);
        let sequence_path = self.family_path(Family::Sequence);

        let individual_raw = Self::read_all_framed(&individual_path)?;
        let aggregate_raw = Self::read_all_framed(&aggregate_path)?;
        let sequence_raw = Self::read_all_framed(&sequence_path)?;

        let individual = individual_raw
            .iter()
            .map(|bytes| decode_individual(bytes))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CacheError::Corrupt {
                path: individual_path.display().to_string(),
                reason: e.to_string(),
            })?;
        let aggregate = aggregate_raw
            .iter()
            .map(|bytes| decode_aggregate(bytes))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CacheError::Corrupt {
                path: aggregate_path.display().to_string(),
                reason: e.to_string(),
            })?;
        let sequence = sequence_raw
            .iter()
            .map(|bytes| decode_sequence(bytes))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CacheError::Corrupt {
                path: sequence_path.display().to_string(),
                reason: e.to_string(),
            })?;

        self.purge_all()?;
        let mut state = self.state.lock().expect("cache state mutex poisoned");
        state.size = 0;
        state.capacity = Capacity::Low;

        Ok((individual, aggregate, sequence))
    }

    pub fn capacity(&self) -> Capacity {
        self.state.lock().expect("cache state mutex poisoned").capacity
    }

    pub fn size(&self) -> u64 {
        self.state.lock().expect("cache state mutex poisoned").size
    }
}
