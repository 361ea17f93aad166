//! Stable per-host identity: a persisted fingerprint UUID and a MAC-derived
//! machine id. Both are memoized once per process (or per provider instance
//! in tests) behind a one-shot guard, per the concurrency model in the
//! specification: concurrent callers must not race to create the fingerprint
//! file or probe interfaces twice.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;
use uuid::Uuid;

/// Sentinel machine id returned when no hardware MAC can be determined, or
/// when the platform marker for a software-generated address is present.
pub const UNIDENTIFIABLE_MACHINE_ID: i64 = 1i64 << 48;

#[derive(Error, Debug)]
pub enum HostIdentityError {
    #[error("host identity: failed to create fingerprint directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("host identity: failed to write fingerprint file {path}: {source}")]
    WriteFingerprint {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[allow(dead_code)]
impl HostIdentityError {
    pub fn kind(&self) -> &str {
        match *self {
            HostIdentityError::CreateDir { .. } => "CreateDir",
            HostIdentityError::WriteFingerprint { .. } => "WriteFingerprint",
        }
    }
}

/// Capability interface for host identity. The production implementation
/// touches the filesystem and network interfaces; tests substitute a fixed
/// value so the rest of the pipeline can be exercised deterministically.
pub trait HostIdentityProvider: Send + Sync {
    fn fingerprint(&self) -> String;
    fn machine_id(&self) -> i64;
}

/// Production provider: fingerprint is lazily loaded from (or created at)
/// `fingerprint_path`; machine id is probed from network interfaces.
pub struct FilesystemHostIdentity {
    fingerprint_path: PathBuf,
    software_mac_marker: Option<PathBuf>,
    fingerprint: OnceLock<String>,
    machine_id: OnceLock<i64>,
}

impl FilesystemHostIdentity {
    pub fn new(fingerprint_path: impl Into<PathBuf>) -> Self {
        FilesystemHostIdentity {
            fingerprint_path: fingerprint_path.into(),
            software_mac_marker: Some(PathBuf::from("/etc/smsc95xx_mac_addr")),
            fingerprint: OnceLock::new(),
            machine_id: OnceLock::new(),
        }
    }

    /// Override the marker file whose presence means "this host's MAC is
    /// software-generated, do not trust it" (test hook; production default
    /// is `/etc/smsc95xx_mac_addr`, matching known USB ethernet adapters
    /// that burn a fixed, non-unique address into every unit).
    pub fn with_software_mac_marker(mut self, path: Option<PathBuf>) -> Self {
        self.software_mac_marker = path;
        self
    }

    fn load_or_create_fingerprint(&self) -> String {
        if let Ok(existing) = fs::read_to_string(&self.fingerprint_path) {
            let trimmed = existing.trim();
            if Uuid::parse_str(trimmed).is_ok() {
                return trimmed.to_string();
            }
        }

        let fresh = Uuid::new_v4().to_string();
        if let Err(e) = self.persist_fingerprint(&fresh) {
            log::error!("host identity: could not persist new fingerprint: {e}");
        }
        fresh
    }

    fn persist_fingerprint(&self, value: &str) -> Result<(), HostIdentityError> {
        if let Some(parent) = self.fingerprint_path.parent() {
            fs::create_dir_all(parent).map_err(|source| HostIdentityError::CreateDir {
                path: parent.display().to_string(),
                source,
            })?;
        }
        fs::write(&self.fingerprint_path, value).map_err(|source| {
            HostIdentityError::WriteFingerprint {
                path: self.fingerprint_path.display().to_string(),
                source,
            }
        })
    }

    fn has_software_mac_marker(&self) -> bool {
        self.software_mac_marker
            .as_deref()
            .is_some_and(Path::exists)
    }

    fn probe_machine_id(&self) -> i64 {
        if self.has_software_mac_marker() {
            return UNIDENTIFIABLE_MACHINE_ID;
        }

        if let Ok(Some(mac)) = mac_address::mac_address_by_name("eth0") {
            return mac_to_machine_id(&mac.bytes());
        }

        match mac_address::get_mac_address() {
            Ok(Some(mac)) => mac_to_machine_id(&mac.bytes()),
            _ => UNIDENTIFIABLE_MACHINE_ID,
        }
    }
}

impl HostIdentityProvider for FilesystemHostIdentity {
    fn fingerprint(&self) -> String {
        self.fingerprint
            .get_or_init(|| self.load_or_create_fingerprint())
            .clone()
    }

    fn machine_id(&self) -> i64 {
        *self.machine_id.get_or_init(|| self.probe_machine_id())
    }
}

fn mac_to_machine_id(bytes: &[u8; 6]) -> i64 {
    (bytes[0] as i64) << 40
        | (bytes[1] as i64) << 32
        | (bytes[2] as i64) << 24
        | (bytes[3] as i64) << 16
        | (bytes[4] as i64) << 8
        | (bytes[5] as i64)
}

/// Parse a colon-separated hex MAC string (`"01:23:45:67:89:ab"`) into the
/// 48-bit integer the wire format uses. Any malformed input yields the
/// "unidentifiable hardware" sentinel rather than an error, matching the
/// host-identity error policy: probe failures are silent.
pub fn parse_mac_to_machine_id(s: &str) -> i64 {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 6 {
        return UNIDENTIFIABLE_MACHINE_ID;
    }
    let mut bytes = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        match u8::from_str_radix(part, 16) {
            Ok(b) => bytes[i] = b,
            Err(_) => return UNIDENTIFIABLE_MACHINE_ID,
        }
    }
    mac_to_machine_id(&bytes)
}

/// Test double: fixed fingerprint and machine id, no filesystem or network
/// access.
pub struct FixedHostIdentity {
    pub fingerprint: String,
    pub machine_id: i64,
}

impl HostIdentityProvider for FixedHostIdentity {
    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }

    fn machine_id(&self) -> i64 {
        self.machine_id
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_well_formed_mac() {
        assert_eq!(parse_mac_to_machine_id("01:23:45:67:89:ab"), 0x0123456789ab);
    }

    #[test]
    fn malformed_mac_yields_sentinel() {
        assert_eq!(
            parse_mac_to_machine_id("not-a-mac"),
            UNIDENTIFIABLE_MACHINE_ID
        );
        assert_eq!(parse_mac_to_machine_id("01:23:45"), UNIDENTIFIABLE_MACHINE_ID);
        assert_eq!(
            parse_mac_to_machine_id("zz:23:45:67:89:ab"),
            UNIDENTIFIABLE_MACHINE_ID
        );
    }

    #[test]
    fn fingerprint_is_stable_across_reads() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FilesystemHostIdentity::new(dir.path().join("fingerprint"));
        let first = provider.fingerprint();
        let second = provider.fingerprint();
        assert_eq!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn fingerprint_survives_process_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fingerprint");
        let first_provider = FilesystemHostIdentity::new(&path);
        let first = first_provider.fingerprint();

        let second_provider = FilesystemHostIdentity::new(&path);
        let second = second_provider.fingerprint();
        assert_eq!(first, second);
    }

    #[test]
    fn software_mac_marker_forces_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        fs::write(&marker, b"1").unwrap();
        let provider = FilesystemHostIdentity::new(dir.path().join("fingerprint"))
            .with_software_mac_marker(Some(marker));
        assert_eq!(provider.machine_id(), UNIDENTIFIABLE_MACHINE_ID);
    }
}
