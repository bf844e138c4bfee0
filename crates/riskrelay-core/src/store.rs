//! Per-profile file storage
//!
//! Each profile owns a directory under the data root holding the entity
//! JSON files, the RSA key PEMs and the imported peer certificates:
//!
//! ```text
//! <root>/<profile>/persons.json
//! <root>/<profile>/locations.json
//! <root>/<profile>/activities.json
//! <root>/<profile>/cohabitations.json
//! <root>/<profile>/private.key        (PKCS8 PEM)
//! <root>/<profile>/public.key         (SPKI PEM)
//! <root>/<profile>/export.json        (plaintext own-series export)
//! <root>/<profile>/imports/<peer>.risk
//! <root>/incidence/                   (shared incidence cache)
//! ```
//!
//! Files are always replaced whole, via write-to-temp-then-rename, so a
//! concurrent reader sees either the old or the new content but never a
//! torn write. That is the only consistency guarantee this layer gives.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{RiskError, RiskResult};
use crate::types::{AnalysisDay, ProfileData};

/// Name of the shared incidence cache directory under the data root,
/// excluded from profile listing.
pub const INCIDENCE_DIR: &str = "incidence";

/// Storage for one profile's files.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    root: PathBuf,
    name: String,
}

impl ProfileStore {
    /// Open (and create if needed) the profile directory under `root`.
    pub fn open(root: impl AsRef<Path>, name: &str) -> RiskResult<Self> {
        let store = Self {
            root: root.as_ref().to_path_buf(),
            name: name.to_string(),
        };
        std::fs::create_dir_all(store.profile_dir())?;
        Ok(store)
    }

    /// Profile name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data root shared by all profiles.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn profile_dir(&self) -> PathBuf {
        self.root.join(&self.name)
    }

    /// Path of the shared incidence cache.
    pub fn incidence_dir(&self) -> PathBuf {
        self.root.join(INCIDENCE_DIR)
    }

    fn file(&self, name: &str) -> PathBuf {
        self.profile_dir().join(name)
    }

    fn imports_dir(&self) -> PathBuf {
        self.file("imports")
    }

    /// List profile directories under `root`, skipping the incidence cache.
    pub fn list_profiles(root: impl AsRef<Path>) -> RiskResult<Vec<String>> {
        let mut profiles = Vec::new();
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(_) => return Ok(profiles),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name != INCIDENCE_DIR {
                profiles.push(name);
            }
        }
        profiles.sort();
        Ok(profiles)
    }

    // ── Entity files ──────────────────────────────────────────────────────

    /// Load all entity files. Missing files yield empty maps, so a fresh
    /// profile directory is a valid empty profile.
    pub fn load_data(&self) -> RiskResult<ProfileData> {
        Ok(ProfileData {
            persons: self.load_map("persons.json")?,
            locations: self.load_map("locations.json")?,
            activities: self.load_map("activities.json")?,
            cohabitations: self.load_map("cohabitations.json")?,
        })
    }

    /// Overwrite all entity files with the given data.
    pub fn save_data(&self, data: &ProfileData) -> RiskResult<()> {
        self.save_map("persons.json", &data.persons)?;
        self.save_map("locations.json", &data.locations)?;
        self.save_map("activities.json", &data.activities)?;
        self.save_map("cohabitations.json", &data.cohabitations)?;
        Ok(())
    }

    fn load_map<T: DeserializeOwned>(&self, name: &str) -> RiskResult<HashMap<String, T>> {
        let path = self.file(name);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&data)
            .map_err(|e| RiskError::Serialization(format!("{}: {}", path.display(), e)))
    }

    fn save_map<T: Serialize>(&self, name: &str, map: &HashMap<String, T>) -> RiskResult<()> {
        let data = serde_json::to_vec_pretty(map)
            .map_err(|e| RiskError::Serialization(e.to_string()))?;
        self.write_atomic(&self.file(name), &data)
    }

    // ── Keypair PEMs ──────────────────────────────────────────────────────

    /// Load both key PEMs, or `None` if either is missing (the keypair is
    /// then generated and saved by the exchange channel).
    pub fn load_keys(&self) -> RiskResult<Option<(String, String)>> {
        let private = self.file("private.key");
        let public = self.file("public.key");
        if !private.exists() || !public.exists() {
            return Ok(None);
        }
        Ok(Some((
            std::fs::read_to_string(private)?,
            std::fs::read_to_string(public)?,
        )))
    }

    /// Persist both key PEMs.
    pub fn save_keys(&self, private_pem: &str, public_pem: &str) -> RiskResult<()> {
        self.write_atomic(&self.file("private.key"), private_pem.as_bytes())?;
        self.write_atomic(&self.file("public.key"), public_pem.as_bytes())?;
        Ok(())
    }

    // ── Imported certificates ─────────────────────────────────────────────

    /// Atomically replace the sealed certificate imported from `peer`.
    pub fn save_import(&self, peer: &str, sealed: &[u8]) -> RiskResult<()> {
        std::fs::create_dir_all(self.imports_dir())?;
        self.write_atomic(&self.imports_dir().join(format!("{peer}.risk")), sealed)
    }

    /// Sealed certificate bytes previously fetched from `peer`, if any.
    pub fn load_import(&self, peer: &str) -> RiskResult<Option<Vec<u8>>> {
        let path = self.imports_dir().join(format!("{peer}.risk"));
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // ── Plaintext export ──────────────────────────────────────────────────

    /// Write the profile owner's own outgoing series as `export.json`,
    /// oldest day first, for consumption outside the exchange protocol.
    pub fn save_export(&self, series: &[AnalysisDay]) -> RiskResult<()> {
        #[derive(Serialize)]
        struct ExportRow {
            date: NaiveDate,
            contagiousness: f64,
        }
        let rows: Vec<ExportRow> = series
            .iter()
            .rev()
            .map(|day| ExportRow {
                date: day.date,
                contagiousness: day.outgoing_risk,
            })
            .collect();
        let data = serde_json::to_vec_pretty(&rows)
            .map_err(|e| RiskError::Serialization(e.to_string()))?;
        self.write_atomic(&self.file("export.json"), &data)
    }

    /// Write-to-temp-then-rename in the destination directory.
    fn write_atomic(&self, path: &Path, data: &[u8]) -> RiskResult<()> {
        let dir = path
            .parent()
            .ok_or_else(|| RiskError::InvalidData(format!("no parent dir: {}", path.display())))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, data)?;
        tmp.persist(path)
            .map_err(|e| RiskError::Io(e.error))?;
        debug!(path = %path.display(), bytes = data.len(), "file replaced");
        Ok(())
    }
}
