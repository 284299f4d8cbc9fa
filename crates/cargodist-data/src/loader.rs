//! Loading pipeline: finds data files, deserializes them and builds the
//! cargo table.
//!
//! Provides format detection (RON/JSON/TOML), file discovery and
//! deserialization helpers, plus [`load_distribution_data`] which loads a
//! whole data directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cargodist_core::id::{CargoClass, CargoId};
use cargodist_core::settings::{DistributionType, LinkGraphSettings, SettingsError};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::schema::{CargoData, TomlCargos};

/// Base name of the optional settings file.
pub const SETTINGS_FILE: &str = "linkgraph";
/// Base name of the required cargo table.
pub const CARGOS_FILE: &str = "cargos";

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// Two cargos share a numeric id.
    #[error("duplicate cargo id {id} in {file}")]
    DuplicateId { file: PathBuf, id: u8 },

    /// The settings parsed but are out of range.
    #[error("invalid settings in {file}")]
    InvalidSettings {
        file: PathBuf,
        #[source]
        source: SettingsError,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name.
///
/// Looks for `{base_name}.ron`, `{base_name}.toml` and `{base_name}.json`.
/// Returns `Ok(None)` if none exists and `Err(ConflictingFormats)` if more
/// than one does.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;

    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// Like [`find_data_file`], but a missing file is an error.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, detail: impl ToString) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

/// Read a file and deserialize it according to its extension.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

// ===========================================================================
// Duplicate checks
// ===========================================================================

/// Fail with `DuplicateName` if `name` is already in the map.
pub fn check_duplicate<V>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

// ===========================================================================
// Resolved data
// ===========================================================================

/// One resolved cargo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CargoEntry {
    pub name: String,
    pub id: CargoId,
    pub class: CargoClass,
}

/// The cargos a game knows, addressable by name or id.
#[derive(Debug, Clone, Default)]
pub struct CargoTable {
    entries: Vec<CargoEntry>,
    by_name: HashMap<String, usize>,
}

impl CargoTable {
    /// Build a table, rejecting duplicate names and ids. `file` is only
    /// used for error messages.
    pub fn from_data(cargos: Vec<CargoData>, file: &Path) -> Result<Self, DataLoadError> {
        let mut table = Self::default();
        for cargo in cargos {
            check_duplicate(&table.by_name, &cargo.name, file)?;
            if table.entries.iter().any(|e| e.id.0 == cargo.id) {
                return Err(DataLoadError::DuplicateId {
                    file: file.to_path_buf(),
                    id: cargo.id,
                });
            }
            table.by_name.insert(cargo.name.clone(), table.entries.len());
            table.entries.push(CargoEntry {
                name: cargo.name,
                id: CargoId(cargo.id),
                class: cargo.class.into(),
            });
        }
        Ok(table)
    }

    pub fn get(&self, name: &str) -> Option<&CargoEntry> {
        self.by_name.get(name).map(|&index| &self.entries[index])
    }

    pub fn by_id(&self, id: CargoId) -> Option<&CargoEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CargoEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything loaded from a data directory.
#[derive(Debug, Clone)]
pub struct DistributionData {
    pub settings: LinkGraphSettings,
    pub cargos: CargoTable,
}

impl DistributionData {
    /// Distribution type of a cargo; unknown cargos are distributed
    /// manually.
    pub fn distribution_type(&self, cargo: CargoId) -> DistributionType {
        self.cargos
            .by_id(cargo)
            .map_or(DistributionType::Manual, |entry| {
                self.settings.distribution_type(entry.class)
            })
    }
}

// ===========================================================================
// Loading
// ===========================================================================

/// Load and validate link graph settings.
pub fn load_settings(path: &Path) -> Result<LinkGraphSettings, DataLoadError> {
    let settings: LinkGraphSettings = deserialize_file(path)?;
    settings
        .validate()
        .map_err(|source| DataLoadError::InvalidSettings {
            file: path.to_path_buf(),
            source,
        })?;
    Ok(settings)
}

/// Load a cargo table. TOML has no top-level arrays, so there the list sits
/// under a `cargos` key; RON and JSON files hold the list directly.
pub fn load_cargo_table(path: &Path) -> Result<CargoTable, DataLoadError> {
    let cargos: Vec<CargoData> = match detect_format(path)? {
        Format::Toml => deserialize_file::<TomlCargos>(path)?.cargos,
        Format::Ron | Format::Json => deserialize_file(path)?,
    };
    CargoTable::from_data(cargos, path)
}

/// Load a data directory: `cargos.{ron,toml,json}` is required,
/// `linkgraph.{ron,toml,json}` is optional and defaults apply without it.
pub fn load_distribution_data(dir: &Path) -> Result<DistributionData, DataLoadError> {
    let settings = match find_data_file(dir, SETTINGS_FILE)? {
        Some(path) => load_settings(&path)?,
        None => {
            debug!(dir = %dir.display(), "no link graph settings file, using defaults");
            LinkGraphSettings::default()
        }
    };
    let cargos = load_cargo_table(&require_data_file(dir, CARGOS_FILE)?)?;
    debug!(
        dir = %dir.display(),
        cargos = cargos.len(),
        threaded = settings.threaded,
        "loaded distribution data"
    );
    Ok(DistributionData { settings, cargos })
}

// ===========================================================================
// Tests
// ===========================================================================
