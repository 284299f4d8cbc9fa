//! Serde data file structs for distribution configuration.
//!
//! The link graph settings themselves deserialize straight into
//! [`LinkGraphSettings`](cargodist_core::settings::LinkGraphSettings); this
//! module only holds the on-disk shape of the cargo table.

use cargodist_core::id::CargoClass;
use serde::Deserialize;

// ===========================================================================
// Cargos
// ===========================================================================

/// A cargo definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct CargoData {
    pub name: String,
    pub id: u8,
    #[serde(default)]
    pub class: CargoClassData,
}

/// The cargo class as written in data files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CargoClassData {
    Passengers,
    Mail,
    Armoured,
    #[default]
    Other,
}

impl From<CargoClassData> for CargoClass {
    fn from(class: CargoClassData) -> Self {
        match class {
            CargoClassData::Passengers => CargoClass::Passengers,
            CargoClassData::Mail => CargoClass::Mail,
            CargoClassData::Armoured => CargoClass::Armoured,
            CargoClassData::Other => CargoClass::Other,
        }
    }
}

/// TOML wrapper: a top-level `[[cargos]]` array.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlCargos {
    pub cargos: Vec<CargoData>,
}

// ===========================================================================
// Tests
// ===========================================================================
