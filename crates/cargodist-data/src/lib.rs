//! Data-driven configuration for cargodist.
//!
//! Loads [`LinkGraphSettings`](cargodist_core::settings::LinkGraphSettings)
//! and a cargo table from RON, TOML or JSON files.

pub mod loader;
pub mod schema;

pub use loader::{CargoEntry, CargoTable, DataLoadError, DistributionData, load_distribution_data};
