//! Agent coordination conventions layered on a hosted file store: a JSON
//! memory blob per folder, a `[SHADOW]` staging subfolder and an append-only
//! reasoning ledger.

pub mod config;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod lookup;
pub mod memory;
pub mod mesh;
pub mod shadow;

pub use config::{MeshConfig, WellKnownNames};
pub use error::{ConfigError, MeshError, ProviderError};
pub use gateway::{Item, ItemKind, StorageGateway};
pub use mesh::Mesh;
