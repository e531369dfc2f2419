//! Configuration schema and loader (ambient stack, not part of spec.md's
//! core — carried regardless per SPEC_FULL.md §1).

pub mod loader;
pub mod schema;

pub use loader::{get_config_path, load_config};
pub use schema::{BranchConfig, Config, HttpConfig, TransportKind};
