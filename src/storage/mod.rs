//! Durable state: datasets and the change registry.
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── config.toml
//! ├── datasets/
//! │   └── acme/
//! │       ├── acme.json          # consolidated dataset
//! │       └── acme.json.backup   # previous version
//! └── registry/
//!     ├── latest-urls.json
//!     └── latest-hashes.json
//! ```
//!
//! Everything is written through [`DurableStore`].

pub mod dataset;
pub mod durable;
pub mod registry;

pub use dataset::DatasetStore;
pub use durable::DurableStore;
pub use registry::{
    ChangeRegistry, HASHES_FILE, RegistryDelta, RegistryEntry, RegistrySnapshot, RegistryWriter,
    URLS_FILE,
};
