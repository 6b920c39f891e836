//! Layered component-descriptor lookup: in-memory LRU, filesystem cache,
//! delivery service, and OCI registry, composed into a single fallback chain.

pub mod composite;
pub mod delivery;
pub mod error;
pub mod filesystem;
pub mod layer;
pub mod mapping;
pub mod memory;
pub mod registry;

pub use composite::CompositeLookup;
pub use delivery::DeliveryServiceLayer;
pub use error::LookupError;
pub use filesystem::FilesystemLayer;
pub use layer::{ComponentDescriptorLayer, LookupOutcome, WriteBack};
pub use mapping::{RepositoryMappingConfig, RepositoryMappingEntry};
pub use memory::InMemoryLayer;
pub use registry::OciRegistryLayer;
