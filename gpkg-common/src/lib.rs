// gpkg-common/src/lib.rs
pub mod component;
pub mod config;
pub mod error;
pub mod host;
pub mod instance;
pub mod options;

// Re-export key types
pub use component::{ComponentDescriptor, ComponentRegistry};
pub use config::Config;
pub use error::{GpkgError, Result};
pub use host::{Fleet, HostSelector, HostTarget};
pub use instance::{Instance, InstanceControl};
pub use options::Options;
