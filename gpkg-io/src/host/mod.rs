// gpkg-io/src/host/mod.rs
pub mod local;
pub mod ssh;

pub use local::LocalHost;
pub use ssh::SshHost;
