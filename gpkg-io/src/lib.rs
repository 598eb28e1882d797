// gpkg-io/src/lib.rs
//! Synchronous filesystem, process and host access for gpkg.

pub mod fleet;
pub mod fs;
pub mod host;
pub mod ownership;
pub mod process;

pub use fleet::load_fleet;
pub use host::{LocalHost, SshHost};
pub use process::{run_command, CommandOutput};
