//! Configuration source implementations.

mod config_source;
mod env;
mod file;
mod memory;
mod remote;

pub use config_source::ConfigSource;
pub use env::EnvSource;
pub use file::FileSource;
pub use memory::MemorySource;
pub use remote::{ConsulKvSource, ConsulKvSourceBuilder};
