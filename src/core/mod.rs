//! Layered configuration resolution.

mod builder;
mod live;
mod loader;
mod resolver;
mod settings;
mod watch;

#[cfg(feature = "validation")]
mod validation;

pub use builder::ConfigResolverBuilder;
pub use live::LiveSettings;
pub use loader::ConfigLoader;
pub use resolver::ConfigResolver;
pub use settings::ResolvedSettings;
pub use watch::WatchHandle;

#[cfg(feature = "validation")]
pub use validation::Validate;
