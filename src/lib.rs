//! Flakepin - nixpkgs package pinning
//!
//! Resolves a package name and version to the nixpkgs attribute path and
//! commit that provide it, consulting the hub API first and the channel
//! search backend second, with in-process and durable caching in front.

pub mod attrs;
pub mod cache;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod resolver;
pub mod sources;
pub mod ui;

pub use error::{ErrorKind, FlakepinError, FlakepinResult};
pub use model::{ResolutionResult, ResolutionSource, ResolveRequest};
pub use resolver::Resolver;
