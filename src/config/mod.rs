//! Process-wide configuration for the application engine.
//!
//! Provides `ApplicationConfig` and its type-safe builder, following the
//! typestate pattern: `state_dir` is the only field the builder requires
//! before `build()` becomes callable.

pub mod builder;
pub mod getters;
pub mod types;

pub use builder::{ApplicationConfigBuilder, Complete};
pub use types::{ApplicationConfig, BrowserBackend};
