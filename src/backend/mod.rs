//! Backend abstraction layer
//!
//! Provides the GL-shaped device trait and its two implementations: the
//! `glow` backend for real contexts and a headless recorder for tests.

pub mod headless;
pub mod traits;
pub mod types;

#[cfg(feature = "gl-backend")]
pub mod gl_backend;

pub use headless::{Command, HeadlessBackend};
pub use traits::*;
pub use types::*;

#[cfg(feature = "gl-backend")]
pub use gl_backend::GlBackend;
