//! LaTeX template processing and validation engine.
//!
//! Loads résumé templates, validates them against the installed toolchain, merges
//! user content into them, and compiles preview images with bounded retry.

pub mod cache;
pub mod compile;
pub mod config;
pub mod engine;
pub mod errors;
pub mod templates;
pub mod toolchain;
pub mod validation;

pub use config::Config;
pub use engine::{Engine, PreviewArtifacts};
pub use errors::EngineError;
pub use templates::{Template, TemplateRegistry};
pub use validation::ValidationResult;
