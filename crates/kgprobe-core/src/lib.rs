//! kgprobe core — shared error type and configuration.

pub mod config;
pub mod error;

pub use config::{DataPaths, LlmSettings, ProbeConfig};
pub use error::{Error, Result};
