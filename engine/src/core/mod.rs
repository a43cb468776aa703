//! Core engine infrastructure

pub mod config;
pub mod constants;

pub use config::EngineConfig;
