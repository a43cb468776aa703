//! Shared utility functions

pub mod json;
