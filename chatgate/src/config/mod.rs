// Copyright 2026 The Chatgate Project
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator
//
// Loads chatgate.yaml, validates structure, resolves variable interpolation,
// applies defaults, and computes a deterministic contract hash.

mod error;
mod interpolation;
mod loader;
mod raw;
mod source;
mod types;

pub use error::ConfigError;
pub use interpolation::resolve_variables;
pub use loader::{compute_hash, load_config};
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::*;
