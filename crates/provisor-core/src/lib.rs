//! # provisor-core
//!
//! Core types shared by the POSIX account provisioning crates.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy for directory provisioning operations
//! - [`config`] - Site account policy (identifier range, account defaults)
//! - [`credentials`] - Bind credentials for the directory session

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod credentials;
pub mod error;

// Re-export commonly used types
pub use config::{AccountPolicy, SHADOW_NEVER};
pub use credentials::BindCredentials;
pub use error::{Error, Result};
