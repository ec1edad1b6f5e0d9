//! Core types shared across the Updraft codebase
//!
//! This module is the foundation of Updraft's type system. It currently holds
//! the error types that every other module builds on.
//!
//! # Error Management
//!
//! Updraft uses a two-layer error system designed for both developer ergonomics
//! and operator experience:
//! - **Strongly-typed errors** ([`UpdraftError`]) for precise error handling in code
//! - **User-friendly contexts** ([`ErrorContext`]) with actionable suggestions for CLI users
//! - **Automatic conversion** from common library errors (io, toml, semver, zip, reqwest)
//! - **Contextual suggestions** tailored to specific failure modes of an update run
//!
//! Typed variants matter here because the orchestrator reacts differently per
//! class: transport and integrity failures abort before anything is touched,
//! backup and stop failures are tolerated unless policy says otherwise, apply
//! failures trigger rollback, and rollback failures demand manual intervention.
//!
//! # Examples
//!
//! ```rust
//! use updraft_agent::core::{UpdraftError, user_friendly_error};
//!
//! fn check_version(raw: &str) -> Result<semver::Version, UpdraftError> {
//!     semver::Version::parse(raw).map_err(|_| UpdraftError::InvalidVersion {
//!         version: raw.to_string(),
//!     })
//! }
//!
//! match check_version("not-a-version") {
//!     Ok(v) => println!("updating to {v}"),
//!     Err(e) => user_friendly_error(anyhow::Error::from(e)).display(),
//! }
//! ```

pub mod error;

pub use error::{ErrorContext, UpdraftError, user_friendly_error};
