//! Study Creator Common Library
//!
//! Shared types, utilities, and error handling for the Study Creator services.
//!
//! # Overview
//!
//! - **Error Handling**: Common error type and result alias
//! - **Fingerprints**: Order-independent identity for a set of input file versions
//! - **Logging**: Centralized `tracing` subscriber setup
//!
//! # Example
//!
//! ```
//! use creator_common::fingerprint::InputFingerprint;
//!
//! let a = InputFingerprint::from_versions(["FV_2", "FV_1"]);
//! let b = InputFingerprint::from_versions(["FV_1", "FV_2"]);
//! assert_eq!(a, b);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod fingerprint;
pub mod logging;

// Re-export commonly used types
pub use error::{CreatorError, Result};
pub use fingerprint::InputFingerprint;
