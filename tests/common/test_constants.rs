//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// Server type requested when no override is provided.
pub const DEFAULT_SERVER_TYPE: &str = "cx11";

/// Image requested when no override is provided.
#[allow(dead_code, reason = "not every test crate inspects the image")]
pub const DEFAULT_IMAGE: &str = "ubuntu-20.04";

/// Location requested when no override is provided.
#[allow(dead_code, reason = "not every test crate inspects the location")]
pub const DEFAULT_LOCATION: &str = "nbg1";

/// Machine name used across integration tests.
#[allow(dead_code, reason = "not every test crate provisions a machine")]
pub const MACHINE_NAME: &str = "node-1";
