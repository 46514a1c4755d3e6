//! Round-robin API key pool
//!
//! Holds the upstream credentials in configuration order and hands them out
//! one at a time, wrapping around at the end. The pool is built once at
//! startup and never changes shape afterwards; the only mutable state is the
//! rotation cursor, which is advanced atomically so concurrent requests each
//! get their own turn.

pub mod error;
pub mod pool;

pub use error::{Error, Result};
pub use pool::{Credential, KeyPool};
