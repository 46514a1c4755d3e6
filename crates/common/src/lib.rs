//! Common types shared by the fitness chat relay crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::{REDACTED, Secret};
