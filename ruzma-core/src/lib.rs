//! # Ruzma Core
//!
//! Shared components for the Ruzma workspace:
//!
//! - [`error`]: the [`RuzmaError`] type and [`Result`] alias used by every
//!   fallible operation in the workspace
//! - [`crc`]: the compile-time CRC-32 table consumed by the match finder's
//!   hash functions
//!
//! The codec itself lives in the `ruzma-lzma` crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod crc;
pub mod error;

pub use error::{Result, RuzmaError};
