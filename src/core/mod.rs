//! Core constants, error taxonomy and socket boundary types.
//!
//! This module has no runtime dependencies and is always compiled. The
//! transport, retry and client layers all build on the types defined here.

mod constants;
mod error;
mod traits;

pub use constants::*;
pub use error::*;
pub use traits::*;
