//! Domain models for the seal service
//!
//! Seal entity and lifecycle state machine, verification records and the
//! integrity score derived from them.

mod integrity;
mod seal;
mod types;
mod verification;

pub use integrity::*;
pub use seal::*;
pub use types::*;
pub use verification::*;
