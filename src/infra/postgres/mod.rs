//! PostgreSQL implementations for production seal storage
//!
//! Provides the seal repository and the shipment directory used by the
//! production seal service.

mod seal_store;
mod shipments;

pub use seal_store::*;
pub use shipments::*;
