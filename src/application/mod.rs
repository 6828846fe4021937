// Application layer - use cases and orchestration.
// Clients (the CLI, export) talk to TripService; it validates input at the
// boundary and hands consistent snapshots to the domain engine.

pub mod error;
pub mod service;

pub use error::*;
pub use service::*;
