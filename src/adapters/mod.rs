// Pricing gateway implementations
// Curve registry over RPC, plus an in-memory gateway for snapshots and tests

pub mod curve;
pub mod in_memory;

pub use curve::CurveGateway;
pub use in_memory::InMemoryGateway;
