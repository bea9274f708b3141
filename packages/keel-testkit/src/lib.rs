//! In-memory fixtures for the service, API, and worker test suites. `MemoryStore`
//! mirrors the relational link semantics of the Postgres store closely enough that
//! expansion and refresh logic can be exercised without a database.

mod store;

pub use store::{
	Document, Equipment, Fault, FleetIds, MemoryStore, Part, WorkOrder, seed_fleet, ts,
};
