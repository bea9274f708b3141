//! Decision core of the record service: lane routing, capability surfacing, one-hop
//! relation expansion, and the off-path shadow re-ranking layer.

pub mod capability;
mod error;
pub mod relations;
pub mod route;
pub mod shadow;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};

use crate::capability::Role;

/// Caller identity as established by the edge. Every service entry point takes one;
/// tenant scoping is not optional.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthContext {
	pub user_id: String,
	pub tenant_id: String,
	pub role: Role,
}
