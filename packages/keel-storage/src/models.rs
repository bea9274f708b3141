use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
	Equipment,
	WorkOrder,
	Fault,
	Part,
	Document,
}

impl RecordKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Equipment => "equipment",
			Self::WorkOrder => "work_order",
			Self::Fault => "fault",
			Self::Part => "part",
			Self::Document => "document",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"equipment" => Some(Self::Equipment),
			"work_order" => Some(Self::WorkOrder),
			"fault" => Some(Self::Fault),
			"part" => Some(Self::Part),
			"document" => Some(Self::Document),
			_ => None,
		}
	}
}

/// The record a relation expansion is anchored on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusRef {
	pub kind: RecordKind,
	pub id: Uuid,
}

/// One row returned by a one-hop foreign-key query. The embedding is whatever the
/// refresh worker last persisted; `None` is a normal state, never an error.
#[derive(Clone, Debug)]
pub struct RelatedRecord {
	pub id: Uuid,
	pub kind: RecordKind,
	pub label: String,
	pub updated_at: OffsetDateTime,
	pub embedding: Option<Vec<f32>>,
}

/// A record whose content changed after its embedding was last written, as selected
/// by the refresh worker.
#[derive(Clone, Debug)]
pub struct EmbeddingSource {
	pub kind: RecordKind,
	pub id: Uuid,
	pub tenant_id: String,
	pub title: String,
	pub body: String,
	pub updated_at: OffsetDateTime,
	pub embedded_at: Option<OffsetDateTime>,
}

/// The closed set of declarative one-hop foreign-key queries the expansion engine may
/// issue. Each variant is a single FK hop; there is no graph traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkKind {
	// Equipment focus.
	WorkOrdersForEquipment,
	WorkOrdersForParentSystem,
	FaultsForEquipment,
	FaultsForCategory,
	PartsForEquipment,
	PartsForCategory,
	DocumentsForEquipment,
	DocumentsForCategory,
	// Work-order focus.
	WorkOrdersForSameEquipment,
	FaultsForWorkOrder,
	PartsForWorkOrder,
	DocumentsForWorkOrder,
}

impl LinkKind {
	/// Record kind the hop lands on.
	pub fn target_kind(&self) -> RecordKind {
		match self {
			Self::WorkOrdersForEquipment
			| Self::WorkOrdersForParentSystem
			| Self::WorkOrdersForSameEquipment => RecordKind::WorkOrder,
			Self::FaultsForEquipment | Self::FaultsForCategory | Self::FaultsForWorkOrder =>
				RecordKind::Fault,
			Self::PartsForEquipment | Self::PartsForCategory | Self::PartsForWorkOrder =>
				RecordKind::Part,
			Self::DocumentsForEquipment
			| Self::DocumentsForCategory
			| Self::DocumentsForWorkOrder => RecordKind::Document,
		}
	}

	/// Focus kind the hop starts from.
	pub fn focus_kind(&self) -> RecordKind {
		match self {
			Self::WorkOrdersForEquipment
			| Self::WorkOrdersForParentSystem
			| Self::FaultsForEquipment
			| Self::FaultsForCategory
			| Self::PartsForEquipment
			| Self::PartsForCategory
			| Self::DocumentsForEquipment
			| Self::DocumentsForCategory => RecordKind::Equipment,
			Self::WorkOrdersForSameEquipment
			| Self::FaultsForWorkOrder
			| Self::PartsForWorkOrder
			| Self::DocumentsForWorkOrder => RecordKind::WorkOrder,
		}
	}
}
