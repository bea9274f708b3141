use std::{
	collections::HashMap,
	sync::Mutex,
};

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use keel_storage::{
	EmbeddingSource, EntityStore, FocusRef, LinkKind, RecordKind, RelatedRecord, Result,
};

/// Fixture timestamp helper: a fixed epoch plus an offset in seconds, so ordering
/// assertions stay readable.
pub fn ts(offset_secs: i64) -> OffsetDateTime {
	OffsetDateTime::from_unix_timestamp(1_760_000_000)
		.unwrap_or(OffsetDateTime::UNIX_EPOCH)
		+ Duration::seconds(offset_secs)
}

#[derive(Clone, Debug)]
pub struct Equipment {
	pub id: Uuid,
	pub tenant_id: String,
	pub name: String,
	pub category: String,
	pub parent_system_id: Option<Uuid>,
	pub notes: String,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct WorkOrder {
	pub id: Uuid,
	pub tenant_id: String,
	pub equipment_id: Uuid,
	pub fault_id: Option<Uuid>,
	pub title: String,
	pub description: String,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct Fault {
	pub id: Uuid,
	pub tenant_id: String,
	pub equipment_id: Uuid,
	pub code: String,
	pub description: String,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct Part {
	pub id: Uuid,
	pub tenant_id: String,
	pub equipment_id: Uuid,
	pub name: String,
	pub category: String,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct Document {
	pub id: Uuid,
	pub tenant_id: String,
	pub equipment_id: Option<Uuid>,
	pub work_order_id: Option<Uuid>,
	pub category: String,
	pub title: String,
	pub body: String,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
struct EmbeddingRow {
	tenant_id: String,
	vec: Option<Vec<f32>>,
	fresh: bool,
	last_error: Option<String>,
	embedded_at: Option<OffsetDateTime>,
	parked_at: Option<OffsetDateTime>,
}

#[derive(Default)]
struct Inner {
	equipment: Vec<Equipment>,
	work_orders: Vec<WorkOrder>,
	faults: Vec<Fault>,
	parts: Vec<Part>,
	work_order_parts: Vec<(Uuid, Uuid)>,
	documents: Vec<Document>,
	embeddings: HashMap<(RecordKind, Uuid), EmbeddingRow>,
}

/// In-memory `EntityStore`. Link semantics mirror the Postgres queries: tenant
/// scoping on every hop, recency ordering, fresh embeddings attached when present.
#[derive(Default)]
pub struct MemoryStore {
	inner: Mutex<Inner>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert_equipment(&self, record: Equipment) {
		self.lock().equipment.push(record);
	}

	pub fn insert_work_order(&self, record: WorkOrder) {
		self.lock().work_orders.push(record);
	}

	pub fn insert_fault(&self, record: Fault) {
		self.lock().faults.push(record);
	}

	pub fn insert_part(&self, record: Part) {
		self.lock().parts.push(record);
	}

	pub fn link_work_order_part(&self, work_order_id: Uuid, part_id: Uuid) {
		self.lock().work_order_parts.push((work_order_id, part_id));
	}

	pub fn insert_document(&self, record: Document) {
		self.lock().documents.push(record);
	}

	pub fn set_fresh_embedding(
		&self,
		kind: RecordKind,
		id: Uuid,
		tenant_id: &str,
		vec: Vec<f32>,
		embedded_at: OffsetDateTime,
	) {
		self.lock().embeddings.insert((kind, id), EmbeddingRow {
			tenant_id: tenant_id.to_string(),
			vec: Some(vec),
			fresh: true,
			last_error: None,
			embedded_at: Some(embedded_at),
			parked_at: None,
		});
	}

	pub fn embedding_vector(&self, kind: RecordKind, id: Uuid) -> Option<Vec<f32>> {
		self.lock().embeddings.get(&(kind, id)).and_then(|row| row.vec.clone())
	}

	pub fn is_parked(&self, kind: RecordKind, id: Uuid) -> bool {
		self.lock().embeddings.get(&(kind, id)).is_some_and(|row| !row.fresh)
	}

	pub fn parked_error(&self, kind: RecordKind, id: Uuid) -> Option<String> {
		self.lock().embeddings.get(&(kind, id)).and_then(|row| row.last_error.clone())
	}

	pub fn fresh_count(&self) -> usize {
		self.lock().embeddings.values().filter(|row| row.fresh).count()
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
		self.inner.lock().unwrap_or_else(|err| err.into_inner())
	}
}

fn take_recent(mut records: Vec<RelatedRecord>, limit: u32) -> Vec<RelatedRecord> {
	records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
	records.truncate(limit as usize);

	records
}

impl Inner {
	fn fresh_vec(&self, kind: RecordKind, id: Uuid) -> Option<Vec<f32>> {
		self.embeddings
			.get(&(kind, id))
			.filter(|row| row.fresh)
			.and_then(|row| row.vec.clone())
	}

	fn related(&self, kind: RecordKind, id: Uuid, label: &str, updated_at: OffsetDateTime) -> RelatedRecord {
		RelatedRecord {
			id,
			kind,
			label: label.to_string(),
			updated_at,
			embedding: self.fresh_vec(kind, id),
		}
	}

	fn sibling_equipment<'a>(
		&'a self,
		tenant_id: &str,
		focus_id: Uuid,
		same: impl Fn(&Equipment, &Equipment) -> bool + 'a,
	) -> Vec<Uuid> {
		let Some(focus) =
			self.equipment.iter().find(|e| e.tenant_id == tenant_id && e.id == focus_id)
		else {
			return Vec::new();
		};

		self.equipment
			.iter()
			.filter(|e| e.tenant_id == tenant_id && e.id != focus.id && same(focus, e))
			.map(|e| e.id)
			.collect()
	}
}

impl EntityStore for MemoryStore {
	async fn one_hop(
		&self,
		tenant_id: &str,
		focus: &FocusRef,
		link: LinkKind,
		limit: u32,
	) -> Result<Vec<RelatedRecord>> {
		let inner = self.lock();
		let records = match link {
			LinkKind::WorkOrdersForEquipment => inner
				.work_orders
				.iter()
				.filter(|w| w.tenant_id == tenant_id && w.equipment_id == focus.id)
				.map(|w| inner.related(RecordKind::WorkOrder, w.id, &w.title, w.updated_at))
				.collect(),
			LinkKind::WorkOrdersForParentSystem => {
				let siblings = inner.sibling_equipment(tenant_id, focus.id, |focus, other| {
					focus.parent_system_id.is_some()
						&& focus.parent_system_id == other.parent_system_id
				});

				inner
					.work_orders
					.iter()
					.filter(|w| w.tenant_id == tenant_id && siblings.contains(&w.equipment_id))
					.map(|w| inner.related(RecordKind::WorkOrder, w.id, &w.title, w.updated_at))
					.collect()
			},
			LinkKind::FaultsForEquipment => inner
				.faults
				.iter()
				.filter(|f| f.tenant_id == tenant_id && f.equipment_id == focus.id)
				.map(|f| inner.related(RecordKind::Fault, f.id, &f.code, f.updated_at))
				.collect(),
			LinkKind::FaultsForCategory => {
				let siblings = inner
					.sibling_equipment(tenant_id, focus.id, |focus, other| {
						focus.category == other.category
					});

				inner
					.faults
					.iter()
					.filter(|f| f.tenant_id == tenant_id && siblings.contains(&f.equipment_id))
					.map(|f| inner.related(RecordKind::Fault, f.id, &f.code, f.updated_at))
					.collect()
			},
			LinkKind::PartsForEquipment => inner
				.parts
				.iter()
				.filter(|p| p.tenant_id == tenant_id && p.equipment_id == focus.id)
				.map(|p| inner.related(RecordKind::Part, p.id, &p.name, p.updated_at))
				.collect(),
			LinkKind::PartsForCategory => {
				let siblings = inner
					.sibling_equipment(tenant_id, focus.id, |focus, other| {
						focus.category == other.category
					});

				inner
					.parts
					.iter()
					.filter(|p| p.tenant_id == tenant_id && siblings.contains(&p.equipment_id))
					.map(|p| inner.related(RecordKind::Part, p.id, &p.name, p.updated_at))
					.collect()
			},
			LinkKind::DocumentsForEquipment => inner
				.documents
				.iter()
				.filter(|d| d.tenant_id == tenant_id && d.equipment_id == Some(focus.id))
				.map(|d| inner.related(RecordKind::Document, d.id, &d.title, d.updated_at))
				.collect(),
			LinkKind::DocumentsForCategory => {
				let siblings = inner
					.sibling_equipment(tenant_id, focus.id, |focus, other| {
						focus.category == other.category
					});

				inner
					.documents
					.iter()
					.filter(|d| {
						d.tenant_id == tenant_id
							&& d.equipment_id.is_some_and(|id| siblings.contains(&id))
					})
					.map(|d| inner.related(RecordKind::Document, d.id, &d.title, d.updated_at))
					.collect()
			},
			LinkKind::WorkOrdersForSameEquipment => {
				let equipment_id = inner
					.work_orders
					.iter()
					.find(|w| w.tenant_id == tenant_id && w.id == focus.id)
					.map(|w| w.equipment_id);

				inner
					.work_orders
					.iter()
					.filter(|w| {
						w.tenant_id == tenant_id
							&& Some(w.equipment_id) == equipment_id
							&& w.id != focus.id
					})
					.map(|w| inner.related(RecordKind::WorkOrder, w.id, &w.title, w.updated_at))
					.collect()
			},
			LinkKind::FaultsForWorkOrder => {
				let fault_id = inner
					.work_orders
					.iter()
					.find(|w| w.tenant_id == tenant_id && w.id == focus.id)
					.and_then(|w| w.fault_id);

				inner
					.faults
					.iter()
					.filter(|f| f.tenant_id == tenant_id && Some(f.id) == fault_id)
					.map(|f| inner.related(RecordKind::Fault, f.id, &f.code, f.updated_at))
					.collect()
			},
			LinkKind::PartsForWorkOrder => {
				let part_ids: Vec<Uuid> = inner
					.work_order_parts
					.iter()
					.filter(|(work_order_id, _)| *work_order_id == focus.id)
					.map(|(_, part_id)| *part_id)
					.collect();

				inner
					.parts
					.iter()
					.filter(|p| p.tenant_id == tenant_id && part_ids.contains(&p.id))
					.map(|p| inner.related(RecordKind::Part, p.id, &p.name, p.updated_at))
					.collect()
			},
			LinkKind::DocumentsForWorkOrder => inner
				.documents
				.iter()
				.filter(|d| d.tenant_id == tenant_id && d.work_order_id == Some(focus.id))
				.map(|d| inner.related(RecordKind::Document, d.id, &d.title, d.updated_at))
				.collect(),
		};

		Ok(take_recent(records, limit))
	}

	async fn focus_embedding(
		&self,
		tenant_id: &str,
		focus: &FocusRef,
	) -> Result<Option<Vec<f32>>> {
		let inner = self.lock();

		Ok(inner
			.embeddings
			.get(&(focus.kind, focus.id))
			.filter(|row| row.fresh && row.tenant_id == tenant_id)
			.and_then(|row| row.vec.clone()))
	}

	async fn stale_embedding_sources(&self, limit: u32) -> Result<Vec<EmbeddingSource>> {
		let inner = self.lock();
		let mut sources: Vec<EmbeddingSource> = Vec::new();
		let mut push = |kind: RecordKind,
		                id: Uuid,
		                tenant_id: &str,
		                title: &str,
		                body: &str,
		                updated_at: OffsetDateTime| {
			let row = inner.embeddings.get(&(kind, id));
			let stale = row.and_then(|r| r.embedded_at).is_none_or(|at| updated_at > at);
			let parked_blocks =
				row.and_then(|r| r.parked_at).is_some_and(|at| updated_at <= at);

			if stale && !parked_blocks {
				sources.push(EmbeddingSource {
					kind,
					id,
					tenant_id: tenant_id.to_string(),
					title: title.to_string(),
					body: body.to_string(),
					updated_at,
					embedded_at: row.and_then(|r| r.embedded_at),
				});
			}
		};

		for e in &inner.equipment {
			push(RecordKind::Equipment, e.id, &e.tenant_id, &e.name, &e.notes, e.updated_at);
		}
		for w in &inner.work_orders {
			push(RecordKind::WorkOrder, w.id, &w.tenant_id, &w.title, &w.description, w.updated_at);
		}
		for f in &inner.faults {
			push(RecordKind::Fault, f.id, &f.tenant_id, &f.code, &f.description, f.updated_at);
		}
		for p in &inner.parts {
			push(RecordKind::Part, p.id, &p.tenant_id, &p.name, &p.category, p.updated_at);
		}
		for d in &inner.documents {
			push(RecordKind::Document, d.id, &d.tenant_id, &d.title, &d.body, d.updated_at);
		}

		sources.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
		sources.truncate(limit as usize);

		Ok(sources)
	}

	async fn store_embedding(
		&self,
		kind: RecordKind,
		id: Uuid,
		tenant_id: &str,
		vector: &[f32],
		refreshed_at: OffsetDateTime,
	) -> Result<()> {
		self.lock().embeddings.insert((kind, id), EmbeddingRow {
			tenant_id: tenant_id.to_string(),
			vec: Some(vector.to_vec()),
			fresh: true,
			last_error: None,
			embedded_at: Some(refreshed_at),
			parked_at: None,
		});

		Ok(())
	}

	async fn park_embedding(
		&self,
		kind: RecordKind,
		id: Uuid,
		tenant_id: &str,
		last_error: &str,
		parked_at: OffsetDateTime,
	) -> Result<()> {
		let mut inner = self.lock();
		let row = inner.embeddings.entry((kind, id)).or_insert_with(|| EmbeddingRow {
			tenant_id: tenant_id.to_string(),
			vec: None,
			fresh: false,
			last_error: None,
			embedded_at: None,
			parked_at: None,
		});

		row.fresh = false;
		row.last_error = Some(last_error.to_string());
		row.parked_at = Some(parked_at);

		Ok(())
	}
}

/// Ids of the standard seeded fleet: two engines under one propulsion system, one
/// unrelated pump, plus work orders, faults, parts, and documents hanging off them.
pub struct FleetIds {
	pub tenant: String,
	pub other_tenant: String,
	pub main_engine_1: Uuid,
	pub main_engine_2: Uuid,
	pub ballast_pump: Uuid,
	pub wo_overhaul: Uuid,
	pub wo_inspection: Uuid,
	pub wo_sibling: Uuid,
	pub fault_e047: Uuid,
	pub fault_sibling: Uuid,
	pub part_fuel_filter: Uuid,
	pub doc_manual: Uuid,
}

/// Seed the standard fixture fleet into a store. Timestamps are spaced so recency
/// ordering within each hop is deterministic.
pub fn seed_fleet(store: &MemoryStore) -> FleetIds {
	let tenant = "tenant-a".to_string();
	let other_tenant = "tenant-b".to_string();
	let propulsion = Uuid::from_u128(0x10);
	let main_engine_1 = Uuid::from_u128(0x11);
	let main_engine_2 = Uuid::from_u128(0x12);
	let ballast_pump = Uuid::from_u128(0x13);
	let foreign_engine = Uuid::from_u128(0x14);
	let wo_overhaul = Uuid::from_u128(0x21);
	let wo_inspection = Uuid::from_u128(0x22);
	let wo_sibling = Uuid::from_u128(0x23);
	let wo_foreign = Uuid::from_u128(0x24);
	let fault_e047 = Uuid::from_u128(0x31);
	let fault_sibling = Uuid::from_u128(0x32);
	let part_fuel_filter = Uuid::from_u128(0x41);
	let part_sibling = Uuid::from_u128(0x42);
	let doc_manual = Uuid::from_u128(0x51);

	for (id, name, parent) in [
		(main_engine_1, "main engine 1", Some(propulsion)),
		(main_engine_2, "main engine 2", Some(propulsion)),
	] {
		store.insert_equipment(Equipment {
			id,
			tenant_id: tenant.clone(),
			name: name.to_string(),
			category: "propulsion".to_string(),
			parent_system_id: parent,
			notes: String::new(),
			updated_at: ts(10),
		});
	}

	store.insert_equipment(Equipment {
		id: ballast_pump,
		tenant_id: tenant.clone(),
		name: "ballast pump".to_string(),
		category: "pumps".to_string(),
		parent_system_id: None,
		notes: String::new(),
		updated_at: ts(11),
	});
	store.insert_equipment(Equipment {
		id: foreign_engine,
		tenant_id: other_tenant.clone(),
		name: "main engine 1".to_string(),
		category: "propulsion".to_string(),
		parent_system_id: None,
		notes: String::new(),
		updated_at: ts(12),
	});

	store.insert_fault(Fault {
		id: fault_e047,
		tenant_id: tenant.clone(),
		equipment_id: main_engine_1,
		code: "E047".to_string(),
		description: "high exhaust temperature".to_string(),
		updated_at: ts(30),
	});
	store.insert_fault(Fault {
		id: fault_sibling,
		tenant_id: tenant.clone(),
		equipment_id: main_engine_2,
		code: "E051".to_string(),
		description: "turbocharger surging".to_string(),
		updated_at: ts(31),
	});

	store.insert_work_order(WorkOrder {
		id: wo_overhaul,
		tenant_id: tenant.clone(),
		equipment_id: main_engine_1,
		fault_id: Some(fault_e047),
		title: "overhaul fuel pump".to_string(),
		description: "replace plunger and barrel".to_string(),
		updated_at: ts(40),
	});
	store.insert_work_order(WorkOrder {
		id: wo_inspection,
		tenant_id: tenant.clone(),
		equipment_id: main_engine_1,
		fault_id: None,
		title: "exhaust valve inspection".to_string(),
		description: String::new(),
		updated_at: ts(41),
	});
	store.insert_work_order(WorkOrder {
		id: wo_sibling,
		tenant_id: tenant.clone(),
		equipment_id: main_engine_2,
		fault_id: None,
		title: "liner calibration".to_string(),
		description: String::new(),
		updated_at: ts(42),
	});
	store.insert_work_order(WorkOrder {
		id: wo_foreign,
		tenant_id: other_tenant.clone(),
		equipment_id: foreign_engine,
		fault_id: None,
		title: "foreign overhaul".to_string(),
		description: String::new(),
		updated_at: ts(43),
	});

	store.insert_part(Part {
		id: part_fuel_filter,
		tenant_id: tenant.clone(),
		equipment_id: main_engine_1,
		name: "fuel filter".to_string(),
		category: "filters".to_string(),
		updated_at: ts(50),
	});
	store.insert_part(Part {
		id: part_sibling,
		tenant_id: tenant.clone(),
		equipment_id: main_engine_2,
		name: "injector nozzle".to_string(),
		category: "injection".to_string(),
		updated_at: ts(51),
	});
	store.link_work_order_part(wo_overhaul, part_fuel_filter);

	store.insert_document(Document {
		id: doc_manual,
		tenant_id: tenant.clone(),
		equipment_id: Some(main_engine_1),
		work_order_id: None,
		category: "manual".to_string(),
		title: "main engine service manual".to_string(),
		body: "service intervals and clearances".to_string(),
		updated_at: ts(60),
	});

	FleetIds {
		tenant,
		other_tenant,
		main_engine_1,
		main_engine_2,
		ballast_pump,
		wo_overhaul,
		wo_inspection,
		wo_sibling,
		fault_e047,
		fault_sibling,
		part_fuel_filter,
		doc_manual,
	}
}
