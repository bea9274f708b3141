use sqlx::{PgPool, postgres::PgPoolOptions};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result, schema,
	models::{EmbeddingSource, FocusRef, LinkKind, RecordKind, RelatedRecord},
	store::EntityStore,
};

pub struct Db {
	pub pool: PgPool,
}

impl Db {
	pub async fn connect(cfg: &keel_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool })
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		let sql = schema::render_schema();
		let lock_id: i64 = 6_113_305;
		// Advisory locks are held per connection. A single transaction scopes the lock
		// to one connection and releases it when the transaction ends.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)").bind(lock_id).execute(&mut *tx).await?;

		for statement in sql.split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}
}

#[derive(Debug, sqlx::FromRow)]
struct RelatedRow {
	id: Uuid,
	label: String,
	updated_at: OffsetDateTime,
	embedding: Option<Vec<f32>>,
}

#[derive(Debug, sqlx::FromRow)]
struct StaleRow {
	kind: String,
	id: Uuid,
	tenant_id: String,
	title: String,
	body: String,
	updated_at: OffsetDateTime,
	embedded_at: Option<OffsetDateTime>,
}

impl EntityStore for Db {
	async fn one_hop(
		&self,
		tenant_id: &str,
		focus: &FocusRef,
		link: LinkKind,
		limit: u32,
	) -> Result<Vec<RelatedRecord>> {
		let rows: Vec<RelatedRow> = sqlx::query_as(link_sql(link))
			.bind(tenant_id)
			.bind(focus.id)
			.bind(limit as i64)
			.fetch_all(&self.pool)
			.await?;

		Ok(rows
			.into_iter()
			.map(|row| RelatedRecord {
				id: row.id,
				kind: link.target_kind(),
				label: row.label,
				updated_at: row.updated_at,
				embedding: row.embedding,
			})
			.collect())
	}

	async fn focus_embedding(
		&self,
		tenant_id: &str,
		focus: &FocusRef,
	) -> Result<Option<Vec<f32>>> {
		let row: Option<(Option<Vec<f32>>,)> = sqlx::query_as(
			"\
SELECT vec
FROM record_embeddings
WHERE kind = $1 AND record_id = $2 AND tenant_id = $3 AND refresh_state = 'FRESH'",
		)
		.bind(focus.kind.as_str())
		.bind(focus.id)
		.bind(tenant_id)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row.and_then(|(vec,)| vec))
	}

	async fn stale_embedding_sources(&self, limit: u32) -> Result<Vec<EmbeddingSource>> {
		let rows: Vec<StaleRow> = sqlx::query_as(STALE_SOURCES_SQL)
			.bind(limit as i64)
			.fetch_all(&self.pool)
			.await?;
		let mut out = Vec::with_capacity(rows.len());

		for row in rows {
			let Some(kind) = RecordKind::parse(&row.kind) else {
				// Unreachable unless the union query drifts from the kind list.
				continue;
			};

			out.push(EmbeddingSource {
				kind,
				id: row.id,
				tenant_id: row.tenant_id,
				title: row.title,
				body: row.body,
				updated_at: row.updated_at,
				embedded_at: row.embedded_at,
			});
		}

		Ok(out)
	}

	async fn store_embedding(
		&self,
		kind: RecordKind,
		id: Uuid,
		tenant_id: &str,
		vector: &[f32],
		refreshed_at: OffsetDateTime,
	) -> Result<()> {
		sqlx::query(
			"\
INSERT INTO record_embeddings (kind, record_id, tenant_id, vec, refresh_state, last_error, embedded_at, parked_at)
VALUES ($1, $2, $3, $4, 'FRESH', NULL, $5, NULL)
ON CONFLICT (kind, record_id) DO UPDATE
SET
	tenant_id = EXCLUDED.tenant_id,
	vec = EXCLUDED.vec,
	refresh_state = 'FRESH',
	last_error = NULL,
	embedded_at = EXCLUDED.embedded_at,
	parked_at = NULL",
		)
		.bind(kind.as_str())
		.bind(id)
		.bind(tenant_id)
		.bind(vector.to_vec())
		.bind(refreshed_at)
		.execute(&self.pool)
		.await?;

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
		sqlx::query(
			"\
INSERT INTO record_embeddings (kind, record_id, tenant_id, vec, refresh_state, last_error, embedded_at, parked_at)
VALUES ($1, $2, $3, NULL, 'PARKED', $4, NULL, $5)
ON CONFLICT (kind, record_id) DO UPDATE
SET
	refresh_state = 'PARKED',
	last_error = EXCLUDED.last_error,
	parked_at = EXCLUDED.parked_at",
		)
		.bind(kind.as_str())
		.bind(id)
		.bind(tenant_id)
		.bind(last_error)
		.bind(parked_at)
		.execute(&self.pool)
		.await?;

		Ok(())
	}
}

/// One fixed SQL string per declared FK hop. Binds: $1 tenant, $2 focus id, $3 limit.
fn link_sql(link: LinkKind) -> &'static str {
	match link {
		LinkKind::WorkOrdersForEquipment =>
			"\
SELECT w.work_order_id AS id, w.title AS label, w.updated_at, re.vec AS embedding
FROM work_orders w
LEFT JOIN record_embeddings re
	ON re.kind = 'work_order' AND re.record_id = w.work_order_id AND re.refresh_state = 'FRESH'
WHERE w.tenant_id = $1 AND w.equipment_id = $2
ORDER BY w.updated_at DESC
LIMIT $3",
		LinkKind::WorkOrdersForParentSystem =>
			"\
SELECT w.work_order_id AS id, w.title AS label, w.updated_at, re.vec AS embedding
FROM equipment focus
JOIN equipment sibling
	ON sibling.tenant_id = focus.tenant_id
	AND sibling.parent_system_id = focus.parent_system_id
	AND sibling.equipment_id <> focus.equipment_id
JOIN work_orders w ON w.tenant_id = $1 AND w.equipment_id = sibling.equipment_id
LEFT JOIN record_embeddings re
	ON re.kind = 'work_order' AND re.record_id = w.work_order_id AND re.refresh_state = 'FRESH'
WHERE focus.tenant_id = $1 AND focus.equipment_id = $2 AND focus.parent_system_id IS NOT NULL
ORDER BY w.updated_at DESC
LIMIT $3",
		LinkKind::FaultsForEquipment =>
			"\
SELECT f.fault_id AS id, f.code AS label, f.updated_at, re.vec AS embedding
FROM faults f
LEFT JOIN record_embeddings re
	ON re.kind = 'fault' AND re.record_id = f.fault_id AND re.refresh_state = 'FRESH'
WHERE f.tenant_id = $1 AND f.equipment_id = $2
ORDER BY f.updated_at DESC
LIMIT $3",
		LinkKind::FaultsForCategory =>
			"\
SELECT f.fault_id AS id, f.code AS label, f.updated_at, re.vec AS embedding
FROM equipment focus
JOIN equipment sibling
	ON sibling.tenant_id = focus.tenant_id
	AND sibling.category = focus.category
	AND sibling.equipment_id <> focus.equipment_id
JOIN faults f ON f.tenant_id = $1 AND f.equipment_id = sibling.equipment_id
LEFT JOIN record_embeddings re
	ON re.kind = 'fault' AND re.record_id = f.fault_id AND re.refresh_state = 'FRESH'
WHERE focus.tenant_id = $1 AND focus.equipment_id = $2
ORDER BY f.updated_at DESC
LIMIT $3",
		LinkKind::PartsForEquipment =>
			"\
SELECT p.part_id AS id, p.name AS label, p.updated_at, re.vec AS embedding
FROM parts p
LEFT JOIN record_embeddings re
	ON re.kind = 'part' AND re.record_id = p.part_id AND re.refresh_state = 'FRESH'
WHERE p.tenant_id = $1 AND p.equipment_id = $2
ORDER BY p.updated_at DESC
LIMIT $3",
		LinkKind::PartsForCategory =>
			"\
SELECT p.part_id AS id, p.name AS label, p.updated_at, re.vec AS embedding
FROM equipment focus
JOIN equipment sibling
	ON sibling.tenant_id = focus.tenant_id
	AND sibling.category = focus.category
	AND sibling.equipment_id <> focus.equipment_id
JOIN parts p ON p.tenant_id = $1 AND p.equipment_id = sibling.equipment_id
LEFT JOIN record_embeddings re
	ON re.kind = 'part' AND re.record_id = p.part_id AND re.refresh_state = 'FRESH'
WHERE focus.tenant_id = $1 AND focus.equipment_id = $2
ORDER BY p.updated_at DESC
LIMIT $3",
		LinkKind::DocumentsForEquipment =>
			"\
SELECT d.document_id AS id, d.title AS label, d.updated_at, re.vec AS embedding
FROM documents d
LEFT JOIN record_embeddings re
	ON re.kind = 'document' AND re.record_id = d.document_id AND re.refresh_state = 'FRESH'
WHERE d.tenant_id = $1 AND d.equipment_id = $2
ORDER BY d.updated_at DESC
LIMIT $3",
		LinkKind::DocumentsForCategory =>
			"\
SELECT d.document_id AS id, d.title AS label, d.updated_at, re.vec AS embedding
FROM equipment focus
JOIN equipment sibling
	ON sibling.tenant_id = focus.tenant_id
	AND sibling.category = focus.category
	AND sibling.equipment_id <> focus.equipment_id
JOIN documents d ON d.tenant_id = $1 AND d.equipment_id = sibling.equipment_id
LEFT JOIN record_embeddings re
	ON re.kind = 'document' AND re.record_id = d.document_id AND re.refresh_state = 'FRESH'
WHERE focus.tenant_id = $1 AND focus.equipment_id = $2
ORDER BY d.updated_at DESC
LIMIT $3",
		LinkKind::WorkOrdersForSameEquipment =>
			"\
SELECT w.work_order_id AS id, w.title AS label, w.updated_at, re.vec AS embedding
FROM work_orders focus
JOIN work_orders w
	ON w.tenant_id = $1
	AND w.equipment_id = focus.equipment_id
	AND w.work_order_id <> focus.work_order_id
LEFT JOIN record_embeddings re
	ON re.kind = 'work_order' AND re.record_id = w.work_order_id AND re.refresh_state = 'FRESH'
WHERE focus.tenant_id = $1 AND focus.work_order_id = $2
ORDER BY w.updated_at DESC
LIMIT $3",
		LinkKind::FaultsForWorkOrder =>
			"\
SELECT f.fault_id AS id, f.code AS label, f.updated_at, re.vec AS embedding
FROM work_orders focus
JOIN faults f ON f.tenant_id = $1 AND f.fault_id = focus.fault_id
LEFT JOIN record_embeddings re
	ON re.kind = 'fault' AND re.record_id = f.fault_id AND re.refresh_state = 'FRESH'
WHERE focus.tenant_id = $1 AND focus.work_order_id = $2
ORDER BY f.updated_at DESC
LIMIT $3",
		LinkKind::PartsForWorkOrder =>
			"\
SELECT p.part_id AS id, p.name AS label, p.updated_at, re.vec AS embedding
FROM work_order_parts wp
JOIN parts p ON p.tenant_id = $1 AND p.part_id = wp.part_id
LEFT JOIN record_embeddings re
	ON re.kind = 'part' AND re.record_id = p.part_id AND re.refresh_state = 'FRESH'
WHERE wp.work_order_id = $2
ORDER BY p.updated_at DESC
LIMIT $3",
		LinkKind::DocumentsForWorkOrder =>
			"\
SELECT d.document_id AS id, d.title AS label, d.updated_at, re.vec AS embedding
FROM documents d
LEFT JOIN record_embeddings re
	ON re.kind = 'document' AND re.record_id = d.document_id AND re.refresh_state = 'FRESH'
WHERE d.tenant_id = $1 AND d.work_order_id = $2
ORDER BY d.updated_at DESC
LIMIT $3",
	}
}

const STALE_SOURCES_SQL: &str = "\
SELECT * FROM (
	SELECT 'equipment' AS kind, e.equipment_id AS id, e.tenant_id, e.name AS title,
		e.notes AS body, e.updated_at, re.embedded_at
	FROM equipment e
	LEFT JOIN record_embeddings re ON re.kind = 'equipment' AND re.record_id = e.equipment_id
	WHERE (re.embedded_at IS NULL OR e.updated_at > re.embedded_at)
		AND (re.parked_at IS NULL OR e.updated_at > re.parked_at)
	UNION ALL
	SELECT 'work_order' AS kind, w.work_order_id AS id, w.tenant_id, w.title,
		w.description AS body, w.updated_at, re.embedded_at
	FROM work_orders w
	LEFT JOIN record_embeddings re ON re.kind = 'work_order' AND re.record_id = w.work_order_id
	WHERE (re.embedded_at IS NULL OR w.updated_at > re.embedded_at)
		AND (re.parked_at IS NULL OR w.updated_at > re.parked_at)
	UNION ALL
	SELECT 'fault' AS kind, f.fault_id AS id, f.tenant_id, f.code AS title,
		f.description AS body, f.updated_at, re.embedded_at
	FROM faults f
	LEFT JOIN record_embeddings re ON re.kind = 'fault' AND re.record_id = f.fault_id
	WHERE (re.embedded_at IS NULL OR f.updated_at > re.embedded_at)
		AND (re.parked_at IS NULL OR f.updated_at > re.parked_at)
	UNION ALL
	SELECT 'part' AS kind, p.part_id AS id, p.tenant_id, p.name AS title,
		p.category AS body, p.updated_at, re.embedded_at
	FROM parts p
	LEFT JOIN record_embeddings re ON re.kind = 'part' AND re.record_id = p.part_id
	WHERE (re.embedded_at IS NULL OR p.updated_at > re.embedded_at)
		AND (re.parked_at IS NULL OR p.updated_at > re.parked_at)
	UNION ALL
	SELECT 'document' AS kind, d.document_id AS id, d.tenant_id, d.title,
		d.body, d.updated_at, re.embedded_at
	FROM documents d
	LEFT JOIN record_embeddings re ON re.kind = 'document' AND re.record_id = d.document_id
	WHERE (re.embedded_at IS NULL OR d.updated_at > re.embedded_at)
		AND (re.parked_at IS NULL OR d.updated_at > re.parked_at)
) stale
ORDER BY stale.updated_at ASC
LIMIT $1";
