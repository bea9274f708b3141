/// Schema bootstrap DDL. Statements are split on `;` and executed one at a time under
/// an advisory lock, so concurrent processes can call ensure_schema safely.
pub fn render_schema() -> String {
	r#"
CREATE TABLE IF NOT EXISTS equipment (
	equipment_id UUID PRIMARY KEY,
	tenant_id TEXT NOT NULL,
	name TEXT NOT NULL,
	category TEXT NOT NULL,
	parent_system_id UUID,
	notes TEXT NOT NULL DEFAULT '',
	updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_equipment_tenant ON equipment (tenant_id);
CREATE INDEX IF NOT EXISTS idx_equipment_parent ON equipment (tenant_id, parent_system_id);
CREATE INDEX IF NOT EXISTS idx_equipment_category ON equipment (tenant_id, category);

CREATE TABLE IF NOT EXISTS work_orders (
	work_order_id UUID PRIMARY KEY,
	tenant_id TEXT NOT NULL,
	equipment_id UUID NOT NULL REFERENCES equipment (equipment_id),
	fault_id UUID,
	title TEXT NOT NULL,
	description TEXT NOT NULL DEFAULT '',
	status TEXT NOT NULL,
	updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_work_orders_equipment ON work_orders (tenant_id, equipment_id);
CREATE INDEX IF NOT EXISTS idx_work_orders_fault ON work_orders (tenant_id, fault_id);

CREATE TABLE IF NOT EXISTS faults (
	fault_id UUID PRIMARY KEY,
	tenant_id TEXT NOT NULL,
	equipment_id UUID NOT NULL REFERENCES equipment (equipment_id),
	code TEXT NOT NULL,
	description TEXT NOT NULL DEFAULT '',
	updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_faults_equipment ON faults (tenant_id, equipment_id);

CREATE TABLE IF NOT EXISTS parts (
	part_id UUID PRIMARY KEY,
	tenant_id TEXT NOT NULL,
	equipment_id UUID NOT NULL REFERENCES equipment (equipment_id),
	name TEXT NOT NULL,
	category TEXT NOT NULL,
	updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_parts_equipment ON parts (tenant_id, equipment_id);

CREATE TABLE IF NOT EXISTS work_order_parts (
	work_order_id UUID NOT NULL REFERENCES work_orders (work_order_id),
	part_id UUID NOT NULL REFERENCES parts (part_id),
	PRIMARY KEY (work_order_id, part_id)
);

CREATE TABLE IF NOT EXISTS documents (
	document_id UUID PRIMARY KEY,
	tenant_id TEXT NOT NULL,
	equipment_id UUID,
	work_order_id UUID,
	category TEXT NOT NULL,
	title TEXT NOT NULL,
	body TEXT NOT NULL DEFAULT '',
	updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_equipment ON documents (tenant_id, equipment_id);
CREATE INDEX IF NOT EXISTS idx_documents_work_order ON documents (tenant_id, work_order_id);

CREATE TABLE IF NOT EXISTS record_embeddings (
	kind TEXT NOT NULL,
	record_id UUID NOT NULL,
	tenant_id TEXT NOT NULL,
	vec REAL[],
	refresh_state TEXT NOT NULL DEFAULT 'FRESH',
	last_error TEXT,
	embedded_at TIMESTAMPTZ,
	parked_at TIMESTAMPTZ,
	PRIMARY KEY (kind, record_id)
);
CREATE INDEX IF NOT EXISTS idx_record_embeddings_tenant ON record_embeddings (tenant_id)
"#
	.to_string()
}
