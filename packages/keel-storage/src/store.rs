use std::future::Future;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{EmbeddingSource, FocusRef, LinkKind, RecordKind, RelatedRecord},
};

/// Read/write seam over the relational entity store. The request path only uses the
/// read half; the refresh worker uses the staleness and embedding-write half. Every
/// read is tenant-scoped at the query layer.
pub trait EntityStore: Send + Sync {
	/// Execute one declarative FK hop from the focus record. An unknown focus id or a
	/// hop with no matches returns an empty list.
	fn one_hop(
		&self,
		tenant_id: &str,
		focus: &FocusRef,
		link: LinkKind,
		limit: u32,
	) -> impl Future<Output = Result<Vec<RelatedRecord>>> + Send;

	/// Fresh embedding of the focus record, if the worker has written one.
	fn focus_embedding(
		&self,
		tenant_id: &str,
		focus: &FocusRef,
	) -> impl Future<Output = Result<Option<Vec<f32>>>> + Send;

	/// Records whose content changed after their embedding was last written, oldest
	/// first, excluding parked records whose content has not changed since parking.
	fn stale_embedding_sources(
		&self,
		limit: u32,
	) -> impl Future<Output = Result<Vec<EmbeddingSource>>> + Send;

	/// Persist a refreshed vector. One atomic write: vector, timestamp, and state
	/// move together, so re-processing an already-fresh record is a no-op.
	fn store_embedding(
		&self,
		kind: RecordKind,
		id: Uuid,
		tenant_id: &str,
		vector: &[f32],
		refreshed_at: OffsetDateTime,
	) -> impl Future<Output = Result<()>> + Send;

	/// Park a record after a permanent failure or exhausted retries. It re-enters
	/// staleness selection only when its content changes again.
	fn park_embedding(
		&self,
		kind: RecordKind,
		id: Uuid,
		tenant_id: &str,
		last_error: &str,
		parked_at: OffsetDateTime,
	) -> impl Future<Output = Result<()>> + Send;
}
