use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use keel_storage::{EntityStore, FocusRef, LinkKind, RecordKind};

use crate::{Error, Result};

/// Fixed domain priority order of the relation response. Every domain appears in
/// every response, empty or not.
pub const DOMAIN_ORDER: &[Domain] =
	&[Domain::WorkOrders, Domain::Faults, Domain::Parts, Domain::Documents];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
	WorkOrders,
	Faults,
	Parts,
	Documents,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationTier {
	/// Directly linked through a foreign key on the focus record.
	DirectLink,
	/// Linked through the focus record's parent (same system, same equipment).
	SameParent,
	/// Linked through a shared category.
	SameCategory,
}

impl RelationTier {
	pub fn weight(&self, tiers: &keel_config::TierWeights) -> f32 {
		match self {
			Self::DirectLink => tiers.direct_link,
			Self::SameParent => tiers.same_parent,
			Self::SameCategory => tiers.same_category,
		}
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct RelationItem {
	pub id: Uuid,
	pub kind: RecordKind,
	pub label: String,
	pub tier: RelationTier,
	pub fk_weight: f32,
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
	/// Raw vectors never leave the service layer.
	#[serde(skip)]
	pub embedding: Option<Vec<f32>>,
	#[serde(skip)]
	pub cosine: Option<f32>,
	pub final_score: f32,
}

#[derive(Clone, Debug, Serialize)]
pub struct RelationGroup {
	pub domain: Domain,
	pub items: Vec<RelationItem>,
}

/// The declarative expansion plan per focus kind: which FK hop feeds which domain at
/// which tier. Focus kinds outside the plan expand to all-empty groups.
fn link_plan(focus_kind: RecordKind) -> &'static [(Domain, LinkKind, RelationTier)] {
	match focus_kind {
		RecordKind::Equipment => &[
			(Domain::WorkOrders, LinkKind::WorkOrdersForEquipment, RelationTier::DirectLink),
			(Domain::WorkOrders, LinkKind::WorkOrdersForParentSystem, RelationTier::SameParent),
			(Domain::Faults, LinkKind::FaultsForEquipment, RelationTier::DirectLink),
			(Domain::Faults, LinkKind::FaultsForCategory, RelationTier::SameCategory),
			(Domain::Parts, LinkKind::PartsForEquipment, RelationTier::DirectLink),
			(Domain::Parts, LinkKind::PartsForCategory, RelationTier::SameCategory),
			(Domain::Documents, LinkKind::DocumentsForEquipment, RelationTier::DirectLink),
			(Domain::Documents, LinkKind::DocumentsForCategory, RelationTier::SameCategory),
		],
		RecordKind::WorkOrder => &[
			(Domain::WorkOrders, LinkKind::WorkOrdersForSameEquipment, RelationTier::SameParent),
			(Domain::Faults, LinkKind::FaultsForWorkOrder, RelationTier::DirectLink),
			(Domain::Parts, LinkKind::PartsForWorkOrder, RelationTier::DirectLink),
			(Domain::Documents, LinkKind::DocumentsForWorkOrder, RelationTier::DirectLink),
		],
		_ => &[],
	}
}

/// One-hop relation expansion. Read-only, tenant-scoped at the query layer, grouped
/// in fixed domain order. Within a group items are ordered by FK tier weight, then
/// recency, then id; no cosine term is computed here.
pub async fn expand<S>(
	store: &S,
	tenant_id: &str,
	focus: &FocusRef,
	cfg: &keel_config::Relations,
) -> Result<Vec<RelationGroup>>
where
	S: EntityStore,
{
	if tenant_id.trim().is_empty() {
		return Err(Error::MissingTenant);
	}

	let plan = link_plan(focus.kind);
	let mut groups = Vec::with_capacity(DOMAIN_ORDER.len());

	for domain in DOMAIN_ORDER {
		let mut items: Vec<RelationItem> = Vec::new();

		for (link, tier) in plan
			.iter()
			.filter(|(plan_domain, _, _)| plan_domain == domain)
			.map(|(_, link, tier)| (*link, *tier))
		{
			let records = store.one_hop(tenant_id, focus, link, cfg.group_limit).await?;

			for record in records {
				let fk_weight = tier.weight(&cfg.tier_weights);

				match items.iter_mut().find(|item| item.id == record.id) {
					// Reached through two hops: the stronger tier wins.
					Some(existing) =>
						if fk_weight > existing.fk_weight {
							existing.tier = tier;
							existing.fk_weight = fk_weight;
							existing.final_score = fk_weight;
						},
					None => items.push(RelationItem {
						id: record.id,
						kind: record.kind,
						label: record.label,
						tier,
						fk_weight,
						updated_at: record.updated_at,
						embedding: record.embedding,
						cosine: None,
						final_score: fk_weight,
					}),
				}
			}
		}

		sort_fk_only(&mut items);
		items.truncate(cfg.group_limit as usize);

		groups.push(RelationGroup { domain: *domain, items });
	}

	Ok(groups)
}

/// FK-only ordering: tier weight desc, recency desc, id asc as a stable tie break.
pub fn sort_fk_only(items: &mut [RelationItem]) {
	items.sort_by(|a, b| {
		b.fk_weight
			.partial_cmp(&a.fk_weight)
			.unwrap_or(std::cmp::Ordering::Equal)
			.then_with(|| b.updated_at.cmp(&a.updated_at))
			.then_with(|| a.id.cmp(&b.id))
	});
}
