use crate::relations::{RelationGroup, RelationItem, sort_fk_only};

pub fn cosine(a: &[f32], b: &[f32]) -> Option<f32> {
	if a.is_empty() || a.len() != b.len() {
		return None;
	}

	let mut dot = 0.;
	let mut norm_a = 0.;
	let mut norm_b = 0.;

	for (x, y) in a.iter().zip(b) {
		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a == 0. || norm_b == 0. {
		return None;
	}

	Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Blended ordering over a copy of the FK-ranked items. Items without an embedding
/// (or without a focus vector) keep their bare FK weight, so a missing vector can
/// never demote a record below where FK ordering put it within its tier. The blend
/// term is clamped to non-negative for the same reason: cosine runs down to -1, and
/// an unclamped penalty of `alpha * 100` would undercut the validated tier gaps.
pub fn blended_ranking(
	items: &[RelationItem],
	focus_embedding: Option<&[f32]>,
	alpha: f32,
) -> Vec<RelationItem> {
	let mut blended: Vec<RelationItem> = items.to_vec();

	for item in &mut blended {
		item.cosine = match (focus_embedding, item.embedding.as_deref()) {
			(Some(focus), Some(vector)) => cosine(focus, vector),
			_ => None,
		};
		item.final_score = match item.cosine {
			Some(cos) => item.fk_weight + alpha * 100. * cos.max(0.),
			None => item.fk_weight,
		};
	}

	blended.sort_by(|a, b| {
		b.final_score
			.partial_cmp(&a.final_score)
			.unwrap_or(std::cmp::Ordering::Equal)
			.then_with(|| b.updated_at.cmp(&a.updated_at))
			.then_with(|| a.id.cmp(&b.id))
	});

	blended
}

#[derive(Clone, Debug, Default)]
pub struct ShadowStats {
	pub compared: usize,
	pub moved: usize,
	pub mean_delta: f32,
	pub median_delta: f32,
	pub stdev_delta: f32,
	pub max_delta: usize,
	/// Items that carried both a focus vector and their own embedding.
	pub embedded: usize,
	pub mean_cosine: f32,
	pub median_cosine: f32,
	pub stdev_cosine: f32,
	/// How many of the FK top-N survive in the blended top-N.
	pub top_n_overlap: usize,
	pub top_n: usize,
}

fn mean(values: &[f32]) -> f32 {
	values.iter().sum::<f32>() / values.len() as f32
}

fn stdev(values: &[f32], mean: f32) -> f32 {
	(values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32).sqrt()
}

fn median(values: &[f32]) -> f32 {
	let mut sorted = values.to_vec();

	sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

	if sorted.len() % 2 == 1 {
		sorted[sorted.len() / 2]
	} else {
		(sorted[sorted.len() / 2 - 1] + sorted[sorted.len() / 2]) / 2.
	}
}

/// Per-item rank deltas between the FK ordering and the blended ordering of the
/// same item set, plus cosine aggregates over the items that had an embedding.
/// Aggregate numbers only; no labels or scores leave this function.
pub fn shadow_stats(
	fk_order: &[RelationItem],
	blended_order: &[RelationItem],
	top_n: usize,
) -> ShadowStats {
	let mut deltas: Vec<usize> = Vec::with_capacity(fk_order.len());

	for (fk_rank, item) in fk_order.iter().enumerate() {
		if let Some(blended_rank) = blended_order.iter().position(|other| other.id == item.id) {
			deltas.push(fk_rank.abs_diff(blended_rank));
		}
	}

	if deltas.is_empty() {
		return ShadowStats { top_n, ..Default::default() };
	}

	let compared = deltas.len();
	let moved = deltas.iter().filter(|d| **d > 0).count();
	let delta_values: Vec<f32> = deltas.iter().map(|d| *d as f32).collect();
	let mean_delta = mean(&delta_values);
	let cosines: Vec<f32> = blended_order.iter().filter_map(|item| item.cosine).collect();
	let (mean_cosine, median_cosine, stdev_cosine) = if cosines.is_empty() {
		(0., 0., 0.)
	} else {
		let m = mean(&cosines);

		(m, median(&cosines), stdev(&cosines, m))
	};
	let top_n = top_n.min(compared);
	let top_n_overlap = fk_order
		.iter()
		.take(top_n)
		.filter(|item| blended_order.iter().take(top_n).any(|other| other.id == item.id))
		.count();

	ShadowStats {
		compared,
		moved,
		mean_delta,
		median_delta: median(&delta_values),
		stdev_delta: stdev(&delta_values, mean_delta),
		max_delta: deltas.into_iter().max().unwrap_or_default(),
		embedded: cosines.len(),
		mean_cosine,
		median_cosine,
		stdev_cosine,
		top_n_overlap,
		top_n,
	}
}

/// Stable opaque id for shadow logs. Hash-derived so log lines can be correlated
/// per focus record without carrying the record id itself.
pub fn truncated_id(tenant_id: &str, raw: &str) -> String {
	let digest = blake3::hash(format!("{tenant_id}/{raw}").as_bytes());

	digest.to_hex()[..8].to_owned()
}

/// Re-ranks each group off the response path and logs aggregate deltas. The served
/// ordering is never touched here.
pub fn log_shadow(
	groups: &[RelationGroup],
	focus_embedding: Option<&[f32]>,
	shadow_id: &str,
	cfg: &keel_config::Ranking,
) {
	if !cfg.shadow_enabled {
		return;
	}

	// When the served ordering is FK-only, shadow the strongest alpha the tier
	// weights were validated against; otherwise shadow the live alpha.
	let alpha = if cfg.blend_alpha > 0. { cfg.blend_alpha } else { cfg.max_alpha };

	for group in groups {
		if group.items.is_empty() {
			continue;
		}

		let mut fk_order = group.items.clone();

		sort_fk_only(&mut fk_order);

		let blended = blended_ranking(&fk_order, focus_embedding, alpha);
		let stats = shadow_stats(&fk_order, &blended, cfg.shadow_top_n as usize);

		tracing::info!(
			shadow_id = %shadow_id,
			domain = ?group.domain,
			compared = stats.compared,
			moved = stats.moved,
			mean_delta = stats.mean_delta,
			median_delta = stats.median_delta,
			stdev_delta = stats.stdev_delta,
			max_delta = stats.max_delta,
			embedded = stats.embedded,
			mean_cosine = stats.mean_cosine,
			median_cosine = stats.median_cosine,
			stdev_cosine = stats.stdev_cosine,
			top_n_overlap = stats.top_n_overlap,
			top_n = stats.top_n,
			"Shadow re-ranking compared."
		);
	}
}
