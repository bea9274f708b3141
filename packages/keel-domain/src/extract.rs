use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::vocabulary;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
	Equipment,
	FaultCode,
	Symptom,
	Measurement,
	Part,
	WorkOrder,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitySource {
	Pattern,
	Model,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
	pub entity_type: EntityType,
	/// Surface form as it appeared in the query.
	pub text: String,
	pub normalized: String,
	pub confidence: f32,
	pub source: EntitySource,
}

/// Entity as returned by the model-assisted extractor, before normalization.
#[derive(Clone, Debug, Deserialize)]
pub struct ModelEntity {
	pub entity_type: EntityType,
	pub text: String,
	pub confidence: f32,
}

/// A pattern hit with its byte span in the query, used by the classifier to measure
/// how much of the text is covered by recognized vocabulary.
#[derive(Clone, Debug)]
pub struct PatternMatch {
	pub start: usize,
	pub end: usize,
	pub entity: Entity,
}

const EQUIPMENT_CONFIDENCE: f32 = 0.95;
const ABBREVIATION_CONFIDENCE: f32 = 0.90;
const FAULT_CODE_CONFIDENCE: f32 = 0.90;
const MEASUREMENT_CONFIDENCE: f32 = 0.85;
const SYMPTOM_CONFIDENCE: f32 = 0.75;

/// Compiled recognition patterns. Built once at startup and shared by reference.
#[derive(Debug)]
pub struct Patterns {
	equipment: Regex,
	abbreviations: Regex,
	symptoms: Regex,
	fault_code: Regex,
	measurement: Regex,
}

impl Patterns {
	pub fn new() -> Self {
		Self {
			equipment: phrase_regex(vocabulary::EQUIPMENT),
			abbreviations: phrase_regex(
				&vocabulary::ABBREVIATIONS.iter().map(|(abbr, _)| *abbr).collect::<Vec<_>>(),
			),
			symptoms: phrase_regex(vocabulary::SYMPTOMS),
			// Fault-code shape, e.g. E047, AL-1203. Uppercase by convention.
			fault_code: Regex::new(r"\b([A-Z]{1,3}-?[0-9]{2,4})\b")
				.unwrap_or_else(|err| unreachable!("Static fault-code pattern is valid: {err}.")),
			measurement: RegexBuilder::new(
				r"\b([0-9]+(?:\.[0-9]+)?)\s*(l/min|hours|hrs|hr|°c|deg c|degc|celsius|bar|psi|rpm|kw|hz|mm|v|a|h)\b",
			)
			.case_insensitive(true)
			.build()
			.unwrap_or_else(|err| unreachable!("Static measurement pattern is valid: {err}.")),
		}
	}
}

impl Default for Patterns {
	fn default() -> Self {
		Self::new()
	}
}

/// One alternation over all phrases, longest first so `main engine 1` wins over
/// `main engine`.
fn phrase_regex(phrases: &[&str]) -> Regex {
	let mut sorted: Vec<&str> = phrases.to_vec();

	sorted.sort_by_key(|phrase| std::cmp::Reverse(phrase.len()));

	let alternation =
		sorted.iter().map(|phrase| regex::escape(phrase)).collect::<Vec<_>>().join("|");
	let source = format!(r"\b(?:{alternation})\b");

	RegexBuilder::new(&source)
		.case_insensitive(true)
		.build()
		.unwrap_or_else(|err| unreachable!("Static phrase alternation is valid: {err}."))
}

/// Pattern/gazetteer pass. Output is ordered by first appearance in the text; spans
/// never overlap, with equipment taking precedence over code shapes.
pub fn scan(text: &str, patterns: &Patterns) -> Vec<PatternMatch> {
	let mut matches: Vec<PatternMatch> = Vec::new();

	for found in patterns.equipment.find_iter(text) {
		push_unless_overlapping(&mut matches, PatternMatch {
			start: found.start(),
			end: found.end(),
			entity: Entity {
				entity_type: EntityType::Equipment,
				text: found.as_str().to_string(),
				normalized: found.as_str().to_lowercase(),
				confidence: EQUIPMENT_CONFIDENCE,
				source: EntitySource::Pattern,
			},
		});
	}

	for found in patterns.abbreviations.find_iter(text) {
		let Some(expanded) = vocabulary::expand_abbreviation(found.as_str()) else {
			continue;
		};

		push_unless_overlapping(&mut matches, PatternMatch {
			start: found.start(),
			end: found.end(),
			entity: Entity {
				entity_type: EntityType::Equipment,
				text: found.as_str().to_string(),
				normalized: expanded.to_string(),
				confidence: ABBREVIATION_CONFIDENCE,
				source: EntitySource::Pattern,
			},
		});
	}

	for found in patterns.fault_code.find_iter(text) {
		push_unless_overlapping(&mut matches, PatternMatch {
			start: found.start(),
			end: found.end(),
			entity: Entity {
				entity_type: EntityType::FaultCode,
				text: found.as_str().to_string(),
				normalized: found.as_str().replace('-', ""),
				confidence: FAULT_CODE_CONFIDENCE,
				source: EntitySource::Pattern,
			},
		});
	}

	for captures in patterns.measurement.captures_iter(text) {
		let Some(whole) = captures.get(0) else {
			continue;
		};
		let (Some(value), Some(unit)) = (captures.get(1), captures.get(2)) else {
			continue;
		};
		let Some(canonical) = vocabulary::canonical_unit(unit.as_str()) else {
			continue;
		};

		push_unless_overlapping(&mut matches, PatternMatch {
			start: whole.start(),
			end: whole.end(),
			entity: Entity {
				entity_type: EntityType::Measurement,
				text: whole.as_str().to_string(),
				normalized: format!("{} {canonical}", value.as_str()),
				confidence: MEASUREMENT_CONFIDENCE,
				source: EntitySource::Pattern,
			},
		});
	}

	for found in patterns.symptoms.find_iter(text) {
		push_unless_overlapping(&mut matches, PatternMatch {
			start: found.start(),
			end: found.end(),
			entity: Entity {
				entity_type: EntityType::Symptom,
				text: found.as_str().to_string(),
				normalized: found.as_str().to_lowercase(),
				confidence: SYMPTOM_CONFIDENCE,
				source: EntitySource::Pattern,
			},
		});
	}

	matches.sort_by_key(|found| (found.start, found.end));

	matches
}

/// Pass-1 extraction: pattern matches in first-appearance order.
pub fn extract_pattern(text: &str, patterns: &Patterns) -> Vec<Entity> {
	scan(text, patterns).into_iter().map(|found| found.entity).collect()
}

/// True when pass 1 gave nothing usable and the GPT lane should consult the model.
pub fn needs_model_pass(entities: &[Entity], low_confidence_threshold: f32) -> bool {
	entities.iter().all(|entity| entity.confidence < low_confidence_threshold)
}

pub fn normalize_model_value(entity_type: EntityType, text: &str) -> String {
	match entity_type {
		EntityType::Equipment =>
			vocabulary::expand_abbreviation(text).map(str::to_string).unwrap_or_else(|| {
				text.trim().to_lowercase()
			}),
		EntityType::FaultCode => text.trim().replace('-', "").to_uppercase(),
		_ => text.trim().to_lowercase(),
	}
}

/// Merge the pattern pass with model-assisted results. Dedup key is
/// `(entity_type, normalized)`; pattern-sourced entities win on conflict. Pattern
/// entities keep first-appearance order, model-only entities follow in model order.
pub fn merge_entities(pattern: Vec<Entity>, model: Vec<ModelEntity>) -> Vec<Entity> {
	let mut out = pattern;

	for found in model {
		let normalized = normalize_model_value(found.entity_type, &found.text);

		if normalized.is_empty() {
			continue;
		}
		if out.iter().any(|existing| {
			existing.entity_type == found.entity_type && existing.normalized == normalized
		}) {
			continue;
		}

		out.push(Entity {
			entity_type: found.entity_type,
			text: found.text,
			normalized,
			confidence: found.confidence.clamp(0.0, 1.0),
			source: EntitySource::Model,
		});
	}

	out
}

fn push_unless_overlapping(matches: &mut Vec<PatternMatch>, candidate: PatternMatch) {
	let overlaps = matches
		.iter()
		.any(|existing| candidate.start < existing.end && existing.start < candidate.end);

	if !overlaps {
		matches.push(candidate);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn patterns() -> Patterns {
		Patterns::new()
	}

	#[test]
	fn extracts_abbreviated_equipment_and_fault_code() {
		let entities = extract_pattern("ME1 fault E047", &patterns());

		assert_eq!(entities.len(), 2);
		assert_eq!(entities[0].entity_type, EntityType::Equipment);
		assert_eq!(entities[0].text, "ME1");
		assert_eq!(entities[0].normalized, "main engine 1");
		assert_eq!(entities[1].entity_type, EntityType::FaultCode);
		assert_eq!(entities[1].normalized, "E047");

		for entity in &entities {
			assert_eq!(entity.source, EntitySource::Pattern);
			assert!((0.7..=0.95).contains(&entity.confidence));
		}
	}

	#[test]
	fn longest_equipment_name_wins() {
		let entities = extract_pattern("main engine 1 overheating", &patterns());

		assert_eq!(entities[0].normalized, "main engine 1");
		assert_eq!(entities[1].entity_type, EntityType::Symptom);
		assert_eq!(entities[1].normalized, "overheating");
	}

	#[test]
	fn extracts_measurement_with_canonical_unit() {
		let entities = extract_pattern("fuel pump pressure dropped to 2.5 Bar", &patterns());
		let measurement = entities
			.iter()
			.find(|entity| entity.entity_type == EntityType::Measurement)
			.expect("Expected a measurement entity.");

		assert_eq!(measurement.normalized, "2.5 bar");
	}

	#[test]
	fn output_follows_first_appearance_order() {
		let entities = extract_pattern("vibration on turbocharger after 300 rpm", &patterns());
		let kinds: Vec<EntityType> =
			entities.iter().map(|entity| entity.entity_type).collect();

		assert_eq!(kinds, vec![
			EntityType::Symptom,
			EntityType::Equipment,
			EntityType::Measurement
		]);
	}

	#[test]
	fn merge_prefers_pattern_entities_on_conflict() {
		let pattern = extract_pattern("ME1 fault E047", &patterns());
		let merged = merge_entities(pattern, vec![
			ModelEntity {
				entity_type: EntityType::Equipment,
				text: "main engine 1".to_string(),
				confidence: 0.6,
			},
			ModelEntity {
				entity_type: EntityType::Part,
				text: "Fuel Injector Nozzle".to_string(),
				confidence: 0.55,
			},
		]);

		assert_eq!(merged.len(), 3);
		assert_eq!(merged[0].source, EntitySource::Pattern);
		assert_eq!(merged[0].confidence, 0.90);
		assert_eq!(merged[2].entity_type, EntityType::Part);
		assert_eq!(merged[2].source, EntitySource::Model);
		assert_eq!(merged[2].normalized, "fuel injector nozzle");
	}

	#[test]
	fn model_pass_needed_only_for_empty_or_low_confidence() {
		let confident = extract_pattern("ME1 fault E047", &patterns());

		assert!(!needs_model_pass(&confident, 0.8));
		assert!(needs_model_pass(&[], 0.8));

		let weak = extract_pattern("there is a leak somewhere", &patterns());

		assert!(weak.iter().all(|entity| entity.entity_type == EntityType::Symptom));
		assert!(needs_model_pass(&weak, 0.8));
	}
}
