use toml::Value;

use keel_config::{Config, Error};

const SAMPLE_CONFIG_TOML: &str = include_str!("fixtures/sample_config.toml");

fn parse(raw: &str) -> Config {
	toml::from_str(raw).expect("Failed to parse sample config.")
}

fn with_table_value(section_path: &[&str], key: &str, value: Value) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");
	let mut table = root.as_table_mut().expect("Sample config must be a table.");

	for section in section_path {
		table = table
			.get_mut(*section)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Sample config must include [{section}]."));
	}

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render sample config.")
}

fn assert_validation_error(raw: &str, needle: &str) {
	let cfg = parse(raw);

	match keel_config::validate(&cfg) {
		Err(Error::Validation { message }) => {
			assert!(
				message.contains(needle),
				"Expected validation message containing {needle:?}, got {message:?}."
			);
		},
		other => panic!("Expected a validation error, got {other:?}."),
	}
}

#[test]
fn sample_config_validates() {
	let cfg = parse(SAMPLE_CONFIG_TOML);

	keel_config::validate(&cfg).expect("Sample config must validate.");
}

#[test]
fn rejects_zero_pool_size() {
	let raw = with_table_value(&["storage", "postgres"], "pool_max_conns", Value::Integer(0));

	assert_validation_error(&raw, "pool_max_conns");
}

#[test]
fn rejects_empty_embedding_api_key() {
	let raw =
		with_table_value(&["providers", "embedding"], "api_key", Value::String("  ".to_string()));

	assert_validation_error(&raw, "api_key");
}

#[test]
fn rejects_blend_alpha_above_max_alpha() {
	let raw = with_table_value(&["ranking"], "blend_alpha", Value::Float(0.5));

	assert_validation_error(&raw, "blend_alpha");
}

#[test]
fn rejects_tier_gap_smaller_than_max_blend_contribution() {
	// With max_alpha 0.15 the blend can move a score by up to 15 points, so a
	// 10-point gap between tiers would let cosine similarity cross tiers.
	let raw = with_table_value(&["relations", "tier_weights"], "same_parent", Value::Float(95.0));

	assert_validation_error(&raw, "tier_weights");
}

#[test]
fn rejects_non_positive_tier_weight() {
	let raw =
		with_table_value(&["relations", "tier_weights"], "same_category", Value::Float(0.0));

	assert_validation_error(&raw, "same_category");
}

#[test]
fn rejects_zero_worker_batch_limit() {
	let raw = with_table_value(&["worker"], "batch_limit", Value::Integer(0));

	assert_validation_error(&raw, "batch_limit");
}

#[test]
fn normalizes_drift_terms_on_load() {
	let raw = with_table_value(
		&["classifier"],
		"extra_drift_terms",
		Value::Array(vec![
			Value::String(" Lottery ".to_string()),
			Value::String("lottery".to_string()),
			Value::String("".to_string()),
		]),
	);
	let dir = std::env::temp_dir().join(format!("keel-config-test-{}", std::process::id()));

	std::fs::create_dir_all(&dir).expect("Failed to create temp dir.");

	let path = dir.join("config.toml");

	std::fs::write(&path, raw).expect("Failed to write temp config.");

	let cfg = keel_config::load(&path).expect("Config must load.");

	assert_eq!(cfg.classifier.extra_drift_terms, vec!["lottery".to_string()]);

	std::fs::remove_dir_all(&dir).ok();
}
