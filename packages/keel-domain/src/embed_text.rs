//! Embedding-input normalization. The refresh worker feeds every entity through this
//! before calling the embedding provider, so stored vectors are comparable across
//! spelling variants and never contain secrets.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use unicode_normalization::UnicodeNormalization;

use crate::vocabulary;

const REDACTED: &str = "[redacted]";

/// Per-record-kind character caps for the normalized input.
pub fn char_cap(kind: &str) -> usize {
	match kind {
		"work_order" => 2_000,
		"fault" => 1_200,
		"part" => 800,
		"document" => 4_000,
		"equipment" => 600,
		_ => 1_000,
	}
}

static SECRET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
	[
		r"-----begin (rsa|openssh|ec|dsa) private key-----[\s\S]*?-----end (rsa|openssh|ec|dsa) private key-----",
		r"\bsk-[a-z0-9]{20,}\b",
		r"\bapi[_-]?key\s*[:=]\s*\S+",
		r"\bpassword\s*[:=]\s*\S+",
		r"\bsecret\s*[:=]\s*\S+",
		r"\btoken\s*[:=]\s*\S+",
		r"\bbearer\s+\S+",
	]
	.iter()
	.map(|source| {
		RegexBuilder::new(source)
			.case_insensitive(true)
			.build()
			.unwrap_or_else(|err| unreachable!("Static secret pattern is valid: {err}."))
	})
	.collect()
});

// Loose PII shapes: email addresses and long digit runs (phone/serial-like).
static PII_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
	[r"\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b", r"\b\d{9,}\b"]
		.iter()
		.map(|source| {
			RegexBuilder::new(source)
				.case_insensitive(true)
				.build()
				.unwrap_or_else(|err| unreachable!("Static PII pattern is valid: {err}."))
		})
		.collect()
});

/// Build the normalized embedding input for one entity: NFKC + case folding, unit
/// canonicalization, abbreviation expansion, secret/PII scrubbing, then the per-kind
/// length cap. Empty field parts are skipped.
pub fn build_embedding_input(kind: &str, parts: &[&str]) -> String {
	let joined = parts
		.iter()
		.map(|part| part.trim())
		.filter(|part| !part.is_empty())
		.collect::<Vec<_>>()
		.join("\n");
	let mut text: String = joined.nfkc().collect::<String>().to_lowercase();

	text = scrub(&text);
	text = normalize_units(&text);
	text = expand_synonyms(&text);

	let cap = char_cap(kind);

	if text.chars().count() > cap {
		text = text.chars().take(cap).collect();
	}

	text
}

pub fn scrub(text: &str) -> String {
	let mut out = text.to_string();

	for pattern in SECRET_PATTERNS.iter().chain(PII_PATTERNS.iter()) {
		out = pattern.replace_all(&out, REDACTED).into_owned();
	}

	out
}

fn normalize_units(text: &str) -> String {
	static MEASUREMENT: LazyLock<Regex> = LazyLock::new(|| {
		RegexBuilder::new(
			r"\b([0-9]+(?:\.[0-9]+)?)\s*(l/min|hours|hrs|hr|°c|deg c|degc|celsius|bar|psi|rpm|kw|hz|mm|v|a|h)\b",
		)
		.case_insensitive(true)
		.build()
		.unwrap_or_else(|err| unreachable!("Static measurement pattern is valid: {err}."))
	});

	MEASUREMENT
		.replace_all(text, |captures: &regex::Captures<'_>| {
			let value = &captures[1];
			let unit = vocabulary::canonical_unit(&captures[2]).unwrap_or(&captures[2]);

			format!("{value} {unit}")
		})
		.into_owned()
}

/// Append canonical expansions after known abbreviations so both spellings embed.
fn expand_synonyms(text: &str) -> String {
	let mut out = String::with_capacity(text.len());

	for (index, token) in text.split_whitespace().enumerate() {
		if index > 0 {
			out.push(' ');
		}

		out.push_str(token);

		let bare = token.trim_matches(|ch: char| !ch.is_alphanumeric());

		if let Some(expanded) = vocabulary::expand_abbreviation(bare)
			&& !text.contains(expanded)
		{
			out.push_str(" (");
			out.push_str(expanded);
			out.push(')');
		}
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn folds_case_and_normalizes_units() {
		let input = build_embedding_input("fault", &["ME1 Overheating", "Reading 95 Celsius"]);

		assert!(input.contains("me1 (main engine 1)"));
		assert!(input.contains("95 degc"));
		assert!(!input.contains("Celsius"));
	}

	#[test]
	fn scrubs_secret_assignments() {
		let input =
			build_embedding_input("work_order", &["reset password: hunter2 then restart"]);

		assert!(!input.contains("hunter2"));
		assert!(input.contains(REDACTED));
	}

	#[test]
	fn scrubs_email_addresses() {
		let scrubbed = scrub("contact chief@vessel.example for access");

		assert!(!scrubbed.contains("chief@vessel.example"));
	}

	#[test]
	fn applies_per_kind_length_cap() {
		let long = "x".repeat(10_000);
		let input = build_embedding_input("part", &[long.as_str()]);

		assert_eq!(input.chars().count(), char_cap("part"));
	}

	#[test]
	fn skips_empty_parts() {
		let input = build_embedding_input("equipment", &["", "  ", "fuel pump"]);

		assert_eq!(input, "fuel pump");
	}
}
