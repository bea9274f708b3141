//! Curated vocabulary for pattern-based recognition. Loaded once at process start and
//! passed by reference into the pure classification and extraction functions.

/// Canonical equipment names. Multi-word names must match as a whole phrase; the
/// matcher tries longer names first.
pub const EQUIPMENT: &[&str] = &[
	"main engine 1",
	"main engine 2",
	"main engine",
	"auxiliary engine 1",
	"auxiliary engine 2",
	"auxiliary engine",
	"fuel filter",
	"fuel pump",
	"fuel oil separator",
	"lube oil pump",
	"lube oil cooler",
	"cooling water pump",
	"sea water pump",
	"fresh water generator",
	"air compressor",
	"starting air compressor",
	"ballast pump",
	"bilge pump",
	"fire pump",
	"bow thruster",
	"steering gear",
	"turbocharger",
	"exhaust gas boiler",
	"boiler",
	"purifier",
	"oily water separator",
	"emergency generator",
	"shaft generator",
	"crankshaft",
	"cylinder liner",
	"fuel injector",
];

/// Fixed abbreviation dictionary, expanded before gazetteer matching.
pub const ABBREVIATIONS: &[(&str, &str)] = &[
	("me1", "main engine 1"),
	("me2", "main engine 2"),
	("ae1", "auxiliary engine 1"),
	("ae2", "auxiliary engine 2"),
	("t/c", "turbocharger"),
	("fwg", "fresh water generator"),
	("ows", "oily water separator"),
	("lo", "lube oil"),
	("fo", "fuel oil"),
	("cw", "cooling water"),
	("stbd", "starboard"),
];

pub const SYMPTOMS: &[&str] = &[
	"high exhaust temperature",
	"low lube oil pressure",
	"low pressure",
	"high pressure",
	"high temperature",
	"overheating",
	"overheat",
	"vibration",
	"vibrating",
	"leaking",
	"leakage",
	"leak",
	"knocking",
	"misfire",
	"surging",
	"smoke",
	"noise",
	"tripped",
	"alarm",
	"corrosion",
	"erosion",
	"wear",
	"blocked",
	"clogged",
	"seized",
];

/// Unit spellings accepted by the measurement pattern, with their canonical symbol.
pub const UNIT_SYNONYMS: &[(&str, &str)] = &[
	("bar", "bar"),
	("psi", "psi"),
	("rpm", "rpm"),
	("°c", "degc"),
	("degc", "degc"),
	("deg c", "degc"),
	("celsius", "degc"),
	("kw", "kw"),
	("hz", "hz"),
	("volts", "v"),
	("v", "v"),
	("amps", "a"),
	("a", "a"),
	("l/min", "l/min"),
	("mm", "mm"),
	("hours", "h"),
	("hrs", "h"),
	("hr", "h"),
	("h", "h"),
];

/// Verbs that signal a direct command over known records. A command phrase with
/// recognized vocabulary routes to the rules-only lane.
pub const COMMAND_VERBS: &[&str] = &[
	"show", "list", "find", "open", "close", "create", "update", "assign", "schedule", "order",
	"log", "complete",
];

/// Built-in off-domain vocabulary. Deployments extend this list through
/// `classifier.extra_drift_terms`; the set is expected to keep changing.
pub const DRIFT_TERMS: &[&str] = &[
	"weather",
	"recipe",
	"lottery",
	"football",
	"basketball",
	"movie",
	"netflix",
	"stock market",
	"bitcoin",
	"crypto",
	"horoscope",
	"joke",
	"poem",
	"song lyrics",
	"dating",
	"vacation",
	"holiday plans",
	"politics",
	"celebrity",
	"homework",
];

/// Built-in instruction-override and role-switch phrases. Matched on lowercased,
/// NFKC-normalized text.
pub const INJECTION_PHRASES: &[&str] = &[
	"ignore all previous instructions",
	"ignore previous instructions",
	"ignore the above",
	"disregard the above",
	"disregard all previous",
	"forget your instructions",
	"forget everything above",
	"override your instructions",
	"new instructions:",
	"you are now",
	"act as",
	"pretend to be",
	"pretend you are",
	"roleplay as",
	"system prompt",
	"developer mode",
	"jailbreak",
];

/// Tokens carrying no routing signal on their own.
pub const STOPWORDS: &[&str] = &[
	"a", "an", "and", "are", "at", "be", "but", "by", "can", "do", "for", "from", "has", "have",
	"how", "i", "in", "is", "it", "me", "my", "of", "on", "or", "our", "please", "that", "the",
	"there", "this", "to", "was", "we", "what", "when", "where", "which", "who", "why", "with",
	"you",
];

pub fn is_stopword(token: &str) -> bool {
	STOPWORDS.contains(&token)
}

pub fn canonical_unit(raw: &str) -> Option<&'static str> {
	let lowered = raw.to_lowercase();

	UNIT_SYNONYMS
		.iter()
		.find(|(spelling, _)| *spelling == lowered.as_str())
		.map(|(_, canonical)| *canonical)
}

pub fn expand_abbreviation(raw: &str) -> Option<&'static str> {
	let lowered = raw.to_lowercase();

	ABBREVIATIONS
		.iter()
		.find(|(abbreviation, _)| *abbreviation == lowered.as_str())
		.map(|(_, expanded)| *expanded)
}
