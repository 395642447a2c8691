use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Seniority level extracted from a job title. Kept separate from the base
/// role tokens so "Senior ML Engineer" and "ML Engineer II" compare equal on
/// role while still remembering the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seniority {
    Intern,
    Junior,
    Mid,
    Senior,
    Staff,
    Principal,
    Lead,
    Director,
    Unknown,
}

// Declarative rule table: token -> seniority level. Matched against whole
// tokens after lowercasing and punctuation stripping.
const SENIORITY_TOKENS: &[(&str, Seniority)] = &[
    ("intern", Seniority::Intern),
    ("internship", Seniority::Intern),
    ("jr", Seniority::Junior),
    ("junior", Seniority::Junior),
    ("entry", Seniority::Junior),
    ("mid", Seniority::Mid),
    ("intermediate", Seniority::Mid),
    ("sr", Seniority::Senior),
    ("senior", Seniority::Senior),
    ("staff", Seniority::Staff),
    ("principal", Seniority::Principal),
    ("lead", Seniority::Lead),
    ("director", Seniority::Director),
];

// Common title abbreviations expanded so word-set overlap sees through them.
const TOKEN_ALIASES: &[(&str, &[&str])] = &[
    ("ml", &["machine", "learning"]),
    ("swe", &["software", "engineer"]),
    ("sre", &["site", "reliability", "engineer"]),
    ("qa", &["quality", "assurance"]),
];

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTitle {
    pub base_tokens: Vec<String>,
    pub seniority: Seniority,
}

impl CanonicalTitle {
    pub fn normalized(&self) -> String {
        self.base_tokens.join(" ")
    }

    fn token_set(&self) -> HashSet<&str> {
        self.base_tokens.iter().map(|s| s.as_str()).collect()
    }
}

fn level_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Roman numeral (I-V range) or single arabic digit used as a level
    // marker, e.g. "Engineer II", "Engineer 3".
    RE.get_or_init(|| Regex::new(r"^(?:i{1,3}|iv|v|[1-9])$").expect("level suffix pattern"))
}

/// Breaks a raw title into (base role tokens, seniority level): lowercase,
/// strip punctuation, drop seniority and level tokens, expand known
/// abbreviations. The first seniority token seen wins.
pub fn canonicalize(raw: &str) -> CanonicalTitle {
    let mut base_tokens = Vec::new();
    let mut seniority = Seniority::Unknown;

    let cleaned: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    for token in cleaned.split_whitespace() {
        if let Some((_, level)) = SENIORITY_TOKENS.iter().find(|(t, _)| *t == token) {
            if seniority == Seniority::Unknown {
                seniority = *level;
            }
            continue;
        }
        if level_suffix_re().is_match(token) {
            continue;
        }
        if let Some((_, expansion)) = TOKEN_ALIASES.iter().find(|(t, _)| *t == token) {
            for word in *expansion {
                if !base_tokens.iter().any(|b| b == word) {
                    base_tokens.push(word.to_string());
                }
            }
            continue;
        }
        if !base_tokens.iter().any(|b| b == token) {
            base_tokens.push(token.to_string());
        }
    }

    CanonicalTitle {
        base_tokens,
        seniority,
    }
}

/// Normalized form used as the duplicate-cache key.
pub fn normalized(raw: &str) -> String {
    canonicalize(raw).normalized()
}

/// Word-set Jaccard overlap of the base role tokens. 1.0 for identical sets,
/// 0.0 for disjoint. Empty-vs-empty counts as identical.
pub fn overlap(a: &CanonicalTitle, b: &CanonicalTitle) -> f64 {
    let set_a = a.token_set();
    let set_b = b.token_set();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    intersection as f64 / union as f64
}
