use std::collections::HashMap;

use crate::title::{self, CanonicalTitle};

/// One prior application as seen by the duplicate cache.
#[derive(Debug, Clone)]
struct Entry {
    application_id: i64,
    canonical: CanonicalTitle,
    normalized: String,
    applied_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateMatch {
    pub application_id: i64,
    pub normalized_title: String,
    pub applied_at: String,
    pub score: f64,
}

/// In-process index of recent applications keyed by company. Rebuilt from the
/// store at the start of a run and mutated as the run records sends, so one
/// batch never routes the same role twice. Never trusted across restarts.
#[derive(Debug, Default)]
pub struct DuplicateCache {
    by_company: HashMap<String, Vec<Entry>>,
    fuzzy_threshold: f64,
}

fn company_key(company: &str) -> String {
    company.trim().to_lowercase()
}

impl DuplicateCache {
    pub fn new(fuzzy_threshold: f64) -> Self {
        Self {
            by_company: HashMap::new(),
            fuzzy_threshold,
        }
    }

    /// Builds the cache from (application_id, company, title, applied_at)
    /// rows, typically `Database::recent_applications`.
    pub fn from_rows<I>(rows: I, fuzzy_threshold: f64) -> Self
    where
        I: IntoIterator<Item = (i64, String, String, String)>,
    {
        let mut cache = Self::new(fuzzy_threshold);
        for (application_id, company, title, applied_at) in rows {
            cache.insert(application_id, &company, &title, &applied_at);
        }
        cache
    }

    pub fn insert(&mut self, application_id: i64, company: &str, title: &str, applied_at: &str) {
        let canonical = title::canonicalize(title);
        let normalized = canonical.normalized();
        self.by_company
            .entry(company_key(company))
            .or_default()
            .push(Entry {
                application_id,
                canonical,
                normalized,
                applied_at: applied_at.to_string(),
            });
    }

    /// Exact lookup on the normalized title first, then a fuzzy scan over
    /// every cached title at the same company. Ties break toward the lowest
    /// application id so the result is independent of insertion order.
    pub fn lookup(&self, company: &str, title: &str) -> Option<DuplicateMatch> {
        let key = company_key(company);
        if key.is_empty() {
            // Unknown company: nothing to match against.
            return None;
        }
        let entries = self.by_company.get(&key)?;
        let canonical = title::canonicalize(title);
        let normalized = canonical.normalized();

        let mut best: Option<(f64, &Entry)> = None;
        for entry in entries {
            let score = if entry.normalized == normalized {
                1.0
            } else {
                title::overlap(&entry.canonical, &canonical)
            };
            if score < self.fuzzy_threshold {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_score, best_entry)) => {
                    score > best_score
                        || (score == best_score && entry.application_id < best_entry.application_id)
                }
            };
            if better {
                best = Some((score, entry));
            }
        }

        best.map(|(score, entry)| DuplicateMatch {
            application_id: entry.application_id,
            normalized_title: entry.normalized.clone(),
            applied_at: entry.applied_at.clone(),
            score,
        })
    }

    pub fn len(&self) -> usize {
        self.by_company.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(rows: Vec<(i64, &str, &str, &str)>) -> DuplicateCache {
        DuplicateCache::from_rows(
            rows.into_iter()
                .map(|(id, c, t, d)| (id, c.to_string(), t.to_string(), d.to_string())),
            0.7,
        )
    }

    #[test]
    fn test_exact_match_same_company() {
        let cache = cache_with(vec![(1, "Beta", "Software Engineer", "2026-08-01 09:00:00")]);
        let hit = cache.lookup("beta", "Software Engineer").unwrap();
        assert_eq!(hit.application_id, 1);
        assert_eq!(hit.score, 1.0);
    }

    #[test]
    fn test_fuzzy_match_across_seniority_noise() {
        let cache = cache_with(vec![(
            7,
            "Beta",
            "Senior ML Engineer",
            "2026-08-01 09:00:00",
        )]);
        let hit = cache.lookup("Beta", "Sr Machine Learning Engineer").unwrap();
        assert_eq!(hit.application_id, 7);
        assert!(hit.score >= 0.7);
    }

    #[test]
    fn test_no_match_across_companies() {
        let cache = cache_with(vec![(1, "Beta", "Software Engineer", "2026-08-01 09:00:00")]);
        assert!(cache.lookup("Gamma", "Software Engineer").is_none());
    }

    #[test]
    fn test_different_role_same_company_passes() {
        let cache = cache_with(vec![(1, "Beta", "Software Engineer", "2026-08-01 09:00:00")]);
        assert!(cache.lookup("Beta", "Product Designer").is_none());
    }

    #[test]
    fn test_lookup_independent_of_insertion_order() {
        let forward = cache_with(vec![
            (1, "Beta", "Platform Engineer", "2026-08-01 09:00:00"),
            (2, "Beta", "Platform Engineer II", "2026-08-02 09:00:00"),
        ]);
        let reversed = cache_with(vec![
            (2, "Beta", "Platform Engineer II", "2026-08-02 09:00:00"),
            (1, "Beta", "Platform Engineer", "2026-08-01 09:00:00"),
        ]);
        let a = forward.lookup("Beta", "Sr Platform Engineer").unwrap();
        let b = reversed.lookup("Beta", "Sr Platform Engineer").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.application_id, 1); // lowest id wins ties
    }

    #[test]
    fn test_empty_company_never_matches() {
        let cache = cache_with(vec![(1, "", "Software Engineer", "2026-08-01 09:00:00")]);
        assert!(cache.lookup("", "Software Engineer").is_none());
    }

    #[test]
    fn test_insert_during_batch_prevents_rerouting() {
        let mut cache = cache_with(vec![]);
        assert!(cache.is_empty());
        assert!(cache.lookup("NewCo", "Staff Engineer").is_none());
        cache.insert(42, "NewCo", "Staff Engineer", "2026-08-30 10:00:00");
        let hit = cache.lookup("NewCo", "Engineer").unwrap();
        assert_eq!(hit.application_id, 42);
    }
}
