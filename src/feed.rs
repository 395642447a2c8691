use std::path::Path;

use anyhow::{Context, Result};

use crate::models::Candidate;

#[derive(Debug, Default)]
pub struct FeedStats {
    pub lines: usize,
    pub parsed: usize,
    pub skipped: usize,
}

/// Reads a JSON-lines candidate feed. One object per line with company,
/// title and optional url/source/contact_email. Malformed lines and records
/// with neither company nor title are counted and skipped, not fatal.
pub fn load_candidates(path: &Path) -> Result<(Vec<Candidate>, FeedStats)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read feed file: {}", path.display()))?;

    let mut candidates = Vec::new();
    let mut stats = FeedStats::default();

    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.lines += 1;
        match serde_json::from_str::<Candidate>(line) {
            Ok(candidate) => {
                if candidate.company.trim().is_empty() && candidate.title.trim().is_empty() {
                    stats.skipped += 1;
                    continue;
                }
                stats.parsed += 1;
                candidates.push(candidate);
            }
            Err(e) => {
                eprintln!("  feed line {}: {}", lineno + 1, e);
                stats.skipped += 1;
            }
        }
    }

    Ok((candidates, stats))
}
