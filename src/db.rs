use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::dedup::{DuplicateCache, DuplicateMatch};
use crate::models::{Application, Candidate, Company, Job, ResponseType};
use crate::router::{self, History, RouterConfig, RoutingResult};
use crate::title;

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_ts(dt: DateTime<Utc>) -> String {
    dt.format(TS_FORMAT).to_string()
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .with_context(|| format!("Bad timestamp in store: {:?}", s))?;
    Ok(naive.and_utc())
}

/// Content hash identifying a job as discovered: (company, title, date).
/// Re-discovery on a later date yields a new fingerprint; dedup happens at
/// the application level, not here.
pub fn job_fingerprint(company: &str, title: &str, discovered: &str) -> String {
    let mut hasher = DefaultHasher::new();
    company.trim().to_lowercase().hash(&mut hasher);
    title.trim().to_lowercase().hash(&mut hasher);
    discovered.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open() -> Result<Self> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        Ok(Self { conn, path })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn,
            path: PathBuf::from(":memory:"),
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn default_path() -> Result<PathBuf> {
        // Use XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "pursuit") {
            Ok(proj_dirs.data_dir().join("pursuit.db"))
        } else {
            Ok(PathBuf::from("pursuit.db"))
        }
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS companies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                penalty_score REAL NOT NULL DEFAULT 0,
                blacklisted INTEGER NOT NULL DEFAULT 0,
                total_applications INTEGER NOT NULL DEFAULT 0,
                total_responses INTEGER NOT NULL DEFAULT 0,
                notes TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT,
                source TEXT,
                contact_email TEXT,
                fingerprint TEXT NOT NULL,
                discovered_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS applications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id INTEGER REFERENCES jobs(id),
                company TEXT NOT NULL,
                normalized_title TEXT NOT NULL,
                method TEXT NOT NULL,
                applied_at TEXT NOT NULL,
                response_type TEXT CHECK (response_type IN ('rejection', 'interview', 'offer')),
                response_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_fingerprint ON jobs(fingerprint);
            CREATE INDEX IF NOT EXISTS idx_applications_company ON applications(company COLLATE NOCASE);
            CREATE INDEX IF NOT EXISTS idx_applications_applied ON applications(applied_at);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='applications'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!("Database not initialized. Run 'pursuit init' first."));
        }
        Ok(())
    }

    // --- Job operations ---

    pub fn add_job(&self, candidate: &Candidate, now: DateTime<Utc>) -> Result<i64> {
        let discovered = format_ts(now);
        let fingerprint = job_fingerprint(
            &candidate.company,
            &candidate.title,
            &discovered[..10], // date part only
        );

        // Same fingerprint means the same discovery; return the existing row.
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM jobs WHERE fingerprint = ?1",
                [&fingerprint],
                |row| row.get(0),
            )
            .ok();
        if let Some(id) = existing {
            return Ok(id);
        }

        self.conn.execute(
            "INSERT INTO jobs (company, title, url, source, contact_email, fingerprint, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                candidate.company,
                candidate.title,
                candidate.url,
                candidate.source,
                candidate.contact_email,
                fingerprint,
                discovered,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_job(&self, id: i64) -> Result<Option<Job>> {
        let result = self.conn.query_row(
            "SELECT id, company, title, url, source, contact_email, fingerprint, discovered_at
             FROM jobs WHERE id = ?1",
            [id],
            Self::row_to_job,
        );
        match result {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_jobs(&self, company: Option<&str>, limit: usize) -> Result<Vec<Job>> {
        let sql_base = "SELECT id, company, title, url, source, contact_email, fingerprint, discovered_at
                        FROM jobs";
        let rows = if let Some(c) = company {
            let sql = format!(
                "{} WHERE LOWER(company) = LOWER(?1) ORDER BY discovered_at DESC LIMIT ?2",
                sql_base
            );
            let mut stmt = self.conn.prepare(&sql)?;
            stmt.query_map(params![c, limit as i64], Self::row_to_job)?
                .collect::<Result<Vec<_>, _>>()
        } else {
            let sql = format!("{} ORDER BY discovered_at DESC LIMIT ?1", sql_base);
            let mut stmt = self.conn.prepare(&sql)?;
            stmt.query_map(params![limit as i64], Self::row_to_job)?
                .collect::<Result<Vec<_>, _>>()
        };
        rows.context("Failed to list jobs")
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        Ok(Job {
            id: row.get(0)?,
            company: row.get(1)?,
            title: row.get(2)?,
            url: row.get(3)?,
            source: row.get(4)?,
            contact_email: row.get(5)?,
            fingerprint: row.get(6)?,
            discovered_at: row.get(7)?,
        })
    }

    // --- Company operations ---

    pub fn get_or_create_company(&self, name: &str) -> Result<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM companies WHERE LOWER(name) = LOWER(?1)",
                [name],
                |row| row.get(0),
            )
            .ok();
        if let Some(id) = existing {
            return Ok(id);
        }

        self.conn
            .execute("INSERT INTO companies (name) VALUES (?1)", [name])?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_company_by_name(&self, name: &str) -> Result<Option<Company>> {
        let result = self.conn.query_row(
            "SELECT id, name, penalty_score, blacklisted, total_applications, total_responses,
                    notes, created_at, updated_at
             FROM companies WHERE LOWER(name) = LOWER(?1)",
            [name],
            Self::row_to_company,
        );
        match result {
            Ok(company) => Ok(Some(company)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_companies(&self, blacklisted_only: bool) -> Result<Vec<Company>> {
        let mut sql = String::from(
            "SELECT id, name, penalty_score, blacklisted, total_applications, total_responses,
                    notes, created_at, updated_at
             FROM companies",
        );
        if blacklisted_only {
            sql.push_str(" WHERE blacklisted = 1");
        }
        sql.push_str(" ORDER BY name");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_company)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list companies")
    }

    pub fn set_blacklisted(&self, name: &str, blacklisted: bool) -> Result<()> {
        let id = self.get_or_create_company(name)?;
        self.conn.execute(
            "UPDATE companies SET blacklisted = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![blacklisted as i64, id],
        )?;
        Ok(())
    }

    pub fn adjust_penalty(&self, name: &str, delta: f64) -> Result<f64> {
        let id = self.get_or_create_company(name)?;
        self.conn.execute(
            "UPDATE companies SET penalty_score = MAX(0, penalty_score + ?1),
                    updated_at = datetime('now')
             WHERE id = ?2",
            params![delta, id],
        )?;
        let score: f64 = self.conn.query_row(
            "SELECT penalty_score FROM companies WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;
        Ok(score)
    }

    fn row_to_company(row: &rusqlite::Row) -> rusqlite::Result<Company> {
        Ok(Company {
            id: row.get(0)?,
            name: row.get(1)?,
            penalty_score: row.get(2)?,
            blacklisted: row.get::<_, i64>(3)? != 0,
            total_applications: row.get(4)?,
            total_responses: row.get(5)?,
            notes: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    // --- Application history (what the router reads) ---

    /// A company absent from the store is not blacklisted; a failing store
    /// is an error, never "no history".
    pub fn company_blacklisted(&self, company: &str, penalty_critical: f64) -> Result<bool> {
        let result = self.conn.query_row(
            "SELECT blacklisted, penalty_score FROM companies WHERE LOWER(name) = LOWER(?1)",
            [company],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
        );
        match result {
            Ok((flag, score)) => Ok(flag != 0 || score >= penalty_critical),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn company_penalty(&self, company: &str) -> Result<f64> {
        let result = self.conn.query_row(
            "SELECT penalty_score FROM companies WHERE LOWER(name) = LOWER(?1)",
            [company],
            |row| row.get::<_, f64>(0),
        );
        match result {
            Ok(score) => Ok(score),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0.0),
            Err(e) => Err(e.into()),
        }
    }

    /// The most recent response of any kind from this company. The rejection
    /// cooldown only applies when this is a rejection; a later interview or
    /// offer supersedes it.
    pub fn last_response(&self, company: &str) -> Result<Option<(ResponseType, DateTime<Utc>)>> {
        let result = self.conn.query_row(
            "SELECT response_type, response_at FROM applications
             WHERE LOWER(company) = LOWER(?1) AND response_type IS NOT NULL
             ORDER BY response_at DESC LIMIT 1",
            [company],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        );
        match result {
            Ok((kind, at)) => {
                let kind = ResponseType::parse(&kind)
                    .ok_or_else(|| anyhow!("Unknown response type in store: {:?}", kind))?;
                Ok(Some((kind, parse_ts(&at)?)))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn last_application_at(&self, company: &str) -> Result<Option<DateTime<Utc>>> {
        let ts: Option<String> = self.conn.query_row(
            "SELECT MAX(applied_at) FROM applications WHERE LOWER(company) = LOWER(?1)",
            [company],
            |row| row.get(0),
        )?;
        ts.map(|s| parse_ts(&s)).transpose()
    }

    pub fn company_count_since(&self, company: &str, since: DateTime<Utc>) -> Result<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM applications
             WHERE LOWER(company) = LOWER(?1) AND applied_at >= ?2",
            params![company, format_ts(since)],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    pub fn company_count_total(&self, company: &str) -> Result<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM applications WHERE LOWER(company) = LOWER(?1)",
            [company],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    pub fn global_count_since(&self, since: DateTime<Utc>) -> Result<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM applications WHERE applied_at >= ?1",
            [format_ts(since)],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Rows for rebuilding the duplicate cache: applications within the
    /// lookback window, oldest first.
    pub fn recent_applications(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(i64, String, String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, company, normalized_title, applied_at FROM applications
             WHERE applied_at >= ?1 ORDER BY applied_at",
        )?;
        let rows = stmt.query_map([format_ts(since)], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to read recent applications")
    }

    /// Duplicate lookup straight off the store, bypassing any in-process
    /// cache. Used for the in-transaction re-check.
    pub fn find_duplicate_in_store(
        &self,
        company: &str,
        title: &str,
        config: &RouterConfig,
        now: DateTime<Utc>,
    ) -> Result<Option<DuplicateMatch>> {
        let since = now - chrono::Duration::days(config.lookback_days);
        let mut stmt = self.conn.prepare(
            "SELECT id, company, normalized_title, applied_at FROM applications
             WHERE LOWER(company) = LOWER(?1) AND applied_at >= ?2 ORDER BY applied_at",
        )?;
        let rows = stmt
            .query_map(params![company, format_ts(since)], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<(i64, String, String, String)>, _>>()?;
        let cache = DuplicateCache::from_rows(rows, config.fuzzy_threshold);
        Ok(cache.lookup(company, title))
    }

    // --- Application writers ---

    pub fn record_application(
        &self,
        job_id: Option<i64>,
        company: &str,
        title: &str,
        method: &str,
        applied_at: DateTime<Utc>,
    ) -> Result<i64> {
        let normalized = title::normalized(title);
        self.conn.execute(
            "INSERT INTO applications (job_id, company, normalized_title, method, applied_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![job_id, company, normalized, method, format_ts(applied_at)],
        )?;
        let app_id = self.conn.last_insert_rowid();

        if !company.trim().is_empty() {
            let company_id = self.get_or_create_company(company)?;
            self.conn.execute(
                "UPDATE companies SET total_applications = total_applications + 1,
                        updated_at = datetime('now')
                 WHERE id = ?1",
                [company_id],
            )?;
        }
        Ok(app_id)
    }

    /// Routes and, on APPLY, records the application inside one IMMEDIATE
    /// transaction, re-running every check against in-transaction history so
    /// an overlapping run cannot slip past the duplicate/limit checks. The
    /// returned result is the in-transaction decision, which may differ from
    /// what an earlier unguarded route() said.
    pub fn route_and_record(
        &self,
        job_id: Option<i64>,
        candidate: &Candidate,
        config: &RouterConfig,
        now: DateTime<Utc>,
    ) -> Result<(RoutingResult, Option<i64>)> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        let outcome = (|| -> Result<(RoutingResult, Option<i64>)> {
            let view = StoreHistory {
                db: self,
                cache: None,
                config,
                now,
            };
            let result = router::route(candidate, &view, config, now)?;
            let app_id = match (&result.decision, &result.channel) {
                (router::Decision::Apply, Some(channel)) => Some(self.record_application(
                    job_id,
                    &candidate.company,
                    &candidate.title,
                    channel.method(),
                    now,
                )?),
                _ => None,
            };
            Ok((result, app_id))
        })();

        match outcome {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    // --- Responses ---

    /// Attaches a response to the most recent open application at the named
    /// company. The company is matched fuzzily (Jaro-Winkler) against known
    /// application companies, since responses rarely quote an exact name.
    /// A rejection bumps the company's penalty score.
    pub fn attach_response(
        &self,
        company_query: &str,
        response: ResponseType,
        at: DateTime<Utc>,
        rejection_penalty: f64,
    ) -> Result<Option<(String, i64)>> {
        let company = match self.match_company(company_query)? {
            Some(name) => name,
            None => return Ok(None),
        };

        let app = self.conn.query_row(
            "SELECT id FROM applications
             WHERE LOWER(company) = LOWER(?1) AND response_type IS NULL
             ORDER BY applied_at DESC LIMIT 1",
            [&company],
            |row| row.get::<_, i64>(0),
        );
        let app_id = match app {
            Ok(id) => id,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        self.conn.execute(
            "UPDATE applications SET response_type = ?1, response_at = ?2 WHERE id = ?3",
            params![response.as_str(), format_ts(at), app_id],
        )?;

        let company_id = self.get_or_create_company(&company)?;
        self.conn.execute(
            "UPDATE companies SET total_responses = total_responses + 1,
                    updated_at = datetime('now')
             WHERE id = ?1",
            [company_id],
        )?;
        if response == ResponseType::Rejection {
            self.adjust_penalty(&company, rejection_penalty)?;
        }

        Ok(Some((company, app_id)))
    }

    /// Best fuzzy match of a free-form company string against companies we
    /// have actually applied to. Exact (case-insensitive) match wins; below
    /// 0.85 similarity nothing matches.
    fn match_company(&self, query: &str) -> Result<Option<String>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT company FROM applications")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let query_lower = query.to_lowercase();
        let mut best: Option<(f64, String)> = None;
        for name in names {
            if name.to_lowercase() == query_lower {
                return Ok(Some(name));
            }
            let score = strsim::jaro_winkler(&query_lower, &name.to_lowercase());
            if score >= 0.85 && best.as_ref().is_none_or(|(b, _)| score > *b) {
                best = Some((score, name));
            }
        }
        Ok(best.map(|(_, name)| name))
    }

    pub fn list_applications(&self, company: Option<&str>, limit: usize) -> Result<Vec<Application>> {
        let sql_base = "SELECT id, job_id, company, normalized_title, method, applied_at,
                               response_type, response_at
                        FROM applications";
        let rows = if let Some(c) = company {
            let sql = format!(
                "{} WHERE LOWER(company) = LOWER(?1) ORDER BY applied_at DESC LIMIT ?2",
                sql_base
            );
            let mut stmt = self.conn.prepare(&sql)?;
            stmt.query_map(params![c, limit as i64], Self::row_to_application)?
                .collect::<Result<Vec<_>, _>>()
        } else {
            let sql = format!("{} ORDER BY applied_at DESC LIMIT ?1", sql_base);
            let mut stmt = self.conn.prepare(&sql)?;
            stmt.query_map(params![limit as i64], Self::row_to_application)?
                .collect::<Result<Vec<_>, _>>()
        };
        rows.context("Failed to list applications")
    }

    fn row_to_application(row: &rusqlite::Row) -> rusqlite::Result<Application> {
        Ok(Application {
            id: row.get(0)?,
            job_id: row.get(1)?,
            company: row.get(2)?,
            normalized_title: row.get(3)?,
            method: row.get(4)?,
            applied_at: row.get(5)?,
            response_type: row.get(6)?,
            response_at: row.get(7)?,
        })
    }

    // --- Status counters ---

    pub fn status_counts(&self, now: DateTime<Utc>) -> Result<StatusCounts> {
        let jobs: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))?;
        let applications: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM applications", [], |row| row.get(0))?;
        let responses: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM applications WHERE response_type IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        let today_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc();
        let today = self.global_count_since(today_start)? as i64;
        Ok(StatusCounts {
            jobs,
            applications,
            applications_today: today,
            responses,
        })
    }
}

#[derive(Debug)]
pub struct StatusCounts {
    pub jobs: i64,
    pub applications: i64,
    pub applications_today: i64,
    pub responses: i64,
}

/// History view over the store for the router: blacklist and penalty from
/// the companies table, counts off the applications table, duplicates from
/// either the in-process cache (batch runs) or the store itself
/// (in-transaction re-check).
pub struct StoreHistory<'a> {
    pub db: &'a Database,
    pub cache: Option<&'a DuplicateCache>,
    pub config: &'a RouterConfig,
    pub now: DateTime<Utc>,
}

impl History for StoreHistory<'_> {
    fn is_blacklisted(&self, company: &str) -> Result<bool> {
        self.db
            .company_blacklisted(company, self.config.penalty_critical)
    }

    fn penalty(&self, company: &str) -> Result<f64> {
        self.db.company_penalty(company)
    }

    fn last_response(&self, company: &str) -> Result<Option<(ResponseType, DateTime<Utc>)>> {
        self.db.last_response(company)
    }

    fn last_application_at(&self, company: &str) -> Result<Option<DateTime<Utc>>> {
        self.db.last_application_at(company)
    }

    fn company_count_since(&self, company: &str, since: DateTime<Utc>) -> Result<u32> {
        self.db.company_count_since(company, since)
    }

    fn company_count_total(&self, company: &str) -> Result<u32> {
        self.db.company_count_total(company)
    }

    fn global_count_since(&self, since: DateTime<Utc>) -> Result<u32> {
        self.db.global_count_since(since)
    }

    fn find_duplicate(&self, company: &str, title: &str) -> Result<Option<DuplicateMatch>> {
        match self.cache {
            Some(cache) => Ok(cache.lookup(company, title)),
            None => self
                .db
                .find_duplicate_in_store(company, title, self.config, self.now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Decision;
    use chrono::{Duration, TimeZone};

    fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 26, 15, 0, 0).unwrap()
    }

    fn candidate(company: &str, title: &str) -> Candidate {
        Candidate {
            company: company.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_fingerprint_stable_and_date_sensitive() {
        let a = job_fingerprint("Acme", "Engineer", "2026-08-26");
        let b = job_fingerprint("acme ", "ENGINEER", "2026-08-26");
        assert_eq!(a, b); // case/whitespace insensitive
        let c = job_fingerprint("Acme", "Engineer", "2026-08-27");
        assert_ne!(a, c); // re-discovery gets a new identity
    }

    #[test]
    fn test_add_job_dedupes_on_fingerprint() {
        let db = Database::open_in_memory().unwrap();
        let c = candidate("Acme", "Engineer");
        let first = db.add_job(&c, test_now()).unwrap();
        let second = db.add_job(&c, test_now()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_window_counts() {
        let db = Database::open_in_memory().unwrap();
        let now = test_now();
        db.record_application(None, "Acme", "Engineer", "email", now - Duration::hours(2))
            .unwrap();
        db.record_application(None, "Acme", "Designer", "email", now - Duration::days(3))
            .unwrap();
        db.record_application(None, "Acme", "Manager", "email", now - Duration::days(20))
            .unwrap();
        db.record_application(None, "Other", "Engineer", "email", now - Duration::hours(1))
            .unwrap();

        assert_eq!(
            db.company_count_since("acme", now - Duration::hours(24)).unwrap(),
            1
        );
        assert_eq!(
            db.company_count_since("Acme", now - Duration::days(7)).unwrap(),
            2
        );
        assert_eq!(db.company_count_total("Acme").unwrap(), 3);
        assert_eq!(db.global_count_since(now - Duration::hours(24)).unwrap(), 2);
    }

    #[test]
    fn test_route_and_record_applies_then_blocks_duplicate() {
        let db = Database::open_in_memory().unwrap();
        let config = RouterConfig::default();
        let c = candidate("Beta", "Senior ML Engineer");

        let (result, app_id) = db.route_and_record(None, &c, &config, test_now()).unwrap();
        assert_eq!(result.decision, Decision::Apply);
        assert!(app_id.is_some());

        // Equivalent role at the same company is now a duplicate, straight
        // off the store with no in-process cache involved.
        let c2 = candidate("Beta", "Sr Machine Learning Engineer");
        let (result, app_id) = db
            .route_and_record(None, &c2, &config, test_now() + Duration::hours(1))
            .unwrap();
        assert_eq!(result.decision, Decision::SkipDuplicate);
        assert!(app_id.is_none());
    }

    #[test]
    fn test_blacklist_from_flag_and_from_critical_penalty() {
        let db = Database::open_in_memory().unwrap();
        db.set_blacklisted("Acme", true).unwrap();
        assert!(db.company_blacklisted("acme", 9.0).unwrap());

        db.adjust_penalty("Gamma", 9.5).unwrap();
        assert!(db.company_blacklisted("Gamma", 9.0).unwrap());
        assert!(!db.company_blacklisted("Unknown", 9.0).unwrap());
    }

    #[test]
    fn test_attach_response_fuzzy_match_and_penalty() {
        let db = Database::open_in_memory().unwrap();
        let now = test_now();
        db.record_application(None, "Initech Systems", "Engineer", "email", now)
            .unwrap();

        // Slightly mangled company name still matches
        let attached = db
            .attach_response("Initech Sytems", ResponseType::Rejection, now + Duration::days(5), 3.0)
            .unwrap();
        let (company, _) = attached.expect("should match");
        assert_eq!(company, "Initech Systems");

        assert_eq!(db.company_penalty("Initech Systems").unwrap(), 3.0);
        let response = db.last_response("Initech Systems").unwrap();
        assert_eq!(
            response,
            Some((ResponseType::Rejection, now + Duration::days(5)))
        );

        // No open application left; a second response finds nothing
        let again = db
            .attach_response("Initech Systems", ResponseType::Interview, now, 3.0)
            .unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn test_store_failure_is_an_error_not_empty_history() {
        let db = Database::open_in_memory().unwrap();
        db.record_application(None, "Acme", "Engineer", "email", test_now())
            .unwrap();

        // Break the store underneath the history readers: a missing table
        // must surface as Err, not read as "no history".
        db.conn.execute_batch("DROP TABLE companies").unwrap();
        assert!(db.company_blacklisted("Acme", 9.0).is_err());
        assert!(db.company_penalty("Acme").is_err());

        db.conn.execute_batch("DROP TABLE applications").unwrap();
        assert!(db.last_response("Acme").is_err());
        assert!(db
            .attach_response("Acme", ResponseType::Rejection, test_now(), 3.0)
            .is_err());
    }

    #[test]
    fn test_rejection_cooldown_lifted_by_newer_interview() {
        let db = Database::open_in_memory().unwrap();
        let config = RouterConfig::default();
        let now = test_now();

        db.record_application(None, "Delta", "Engineer", "email", now - Duration::days(50))
            .unwrap();
        db.record_application(None, "Delta", "Designer", "email", now - Duration::days(45))
            .unwrap();
        // Rejection lands on the most recent open application...
        db.attach_response("Delta", ResponseType::Rejection, now - Duration::days(20), 3.0)
            .unwrap();
        // ...then a later interview arrives for the other one.
        db.attach_response("Delta", ResponseType::Interview, now - Duration::days(5), 3.0)
            .unwrap();
        assert_eq!(
            db.last_response("Delta").unwrap(),
            Some((ResponseType::Interview, now - Duration::days(5)))
        );

        // The rejection is no longer the latest response and the last
        // application is well past the re-apply window.
        let (result, _) = db
            .route_and_record(None, &candidate("Delta", "Product Manager"), &config, now)
            .unwrap();
        assert_eq!(result.decision, Decision::Apply);
    }

    #[test]
    fn test_attach_response_unknown_company() {
        let db = Database::open_in_memory().unwrap();
        let attached = db
            .attach_response("Nobody Corp", ResponseType::Offer, test_now(), 3.0)
            .unwrap();
        assert!(attached.is_none());
    }

    #[test]
    fn test_cooldown_reads_through_store() {
        let db = Database::open_in_memory().unwrap();
        let config = RouterConfig::default();
        let now = test_now();

        db.record_application(None, "Gamma", "Engineer", "email", now - Duration::days(40))
            .unwrap();
        db.attach_response("Gamma", ResponseType::Rejection, now - Duration::days(10), 3.0)
            .unwrap();

        let (result, _) = db
            .route_and_record(None, &candidate("Gamma", "Product Manager"), &config, now)
            .unwrap();
        assert_eq!(result.decision, Decision::SkipCooldown);
        assert_eq!(
            result.retry_after,
            Some(now - Duration::days(10) + Duration::days(30))
        );
    }
}
