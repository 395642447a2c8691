use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;

use crate::dedup::DuplicateMatch;
use crate::models::{Candidate, ResponseType};

/// Delivery channel recommended for an APPLY decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    LinkedIn,
    Ats { vendor: String },
    Portal,
}

impl Channel {
    pub fn label(&self) -> String {
        match self {
            Channel::Email => "email".to_string(),
            Channel::LinkedIn => "linkedin".to_string(),
            Channel::Ats { vendor } => format!("ats:{}", vendor),
            Channel::Portal => "portal".to_string(),
        }
    }

    /// The `applications.method` value to record for a send on this channel.
    pub fn method(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::LinkedIn => "linkedin",
            Channel::Ats { .. } => "ats",
            Channel::Portal => "portal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Apply,
    SkipDuplicate,
    SkipCooldown,
    SkipPenalty,
    SkipLimit,
    SkipBlacklist,
    Defer,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Apply => "APPLY",
            Decision::SkipDuplicate => "SKIP_DUPLICATE",
            Decision::SkipCooldown => "SKIP_COOLDOWN",
            Decision::SkipPenalty => "SKIP_PENALTY",
            Decision::SkipLimit => "SKIP_LIMIT",
            Decision::SkipBlacklist => "SKIP_BLACKLIST",
            Decision::Defer => "DEFER",
        }
    }
}

/// Outcome of routing one candidate. Ephemeral: never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingResult {
    pub decision: Decision,
    pub reason: String,
    pub channel: Option<Channel>,
    pub retry_after: Option<DateTime<Utc>>,
    pub matched_application: Option<i64>,
}

impl RoutingResult {
    fn skip(decision: Decision, reason: String) -> Self {
        Self {
            decision,
            reason,
            channel: None,
            retry_after: None,
            matched_application: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub max_per_company_day: u32,
    pub max_per_company_week: u32,
    pub max_per_company_lifetime: u32,
    pub global_daily_cap: u32,
    pub rejection_cooldown_days: i64,
    pub reapply_cooldown_days: i64,
    pub penalty_high: f64,
    pub penalty_critical: f64,
    pub fuzzy_threshold: f64,
    pub lookback_days: i64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_per_company_day: 3,
            max_per_company_week: 5,
            max_per_company_lifetime: 10,
            global_daily_cap: 75,
            rejection_cooldown_days: 30,
            reapply_cooldown_days: 7,
            penalty_high: 7.0,
            penalty_critical: 9.0,
            fuzzy_threshold: 0.7,
            lookback_days: 90,
        }
    }
}

/// What the router needs to know about prior applications and companies.
/// Implemented by `Database`; tests use an in-memory fake. Every method
/// returns Err on store failure so infrastructure problems are never
/// mistaken for "no history".
pub trait History {
    fn is_blacklisted(&self, company: &str) -> Result<bool>;
    fn penalty(&self, company: &str) -> Result<f64>;
    fn last_response(&self, company: &str) -> Result<Option<(ResponseType, DateTime<Utc>)>>;
    fn last_application_at(&self, company: &str) -> Result<Option<DateTime<Utc>>>;
    fn company_count_since(&self, company: &str, since: DateTime<Utc>) -> Result<u32>;
    fn company_count_total(&self, company: &str) -> Result<u32>;
    fn global_count_since(&self, since: DateTime<Utc>) -> Result<u32>;
    fn find_duplicate(&self, company: &str, title: &str) -> Result<Option<DuplicateMatch>>;
}

fn start_of_next_day(now: DateTime<Utc>) -> DateTime<Utc> {
    let next = now.date_naive() + Duration::days(1);
    next.and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc()
}

fn start_of_next_week(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_ahead = 7 - i64::from(now.weekday().num_days_from_monday());
    let next = now.date_naive() + Duration::days(days_ahead);
    next.and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc()
}

fn start_of_today(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc()
}

// Known ATS vendors by URL marker. First hit wins.
const ATS_MARKERS: &[(&str, &str)] = &[
    ("greenhouse.io", "greenhouse"),
    ("lever.co", "lever"),
    ("myworkdayjobs.com", "workday"),
    ("ashbyhq.com", "ashby"),
    ("icims.com", "icims"),
];

/// Channel priority for an APPLY: explicit contact email, then a recognized
/// LinkedIn URL, then a known ATS vendor, else the generic portal flow.
pub fn pick_channel(candidate: &Candidate) -> Channel {
    if candidate
        .contact_email
        .as_deref()
        .is_some_and(|e| !e.trim().is_empty())
    {
        return Channel::Email;
    }
    if let Some(url) = candidate.url.as_deref() {
        let url_lower = url.to_lowercase();
        if url_lower.contains("linkedin.com") {
            return Channel::LinkedIn;
        }
        for (marker, vendor) in ATS_MARKERS {
            if url_lower.contains(marker) {
                return Channel::Ats {
                    vendor: vendor.to_string(),
                };
            }
        }
    }
    Channel::Portal
}

/// Decides whether and how to apply to one candidate job. Pure over the
/// injected history: no side effects, applied independently per job. Checks
/// run in a fixed order and the first match wins; blacklist and duplicate go
/// first because they are cheap and absolute.
pub fn route(
    candidate: &Candidate,
    history: &dyn History,
    config: &RouterConfig,
    now: DateTime<Utc>,
) -> Result<RoutingResult> {
    let company = candidate.company.trim();

    // 1. Blacklist. An empty company can't be a member of anything.
    if !company.is_empty() && history.is_blacklisted(company)? {
        return Ok(RoutingResult::skip(
            Decision::SkipBlacklist,
            format!("{} is blacklisted", company),
        ));
    }

    // 2. Duplicate against the recent-application cache.
    if !company.is_empty() {
        if let Some(hit) = history.find_duplicate(company, &candidate.title)? {
            return Ok(RoutingResult {
                decision: Decision::SkipDuplicate,
                reason: format!(
                    "already applied to \"{}\" at {} on {} (overlap {:.2})",
                    hit.normalized_title, company, hit.applied_at, hit.score
                ),
                channel: None,
                retry_after: None,
                matched_application: Some(hit.application_id),
            });
        }
    }

    // 3. Per-company caps: trailing 24h, trailing 7d, lifetime.
    let day_count = history.company_count_since(company, now - Duration::hours(24))?;
    if day_count >= config.max_per_company_day {
        return Ok(RoutingResult {
            retry_after: Some(start_of_next_day(now)),
            ..RoutingResult::skip(
                Decision::SkipLimit,
                format!(
                    "daily cap reached for {} ({}/{})",
                    company, day_count, config.max_per_company_day
                ),
            )
        });
    }
    let week_count = history.company_count_since(company, now - Duration::days(7))?;
    if week_count >= config.max_per_company_week {
        return Ok(RoutingResult {
            retry_after: Some(start_of_next_week(now)),
            ..RoutingResult::skip(
                Decision::SkipLimit,
                format!(
                    "weekly cap reached for {} ({}/{})",
                    company, week_count, config.max_per_company_week
                ),
            )
        });
    }
    let total = history.company_count_total(company)?;
    if total >= config.max_per_company_lifetime {
        return Ok(RoutingResult::skip(
            Decision::SkipLimit,
            format!(
                "lifetime cap reached for {} ({}/{})",
                company, total, config.max_per_company_lifetime
            ),
        ));
    }

    // 4. Cooldown: 30 days after a rejection, but only while the rejection
    // is still the company's most recent response; a later interview or
    // offer leaves just the 7-day re-apply window after any application.
    if let Some((ResponseType::Rejection, rejected_at)) = history.last_response(company)? {
        let until = rejected_at + Duration::days(config.rejection_cooldown_days);
        if now < until {
            return Ok(RoutingResult {
                retry_after: Some(until),
                ..RoutingResult::skip(
                    Decision::SkipCooldown,
                    format!("rejected by {} on {}", company, rejected_at.format("%Y-%m-%d")),
                )
            });
        }
    }
    if let Some(applied_at) = history.last_application_at(company)? {
        let until = applied_at + Duration::days(config.reapply_cooldown_days);
        if now < until {
            return Ok(RoutingResult {
                retry_after: Some(until),
                ..RoutingResult::skip(
                    Decision::SkipCooldown,
                    format!(
                        "applied to {} on {}, waiting out the re-apply window",
                        company,
                        applied_at.format("%Y-%m-%d")
                    ),
                )
            });
        }
    }

    // 5. Penalty score (read-only; accrual happens elsewhere).
    let penalty = history.penalty(company)?;
    if penalty >= config.penalty_high {
        return Ok(RoutingResult::skip(
            Decision::SkipPenalty,
            format!("penalty score {:.1} >= {:.1} for {}", penalty, config.penalty_high, company),
        ));
    }

    // 6. Global daily ceiling: not company-specific, so defer to tomorrow.
    let sent_today = history.global_count_since(start_of_today(now))?;
    if sent_today >= config.global_daily_cap {
        return Ok(RoutingResult {
            retry_after: Some(start_of_next_day(now)),
            ..RoutingResult::skip(
                Decision::Defer,
                format!(
                    "global daily cap reached ({}/{})",
                    sent_today, config.global_daily_cap
                ),
            )
        });
    }

    // 7. Apply.
    let channel = pick_channel(candidate);
    Ok(RoutingResult {
        decision: Decision::Apply,
        reason: format!("apply via {}", channel.label()),
        channel: Some(channel),
        retry_after: None,
        matched_application: None,
    })
}
