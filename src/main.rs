mod db;
mod dedup;
mod feed;
mod models;
mod pacing;
mod router;
mod title;

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};

use db::{Database, StoreHistory};
use dedup::DuplicateCache;
use models::{Candidate, ResponseType};
use pacing::Pacer;
use router::{Decision, RouterConfig, RoutingResult};

#[derive(Parser)]
#[command(name = "pursuit")]
#[command(about = "Job application routing - decide, send, track, never double-apply")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Add a discovered job posting
    Add {
        /// Company name
        company: String,

        /// Position title
        title: String,

        /// Posting URL
        #[arg(short, long)]
        url: Option<String>,

        /// Where it was found (greenhouse, lever, linkedin, email, portal)
        #[arg(short, long)]
        source: Option<String>,

        /// Contact email, if the posting lists one
        #[arg(short, long)]
        contact_email: Option<String>,
    },

    /// Route one job through the decision checks without recording anything
    Route {
        /// Job ID to route (omit to route ad-hoc fields instead)
        job_id: Option<i64>,

        /// Company name (ad-hoc routing)
        #[arg(long)]
        company: Option<String>,

        /// Position title (ad-hoc routing)
        #[arg(long)]
        title: Option<String>,

        /// Posting URL
        #[arg(long)]
        url: Option<String>,

        /// Contact email
        #[arg(long)]
        contact_email: Option<String>,

        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Route a candidate feed and record applications for APPLY decisions
    Run {
        /// JSON-lines candidate feed
        #[arg(short, long)]
        feed: PathBuf,

        /// Show decisions without recording or pausing
        #[arg(long)]
        dry_run: bool,

        /// Hard cap on sends this run
        #[arg(short, long)]
        limit: Option<usize>,

        /// Skip the inter-send delays
        #[arg(long)]
        no_delay: bool,

        /// Use the unguarded check-then-insert sequence instead of one
        /// transaction per decision
        #[arg(long)]
        no_txn: bool,

        /// Override the global daily application cap
        #[arg(long)]
        global_cap: Option<u32>,
    },

    /// List discovered jobs
    Jobs {
        /// Filter by company
        #[arg(short, long)]
        company: Option<String>,

        /// Number of jobs to show
        #[arg(short, long, default_value = "25")]
        limit: usize,
    },

    /// Record an application made outside a run (e.g. by hand)
    Record {
        /// Company name
        company: String,

        /// Position title
        title: String,

        /// How it was sent (email, linkedin, portal, ats, manual)
        #[arg(short, long, default_value = "manual")]
        method: String,

        /// Job ID to link
        #[arg(short, long)]
        job_id: Option<i64>,
    },

    /// Attach a response to the most recent open application at a company
    Respond {
        /// Company name (fuzzy-matched against application history)
        company: String,

        /// rejection, interview, or offer
        response: String,

        /// Penalty added on a rejection
        #[arg(long, default_value = "3.0")]
        penalty: f64,
    },

    /// Manage companies
    Company {
        #[command(subcommand)]
        command: CompanyCommands,
    },

    /// List recorded applications
    History {
        /// Filter by company
        #[arg(short, long)]
        company: Option<String>,

        /// Number of applications to show
        #[arg(short, long, default_value = "25")]
        limit: usize,
    },

    /// Show overall counters
    Status,
}

#[derive(Subcommand)]
enum CompanyCommands {
    /// List companies
    List {
        /// Only blacklisted companies
        #[arg(long)]
        blacklisted: bool,
    },

    /// Blacklist a company (never apply)
    Block {
        /// Company name
        name: String,
    },

    /// Remove a company from the blacklist
    Unblock {
        /// Company name
        name: String,
    },

    /// Adjust a company's penalty score
    Penalty {
        /// Company name
        name: String,

        /// Amount to add (negative to reduce)
        delta: f64,
    },

    /// Show company details
    Show {
        /// Company name
        name: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let db = Database::open()?;

    match cli.command {
        Commands::Init => {
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Add {
            company,
            title,
            url,
            source,
            contact_email,
        } => {
            db.ensure_initialized()?;
            let candidate = Candidate {
                company,
                title,
                url,
                source,
                contact_email,
            };
            let job_id = db.add_job(&candidate, Utc::now())?;
            println!("Added job #{}", job_id);
        }

        Commands::Route {
            job_id,
            company,
            title,
            url,
            contact_email,
            json,
        } => {
            db.ensure_initialized()?;
            let candidate = match job_id {
                Some(id) => db
                    .get_job(id)?
                    .ok_or_else(|| anyhow!("Job #{} not found", id))?
                    .as_candidate(),
                None => Candidate {
                    company: company.ok_or_else(|| {
                        anyhow!("Provide a job id or --company and --title")
                    })?,
                    title: title.unwrap_or_default(),
                    url,
                    source: None,
                    contact_email,
                },
            };

            let config = RouterConfig::default();
            let now = Utc::now();
            let cache = load_cache(&db, &config)?;
            let view = StoreHistory {
                db: &db,
                cache: Some(&cache),
                config: &config,
                now,
            };
            let result = router::route(&candidate, &view, &config, now)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_decision(&candidate, &result);
                let canonical = title::canonicalize(&candidate.title);
                println!(
                    "normalized title: \"{}\" (seniority: {:?})",
                    canonical.normalized(),
                    canonical.seniority
                );
            }
        }

        Commands::Run {
            feed,
            dry_run,
            limit,
            no_delay,
            no_txn,
            global_cap,
        } => {
            db.ensure_initialized()?;
            let mut config = RouterConfig::default();
            if let Some(cap) = global_cap {
                config.global_daily_cap = cap;
            }
            run_batch(&db, &feed, &config, dry_run, limit, no_delay, no_txn)?;
        }

        Commands::Jobs { company, limit } => {
            db.ensure_initialized()?;
            let jobs = db.list_jobs(company.as_deref(), limit)?;
            if jobs.is_empty() {
                println!("No jobs found.");
            } else {
                println!(
                    "{:<6} {:<20} {:<30} {:<12} {:<20}",
                    "ID", "COMPANY", "TITLE", "SOURCE", "DISCOVERED"
                );
                println!("{}", "-".repeat(90));
                for job in jobs {
                    println!(
                        "{:<6} {:<20} {:<30} {:<12} {:<20}",
                        job.id,
                        truncate(&job.company, 18),
                        truncate(&job.title, 28),
                        job.source.as_deref().unwrap_or("-"),
                        job.discovered_at
                    );
                }
            }
        }

        Commands::Record {
            company,
            title,
            method,
            job_id,
        } => {
            db.ensure_initialized()?;
            let app_id = db.record_application(job_id, &company, &title, &method, Utc::now())?;
            println!("Recorded application #{} to {} ({})", app_id, company, method);
        }

        Commands::Respond {
            company,
            response,
            penalty,
        } => {
            db.ensure_initialized()?;
            let response = ResponseType::parse(&response)
                .ok_or_else(|| anyhow!("Unknown response type '{}'. Use rejection, interview, or offer", response))?;
            match db.attach_response(&company, response, Utc::now(), penalty)? {
                Some((matched, app_id)) => {
                    println!(
                        "Recorded {} from {} on application #{}",
                        response.as_str(),
                        matched,
                        app_id
                    );
                    if response == ResponseType::Rejection {
                        let score = db.company_penalty(&matched)?;
                        println!("Penalty score for {} is now {:.1}", matched, score);
                    }
                }
                None => {
                    println!("No open application matched '{}'.", company);
                }
            }
        }

        Commands::Company { command } => {
            db.ensure_initialized()?;
            match command {
                CompanyCommands::List { blacklisted } => {
                    let companies = db.list_companies(blacklisted)?;
                    if companies.is_empty() {
                        println!("No companies found.");
                    } else {
                        println!(
                            "{:<6} {:<28} {:>8} {:<6} {:>6} {:>6}",
                            "ID", "NAME", "PENALTY", "BLOCK", "APPS", "RESP"
                        );
                        println!("{}", "-".repeat(66));
                        for c in companies {
                            println!(
                                "{:<6} {:<28} {:>8.1} {:<6} {:>6} {:>6}",
                                c.id,
                                truncate(&c.name, 26),
                                c.penalty_score,
                                if c.blacklisted { "yes" } else { "-" },
                                c.total_applications,
                                c.total_responses
                            );
                        }
                    }
                }

                CompanyCommands::Block { name } => {
                    db.set_blacklisted(&name, true)?;
                    println!("Blacklisted '{}'.", name);
                }

                CompanyCommands::Unblock { name } => {
                    db.set_blacklisted(&name, false)?;
                    println!("Removed '{}' from the blacklist.", name);
                }

                CompanyCommands::Penalty { name, delta } => {
                    let score = db.adjust_penalty(&name, delta)?;
                    println!("Penalty score for '{}' is now {:.1}", name, score);
                }

                CompanyCommands::Show { name } => match db.get_company_by_name(&name)? {
                    Some(c) => {
                        println!("Company #{}", c.id);
                        println!("Name: {}", c.name);
                        println!("Penalty score: {:.1}", c.penalty_score);
                        println!("Blacklisted: {}", if c.blacklisted { "yes" } else { "no" });
                        println!(
                            "Applications: {} ({} responses)",
                            c.total_applications, c.total_responses
                        );
                        if let Some(notes) = &c.notes {
                            println!("Notes: {}", notes);
                        }
                        let apps = db.list_applications(Some(&c.name), 10)?;
                        if !apps.is_empty() {
                            println!("\nRecent applications:");
                            for app in apps {
                                let response = app.response_type.as_deref().unwrap_or("-");
                                println!(
                                    "  #{} {} via {} ({}) response: {}",
                                    app.id, app.normalized_title, app.method, app.applied_at, response
                                );
                            }
                        }
                    }
                    None => {
                        println!("Company '{}' not found.", name);
                    }
                },
            }
        }

        Commands::History { company, limit } => {
            db.ensure_initialized()?;
            let apps = db.list_applications(company.as_deref(), limit)?;
            if apps.is_empty() {
                println!("No applications found.");
            } else {
                println!(
                    "{:<6} {:<20} {:<26} {:<10} {:<20} {:<10}",
                    "ID", "COMPANY", "TITLE", "METHOD", "APPLIED", "RESPONSE"
                );
                println!("{}", "-".repeat(96));
                for app in apps {
                    println!(
                        "{:<6} {:<20} {:<26} {:<10} {:<20} {:<10}",
                        app.id,
                        truncate(&app.company, 18),
                        truncate(&app.normalized_title, 24),
                        app.method,
                        app.applied_at,
                        app.response_type.as_deref().unwrap_or("-")
                    );
                }
            }
        }

        Commands::Status => {
            db.ensure_initialized()?;
            let counts = db.status_counts(Utc::now())?;
            println!("Jobs discovered:    {}", counts.jobs);
            println!("Applications:       {}", counts.applications);
            println!("  sent today:       {}", counts.applications_today);
            println!("Responses:          {}", counts.responses);
        }
    }

    Ok(())
}

fn load_cache(db: &Database, config: &RouterConfig) -> Result<DuplicateCache> {
    let since = Utc::now() - Duration::days(config.lookback_days);
    let rows = db.recent_applications(since)?;
    Ok(DuplicateCache::from_rows(rows, config.fuzzy_threshold))
}

fn run_batch(
    db: &Database,
    feed_path: &std::path::Path,
    config: &RouterConfig,
    dry_run: bool,
    limit: Option<usize>,
    no_delay: bool,
    no_txn: bool,
) -> Result<()> {
    let (candidates, feed_stats) = feed::load_candidates(feed_path)?;
    println!(
        "Feed: {} candidates ({} lines, {} skipped)",
        feed_stats.parsed, feed_stats.lines, feed_stats.skipped
    );

    let mut cache = load_cache(db, config)?;
    println!("Duplicate cache primed with {} recent applications", cache.len());
    let pacer = Pacer::default();
    let mut sent = 0usize;
    let mut skipped = 0usize;
    let mut deferred = 0usize;
    let mut errors = 0usize;

    for candidate in &candidates {
        if let Some(cap) = limit {
            if sent >= cap {
                println!("Send cap ({}) reached, stopping.", cap);
                break;
            }
        }

        let now = Utc::now();
        let outcome = if dry_run || no_txn {
            // Unguarded route; the source's original check-then-act shape.
            let view = StoreHistory {
                db,
                cache: Some(&cache),
                config,
                now,
            };
            router::route(candidate, &view, config, now).map(|result| {
                let record = result.decision == Decision::Apply && !dry_run;
                (result, record)
            })
        } else {
            db.route_and_record(None, candidate, config, now)
                .map(|(result, app_id)| {
                    // Already recorded inside the transaction
                    if let Some(id) = app_id {
                        cache.insert(id, &candidate.company, &candidate.title, &db::format_ts(now));
                    }
                    (result, false)
                })
        };

        let (result, record_now) = match outcome {
            Ok(pair) => pair,
            Err(e) => {
                errors += 1;
                eprintln!(
                    "[INFRA_ERROR] {} - {}: {:#}",
                    candidate.company, candidate.title, e
                );
                continue;
            }
        };

        print_decision(candidate, &result);

        match result.decision {
            Decision::Apply => {
                if record_now {
                    // --no-txn path: record after the fact, outside any
                    // transaction with the checks above.
                    let method = result
                        .channel
                        .as_ref()
                        .map(|c| c.method())
                        .unwrap_or("portal");
                    match db.record_application(None, &candidate.company, &candidate.title, method, now)
                    {
                        Ok(id) => {
                            cache.insert(id, &candidate.company, &candidate.title, &db::format_ts(now));
                        }
                        Err(e) => {
                            errors += 1;
                            eprintln!("  failed to record: {:#}", e);
                            continue;
                        }
                    }
                } else if dry_run {
                    // Keep the in-pass dedup honest even when nothing is
                    // written: a second equivalent candidate must skip.
                    sent += 1;
                    cache.insert(
                        -(sent as i64),
                        &candidate.company,
                        &candidate.title,
                        &db::format_ts(now),
                    );
                    continue;
                }
                sent += 1;
                if !no_delay && !dry_run {
                    pacer.pause_after(sent);
                }
            }
            Decision::Defer => deferred += 1,
            _ => skipped += 1,
        }
    }

    println!("\nRun complete:");
    println!("  applied:  {}", sent);
    println!("  skipped:  {}", skipped);
    println!("  deferred: {}", deferred);
    if errors > 0 {
        println!("  errors:   {}", errors);
    }
    if dry_run {
        println!("(Dry run - nothing was recorded)");
    }
    Ok(())
}

fn print_decision(candidate: &Candidate, result: &RoutingResult) {
    let RoutingResult {
        decision,
        reason,
        channel,
        retry_after,
        ..
    } = result;
    let mut line = format!(
        "[{}] {} - {}",
        decision.as_str(),
        if candidate.company.trim().is_empty() {
            "(unknown company)"
        } else {
            candidate.company.as_str()
        },
        candidate.title
    );
    if let Some(channel) = channel {
        line.push_str(&format!(" -> {}", channel.label()));
    }
    line.push_str(&format!(" ({})", reason));
    if let Some(retry) = retry_after {
        line.push_str(&format!(", retry after {}", retry.format("%Y-%m-%d %H:%M")));
    }
    println!("{}", line);
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_strings_unchanged() {
        assert_eq!(truncate("Acme", 10), "Acme");
        assert_eq!(truncate("", 10), "");
    }

    #[test]
    fn test_truncate_long_strings() {
        assert_eq!(truncate("Software Engineer", 10), "Softwar...");
    }

    #[test]
    fn test_truncate_multibyte_names() {
        // Company names with non-ASCII characters must cut on char
        // boundaries, not bytes.
        assert_eq!(truncate("Müller & Söhne GmbH", 10), "Müller ...");
        assert_eq!(truncate("株式会社テクノロジー", 8), "株式会社テ...");
        assert_eq!(truncate("Café", 10), "Café");
    }
}
