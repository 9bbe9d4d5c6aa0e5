pub mod catalog;
pub mod config;
pub mod indexer;
pub mod keywords;
pub mod model;
pub mod search;
pub mod storage;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;

use catalog::CatalogKind;
use config::{ConfigError, SearchConfig};
use indexer::ImportOptions;
use keywords::{Keyword, KeywordSet};
use model::types::{Course, CourseKey, Weekday};
use search::backend::CatalogFilter;
use search::error::SearchError;
use search::executor::SearchExecutor;
use search::fields::FieldTag;
use search::filters::{CourseFilters, TimeWindow};
use search::normalize::NormalizeReport;
use search::session::{PendingSearch, SearchOutcome, SearchSession};
use search::sqlite::SqliteBackend;

pub const DB_FILE_NAME: &str = "courses.db";

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "csearch",
    version,
    about = "Keyword-weighted search over an academic course catalog"
)]
pub struct Cli {
    /// Path to the SQLite database (defaults to platform data dir)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Machine-readable output; errors are printed as JSON too
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Keyword search, best matches first
    Search {
        /// Keywords; each one is matched on its own
        keywords: Vec<String>,

        /// Field the keywords apply to (repeatable; defaults to title and description)
        #[arg(long = "field", short = 'f')]
        fields: Vec<FieldTag>,

        /// Weight 1-9 for the positional keywords
        #[arg(long, short = 'w')]
        weight: Option<u8>,

        /// JSON array of keywords: {"text", "weight", "applyTo", "active"}
        #[arg(long)]
        keywords_file: Option<PathBuf>,

        /// Term token as listed by `catalog terms`, e.g. Fall_2026
        #[arg(long)]
        term: Option<String>,

        /// School (academic group)
        #[arg(long)]
        group: Option<String>,

        #[arg(long)]
        subject: Option<String>,

        /// Component, e.g. LEC or SEM
        #[arg(long)]
        component: Option<String>,

        /// Meeting day, optionally bounded: `mon` or `mon:09:00-12:00` (repeatable)
        #[arg(long = "day", value_parser = parse_day_filter)]
        days: Vec<(Weekday, TimeWindow)>,

        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,

        /// Print the compiled query instead of running it
        #[arg(long)]
        explain: bool,
    },
    /// Fetch courses by identity: EXTERNAL_ID:TERM:YEAR:SECTION
    Lookup {
        #[arg(required = true)]
        keys: Vec<CourseKey>,
    },
    /// List filter choices
    Catalog {
        #[arg(value_enum)]
        kind: CatalogKind,

        /// Narrow subject groups to a school
        #[arg(long)]
        group: Option<String>,

        /// Narrow subject groups to a term token
        #[arg(long)]
        term: Option<String>,

        /// `DAY_min=HH:MM` / `DAY_max=HH:MM` bounds for `schedule`
        #[arg(long = "bound")]
        bounds: Vec<String>,
    },
    /// Load course trees from a JSON array or JSON Lines file
    Import {
        file: PathBuf,

        /// Rebuild the full-text tables afterwards
        #[arg(long)]
        rebuild_fts: bool,
    },
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man page to stdout
    Man,
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "csearch", &mut std::io::stdout());
            Ok(())
        }
        Commands::Man => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            let mut out = std::io::stdout();
            man.render(&mut out)?;
            Ok(())
        }
        Commands::Import {
            ref file,
            rebuild_fts,
        } => {
            let config = load_config(&cli)?;
            let report = indexer::run_import(&ImportOptions {
                db_path: config.db_path,
                source: file.clone(),
                rebuild_fts,
            })?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "imported {} courses ({} new, {} replaced, {} rejected)",
                    report.read,
                    report.inserted,
                    report.replaced,
                    report.rejected.len()
                );
            }
            Ok(())
        }
        Commands::Search {
            ref keywords,
            ref fields,
            weight,
            ref keywords_file,
            ref term,
            ref group,
            ref subject,
            ref component,
            ref days,
            limit,
            explain,
        } => {
            let config = load_config(&cli)?;
            let mut set = match keywords_file {
                Some(path) => read_keywords_file(path)?,
                None => KeywordSet::new(),
            };
            let weight = weight.unwrap_or(config.default_weight);
            for text in keywords {
                let keyword = Keyword::new(text.as_str(), weight)
                    .with_context(|| format!("keyword `{text}`"))?
                    .with_fields(fields.iter().copied());
                set.add(keyword);
            }

            let mut filters = CourseFilters {
                academic_group: group.clone(),
                subject: subject.clone(),
                component: component.clone(),
                days: days.iter().copied().collect(),
                ..CourseFilters::default()
            };
            if let Some(token) = term {
                filters = filters.with_term_token(token).map_err(anyhow::Error::msg)?;
            }

            let mut session = SearchSession::with_keywords(set);
            session.set_filters(filters);
            if explain {
                println!("{}", serde_json::to_string_pretty(&session.compiled())?);
                return Ok(());
            }

            let limit = limit.unwrap_or(config.result_limit);
            let pending = session.begin_search();
            let report = execute(&mut session, pending, &config, limit).await?;
            print_courses(&report, cli.json)
        }
        Commands::Lookup { ref keys } => {
            let config = load_config(&cli)?;
            let mut session = SearchSession::new();
            let pending = session.begin_lookup(keys.iter().cloned());
            let report = execute(&mut session, pending, &config, config.result_limit).await?;
            print_courses(&report, cli.json)
        }
        Commands::Catalog {
            kind,
            ref group,
            ref term,
            ref bounds,
        } => {
            match kind {
                CatalogKind::KeywordOptions => {
                    return print_json_or_lines(&catalog::keyword_options(), cli.json, |o| {
                        let marker = if o.default { " (default)" } else { "" };
                        format!("{}{marker}", o.display)
                    });
                }
                CatalogKind::Schedule => {
                    let values = parse_bounds(bounds)?;
                    let map = catalog::schedule_filter_map(&values)?;
                    let rows: Vec<_> = map.into_iter().collect();
                    return print_json_or_lines(&rows, cli.json, |(day, window)| {
                        format!("{}\t{}", day.as_str(), window_label(window))
                    });
                }
                _ => {}
            }

            let mut filter = CatalogFilter {
                academic_group: group.clone(),
                ..CatalogFilter::default()
            };
            if let Some(token) = term {
                let parsed = CourseFilters::default()
                    .with_term_token(token)
                    .map_err(anyhow::Error::msg)?;
                filter.term_name = parsed.term_name;
                filter.term_year = parsed.term_year;
            }
            let config = load_config(&cli)?;
            let backend = open_backend(&config)?;
            let values = catalog::list(&backend, kind, &filter)?;
            print_json_or_lines(&values, cli.json, |v| v.clone())
        }
    }
}

fn load_config(cli: &Cli) -> Result<SearchConfig> {
    let mut config = SearchConfig::load(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    Ok(config)
}

fn open_backend(config: &SearchConfig) -> Result<SqliteBackend> {
    SqliteBackend::open(&config.db_path)
        .map_err(SearchError::from)
        .with_context(|| format!("opening catalog at {}", config.db_path.display()))
}

async fn execute(
    session: &mut SearchSession,
    pending: PendingSearch,
    config: &SearchConfig,
    limit: usize,
) -> Result<NormalizeReport> {
    // An empty keyword query succeeds without touching the catalog.
    let result = if pending.request.mode()?.is_none() {
        Ok(Vec::new())
    } else {
        let backend = open_backend(config)?;
        let executor = Arc::new(SearchExecutor::new(backend).with_limit(limit));
        executor
            .execute_with_timeout(pending.request, config.backend_timeout)
            .await
    };
    match session.complete_search(pending.ticket, result)? {
        SearchOutcome::Applied(report) => Ok(report),
        SearchOutcome::Stale => Ok(NormalizeReport::default()),
    }
}

fn read_keywords_file(path: &std::path::Path) -> Result<KeywordSet> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading keywords file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing keywords file {}", path.display()))
}

/// `mon` or `mon:09:00-12:00`.
pub fn parse_day_filter(s: &str) -> std::result::Result<(Weekday, TimeWindow), String> {
    match s.split_once(':') {
        Some((day, window)) => Ok((day.parse()?, window.parse()?)),
        None => Ok((s.parse()?, TimeWindow::any())),
    }
}

fn parse_bounds(bounds: &[String]) -> Result<BTreeMap<String, String>> {
    bounds
        .iter()
        .map(|b| {
            b.split_once('=')
                .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
                .with_context(|| format!("expected KEY=VALUE, got `{b}`"))
        })
        .collect()
}

fn window_label(w: &TimeWindow) -> String {
    let side = |v: Option<u16>| v.map(model::types::clock).unwrap_or_default();
    format!("{}-{}", side(w.min), side(w.max))
}

fn print_json_or_lines<T: serde::Serialize>(
    items: &[T],
    json: bool,
    line: impl Fn(&T) -> String,
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(items)?);
    } else {
        for item in items {
            println!("{}", line(item));
        }
    }
    Ok(())
}

fn print_courses(report: &NormalizeReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&report.courses)?);
        return Ok(());
    }
    if report.courses.is_empty() {
        println!("{}", "no matching courses".dimmed());
    }
    for course in &report.courses {
        print_course(course);
    }
    if !report.skipped.is_empty() {
        eprintln!(
            "{}",
            format!("{} malformed result(s) skipped", report.skipped.len()).yellow()
        );
    }
    Ok(())
}

fn print_course(course: &Course) {
    let score = course
        .score
        .map(|s| format!("{s:>7.2}"))
        .unwrap_or_else(|| "      -".to_string());
    println!(
        "{}  {}  {}  {}",
        score.cyan(),
        course.subject_and_catalog().bold(),
        course.title.as_deref().unwrap_or("(untitled)"),
        format!("[{}, sec {}]", course.semester, course.class_section).dimmed()
    );
    let instructors: Vec<String> = course
        .course_instructors
        .iter()
        .map(|i| i.label())
        .filter(|l| !l.is_empty())
        .collect();
    if !instructors.is_empty() {
        println!("         {}", instructors.join(", ").dimmed());
    }
    for block in &course.schedule {
        println!("         {block}");
    }
}

/// Stable machine-readable code for an error surfaced by [`run`].
pub fn error_code(err: &anyhow::Error) -> &'static str {
    if let Some(e) = err.downcast_ref::<SearchError>() {
        return e.code();
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return "config_error";
    }
    if err.downcast_ref::<keywords::KeywordError>().is_some() {
        return "invalid_keyword";
    }
    "error"
}

pub fn default_db_path() -> PathBuf {
    default_data_dir().join(DB_FILE_NAME)
}

pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("org", "course-search", "course-search")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".course-search"))
}
