//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `rowkeep_core` linkage end to end against an in-memory database.
//! - Keep output deterministic for quick local sanity checks.
//!
//! `--log-dir <dir>` (or `ROWKEEP_LOG_DIR`) also writes the demo's data-layer
//! events to rolling log files; `ROWKEEP_LOG_LEVEL` overrides the level.

use rowkeep_core::logging::{ENV_LOG_DIR, ENV_LOG_LEVEL};
use rowkeep_core::{
    default_log_level, init_logging, open_db_in_memory, CrudRepository, DataConfig,
    LoggingError, Member, MemberRepository, PageRequest, RepoResult, Session, Sort, Team,
    TeamRepository,
};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("rowkeep_core ping={}", rowkeep_core::ping());
    println!("rowkeep_core version={}", rowkeep_core::core_version());

    match start_logging() {
        Ok(Some(dir)) => println!("logging dir={}", dir.display()),
        Ok(None) => {}
        Err(err) => {
            eprintln!("rowkeep logging failed: {err}");
            return ExitCode::FAILURE;
        }
    }

    match run_demo() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("rowkeep demo failed: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Starts file logging when a log directory was given; relative directories
/// resolve against the working directory.
fn start_logging() -> Result<Option<PathBuf>, LoggingError> {
    let from_args = std::env::args()
        .skip(1)
        .skip_while(|arg| arg != "--log-dir")
        .nth(1);
    let Some(dir) = from_args
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(ENV_LOG_DIR).map(PathBuf::from))
    else {
        return Ok(None);
    };
    let dir = match std::env::current_dir() {
        Ok(cwd) if dir.is_relative() => cwd.join(dir),
        _ => dir,
    };

    let level = std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| default_log_level().to_string());
    init_logging(&level, &dir)?;
    Ok(Some(dir))
}

fn run_demo() -> RepoResult<()> {
    let conn = open_db_in_memory()?;
    let config = DataConfig::default();
    let mut session = Session::new(&conn, &config)?;
    let members = MemberRepository::try_new()?;
    let teams = TeamRepository::try_new()?;

    let team = teams.save(&mut session, Team::new("teamA"))?;
    let team = team.cloned();
    for (username, age) in [("AAA", 10), ("BBB", 19), ("CCC", 20), ("DDD", 21), ("EEE", 40)] {
        members.save(&mut session, Member::with_team(username, age, &team))?;
    }
    session.flush()?;

    let request = PageRequest::of(0, 3).with_sort(Sort::desc("username"));
    let page = members.find_page(&mut session, &request)?;
    println!(
        "page number={} size={} total_elements={} total_pages={}",
        page.number(),
        page.size(),
        page.total_elements(),
        page.total_pages()
    );
    for member in page.content() {
        let member = member.borrow();
        println!("member username={} age={}", member.username, member.age);
    }

    let updated = members.bulk_age_plus(&mut session, 20)?;
    println!("bulk_age_plus rows={updated}");
    Ok(())
}
