//! CLI entry point: run one insight scan (or a retention sweep) against a
//! feedback database and print the summary as JSON.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use feedback_pulse::{generate_for_scope, FeedbackDb};

struct Args {
    db_path: PathBuf,
    scope: Option<String>,
    days: i64,
    sweep: Option<i64>,
}

const USAGE: &str = "usage: pulse-scan <db-path> [--scope TENANT_ID] [--days N] [--sweep DAYS]

  --scope TENANT_ID  scan one tenant instead of the whole database
  --days N           lookback window in days (default 30)
  --sweep DAYS       instead of scanning, deactivate insights resolved
                     more than DAYS days ago";

fn parse_args() -> Result<Args, String> {
    let mut args = env::args().skip(1);
    let db_path = match args.next() {
        Some(path) if !path.starts_with("--") => PathBuf::from(path),
        _ => return Err("missing <db-path>".to_string()),
    };

    let mut parsed = Args {
        db_path,
        scope: None,
        days: 30,
        sweep: None,
    };

    while let Some(flag) = args.next() {
        let mut value = || {
            args.next()
                .ok_or_else(|| format!("{} requires a value", flag))
        };
        match flag.as_str() {
            "--scope" => parsed.scope = Some(value()?),
            "--days" => {
                parsed.days = value()?
                    .parse()
                    .map_err(|_| "--days must be a positive integer".to_string())?;
            }
            "--sweep" => {
                parsed.sweep = Some(
                    value()?
                        .parse()
                        .map_err(|_| "--sweep must be a positive integer".to_string())?,
                );
            }
            other => return Err(format!("unknown flag: {}", other)),
        }
    }

    if parsed.days <= 0 {
        return Err("--days must be a positive integer".to_string());
    }
    if parsed.sweep.is_some_and(|d| d <= 0) {
        return Err("--sweep must be a positive integer".to_string());
    }
    Ok(parsed)
}

fn run(args: &Args) -> Result<(), String> {
    let db = FeedbackDb::open_at(&args.db_path).map_err(|e| e.to_string())?;

    if let Some(older_than_days) = args.sweep {
        let swept = db
            .deactivate_resolved_insights(older_than_days)
            .map_err(|e| e.to_string())?;
        println!("{{\"deactivated\": {}}}", swept);
        return Ok(());
    }

    let summary = generate_for_scope(&db, args.scope.as_deref(), args.days)
        .map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("error: {}\n\n{}", err, USAGE);
            return ExitCode::FAILURE;
        }
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
