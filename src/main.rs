use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{arg, value_parser, Arg, ArgMatches, Command};
use sea_orm::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::ConnectionTarget;
use crate::coords::TmConverter;
use crate::error::{ImportError, Result};
use crate::loader::DEFAULT_BATCH_SIZE;

mod batch_insert;
mod config;
mod coords;
mod encoding;
mod entities;
mod error;
mod loader;
mod parser;
mod record;

fn cli() -> Command {
    Command::new("import_funeral_homes")
        .about("Imports the public pet funeral-home CSV into the funeral_homes table, replacing its contents.\nTM coordinates (EPSG:5174) are converted to WGS84 latitude/longitude.")
        .arg(arg!([CSV_PATH] "CSV file exported from the open-data portal").value_parser(value_parser!(PathBuf)))
        .arg(arg!(--db <DATABASE_URL> "Connection URL, overrides the DB_* variables").required(false))
        .arg(
            arg!(--"batch-size" <ROWS> "Rows per INSERT statement")
                .value_parser(value_parser!(u64).range(1..))
                .default_value("1000"),
        )
        .arg(env_arg("db_host", "db-host", "DB_HOST", Some("localhost")))
        .arg(env_arg("db_port", "db-port", "DB_PORT", Some("5432")))
        .arg(env_arg("db_name", "db-name", "DB_NAME", Some("petpro")))
        .arg(env_arg("db_user", "db-user", "DB_USER", Some("petpro")))
        .arg(env_arg("db_password", "db-password", "DB_PASSWORD", None).hide_env_values(true))
}

fn env_arg(
    id: &'static str,
    long: &'static str,
    var: &'static str,
    default: Option<&'static str>,
) -> Arg {
    let arg = Arg::new(id)
        .long(long)
        .env(var)
        .hide(true);

    match default {
        Some(value) => arg.default_value(value),
        None => arg,
    }
}

async fn run(matches: &ArgMatches) -> Result<()> {
    let csv_path = matches
        .get_one::<PathBuf>("CSV_PATH")
        .ok_or(ImportError::Usage)?;
    if !csv_path.exists() {
        return Err(ImportError::FileNotFound(csv_path.clone()));
    }
    let batch_size = matches
        .get_one::<u64>("batch-size")
        .map_or(DEFAULT_BATCH_SIZE, |&rows| rows as usize);

    println!("CSV 파일: {}", csv_path.display());
    println!("{}", "=".repeat(50));

    let converter = TmConverter::new()?;
    let parsed = parser::parse_csv(csv_path, &converter)?;
    if parsed.records.is_empty() {
        return Err(ImportError::NoRecords);
    }

    let target = ConnectionTarget::from_matches(matches)?;
    println!("DB 연결: {}", target.label);

    let db = Database::connect(target.connect_options()).await?;
    let summary = loader::import_records(&db, parsed.records, batch_size).await?;
    db.close().await?;

    println!("{summary}");
    info!(encoding = %parsed.encoding, "import finished");

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let matches = match cli().try_get_matches() {
        Ok(matches) => matches,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            println!("{err}");
            return ExitCode::FAILURE;
        }
    };

    match run(&matches).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            println!("{err}");
            ExitCode::FAILURE
        }
    }
}
