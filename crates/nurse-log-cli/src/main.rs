mod config;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Settings;
use nurse_log_core::bridge::{export_to_path, import_from_path};
use nurse_log_core::db::MigrationOutcome;
use nurse_log_core::tabular::InitOutcome;
use nurse_log_core::{Database, Field, PatientIdGenerator, RecordPatch, SheetRow, TabularFile};

#[derive(Parser)]
#[command(name = "nurse-log")]
#[command(about = "School nurse health log")]
struct Cli {
    /// Health log file (overrides NURSE_LOG_SHEET)
    #[arg(long, global = true)]
    sheet: Option<PathBuf>,

    /// SQLite store (overrides NURSE_LOG_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the health log with its header row
    Init,
    /// Add a record
    Add {
        /// JSON object keyed by column header
        #[arg(long)]
        data: String,
    },
    /// List all records
    List {
        #[arg(long)]
        json: bool,
    },
    /// Find records matching every given field
    Find {
        /// JSON object keyed by column header
        #[arg(long)]
        data: String,
        /// Whole-cell, case-sensitive comparison
        #[arg(long = "exact_match")]
        exact_match: bool,
        #[arg(long)]
        json: bool,
    },
    /// Update fields of one record
    Update {
        #[arg(long = "patient_id")]
        patient_id: String,
        /// JSON object keyed by column header
        #[arg(long)]
        data: String,
    },
    /// Delete one record
    Delete {
        #[arg(long = "patient_id")]
        patient_id: String,
    },
    /// Relational store maintenance
    #[command(subcommand)]
    Db(DbCommands),
}

#[derive(Subcommand)]
enum DbCommands {
    /// Show the schema version
    Status,
    /// Upgrade a legacy store to the current schema
    Migrate,
    /// Write every stored record to a CSV file
    Export {
        #[arg(long)]
        out: PathBuf,
    },
    /// Upsert records from a CSV file
    Import {
        #[arg(long)]
        input: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env().with_overrides(cli.db, cli.sheet);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nurse_log=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let sheet = TabularFile::new(&settings.sheet_path);
    let mut ids = PatientIdGenerator::new();

    match cli.command {
        Commands::Init => match sheet.init()? {
            InitOutcome::Created => println!("Created {}", sheet.path().display()),
            InitOutcome::Existing { headers_match } => {
                println!("{} already exists", sheet.path().display());
                if !headers_match {
                    eprintln!("Warning: its headers differ from the expected columns");
                }
            }
        },
        Commands::Add { data } => {
            let patch = parse_data(&data)?;
            let record = sheet.add(&patch, &mut ids)?;
            println!("Added record {}", record.patient_id);
        }
        Commands::List { json } => {
            let rows = sheet.list()?;
            print_rows(&rows, json)?;
        }
        Commands::Find {
            data,
            exact_match,
            json,
        } => {
            let criteria: Vec<(Field, String)> = parse_data(&data)?
                .iter()
                .filter_map(|(field, value)| value.map(|v| (field, v.to_string())))
                .collect();
            if criteria.is_empty() {
                bail!("--data must give at least one field with a value");
            }
            let rows = sheet.find(&criteria, exact_match)?;
            print_rows(&rows, json)?;
        }
        Commands::Update { patient_id, data } => {
            let patch = parse_data(&data)?;
            sheet.update(&patient_id, &patch)?;
            println!("Updated record {}", patient_id);
        }
        Commands::Delete { patient_id } => {
            sheet.delete(&patient_id)?;
            println!("Deleted record {}", patient_id);
        }
        Commands::Db(command) => run_db(command, &settings.db_path, &mut ids)?,
    }

    Ok(())
}

fn run_db(command: DbCommands, db_path: &Path, ids: &mut PatientIdGenerator) -> anyhow::Result<()> {
    let mut db = open_database(db_path)?;

    match command {
        DbCommands::Status => {
            let status = db.schema_status()?;
            println!("Store:           {}", db_path.display());
            println!("Schema version:  {}", status.current_version);
            println!("Target version:  {}", status.target_version);
            if status.is_current() {
                println!("Status:          up to date");
            } else {
                println!("Pending:         {:?}", status.pending_versions);
            }
            if status.inferred {
                println!("(version inferred from table shape)");
            }
        }
        DbCommands::Migrate => match db.migrate()? {
            MigrationOutcome::AlreadyCurrent => println!("Schema already current"),
            MigrationOutcome::Migrated { from, to, rows } => {
                println!("Migrated {} records from schema v{} to v{}", rows, from, to)
            }
        },
        DbCommands::Export { out } => {
            let summary = export_to_path(&db, &out)
                .with_context(|| format!("exporting to {}", out.display()))?;
            println!("Exported {} records to {}", summary.records, out.display());
            println!("sha256 {}", summary.sha256);
        }
        DbCommands::Import { input } => {
            let report = import_from_path(&mut db, &input, ids)
                .with_context(|| format!("importing {}", input.display()))?;
            println!(
                "Imported {}: {} inserted, {} updated, {} rows skipped",
                input.display(),
                report.inserted,
                report.updated,
                report.skipped_rows()
            );
            for error in &report.skipped {
                eprintln!("  row {}: '{}': {}", error.row, error.field, error.reason);
            }
        }
    }

    Ok(())
}

fn open_database(path: &Path) -> anyhow::Result<Database> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Database::open(path).with_context(|| format!("opening {}", path.display()))
}

fn parse_data(data: &str) -> anyhow::Result<RecordPatch> {
    RecordPatch::from_json_str(data).context("invalid --data")
}

fn print_rows(rows: &[SheetRow], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("No records found.");
        return Ok(());
    }
    for row in rows {
        println!(
            "{} | {} | {} {} | {}",
            row.patient_id(),
            row.get(Field::FullName),
            row.get(Field::DateOfVisit),
            row.get(Field::TimeOfVisit),
            row.get(Field::NurseName),
        );
    }
    println!("{} record(s)", rows.len());
    Ok(())
}
