use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use photo_ledger::backup::{create_backup, default_backup_name, write_backup};
use photo_ledger::config::{LedgerConfig, DEFAULT_CONFIG_FILE};
use photo_ledger::contacts::{read_contacts_file, validate_contacts};
use photo_ledger::db::{
    apply_contact_report, apply_deletion_plan, import_entries, load_labels, load_relations,
    load_skaters, setup_database,
};
use photo_ledger::extractor::{extract_file, SectionFilter};
use photo_ledger::handoff::{export_entries_csv, read_plan, write_plan};
use photo_ledger::resolver::{remaining_duplicates, DuplicateResolver};

#[derive(Parser)]
#[command(name = "photo-ledger", version, about = "Skater request import and duplicate cleanup")]
struct Cli {
    /// Config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// SQLite database (overrides config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a requests file and print the entries as JSON
    Parse {
        file: PathBuf,
        /// Section to extract, or "All"
        #[arg(long)]
        section: Option<String>,
    },
    /// Import a requests file into the store
    Import {
        file: PathBuf,
        competition: String,
        #[arg(long)]
        section: Option<String>,
    },
    /// Export parsed entries to CSV
    Export {
        file: PathBuf,
        output: PathBuf,
        #[arg(long)]
        section: Option<String>,
    },
    /// Find duplicate relations and write a deletion plan
    Investigate {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Execute a deletion plan
    Cleanup {
        #[arg(long)]
        plan: Option<PathBuf>,
    },
    /// Match a contacts CSV against stored skaters
    ValidateContacts {
        csv: PathBuf,
        /// Write families and emails (default is a dry run)
        #[arg(long)]
        execute: bool,
    },
    /// Snapshot every table to JSON
    Backup {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = LedgerConfig::load_from(&cli.config)?;

    // Diagnostics to stderr; progress output stays on stdout
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(notice) = LedgerConfig::missing_config_notice(&cli.config) {
        tracing::info!("{}", notice);
    }

    let db_path = cli.db.clone().unwrap_or_else(|| config.db_path());
    let section = |flag: Option<String>| {
        SectionFilter::from(flag.as_deref().unwrap_or(&config.import.section))
    };

    match cli.command {
        Command::Parse { file, section: flag } => run_parse(&file, section(flag))?,
        Command::Import {
            file,
            competition,
            section: flag,
        } => run_import(&db_path, &file, &competition, section(flag))?,
        Command::Export {
            file,
            output,
            section: flag,
        } => run_export(&file, &output, section(flag))?,
        Command::Investigate { out } => {
            run_investigate(&db_path, &out.unwrap_or_else(|| config.plan_path()))?
        }
        Command::Cleanup { plan } => {
            run_cleanup(&db_path, &plan.unwrap_or_else(|| config.plan_path()))?
        }
        Command::ValidateContacts { csv, execute } => {
            run_validate_contacts(&db_path, &csv, execute)?
        }
        Command::Backup { out } => {
            let out = out.unwrap_or_else(|| {
                config
                    .backup_dir()
                    .join(default_backup_name(&Local::now().naive_local()))
            });
            run_backup(&db_path, &out, &config.storage.database)?
        }
    }

    Ok(())
}

fn open_store(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

fn run_parse(file: &Path, filter: SectionFilter) -> Result<()> {
    let entries = extract_file(file, filter)?;
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn run_import(db_path: &Path, file: &Path, competition: &str, filter: SectionFilter) -> Result<()> {
    println!("📖 Parsing {} (section: {})...", file.display(), filter);
    let entries = extract_file(file, filter)?;
    println!("   Found {} skaters", entries.len());

    println!("\n💾 Importing (competition: {})...", competition);
    let mut conn = open_store(db_path)?;
    let summary = import_entries(&mut conn, &entries, competition)?;

    println!(
        "✅ Imported {} skaters with {} event relationships ({} events)",
        summary.skaters, summary.relations, summary.events
    );

    Ok(())
}

fn run_export(file: &Path, output: &Path, filter: SectionFilter) -> Result<()> {
    let entries = extract_file(file, filter)?;
    export_entries_csv(output, &entries)?;
    println!("✓ Wrote {} entries to {}", entries.len(), output.display());
    Ok(())
}

fn run_investigate(db_path: &Path, out: &Path) -> Result<()> {
    let conn = open_store(db_path)?;

    println!("Loading all competed_in relations...");
    let relations = load_relations(&conn)?;
    println!("Found {} total competed_in records\n", relations.len());

    let resolver = DuplicateResolver::with_labels(load_labels(&conn)?);
    let plan = resolver.plan(&relations)?;

    println!("{}", "=".repeat(80));
    println!("DUPLICATE ANALYSIS");
    println!("{}", "=".repeat(80));
    println!("{}", plan.summary());

    if plan.is_empty() {
        println!("\n✅ No duplicates found!");
        return Ok(());
    }

    for group in &plan.groups {
        println!(
            "\n📌 DUPLICATE: {} at {}",
            group.subject_label, group.target_label
        );
        println!("   KEEP:   {} (score {})", group.keep.id, group.keep.score);
        for deleted in &group.delete {
            println!("   DELETE: {} (score {})", deleted.id, deleted.score);
        }
    }

    write_plan(out, &plan.items)?;
    println!("\n💾 Deletion plan saved to: {}", out.display());
    println!("   Review it, take a backup, then run: photo-ledger cleanup");

    Ok(())
}

fn run_cleanup(db_path: &Path, plan_path: &Path) -> Result<()> {
    let items = read_plan(plan_path)?;
    println!("Loaded deletion plan: {} records to delete\n", items.len());

    let conn = open_store(db_path)?;
    let report = apply_deletion_plan(&conn, &items)?;

    println!("{}", "=".repeat(80));
    println!("CLEANUP COMPLETE");
    println!("{}", "=".repeat(80));
    println!("\nRecords BEFORE: {}", report.before);
    println!("Records AFTER: {}", report.after);
    println!("Records DELETED: {}", report.deleted);
    println!("Expected deletion: {}", report.planned);
    println!("Failed deletions: {}", report.failed.len());

    if report.all_deleted() {
        println!("\n✅ All planned deletions executed successfully!");
    } else {
        println!("\n⚠️  Some deletions failed ({} failures)", report.failed.len());
        for (id, error) in report.failed.iter().take(10) {
            println!("  - {}: {}", id, error);
        }
    }

    println!("\nVerifying cleanup...");
    let remaining = remaining_duplicates(&load_relations(&conn)?);
    if remaining > 0 {
        println!("⚠️  WARNING: {} duplicate pairs still remain", remaining);
    } else {
        println!("✅ No duplicates remain - cleanup successful!");
    }

    Ok(())
}

fn run_validate_contacts(db_path: &Path, csv: &Path, execute: bool) -> Result<()> {
    let mut conn = open_store(db_path)?;

    println!("Loading database state...");
    let skaters = load_skaters(&conn)?;
    println!("Found {} skaters in DB\n", skaters.len());

    println!("Parsing {}...", csv.display());
    let contacts = read_contacts_file(csv)?;
    println!("Parsed {} contacts from CSV\n", contacts.len());

    let report = validate_contacts(&contacts, &skaters);

    println!("{}", "=".repeat(80));
    println!("VALIDATION REPORT");
    println!("{}", "=".repeat(80));
    println!("\n✓ MATCHED: {} CSV contacts matched to DB skaters", report.matched.len());
    println!("✗ UNMATCHED: {} CSV contacts not found in DB", report.unmatched.len());

    if !report.email_updates.is_empty() {
        println!("\n📧 EMAILS TO POPULATE: {}", report.email_updates.len());
        for update in report.email_updates.iter().take(10) {
            println!("   - {}, {} → {}", update.last_name, update.first_name, update.email);
        }
        if report.email_updates.len() > 10 {
            println!("   ... and {} more", report.email_updates.len() - 10);
        }
    }

    if !report.family_groups.is_empty() {
        println!("\n👨‍👩‍👧‍👦 POTENTIAL FAMILY GROUPS: {}", report.family_groups.len());
        for group in report.family_groups.iter().take(10) {
            println!(
                "   - {}, {} → {}",
                group.last_name,
                group.first_names.join(" and "),
                group.email.as_deref().unwrap_or("(no email)")
            );
        }
        if report.family_groups.len() > 10 {
            println!("   ... and {} more", report.family_groups.len() - 10);
        }
    }

    println!("\n{}", "=".repeat(80));

    if !execute {
        println!("\n🔍 DRY RUN MODE - No changes made");
        println!("Run with --execute to apply updates");
        return Ok(());
    }

    println!("\n⚠️  EXECUTE MODE - Making changes...");
    let summary = apply_contact_report(&mut conn, &report)?;
    println!("✅ Created {} family groups", summary.families_created);
    println!("✅ Populated {} email addresses", summary.emails_populated);

    Ok(())
}

fn run_backup(db_path: &Path, out: &Path, database: &str) -> Result<()> {
    let conn = open_store(db_path)?;
    let backup = create_backup(&conn, database)?;
    write_backup(out, &backup)?;

    println!("✅ Backup complete: {}", out.display());
    println!("\nBackup Statistics:");
    for (table, rows) in &backup.tables {
        println!("  {}: {} records", table, rows.len());
    }
    println!("  TOTAL: {} records", backup.total_records());

    Ok(())
}
