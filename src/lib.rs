// Photo Ledger - Core Library
// Skater request import, duplicate relation cleanup, contact validation, and store backups

pub mod backup;
pub mod config;
pub mod contacts;
pub mod db;
pub mod error;
pub mod extractor;
pub mod handoff;
pub mod resolver;

// Re-export commonly used types
pub use backup::{create_backup, default_backup_name, read_backup, write_backup, Backup};
pub use config::LedgerConfig;
pub use contacts::{read_contacts_file, validate_contacts, Contact, ValidationReport};
pub use db::{
    apply_contact_report, apply_deletion_plan, count_relations, import_entries, load_labels,
    load_relations, load_skaters, setup_database, AuditEvent, CleanupReport, ContactSummary,
    ImportSummary,
};
pub use error::Error;
pub use extractor::{
    extract_file, parse_status, Entry, GalleryStatus, ParsedStatus, RecordExtractor,
    SectionFilter, StatusPattern,
};
pub use handoff::{export_entries_csv, read_plan, write_plan};
pub use resolver::{
    find_duplicate_groups, remaining_duplicates, DeletionPlan, DuplicateResolver, Labels,
    PlanItem, RelationRecord,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
