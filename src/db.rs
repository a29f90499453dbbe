// 🗄️ Photography Store - SQLite + WAL
// competitions, events, skaters, families, competed_in/belongs_to relations + audit trail

use crate::contacts::{StoredSkater, ValidationReport};
use crate::error::Error;
use crate::extractor::{Entry, GalleryStatus};
use crate::resolver::{Labels, PlanItem, RelationRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

/// Every table, in backup order
pub const TABLES: [&str; 7] = [
    "competitions",
    "events",
    "skaters",
    "families",
    "competed_in",
    "belongs_to",
    "audit_log",
];

const IMPORT_ACTOR: &str = "requests_importer";
const CLEANUP_ACTOR: &str = "duplicate_cleanup";
const CONTACTS_ACTOR: &str = "contact_validation";

// ============================================================================
// RECORD IDS
// ============================================================================

/// `2025 Pony Express` → `2025_pony_express`
pub fn competition_key(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

pub fn competition_id(name: &str) -> String {
    format!("competition:{}", competition_key(name))
}

/// `skater:<last>_<first>`, lower-cased, `-` and space → `_`
pub fn skater_id(entry: &Entry) -> String {
    let key = format!("{}_{}", entry.last_name, entry.first_name)
        .to_lowercase()
        .replace(['-', ' '], "_");
    format!("skater:{}", key)
}

pub fn event_id(competition_name: &str, event_number: u32) -> String {
    format!("event:{}_{}", competition_key(competition_name), event_number)
}

/// One family per last name: `family:<last>`
pub fn family_id(last_name: &str) -> String {
    format!("family:{}", last_name.trim().to_lowercase().replace(' ', "_"))
}

/// Sortable timestamp used for every created_at column
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `requested` unless the entry came from the Unrequested section
pub fn request_status(entry: &Entry) -> &'static str {
    match entry.section.as_deref() {
        Some("Unrequested") => "unrequested",
        _ => "requested",
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS competitions (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            venue TEXT NOT NULL DEFAULT '',
            start_date TEXT,
            end_date TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            competition TEXT NOT NULL,
            event_number INTEGER NOT NULL,
            split_ice TEXT,
            time_slot TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS skaters (
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS families (
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL DEFAULT 'Family',
            last_name TEXT NOT NULL,
            email TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // No UNIQUE(in_id, out_id): re-imports append, the resolver cleans up
    conn.execute(
        "CREATE TABLE IF NOT EXISTS competed_in (
            id TEXT PRIMARY KEY,
            in_id TEXT NOT NULL,
            out_id TEXT NOT NULL,
            skate_order INTEGER,
            request_status TEXT,
            gallery_status TEXT,
            gross_amount REAL,
            net_amount REAL,
            purchase_amount REAL,
            purchase_date TEXT,
            notes TEXT,
            gallery_url TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS belongs_to (
            id TEXT PRIMARY KEY,
            in_id TEXT NOT NULL,
            out_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(in_id, out_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_competed_in_pair ON competed_in(in_id, out_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// One audit trail entry
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl AuditEvent {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn insert_audit(conn: &Connection, event: &AuditEvent) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO audit_log (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            timestamp(event.timestamp),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

pub fn get_audit_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<AuditEvent>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM audit_log
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id",
    )?;

    let rows = stmt
        .query_map(params![entity_type, entity_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(event_id, ts, event_type, entity_type, entity_id, data, actor)| -> Result<AuditEvent> {
            Ok(AuditEvent {
                event_id,
                timestamp: DateTime::parse_from_rfc3339(&ts)
                    .with_context(|| format!("Bad audit timestamp: {}", ts))?
                    .with_timezone(&Utc),
                event_type,
                entity_type,
                entity_id,
                data: serde_json::from_str(&data).context("Bad audit payload")?,
                actor,
            })
        })
        .collect()
}

// ============================================================================
// IMPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub competition_id: String,
    pub skaters: usize,
    pub events: usize,
    pub relations: usize,
}

/// Import extracted entries for one competition.
///
/// Competitions, skaters and events are upserted by id. Every (entry, event)
/// pair always gets a fresh `competed_in` relation, so importing the same
/// document twice leaves duplicates for the resolver.
pub fn import_entries(
    conn: &mut Connection,
    entries: &[Entry],
    competition_name: &str,
) -> Result<ImportSummary> {
    let now = Utc::now();
    let created_at = timestamp(now);
    let comp_id = competition_id(competition_name);

    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO competitions (id, name, venue, created_at)
         VALUES (?1, ?2, '', ?3)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        params![comp_id, competition_name, created_at],
    )?;

    let mut skaters = HashSet::new();
    let mut events = HashSet::new();
    let mut relations = 0;

    for entry in entries {
        let skater = skater_id(entry);

        tx.execute(
            "INSERT INTO skaters (id, first_name, last_name, email, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                email = COALESCE(excluded.email, skaters.email)",
            params![skater, entry.first_name, entry.last_name, entry.email, created_at],
        )
        .with_context(|| format!("Failed to upsert skater {}", skater))?;
        skaters.insert(skater.clone());

        let purchase_date = (entry.status == GalleryStatus::Purchased).then(|| created_at.clone());
        let notes = (!entry.notes.is_empty()).then(|| entry.notes.join("; "));
        // A $0 purchase is stored as no purchase
        let purchase_amount = entry.net_amount.filter(|n| *n != 0.0);

        for &number in &entry.events {
            let event = event_id(competition_name, number);

            tx.execute(
                "INSERT INTO events (id, competition, event_number, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET event_number = excluded.event_number",
                params![event, comp_id, number, created_at],
            )
            .with_context(|| format!("Failed to upsert event {}", event))?;
            events.insert(event.clone());

            let relation_id = format!("competed_in:{}", uuid::Uuid::new_v4().simple());
            tx.execute(
                "INSERT INTO competed_in (
                    id, in_id, out_id, request_status, gallery_status,
                    gross_amount, net_amount, purchase_amount, purchase_date, notes, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    relation_id,
                    skater,
                    event,
                    request_status(entry),
                    entry.status.as_str(),
                    entry.gross_amount,
                    entry.net_amount,
                    purchase_amount,
                    purchase_date,
                    notes,
                    created_at,
                ],
            )
            .with_context(|| format!("Failed to relate {} -> {}", skater, event))?;
            relations += 1;
        }
    }

    let summary = ImportSummary {
        competition_id: comp_id.clone(),
        skaters: skaters.len(),
        events: events.len(),
        relations,
    };

    insert_audit(
        &tx,
        &AuditEvent::new(
            "entries_imported",
            "competition",
            &comp_id,
            serde_json::to_value(&summary)?,
            IMPORT_ACTOR,
        ),
    )?;

    tx.commit()?;

    info!(
        competition = %summary.competition_id,
        skaters = summary.skaters,
        relations = summary.relations,
        "import complete"
    );

    Ok(summary)
}

// ============================================================================
// QUERIES
// ============================================================================

/// Every competed_in relation, in insertion order
pub fn load_relations(conn: &Connection) -> Result<Vec<RelationRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, in_id, out_id, request_status, gallery_status,
                purchase_amount, purchase_date, notes, gallery_url, created_at
         FROM competed_in
         ORDER BY rowid",
    )?;

    let relations = stmt
        .query_map([], |row| {
            Ok(RelationRecord {
                id: row.get(0)?,
                subject: row.get(1)?,
                target: row.get(2)?,
                request_status: row.get(3)?,
                gallery_status: row.get(4)?,
                purchase_amount: row.get(5)?,
                purchase_date: row.get(6)?,
                notes: row.get(7)?,
                gallery_url: row.get(8)?,
                created_at: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(relations)
}

/// Display labels: skaters as `Last, First`, events as `Competition #N`
pub fn load_labels(conn: &Connection) -> Result<Labels> {
    let mut labels = Labels::new();

    let mut stmt = conn.prepare("SELECT id, first_name, last_name FROM skaters")?;
    let skaters = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (id, first, last) in skaters {
        labels.insert_subject(&id, format!("{}, {}", last, first));
    }

    let mut stmt = conn.prepare(
        "SELECT e.id, e.event_number, c.name
         FROM events e
         LEFT JOIN competitions c ON c.id = e.competition",
    )?;
    let events = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (id, number, competition) in events {
        let competition = competition.unwrap_or_else(|| "Unknown Competition".to_string());
        labels.insert_target(&id, format!("{} #{}", competition, number));
    }

    Ok(labels)
}

pub fn load_skaters(conn: &Connection) -> Result<Vec<StoredSkater>> {
    let mut stmt = conn.prepare(
        "SELECT id, first_name, last_name, email FROM skaters ORDER BY rowid",
    )?;

    let skaters = stmt
        .query_map([], |row| {
            Ok(StoredSkater {
                id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                email: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(skaters)
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    if !TABLES.contains(&table) {
        anyhow::bail!("Unknown table: {}", table);
    }

    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

pub fn count_relations(conn: &Connection) -> Result<i64> {
    count_rows(conn, "competed_in")
}

// ============================================================================
// CLEANUP
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    pub before: i64,
    pub after: i64,
    pub deleted: usize,
    pub planned: usize,
    /// (record id, error message)
    pub failed: Vec<(String, String)>,
}

impl CleanupReport {
    pub fn all_deleted(&self) -> bool {
        self.deleted == self.planned && self.failed.is_empty()
    }
}

fn delete_relation(conn: &Connection, id: &str) -> Result<(), Error> {
    let changed = conn.execute("DELETE FROM competed_in WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(Error::RecordNotFound(id.to_string()));
    }
    Ok(())
}

/// Delete one relation and write its audit row; both or neither
fn delete_with_audit(conn: &Connection, item: &PlanItem) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    delete_relation(&tx, &item.id)?;
    insert_audit(
        &tx,
        &AuditEvent::new(
            "relation_deleted",
            "competed_in",
            &item.id,
            serde_json::json!({
                "subject": item.subject,
                "target": item.target,
                "reason": item.reason,
            }),
            CLEANUP_ACTOR,
        ),
    )?;

    tx.commit()?;
    Ok(())
}

/// Execute a deletion plan one record at a time.
/// A failed delete is recorded and the run continues.
pub fn apply_deletion_plan(conn: &Connection, items: &[PlanItem]) -> Result<CleanupReport> {
    let mut report = CleanupReport {
        before: count_relations(conn)?,
        planned: items.len(),
        ..CleanupReport::default()
    };

    for item in items {
        match delete_with_audit(conn, item) {
            Ok(()) => report.deleted += 1,
            Err(e) => {
                warn!(id = %item.id, error = %e, "failed to delete relation");
                report.failed.push((item.id.clone(), e.to_string()));
            }
        }
    }

    report.after = count_relations(conn)?;
    Ok(report)
}

// ============================================================================
// CONTACTS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactSummary {
    pub families_created: usize,
    pub emails_populated: usize,
}

fn upsert_family(tx: &Connection, last_name: &str, email: Option<&str>, created_at: &str) -> Result<String> {
    let id = family_id(last_name);
    tx.execute(
        "INSERT INTO families (id, first_name, last_name, email, created_at)
         VALUES (?1, 'Family', ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET email = COALESCE(excluded.email, families.email)",
        params![id, last_name, email, created_at],
    )
    .with_context(|| format!("Failed to upsert family {}", id))?;
    Ok(id)
}

fn link_family(tx: &Connection, skater: &str, family: &str, created_at: &str) -> Result<()> {
    tx.execute(
        "INSERT OR IGNORE INTO belongs_to (id, in_id, out_id, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            format!("belongs_to:{}", uuid::Uuid::new_v4().simple()),
            skater,
            family,
            created_at
        ],
    )
    .with_context(|| format!("Failed to relate {} -> {}", skater, family))?;
    Ok(())
}

/// Write a contact validation report in one transaction.
///
/// Family groups first: one family per group, every matched sibling linked to
/// it. Then one email per skater: onto the skater's existing family if it has
/// one, else onto a new family for its last name. The skater's own email is
/// only filled when empty.
pub fn apply_contact_report(conn: &mut Connection, report: &ValidationReport) -> Result<ContactSummary> {
    let created_at = timestamp(Utc::now());
    let mut summary = ContactSummary::default();

    let tx = conn.transaction()?;

    for group in &report.family_groups {
        let family = upsert_family(&tx, &group.last_name, group.email.as_deref(), &created_at)?;
        for skater in &group.skater_ids {
            link_family(&tx, skater, &family, &created_at)?;
        }
        summary.families_created += 1;
    }

    let mut seen = HashSet::new();
    for update in &report.email_updates {
        if !seen.insert(update.skater_id.as_str()) {
            continue;
        }

        let existing: Option<String> = tx
            .query_row(
                "SELECT out_id FROM belongs_to WHERE in_id = ?1 ORDER BY rowid LIMIT 1",
                params![update.skater_id],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(family) => {
                tx.execute(
                    "UPDATE families SET email = ?1 WHERE id = ?2",
                    params![update.email, family],
                )?;
            }
            None => {
                let family = upsert_family(&tx, &update.last_name, Some(&update.email), &created_at)?;
                link_family(&tx, &update.skater_id, &family, &created_at)?;
            }
        }

        tx.execute(
            "UPDATE skaters SET email = ?1 WHERE id = ?2 AND (email IS NULL OR email = '')",
            params![update.email, update.skater_id],
        )?;
        summary.emails_populated += 1;
    }

    insert_audit(
        &tx,
        &AuditEvent::new(
            "contacts_applied",
            "contacts",
            "contacts:validation",
            serde_json::to_value(&summary)?,
            CONTACTS_ACTOR,
        ),
    )?;

    tx.commit()?;

    info!(
        families = summary.families_created,
        emails = summary.emails_populated,
        "contacts applied"
    );

    Ok(summary)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{RecordExtractor, SectionFilter};
    use crate::resolver::{remaining_duplicates, DuplicateResolver};

    const REQUESTS: &str = "\
## Requested
Smith John
   Event 3
   Event 7
   Email: smith@example.com
   Status: Purchased - $45.00 (Net: $38.25)
Doe Jane
   Event 3
   Status: Sent
   Note: two skaters in one family

## Unrequested
Brown Ada
   Event 4
";

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn entries() -> Vec<Entry> {
        RecordExtractor::new(SectionFilter::All).extract(REQUESTS)
    }

    #[test]
    fn test_record_ids() {
        let mut entry = Entry::new("Mary-Kate".to_string(), "Van Dyke".to_string(), None);
        entry.events.push(1);

        assert_eq!(skater_id(&entry), "skater:van_dyke_mary_kate");
        assert_eq!(competition_id("2025 Pony Express"), "competition:2025_pony_express");
        assert_eq!(event_id("2025 Pony Express", 12), "event:2025_pony_express_12");
    }

    #[test]
    fn test_import_entries() {
        let mut conn = setup();

        let summary = import_entries(&mut conn, &entries(), "2025 Pony Express").unwrap();

        assert_eq!(summary.competition_id, "competition:2025_pony_express");
        assert_eq!(summary.skaters, 3);
        assert_eq!(summary.events, 3, "events 3, 7 and 4");
        assert_eq!(summary.relations, 4);
        assert_eq!(count_rows(&conn, "skaters").unwrap(), 3);
        assert_eq!(count_rows(&conn, "events").unwrap(), 3);
        assert_eq!(count_relations(&conn).unwrap(), 4);

        let relations = load_relations(&conn).unwrap();
        let smith: Vec<&RelationRecord> = relations
            .iter()
            .filter(|r| r.subject == "skater:smith_john")
            .collect();
        assert_eq!(smith.len(), 2);
        assert_eq!(smith[0].gallery_status.as_deref(), Some("purchased"));
        assert_eq!(smith[0].purchase_amount, Some(38.25));
        assert!(smith[0].purchase_date.is_some());

        let doe = relations.iter().find(|r| r.subject == "skater:doe_jane").unwrap();
        assert_eq!(doe.gallery_status.as_deref(), Some("sent"));
        assert_eq!(doe.purchase_amount, None);
        assert_eq!(doe.purchase_date, None);
        assert_eq!(doe.notes.as_deref(), Some("two skaters in one family"));
        assert_eq!(doe.request_status.as_deref(), Some("requested"));

        let brown = relations.iter().find(|r| r.subject == "skater:brown_ada").unwrap();
        assert_eq!(brown.request_status.as_deref(), Some("unrequested"));
        assert_eq!(brown.gallery_status.as_deref(), Some("pending"));
    }

    #[test]
    fn test_reimport_creates_duplicates_and_cleanup_removes_them() {
        let mut conn = setup();

        import_entries(&mut conn, &entries(), "2025 Pony Express").unwrap();
        import_entries(&mut conn, &entries(), "2025 Pony Express").unwrap();

        assert_eq!(count_rows(&conn, "skaters").unwrap(), 3, "skaters are upserted");
        assert_eq!(count_relations(&conn).unwrap(), 8, "relations are appended");

        let relations = load_relations(&conn).unwrap();
        assert_eq!(remaining_duplicates(&relations), 4);

        let labels = load_labels(&conn).unwrap();
        let plan = DuplicateResolver::with_labels(labels).plan(&relations).unwrap();
        assert_eq!(plan.items.len(), 4);
        assert!(plan
            .items
            .iter()
            .any(|i| i.subject == "Smith, John" && i.target == "2025 Pony Express #3"));

        let report = apply_deletion_plan(&conn, &plan.items).unwrap();
        assert_eq!(report.before, 8);
        assert_eq!(report.after, 4);
        assert_eq!(report.deleted, 4);
        assert!(report.all_deleted());

        let relations = load_relations(&conn).unwrap();
        assert_eq!(remaining_duplicates(&relations), 0);

        let audit = get_audit_for_entity(&conn, "competed_in", &plan.items[0].id).unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].event_type, "relation_deleted");
        assert_eq!(audit[0].actor, CLEANUP_ACTOR);

        println!("✅ Re-import + cleanup test PASSED");
    }

    #[test]
    fn test_cleanup_missing_record_is_reported() {
        let conn = setup();

        let items = vec![PlanItem {
            id: "competed_in:ghost".to_string(),
            subject: "Ghost".to_string(),
            target: "Nowhere #0".to_string(),
            reason: "test".to_string(),
        }];

        let report = apply_deletion_plan(&conn, &items).unwrap();
        assert_eq!(report.deleted, 0);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].1.contains("competed_in:ghost"));
        assert!(!report.all_deleted());
    }

    #[test]
    fn test_email_not_cleared_by_later_import() {
        let mut conn = setup();
        import_entries(&mut conn, &entries(), "2025 Pony Express").unwrap();

        let without_email =
            RecordExtractor::new(SectionFilter::All).extract("Smith John\n   Event 9\n");
        import_entries(&mut conn, &without_email, "2025 Pony Express").unwrap();

        let email: Option<String> = conn
            .query_row(
                "SELECT email FROM skaters WHERE id = 'skater:smith_john'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(email.as_deref(), Some("smith@example.com"));
    }

    #[test]
    fn test_import_audit_event() {
        let mut conn = setup();
        import_entries(&mut conn, &entries(), "Winter Classic").unwrap();

        let audit = get_audit_for_entity(&conn, "competition", "competition:winter_classic").unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].event_type, "entries_imported");
        assert_eq!(audit[0].data["relations"], 4);
    }

    #[test]
    fn test_zero_net_is_not_a_purchase_amount() {
        let mut conn = setup();
        let entries = RecordExtractor::new(SectionFilter::All)
            .extract("Smith John\n   Event 1\n   Status: Purchased (Net: $0.00)\n");
        import_entries(&mut conn, &entries, "Winter Classic").unwrap();

        let relations = load_relations(&conn).unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].purchase_amount, None);
        assert!(relations[0].purchase_date.is_some());

        let net: Option<f64> = conn
            .query_row("SELECT net_amount FROM competed_in", [], |row| row.get(0))
            .unwrap();
        assert_eq!(net, Some(0.0), "net amount is kept as parsed");
    }

    #[test]
    fn test_failed_audit_rolls_back_delete() {
        let mut conn = setup();
        import_entries(&mut conn, &entries(), "2025 Pony Express").unwrap();
        let relations = load_relations(&conn).unwrap();

        conn.execute("DROP TABLE audit_log", []).unwrap();

        let items = vec![PlanItem {
            id: relations[0].id.clone(),
            subject: "Smith, John".to_string(),
            target: "2025 Pony Express #3".to_string(),
            reason: "test".to_string(),
        }];

        let report = apply_deletion_plan(&conn, &items).unwrap();
        assert_eq!(report.deleted, 0);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, relations[0].id);
        assert_eq!(report.after, report.before, "delete rolled back with its audit row");
        assert_eq!(report.after, 4);
    }

    #[test]
    fn test_apply_contact_report() {
        let mut conn = setup();
        let requests = "\
Downing Jayliana
   Event 1
Downing Jovalee
   Event 1
Hinton Harper
   Event 2
   Email: harper@old.example.com
Ito Kei
   Event 2
";
        let entries = RecordExtractor::new(SectionFilter::All).extract(requests);
        import_entries(&mut conn, &entries, "Winter Classic").unwrap();

        let csv = "\
First Name,Last Name,Email
Jayliana and Jovalee,Downing,downing@example.com
Harper,Hinton,harper@new.example.com
Kei,Ito,kei@example.com
";
        let contacts = crate::contacts::read_contacts(csv.as_bytes()).unwrap();
        let report = crate::contacts::validate_contacts(&contacts, &load_skaters(&conn).unwrap());
        assert_eq!(report.family_groups.len(), 1);
        assert_eq!(report.email_updates.len(), 4);

        let summary = apply_contact_report(&mut conn, &report).unwrap();
        assert_eq!(summary.families_created, 1);
        assert_eq!(summary.emails_populated, 4);

        // downing (group), hinton, ito
        assert_eq!(count_rows(&conn, "families").unwrap(), 3);
        assert_eq!(count_rows(&conn, "belongs_to").unwrap(), 4);

        let downing_links: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM belongs_to WHERE out_id = 'family:downing'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(downing_links, 2);

        let family_email: Option<String> = conn
            .query_row("SELECT email FROM families WHERE id = 'family:hinton'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(family_email.as_deref(), Some("harper@new.example.com"));

        let skaters = load_skaters(&conn).unwrap();
        let email_of = |id: &str| {
            skaters.iter().find(|s| s.id == id).and_then(|s| s.email.clone())
        };
        assert_eq!(email_of("skater:downing_jovalee").as_deref(), Some("downing@example.com"));
        assert_eq!(email_of("skater:ito_kei").as_deref(), Some("kei@example.com"));
        assert_eq!(
            email_of("skater:hinton_harper").as_deref(),
            Some("harper@old.example.com"),
            "existing skater email is kept"
        );

        // Applying again links nothing new
        apply_contact_report(&mut conn, &report).unwrap();
        assert_eq!(count_rows(&conn, "belongs_to").unwrap(), 4);
        assert_eq!(count_rows(&conn, "families").unwrap(), 3);

        let audit = get_audit_for_entity(&conn, "contacts", "contacts:validation").unwrap();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].data["families_created"], 1);
    }

    #[test]
    fn test_count_rows_rejects_unknown_table() {
        let conn = setup();
        assert!(count_rows(&conn, "sqlite_master; DROP TABLE skaters").is_err());
    }
}
