// 🔍 Duplicate Resolver - one competed_in relation per (skater, event)
// Groups relations by (in, out), scores each by field completeness, plans deletions
//
// Scoring assumes "more populated fields = more authoritative record". That holds
// when incomplete rows were later superseded by an enriched copy, and not otherwise.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info};

// ============================================================================
// SCORING WEIGHTS
// ============================================================================

/// Purchase data is the most business-critical field
pub const PURCHASE_AMOUNT_WEIGHT: u8 = 3;
pub const NOTES_WEIGHT: u8 = 2;
pub const GALLERY_URL_WEIGHT: u8 = 2;
pub const PURCHASE_DATE_WEIGHT: u8 = 1;

pub const MAX_SCORE: u8 =
    PURCHASE_AMOUNT_WEIGHT + NOTES_WEIGHT + GALLERY_URL_WEIGHT + PURCHASE_DATE_WEIGHT;

// ============================================================================
// RECORD ID
// ============================================================================

/// `table:key` record identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    table: String,
    key: String,
}

impl RecordId {
    pub fn new(table: &str, key: &str) -> Self {
        RecordId {
            table: table.to_string(),
            key: key.to_string(),
        }
    }

    /// Parse `table:key`; `field` names the source in the error
    pub fn parse(field: &'static str, value: &str) -> Result<Self> {
        let malformed = || Error::MalformedId {
            field,
            value: value.to_string(),
        };

        let (table, key) = value.split_once(':').ok_or_else(malformed)?;
        let valid_table = !table.is_empty()
            && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_table || key.trim().is_empty() {
            return Err(malformed());
        }

        Ok(RecordId::new(table, key))
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.key)
    }
}

// ============================================================================
// RELATION RECORD
// ============================================================================

/// A stored skater → event association (`competed_in`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub id: String,

    /// Skater id
    #[serde(rename = "in")]
    pub subject: String,

    /// Event id
    #[serde(rename = "out")]
    pub target: String,

    #[serde(default)]
    pub request_status: Option<String>,

    #[serde(default)]
    pub gallery_status: Option<String>,

    #[serde(default)]
    pub purchase_amount: Option<f64>,

    #[serde(default)]
    pub purchase_date: Option<String>,

    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub gallery_url: Option<String>,

    /// Sortable textual timestamp (RFC 3339)
    #[serde(default)]
    pub created_at: Option<String>,
}

fn is_present(value: &Option<String>) -> bool {
    matches!(value.as_deref(), Some(v) if !v.is_empty() && v != "NONE")
}

impl RelationRecord {
    pub fn new(id: &str, subject: &str, target: &str) -> Self {
        RelationRecord {
            id: id.to_string(),
            subject: subject.to_string(),
            target: target.to_string(),
            request_status: None,
            gallery_status: None,
            purchase_amount: None,
            purchase_date: None,
            notes: None,
            gallery_url: None,
            created_at: None,
        }
    }

    /// Builder pattern: add purchase amount
    pub fn with_purchase_amount(mut self, amount: f64) -> Self {
        self.purchase_amount = Some(amount);
        self
    }

    /// Builder pattern: add purchase date
    pub fn with_purchase_date(mut self, date: &str) -> Self {
        self.purchase_date = Some(date.to_string());
        self
    }

    /// Builder pattern: add notes
    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }

    /// Builder pattern: add gallery url
    pub fn with_gallery_url(mut self, url: &str) -> Self {
        self.gallery_url = Some(url.to_string());
        self
    }

    /// Builder pattern: add creation timestamp
    pub fn with_created_at(mut self, created_at: &str) -> Self {
        self.created_at = Some(created_at.to_string());
        self
    }

    /// Data completeness score, 0..=MAX_SCORE
    pub fn completeness_score(&self) -> u8 {
        let mut score = 0;

        if self.purchase_amount.is_some() {
            score += PURCHASE_AMOUNT_WEIGHT;
        }
        if is_present(&self.notes) {
            score += NOTES_WEIGHT;
        }
        if is_present(&self.gallery_url) {
            score += GALLERY_URL_WEIGHT;
        }
        if is_present(&self.purchase_date) {
            score += PURCHASE_DATE_WEIGHT;
        }

        score
    }

    fn validate_ids(&self) -> Result<()> {
        RecordId::parse("id", &self.id)?;
        RecordId::parse("in", &self.subject)?;
        RecordId::parse("out", &self.target)?;
        Ok(())
    }

    fn created_key(&self) -> &str {
        self.created_at.as_deref().unwrap_or("")
    }
}

// ============================================================================
// LABELS
// ============================================================================

/// Human-readable names for subject and target ids.
/// Unknown ids are displayed as the raw id.
#[derive(Debug, Clone, Default)]
pub struct Labels {
    subjects: HashMap<String, String>,
    targets: HashMap<String, String>,
}

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_subject(&mut self, id: &str, label: String) {
        self.subjects.insert(id.to_string(), label);
    }

    pub fn insert_target(&mut self, id: &str, label: String) {
        self.targets.insert(id.to_string(), label);
    }

    pub fn subject(&self, id: &str) -> String {
        self.subjects.get(id).cloned().unwrap_or_else(|| id.to_string())
    }

    pub fn target(&self, id: &str) -> String {
        self.targets.get(id).cloned().unwrap_or_else(|| id.to_string())
    }
}

// ============================================================================
// DELETION PLAN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub id: String,
    pub score: u8,
    pub created_at: Option<String>,
}

/// Decision for one duplicated (subject, target) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDecision {
    pub subject: String,
    pub target: String,
    pub subject_label: String,
    pub target_label: String,
    pub keep: ScoredRecord,
    pub delete: Vec<ScoredRecord>,
}

/// One record to delete, as written to `deletion_plan.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItem {
    pub id: String,
    pub subject: String,
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeletionPlan {
    pub groups: Vec<GroupDecision>,
    pub items: Vec<PlanItem>,
}

impl DeletionPlan {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Duplicate pairs: {}, records to delete: {}, records to keep: {}",
            self.groups.len(),
            self.items.len(),
            self.groups.len()
        )
    }
}

fn deletion_reason(deleted: &ScoredRecord, kept: &ScoredRecord) -> String {
    if deleted.score < kept.score {
        format!(
            "Lower data completeness score ({}/{} vs {}/{})",
            deleted.score, MAX_SCORE, kept.score, MAX_SCORE
        )
    } else if deleted.created_at.as_deref().unwrap_or("") > kept.created_at.as_deref().unwrap_or("") {
        format!(
            "Equal data completeness score ({}/{}), created after kept record",
            deleted.score, MAX_SCORE
        )
    } else {
        format!(
            "Equal data completeness score ({}/{}), identical score and timestamp, input order",
            deleted.score, MAX_SCORE
        )
    }
}

// ============================================================================
// DUPLICATE RESOLVER
// ============================================================================

/// Group relations sharing (subject, target); only groups with more than one member.
/// Ordered by key so repeated runs produce the same plan.
pub fn find_duplicate_groups(
    records: &[RelationRecord],
) -> BTreeMap<(&str, &str), Vec<&RelationRecord>> {
    let mut grouped: BTreeMap<(&str, &str), Vec<&RelationRecord>> = BTreeMap::new();

    for record in records {
        grouped
            .entry((record.subject.as_str(), record.target.as_str()))
            .or_default()
            .push(record);
    }

    grouped.retain(|_, group| group.len() > 1);
    grouped
}

/// Number of (subject, target) pairs that still have duplicates
pub fn remaining_duplicates(records: &[RelationRecord]) -> usize {
    find_duplicate_groups(records).len()
}

pub struct DuplicateResolver {
    labels: Labels,
}

impl DuplicateResolver {
    pub fn new() -> Self {
        DuplicateResolver {
            labels: Labels::new(),
        }
    }

    pub fn with_labels(labels: Labels) -> Self {
        DuplicateResolver { labels }
    }

    /// Build a deletion plan. Fails before scoring if any id is malformed,
    /// since the plan drives destructive deletes.
    pub fn plan(&self, records: &[RelationRecord]) -> Result<DeletionPlan> {
        for record in records {
            record.validate_ids()?;
        }

        let mut plan = DeletionPlan::default();

        for ((subject, target), group) in find_duplicate_groups(records) {
            let decision = self.decide(subject, target, group);

            for deleted in &decision.delete {
                plan.items.push(PlanItem {
                    id: deleted.id.clone(),
                    subject: decision.subject_label.clone(),
                    target: decision.target_label.clone(),
                    reason: deletion_reason(deleted, &decision.keep),
                });
            }

            debug!(
                subject,
                target,
                keep = %decision.keep.id,
                deleting = decision.delete.len(),
                "resolved duplicate group"
            );
            plan.groups.push(decision);
        }

        info!(
            records = records.len(),
            duplicate_pairs = plan.groups.len(),
            deletions = plan.items.len(),
            "deletion plan built"
        );

        Ok(plan)
    }

    fn decide(&self, subject: &str, target: &str, mut group: Vec<&RelationRecord>) -> GroupDecision {
        // Highest score first; ties go to the earliest created_at. Stable sort keeps
        // input order for full ties.
        group.sort_by(|a, b| compare_for_keep(a, b));

        let mut scored = group.into_iter().map(|r| ScoredRecord {
            id: r.id.clone(),
            score: r.completeness_score(),
            created_at: r.created_at.clone(),
        });

        // Groups always have at least two members
        let keep = scored.next().unwrap_or(ScoredRecord {
            id: String::new(),
            score: 0,
            created_at: None,
        });

        GroupDecision {
            subject: subject.to_string(),
            target: target.to_string(),
            subject_label: self.labels.subject(subject),
            target_label: self.labels.target(target),
            keep,
            delete: scored.collect(),
        }
    }
}

impl Default for DuplicateResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn compare_for_keep(a: &RelationRecord, b: &RelationRecord) -> Ordering {
    b.completeness_score()
        .cmp(&a.completeness_score())
        .then_with(|| a.created_key().cmp(b.created_key()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(id: &str, skater: &str, event: &str, created: &str) -> RelationRecord {
        RelationRecord::new(
            &format!("competed_in:{}", id),
            &format!("skater:{}", skater),
            &format!("event:{}", event),
        )
        .with_created_at(created)
    }

    #[test]
    fn test_score_weights() {
        let empty = rel("a", "smith_john", "pony_3", "2025-01-01T00:00:00Z");
        assert_eq!(empty.completeness_score(), 0);

        let full = empty
            .clone()
            .with_purchase_amount(38.25)
            .with_notes("prints")
            .with_gallery_url("https://example.com/g/1")
            .with_purchase_date("2025-01-02T00:00:00Z");
        assert_eq!(full.completeness_score(), MAX_SCORE);
        assert_eq!(MAX_SCORE, 8);

        let purchase_only = empty.clone().with_purchase_amount(0.0);
        assert_eq!(purchase_only.completeness_score(), 3);
    }

    #[test]
    fn test_none_and_empty_strings_not_present() {
        let record = rel("a", "smith_john", "pony_3", "2025-01-01T00:00:00Z")
            .with_notes("NONE")
            .with_gallery_url("");
        assert_eq!(record.completeness_score(), 0);
    }

    #[test]
    fn test_no_duplicates_empty_plan() {
        let records = vec![
            rel("a", "smith_john", "pony_3", "2025-01-01T00:00:00Z"),
            rel("b", "smith_john", "pony_7", "2025-01-01T00:00:00Z"),
            rel("c", "doe_jane", "pony_3", "2025-01-01T00:00:00Z"),
        ];

        let plan = DuplicateResolver::new().plan(&records).unwrap();
        assert!(plan.is_empty());
        assert!(plan.groups.is_empty());
        assert_eq!(remaining_duplicates(&records), 0);
    }

    #[test]
    fn test_keeps_highest_score() {
        let records = vec![
            rel("old", "smith_john", "pony_3", "2025-01-01T00:00:00Z"),
            rel("rich", "smith_john", "pony_3", "2025-02-01T00:00:00Z")
                .with_purchase_amount(38.25)
                .with_purchase_date("2025-02-01T00:00:00Z"),
            rel("mid", "smith_john", "pony_3", "2025-01-15T00:00:00Z").with_notes("asked twice"),
        ];

        let plan = DuplicateResolver::new().plan(&records).unwrap();

        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.groups[0].keep.id, "competed_in:rich");
        assert_eq!(plan.groups[0].keep.score, 4);
        assert_eq!(plan.items.len(), 2);
        assert_eq!(plan.items[0].id, "competed_in:mid");
        assert_eq!(
            plan.items[0].reason,
            "Lower data completeness score (2/8 vs 4/8)"
        );
        assert_eq!(plan.items[1].id, "competed_in:old");
    }

    #[test]
    fn test_tie_prefers_earliest_created() {
        let records = vec![
            rel("late", "smith_john", "pony_3", "2025-03-01T00:00:00Z"),
            rel("early", "smith_john", "pony_3", "2025-01-01T00:00:00Z"),
        ];

        let plan = DuplicateResolver::new().plan(&records).unwrap();

        assert_eq!(plan.groups[0].keep.id, "competed_in:early");
        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.items[0].id, "competed_in:late");
        assert!(plan.items[0].reason.starts_with("Equal data completeness score (0/8)"));
    }

    #[test]
    fn test_group_sizes_and_keep_invariant() {
        let mut records = Vec::new();
        for i in 0..4 {
            records.push(rel(&format!("a{}", i), "smith_john", "pony_3", &format!("2025-01-0{}", i + 1)));
        }
        for i in 0..3 {
            records.push(rel(&format!("b{}", i), "doe_jane", "pony_2", &format!("2025-01-0{}", 3 - i)));
        }
        records.push(rel("single", "brown_ada", "pony_4", "2025-01-01"));
        records[2] = records[2].clone().with_gallery_url("https://example.com/g");

        let plan = DuplicateResolver::new().plan(&records).unwrap();
        assert_eq!(plan.groups.len(), 2);
        assert_eq!(plan.items.len(), 3 + 2);

        let by_id: HashMap<&str, &RelationRecord> =
            records.iter().map(|r| (r.id.as_str(), r)).collect();

        for group in &plan.groups {
            let kept = by_id[group.keep.id.as_str()];
            for deleted in &group.delete {
                let d = by_id[deleted.id.as_str()];
                assert!(
                    kept.completeness_score() > d.completeness_score()
                        || (kept.completeness_score() == d.completeness_score()
                            && kept.created_key() <= d.created_key())
                );
            }
        }

        let smith = plan.groups.iter().find(|g| g.subject == "skater:smith_john").unwrap();
        assert_eq!(smith.keep.id, "competed_in:a2");
        let doe = plan.groups.iter().find(|g| g.subject == "skater:doe_jane").unwrap();
        assert_eq!(doe.keep.id, "competed_in:b2");
    }

    #[test]
    fn test_plan_is_idempotent() {
        let records = vec![
            rel("x", "smith_john", "pony_3", "2025-01-01"),
            rel("y", "smith_john", "pony_3", "2025-01-01"),
            rel("z", "doe_jane", "pony_3", "2025-01-01").with_notes("n"),
            rel("w", "doe_jane", "pony_3", "2025-01-02"),
        ];

        let resolver = DuplicateResolver::new();
        let first = resolver.plan(&records).unwrap();
        let second = resolver.plan(&records).unwrap();

        assert_eq!(first, second);
        // Full tie keeps input order
        let smith = first.groups.iter().find(|g| g.subject == "skater:smith_john").unwrap();
        assert_eq!(smith.keep.id, "competed_in:x");
    }

    #[test]
    fn test_full_tie_reason_mentions_input_order() {
        let records = vec![
            rel("first", "smith_john", "pony_3", "2025-01-01"),
            rel("second", "smith_john", "pony_3", "2025-01-01"),
            RelationRecord::new("competed_in:third", "skater:doe_jane", "event:pony_3"),
            RelationRecord::new("competed_in:fourth", "skater:doe_jane", "event:pony_3"),
        ];

        let plan = DuplicateResolver::new().plan(&records).unwrap();

        for item in &plan.items {
            assert_eq!(
                item.reason,
                "Equal data completeness score (0/8), identical score and timestamp, input order"
            );
        }
        let ids: Vec<&str> = plan.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["competed_in:fourth", "competed_in:second"]);
    }

    #[test]
    fn test_malformed_id_fails_loudly() {
        let records = vec![
            rel("a", "smith_john", "pony_3", "2025-01-01"),
            RelationRecord::new("competed_in:b", "smith_john", "event:pony_3"),
        ];

        let err = DuplicateResolver::new().plan(&records).unwrap_err();
        match err {
            Error::MalformedId { field, value } => {
                assert_eq!(field, "in");
                assert_eq!(value, "smith_john");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_record_id_parse() {
        let id = RecordId::parse("id", "competed_in:abc123").unwrap();
        assert_eq!(id.table(), "competed_in");
        assert_eq!(id.key(), "abc123");
        assert_eq!(id.to_string(), "competed_in:abc123");

        assert!(RecordId::parse("id", ":abc").is_err());
        assert!(RecordId::parse("id", "table:").is_err());
        assert!(RecordId::parse("id", "no-colon").is_err());
    }

    #[test]
    fn test_labels_used_in_plan() {
        let mut labels = Labels::new();
        labels.insert_subject("skater:smith_john", "Smith, John".to_string());
        labels.insert_target("event:pony_3", "2025 Pony Express #3".to_string());

        let records = vec![
            rel("a", "smith_john", "pony_3", "2025-01-01"),
            rel("b", "smith_john", "pony_3", "2025-01-02"),
            rel("c", "doe_jane", "pony_9", "2025-01-01"),
            rel("d", "doe_jane", "pony_9", "2025-01-02"),
        ];

        let plan = DuplicateResolver::with_labels(labels).plan(&records).unwrap();
        let smith = plan.items.iter().find(|i| i.id == "competed_in:b").unwrap();
        assert_eq!(smith.subject, "Smith, John");
        assert_eq!(smith.target, "2025 Pony Express #3");

        let doe = plan.items.iter().find(|i| i.id == "competed_in:d").unwrap();
        assert_eq!(doe.subject, "skater:doe_jane");
    }

    #[test]
    fn test_relation_record_json_shape() {
        let json = r#"{"id":"competed_in:a","in":"skater:s","out":"event:e","purchase_amount":20.0}"#;
        let record: RelationRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.subject, "skater:s");
        assert_eq!(record.target, "event:e");
        assert_eq!(record.completeness_score(), PURCHASE_AMOUNT_WEIGHT);
    }
}
