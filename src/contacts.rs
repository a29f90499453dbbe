// 📇 Contact Validation - match a contacts CSV against stored skaters
// Fuzzy name match, family grouping, emails to populate

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Last names are more reliable than first names
pub const LAST_NAME_WEIGHT: f64 = 0.6;
pub const FIRST_NAME_WEIGHT: f64 = 0.4;
/// Minimum combined score (0-100) for a match
pub const MATCH_THRESHOLD: f64 = 85.0;

// ============================================================================
// CSV INPUT
// ============================================================================

/// One row of the contacts export
#[derive(Debug, Deserialize)]
struct ContactRow {
    #[serde(rename = "First Name")]
    first_name: String,
    #[serde(rename = "Last Name")]
    last_name: String,
    #[serde(rename = "Email", default)]
    email: Option<String>,
}

/// A contact, possibly naming several siblings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub first_names: Vec<String>,
    pub last_name: String,
    pub is_family: bool,
    pub email: Option<String>,
    pub raw_first: String,
}

/// `"Jayliana and Jovalee", "Downing"` → `(["Jayliana", "Jovalee"], "Downing", true)`
///
/// Commas separate names the same way ` and ` does.
pub fn parse_contact_name(first: &str, last: &str) -> (Vec<String>, String, bool) {
    let last = last.trim().to_string();

    if first.contains(" and ") || first.contains(',') {
        let names: Vec<String> = first
            .replace(',', " and ")
            .split(" and ")
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        let is_family = names.len() > 1;
        return (names, last, is_family);
    }

    (vec![first.trim().to_string()], last, false)
}

impl From<ContactRow> for Contact {
    fn from(row: ContactRow) -> Self {
        let (first_names, last_name, is_family) = parse_contact_name(&row.first_name, &row.last_name);
        let email = row
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        Contact {
            first_names,
            last_name,
            is_family,
            email,
            raw_first: row.first_name,
        }
    }
}

pub fn read_contacts<R: Read>(reader: R) -> Result<Vec<Contact>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut contacts = Vec::new();

    for (i, row) in rdr.deserialize::<ContactRow>().enumerate() {
        let row = row.with_context(|| format!("Bad contact row {}", i + 1))?;
        contacts.push(Contact::from(row));
    }

    Ok(contacts)
}

pub fn read_contacts_file(path: &Path) -> Result<Vec<Contact>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open contacts CSV: {}", path.display()))?;
    read_contacts(file)
}

// ============================================================================
// MATCHING
// ============================================================================

/// Skater as stored, for matching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSkater {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
}

/// Case-insensitive similarity, 0-100
pub fn name_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase()) * 100.0
}

/// Best skater whose weighted score reaches the threshold; earliest wins ties
pub fn match_skater<'a>(first: &str, last: &str, skaters: &'a [StoredSkater]) -> Option<&'a StoredSkater> {
    let mut best: Option<(&StoredSkater, f64)> = None;

    for skater in skaters {
        let score = name_similarity(last, &skater.last_name) * LAST_NAME_WEIGHT
            + name_similarity(first, &skater.first_name) * FIRST_NAME_WEIGHT;

        if score < MATCH_THRESHOLD {
            continue;
        }
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((skater, score));
        }
    }

    best.map(|(skater, _)| skater)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactMatch {
    pub contact: Contact,
    /// (first name from the contact, matched skater)
    pub skaters: Vec<(String, StoredSkater)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailUpdate {
    pub skater_id: String,
    pub last_name: String,
    pub first_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyGroup {
    pub last_name: String,
    pub first_names: Vec<String>,
    pub email: Option<String>,
    pub skater_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub matched: Vec<ContactMatch>,
    pub unmatched: Vec<Contact>,
    pub email_updates: Vec<EmailUpdate>,
    pub family_groups: Vec<FamilyGroup>,
}

impl ValidationReport {
    pub fn summary(&self) -> String {
        format!(
            "{} contacts matched, {} unmatched, {} emails to populate, {} family groups",
            self.matched.len(),
            self.unmatched.len(),
            self.email_updates.len(),
            self.family_groups.len()
        )
    }
}

/// Match every contact; nothing is written
pub fn validate_contacts(contacts: &[Contact], skaters: &[StoredSkater]) -> ValidationReport {
    let mut report = ValidationReport::default();

    for contact in contacts {
        let matches: Vec<(String, StoredSkater)> = contact
            .first_names
            .iter()
            .filter_map(|first| {
                match_skater(first, &contact.last_name, skaters)
                    .map(|skater| (first.clone(), skater.clone()))
            })
            .collect();

        if matches.is_empty() {
            debug!(first = %contact.raw_first, last = %contact.last_name, "no stored skater");
            report.unmatched.push(contact.clone());
            continue;
        }

        if let Some(email) = &contact.email {
            for (first, skater) in &matches {
                report.email_updates.push(EmailUpdate {
                    skater_id: skater.id.clone(),
                    last_name: skater.last_name.clone(),
                    first_name: first.clone(),
                    email: email.clone(),
                });
            }
        }

        if contact.is_family && matches.len() > 1 {
            report.family_groups.push(FamilyGroup {
                last_name: contact.last_name.clone(),
                first_names: contact.first_names.clone(),
                email: contact.email.clone(),
                skater_ids: matches.iter().map(|(_, s)| s.id.clone()).collect(),
            });
        }

        report.matched.push(ContactMatch {
            contact: contact.clone(),
            skaters: matches,
        });
    }

    report
}

// ============================================================================
// TESTS
// ============================================================================
