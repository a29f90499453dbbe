// 📝 Record Extractor - SkaterRequests.md → Entry records
// Line-oriented state machine: section headers, subject lines, indented detail lines
//
// Document shape:
//   ## Requested
//   Smith John
//      Event 3
//      Email: smith@example.com
//      Status: Purchased - $45.00 (Net: $38.25)
//      Note: wants the jump sequence

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;

const SECTION_MARKER: &str = "##";
const EVENT_KEYWORD: &str = "Event ";
const CONTACT_KEYWORD: &str = "Email:";
const STATUS_KEYWORD: &str = "Status:";
const NOTE_KEYWORD: &str = "Note:";

// ============================================================================
// GALLERY STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GalleryStatus {
    /// No status line seen yet
    Pending,
    Sent,
    Purchased,
}

impl GalleryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GalleryStatus::Pending => "pending",
            GalleryStatus::Sent => "sent",
            GalleryStatus::Purchased => "purchased",
        }
    }
}

impl fmt::Display for GalleryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// STATUS PATTERNS
// ============================================================================

static RE_PURCHASED_FULL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"Purchased - \$(\d+\.?\d*) \(Net: \$(\d+\.?\d*)\)").ok()
});
static RE_PURCHASED_NET: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Purchased \(Net: \$(\d+\.?\d*)\)").ok());
static RE_NET_ONLY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\$(\d+\.?\d*) net").ok());
static RE_SENT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^Sent$").ok());

/// Result of parsing the text after `Status:`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedStatus {
    pub status: GalleryStatus,
    pub gross_amount: Option<f64>,
    pub net_amount: Option<f64>,
}

impl ParsedStatus {
    fn sent() -> Self {
        ParsedStatus {
            status: GalleryStatus::Sent,
            gross_amount: None,
            net_amount: None,
        }
    }

    fn purchased(gross_amount: Option<f64>, net_amount: Option<f64>) -> Self {
        ParsedStatus {
            status: GalleryStatus::Purchased,
            gross_amount,
            net_amount,
        }
    }
}

/// Recognised status shapes. Order matters: `ORDER` is tried front to back
/// and the first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPattern {
    /// `Purchased - $45.00 (Net: $38.25)`
    PurchasedFull,
    /// `Purchased (Net: $20.00)`
    PurchasedNet,
    /// `$20.00 net`
    NetOnly,
    /// `Sent`
    Sent,
}

impl StatusPattern {
    pub const ORDER: [StatusPattern; 4] = [
        StatusPattern::PurchasedFull,
        StatusPattern::PurchasedNet,
        StatusPattern::NetOnly,
        StatusPattern::Sent,
    ];

    fn regex(&self) -> Option<&'static Regex> {
        match self {
            StatusPattern::PurchasedFull => RE_PURCHASED_FULL.as_ref(),
            StatusPattern::PurchasedNet => RE_PURCHASED_NET.as_ref(),
            StatusPattern::NetOnly => RE_NET_ONLY.as_ref(),
            StatusPattern::Sent => RE_SENT.as_ref(),
        }
    }

    /// Try this pattern against status text (keyword already removed)
    pub fn try_match(&self, text: &str) -> Option<ParsedStatus> {
        let caps = self.regex()?.captures(text)?;
        let amount = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<f64>().ok());

        let parsed = match self {
            StatusPattern::PurchasedFull => ParsedStatus::purchased(amount(1), amount(2)),
            StatusPattern::PurchasedNet | StatusPattern::NetOnly => {
                ParsedStatus::purchased(None, amount(1))
            }
            StatusPattern::Sent => ParsedStatus::sent(),
        };

        Some(parsed)
    }
}

/// Parse a status line. Unrecognised text falls back to `sent` with no amounts.
pub fn parse_status(line: &str) -> ParsedStatus {
    let text = line.replace(STATUS_KEYWORD, "");
    let text = text.trim();

    StatusPattern::ORDER
        .iter()
        .find_map(|pattern| pattern.try_match(text))
        .unwrap_or_else(ParsedStatus::sent)
}

/// Split `Lastname Firstname...` into `(first_name, last_name)`.
/// A single token is used for both parts.
pub fn parse_subject_name(line: &str) -> (String, String) {
    let trimmed = line.trim();

    match trimmed.split_once(char::is_whitespace) {
        Some((last, first)) => (first.trim().to_string(), last.to_string()),
        None => (trimmed.to_string(), trimmed.to_string()),
    }
}

// ============================================================================
// SECTION FILTER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionFilter {
    /// Wildcard: every section, including lines before the first header
    All,
    Named(String),
}

impl SectionFilter {
    pub fn named(name: &str) -> Self {
        SectionFilter::Named(name.to_string())
    }

    pub fn accepts(&self, current_section: Option<&str>) -> bool {
        match self {
            SectionFilter::All => true,
            SectionFilter::Named(name) => current_section == Some(name.as_str()),
        }
    }
}

impl Default for SectionFilter {
    fn default() -> Self {
        SectionFilter::named("Requested")
    }
}

impl FromStr for SectionFilter {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(SectionFilter::from(s))
    }
}

impl From<&str> for SectionFilter {
    /// `All` (any case) is the wildcard; anything else names a section
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("all") {
            SectionFilter::All
        } else {
            SectionFilter::Named(s.to_string())
        }
    }
}

impl fmt::Display for SectionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionFilter::All => f.write_str("All"),
            SectionFilter::Named(name) => f.write_str(name),
        }
    }
}

// ============================================================================
// ENTRY
// ============================================================================

/// One subject's parsed record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub first_name: String,
    pub last_name: String,

    /// Event numbers in document order
    pub events: Vec<u32>,

    pub email: Option<String>,
    pub status: GalleryStatus,
    pub gross_amount: Option<f64>,
    pub net_amount: Option<f64>,
    pub notes: Vec<String>,

    /// Section the subject line appeared under
    pub section: Option<String>,
}

impl Entry {
    pub fn new(first_name: String, last_name: String, section: Option<String>) -> Self {
        Entry {
            first_name,
            last_name,
            events: Vec::new(),
            email: None,
            status: GalleryStatus::Pending,
            gross_amount: None,
            net_amount: None,
            notes: Vec::new(),
            section,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    fn apply_status(&mut self, parsed: ParsedStatus) {
        self.status = parsed.status;
        self.gross_amount = parsed.gross_amount;
        self.net_amount = parsed.net_amount;
    }
}

// ============================================================================
// LINE CLASSIFICATION
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum LineKind {
    SectionHeader(String),
    Subject,
    Event(Option<u32>),
    Contact(Option<String>),
    Status(ParsedStatus),
    Note(String),
    Other,
}

fn text_after<'a>(line: &'a str, keyword: &str) -> &'a str {
    line.split_once(keyword)
        .map(|(_, rest)| rest.trim())
        .unwrap_or("")
}

fn is_subject_line(line: &str) -> bool {
    match line.chars().next() {
        Some(c) => c != ' ' && c.is_uppercase(),
        None => false,
    }
}

fn classify(line: &str) -> LineKind {
    if line.starts_with(SECTION_MARKER) {
        return LineKind::SectionHeader(line.replace(SECTION_MARKER, "").trim().to_string());
    }

    if is_subject_line(line) {
        return LineKind::Subject;
    }

    let trimmed = line.trim();
    if trimmed.starts_with(EVENT_KEYWORD) {
        let number = trimmed
            .split_whitespace()
            .nth(1)
            .and_then(|n| n.parse::<u32>().ok());
        return LineKind::Event(number);
    }

    if line.contains(CONTACT_KEYWORD) {
        let email = text_after(line, CONTACT_KEYWORD);
        return LineKind::Contact((!email.is_empty()).then(|| email.to_string()));
    }

    if line.contains(STATUS_KEYWORD) {
        return LineKind::Status(parse_status(line));
    }

    if line.contains(NOTE_KEYWORD) {
        return LineKind::Note(text_after(line, NOTE_KEYWORD).to_string());
    }

    LineKind::Other
}

// ============================================================================
// RECORD EXTRACTOR
// ============================================================================

pub struct RecordExtractor {
    filter: SectionFilter,
}

impl RecordExtractor {
    pub fn new(filter: SectionFilter) -> Self {
        RecordExtractor { filter }
    }

    pub fn filter(&self) -> &SectionFilter {
        &self.filter
    }

    /// Extract entries from a whole document
    pub fn extract(&self, text: &str) -> Vec<Entry> {
        self.extract_lines(text.lines())
    }

    /// Extract entries from pre-split lines
    pub fn extract_lines<'a, I>(&self, lines: I) -> Vec<Entry>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut entries = Vec::new();
        let mut current_section: Option<String> = None;
        let mut current: Option<Entry> = None;

        for (index, raw) in lines.into_iter().enumerate() {
            let line = raw.trim_end();

            let kind = match classify(line) {
                LineKind::SectionHeader(name) => {
                    current_section = Some(name);
                    continue;
                }
                other => other,
            };

            if !self.filter.accepts(current_section.as_deref()) {
                continue;
            }

            match kind {
                LineKind::Subject => {
                    finish_entry(current.take(), &mut entries);
                    let (first_name, last_name) = parse_subject_name(line);
                    current = Some(Entry::new(first_name, last_name, current_section.clone()));
                }
                LineKind::Event(number) => match (current.as_mut(), number) {
                    (Some(entry), Some(n)) => entry.events.push(n),
                    (Some(_), None) => {
                        debug!(line = index + 1, "skipping event line without a number");
                    }
                    (None, _) => {}
                },
                LineKind::Contact(email) => {
                    if let Some(entry) = current.as_mut() {
                        entry.email = email;
                    }
                }
                LineKind::Status(parsed) => {
                    if let Some(entry) = current.as_mut() {
                        entry.apply_status(parsed);
                    }
                }
                LineKind::Note(note) => {
                    if let Some(entry) = current.as_mut() {
                        entry.notes.push(note);
                    }
                }
                LineKind::SectionHeader(_) | LineKind::Other => {
                    if current.is_some() && !line.trim().is_empty() {
                        debug!(line = index + 1, "skipping unrecognised line");
                    }
                }
            }
        }

        finish_entry(current, &mut entries);
        entries
    }
}

impl Default for RecordExtractor {
    fn default() -> Self {
        Self::new(SectionFilter::default())
    }
}

/// Emit an entry only once it has at least one event
fn finish_entry(entry: Option<Entry>, entries: &mut Vec<Entry>) {
    let Some(entry) = entry else { return };

    if entry.events.is_empty() {
        debug!(subject = %entry.full_name(), "dropping entry with no events");
        return;
    }

    entries.push(entry);
}

/// Read a requests document from disk and extract its entries
pub fn extract_file(path: &Path, filter: SectionFilter) -> Result<Vec<Entry>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read requests file: {}", path.display()))?;

    Ok(RecordExtractor::new(filter).extract(&text))
}

// ============================================================================
// TESTS
// ============================================================================
