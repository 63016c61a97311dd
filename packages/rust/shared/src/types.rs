//! Core domain types for leadfill enrichment runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Field names used as keys in input and output documents.
pub mod fields {
    /// Registry number of the establishment.
    pub const IDENTIFIER: &str = "siret";
    /// Legal/display name of the business.
    pub const NAME: &str = "denominationUniteLegale";
    /// Postal address, `"<street>, <postcode> <city>"`.
    pub const ADDRESS: &str = "adresse";
    pub const SURNAME: &str = "nom";
    pub const GIVEN_NAME: &str = "prenom";
    /// Professional-network profile URL.
    pub const PROFILE_URL: &str = "linkedin_url";
    pub const PHONE: &str = "telephone";
}

/// Columns written to the output container when none are configured.
pub const DEFAULT_COLUMNS: &[&str] = &[
    fields::IDENTIFIER,
    fields::NAME,
    fields::ADDRESS,
    fields::SURNAME,
    fields::GIVEN_NAME,
    fields::PROFILE_URL,
];

/// Placeholder the registry export uses for undisclosed names.
pub const NO_DATA_MARKER: &str = "[ND]";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one enrichment run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One business entity plus its progressively filled enrichment fields.
///
/// Identifier and name are fixed at creation; [`Record::with_updates`] never
/// touches them and never clears a populated field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    /// Create a record with its identifying fields set and empty result fields.
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(fields::IDENTIFIER.to_string(), identifier.into());
        fields.insert(fields::NAME.to_string(), name.into());
        fields.insert(fields::PROFILE_URL.to_string(), String::new());
        Self { fields }
    }

    /// Build a record from arbitrary `(field, value)` pairs.
    pub fn from_fields<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Builder-style setter used when loading input.
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Value of `field`, or `""` when the field is absent.
    pub fn get(&self, field: &str) -> &str {
        self.fields.get(field).map(String::as_str).unwrap_or("")
    }

    /// Whether `field` is present (possibly empty).
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn identifier(&self) -> &str {
        self.get(fields::IDENTIFIER).trim()
    }

    pub fn display_name(&self) -> &str {
        self.get(fields::NAME).trim()
    }

    /// A record can be looked up when it has an identifier or a name.
    pub fn is_identifiable(&self) -> bool {
        !self.identifier().is_empty() || !self.display_name().is_empty()
    }

    /// Registry search key: the identifier, falling back to the name.
    pub fn lookup_key(&self) -> Option<&str> {
        [self.identifier(), self.display_name()]
            .into_iter()
            .find(|v| !v.is_empty())
    }

    /// City token of the address: the part after the last comma, without a
    /// leading numeric postcode.
    ///
    /// `"10 Rue X, 75001 Paris"` gives `"Paris"`.
    pub fn locality(&self) -> String {
        let address = self.get(fields::ADDRESS).trim();
        let tail = address.rsplit(',').next().unwrap_or("").trim();
        let tokens: Vec<&str> = tail.split_whitespace().collect();

        match tokens.as_slice() {
            [first, rest @ ..] if !rest.is_empty() && first.chars().all(|c| c.is_ascii_digit()) => {
                rest.join(" ")
            }
            _ => tokens.join(" "),
        }
    }

    /// Return a new record with `updates` merged in.
    ///
    /// Later calls win for non-empty values. Identifier and name are never
    /// written; an empty value only materializes a missing key.
    pub fn with_updates(&self, updates: &FieldUpdates) -> Record {
        let mut next = self.clone();
        for (field, value) in updates.iter() {
            if field == fields::IDENTIFIER || field == fields::NAME {
                continue;
            }
            if value.trim().is_empty() {
                next.fields.entry(field.to_string()).or_default();
            } else {
                next.fields.insert(field.to_string(), value.trim().to_string());
            }
        }
        next
    }

    /// Return a new record where every field in `names` exists, empty when it was absent.
    pub fn with_blank_fields<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Record {
        let mut next = self.clone();
        for name in names {
            next.fields.entry(name.to_string()).or_default();
        }
        next
    }

    /// Return a new record where every field in `names` is set to the empty
    /// string, overwriting any value it carried.
    pub fn with_cleared_fields<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Record {
        let mut next = self.clone();
        for name in names {
            next.fields.insert(name.to_string(), String::new());
        }
        next
    }

    /// Iterate over all `(field, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// ---------------------------------------------------------------------------
// FieldUpdates / EnrichmentOutcome
// ---------------------------------------------------------------------------

/// Field values a provider wants merged into a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldUpdates(BTreeMap<String, String>);

impl FieldUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// True when no update carries a non-blank value.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| v.trim().is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Drop every field not in `allowed`.
    pub fn restricted_to(mut self, allowed: &[&str]) -> Self {
        self.0.retain(|k, _| allowed.contains(&k.as_str()));
        self
    }
}

/// Result of applying one provider to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentOutcome {
    /// The provider returned data to merge.
    Found(FieldUpdates),
    /// The provider ran but found nothing (includes timeouts).
    NotFound,
    /// The provider raised; the message is logged and otherwise ignored.
    Failed(String),
}

impl EnrichmentOutcome {
    /// Short label for progress logs.
    pub fn summary(&self) -> &'static str {
        match self {
            Self::Found(_) => "found",
            Self::NotFound => "no-match",
            Self::Failed(_) => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// A contiguous slice of a batch assigned to one worker.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Position of the chunk within its batch; reassembly sorts on this.
    pub index: usize,
    /// Run-wide index of the first record, for log lines.
    pub start: usize,
    pub records: Vec<Record>,
}

// ---------------------------------------------------------------------------
// Person names
// ---------------------------------------------------------------------------

/// Split a person's full name into `(surname, given_name)`.
///
/// The last whitespace token is the given name and everything before it is the
/// surname, matching how the registry prints directors (`"DUPONT Jean"`).
/// A single token is treated as a given name.
pub fn split_person_name(full: &str) -> (String, String) {
    let tokens: Vec<&str> = full.split_whitespace().collect();
    match tokens.as_slice() {
        [] => (String::new(), String::new()),
        [only] => (String::new(), (*only).to_string()),
        [surname @ .., given] => (surname.join(" "), (*given).to_string()),
    }
}
