//! Input loaders.
//!
//! Three shapes are accepted:
//! - a registry export: JSON list of establishments with nested `uniteLegale`
//!   and `adresseEtablissement` objects,
//! - a flat JSON list of objects,
//! - a CSV table with a header row.
//!
//! Records whose display name is blank or the `[ND]` marker are dropped.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use leadfill_shared::{LeadfillError, NO_DATA_MARKER, Record, Result, fields};

/// Fields every loaded record carries, empty until a provider fills them.
const RESULT_FIELDS: &[&str] = &[
    fields::ADDRESS,
    fields::SURNAME,
    fields::GIVEN_NAME,
    fields::PROFILE_URL,
];

/// Load records from `path`, choosing the parser from the extension.
pub fn load_input(path: &Path) -> Result<Vec<Record>> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));

    let records = if is_csv {
        let file = std::fs::File::open(path).map_err(|e| LeadfillError::io(path, e))?;
        load_table(file)?
    } else {
        let content = std::fs::read_to_string(path).map_err(|e| LeadfillError::io(path, e))?;
        load_json(&content)?
    };

    info!(path = %path.display(), records = records.len(), "input loaded");
    Ok(records)
}

/// Parse a JSON document, detecting registry exports.
pub fn load_json(content: &str) -> Result<Vec<Record>> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| LeadfillError::parse(format!("input is not valid JSON: {e}")))?;

    let Value::Array(items) = value else {
        return Err(LeadfillError::parse("input must be a JSON list"));
    };

    let is_export = items
        .first()
        .and_then(Value::as_object)
        .is_some_and(|o| o.contains_key("uniteLegale") || o.contains_key("adresseEtablissement"));

    let records: Vec<Record> = if is_export {
        items.iter().map(establishment_to_record).collect()
    } else {
        items
            .iter()
            .map(|item| match item {
                Value::Object(map) => Ok(Record::from_fields(
                    map.iter().map(|(k, v)| (k.clone(), scalar_to_string(v))),
                )),
                other => Err(LeadfillError::parse(format!(
                    "expected a JSON object per record, found {other}"
                ))),
            })
            .collect::<Result<_>>()?
    };

    Ok(keep_named(records))
}

/// Parse a CSV table with a header row.
pub fn load_table<R: std::io::Read>(reader: R) -> Result<Vec<Record>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let headers = csv_reader
        .headers()
        .map_err(|e| LeadfillError::parse(format!("invalid table header: {e}")))?
        .clone();

    let mut records = Vec::new();
    for row in csv_reader.records() {
        let row = row.map_err(|e| LeadfillError::parse(format!("invalid table row: {e}")))?;
        records.push(Record::from_fields(
            headers
                .iter()
                .zip(row.iter())
                .map(|(h, v)| (h.trim().to_string(), v.trim().to_string())),
        ));
    }

    Ok(keep_named(records))
}

fn keep_named(records: Vec<Record>) -> Vec<Record> {
    let total = records.len();
    let kept: Vec<Record> = records
        .into_iter()
        .filter(|r| {
            let name = r.display_name();
            !name.is_empty() && name != NO_DATA_MARKER
        })
        .map(|r| r.with_blank_fields(RESULT_FIELDS.iter().copied()))
        .collect();

    debug!(total, kept = kept.len(), "filtered unnamed records");
    kept
}

fn establishment_to_record(item: &Value) -> Record {
    let null = Value::Null;
    let unit = item.get("uniteLegale").unwrap_or(&null);
    let address = item.get("adresseEtablissement").unwrap_or(&null);

    Record::new(field_str(item, "siret"), field_str(unit, "denominationUniteLegale"))
        .with_field(fields::ADDRESS, format_address(address))
        .with_field(fields::SURNAME, field_str(unit, "nomUniteLegale"))
        .with_field(fields::GIVEN_NAME, field_str(unit, "prenomUsuelUniteLegale"))
}

/// `"<number> <type> <street>, <postcode> <city>"`, skipping missing parts.
fn format_address(address: &Value) -> String {
    let join = |keys: &[&str]| {
        keys.iter()
            .map(|k| field_str(address, k))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    };

    let street = join(&[
        "numeroVoieEtablissement",
        "typeVoieEtablissement",
        "libelleVoieEtablissement",
    ]);
    let city = join(&["codePostalEtablissement", "libelleCommuneEtablissement"]);

    [street, city]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn field_str(value: &Value, key: &str) -> String {
    value.get(key).map(scalar_to_string).unwrap_or_default()
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}
