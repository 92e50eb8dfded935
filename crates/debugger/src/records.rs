//! Legacy flat-string form of persisted breakpoints and watchpoints.
//!
//! Older project files store one point per line with the fields joined by
//! `:::`, booleans written as `True`/`False` and absent values as `None`:
//!
//! ```text
//! /src/main.py:::12:::x > 3:::False:::True:::0
//! counter == 10:::False:::False:::True:::2
//! ```
//!
//! New files use the serde mapping form instead; both round-trip.

use crate::error::RegistryError;

/// Joins the fields of a legacy record.
pub const SEPARATOR: &str = ":::";
const NONE: &str = "None";

/// A point that can be written to and read from a legacy record.
pub trait Record: Sized {
    /// Number of fields in a record.
    const FIELDS: usize;

    /// # Errors
    ///
    /// Fails with [`RegistryError::UnrepresentableField`] when a field holds
    /// the separator or a line break.
    fn to_record(&self) -> Result<String, RegistryError>;

    /// # Errors
    ///
    /// Fails with [`RegistryError::MalformedRecord`] unless the record has
    /// exactly [`Record::FIELDS`] well-formed fields.
    fn from_record(record: &str) -> Result<Self, RegistryError>;
}

pub(crate) fn fields<'a, const N: usize>(record: &'a str) -> Result<[&'a str; N], RegistryError> {
    let parts: Vec<&str> = record.trim_end_matches(['\r', '\n']).split(SEPARATOR).collect();
    let found = parts.len();
    parts.try_into().map_err(|_| {
        RegistryError::malformed(record, format!("expected {N} fields, found {found}"))
    })
}

pub(crate) fn join(fields: &[&str]) -> Result<String, RegistryError> {
    if let Some(field) = fields
        .iter()
        .find(|field| field.contains(SEPARATOR) || field.contains(['\r', '\n']))
    {
        return Err(RegistryError::UnrepresentableField(field.to_string()));
    }
    Ok(fields.join(SEPARATOR))
}

pub(crate) fn format_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

pub(crate) fn parse_bool(record: &str, field: &str) -> Result<bool, RegistryError> {
    match field.trim() {
        "True" | "1" => Ok(true),
        "False" | "0" => Ok(false),
        other => Err(RegistryError::malformed(
            record,
            format!("{other:?} is not a boolean"),
        )),
    }
}

pub(crate) fn format_optional(value: Option<&str>) -> &str {
    value.unwrap_or(NONE)
}

pub(crate) fn parse_optional(field: &str) -> Option<String> {
    match field {
        "" | NONE => None,
        other => Some(other.to_string()),
    }
}

pub(crate) fn parse_count(record: &str, field: &str) -> Result<u32, RegistryError> {
    let field = field.trim();
    if field == NONE {
        return Ok(0);
    }
    field
        .parse()
        .map_err(|e| RegistryError::malformed(record, format!("bad count {field:?}: {e}")))
}
