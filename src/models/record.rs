//! Records and the batches they are submitted in.

use chrono::NaiveDate;

use crate::{AppError, Result};

/// Wire width of a birth date (`YYYY-MM-DD`).
pub const BIRTH_DATE_LEN: usize = 10;

/// A single submitted record.
///
/// Immutable once constructed. The birth date is validated here; name
/// lengths are checked when the record is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    first_name: String,
    last_name: String,
    document: u32,
    birth_date: String,
    number: u16,
}

impl Record {
    /// Build a record, validating the birth date.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidRecord` if `birth_date` is not a real
    /// calendar date written as exactly ten ASCII bytes `YYYY-MM-DD`.
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        document: u32,
        birth_date: impl Into<String>,
        number: u16,
    ) -> Result<Self> {
        let birth_date = birth_date.into();
        validate_birth_date(&birth_date)?;
        Ok(Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            document,
            birth_date,
            number,
        })
    }

    /// First name.
    #[must_use]
    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    /// Last name.
    #[must_use]
    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    /// Document id.
    #[must_use]
    pub fn document(&self) -> u32 {
        self.document
    }

    /// Birth date as `YYYY-MM-DD`.
    #[must_use]
    pub fn birth_date(&self) -> &str {
        &self.birth_date
    }

    /// Submitted number.
    #[must_use]
    pub fn number(&self) -> u16 {
        self.number
    }
}

fn validate_birth_date(raw: &str) -> Result<()> {
    if raw.len() != BIRTH_DATE_LEN || !raw.is_ascii() {
        return Err(AppError::InvalidRecord(format!(
            "birth date must be {BIRTH_DATE_LEN} ascii bytes, got '{raw}'"
        )));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|err| AppError::InvalidRecord(format!("birth date '{raw}': {err}")))?;
    Ok(())
}

/// Ordered records submitted on behalf of one agency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    agency: u8,
    records: Vec<Record>,
}

impl Batch {
    /// Create a batch owned by `agency`.
    #[must_use]
    pub fn new(agency: u8, records: Vec<Record>) -> Self {
        Self { agency, records }
    }

    /// The empty batch announcing that `agency` has no more data.
    #[must_use]
    pub fn end_marker(agency: u8) -> Self {
        Self::new(agency, Vec::new())
    }

    /// Owning agency.
    #[must_use]
    pub fn agency(&self) -> u8 {
        self.agency
    }

    /// Records in submission order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch carries no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
