//! Listing source import
//!
//! Reads a CSV export of the listings spreadsheet into `ListingRecord`s. The
//! reader is lazy: each call to `next` parses one row, and a bad row only
//! yields an error for that row.

use std::collections::{BTreeMap, BTreeSet};
use std::io;

use crate::domain::{is_truthy, BuildError, ListingRecord, ParseError};

/// Maps the source's header names onto record fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    pub id: String,
    /// One or more columns joined with ", " (e.g. street, neighbourhood, city).
    pub address: Vec<String>,
    pub price: String,
    pub description: String,
    pub transaction_hint: String,
    pub rooms: String,
    /// May also be one of the address columns.
    pub neighbourhood: String,
    /// Feature name -> yes/no column, e.g. `parking` -> `has_parking`.
    pub features: BTreeMap<String, String>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            address: vec!["address".to_string()],
            price: "price".to_string(),
            description: "description".to_string(),
            transaction_hint: "transaction".to_string(),
            rooms: "rooms".to_string(),
            neighbourhood: "neighbourhood".to_string(),
            features: default_features(),
        }
    }
}

/// Feature names the query side filters on, each read from `has_<name>`.
pub const FEATURES: [&str; 3] = ["parking", "elevator", "balcony"];

fn default_features() -> BTreeMap<String, String> {
    FEATURES
        .iter()
        .map(|name| (name.to_string(), format!("has_{}", name)))
        .collect()
}

#[derive(Debug)]
struct ColumnIndexes {
    id: usize,
    /// Mapped address columns; `None` for a column the header lacks.
    address: Vec<Option<usize>>,
    price: Option<usize>,
    description: Option<usize>,
    transaction_hint: Option<usize>,
    rooms: Option<usize>,
    neighbourhood: Option<usize>,
    features: Vec<(String, usize)>,
}

pub struct ListingReader<R: io::Read> {
    reader: csv::Reader<R>,
    headers: Vec<String>,
    columns: ColumnIndexes,
    row: csv::ByteRecord,
    done: bool,
}

impl<R: io::Read> ListingReader<R> {
    pub fn new(source: R, mapping: &ColumnMapping) -> Result<Self, BuildError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(source);

        let headers: Vec<String> = reader
            .byte_headers()?
            .iter()
            .map(|h| {
                String::from_utf8_lossy(h)
                    .trim_start_matches('\u{feff}')
                    .trim()
                    .to_string()
            })
            .collect();

        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name.trim()))
        };

        let id = find(&mapping.id).ok_or_else(|| BuildError::MissingColumn(mapping.id.clone()))?;
        let address: Vec<Option<usize>> = mapping.address.iter().map(|c| find(c)).collect();
        if address.iter().all(Option::is_none) {
            tracing::warn!(
                "No address column among {:?}; every listing will be unresolved",
                mapping.address
            );
        }

        let columns = ColumnIndexes {
            id,
            address,
            price: find(&mapping.price),
            description: find(&mapping.description),
            transaction_hint: find(&mapping.transaction_hint),
            rooms: find(&mapping.rooms),
            neighbourhood: find(&mapping.neighbourhood),
            features: mapping
                .features
                .iter()
                .filter_map(|(name, column)| find(column).map(|i| (name.clone(), i)))
                .collect(),
        };

        Ok(Self {
            reader,
            headers,
            columns,
            row: csv::ByteRecord::new(),
            done: false,
        })
    }

    fn field(&self, index: usize, line: u64) -> Result<String, ParseError> {
        let bytes = self.row.get(index).unwrap_or_default();
        std::str::from_utf8(bytes)
            .map(|s| s.trim().to_string())
            .map_err(|_| ParseError::Encoding {
                line,
                column: self.headers[index].clone(),
            })
    }

    fn optional_field(&self, index: Option<usize>, line: u64) -> Result<String, ParseError> {
        match index {
            Some(i) => self.field(i, line),
            None => Ok(String::new()),
        }
    }

    fn current_record(&self, line: u64) -> Result<ListingRecord, ParseError> {
        let listing_id = self.field(self.columns.id, line)?;
        if listing_id.is_empty() {
            return Err(ParseError::MissingId { line });
        }

        let mut address_parts = Vec::with_capacity(self.columns.address.len());
        for &index in &self.columns.address {
            address_parts.push(self.optional_field(index, line)?);
        }
        let address = address_parts
            .iter()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");

        let mut features = BTreeSet::new();
        for (name, index) in &self.columns.features {
            if is_truthy(&self.field(*index, line)?) {
                features.insert(name.clone());
            }
        }

        let mut attributes = BTreeMap::new();
        for (index, header) in self.headers.iter().enumerate() {
            if self.is_mapped(index) || header.is_empty() {
                continue;
            }
            let value = self.field(index, line)?;
            if !value.is_empty() {
                attributes.insert(header.clone(), value);
            }
        }

        Ok(ListingRecord {
            listing_id,
            address,
            address_parts,
            price: self.optional_field(self.columns.price, line)?,
            description: self.optional_field(self.columns.description, line)?,
            transaction_hint: self.optional_field(self.columns.transaction_hint, line)?,
            rooms: self.optional_field(self.columns.rooms, line)?,
            neighbourhood: self.optional_field(self.columns.neighbourhood, line)?,
            features,
            attributes,
            source_line: line,
        })
    }

    fn is_mapped(&self, index: usize) -> bool {
        let c = &self.columns;
        index == c.id
            || c.address.contains(&Some(index))
            || c.price == Some(index)
            || c.description == Some(index)
            || c.transaction_hint == Some(index)
            || c.rooms == Some(index)
            || c.neighbourhood == Some(index)
            || c.features.iter().any(|(_, i)| *i == index)
    }
}

impl<R: io::Read> Iterator for ListingReader<R> {
    type Item = Result<ListingRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.reader.read_byte_record(&mut self.row) {
            Ok(false) => {
                self.done = true;
                None
            }
            Ok(true) => {
                let line = self.row.position().map(|p| p.line()).unwrap_or(0);
                Some(self.current_record(line))
            }
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                // The underlying reader may keep failing; stop after reporting once.
                if matches!(e.kind(), csv::ErrorKind::Io(_)) {
                    self.done = true;
                }
                Some(Err(ParseError::Malformed {
                    line,
                    message: e.to_string(),
                }))
            }
        }
    }
}

/// Row counts from a full parse pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseReport {
    pub rows: usize,
    pub skipped: usize,
}

#[derive(Debug)]
pub struct ParsedListings {
    pub records: Vec<ListingRecord>,
    pub report: ParseReport,
}

/// Parse a whole source, dropping and counting malformed rows.
pub fn parse_listings<R: io::Read>(
    source: R,
    mapping: &ColumnMapping,
) -> Result<ParsedListings, BuildError> {
    let mut report = ParseReport::default();
    let mut records = Vec::new();

    for result in ListingReader::new(source, mapping)? {
        report.rows += 1;
        match result {
            Ok(record) => records.push(record),
            Err(e) => {
                report.skipped += 1;
                tracing::warn!("Skipping row: {}", e);
            }
        }
    }

    tracing::info!(
        "Parsed {} rows ({} skipped)",
        report.rows,
        report.skipped
    );

    Ok(ParsedListings { records, report })
}
