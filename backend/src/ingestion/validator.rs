//! Row validator: maps one data row to a normalized [`PropertyRecord`] or to every
//! field-level problem found in it. Pure; no I/O.

use common::model::property::{ListingType, PropertyRecord, PropertyStatus, PropertyType};
use common::model::row_error::RowError;
use regex::Regex;
use std::str::FromStr;

/// Every recognized column, in template order.
pub const COLUMNS: [&str; 14] = [
    "title",
    "description",
    "property_type",
    "listing_type",
    "status",
    "price",
    "address",
    "city",
    "state",
    "postal_code",
    "bedrooms",
    "bathrooms",
    "area",
    "amenities",
];

pub const REQUIRED_COLUMNS: [&str; 10] = [
    "title",
    "property_type",
    "listing_type",
    "price",
    "address",
    "city",
    "state",
    "bedrooms",
    "bathrooms",
    "area",
];

const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 5000;
const CURRENCY_SYMBOLS: [char; 4] = ['$', '€', '£', '¥'];

/// One data row as cells aligned with the file header.
#[derive(Clone, Copy, Debug)]
pub struct RowView<'a> {
    header: &'a [String],
    cells: &'a [String],
}

impl<'a> RowView<'a> {
    pub fn new(header: &'a [String], cells: &'a [String]) -> Self {
        Self { header, cells }
    }

    /// Trimmed cell under `column`; `None` when the column is absent or the cell is blank.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = self.header.iter().position(|h| h == column)?;
        self.cells
            .get(idx)
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
    }

    fn extra_cells(&self) -> usize {
        self.cells.len().saturating_sub(self.header.len())
    }
}

/// Upper-cased, whitespace-collapsed postal code.
const POSTAL_CODE_PATTERN: &str = r"^[A-Z0-9][A-Z0-9 -]{1,9}$";

/// Row validation rules. Built once per job and shared across rayon workers.
pub struct RowValidator {
    postal_code: Regex,
}

impl RowValidator {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            postal_code: Regex::new(POSTAL_CODE_PATTERN)?,
        })
    }

    /// Validates a row, collecting every violation instead of stopping at the first.
    pub fn validate(&self, row_number: u32, row: &RowView<'_>) -> Result<PropertyRecord, Vec<RowError>> {
        validate_row(self, row_number, row)
    }
}

fn validate_row(
    rules: &RowValidator,
    row_number: u32,
    row: &RowView<'_>,
) -> Result<PropertyRecord, Vec<RowError>> {
    let mut c = Checker {
        row_number,
        row,
        rules,
        errors: Vec::new(),
    };

    if row.extra_cells() > 0 {
        c.fail(
            "row",
            format!(
                "row has {} cells but the header has {} columns",
                row.cells.len(),
                row.header.len()
            ),
        );
    }

    let title = c.required_text("title", MAX_TITLE_CHARS);
    let description = c.optional_text("description", MAX_DESCRIPTION_CHARS);
    let property_type = c.required_enum::<PropertyType>("property_type", PropertyType::ALL);
    let listing_type = c.required_enum::<ListingType>("listing_type", ListingType::ALL);
    let status = c
        .optional_enum::<PropertyStatus>("status", PropertyStatus::ALL)
        .unwrap_or_default();
    let price = c.decimal("price", false);
    let address = c.required_text("address", MAX_TITLE_CHARS);
    let city = c.required_text("city", MAX_TITLE_CHARS);
    let state = c.required_text("state", MAX_TITLE_CHARS);
    let postal_code = c.postal_code("postal_code");
    let bedrooms = c.whole_number("bedrooms");
    let bathrooms = c.half_steps("bathrooms");
    let area = c.decimal("area", true);
    let amenities = row.get("amenities").map(split_amenities).unwrap_or_default();

    match (
        title,
        property_type,
        listing_type,
        price,
        address,
        city,
        state,
        bedrooms,
        bathrooms,
        area,
    ) {
        (
            Some(title),
            Some(property_type),
            Some(listing_type),
            Some(price),
            Some(address),
            Some(city),
            Some(state),
            Some(bedrooms),
            Some(bathrooms),
            Some(area),
        ) if c.errors.is_empty() => Ok(PropertyRecord {
            title,
            description,
            property_type,
            listing_type,
            status,
            price,
            address,
            city,
            state,
            postal_code,
            bedrooms,
            bathrooms,
            area,
            amenities,
        }),
        _ => Err(c.errors),
    }
}

struct Checker<'r, 'a> {
    row_number: u32,
    row: &'r RowView<'a>,
    rules: &'r RowValidator,
    errors: Vec<RowError>,
}

impl Checker<'_, '_> {
    fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .push(RowError::validation(self.row_number, field, message));
    }

    fn require(&mut self, field: &str) -> Option<String> {
        match self.row.get(field) {
            Some(value) => Some(value.to_string()),
            None => {
                self.fail(field, format!("{} is required", field));
                None
            }
        }
    }

    fn required_text(&mut self, field: &str, max_chars: usize) -> Option<String> {
        let value = collapse_whitespace(&self.require(field)?);
        self.within_length(field, value, max_chars)
    }

    fn optional_text(&mut self, field: &str, max_chars: usize) -> Option<String> {
        let value = collapse_whitespace(self.row.get(field)?);
        self.within_length(field, value, max_chars)
    }

    fn within_length(&mut self, field: &str, value: String, max_chars: usize) -> Option<String> {
        if value.chars().count() > max_chars {
            self.fail(field, format!("{} must be at most {} characters", field, max_chars));
            return None;
        }
        Some(value)
    }

    fn required_enum<T>(&mut self, field: &str, allowed: &[T]) -> Option<T>
    where
        T: FromStr + Copy + ToString,
    {
        let raw = self.require(field)?;
        self.parse_enum(field, &raw, allowed)
    }

    fn optional_enum<T>(&mut self, field: &str, allowed: &[T]) -> Option<T>
    where
        T: FromStr + Copy + ToString,
    {
        let raw = self.row.get(field)?;
        self.parse_enum(field, raw, allowed)
    }

    fn parse_enum<T>(&mut self, field: &str, raw: &str, allowed: &[T]) -> Option<T>
    where
        T: FromStr + Copy + ToString,
    {
        match normalize_token(raw).parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                let choices: Vec<String> = allowed.iter().map(ToString::to_string).collect();
                self.fail(
                    field,
                    format!("{} must be one of: {}", field, choices.join(", ")),
                );
                None
            }
        }
    }

    fn decimal(&mut self, field: &str, strictly_positive: bool) -> Option<f64> {
        let raw = self.require(field)?;
        match parse_decimal(&raw) {
            Some(v) if v < 0.0 => {
                self.fail(field, format!("{} must be a non-negative number", field));
                None
            }
            Some(v) if strictly_positive && v == 0.0 => {
                self.fail(field, format!("{} must be greater than zero", field));
                None
            }
            Some(v) => Some(v),
            None => {
                self.fail(field, format!("{} must be a non-negative number", field));
                None
            }
        }
    }

    fn whole_number(&mut self, field: &str) -> Option<u32> {
        let raw = self.require(field)?;
        match raw.parse::<u32>() {
            Ok(v) => Some(v),
            Err(_) => {
                self.fail(field, format!("{} must be a non-negative whole number", field));
                None
            }
        }
    }

    fn half_steps(&mut self, field: &str) -> Option<f64> {
        let raw = self.require(field)?;
        match parse_decimal(&raw) {
            Some(v) if v >= 0.0 && (v * 2.0).fract() == 0.0 => Some(v),
            Some(v) if v >= 0.0 => {
                self.fail(field, format!("{} must be in steps of 0.5", field));
                None
            }
            _ => {
                self.fail(field, format!("{} must be a non-negative number", field));
                None
            }
        }
    }

    fn postal_code(&mut self, field: &str) -> Option<String> {
        let raw = self.row.get(field)?;
        let normalized = collapse_whitespace(raw).to_ascii_uppercase();
        if self.rules.postal_code.is_match(&normalized) {
            Some(normalized)
        } else {
            self.fail(field, format!("{} `{}` is not a valid postal code", field, raw));
            None
        }
    }
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lower-cases and drops spaces, hyphens and underscores, so `Town-House`,
/// `town house` and `TownHouse` all read as `townhouse`.
fn normalize_token(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !(ch.is_whitespace() || *ch == '-' || *ch == '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Parses `1,250,000`, `$ 1850.50` or `2_500` style amounts. Rejects NaN and infinities.
fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let unsigned = trimmed
        .strip_prefix(|ch: char| CURRENCY_SYMBOLS.contains(&ch))
        .unwrap_or(trimmed)
        .trim_start();
    let digits: String = unsigned.chars().filter(|ch| *ch != ',' && *ch != '_').collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn split_amenities(raw: &str) -> Vec<String> {
    let mut amenities: Vec<String> = Vec::new();
    for item in raw.split([';', '|']) {
        let item = collapse_whitespace(item).to_lowercase();
        if !item.is_empty() && !amenities.contains(&item) {
            amenities.push(item);
        }
    }
    amenities
}
