// Request-scoped search types and the case row shape shared across crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sort direction for search listings. Parsed case-insensitively.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ASC" => Some(Self::Asc),
            "DESC" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Caller row visibility for search listings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessLevel {
    /// Every row of the case type, subject to state restrictions.
    Granted,
    /// Only cases the caller is associated with through `case_users`.
    Restricted,
}

/// Search scope and paging for one listing request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchMetadata {
    pub jurisdiction: String,
    pub case_type_id: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub case_reference: Option<String>,
    #[serde(default)]
    pub created_date: Option<String>,
    #[serde(default)]
    pub last_modified_date: Option<String>,
    #[serde(default)]
    pub security_classification: Option<String>,
    /// 1-based page number; `None` returns an unpaged listing.
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub sort_field: Option<String>,
    #[serde(default)]
    pub sort_direction: Option<SortDirection>,
}

impl SearchMetadata {
    pub fn new(jurisdiction: impl Into<String>, case_type_id: impl Into<String>) -> Self {
        Self {
            jurisdiction: jurisdiction.into(),
            case_type_id: case_type_id.into(),
            ..Self::default()
        }
    }

    pub fn sort_direction(&self) -> SortDirection {
        self.sort_direction.unwrap_or_default()
    }
}

/// One row of the case table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseRecord {
    pub id: i64,
    pub reference: i64,
    pub jurisdiction: String,
    pub case_type_id: String,
    pub state: String,
    pub security_classification: String,
    /// Case field values keyed by field id.
    pub data: serde_json::Map<String, serde_json::Value>,
    pub created_date: DateTime<Utc>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Case references are 16 digits with a trailing Luhn check digit.
pub fn is_valid_case_reference(reference: &str) -> bool {
    if reference.len() != 16 || !reference.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let checksum: u32 = reference
        .bytes()
        .rev()
        .enumerate()
        .map(|(index, byte)| {
            let digit = u32::from(byte - b'0');
            if index % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                digit
            }
        })
        .sum();
    checksum % 10 == 0
}
