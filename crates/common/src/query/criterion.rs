// Positional filter predicates and their SQL clause rendering.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Maximum depth of a case field path (`Field.Sub.Leaf`).
const MAX_FIELD_PATH_DEPTH: usize = 8;
const MAX_IDENTIFIER_LEN: usize = 128;

/// Comparison operator applied uniformly to every criterion of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    Like,
}

impl Operator {
    pub const fn from_wildcard_flag(wildcard_search: bool) -> Self {
        if wildcard_search {
            Self::Like
        } else {
            Self::Equals
        }
    }

    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::Like => "LIKE",
        }
    }
}

/// How bound-parameter placeholders are spelled in the statement text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?0`, `?1`, ... (0-based, matches criterion positions).
    #[default]
    Indexed,
    /// `$1`, `$2`, ... (PostgreSQL, 1-based).
    Dollar,
}

impl PlaceholderStyle {
    pub fn placeholder(self, position: usize) -> String {
        match self {
            Self::Indexed => format!("?{position}"),
            Self::Dollar => format!("${}", position + 1),
        }
    }
}

/// First-class columns of the case table that can be filtered on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MetadataColumn {
    Jurisdiction,
    CaseTypeId,
    State,
    Reference,
    CreatedDate,
    LastModified,
    SecurityClassification,
}

impl MetadataColumn {
    /// Resolve a filter key naming a metadata column.
    pub fn from_filter_key(key: &str) -> Option<Self> {
        match key {
            "jurisdiction" => Some(Self::Jurisdiction),
            "case_type" | "case_type_id" => Some(Self::CaseTypeId),
            "state" => Some(Self::State),
            "case_reference" | "reference" => Some(Self::Reference),
            "created_date" => Some(Self::CreatedDate),
            "last_modified" | "last_modified_date" => Some(Self::LastModified),
            "security_classification" => Some(Self::SecurityClassification),
            _ => None,
        }
    }

    pub const fn column_name(self) -> &'static str {
        match self {
            Self::Jurisdiction => "jurisdiction",
            Self::CaseTypeId => "case_type_id",
            Self::State => "state",
            Self::Reference => "reference",
            Self::CreatedDate => "created_date",
            Self::LastModified => "last_modified",
            Self::SecurityClassification => "security_classification",
        }
    }

    /// Left-hand side expression; non-text columns compare as text.
    fn expression(self) -> &'static str {
        match self {
            Self::Reference => "CAST(reference AS TEXT)",
            Self::CreatedDate => "to_char(created_date, 'YYYY-MM-DD')",
            Self::LastModified => "to_char(last_modified, 'YYYY-MM-DD')",
            other => other.column_name(),
        }
    }
}

/// A validated path into the JSON `data` column, e.g. `Address.Postcode`.
///
/// Serialized as the dotted string; deserialization goes through
/// [`FieldPath::parse`], so a path is never empty and every segment is an
/// identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self, ConfigurationError> {
        let segments: Vec<String> = raw.split('.').map(str::to_owned).collect();
        if segments.len() > MAX_FIELD_PATH_DEPTH
            || segments.iter().any(|segment| !is_identifier(segment))
        {
            return Err(ConfigurationError::UnknownField(raw.to_owned()));
        }
        Ok(Self(segments))
    }

    pub fn root(&self) -> &str {
        self.0.first().map_or("", String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    fn expression(&self) -> String {
        format!("data #>> '{{{}}}'", self.0.join(","))
    }
}

impl TryFrom<String> for FieldPath {
    type Error = ConfigurationError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.0.join(".")
    }
}

fn is_identifier(segment: &str) -> bool {
    !segment.is_empty()
        && segment.len() <= MAX_IDENTIFIER_LEN
        && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum CriterionColumn {
    Metadata(MetadataColumn),
    Field(FieldPath),
}

/// One filter predicate. `position` numbers both the placeholder and the
/// bound parameter, so criteria and parameters must stay in the same order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Criterion {
    pub column: CriterionColumn,
    pub position: usize,
    pub sought_value: String,
}

impl Criterion {
    pub fn metadata(column: MetadataColumn, position: usize, value: impl Into<String>) -> Self {
        Self { column: CriterionColumn::Metadata(column), position, sought_value: value.into() }
    }

    pub fn field(path: FieldPath, position: usize, value: impl Into<String>) -> Self {
        Self { column: CriterionColumn::Field(path), position, sought_value: value.into() }
    }

    /// `<column> <operator> <placeholder>`. Case field values are compared
    /// trimmed and case-insensitively.
    pub fn clause(&self, operator: Operator, style: PlaceholderStyle) -> String {
        let placeholder = style.placeholder(self.position);
        match &self.column {
            CriterionColumn::Metadata(column) => {
                format!("{} {} {}", column.expression(), operator.as_sql(), placeholder)
            }
            CriterionColumn::Field(path) => format!(
                "TRIM(UPPER({})) {} TRIM(UPPER({}))",
                path.expression(),
                operator.as_sql(),
                placeholder
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_clause_uses_indexed_placeholder() {
        let criterion = Criterion::metadata(MetadataColumn::State, 0, "Open");
        assert_eq!(criterion.clause(Operator::Equals, PlaceholderStyle::Indexed), "state = ?0");
    }

    #[test]
    fn dollar_placeholders_are_one_based() {
        let criterion = Criterion::metadata(MetadataColumn::State, 2, "Open");
        assert_eq!(criterion.clause(Operator::Like, PlaceholderStyle::Dollar), "state LIKE $3");
    }

    #[test]
    fn non_text_columns_compare_as_text() {
        let reference = Criterion::metadata(MetadataColumn::Reference, 1, "1504259907353529");
        let created = Criterion::metadata(MetadataColumn::CreatedDate, 2, "2024-01-31");
        assert_eq!(
            reference.clause(Operator::Equals, PlaceholderStyle::Indexed),
            "CAST(reference AS TEXT) = ?1"
        );
        assert_eq!(
            created.clause(Operator::Equals, PlaceholderStyle::Indexed),
            "to_char(created_date, 'YYYY-MM-DD') = ?2"
        );
    }

    #[test]
    fn field_clause_indexes_into_data_column() {
        let path = FieldPath::parse("Address.Postcode").expect("valid path");
        let criterion = Criterion::field(path, 3, "SW1");
        assert_eq!(
            criterion.clause(Operator::Equals, PlaceholderStyle::Indexed),
            "TRIM(UPPER(data #>> '{Address,Postcode}')) = TRIM(UPPER(?3))"
        );
    }

    #[test]
    fn field_path_rejects_injection_attempts() {
        for raw in ["", "a..b", "Name'}'; DROP TABLE case_data; --", "a b", "x.y}"] {
            assert_eq!(
                FieldPath::parse(raw),
                Err(ConfigurationError::UnknownField(raw.to_owned())),
                "{raw:?} must be rejected"
            );
        }
    }

    #[test]
    fn deserialized_field_paths_are_validated() {
        let path: FieldPath =
            serde_json::from_value(serde_json::json!("Address.Postcode")).expect("valid path");
        assert_eq!(path.segments(), ["Address", "Postcode"]);
        assert_eq!(serde_json::to_value(&path).expect("serialize"), "Address.Postcode");

        for raw in ["", "Name'}'", "a.}"] {
            assert!(
                serde_json::from_value::<FieldPath>(serde_json::json!(raw)).is_err(),
                "{raw:?} must not deserialize"
            );
        }
        assert!(serde_json::from_value::<FieldPath>(serde_json::json!([])).is_err());
    }

    #[test]
    fn field_path_depth_is_bounded() {
        let deep = vec!["a"; MAX_FIELD_PATH_DEPTH + 1].join(".");
        assert!(FieldPath::parse(&deep).is_err());
    }

    #[test]
    fn filter_keys_resolve_metadata_aliases() {
        assert_eq!(MetadataColumn::from_filter_key("case_reference"), Some(MetadataColumn::Reference));
        assert_eq!(
            MetadataColumn::from_filter_key("last_modified_date"),
            Some(MetadataColumn::LastModified)
        );
        assert_eq!(MetadataColumn::from_filter_key("ApplicantName"), None);
    }
}
