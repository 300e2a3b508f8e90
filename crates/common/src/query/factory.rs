// Translation of search metadata and filter maps into ordered criteria.

use std::collections::BTreeMap;

use crate::{
    acl::{Capability, RoleSet},
    definition::CaseType,
    error::ConfigurationError,
    query::criterion::{Criterion, FieldPath, MetadataColumn},
    types::SearchMetadata,
};

/// Maps filter field names to storage columns. Unknown names are an error,
/// never silently dropped.
pub trait CriterionFactory {
    fn build(
        &self,
        metadata: &SearchMetadata,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<Criterion>, ConfigurationError>;
}

/// Factory backed by a loaded case type definition.
///
/// Emits, in order: jurisdiction and case type scope, the optional metadata
/// filters, then the filter map in key order. Filter keys name either a
/// metadata column or a case field path rooted at a field the caller may
/// read. A field without a read grant is reported exactly like a field the
/// case type does not define.
pub struct DefinitionCriterionFactory<'a> {
    case_type: &'a CaseType,
    roles: &'a RoleSet,
    escape_scope_for_like: bool,
}

impl<'a> DefinitionCriterionFactory<'a> {
    pub fn new(case_type: &'a CaseType, roles: &'a RoleSet) -> Self {
        Self { case_type, roles, escape_scope_for_like: false }
    }

    /// Escape `%`, `_` and `\` in the scope values so that pattern matching
    /// still selects exactly one jurisdiction and case type.
    pub fn with_like_escaped_scope(mut self, wildcard_search: bool) -> Self {
        self.escape_scope_for_like = wildcard_search;
        self
    }

    fn scope_value(&self, value: &str) -> String {
        if self.escape_scope_for_like {
            escape_like(value)
        } else {
            value.to_owned()
        }
    }

    fn resolve_filter_key(&self, key: &str) -> Result<Target, ConfigurationError> {
        if let Some(column) = MetadataColumn::from_filter_key(key) {
            return Ok(Target::Metadata(column));
        }
        let path = FieldPath::parse(key)?;
        if !self.case_type.field_allows(path.root(), self.roles, Capability::Read) {
            return Err(ConfigurationError::UnknownField(key.to_owned()));
        }
        Ok(Target::Field(path))
    }
}

enum Target {
    Metadata(MetadataColumn),
    Field(FieldPath),
}

impl CriterionFactory for DefinitionCriterionFactory<'_> {
    fn build(
        &self,
        metadata: &SearchMetadata,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<Criterion>, ConfigurationError> {
        if metadata.jurisdiction != self.case_type.jurisdiction_id
            || metadata.case_type_id != self.case_type.id
        {
            return Err(ConfigurationError::MalformedMetadata(format!(
                "case type {} does not belong to jurisdiction {}",
                metadata.case_type_id, metadata.jurisdiction
            )));
        }

        let mut criteria = Vec::with_capacity(2 + filters.len());
        let mut push_metadata = |column: MetadataColumn, value: String| {
            let position = criteria.len();
            criteria.push(Criterion::metadata(column, position, value));
        };

        push_metadata(
            MetadataColumn::Jurisdiction,
            self.scope_value(&self.case_type.jurisdiction_id),
        );
        push_metadata(MetadataColumn::CaseTypeId, self.scope_value(&self.case_type.id));

        let optional = [
            (MetadataColumn::State, &metadata.state),
            (MetadataColumn::Reference, &metadata.case_reference),
            (MetadataColumn::CreatedDate, &metadata.created_date),
            (MetadataColumn::LastModified, &metadata.last_modified_date),
            (MetadataColumn::SecurityClassification, &metadata.security_classification),
        ];
        for (column, value) in optional {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                push_metadata(column, value.to_owned());
            }
        }

        for (key, value) in filters {
            let position = criteria.len();
            let criterion = match self.resolve_filter_key(key)? {
                Target::Metadata(column) => Criterion::metadata(column, position, value.clone()),
                Target::Field(path) => Criterion::field(path, position, value.clone()),
            };
            criteria.push(criterion);
        }

        Ok(criteria)
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        acl::role_set, definition::fixtures::grant_case_type, query::criterion::CriterionColumn,
    };

    fn caseworker() -> RoleSet {
        role_set(["caseworker"])
    }

    fn filters(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn scope_criteria_come_first() {
        let case_type = grant_case_type();
        let roles = caseworker();
        let criteria = DefinitionCriterionFactory::new(&case_type, &roles)
            .build(&SearchMetadata::new("J1", "T1"), &BTreeMap::new())
            .expect("criteria");

        assert_eq!(
            criteria,
            vec![
                Criterion::metadata(MetadataColumn::Jurisdiction, 0, "J1"),
                Criterion::metadata(MetadataColumn::CaseTypeId, 1, "T1"),
            ]
        );
    }

    #[test]
    fn metadata_filters_precede_filter_map_in_key_order() {
        let case_type = grant_case_type();
        let roles = caseworker();
        let mut metadata = SearchMetadata::new("J1", "T1");
        metadata.state = Some("Open".to_string());
        metadata.case_reference = Some("  ".to_string());

        let criteria = DefinitionCriterionFactory::new(&case_type, &roles)
            .build(
                &metadata,
                &filters(&[("Address.Postcode", "SW1"), ("ApplicantName", "Ada")]),
            )
            .expect("criteria");

        let positions: Vec<usize> = criteria.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4]);
        assert_eq!(criteria[2], Criterion::metadata(MetadataColumn::State, 2, "Open"));
        assert_eq!(
            criteria[3].column,
            CriterionColumn::Field(FieldPath::parse("Address.Postcode").expect("path"))
        );
        assert_eq!(criteria[4].sought_value, "Ada");
    }

    #[test]
    fn unknown_field_is_a_configuration_error() {
        let case_type = grant_case_type();
        let roles = caseworker();
        let error = DefinitionCriterionFactory::new(&case_type, &roles)
            .build(&SearchMetadata::new("J1", "T1"), &filters(&[("Nickname", "x")]))
            .expect_err("unknown field");
        assert_eq!(error, ConfigurationError::UnknownField("Nickname".to_string()));
    }

    #[test]
    fn mismatched_jurisdiction_is_malformed_metadata() {
        let case_type = grant_case_type();
        let roles = caseworker();
        let error = DefinitionCriterionFactory::new(&case_type, &roles)
            .build(&SearchMetadata::new("J2", "T1"), &BTreeMap::new())
            .expect_err("wrong jurisdiction");
        assert!(matches!(error, ConfigurationError::MalformedMetadata(_)));
    }

    #[test]
    fn like_escaping_applies_to_scope_only() {
        let mut case_type = grant_case_type();
        case_type.id = "T_1".to_string();
        let roles = caseworker();
        let criteria = DefinitionCriterionFactory::new(&case_type, &roles)
            .with_like_escaped_scope(true)
            .build(&SearchMetadata::new("J1", "T_1"), &filters(&[("ApplicantName", "A%")]))
            .expect("criteria");

        assert_eq!(criteria[1].sought_value, "T\\_1");
        assert_eq!(criteria[2].sought_value, "A%");
    }

    #[test]
    fn unreadable_fields_look_undefined() {
        let case_type = grant_case_type();
        let roles = caseworker();
        let factory = DefinitionCriterionFactory::new(&case_type, &roles);
        let metadata = SearchMetadata::new("J1", "T1");

        let hidden = factory
            .build(&metadata, &filters(&[("RiskScore", "9")]))
            .expect_err("caseworker cannot read RiskScore");
        let nested = factory
            .build(&metadata, &filters(&[("RiskScore.Band", "high")]))
            .expect_err("nested paths share the root grant");
        let undefined = factory
            .build(&metadata, &filters(&[("Nickname", "x")]))
            .expect_err("undefined field");

        assert_eq!(hidden, ConfigurationError::UnknownField("RiskScore".to_string()));
        assert_eq!(nested, ConfigurationError::UnknownField("RiskScore.Band".to_string()));
        assert_eq!(undefined, ConfigurationError::UnknownField("Nickname".to_string()));
    }

    #[test]
    fn readable_fields_follow_the_role_grant() {
        let case_type = grant_case_type();
        let admin = role_set(["admin"]);
        let criteria = DefinitionCriterionFactory::new(&case_type, &admin)
            .build(&SearchMetadata::new("J1", "T1"), &filters(&[("RiskScore", "9")]))
            .expect("admin reads RiskScore");
        assert_eq!(criteria[2].sought_value, "9");

        let error = DefinitionCriterionFactory::new(&case_type, &admin)
            .build(&SearchMetadata::new("J1", "T1"), &filters(&[("ApplicantName", "Ada")]))
            .expect_err("admin has no grant on ApplicantName");
        assert_eq!(error, ConfigurationError::UnknownField("ApplicantName".to_string()));
    }
}
