// Case storage: PostgreSQL when serving, an in-process store for handler
// tests.
//
// The PostgreSQL variant executes the assembled SQL text with its bound
// parameters. The memory variant never sees SQL; it interprets the criteria
// and security scope carried by the same statement.

use std::{cmp::Ordering as CmpOrdering, collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use casegate_common::{
    definition::CaseType,
    query::{
        assembler::{Ordering, SortColumn},
        Criterion, CriterionColumn, MetadataColumn, SecuredStatement, StateRestriction,
    },
    types::{CaseRecord, SortDirection},
};
use serde_json::{Map, Value};
use sqlx::{
    types::{
        chrono::{DateTime, Utc},
        Json,
    },
    PgPool,
};
use tokio::sync::RwLock;

#[derive(Clone)]
pub enum CaseStore {
    Postgres(PgPool),
    Memory(Arc<RwLock<MemoryCaseStore>>),
}

impl CaseStore {
    pub fn memory(store: MemoryCaseStore) -> Self {
        Self::Memory(Arc::new(RwLock::new(store)))
    }

    pub async fn case_type(
        &self,
        jurisdiction: &str,
        case_type_id: &str,
    ) -> Result<Option<CaseType>> {
        match self {
            Self::Postgres(pool) => case_type_pg(pool, jurisdiction, case_type_id).await,
            Self::Memory(store) => Ok(store
                .read()
                .await
                .case_types
                .get(case_type_id)
                .filter(|case_type| case_type.jurisdiction_id == jurisdiction)
                .cloned()),
        }
    }

    /// Every stored definition, or those of one jurisdiction, ordered by
    /// jurisdiction then case type id.
    pub async fn case_types(&self, jurisdiction: Option<&str>) -> Result<Vec<CaseType>> {
        match self {
            Self::Postgres(pool) => case_types_pg(pool, jurisdiction).await,
            Self::Memory(store) => {
                let mut case_types: Vec<CaseType> = store
                    .read()
                    .await
                    .case_types
                    .values()
                    .filter(|case_type| {
                        jurisdiction.is_none_or(|wanted| case_type.jurisdiction_id == wanted)
                    })
                    .cloned()
                    .collect();
                case_types.sort_by(|a, b| {
                    (&a.jurisdiction_id, &a.id).cmp(&(&b.jurisdiction_id, &b.id))
                });
                Ok(case_types)
            }
        }
    }

    pub async fn case_by_reference(
        &self,
        jurisdiction: &str,
        case_type_id: &str,
        reference: i64,
    ) -> Result<Option<CaseRecord>> {
        match self {
            Self::Postgres(pool) => {
                case_by_reference_pg(pool, jurisdiction, case_type_id, reference).await
            }
            Self::Memory(store) => Ok(store
                .read()
                .await
                .cases
                .iter()
                .find(|case| {
                    case.reference == reference
                        && case.jurisdiction == jurisdiction
                        && case.case_type_id == case_type_id
                })
                .cloned()),
        }
    }

    /// Case roles `user_id` holds on the case row `case_id`. Empty when the
    /// user has no association with the case.
    pub async fn case_roles(&self, case_id: i64, user_id: &str) -> Result<Vec<String>> {
        match self {
            Self::Postgres(pool) => case_roles_pg(pool, case_id, user_id).await,
            Self::Memory(store) => Ok(store
                .read()
                .await
                .case_users
                .iter()
                .filter(|link| link.case_data_id == case_id && link.user_id == user_id)
                .map(|link| link.case_role.clone())
                .collect()),
        }
    }

    pub async fn search(&self, statement: &SecuredStatement) -> Result<Vec<CaseRecord>> {
        match self {
            Self::Postgres(pool) => search_pg(pool, statement).await,
            Self::Memory(store) => Ok(store.read().await.search(statement)),
        }
    }

    pub async fn count(&self, statement: &SecuredStatement) -> Result<i64> {
        match self {
            Self::Postgres(pool) => count_pg(pool, statement).await,
            Self::Memory(store) => {
                let matched = store.read().await.matching(statement).count();
                i64::try_from(matched).context("case count overflow")
            }
        }
    }
}

#[derive(sqlx::FromRow)]
struct CaseRow {
    id: i64,
    reference: i64,
    jurisdiction: String,
    case_type_id: String,
    state: String,
    security_classification: String,
    data: Json<Map<String, Value>>,
    created_date: DateTime<Utc>,
    last_modified: Option<DateTime<Utc>>,
}

impl From<CaseRow> for CaseRecord {
    fn from(row: CaseRow) -> Self {
        Self {
            id: row.id,
            reference: row.reference,
            jurisdiction: row.jurisdiction,
            case_type_id: row.case_type_id,
            state: row.state,
            security_classification: row.security_classification,
            data: row.data.0,
            created_date: row.created_date,
            last_modified: row.last_modified,
        }
    }
}

async fn case_type_pg(
    pool: &PgPool,
    jurisdiction: &str,
    case_type_id: &str,
) -> Result<Option<CaseType>> {
    let definition = sqlx::query_scalar::<_, Json<CaseType>>(
        r#"
        SELECT definition
        FROM case_type_definitions
        WHERE id = $1
          AND jurisdiction_id = $2
        "#,
    )
    .bind(case_type_id)
    .bind(jurisdiction)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to load case type definition '{case_type_id}'"))?;

    Ok(definition.map(|Json(case_type)| case_type))
}

async fn case_types_pg(pool: &PgPool, jurisdiction: Option<&str>) -> Result<Vec<CaseType>> {
    let definitions = sqlx::query_scalar::<_, Json<CaseType>>(
        r#"
        SELECT definition
        FROM case_type_definitions
        WHERE $1::TEXT IS NULL OR jurisdiction_id = $1
        ORDER BY jurisdiction_id, id
        "#,
    )
    .bind(jurisdiction)
    .fetch_all(pool)
    .await
    .context("failed to list case type definitions")?;

    Ok(definitions.into_iter().map(|Json(case_type)| case_type).collect())
}

async fn case_by_reference_pg(
    pool: &PgPool,
    jurisdiction: &str,
    case_type_id: &str,
    reference: i64,
) -> Result<Option<CaseRecord>> {
    let row = sqlx::query_as::<_, CaseRow>(
        r#"
        SELECT id, reference, jurisdiction, case_type_id, state,
               security_classification, data, created_date, last_modified
        FROM case_data
        WHERE reference = $1
          AND jurisdiction = $2
          AND case_type_id = $3
        "#,
    )
    .bind(reference)
    .bind(jurisdiction)
    .bind(case_type_id)
    .fetch_optional(pool)
    .await
    .context("failed to load case by reference")?;

    Ok(row.map(CaseRecord::from))
}

async fn case_roles_pg(pool: &PgPool, case_id: i64, user_id: &str) -> Result<Vec<String>> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT case_role
        FROM case_users
        WHERE case_data_id = $1
          AND user_id = $2
        ORDER BY case_role
        "#,
    )
    .bind(case_id)
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("failed to load case roles")
}

async fn search_pg(pool: &PgPool, statement: &SecuredStatement) -> Result<Vec<CaseRecord>> {
    let mut query = sqlx::query_as::<_, CaseRow>(&statement.sql);
    for parameter in &statement.parameters {
        query = query.bind(parameter);
    }
    let rows = query.fetch_all(pool).await.context("case search query failed")?;
    Ok(rows.into_iter().map(CaseRecord::from).collect())
}

async fn count_pg(pool: &PgPool, statement: &SecuredStatement) -> Result<i64> {
    let mut query = sqlx::query_scalar::<_, i64>(&statement.sql);
    for parameter in &statement.parameters {
        query = query.bind(parameter);
    }
    query.fetch_one(pool).await.context("case count query failed")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseUserLink {
    pub case_data_id: i64,
    pub user_id: String,
    pub case_role: String,
}

#[derive(Default)]
pub struct MemoryCaseStore {
    case_types: HashMap<String, CaseType>,
    cases: Vec<CaseRecord>,
    case_users: Vec<CaseUserLink>,
}

impl MemoryCaseStore {
    pub fn with_case_type(mut self, case_type: CaseType) -> Self {
        self.case_types.insert(case_type.id.clone(), case_type);
        self
    }

    pub fn with_case(mut self, record: CaseRecord) -> Self {
        self.cases.push(record);
        self
    }

    pub fn with_case_user(mut self, case_data_id: i64, user_id: &str, case_role: &str) -> Self {
        self.case_users.push(CaseUserLink {
            case_data_id,
            user_id: user_id.to_owned(),
            case_role: case_role.to_owned(),
        });
        self
    }

    fn matching<'a>(
        &'a self,
        statement: &'a SecuredStatement,
    ) -> impl Iterator<Item = &'a CaseRecord> + 'a {
        self.cases.iter().filter(move |case| {
            statement
                .criteria
                .iter()
                .all(|criterion| criterion_matches(criterion, statement.operator_like, case))
                && self.owner_matches(statement.security.owner.as_deref(), case)
                && state_matches(&statement.security.states, &case.state)
        })
    }

    fn search(&self, statement: &SecuredStatement) -> Vec<CaseRecord> {
        let mut rows: Vec<&CaseRecord> = self.matching(statement).collect();
        if let Some(ordering) = statement.ordering {
            rows.sort_by(|left, right| compare_rows(left, right, ordering));
        }

        let rows = rows.into_iter().cloned();
        match statement.page {
            None => rows.collect(),
            Some(page) => rows
                .skip(usize::try_from(page.offset).unwrap_or(usize::MAX))
                .take(page.limit as usize)
                .collect(),
        }
    }

    fn owner_matches(&self, owner: Option<&str>, case: &CaseRecord) -> bool {
        match owner {
            None => true,
            Some(owner) => self
                .case_users
                .iter()
                .any(|link| link.case_data_id == case.id && link.user_id == owner),
        }
    }
}

fn state_matches(restriction: &StateRestriction, state: &str) -> bool {
    match restriction {
        StateRestriction::Unrestricted => true,
        StateRestriction::Only(states) => states.iter().any(|allowed| allowed == state),
        StateRestriction::Nothing => false,
    }
}

fn compare_rows(left: &CaseRecord, right: &CaseRecord, ordering: Ordering) -> CmpOrdering {
    let natural = match ordering.column {
        SortColumn::CreatedDate => left.created_date.cmp(&right.created_date),
        // PostgreSQL sorts NULLs last ascending and first descending.
        SortColumn::LastModified => match (left.last_modified, right.last_modified) {
            (Some(l), Some(r)) => l.cmp(&r),
            (None, None) => CmpOrdering::Equal,
            (None, Some(_)) => CmpOrdering::Greater,
            (Some(_), None) => CmpOrdering::Less,
        },
    };
    match ordering.direction {
        SortDirection::Asc => natural,
        SortDirection::Desc => natural.reverse(),
    }
}

fn criterion_matches(criterion: &Criterion, like: bool, case: &CaseRecord) -> bool {
    match &criterion.column {
        CriterionColumn::Metadata(column) => match metadata_text(*column, case) {
            Some(text) => compare(&text, &criterion.sought_value, like),
            None => false,
        },
        CriterionColumn::Field(path) => {
            let mut current = match case.data.get(path.root()) {
                Some(value) => value,
                None => return false,
            };
            for segment in &path.segments()[1..] {
                current = match current.get(segment.as_str()) {
                    Some(value) => value,
                    None => return false,
                };
            }
            match json_text(current) {
                Some(text) => compare(
                    text.to_uppercase().trim(),
                    criterion.sought_value.to_uppercase().trim(),
                    like,
                ),
                None => false,
            }
        }
    }
}

fn compare(text: &str, sought: &str, like: bool) -> bool {
    if like {
        like_matches(sought, text)
    } else {
        text == sought
    }
}

fn metadata_text(column: MetadataColumn, case: &CaseRecord) -> Option<String> {
    match column {
        MetadataColumn::Jurisdiction => Some(case.jurisdiction.clone()),
        MetadataColumn::CaseTypeId => Some(case.case_type_id.clone()),
        MetadataColumn::State => Some(case.state.clone()),
        MetadataColumn::Reference => Some(case.reference.to_string()),
        MetadataColumn::CreatedDate => Some(case.created_date.format("%Y-%m-%d").to_string()),
        MetadataColumn::LastModified => {
            case.last_modified.map(|modified| modified.format("%Y-%m-%d").to_string())
        }
        MetadataColumn::SecurityClassification => Some(case.security_classification.clone()),
    }
}

/// Text form of a JSON value as returned by the `#>>` operator.
fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LikeToken {
    Literal(char),
    AnyOne,
    AnyMany,
}

fn like_tokens(pattern: &str) -> Vec<LikeToken> {
    let mut tokens = Vec::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '\\' => LikeToken::Literal(chars.next().unwrap_or('\\')),
            '%' => LikeToken::AnyMany,
            '_' => LikeToken::AnyOne,
            other => LikeToken::Literal(other),
        });
    }
    tokens
}

/// SQL `LIKE` with the default backslash escape.
fn like_matches(pattern: &str, text: &str) -> bool {
    let tokens = like_tokens(pattern);
    let text: Vec<char> = text.chars().collect();

    // matched[j]: tokens consumed so far match text[..j]
    let mut matched = vec![false; text.len() + 1];
    matched[0] = true;
    for token in tokens {
        let mut next = vec![false; text.len() + 1];
        match token {
            LikeToken::AnyMany => {
                let mut reachable = false;
                for j in 0..=text.len() {
                    reachable |= matched[j];
                    next[j] = reachable;
                }
            }
            LikeToken::AnyOne => {
                for j in 1..=text.len() {
                    next[j] = matched[j - 1];
                }
            }
            LikeToken::Literal(expected) => {
                for j in 1..=text.len() {
                    next[j] = matched[j - 1] && text[j - 1] == expected;
                }
            }
        }
        matched = next;
    }
    matched[text.len()]
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use casegate_common::{
        acl::{role_set, AccessControlList, Capability},
        definition::{CaseState, CaseType},
        query::{AssemblerConfig, CallerScope, DefinitionCriterionFactory, QueryAssembler},
        types::{AccessLevel, SearchMetadata},
    };
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;

    fn case_type() -> CaseType {
        let worker = AccessControlList::new("caseworker").with_read();
        CaseType {
            id: "Grant".into(),
            name: "Grant of probate".into(),
            jurisdiction_id: "PROBATE".into(),
            security_classification: None,
            acls: vec![worker.clone()],
            states: vec![
                CaseState { id: "Open".into(), name: "Open".into(), acls: vec![worker.clone()] },
                CaseState { id: "Closed".into(), name: "Closed".into(), acls: vec![] },
            ],
            events: vec![],
            fields: vec![casegate_common::definition::CaseField {
                id: "Deceased".into(),
                label: "Deceased".into(),
                field_type: "Complex".into(),
                acls: vec![worker],
                show_condition: None,
            }],
            search_inputs: vec![],
            workbasket_inputs: vec![],
            tabs: vec![],
        }
    }

    fn record(id: i64, state: &str, surname: &str, day: u32) -> CaseRecord {
        CaseRecord {
            id,
            reference: 1_600_000_000_000_000 + id,
            jurisdiction: "PROBATE".into(),
            case_type_id: "Grant".into(),
            state: state.into(),
            security_classification: "PUBLIC".into(),
            data: json!({"Deceased": {"Surname": surname, "Age": 80}})
                .as_object()
                .cloned()
                .expect("object"),
            created_date: Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
            last_modified: None,
        }
    }

    fn store() -> MemoryCaseStore {
        MemoryCaseStore::default()
            .with_case_type(case_type())
            .with_case(record(1, "Open", "Smith", 3))
            .with_case(record(2, "Open", " smith ", 1))
            .with_case(record(3, "Closed", "Smith", 2))
            .with_case(record(4, "Open", "Jones", 4))
            .with_case_user(4, "citizen-1", "[CREATOR]")
    }

    fn statement(
        config: AssemblerConfig,
        filters: &[(&str, &str)],
        access_level: AccessLevel,
        page: Option<u32>,
    ) -> SearchStatementsForTest {
        let case_type = case_type();
        let mut metadata = SearchMetadata::new("PROBATE", "Grant");
        metadata.page = page;
        let filters: BTreeMap<String, String> =
            filters.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
        let caller = CallerScope {
            access_level,
            user_id: "citizen-1".into(),
            authorized_states: case_type
                .authorized_states(&role_set(["caseworker"]), Capability::Read),
        };
        let roles = role_set(["caseworker"]);
        let factory = DefinitionCriterionFactory::new(&case_type, &roles)
            .with_like_escaped_scope(config.wildcard_search);
        QueryAssembler::new(config)
            .assemble_pair(&factory, &metadata, &filters, &caller)
            .expect("statements")
    }

    type SearchStatementsForTest = casegate_common::query::SearchStatements;

    fn ids(records: &[CaseRecord]) -> Vec<i64> {
        records.iter().map(|record| record.id).collect()
    }

    #[test]
    fn field_criteria_compare_trimmed_and_case_insensitive() {
        let pair = statement(
            AssemblerConfig::default(),
            &[("Deceased.Surname", "SMITH")],
            AccessLevel::Granted,
            None,
        );
        let store = store();
        assert_eq!(ids(&store.search(&pair.rows)), vec![2, 1], "Closed is not readable");
        assert_eq!(store.matching(&pair.count).count(), 2);
    }

    #[test]
    fn restricted_callers_only_see_linked_cases() {
        let pair = statement(AssemblerConfig::default(), &[], AccessLevel::Restricted, None);
        assert_eq!(ids(&store().search(&pair.rows)), vec![4]);
    }

    #[test]
    fn fail_closed_state_scope_matches_nothing() {
        let mut pair = statement(AssemblerConfig::default(), &[], AccessLevel::Granted, None);
        pair.rows.security.states = StateRestriction::Nothing;
        assert!(store().search(&pair.rows).is_empty());

        pair.rows.security.states = StateRestriction::Unrestricted;
        assert_eq!(store().search(&pair.rows).len(), 4);
    }

    #[test]
    fn wildcard_mode_uses_like_semantics() {
        let config = AssemblerConfig { wildcard_search: true, ..AssemblerConfig::default() };
        let pair = statement(config, &[("Deceased.Surname", "jo%")], AccessLevel::Granted, None);
        assert_eq!(ids(&store().search(&pair.rows)), vec![4]);
    }

    #[test]
    fn paging_applies_after_ordering() {
        let config = AssemblerConfig { page_size: 1, ..AssemblerConfig::default() };
        let pair = statement(config, &[], AccessLevel::Granted, Some(2));
        assert_eq!(ids(&store().search(&pair.rows)), vec![1]);
        assert_eq!(store().matching(&pair.count).count(), 3);
    }

    #[test]
    fn numeric_json_values_compare_as_text() {
        let pair =
            statement(AssemblerConfig::default(), &[("Deceased.Age", "80")], AccessLevel::Granted, None);
        assert_eq!(store().search(&pair.rows).len(), 3);
    }

    #[test]
    fn like_matcher_handles_wildcards_and_escapes() {
        assert!(like_matches("PRO%", "PROBATE"));
        assert!(like_matches("PR_BATE", "PROBATE"));
        assert!(!like_matches("PR_BATE", "PRBATE"));
        assert!(like_matches("%", ""));
        assert!(like_matches(r"A\_B", "A_B"));
        assert!(!like_matches(r"A\_B", "AXB"));
        assert!(like_matches(r"100\%", "100%"));
        assert!(!like_matches("abc", "abcd"));
    }

    #[tokio::test]
    async fn case_roles_come_from_case_users() {
        let store = CaseStore::memory(store());
        assert_eq!(
            store.case_roles(4, "citizen-1").await.expect("roles"),
            vec!["[CREATOR]".to_string()]
        );
        assert!(store.case_roles(1, "citizen-1").await.expect("roles").is_empty());
    }

    #[tokio::test]
    async fn case_type_lookup_checks_jurisdiction() {
        let store = CaseStore::memory(store());
        assert!(store.case_type("PROBATE", "Grant").await.expect("lookup").is_some());
        assert!(store.case_type("DIVORCE", "Grant").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn case_type_listing_filters_by_jurisdiction() {
        let mut divorce = case_type();
        divorce.id = "Decree".into();
        divorce.jurisdiction_id = "DIVORCE".into();
        let store = CaseStore::memory(store().with_case_type(divorce));

        let all = store.case_types(None).await.expect("listing");
        let ids: Vec<&str> = all.iter().map(|case_type| case_type.id.as_str()).collect();
        assert_eq!(ids, vec!["Decree", "Grant"]);

        let probate = store.case_types(Some("PROBATE")).await.expect("listing");
        assert_eq!(probate.len(), 1);
        assert!(store.case_types(Some("CIVIL")).await.expect("listing").is_empty());
    }
}
