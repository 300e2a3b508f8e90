// Secured, parameterized search statement synthesis.
//
// Caller-supplied filter values only ever reach the statement as bound
// parameters. The ownership and state predicates embed server-derived
// values as literals, and only after they pass `trusted_literal`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    error::ConfigurationError,
    query::{
        criterion::{Criterion, Operator, PlaceholderStyle},
        factory::CriterionFactory,
    },
    types::{AccessLevel, SearchMetadata, SortDirection},
};

pub const CASE_TABLE: &str = "case_data";
pub const CASE_USERS_TABLE: &str = "case_users";
pub const DEFAULT_PAGE_SIZE: u32 = 25;

const AND: &str = " AND ";
const ALWAYS_TRUE: &str = "1 = 1";
const NEVER_TRUE: &str = "1 = 0";
const MAX_LITERAL_LEN: usize = 128;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    Rows,
    Count,
}

/// What to do when the caller is authorized for no state at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StateRestrictionPolicy {
    /// Match no rows.
    #[default]
    FailClosed,
    /// Leave the state column unrestricted.
    OmitWhenEmpty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// Selects `LIKE` instead of `=` for every criterion of every query.
    pub wildcard_search: bool,
    pub placeholder_style: PlaceholderStyle,
    pub page_size: u32,
    pub empty_states: StateRestrictionPolicy,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            wildcard_search: false,
            placeholder_style: PlaceholderStyle::Indexed,
            page_size: DEFAULT_PAGE_SIZE,
            empty_states: StateRestrictionPolicy::FailClosed,
        }
    }
}

/// The caller-dependent inputs to the security predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerScope {
    pub access_level: AccessLevel,
    pub user_id: String,
    /// Case type states the caller may read, from the definition service.
    pub authorized_states: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "states", rename_all = "snake_case")]
pub enum StateRestriction {
    Unrestricted,
    Only(Vec<String>),
    Nothing,
}

/// Structured form of the security predicates, for channels that do not
/// execute SQL text.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SecurityScope {
    /// Set when rows are limited to cases associated with this user.
    pub owner: Option<String>,
    pub states: StateRestriction,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    CreatedDate,
    LastModified,
}

impl SortColumn {
    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "created_date" | "createdDate" => Some(Self::CreatedDate),
            "last_modified" | "lastModified" => Some(Self::LastModified),
            _ => None,
        }
    }

    pub const fn column_name(self) -> &'static str {
        match self {
            Self::CreatedDate => "created_date",
            Self::LastModified => "last_modified",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Ordering {
    pub column: SortColumn,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u64,
}

/// A ready-to-execute statement. `parameters[i]` is `criteria[i].sought_value`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SecuredStatement {
    pub mode: QueryMode,
    pub sql: String,
    pub parameters: Vec<String>,
    pub criteria: Vec<Criterion>,
    pub operator_like: bool,
    pub security: SecurityScope,
    /// Row mode only.
    pub ordering: Option<Ordering>,
    /// Row mode only, when a page was requested.
    pub page: Option<Page>,
}

/// Matching listing and count statements for one search request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SearchStatements {
    pub rows: SecuredStatement,
    pub count: SecuredStatement,
}

#[derive(Debug, Clone, Default)]
pub struct QueryAssembler {
    config: AssemblerConfig,
}

impl QueryAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    pub fn assemble(
        &self,
        factory: &dyn CriterionFactory,
        metadata: &SearchMetadata,
        filters: &BTreeMap<String, String>,
        mode: QueryMode,
        caller: &CallerScope,
    ) -> Result<SecuredStatement, ConfigurationError> {
        let criteria = factory.build(metadata, filters)?;
        self.assemble_criteria(criteria, metadata, mode, caller)
    }

    pub fn assemble_pair(
        &self,
        factory: &dyn CriterionFactory,
        metadata: &SearchMetadata,
        filters: &BTreeMap<String, String>,
        caller: &CallerScope,
    ) -> Result<SearchStatements, ConfigurationError> {
        let criteria = factory.build(metadata, filters)?;
        let rows = self.assemble_criteria(criteria.clone(), metadata, QueryMode::Rows, caller)?;
        let count = self.assemble_criteria(criteria, metadata, QueryMode::Count, caller)?;
        Ok(SearchStatements { rows, count })
    }

    pub fn assemble_criteria(
        &self,
        criteria: Vec<Criterion>,
        metadata: &SearchMetadata,
        mode: QueryMode,
        caller: &CallerScope,
    ) -> Result<SecuredStatement, ConfigurationError> {
        if let Some(misplaced) =
            criteria.iter().enumerate().find(|(index, criterion)| criterion.position != *index)
        {
            return Err(ConfigurationError::MalformedMetadata(format!(
                "criterion at index {} declares position {}",
                misplaced.0, misplaced.1.position
            )));
        }

        let ordering = Ordering {
            column: match metadata.sort_field.as_deref() {
                None => SortColumn::CreatedDate,
                Some(raw) => SortColumn::parse(raw)
                    .ok_or_else(|| ConfigurationError::UnsupportedSortField(raw.to_owned()))?,
            },
            direction: metadata.sort_direction(),
        };
        let page = match metadata.page {
            None => None,
            Some(0) => {
                return Err(ConfigurationError::MalformedMetadata(
                    "page numbers start at 1".to_owned(),
                ))
            }
            Some(page) => Some(Page {
                limit: self.config.page_size,
                offset: u64::from(page - 1) * u64::from(self.config.page_size),
            }),
        };

        let operator = Operator::from_wildcard_flag(self.config.wildcard_search);
        let security = self.security_scope(caller)?;
        let clauses = self.render_where(&criteria, operator, &security);

        let sql = match mode {
            QueryMode::Count => format!("SELECT count(*) FROM {CASE_TABLE} WHERE {clauses}"),
            QueryMode::Rows => {
                let mut sql = format!(
                    "SELECT * FROM {CASE_TABLE} WHERE {clauses} ORDER BY {} {}",
                    ordering.column.column_name(),
                    ordering.direction.as_sql()
                );
                if let Some(page) = page {
                    sql.push_str(&format!(" LIMIT {} OFFSET {}", page.limit, page.offset));
                }
                sql
            }
        };

        let parameters = criteria.iter().map(|criterion| criterion.sought_value.clone()).collect();
        let rows_only = mode == QueryMode::Rows;

        Ok(SecuredStatement {
            mode,
            sql,
            parameters,
            criteria,
            operator_like: operator == Operator::Like,
            security,
            ordering: rows_only.then_some(ordering),
            page: if rows_only { page } else { None },
        })
    }

    fn security_scope(&self, caller: &CallerScope) -> Result<SecurityScope, ConfigurationError> {
        let owner = match caller.access_level {
            AccessLevel::Granted => None,
            AccessLevel::Restricted => Some(trusted_literal(&caller.user_id)?.to_owned()),
        };

        let states = if caller.authorized_states.is_empty() {
            match self.config.empty_states {
                StateRestrictionPolicy::FailClosed => StateRestriction::Nothing,
                StateRestrictionPolicy::OmitWhenEmpty => StateRestriction::Unrestricted,
            }
        } else {
            let states = caller
                .authorized_states
                .iter()
                .map(|state| trusted_literal(state).map(str::to_owned))
                .collect::<Result<Vec<_>, _>>()?;
            StateRestriction::Only(states)
        };

        Ok(SecurityScope { owner, states })
    }

    fn render_where(
        &self,
        criteria: &[Criterion],
        operator: Operator,
        security: &SecurityScope,
    ) -> String {
        let mut clauses = if criteria.is_empty() {
            ALWAYS_TRUE.to_owned()
        } else {
            criteria
                .iter()
                .map(|criterion| criterion.clause(operator, self.config.placeholder_style))
                .collect::<Vec<_>>()
                .join(AND)
        };

        if let Some(owner) = &security.owner {
            clauses.push_str(&format!(
                "{AND}id IN (SELECT cu.case_data_id FROM {CASE_USERS_TABLE} AS cu WHERE user_id = '{owner}')"
            ));
        }

        match &security.states {
            StateRestriction::Unrestricted => {}
            StateRestriction::Nothing => {
                clauses.push_str(AND);
                clauses.push_str(NEVER_TRUE);
            }
            StateRestriction::Only(states) => {
                clauses.push_str(&format!("{AND}state IN ('{}')", states.join("','")));
            }
        }

        clauses
    }
}

/// Accepts only identifiers drawn from the state-id/UUID vocabulary.
pub fn trusted_literal(value: &str) -> Result<&str, ConfigurationError> {
    let valid = !value.is_empty()
        && value.len() <= MAX_LITERAL_LEN
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(value)
    } else {
        Err(ConfigurationError::UntrustedLiteral(value.to_owned()))
    }
}
