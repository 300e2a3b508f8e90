// `casegate explain`: show the secured statements a search would run.

use std::{collections::BTreeMap, path::PathBuf};

use clap::Args;

use casegate_common::{
    acl::{Capability, RoleSet},
    error::AccessDeniedError,
    query::{
        AssemblerConfig, CallerScope, DefinitionCriterionFactory, PlaceholderStyle,
        QueryAssembler, SearchStatements, SecuredStatement, StateRestriction,
        StateRestrictionPolicy,
    },
    types::{AccessLevel, SearchMetadata, SortDirection},
};

use crate::definitions;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ExplainArgs {
    /// Case type definition file (JSON or TOML).
    #[arg(long, value_name = "FILE")]
    definition: PathBuf,

    /// Role held by the caller. Repeatable.
    #[arg(long = "role", value_name = "ROLE")]
    roles: Vec<String>,

    /// Caller user id used by the ownership restriction.
    #[arg(long, default_value = "cli")]
    user: String,

    /// Limit results to cases associated with `--user`.
    #[arg(long)]
    restricted: bool,

    /// Case state to filter on.
    #[arg(long)]
    state: Option<String>,

    /// Case reference to filter on.
    #[arg(long)]
    reference: Option<String>,

    /// 1-based page number.
    #[arg(long)]
    page: Option<u32>,

    /// Rows per page.
    #[arg(long, default_value_t = casegate_common::query::assembler::DEFAULT_PAGE_SIZE)]
    page_size: u32,

    /// `created_date` or `last_modified`.
    #[arg(long)]
    sort_field: Option<String>,

    /// `asc` or `desc`.
    #[arg(long, value_parser = parse_sort_direction)]
    sort_direction: Option<SortDirection>,

    /// Field filter as KEY=VALUE. Repeatable.
    #[arg(long = "filter", value_name = "KEY=VALUE", value_parser = parse_filter)]
    filters: Vec<(String, String)>,

    /// Match every criterion with LIKE instead of `=`.
    #[arg(long)]
    wildcard: bool,

    /// Use `$1`-style placeholders instead of `?0`.
    #[arg(long)]
    dollar: bool,

    /// Leave states unrestricted when the roles authorize none.
    #[arg(long)]
    empty_states_fail_open: bool,
}

pub fn run(args: ExplainArgs, format: OutputFormat) -> anyhow::Result<()> {
    let statements = explain(&args)?;
    output::print_output(format, &statements, format_human)?;
    Ok(())
}

fn explain(args: &ExplainArgs) -> anyhow::Result<SearchStatements> {
    let case_type = definitions::load_case_type(&args.definition)?;
    let roles: RoleSet = args.roles.iter().cloned().collect();
    if !case_type.allows(&roles, Capability::Read) {
        return Err(AccessDeniedError::new(case_type.id.clone()).into());
    }

    let assembler = QueryAssembler::new(assembler_config(args));
    let caller = CallerScope {
        access_level: if args.restricted { AccessLevel::Restricted } else { AccessLevel::Granted },
        user_id: args.user.clone(),
        authorized_states: case_type.authorized_states(&roles, Capability::Read),
    };
    let metadata = SearchMetadata {
        state: args.state.clone(),
        case_reference: args.reference.clone(),
        page: args.page,
        sort_field: args.sort_field.clone(),
        sort_direction: args.sort_direction,
        ..SearchMetadata::new(case_type.jurisdiction_id.clone(), case_type.id.clone())
    };
    let filters: BTreeMap<String, String> = args.filters.iter().cloned().collect();
    let factory = DefinitionCriterionFactory::new(&case_type, &roles)
        .with_like_escaped_scope(args.wildcard);

    let statements = assembler.assemble_pair(&factory, &metadata, &filters, &caller)?;
    tracing::debug!(
        case_type = %case_type.id,
        parameters = statements.rows.parameters.len(),
        "assembled search statements"
    );
    Ok(statements)
}

fn assembler_config(args: &ExplainArgs) -> AssemblerConfig {
    AssemblerConfig {
        wildcard_search: args.wildcard,
        placeholder_style: if args.dollar {
            PlaceholderStyle::Dollar
        } else {
            PlaceholderStyle::Indexed
        },
        page_size: args.page_size,
        empty_states: if args.empty_states_fail_open {
            StateRestrictionPolicy::OmitWhenEmpty
        } else {
            StateRestrictionPolicy::FailClosed
        },
    }
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    let (key, value) =
        raw.split_once('=').ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("filter key is empty in `{raw}`"));
    }
    Ok((key.to_owned(), value.to_owned()))
}

fn parse_sort_direction(raw: &str) -> Result<SortDirection, String> {
    SortDirection::parse(raw).ok_or_else(|| format!("expected asc or desc, got `{raw}`"))
}

fn format_human(statements: &SearchStatements) -> String {
    let mut lines = Vec::new();
    render_statement(&mut lines, "Listing", &statements.rows);
    lines.push(String::new());
    render_statement(&mut lines, "Count", &statements.count);
    lines.push(String::new());

    let security = &statements.rows.security;
    if let Some(owner) = &security.owner {
        lines.push(format!("Restricted to cases associated with {owner}"));
    }
    lines.push(match &security.states {
        StateRestriction::Unrestricted => "States: unrestricted".to_string(),
        StateRestriction::Only(states) => format!("States: {}", states.join(", ")),
        StateRestriction::Nothing => "States: none readable (matches no rows)".to_string(),
    });
    lines.join("\n")
}

fn render_statement(lines: &mut Vec<String>, title: &str, statement: &SecuredStatement) {
    lines.push(format!("{title}:"));
    lines.push(format!("  {}", statement.sql));
    for (position, value) in statement.parameters.iter().enumerate() {
        lines.push(format!("  [{position}] {value:?}"));
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: ExplainArgs,
    }

    const DEFINITION: &str = r#"{
        "id": "Grant",
        "name": "Grant of probate",
        "jurisdiction_id": "PROBATE",
        "acls": [{"role": "caseworker", "read": true}, {"role": "citizen", "read": true}],
        "states": [
            {"id": "Open", "name": "Open", "acls": [{"role": "caseworker", "read": true}, {"role": "citizen", "read": true}]},
            {"id": "Closed", "name": "Closed", "acls": [{"role": "caseworker", "read": true}]}
        ],
        "fields": [
            {"id": "Deceased", "label": "Deceased", "field_type": "Complex",
             "acls": [{"role": "caseworker", "read": true}]},
            {"id": "RiskScore", "label": "Risk score", "field_type": "Number",
             "acls": [{"role": "admin", "read": true}]}
        ]
    }"#;

    fn definition_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().expect("temp file");
        file.write_all(DEFINITION.as_bytes()).expect("write definition");
        file
    }

    fn parse_args(file: &tempfile::NamedTempFile, extra: &[&str]) -> ExplainArgs {
        let path = file.path().to_str().expect("utf-8 temp path").to_string();
        let mut argv = vec!["explain".to_string(), "--definition".to_string(), path];
        argv.extend(extra.iter().map(|arg| arg.to_string()));
        TestCli::try_parse_from(argv).expect("arguments should parse").args
    }

    #[test]
    fn unrestricted_caller_gets_state_clause_and_no_owner() {
        let file = definition_file();
        let args = parse_args(&file, &["--role", "caseworker", "--state", "Open"]);
        let statements = explain(&args).expect("statements");

        assert!(statements.rows.sql.contains("state IN ('Open','Closed')"));
        assert!(!statements.rows.sql.contains("case_users"));
        assert!(statements.rows.sql.ends_with("ORDER BY created_date ASC"));
        assert_eq!(statements.rows.parameters, vec!["PROBATE", "Grant", "Open"]);
        assert_eq!(statements.count.parameters, statements.rows.parameters);
    }

    #[test]
    fn restricted_caller_adds_owner_clause() {
        let file = definition_file();
        let args = parse_args(&file, &["--role", "citizen", "--restricted", "--user", "u1"]);
        let statements = explain(&args).expect("statements");

        assert_eq!(statements.rows.security.owner.as_deref(), Some("u1"));
        assert!(statements.count.sql.contains("user_id = 'u1'"));
        assert_eq!(
            statements.rows.security.states,
            StateRestriction::Only(vec!["Open".to_string()])
        );
    }

    #[test]
    fn field_filters_and_dollar_placeholders() {
        let file = definition_file();
        let args = parse_args(
            &file,
            &["--role", "caseworker", "--dollar", "--filter", "Deceased.Surname=Smith"],
        );
        let statements = explain(&args).expect("statements");

        assert!(statements.rows.sql.contains("$3"));
        assert_eq!(statements.rows.parameters.last().map(String::as_str), Some("Smith"));
    }

    #[test]
    fn roles_without_read_are_denied() {
        let file = definition_file();
        let args = parse_args(&file, &["--role", "judge"]);
        let error = explain(&args).expect_err("judge cannot read Grant");
        assert!(error.downcast_ref::<AccessDeniedError>().is_some());
    }

    #[test]
    fn unknown_filter_fields_are_configuration_errors() {
        let file = definition_file();
        let args = parse_args(&file, &["--role", "caseworker", "--filter", "Colour=red"]);
        let error = explain(&args).expect_err("Colour is not a field");
        assert!(format!("{error:#}").contains("Colour"));
    }

    #[test]
    fn unreadable_filter_fields_are_rejected_like_unknown_ones() {
        let file = definition_file();
        let args = parse_args(&file, &["--role", "caseworker", "--filter", "RiskScore=9"]);
        let error = explain(&args).expect_err("caseworker cannot read RiskScore");
        assert!(format!("{error:#}").contains("unknown search field: RiskScore"));

        let args = parse_args(
            &file,
            &["--role", "admin", "--role", "caseworker", "--filter", "RiskScore=9"],
        );
        assert!(explain(&args).is_ok());
    }

    #[test]
    fn filter_values_must_be_key_value_pairs() {
        assert_eq!(parse_filter("a.b= x "), Ok(("a.b".to_string(), " x ".to_string())));
        assert!(parse_filter("novalue").is_err());
        assert!(parse_filter("=x").is_err());
        assert!(parse_sort_direction("sideways").is_err());
    }

    #[test]
    fn human_format_lists_both_statements() {
        let file = definition_file();
        let args = parse_args(&file, &["--role", "caseworker"]);
        let output = format_human(&explain(&args).expect("statements"));

        assert!(output.contains("Listing:"));
        assert!(output.contains("Count:"));
        assert!(output.contains("[0] \"PROBATE\""));
        assert!(output.contains("States: Open, Closed"));
    }
}
