// `casegate filter-view`: prune a case view for a role set.

use std::{fs, path::PathBuf};

use anyhow::Context;
use clap::Args;

use casegate_common::{
    acl::RoleSet,
    definition::CaseType,
    error::ConfigurationError,
    view::{filter_case_view, filter_case_view_with_data, materialize_case_view, CaseView},
};

use crate::definitions;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct FilterViewArgs {
    /// Case type definition file (JSON or TOML).
    #[arg(long, value_name = "FILE")]
    definition: PathBuf,

    /// Case record to materialize into a view (JSON or TOML).
    #[arg(long, value_name = "FILE", group = "view_source")]
    case: Option<PathBuf>,

    /// Already materialized case view JSON, field grants included.
    #[arg(long, value_name = "FILE", group = "view_source")]
    view: Option<PathBuf>,

    /// Role held by the caller. Repeatable.
    #[arg(long = "role", value_name = "ROLE")]
    roles: Vec<String>,
}

pub fn run(args: FilterViewArgs, format: OutputFormat) -> anyhow::Result<()> {
    let view = filtered_view(&args)?;
    output::print_output(format, &view, format_human)?;
    Ok(())
}

fn filtered_view(args: &FilterViewArgs) -> anyhow::Result<CaseView> {
    let case_type = definitions::load_case_type(&args.definition)?;
    let roles: RoleSet = args.roles.iter().cloned().collect();

    let filtered = match (&args.case, &args.view) {
        (Some(path), _) => {
            let record = definitions::load_case_record(path)?;
            ensure_case_type(&case_type, &record.jurisdiction, &record.case_type_id)?;
            let view = materialize_case_view(&record, &case_type);
            filter_case_view_with_data(view, &record.data, &case_type, &roles)?
        }
        (_, Some(path)) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let view: CaseView = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            ensure_case_type(&case_type, &view.case_type.jurisdiction, &view.case_type.id)?;
            filter_case_view(view, &case_type, &roles)?
        }
        (None, None) => anyhow::bail!("either --case or --view is required"),
    };

    tracing::debug!(
        case_id = %filtered.case_id,
        tabs = filtered.tabs.len(),
        triggers = filtered.triggers.len(),
        "filtered case view"
    );
    Ok(filtered)
}

/// Grants only apply to the case type they were defined for.
fn ensure_case_type(
    case_type: &CaseType,
    jurisdiction: &str,
    case_type_id: &str,
) -> Result<(), ConfigurationError> {
    if jurisdiction == case_type.jurisdiction_id && case_type_id == case_type.id {
        return Ok(());
    }
    Err(ConfigurationError::MalformedMetadata(format!(
        "case belongs to {jurisdiction}/{case_type_id} but the definition is {}/{}",
        case_type.jurisdiction_id, case_type.id
    )))
}

fn format_human(view: &CaseView) -> String {
    let mut lines = vec![format!(
        "Case {} ({} / {}) in state {}",
        view.case_id, view.case_type.jurisdiction, view.case_type.id, view.state.name
    )];

    if view.tabs.is_empty() {
        lines.push("No visible tabs.".to_string());
    }
    for tab in &view.tabs {
        lines.push(String::new());
        lines.push(format!("[{}] {}", tab.id, tab.label));
        for field in &tab.fields {
            let value = match &field.value {
                serde_json::Value::Null => "-".to_string(),
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            lines.push(format!("  {}: {value}", field.label));
        }
    }

    lines.push(String::new());
    if view.triggers.is_empty() {
        lines.push("No available events.".to_string());
    } else {
        let names: Vec<&str> = view.triggers.iter().map(|trigger| trigger.name.as_str()).collect();
        lines.push(format!("Events: {}", names.join(", ")));
    }
    lines.join("\n")
}
