// Loading case definitions and case records from JSON or TOML files.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use casegate_common::{definition::CaseType, types::CaseRecord};
use serde::de::DeserializeOwned;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    /// `.toml` files are TOML; everything else is read as JSON.
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

pub fn load_case_type(path: &Path) -> Result<CaseType> {
    let case_type: CaseType = load(path)?;
    tracing::debug!(
        case_type = %case_type.id,
        states = case_type.states.len(),
        fields = case_type.fields.len(),
        "loaded case type definition"
    );
    Ok(case_type)
}

pub fn load_case_record(path: &Path) -> Result<CaseRecord> {
    load(path)
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse(&raw, FileFormat::for_path(path)).with_context(|| format!("failed to parse {}", path.display()))
}

fn parse<T: DeserializeOwned>(raw: &str, format: FileFormat) -> Result<T> {
    Ok(match format {
        FileFormat::Json => serde_json::from_str(raw)?,
        FileFormat::Toml => toml::from_str(raw)?,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const TOML_DEFINITION: &str = r#"
id = "Grant"
name = "Grant of probate"
jurisdiction_id = "PROBATE"

[[acls]]
role = "caseworker-probate"
read = true

[[states]]
id = "Open"
name = "Open"
acls = [{ role = "caseworker-probate", read = true, update = true }]

[[fields]]
id = "Deceased"
label = "Deceased"
field_type = "Text"
acls = [{ role = "caseworker-probate", read = true }]

[[tabs]]
id = "summary"
label = "Summary"
order = 1
fields = ["Deceased"]
"#;

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write temp file");
        file
    }

    #[test]
    fn loads_toml_definitions_by_extension() {
        let file = write_temp(".toml", TOML_DEFINITION);
        let case_type = load_case_type(file.path()).expect("definition should load");
        assert_eq!(case_type.id, "Grant");
        assert_eq!(case_type.states[0].id, "Open");
        assert_eq!(case_type.tabs[0].fields, vec!["Deceased".to_string()]);
        assert!(case_type.events.is_empty());
    }

    #[test]
    fn json_and_toml_definitions_agree() {
        let from_toml: CaseType =
            parse(TOML_DEFINITION, FileFormat::Toml).expect("toml should parse");
        let json = serde_json::to_string(&from_toml).expect("serialize");
        let file = write_temp(".json", &json);
        assert_eq!(load_case_type(file.path()).expect("json should load"), from_toml);
    }

    #[test]
    fn unknown_extensions_are_read_as_json() {
        assert_eq!(FileFormat::for_path(Path::new("grant.def")), FileFormat::Json);
        assert_eq!(FileFormat::for_path(Path::new("grant.TOML")), FileFormat::Toml);
    }

    #[test]
    fn parse_errors_name_the_file() {
        let file = write_temp(".json", "{ not json");
        let error = load_case_type(file.path()).expect_err("invalid json");
        assert!(format!("{error:#}").contains("failed to parse"));
    }

    #[test]
    fn loads_case_records() {
        let file = write_temp(
            ".json",
            r#"{
                "id": 7,
                "reference": 1504259907353529,
                "jurisdiction": "PROBATE",
                "case_type_id": "Grant",
                "state": "Open",
                "security_classification": "PUBLIC",
                "data": {"Deceased": "Smith"},
                "created_date": "2024-05-01T08:30:00Z",
                "last_modified": null
            }"#,
        );
        let record = load_case_record(file.path()).expect("record should load");
        assert_eq!(record.reference, 1_504_259_907_353_529);
        assert_eq!(record.data["Deceased"], "Smith");
    }
}
