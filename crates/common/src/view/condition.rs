// Field show conditions: `Field="value"`, `Field!="value"`,
// `Field CONTAINS "value"`, joined by ` AND `. `"*"` matches any non-empty
// value. Anything that fails to parse or resolve evaluates to false.

use std::collections::HashMap;

use serde_json::Value;

const AND: &str = " AND ";
const CONTAINS: &str = " CONTAINS ";
const ANY_VALUE: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Equals,
    NotEquals,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
    path: Vec<String>,
    comparison: Comparison,
    expected: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowCondition {
    clauses: Vec<Clause>,
}

impl ShowCondition {
    pub fn parse(raw: &str) -> Option<Self> {
        let clauses = raw.split(AND).map(parse_clause).collect::<Option<Vec<_>>>()?;
        Some(Self { clauses })
    }

    /// `visible` holds only the values the caller is allowed to read.
    pub fn evaluate(&self, visible: &HashMap<&str, &Value>) -> bool {
        self.clauses.iter().all(|clause| clause.holds(visible))
    }
}

/// True when `raw` is absent, or parses and holds against `visible`.
pub fn is_satisfied(raw: Option<&str>, visible: &HashMap<&str, &Value>) -> bool {
    match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        None => true,
        Some(raw) => ShowCondition::parse(raw).is_some_and(|condition| condition.evaluate(visible)),
    }
}

fn parse_clause(raw: &str) -> Option<Clause> {
    let raw = raw.trim();
    let (field, comparison, expected) = if let Some((field, expected)) = raw.split_once("!=") {
        (field, Comparison::NotEquals, expected)
    } else if let Some((field, expected)) = raw.split_once(CONTAINS) {
        (field, Comparison::Contains, expected)
    } else if let Some((field, expected)) = raw.split_once('=') {
        (field, Comparison::Equals, expected)
    } else {
        return None;
    };

    let path: Vec<String> = field.trim().split('.').map(str::to_owned).collect();
    if path
        .iter()
        .any(|segment| segment.is_empty() || !segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
    {
        return None;
    }

    let expected = expected.trim().strip_prefix('"')?.strip_suffix('"')?.to_owned();
    Some(Clause { path, comparison, expected })
}

impl Clause {
    fn holds(&self, visible: &HashMap<&str, &Value>) -> bool {
        let Some(value) = resolve(visible, &self.path) else {
            return false;
        };

        match self.comparison {
            Comparison::Equals => matches_value(value, &self.expected),
            Comparison::NotEquals => !matches_value(value, &self.expected),
            Comparison::Contains => match value {
                Value::Array(items) => items.iter().any(|item| matches_value(item, &self.expected)),
                other => scalar_text(other).is_some_and(|text| text.contains(&self.expected)),
            },
        }
    }
}

fn resolve<'v>(visible: &HashMap<&str, &'v Value>, path: &[String]) -> Option<&'v Value> {
    let (root, rest) = path.split_first()?;
    let mut current: &'v Value = *visible.get(root.as_str())?;
    for segment in rest {
        current = current.get(segment)?;
    }
    Some(current)
}

fn matches_value(value: &Value, expected: &str) -> bool {
    match scalar_text(value) {
        Some(text) if expected == ANY_VALUE => !text.is_empty(),
        Some(text) => text == expected,
        None => false,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
