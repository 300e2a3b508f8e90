// Displayable case views and their access-controlled construction.

pub mod condition;
pub mod filter;
pub mod materialize;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::acl::AccessControlList;

pub use filter::{filter_case_view, filter_case_view_with_data, readable_case_data};
pub use materialize::materialize_case_view;

/// A case's tab/field/trigger-structured display form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseView {
    pub case_id: String,
    pub case_type: CaseViewType,
    pub state: CaseViewState,
    #[serde(default)]
    pub tabs: Vec<CaseViewTab>,
    #[serde(default)]
    pub triggers: Vec<CaseViewTrigger>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseViewType {
    pub id: String,
    pub name: String,
    pub jurisdiction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseViewState {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseViewTab {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub order: i32,
    /// Only callers holding this role see the tab.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub fields: Vec<CaseViewField>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseViewField {
    pub id: String,
    pub label: String,
    pub field_type: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_condition: Option<String>,
    /// Grants are consulted by the filter and never sent to callers.
    #[serde(default, skip_serializing)]
    pub acls: Vec<AccessControlList>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseViewTrigger {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
}
