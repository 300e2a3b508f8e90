// Case type definitions as loaded from the definition store.

use serde::{Deserialize, Serialize};

use crate::acl::{has_capability, AccessControlList, Capability, RoleSet};

/// Event pre-state wildcard: the event is available in every state.
pub const ANY_STATE: &str = "*";

/// A case type with its ACLs, workflow states, events, fields and tab layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseType {
    pub id: String,
    pub name: String,
    pub jurisdiction_id: String,
    #[serde(default)]
    pub security_classification: Option<String>,
    #[serde(default)]
    pub acls: Vec<AccessControlList>,
    #[serde(default)]
    pub states: Vec<CaseState>,
    #[serde(default)]
    pub events: Vec<CaseEvent>,
    #[serde(default)]
    pub fields: Vec<CaseField>,
    /// Fields offered as search criteria, each subject to the field's grant.
    #[serde(default)]
    pub search_inputs: Vec<CaseTypeInput>,
    /// Fields offered as workbasket filters, each subject to the field's grant.
    #[serde(default)]
    pub workbasket_inputs: Vec<CaseTypeInput>,
    #[serde(default)]
    pub tabs: Vec<CaseTypeTab>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseState {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub acls: Vec<AccessControlList>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseEvent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub order: Option<i32>,
    /// States the event can be triggered from; `*` means any.
    #[serde(default)]
    pub pre_states: Vec<String>,
    #[serde(default)]
    pub acls: Vec<AccessControlList>,
}

impl CaseEvent {
    pub fn available_in(&self, state_id: &str) -> bool {
        self.pre_states.iter().any(|state| state == ANY_STATE || state == state_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseField {
    pub id: String,
    pub label: String,
    pub field_type: String,
    #[serde(default)]
    pub acls: Vec<AccessControlList>,
    #[serde(default)]
    pub show_condition: Option<String>,
}

/// Tab layout: an ordered list of field ids, optionally restricted to a role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseTypeTab {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// One entry of a search or workbasket input layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseTypeInput {
    pub field_id: String,
    /// Overrides the field label when set.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub order: i32,
}

impl CaseTypeInput {
    pub fn new(field_id: impl Into<String>, order: i32) -> Self {
        Self { field_id: field_id.into(), label: None, order }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl CaseType {
    pub fn field(&self, field_id: &str) -> Option<&CaseField> {
        self.fields.iter().find(|field| field.id == field_id)
    }

    pub fn state(&self, state_id: &str) -> Option<&CaseState> {
        self.states.iter().find(|state| state.id == state_id)
    }

    pub fn event(&self, event_id: &str) -> Option<&CaseEvent> {
        self.events.iter().find(|event| event.id == event_id)
    }

    pub fn allows(&self, roles: &RoleSet, capability: Capability) -> bool {
        has_capability(&self.acls, roles, capability)
    }

    /// An unknown state carries no grants, so it is never accessible.
    pub fn state_allows(&self, state_id: &str, roles: &RoleSet, capability: Capability) -> bool {
        self.state(state_id).is_some_and(|state| has_capability(&state.acls, roles, capability))
    }

    /// State ids, in definition order, whose ACL grants `capability` to `roles`.
    pub fn authorized_states(&self, roles: &RoleSet, capability: Capability) -> Vec<String> {
        self.states
            .iter()
            .filter(|state| has_capability(&state.acls, roles, capability))
            .map(|state| state.id.clone())
            .collect()
    }

    /// An undefined field carries no grants, so it is never accessible.
    pub fn field_allows(&self, field_id: &str, roles: &RoleSet, capability: Capability) -> bool {
        self.field(field_id).is_some_and(|field| has_capability(&field.acls, roles, capability))
    }

    /// Ids of the fields whose ACL grants `capability` to `roles`.
    pub fn permitted_fields(&self, roles: &RoleSet, capability: Capability) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|field| has_capability(&field.acls, roles, capability))
            .map(|field| field.id.as_str())
            .collect()
    }
}
