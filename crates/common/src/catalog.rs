// Access-filtered definition listings: case types and jurisdictions for a
// requested capability, and the search and workbasket input layouts.
//
// Summaries never carry grants. Every listed state, event and field is one
// the caller's roles hold the requested capability on.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    acl::{has_capability, Capability, RoleSet},
    definition::{CaseType, CaseTypeInput},
};

/// Parses an `access` query value. Only `create`, `read` and `update` are
/// listing capabilities; `delete` is not.
pub fn parse_access(raw: &str) -> Option<Capability> {
    Capability::parse(raw).filter(|capability| *capability != Capability::Delete)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CaseTypeSummary {
    pub id: String,
    pub name: String,
    pub jurisdiction_id: String,
    pub states: Vec<StateSummary>,
    pub events: Vec<EventSummary>,
    pub fields: Vec<FieldSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StateSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EventSummary {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldSummary {
    pub id: String,
    pub label: String,
    pub field_type: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct JurisdictionSummary {
    pub id: String,
    pub case_types: Vec<CaseTypeSummary>,
}

impl CaseTypeSummary {
    /// `None` when the case type ACL does not grant `access` to `roles`.
    pub fn for_access(case_type: &CaseType, roles: &RoleSet, access: Capability) -> Option<Self> {
        if !case_type.allows(roles, access) {
            return None;
        }
        let states = case_type
            .states
            .iter()
            .filter(|state| has_capability(&state.acls, roles, access))
            .map(|state| StateSummary { id: state.id.clone(), name: state.name.clone() })
            .collect();
        let events = case_type
            .events
            .iter()
            .filter(|event| has_capability(&event.acls, roles, access))
            .map(|event| EventSummary {
                id: event.id.clone(),
                name: event.name.clone(),
                description: event.description.clone(),
                order: event.order,
            })
            .collect();
        let fields = case_type
            .fields
            .iter()
            .filter(|field| has_capability(&field.acls, roles, access))
            .map(|field| FieldSummary {
                id: field.id.clone(),
                label: field.label.clone(),
                field_type: field.field_type.clone(),
            })
            .collect();

        Some(Self {
            id: case_type.id.clone(),
            name: case_type.name.clone(),
            jurisdiction_id: case_type.jurisdiction_id.clone(),
            states,
            events,
            fields,
        })
    }
}

/// The case types granting `access`, pruned to the granted parts, in input
/// order.
pub fn case_types_with_access<'a>(
    case_types: impl IntoIterator<Item = &'a CaseType>,
    roles: &RoleSet,
    access: Capability,
) -> Vec<CaseTypeSummary> {
    case_types
        .into_iter()
        .filter_map(|case_type| CaseTypeSummary::for_access(case_type, roles, access))
        .collect()
}

/// Jurisdictions holding at least one case type that grants `access`,
/// ordered by id.
pub fn jurisdictions_with_access<'a>(
    case_types: impl IntoIterator<Item = &'a CaseType>,
    roles: &RoleSet,
    access: Capability,
) -> Vec<JurisdictionSummary> {
    let mut grouped: BTreeMap<String, Vec<CaseTypeSummary>> = BTreeMap::new();
    for summary in case_types_with_access(case_types, roles, access) {
        grouped.entry(summary.jurisdiction_id.clone()).or_default().push(summary);
    }
    grouped
        .into_iter()
        .map(|(id, case_types)| JurisdictionSummary { id, case_types })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Search,
    Workbasket,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SearchInput {
    pub label: String,
    pub order: i32,
    pub field: InputField,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InputField {
    pub id: String,
    pub field_type: String,
}

/// The input layout of `kind`, limited to fields `roles` can read and sorted
/// by display order. Inputs naming an undefined field are dropped.
pub fn authorised_inputs(case_type: &CaseType, roles: &RoleSet, kind: InputKind) -> Vec<SearchInput> {
    let layout: &[CaseTypeInput] = match kind {
        InputKind::Search => &case_type.search_inputs,
        InputKind::Workbasket => &case_type.workbasket_inputs,
    };

    let mut inputs: Vec<SearchInput> = layout
        .iter()
        .filter_map(|input| {
            let field = case_type.field(&input.field_id)?;
            if !has_capability(&field.acls, roles, Capability::Read) {
                return None;
            }
            Some(SearchInput {
                label: input.label.clone().unwrap_or_else(|| field.label.clone()),
                order: input.order,
                field: InputField { id: field.id.clone(), field_type: field.field_type.clone() },
            })
        })
        .collect();
    inputs.sort_by_key(|input| input.order);
    inputs
}
