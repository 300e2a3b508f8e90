// Role-based pruning of a materialized case view.
//
// Order matters: case type read gate, field read + show condition, tab
// removal, then trigger authorization. Every step keeps input ordering and
// treats a missing grant as a denial.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::{
    acl::{has_capability, Capability, RoleSet},
    definition::CaseType,
    error::AccessDeniedError,
    view::{condition, CaseView, CaseViewField, CaseViewTab, CaseViewTrigger},
};

/// Reduce `view` to what `roles` may see and trigger.
///
/// Fails with [`AccessDeniedError`] when no held role can read the case
/// type; nothing of the view is returned in that case. Show conditions are
/// evaluated against the readable fields present in the view's tabs only;
/// use [`filter_case_view_with_data`] when the case data is at hand.
pub fn filter_case_view(
    view: CaseView,
    case_type: &CaseType,
    roles: &RoleSet,
) -> Result<CaseView, AccessDeniedError> {
    filter_case_view_with_data(view, &Map::new(), case_type, roles)
}

/// Like [`filter_case_view`], but show conditions may also reference any
/// field of `data` that `roles` can read, whether or not a tab displays it.
pub fn filter_case_view_with_data(
    view: CaseView,
    data: &Map<String, Value>,
    case_type: &CaseType,
    roles: &RoleSet,
) -> Result<CaseView, AccessDeniedError> {
    if !case_type.allows(roles, Capability::Read) {
        return Err(AccessDeniedError::new(case_type.id.clone()));
    }

    let CaseView { case_id, case_type: view_type, state, tabs, triggers } = view;

    let mut readable_values: HashMap<String, Value> =
        readable_case_data(data, case_type, roles).into_iter().collect();
    readable_values.extend(
        tabs.iter()
            .flat_map(|tab| tab.fields.iter())
            .filter(|field| has_capability(&field.acls, roles, Capability::Read))
            .map(|field| (field.id.clone(), field.value.clone())),
    );
    let visible: HashMap<&str, &Value> =
        readable_values.iter().map(|(id, value)| (id.as_str(), value)).collect();

    let tabs = tabs
        .into_iter()
        .map(|tab| filter_tab_fields(tab, roles, &visible))
        .filter(|tab| tab_displayable(tab, roles))
        .collect();

    let triggers = authorized_triggers(triggers, case_type, &state.id, roles);

    Ok(CaseView { case_id, case_type: view_type, state, tabs, triggers })
}

fn filter_tab_fields(tab: CaseViewTab, roles: &RoleSet, visible: &HashMap<&str, &Value>) -> CaseViewTab {
    let fields: Vec<CaseViewField> = tab
        .fields
        .into_iter()
        .filter(|field| {
            has_capability(&field.acls, roles, Capability::Read)
                && condition::is_satisfied(field.show_condition.as_deref(), visible)
        })
        .collect();
    CaseViewTab { fields, ..tab }
}

fn tab_displayable(tab: &CaseViewTab, roles: &RoleSet) -> bool {
    if tab.fields.is_empty() {
        return false;
    }
    match tab.role.as_deref().map(str::trim).filter(|role| !role.is_empty()) {
        None => true,
        Some(role) => roles.contains(role),
    }
}

fn authorized_triggers(
    triggers: Vec<CaseViewTrigger>,
    case_type: &CaseType,
    state_id: &str,
    roles: &RoleSet,
) -> Vec<CaseViewTrigger> {
    if !case_type.allows(roles, Capability::Update)
        || !case_type.state_allows(state_id, roles, Capability::Update)
    {
        return Vec::new();
    }

    triggers
        .into_iter()
        .filter(|trigger| {
            case_type
                .event(&trigger.id)
                .is_some_and(|event| has_capability(&event.acls, roles, Capability::Create))
        })
        .collect()
}

/// Case data limited to the fields `roles` may read, for search listings.
pub fn readable_case_data(
    data: &Map<String, Value>,
    case_type: &CaseType,
    roles: &RoleSet,
) -> Map<String, Value> {
    case_type
        .permitted_fields(roles, Capability::Read)
        .into_iter()
        .filter_map(|field_id| data.get(field_id).map(|value| (field_id.to_owned(), value.clone())))
        .collect()
}
