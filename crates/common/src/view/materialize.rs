// Builds the unfiltered display form of a case from its row and definition.

use serde_json::Value;

use crate::{
    definition::CaseType,
    types::CaseRecord,
    view::{CaseView, CaseViewField, CaseViewState, CaseViewTab, CaseViewTrigger, CaseViewType},
};

/// Tabs follow the case type layout by `order`; tab fields keep their layout
/// order and carry the field definition's grants. Triggers are the events
/// whose pre-states admit the current state. Nothing here is access
/// filtered; pass the result through [`crate::view::filter_case_view`].
pub fn materialize_case_view(record: &CaseRecord, case_type: &CaseType) -> CaseView {
    let mut layout: Vec<_> = case_type.tabs.iter().collect();
    layout.sort_by_key(|tab| tab.order);

    let tabs = layout
        .into_iter()
        .map(|tab| CaseViewTab {
            id: tab.id.clone(),
            label: tab.label.clone(),
            order: tab.order,
            role: tab.role.clone(),
            fields: tab
                .fields
                .iter()
                .filter_map(|field_id| case_type.field(field_id))
                .enumerate()
                .map(|(index, field)| CaseViewField {
                    id: field.id.clone(),
                    label: field.label.clone(),
                    field_type: field.field_type.clone(),
                    value: record.data.get(&field.id).cloned().unwrap_or(Value::Null),
                    order: i32::try_from(index + 1).ok(),
                    show_condition: field.show_condition.clone(),
                    acls: field.acls.clone(),
                })
                .collect(),
        })
        .collect();

    let mut events: Vec<_> =
        case_type.events.iter().filter(|event| event.available_in(&record.state)).collect();
    events.sort_by_key(|event| event.order.unwrap_or(i32::MAX));

    let triggers = events
        .into_iter()
        .map(|event| CaseViewTrigger {
            id: event.id.clone(),
            name: event.name.clone(),
            description: event.description.clone(),
            order: event.order,
        })
        .collect();

    let state_name = case_type
        .state(&record.state)
        .map(|state| state.name.clone())
        .unwrap_or_else(|| record.state.clone());

    CaseView {
        case_id: record.reference.to_string(),
        case_type: CaseViewType {
            id: case_type.id.clone(),
            name: case_type.name.clone(),
            jurisdiction: case_type.jurisdiction_id.clone(),
        },
        state: CaseViewState { id: record.state.clone(), name: state_name },
        tabs,
        triggers,
    }
}
