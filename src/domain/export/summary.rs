//! Usage: Compact per-form JSON summaries served by `/api/forms-data`.

use crate::domain::forms::{FormRecord, FIELD_TEMPLATE_NAME, FIELD_TEMPLATE_TYPE};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

const SUMMARY_VALUE_KEYS: [&str; 3] = ["textVal", "numberVal", "dateVal"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    pub row_count: usize,
    /// Keys of the first row, in API order.
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSummary {
    pub id: Value,
    pub form_num: Value,
    pub name: Value,
    pub status: Value,
    pub form_date: Value,
    pub template_name: Value,
    pub template_type: Value,
    pub created_at: Value,
    pub updated_at: Value,
    pub assignee_id: Value,
    pub location_id: Value,
    pub custom_fields_count: usize,
    pub tabular_data_count: usize,
    pub has_notes: bool,
    pub has_description: bool,
    pub custom_fields: Map<String, Value>,
    /// Serialized as an object keyed by table name, in API order.
    #[serde(serialize_with = "serialize_tables")]
    pub tabular_data: Vec<(String, TableSummary)>,
}

fn serialize_tables<S: Serializer>(
    tables: &[(String, TableSummary)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(tables.iter().map(|(name, table)| (name, table)))
}

pub fn summarize_forms(forms: &[FormRecord]) -> Vec<FormSummary> {
    forms.iter().map(summarize_form).collect()
}

pub fn summarize_form(form: &FormRecord) -> FormSummary {
    let field = |key: &str| form.get(key).cloned().unwrap_or(Value::Null);
    let tables = form.tabular_values();

    FormSummary {
        id: field("id"),
        form_num: field("formNum"),
        name: field("name"),
        status: field("status"),
        form_date: field("formDate"),
        template_name: field(FIELD_TEMPLATE_NAME),
        template_type: field(FIELD_TEMPLATE_TYPE),
        created_at: field("createdAt"),
        updated_at: field("updatedAt"),
        assignee_id: field("assigneeId"),
        location_id: field("locationId"),
        custom_fields_count: form.custom_values().len(),
        tabular_data_count: tables.map(Map::len).unwrap_or(0),
        has_notes: has_text(form, "notes"),
        has_description: has_text(form, "description"),
        custom_fields: custom_fields(form),
        tabular_data: tables.map(table_summaries).unwrap_or_default(),
    }
}

fn has_text(form: &FormRecord, key: &str) -> bool {
    form.str_field(key).is_some_and(|s| !s.trim().is_empty())
}

fn custom_fields(form: &FormRecord) -> Map<String, Value> {
    let mut out = Map::new();
    for field in form.custom_values().iter().filter_map(Value::as_object) {
        // A present-but-null `itemLabel` hides `name`.
        let label = match field.get("itemLabel") {
            Some(label) => label.as_str(),
            None => field.get("name").and_then(Value::as_str),
        };
        let Some(label) = label.filter(|l| !l.is_empty()) else {
            continue;
        };
        let value = SUMMARY_VALUE_KEYS
            .iter()
            .find_map(|key| field.get(*key))
            .cloned()
            .unwrap_or_else(|| Value::String(String::new()));
        out.insert(label.to_string(), value);
    }
    out
}

fn table_summaries(tables: &Map<String, Value>) -> Vec<(String, TableSummary)> {
    tables
        .iter()
        .filter_map(|(name, table)| {
            let rows = table.as_array()?;
            let columns = rows
                .first()
                .and_then(Value::as_object)
                .map(|row| row.keys().cloned().collect())
                .unwrap_or_default();
            Some((
                name.clone(),
                TableSummary {
                    row_count: rows.len(),
                    columns,
                },
            ))
        })
        .collect()
}
