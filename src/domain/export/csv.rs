//! Usage: Long-format CSV export (one row per custom field and per tabular cell).

use crate::domain::forms::FormRecord;
use crate::shared::error::{AppError, AppResult};
use chrono::{DateTime, TimeZone};
use serde::Serialize;
use serde_json::{Map, Value};

pub const CSV_COLUMNS: [&str; 18] = [
    "form_id",
    "form_number",
    "form_name",
    "template_name",
    "field_type",
    "field_name",
    "field_value",
    "field_id",
    "field_section",
    "field_data_type",
    "field_required",
    "status",
    "form_date",
    "created_at",
    "created_by",
    "assignee_id",
    "assignee_type",
    "location_id",
];

const DEFAULT_VALUE_NAME: &str = "textVal";
const VALUE_FALLBACK_KEYS: [&str; 5] = ["textVal", "value", "numberVal", "dateVal", "booleanVal"];

/// Field order must match `CSV_COLUMNS`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CsvRow {
    pub form_id: String,
    pub form_number: String,
    pub form_name: String,
    pub template_name: String,
    pub field_type: String,
    pub field_name: String,
    pub field_value: String,
    pub field_id: String,
    pub field_section: String,
    pub field_data_type: String,
    pub field_required: String,
    pub status: String,
    pub form_date: String,
    pub created_at: String,
    pub created_by: String,
    pub assignee_id: String,
    pub assignee_type: String,
    pub location_id: String,
}

pub fn export_file_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("ACC_Forms_Export_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

pub fn export_forms_csv(forms: &[FormRecord]) -> AppResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(CSV_COLUMNS).map_err(csv_error)?;

    let mut rows = 0usize;
    for form in forms {
        for row in form_rows(form) {
            writer.serialize(&row).map_err(csv_error)?;
            rows += 1;
        }
    }

    tracing::debug!(forms = forms.len(), rows, "built csv export");
    writer
        .into_inner()
        .map_err(|e| format!("SYSTEM_ERROR: csv flush failed: {e}").into())
}

/// Flatten one form's `customValues` and `tabularValues` into export rows.
pub fn form_rows(form: &FormRecord) -> Vec<CsvRow> {
    let base = base_row(form);
    let mut rows = Vec::new();

    for field in form.custom_values() {
        if let Some(field) = field.as_object() {
            rows.push(custom_row(&base, field));
        }
    }

    if let Some(tables) = form.tabular_values() {
        for (table_name, table) in tables {
            let Some(table_rows) = table.as_array() else {
                continue;
            };
            for (index, row) in table_rows.iter().enumerate() {
                let Some(cells) = row.as_object() else {
                    continue;
                };
                for (column, value) in cells {
                    rows.push(CsvRow {
                        field_type: "tabular".to_string(),
                        field_name: format!("{table_name}.{column}"),
                        field_value: cell(Some(value)),
                        field_id: format!("{table_name}_row_{index}_{column}"),
                        field_section: table_name.clone(),
                        field_data_type: "tabular_cell".to_string(),
                        field_required: "false".to_string(),
                        ..base.clone()
                    });
                }
            }
        }
    }

    rows
}

fn base_row(form: &FormRecord) -> CsvRow {
    let get = |key: &str| cell(form.get(key));
    CsvRow {
        form_id: get("id"),
        form_number: get("formNum"),
        form_name: get("name"),
        template_name: get(crate::domain::forms::FIELD_TEMPLATE_NAME),
        status: get("status"),
        form_date: get("formDate"),
        created_at: get("createdAt"),
        created_by: get("createdBy"),
        assignee_id: get("assigneeId"),
        assignee_type: get("assigneeType"),
        location_id: get("locationId"),
        ..CsvRow::default()
    }
}

fn custom_row(base: &CsvRow, field: &Map<String, Value>) -> CsvRow {
    // `valueName` names the slot holding the value; absent means text.
    let value_name: Option<&str> = match field.get("valueName") {
        None => Some(DEFAULT_VALUE_NAME),
        Some(Value::String(name)) if !name.is_empty() => Some(name.as_str()),
        Some(_) => None,
    };

    let value = value_name
        .filter(|name| field.contains_key(*name))
        .and_then(|name| field.get(name))
        .or_else(|| VALUE_FALLBACK_KEYS.iter().find_map(|key| field.get(*key)));

    CsvRow {
        field_type: "custom".to_string(),
        field_name: first_present(field, &["itemLabel", "name"]),
        field_value: cell(value),
        field_id: first_present(field, &["fieldId", "id"]),
        field_section: cell(field.get("sectionLabel")),
        field_data_type: value_name.unwrap_or("text").to_string(),
        field_required: field
            .get("required")
            .map(|v| cell(Some(v)))
            .unwrap_or_else(|| "false".to_string()),
        ..base.clone()
    }
}

fn first_present(field: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| field.get(*key))
        .map(|v| cell(Some(v)))
        .unwrap_or_default()
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

fn csv_error(err: csv::Error) -> AppError {
    AppError::new("SYSTEM_ERROR", format!("csv write failed: {err}")).with_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn form(value: Value) -> FormRecord {
        FormRecord::from_value(value).expect("form")
    }

    fn sample_form() -> FormRecord {
        form(json!({
            "id": "f-1",
            "formNum": 12,
            "name": "Daily Log 12",
            "status": "draft",
            "template_name": "Daily Log",
            "customValues": [
                {"itemLabel": "Weather", "textVal": "Sunny", "fieldId": "c-1", "sectionLabel": "General"},
                {"name": "Crew size", "valueName": "numberVal", "numberVal": 8, "required": true}
            ],
            "tabularValues": {
                "Labor": [
                    {"trade": "Electrical", "hours": 6},
                    {"trade": "Plumbing", "hours": 4}
                ]
            }
        }))
    }

    #[test]
    fn one_row_per_custom_field_and_tabular_cell() {
        let rows = form_rows(&sample_form());
        assert_eq!(rows.len(), 2 + 4);
        assert_eq!(rows.iter().filter(|r| r.field_type == "custom").count(), 2);
        assert_eq!(rows.iter().filter(|r| r.field_type == "tabular").count(), 4);
        assert!(rows.iter().all(|r| r.form_id == "f-1" && r.form_number == "12"));
    }

    #[test]
    fn custom_rows_resolve_value_slot_and_metadata() {
        let rows = form_rows(&sample_form());

        let weather = &rows[0];
        assert_eq!(weather.field_name, "Weather");
        assert_eq!(weather.field_value, "Sunny");
        assert_eq!(weather.field_id, "c-1");
        assert_eq!(weather.field_section, "General");
        assert_eq!(weather.field_data_type, "textVal");
        assert_eq!(weather.field_required, "false");
        assert_eq!(weather.template_name, "Daily Log");

        let crew = &rows[1];
        assert_eq!(crew.field_name, "Crew size");
        assert_eq!(crew.field_value, "8");
        assert_eq!(crew.field_data_type, "numberVal");
        assert_eq!(crew.field_required, "true");
    }

    #[test]
    fn custom_value_falls_back_through_known_slots() {
        let rows = form_rows(&form(json!({
            "customValues": [
                {"name": "a", "valueName": "choiceVal", "dateVal": "2024-05-01"},
                {"name": "b", "valueName": null, "booleanVal": false},
                {"name": "c"}
            ]
        })));
        assert_eq!(rows[0].field_value, "2024-05-01");
        assert_eq!(rows[0].field_data_type, "choiceVal");
        assert_eq!(rows[1].field_value, "false");
        assert_eq!(rows[1].field_data_type, "text");
        assert_eq!(rows[2].field_value, "");
    }

    #[test]
    fn tabular_rows_carry_table_coordinates() {
        let rows = form_rows(&sample_form());
        let cell = rows
            .iter()
            .find(|r| r.field_id == "Labor_row_1_hours")
            .expect("cell");
        assert_eq!(cell.field_name, "Labor.hours");
        assert_eq!(cell.field_value, "4");
        assert_eq!(cell.field_section, "Labor");
        assert_eq!(cell.field_data_type, "tabular_cell");
    }

    #[test]
    fn form_without_fields_contributes_no_rows() {
        assert!(form_rows(&form(json!({"id": "empty"}))).is_empty());
    }

    #[test]
    fn csv_output_has_header_and_one_line_per_row() {
        let bytes = export_forms_csv(&[sample_form()]).expect("csv");
        let text = String::from_utf8(bytes).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], CSV_COLUMNS.join(","));
        assert_eq!(lines.len(), 1 + 6);
    }

    #[test]
    fn csv_with_no_rows_still_has_header() {
        let bytes = export_forms_csv(&[]).expect("csv");
        assert_eq!(String::from_utf8(bytes).expect("utf8").lines().count(), 1);
    }

    #[test]
    fn export_file_name_uses_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(export_file_name(&at), "ACC_Forms_Export_20240309_070501.csv");
    }
}
