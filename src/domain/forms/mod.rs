//! Usage: ACC form and form-template records plus the client that fetches and merges them.

mod aggregate;
mod client;
mod shape;


use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use aggregate::{FormsReport, FormsSource};
pub use client::{AccFormsClient, PagedForms, FORMS_PAGE_SIZE};

pub const UNNAMED_TEMPLATE_NAME: &str = "Unnamed Template";
pub const UNKNOWN_TEMPLATE_NAME: &str = "Unknown Template";
pub const UNKNOWN_TEMPLATE_TYPE: &str = "unknown";

pub const FIELD_TEMPLATE_NAME: &str = "template_name";
pub const FIELD_TEMPLATE_TYPE: &str = "template_type";
pub const FIELD_TEMPLATE_ID: &str = "template_id";

/// One form as returned by the API, plus the injected template join fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormRecord(Map<String, Value>);

impl FormRecord {
    /// Wrap an API value; anything that is not a JSON object is not a form.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn template_name(&self) -> Option<&str> {
        self.str_field(FIELD_TEMPLATE_NAME)
    }

    pub fn template_type(&self) -> Option<&str> {
        self.str_field(FIELD_TEMPLATE_TYPE)
    }

    pub fn template_id(&self) -> Option<&str> {
        self.str_field(FIELD_TEMPLATE_ID)
    }

    /// Entries of `customValues`; missing or non-list yields nothing.
    pub fn custom_values(&self) -> &[Value] {
        self.0
            .get("customValues")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// `tabularValues` table map, if present and well-formed.
    pub fn tabular_values(&self) -> Option<&Map<String, Value>> {
        self.0.get("tabularValues").and_then(Value::as_object)
    }

    /// Identifier of the owning template embedded as `formTemplate.id`.
    pub fn nested_template_id(&self) -> Option<String> {
        self.0
            .get("formTemplate")
            .and_then(Value::as_object)
            .and_then(|t| t.get("id"))
            .and_then(id_to_string)
    }

    pub fn stamp_template(&mut self, stamp: &TemplateStamp) {
        self.0.insert(
            FIELD_TEMPLATE_NAME.to_string(),
            Value::String(stamp.name.clone()),
        );
        self.0.insert(
            FIELD_TEMPLATE_TYPE.to_string(),
            Value::String(stamp.template_type.clone()),
        );
        self.0.insert(
            FIELD_TEMPLATE_ID.to_string(),
            stamp.id.clone().map(Value::String).unwrap_or(Value::Null),
        );
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Template fields the fetcher needs as a join key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormTemplate {
    pub id: String,
    pub name: String,
    pub template_type: String,
}

impl FormTemplate {
    /// Parse one templates-collection entry. Entries without an id cannot own forms.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let id = obj.get("id").and_then(id_to_string)?;
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(UNNAMED_TEMPLATE_NAME)
            .to_string();
        let template_type = obj
            .get("templateType")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_TEMPLATE_TYPE)
            .to_string();
        Some(Self {
            id,
            name,
            template_type,
        })
    }

    pub fn stamp(&self) -> TemplateStamp {
        TemplateStamp {
            name: self.name.clone(),
            template_type: self.template_type.clone(),
            id: Some(self.id.clone()),
        }
    }
}

/// Metadata written onto each form to join it to its template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateStamp {
    pub name: String,
    pub template_type: String,
    pub id: Option<String>,
}

impl TemplateStamp {
    /// Placeholder for a form whose template is not in the fetched list.
    pub fn unknown(nested_id: Option<String>) -> Self {
        Self {
            name: UNKNOWN_TEMPLATE_NAME.to_string(),
            template_type: UNKNOWN_TEMPLATE_TYPE.to_string(),
            id: nested_id,
        }
    }
}

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
