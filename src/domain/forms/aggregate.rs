//! Usage: Merge per-template form pages into one stamped list, with the flat-endpoint fallback.

use super::client::AccFormsClient;
use super::{FormRecord, FormTemplate, TemplateStamp};
use crate::shared::error::{AppError, AppResult};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormsSource {
    /// Project has no templates; nothing was fetched.
    NoTemplates,
    PerTemplate,
    AlternativeEndpoint,
}

/// Outcome of one `get_all_forms` pass.
#[derive(Debug, Clone)]
pub struct FormsReport {
    pub forms: Vec<FormRecord>,
    pub templates: Vec<FormTemplate>,
    pub source: FormsSource,
    /// Non-fatal failures; the forms list holds whatever succeeded.
    pub issues: Vec<AppError>,
}

impl FormsReport {
    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

impl AccFormsClient {
    /// Fetch every form in the project.
    ///
    /// Zero forms with no recorded failures is a success; zero forms caused by failed requests is
    /// an error. The alternative endpoint is consulted only when the per-template walk produced
    /// no forms at all, even if some templates failed part-way.
    pub async fn get_all_forms(&self, project_id: &str) -> AppResult<FormsReport> {
        tracing::info!("getting all forms for project");

        let listing = self.list_form_templates(project_id).await?;
        let templates = listing.templates;
        // Listed-but-unusable templates still fall through to the alternative endpoint.
        if listing.listed == 0 {
            tracing::warn!("no form templates found");
            return Ok(FormsReport {
                forms: Vec::new(),
                templates,
                source: FormsSource::NoTemplates,
                issues: Vec::new(),
            });
        }

        let mut forms: Vec<FormRecord> = Vec::new();
        let mut issues: Vec<AppError> = Vec::new();

        for template in &templates {
            let paged = self.get_forms_for_template(project_id, template).await;
            let stamp = template.stamp();
            forms.extend(paged.forms.into_iter().map(|mut form| {
                form.stamp_template(&stamp);
                form
            }));
            if let Some(err) = paged.interrupted {
                issues.push(AppError::new(
                    err.code().to_string(),
                    format!("template {}: {}", template.name, err.message()),
                ));
            }
        }

        let mut source = FormsSource::PerTemplate;
        if forms.is_empty() {
            source = FormsSource::AlternativeEndpoint;
            match self.try_alternative_forms_endpoint(project_id).await {
                Ok(alternative) => {
                    forms.extend(alternative.into_iter().map(|mut form| {
                        let stamp = resolve_template_stamp(&form, &templates);
                        form.stamp_template(&stamp);
                        form
                    }));
                }
                Err(err) => {
                    tracing::error!("alternative forms endpoint failed: {err}");
                    issues.push(err);
                }
            }
        }

        if forms.is_empty() && !issues.is_empty() {
            let summary = issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(AppError::new(
                "FETCH_FAILED",
                format!(
                    "no forms retrieved; {} request(s) failed: {summary}",
                    issues.len()
                ),
            ));
        }

        tracing::info!(
            total = forms.len(),
            templates = templates.len(),
            issues = issues.len(),
            source = ?source,
            "total forms across all templates"
        );

        Ok(FormsReport {
            forms,
            templates,
            source,
            issues,
        })
    }
}

/// Join a flat-endpoint form to its template through the nested `formTemplate.id`.
pub(crate) fn resolve_template_stamp(
    form: &FormRecord,
    templates: &[FormTemplate],
) -> TemplateStamp {
    let nested_id = form.nested_template_id();
    let matched = nested_id
        .as_deref()
        .and_then(|id| templates.iter().find(|t| t.id == id));
    match matched {
        Some(template) => template.stamp(),
        None => TemplateStamp::unknown(nested_id),
    }
}
