//! Usage: HTTP calls against the ACC Forms API (templates, per-template forms, flat forms).

use super::shape::{collection_items, ShapePolicy};
use super::{FormRecord, FormTemplate};
use crate::shared::error::{AppError, AppResult};
use crate::shared::security::sanitize_error_body_snippet;
use reqwest::StatusCode;
use serde_json::Value;

/// Largest page the forms endpoints accept.
pub const FORMS_PAGE_SIZE: usize = 200;

const ERROR_BODY_SNIPPET_CHARS: usize = 300;

/// Parsed template list plus how many entries the API listed before filtering.
#[derive(Debug, Clone, Default)]
pub(crate) struct TemplateListing {
    pub templates: Vec<FormTemplate>,
    pub listed: usize,
}

/// Result of walking every page of one template's forms.
#[derive(Debug, Clone, Default)]
pub struct PagedForms {
    pub forms: Vec<FormRecord>,
    /// Requests issued, including the one that ended the walk.
    pub requests: usize,
    /// Set when a page failed; `forms` holds everything fetched before it.
    pub interrupted: Option<AppError>,
}

#[derive(Debug, Clone)]
pub struct AccFormsClient {
    http: reqwest::Client,
    access_token: String,
    api_base: String,
    page_size: usize,
}

enum PageResponse {
    NotFound,
    Body(Value),
}

impl AccFormsClient {
    /// `api_base` is the forms API root, e.g. `https://developer.api.autodesk.com/construction/forms/v1`.
    pub fn new(
        http: reqwest::Client,
        access_token: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            http,
            access_token: access_token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            page_size: FORMS_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub async fn get_form_templates(&self, project_id: &str) -> AppResult<Vec<FormTemplate>> {
        Ok(self.list_form_templates(project_id).await?.templates)
    }

    pub(crate) async fn list_form_templates(&self, project_id: &str) -> AppResult<TemplateListing> {
        let url = format!("{}/projects/{project_id}/form-templates", self.api_base);
        tracing::info!(project = %short_id(project_id), "fetching form templates");

        let body = match self.get_json(&url, None, "form templates").await? {
            PageResponse::Body(body) => body,
            PageResponse::NotFound => {
                return Err("UPSTREAM_STATUS: form templates returned status=404"
                    .to_string()
                    .into())
            }
        };

        let raw = collection_items(body, ShapePolicy::CoerceBareObject)?;
        let total = raw.len();
        let templates: Vec<FormTemplate> =
            raw.iter().filter_map(FormTemplate::from_value).collect();
        if templates.len() < total {
            tracing::debug!(
                skipped = total - templates.len(),
                "skipped template entries without an object shape or id"
            );
        }

        tracing::info!(count = templates.len(), "found form templates");
        Ok(TemplateListing {
            templates,
            listed: total,
        })
    }

    /// Walk `limit`/`offset` pages until a short page, an empty page or a 404.
    pub async fn get_forms_for_template(
        &self,
        project_id: &str,
        template: &FormTemplate,
    ) -> PagedForms {
        let url = format!(
            "{}/projects/{project_id}/form-templates/{}/forms",
            self.api_base, template.id
        );
        tracing::info!(template = %template.name, "fetching forms for template");

        let mut paged = PagedForms::default();
        let mut offset = 0usize;

        loop {
            paged.requests += 1;
            let page = match self.fetch_forms_page(&url, offset).await {
                Ok(Some(page)) => page,
                Ok(None) => {
                    tracing::info!(template = %template.name, "no forms for template (404)");
                    break;
                }
                Err(err) => {
                    tracing::error!(
                        template = %template.name,
                        offset,
                        kept = paged.forms.len(),
                        "forms page failed: {err}"
                    );
                    paged.interrupted = Some(err);
                    break;
                }
            };

            if page.is_empty() {
                break;
            }

            let page_len = page.len();
            paged.forms.extend(page);
            tracing::debug!(
                template = %template.name,
                fetched = page_len,
                total = paged.forms.len(),
                "fetched forms page"
            );

            if page_len < self.page_size {
                break;
            }
            offset += self.page_size;
        }

        tracing::info!(
            template = %template.name,
            total = paged.forms.len(),
            requests = paged.requests,
            "finished template forms"
        );
        paged
    }

    /// Single-shot flat collection used when the per-template walk finds nothing.
    pub async fn try_alternative_forms_endpoint(
        &self,
        project_id: &str,
    ) -> AppResult<Vec<FormRecord>> {
        let url = format!("{}/projects/{project_id}/forms", self.api_base);
        tracing::info!(project = %short_id(project_id), "trying alternative forms endpoint");

        let body = match self.get_json(&url, None, "alternative forms").await? {
            PageResponse::Body(body) => body,
            PageResponse::NotFound => {
                tracing::info!("alternative forms endpoint not available (404)");
                return Ok(Vec::new());
            }
        };

        let forms = into_forms(collection_items(body, ShapePolicy::WrapperOnly)?);
        tracing::info!(count = forms.len(), "found forms via alternative endpoint");
        Ok(forms)
    }

    async fn fetch_forms_page(
        &self,
        url: &str,
        offset: usize,
    ) -> AppResult<Option<Vec<FormRecord>>> {
        let query = [("limit", self.page_size), ("offset", offset)];
        match self.get_json(url, Some(&query), "template forms").await? {
            PageResponse::NotFound => Ok(None),
            PageResponse::Body(body) => Ok(Some(into_forms(collection_items(
                body,
                ShapePolicy::WrapperOnly,
            )?))),
        }
    }

    async fn get_json(
        &self,
        url: &str,
        query: Option<&[(&str, usize)]>,
        what: &str,
    ) -> AppResult<PageResponse> {
        let mut request = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(query) = query {
            request = request.query(query);
        }

        let response = request.send().await.map_err(|e| {
            AppError::new("SYSTEM_ERROR", format!("{what} request failed: {e}")).with_source(e)
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(PageResponse::NotFound);
        }

        let body = response.text().await.map_err(|e| {
            AppError::new("SYSTEM_ERROR", format!("{what} response read failed: {e}"))
                .with_source(e)
        })?;

        if !status.is_success() {
            let snippet = sanitize_error_body_snippet(&body, ERROR_BODY_SNIPPET_CHARS);
            return Err(format!(
                "UPSTREAM_STATUS: {what} returned status={} body={snippet}",
                status.as_u16()
            )
            .into());
        }

        serde_json::from_str(&body).map(PageResponse::Body).map_err(|e| {
            AppError::new("UPSTREAM_FORMAT", format!("{what} response json invalid: {e}"))
                .with_source(e)
        })
    }
}

fn into_forms(items: Vec<Value>) -> Vec<FormRecord> {
    items.into_iter().filter_map(FormRecord::from_value).collect()
}

/// Project ids are long GUIDs; logs only need the prefix.
fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
