//! Usage: In-memory forms snapshot shared by the handlers and the single background fetch.
//!
//! Readers clone an `Arc<FormsSnapshot>` and never see a half-applied update. Writers must hold a
//! `LoadTicket`; at most one ticket exists at a time.

use crate::domain::forms::{FormRecord, FormsReport, FormsSource};
use crate::shared::error::{AppError, AppResult};
use crate::shared::mutex_ext::RwLockExt;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

pub const NO_FORMS_MESSAGE: &str = "No forms found in project";
pub const LOAD_ABORTED_MESSAGE: &str = "Data load aborted before completion";

#[derive(Debug, Clone, Default)]
pub struct FormsSnapshot {
    pub forms: Arc<Vec<FormRecord>>,
    pub last_update: Option<DateTime<Utc>>,
    pub is_loading: bool,
    pub error_message: Option<String>,
    /// Non-fatal failures from the last fetch cycle.
    pub issues: Vec<String>,
    pub source: Option<FormsSource>,
}

impl FormsSnapshot {
    pub fn has_forms(&self) -> bool {
        !self.forms.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct FormsStore {
    current: RwLock<Arc<FormsSnapshot>>,
    loading: AtomicBool,
}

impl FormsStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> Arc<FormsSnapshot> {
        self.current.read_or_recover().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Claim the writer slot. `None` while another load holds it.
    pub fn try_begin_load(self: &Arc<Self>) -> Option<LoadTicket> {
        if self
            .loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("load already in progress; rejected second writer");
            return None;
        }

        self.publish(|prev| FormsSnapshot {
            is_loading: true,
            error_message: None,
            ..prev.clone()
        });
        Some(LoadTicket {
            store: Arc::clone(self),
            finished: false,
        })
    }

    /// Same as `try_begin_load` but as a coded error for request handlers.
    pub fn begin_load(self: &Arc<Self>) -> AppResult<LoadTicket> {
        self.try_begin_load()
            .ok_or_else(|| "LOAD_IN_PROGRESS: Data loading already in progress".into())
    }

    fn publish(&self, next: impl FnOnce(&FormsSnapshot) -> FormsSnapshot) {
        let mut guard = self.current.write_or_recover();
        let updated = next(&guard);
        *guard = Arc::new(updated);
    }

    fn release(&self) {
        self.loading.store(false, Ordering::Release);
    }
}

/// Exclusive right to publish the next snapshot.
#[derive(Debug)]
pub struct LoadTicket {
    store: Arc<FormsStore>,
    finished: bool,
}

impl LoadTicket {
    /// Publish a fetch outcome. A failure keeps the forms from the previous cycle.
    pub fn finish(mut self, outcome: AppResult<FormsReport>) {
        let now = Utc::now();
        match outcome {
            Ok(report) => {
                let issues: Vec<String> = report.issues.iter().map(ToString::to_string).collect();
                let error_message = report.is_empty().then(|| NO_FORMS_MESSAGE.to_string());
                tracing::info!(
                    forms = report.forms.len(),
                    issues = issues.len(),
                    "published forms snapshot"
                );
                self.store.publish(|_| FormsSnapshot {
                    forms: Arc::new(report.forms),
                    last_update: Some(now),
                    is_loading: false,
                    error_message,
                    issues,
                    source: Some(report.source),
                });
            }
            Err(err) => self.publish_error(&err),
        }
        self.finished = true;
        self.store.release();
    }

    /// End the load without a fetch, e.g. when authentication failed first.
    pub fn fail(mut self, err: AppError) {
        self.publish_error(&err);
        self.finished = true;
        self.store.release();
    }

    fn publish_error(&self, err: &AppError) {
        tracing::error!("data load failed: {err}");
        let message = format!("Error fetching data: {}", err.message());
        self.store.publish(|prev| FormsSnapshot {
            is_loading: false,
            error_message: Some(message),
            issues: Vec::new(),
            ..prev.clone()
        });
    }
}

impl Drop for LoadTicket {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::warn!("load ticket dropped without publishing a result");
        self.store.publish(|prev| FormsSnapshot {
            is_loading: false,
            error_message: Some(LOAD_ABORTED_MESSAGE.to_string()),
            ..prev.clone()
        });
        self.store.release();
    }
}
