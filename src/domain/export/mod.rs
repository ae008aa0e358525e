//! Usage: Views over the fetched forms (dashboard JSON summaries and the long-format CSV).

pub mod csv;
pub mod summary;

pub use self::csv::{export_file_name, export_forms_csv, form_rows, CsvRow, CSV_COLUMNS};
pub use summary::{summarize_form, summarize_forms, FormSummary, TableSummary};
