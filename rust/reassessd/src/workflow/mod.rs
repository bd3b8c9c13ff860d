//! Tabular search/filter/aggregate/export workflow shared by every page.
//!
//! A page owns a [`FilterCriteria`] and a [`ResultSet`]. Everything shown to
//! the user is derived from those two on demand: the filtered view, the
//! running total and the exported workbook.

mod criteria;
mod error;
mod export;
mod record;
mod result_set;
mod view;

pub use criteria::FilterCriteria;
pub use error::WorkflowError;
pub use export::{export_file_name, export_xlsx, import_xlsx, ExportSummary, ImportSummary};
pub use record::{CellValue, Record};
pub use result_set::{sum_field, ResultSet};
pub use view::{filter_view, AggregateScope};
