use chrono::Utc;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::{self, ApiError, PaymentReceipt, QueryBackend};
use crate::workflow::{
    export_file_name, export_xlsx, filter_view, import_xlsx, sum_field, AggregateScope,
    ExportSummary, FilterCriteria, ImportSummary, Record, ResultSet, WorkflowError,
};

/// Static shape of one page: which inputs its filter form has, which columns
/// the search box looks at, what makes a row complete, and how it exports.
#[derive(Debug)]
pub struct PageDef {
    pub name: &'static str,
    pub title: &'static str,
    pub criteria_fields: &'static [&'static str],
    pub searchable_fields: &'static [&'static str],
    pub required_fields: &'static [&'static str],
    pub total_field: Option<&'static str>,
    /// (field, header) in column order.
    pub export_columns: &'static [(&'static str, &'static str)],
    pub report_name: &'static str,
    pub sheet_name: &'static str,
}

pub static APPLICATION: PageDef = PageDef {
    name: "application",
    title: "Re-assessment Application",
    criteria_fields: &["session", "examType", "rollNo", "studentName"],
    searchable_fields: &["subjectCode", "subject", "paper"],
    required_fields: &["subject", "rollNo"],
    total_field: Some("fee"),
    export_columns: &[
        ("rollNo", "Roll No"),
        ("student", "Student Name"),
        ("subjectCode", "Subject Code"),
        ("subject", "Subject"),
        ("paper", "Paper"),
        ("fee", "Fee"),
    ],
    report_name: "Reassessment_Application",
    sheet_name: "Application",
};

pub static MARKS: PageDef = PageDef {
    name: "marks",
    title: "Re-assessment Marks Entry",
    criteria_fields: &["session", "semester", "course", "subject"],
    searchable_fields: &["rollNo", "student", "subject"],
    required_fields: &["rollNo", "subject"],
    total_field: Some("revisedMarks"),
    export_columns: &[
        ("rollNo", "Roll No"),
        ("student", "Student Name"),
        ("subject", "Subject"),
        ("originalMarks", "Original Marks"),
        ("revisedMarks", "Revised Marks"),
    ],
    report_name: "Reassessment_Marks",
    sheet_name: "Marks",
};

pub static REPORT: PageDef = PageDef {
    name: "report",
    title: "Re-assessment Report",
    criteria_fields: &["session", "status"],
    searchable_fields: &["student", "subject", "status"],
    required_fields: &["student", "subject"],
    total_field: Some("fee"),
    export_columns: &[
        ("student", "Student Name"),
        ("subject", "Subject"),
        ("status", "Status"),
        ("fee", "Fee"),
    ],
    report_name: "Reassessment_Report",
    sheet_name: "Report",
};

pub static PAGES: [&PageDef; 3] = [&APPLICATION, &MARKS, &REPORT];

pub fn page_def(name: &str) -> Option<&'static PageDef> {
    PAGES.iter().copied().find(|p| p.name == name)
}

impl PageDef {
    pub fn describe(&self) -> Value {
        json!({
            "name": self.name,
            "title": self.title,
            "criteriaFields": self.criteria_fields,
            "searchableFields": self.searchable_fields,
            "requiredFields": self.required_fields,
            "totalField": self.total_field,
            "exportColumns": self
                .export_columns
                .iter()
                .map(|(f, h)| json!({ "field": f, "header": h }))
                .collect::<Vec<_>>(),
            "exportFileName": export_file_name(self.report_name),
        })
    }
}

/// What a Search did to the page.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Replaced { rows: usize },
    Resolved { student: Option<Record> },
}

/// State owned by one page for the lifetime of the process.
#[derive(Debug)]
pub struct PageSession {
    pub def: &'static PageDef,
    pub criteria: FilterCriteria,
    pub results: ResultSet,
    /// Student resolved by the application page's Search.
    pub identity: Option<Record>,
    pub payment: Option<PaymentReceipt>,
}

impl PageSession {
    pub fn new(def: &'static PageDef) -> Self {
        let results = if def.name == REPORT.name {
            ResultSet::from_records(backend::sample_report())
        } else {
            ResultSet::new()
        };
        Self {
            def,
            criteria: FilterCriteria::new(def.criteria_fields),
            results,
            identity: None,
            payment: None,
        }
    }

    pub fn set_criterion(&mut self, field: &str, value: &str) -> Result<(), WorkflowError> {
        self.criteria.set_field(field, value)
    }

    /// The application page resolves who is applying; every other page swaps
    /// its rows for the backend's answer. Subject rows and the payment receipt
    /// belong to one student, so they are dropped when the resolved student
    /// changes.
    pub fn search(&mut self, backend: &dyn QueryBackend) -> Result<SearchOutcome, ApiError> {
        if self.def.name == APPLICATION.name {
            let student = backend.resolve_student(&self.criteria)?;
            let previous = self.identity.as_ref().map(|s| s.id.as_str());
            let changed = previous != student.as_ref().map(|s| s.id.as_str());
            if changed && (!self.results.is_empty() || self.payment.is_some()) {
                info!(
                    page = self.def.name,
                    dropped = self.results.len(),
                    "student changed, clearing subjects"
                );
                self.results.replace(Vec::new());
                self.payment = None;
            }
            info!(
                page = self.def.name,
                resolved = student.is_some(),
                "student lookup"
            );
            self.identity = student.clone();
            return Ok(SearchOutcome::Resolved { student });
        }
        let rows = backend.query(self.def.name, &self.criteria)?;
        info!(page = self.def.name, rows = rows.len(), "search replaced results");
        self.results.replace(rows);
        Ok(SearchOutcome::Replaced {
            rows: self.results.len(),
        })
    }

    /// Appends a row built from `fields` with a fresh id. On the application
    /// page the resolved student's roll number and name are stamped on first,
    /// so nothing is added until a Search has found someone.
    pub fn append(
        &mut self,
        fields: &serde_json::Map<String, Value>,
    ) -> Result<Option<Record>, WorkflowError> {
        let mut record = Record::from_json_fields(Uuid::new_v4().to_string(), fields)?;
        if self.def.name == APPLICATION.name {
            record.fields.remove("rollNo");
            record.fields.remove("student");
            if let Some(student) = &self.identity {
                record.set("studentId", student.id.as_str());
                record.set("rollNo", student.text("rollNo"));
                record.set("student", student.text("student"));
                record.set("appliedAt", Utc::now().to_rfc3339());
            }
        }
        let added = self.results.append(record.clone(), self.def.required_fields);
        debug!(page = self.def.name, added, len = self.results.len(), "append");
        Ok(added.then_some(record))
    }

    pub fn view<'a>(&'a self, term: &str) -> impl Iterator<Item = &'a Record> + 'a {
        filter_view(self.results.records(), term, self.def.searchable_fields)
    }

    pub fn total(&self, scope: AggregateScope, term: &str) -> Option<f64> {
        let field = self.def.total_field?;
        Some(match scope {
            AggregateScope::All => self.results.total(field),
            AggregateScope::Visible => sum_field(self.view(term), field),
        })
    }

    /// Exports the rows visible through `term` to
    /// `<out_dir>/<ReportName>_Export.xlsx`.
    pub fn export(&self, out_dir: &Path, term: &str) -> anyhow::Result<ExportSummary> {
        let out_path = out_dir.join(export_file_name(self.def.report_name));
        let summary = export_xlsx(
            self.view(term),
            self.def.export_columns,
            self.def.sheet_name,
            &out_path,
        )?;
        info!(
            page = self.def.name,
            rows = summary.rows_exported,
            path = %summary.path.to_string_lossy(),
            "exported workbook"
        );
        Ok(summary)
    }

    /// Parses an uploaded workbook and appends every complete row.
    /// Returns the parse summary and how many rows were appended.
    pub fn upload(&mut self, path: &Path) -> anyhow::Result<(ImportSummary, usize)> {
        let summary = import_xlsx(path, self.def.export_columns)?;
        let mut appended = 0usize;
        for record in summary.records.iter().cloned() {
            if self.results.append(record, self.def.required_fields) {
                appended += 1;
            }
        }
        info!(
            page = self.def.name,
            parsed = summary.records.len(),
            appended,
            "upload intake"
        );
        Ok((summary, appended))
    }
}
