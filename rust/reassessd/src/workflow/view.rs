use super::{Record, WorkflowError};
use serde_json::json;

/// Which records a running total covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregateScope {
    /// Every record in the result set, whatever the search box holds.
    #[default]
    All,
    /// Only the records currently visible through the search term.
    Visible,
}

impl AggregateScope {
    pub fn parse(raw: Option<&str>) -> Result<Self, WorkflowError> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("all") => Ok(AggregateScope::All),
            Some("visible") => Ok(AggregateScope::Visible),
            Some(other) => Err(WorkflowError::new(
                "bad_params",
                "totalScope must be one of: all, visible",
            )
            .with_details(json!({ "totalScope": other }))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AggregateScope::All => "all",
            AggregateScope::Visible => "visible",
        }
    }
}

/// Case-insensitive substring test over the searchable fields only.
/// `needle` must already be lowercased.
fn matches_term(record: &Record, needle: &str, searchable: &[&str]) -> bool {
    if needle.is_empty() {
        return true;
    }
    searchable
        .iter()
        .any(|f| record.text(f).to_lowercase().contains(needle))
}

/// Lazily yields the records matching `term`, in result-set order.
/// A blank term yields every record.
pub fn filter_view<'a>(
    records: &'a [Record],
    term: &str,
    searchable: &'a [&'a str],
) -> impl Iterator<Item = &'a Record> + 'a {
    let needle = term.trim().to_lowercase();
    records
        .iter()
        .filter(move |r| matches_term(r, &needle, searchable))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCHABLE: &[&str] = &["student", "subject"];

    fn sample() -> Vec<Record> {
        vec![
            Record::new("1")
                .with("student", "John Doe")
                .with("subject", "Math"),
            Record::new("2")
                .with("student", "Jane Smith")
                .with("subject", "Physics"),
        ]
    }

    #[test]
    fn empty_term_is_identity() {
        let rows = sample();
        let ids: Vec<&str> = filter_view(&rows, "", SEARCHABLE)
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(filter_view(&rows, "   ", SEARCHABLE).count(), 2);
    }

    #[test]
    fn match_is_case_insensitive_substring() {
        let rows = sample();
        let hits: Vec<&Record> = filter_view(&rows, "jane", SEARCHABLE).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text("student"), "Jane Smith");
        assert_eq!(filter_view(&rows, "PHYS", SEARCHABLE).count(), 1);
    }

    #[test]
    fn no_match_is_empty_and_unsearched_fields_are_ignored() {
        let rows = vec![Record::new("1")
            .with("student", "John Doe")
            .with("status", "Pending")];
        assert_eq!(filter_view(&rows, "zzz", SEARCHABLE).count(), 0);
        assert_eq!(filter_view(&rows, "pending", SEARCHABLE).count(), 0);
    }

    #[test]
    fn numeric_fields_match_on_display_text() {
        let rows = vec![Record::new("1").with("rollNo", 1002.0)];
        assert_eq!(filter_view(&rows, "100", &["rollNo"]).count(), 1);
        assert_eq!(filter_view(&rows, ".0", &["rollNo"]).count(), 0);
    }

    #[test]
    fn scope_parse() {
        assert_eq!(AggregateScope::parse(None).expect("default"), AggregateScope::All);
        assert_eq!(
            AggregateScope::parse(Some("Visible")).expect("visible"),
            AggregateScope::Visible
        );
        assert!(AggregateScope::parse(Some("filtered")).is_err());
    }
}
