use super::Record;

/// Ordered records owned by one page. Insertion order is display order.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    records: Vec<Record>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Appends `record` only when every `required` field holds a non-blank
    /// value. Returns whether the record was added.
    pub fn append(&mut self, record: Record, required: &[&str]) -> bool {
        if !required.iter().all(|f| record.has_value(f)) {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Search results replace the whole set.
    pub fn replace(&mut self, records: Vec<Record>) {
        self.records = records;
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Running total of `field` over every record, independent of any view.
    pub fn total(&self, field: &str) -> f64 {
        sum_field(&self.records, field)
    }
}

/// Sum of a numeric field. Cells that are missing or not numeric count as 0.
pub fn sum_field<'a, I>(records: I, field: &str) -> f64
where
    I: IntoIterator<Item = &'a Record>,
{
    records
        .into_iter()
        .filter_map(|r| r.get(field).and_then(|v| v.as_number()))
        .sum()
}
