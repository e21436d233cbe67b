use std::collections::BTreeMap;
use std::fmt::Display;

/// Field name to value mapping of one input record.
///
/// A `None` value marks a null field; null fields are never transmitted.
pub type Fields = BTreeMap<String, Option<String>>;

/// One input record together with its position in the input sequence.
///
/// The index is assigned once when the records are ingested and determines
/// where the record's [`Outcome`](crate::Outcome) lands in the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    index: usize,
    fields: Fields,
}

impl Record {
    /// Create a new record at the given input position
    #[must_use]
    pub const fn new(index: usize, fields: Fields) -> Self {
        Self { index, fields }
    }

    /// Zero-based position of this record in the input sequence
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// All fields, including null ones
    #[must_use]
    pub const fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Iterate over the fields which carry a value
    pub fn present_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
    }

    /// Assign indices to a sequence of field mappings in input order
    pub fn enumerate<I>(records: I) -> Vec<Self>
    where
        I: IntoIterator<Item = Fields>,
    {
        records
            .into_iter()
            .enumerate()
            .map(|(index, fields)| Self::new(index, fields))
            .collect()
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "record #{}", self.index)
    }
}
