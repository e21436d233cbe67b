use serde::{Deserialize, Serialize};

use super::Record;

/// Name of the multi-value parameter selecting the requested outputs
pub const OUTPUT_KEY: &str = "output[]";

/// Value of a static query parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Sent once as `key=value`
    Single(String),
    /// Sent as one `key=value` pair per entry
    Multi(Vec<String>),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multi(values)
    }
}

/// Static query parameters sent along with every record of a dispatch.
///
/// Keys keep their insertion order and are unique; inserting an existing key
/// replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParams(Vec<(String, ParamValue)>);

impl QueryParams {
    /// Create an empty parameter set
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Set `key` to `value`, replacing any previous value
    pub fn insert<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<ParamValue>,
    {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.0.push((key, value)),
        }
    }

    /// Builder-style variant of [`QueryParams::insert`]
    #[must_use]
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<ParamValue>,
    {
        self.insert(key, value);
        self
    }

    /// Request the given outputs.
    ///
    /// Duplicates are removed; the first occurrence of each output keeps its
    /// position.
    #[must_use]
    pub fn with_outputs<I, S>(self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for output in outputs {
            let output = output.as_ref();
            if !unique.iter().any(|o| o == output) {
                unique.push(output.to_string());
            }
        }
        self.with(OUTPUT_KEY, unique)
    }

    /// Look up the value of `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns `true` if no parameter is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Combine the static parameters with the non-null fields of `record`.
    ///
    /// Record fields take precedence over static parameters of the same name
    /// and take over their position; the remaining record fields follow in
    /// field order. Multi-value parameters expand to one pair per value.
    #[must_use]
    pub fn merged_with(&self, record: &Record) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (key, value) in &self.0 {
            if let Some(Some(overridden)) = record.fields().get(key) {
                pairs.push((key.clone(), overridden.clone()));
                continue;
            }
            match value {
                ParamValue::Single(v) => pairs.push((key.clone(), v.clone())),
                ParamValue::Multi(values) => {
                    pairs.extend(values.iter().map(|v| (key.clone(), v.clone())));
                }
            }
        }
        pairs.extend(
            record
                .present_fields()
                .filter(|(key, _)| self.get(key).is_none())
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        pairs
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::{ParamValue, QueryParams, OUTPUT_KEY};
    use crate::{Fields, Record};
    use pretty_assertions::assert_eq;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_outputs_are_deduplicated() {
        let params =
            QueryParams::new().with_outputs(["phone", "email", "phone", "address", "email"]);
        assert_eq!(
            params.get(OUTPUT_KEY),
            Some(&ParamValue::Multi(vec![
                "phone".to_string(),
                "email".to_string(),
                "address".to_string()
            ]))
        );
    }

    #[test]
    fn test_record_fields_override_static_params() {
        let params = QueryParams::new()
            .with("cfg_max_recs", "1")
            .with("state", "WA")
            .with_outputs(["email"]);

        let mut fields = Fields::new();
        fields.insert("first".to_string(), Some("John".to_string()));
        fields.insert("state".to_string(), Some("NY".to_string()));
        fields.insert("zip".to_string(), None);
        let record = Record::new(4, fields);

        assert_eq!(
            params.merged_with(&record),
            pairs(&[
                ("cfg_max_recs", "1"),
                ("state", "NY"),
                ("output[]", "email"),
                ("first", "John"),
            ])
        );
    }

    #[test]
    fn test_null_record_field_does_not_override() {
        let params = QueryParams::new().with("state", "WA");
        let mut fields = Fields::new();
        fields.insert("state".to_string(), None);
        let record = Record::new(0, fields);

        assert_eq!(params.merged_with(&record), pairs(&[("state", "WA")]));
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut params: QueryParams = [("a", "1"), ("b", "2")].into_iter().collect();
        params.insert("a", "3");
        let record = Record::new(0, Fields::new());
        assert_eq!(params.merged_with(&record), pairs(&[("a", "3"), ("b", "2")]));
    }

    #[test]
    fn test_deserialize_from_toml() {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            params: std::collections::BTreeMap<String, ParamValue>,
        }
        let wrapper: Wrapper = toml::from_str(
            r#"
            [params]
            cfg_max_recs = "1"
            "output[]" = ["email", "phone"]
            "#,
        )
        .unwrap();
        assert_eq!(
            wrapper.params["output[]"],
            ParamValue::Multi(vec!["email".to_string(), "phone".to_string()])
        );
        assert_eq!(wrapper.params["cfg_max_recs"], ParamValue::from("1"));
    }
}
