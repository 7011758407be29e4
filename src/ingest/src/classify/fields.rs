use serde_json::{Map, Value};

use crate::error::ClassificationError;

/// A JSON object inside a payload, with accessors that report errors by dotted path.
#[derive(Clone, Copy)]
pub(crate) struct Section<'a> {
    path: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> Section<'a> {
    pub(crate) fn new(path: &'a str, map: &'a Map<String, Value>) -> Self {
        Self { path, map }
    }

    pub(crate) fn map(&self) -> &'a Map<String, Value> {
        self.map
    }

    pub(crate) fn path_of(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        }
    }

    /// Absent and `null` are the same thing.
    pub(crate) fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    fn invalid(&self, key: &str, expected: &'static str) -> ClassificationError {
        ClassificationError::InvalidField {
            field: self.path_of(key),
            expected,
        }
    }

    fn missing(&self, key: &str) -> ClassificationError {
        ClassificationError::MissingField(self.path_of(key))
    }

    /// Scalars are accepted and rendered as text; objects and arrays are not.
    pub(crate) fn opt_str(&self, key: &str) -> Result<Option<String>, ClassificationError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => Ok(Some(v.to_string())),
            Some(_) => Err(self.invalid(key, "a string")),
        }
    }

    pub(crate) fn required_str(&self, key: &str) -> Result<String, ClassificationError> {
        self.opt_str(key)?.ok_or_else(|| self.missing(key))
    }

    /// Integers may arrive as JSON numbers or as decimal strings.
    pub(crate) fn opt_i64(&self, key: &str) -> Result<Option<i64>, ClassificationError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| self.invalid(key, "an integer")),
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| self.invalid(key, "an integer")),
            Some(_) => Err(self.invalid(key, "an integer")),
        }
    }

    pub(crate) fn required_i64(&self, key: &str) -> Result<i64, ClassificationError> {
        self.opt_i64(key)?.ok_or_else(|| self.missing(key))
    }

    pub(crate) fn opt_i32(&self, key: &str) -> Result<Option<i32>, ClassificationError> {
        self.opt_i64(key)?
            .map(|v| i32::try_from(v).map_err(|_| self.invalid(key, "a 32-bit integer")))
            .transpose()
    }

    pub(crate) fn opt_bool(&self, key: &str) -> Result<Option<bool>, ClassificationError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(Some(true)),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(Some(false)),
            Some(_) => Err(self.invalid(key, "a boolean")),
        }
    }

    pub(crate) fn opt_object(
        &self,
        key: &str,
    ) -> Result<Option<&'a Map<String, Value>>, ClassificationError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(_) => Err(self.invalid(key, "an object")),
        }
    }

    pub(crate) fn opt_array(&self, key: &str) -> Result<&'a [Value], ClassificationError> {
        match self.get(key) {
            None => Ok(&[]),
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(self.invalid(key, "an array")),
        }
    }

    /// The value as stored, or `null` when absent.
    pub(crate) fn raw(&self, key: &str) -> Value {
        self.get(key).cloned().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accessors_report_dotted_paths() {
        let value = json!({"n": "12", "s": 3, "b": "TRUE", "o": [], "nothing": null});
        let map = value.as_object().unwrap();
        let section = Section::new("basic", map);

        assert_eq!(section.opt_i64("n").unwrap(), Some(12));
        assert_eq!(section.opt_str("s").unwrap().as_deref(), Some("3"));
        assert_eq!(section.opt_bool("b").unwrap(), Some(true));
        assert_eq!(section.opt_str("nothing").unwrap(), None);

        assert_eq!(
            section.opt_str("o").unwrap_err(),
            ClassificationError::InvalidField {
                field: "basic.o".to_string(),
                expected: "a string"
            }
        );
        assert_eq!(
            section.required_i64("absent").unwrap_err(),
            ClassificationError::MissingField("basic.absent".to_string())
        );
    }

    #[test]
    fn test_opt_i32_rejects_overflow() {
        let value = json!({"big": 1_i64 << 40});
        let section = Section::new("", value.as_object().unwrap());
        assert!(section.opt_i32("big").is_err());
    }
}
