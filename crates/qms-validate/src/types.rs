use std::collections::BTreeMap;

use serde::Serialize;

/// Field-level validation outcome: field name -> messages. Serializes
/// directly into the shape a UI renders next to each input.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct FieldErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.errors.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, messages) in &self.errors {
            for msg in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {msg}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
    }

    #[test]
    fn push_accumulates_per_field() {
        let mut e = FieldErrors::new();
        e.push("title", "must not be empty");
        e.push("title", "too long");
        e.push("scope", "must not be empty");
        let err = e.into_result().unwrap_err();
        let fields: Vec<_> = err.fields().collect();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].1.len(), 2);
        assert_eq!(
            err.to_string(),
            "scope: must not be empty; title: must not be empty; title: too long"
        );
    }
}
