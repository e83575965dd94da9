use std::borrow::Cow;

use chrono::{SecondsFormat, Utc};
use logmode_core::{BoxError, Field, Filterer, Value};
use regex::Regex;

/// Passes records through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityFilter;

impl Filterer for IdentityFilter {
    fn filter<'a>(&self, fields: &'a [Field]) -> Result<Cow<'a, [Field]>, BoxError> {
        Ok(Cow::Borrowed(fields))
    }
}

/// Prepends the current UTC time (RFC 3339, milliseconds) under `key`.
///
/// Used as the shared filter of a level, every writer of that level sees the
/// same timestamp.
#[derive(Debug, Clone)]
pub struct TimestampFilter {
    key: String,
}

impl Default for TimestampFilter {
    fn default() -> Self {
        Self { key: "ts".into() }
    }
}

impl TimestampFilter {
    pub fn with_key(key: &str) -> Self {
        Self { key: key.into() }
    }
}

impl Filterer for TimestampFilter {
    fn filter<'a>(&self, fields: &'a [Field]) -> Result<Cow<'a, [Field]>, BoxError> {
        let mut out = Vec::with_capacity(fields.len() + 1);
        out.push(Field::new(
            self.key.as_str(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        ));
        out.extend_from_slice(fields);
        Ok(Cow::Owned(out))
    }
}

/// Masks every match of a pattern inside string values.
#[derive(Debug, Clone)]
pub struct RedactFilter {
    pattern: Regex,
    mask: String,
}

impl RedactFilter {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            mask: "***".into(),
        })
    }

    pub fn with_mask(self, mask: &str) -> Self {
        Self {
            mask: mask.into(),
            ..self
        }
    }
}

impl Filterer for RedactFilter {
    fn filter<'a>(&self, fields: &'a [Field]) -> Result<Cow<'a, [Field]>, BoxError> {
        let hit = |f: &Field| matches!(&f.value, Value::Str(s) if self.pattern.is_match(s));
        if !fields.iter().any(hit) {
            return Ok(Cow::Borrowed(fields));
        }
        let out = fields
            .iter()
            .map(|f| match &f.value {
                Value::Str(s) => Field {
                    key: f.key.clone(),
                    value: Value::Str(
                        self.pattern
                            .replace_all(s, self.mask.as_str())
                            .into_owned(),
                    ),
                },
                _ => f.clone(),
            })
            .collect();
        Ok(Cow::Owned(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logmode_core::record;

    #[test]
    fn test_identity_borrows() {
        let r = record!["msg" => "x"];
        assert!(matches!(
            IdentityFilter.filter(&r).unwrap(),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn test_timestamp_comes_first() {
        let r = record!["msg" => "x"];
        let out = TimestampFilter::with_key("time").filter(&r).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].key, "time");
        let Value::Str(ts) = &out[0].value else {
            panic!("timestamp is not a string")
        };
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
        assert_eq!(out[1], r[0]);
    }

    #[test]
    fn test_redact_masks_matches_only() {
        let f = RedactFilter::new(r"\d{4}-\d{4}").unwrap();
        let r = record!["msg" => "card 1234-5678 declined", "code" => 402];
        let out = f.filter(&r).unwrap();
        assert_eq!(out[0].value, Value::Str("card *** declined".into()));
        assert_eq!(out[1].value, Value::Int(402));

        let clean = record!["msg" => "ok"];
        assert!(matches!(f.filter(&clean).unwrap(), Cow::Borrowed(_)));
    }
}
