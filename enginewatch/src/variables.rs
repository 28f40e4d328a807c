//! Typed process variables.
//!
//! The platform reports variable types as lower-case names. The set of kinds
//! understood here is closed; anything else is rejected with
//! [`Error::UnknownVariableKind`].

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};

use crate::{Error, Result};

/// The kind of a process variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    String,
    Integer,
    Boolean,
    Date,
    DateTime,
}

impl VariableKind {
    pub const ALL: [VariableKind; 5] = [
        VariableKind::String,
        VariableKind::Integer,
        VariableKind::Boolean,
        VariableKind::Date,
        VariableKind::DateTime,
    ];

    /// The name the platform uses for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableKind::String => "string",
            VariableKind::Integer => "integer",
            VariableKind::Boolean => "boolean",
            VariableKind::Date => "date",
            VariableKind::DateTime => "datetime",
        }
    }
}

impl FromStr for VariableKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnknownVariableKind(s.to_owned()))
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A variable value with its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl VariableValue {
    pub fn kind(&self) -> VariableKind {
        match self {
            VariableValue::String(_) => VariableKind::String,
            VariableValue::Integer(_) => VariableKind::Integer,
            VariableValue::Boolean(_) => VariableKind::Boolean,
            VariableValue::Date(_) => VariableKind::Date,
            VariableValue::DateTime(_) => VariableKind::DateTime,
        }
    }

    /// Parse `text` as a value of `kind`.
    ///
    /// Dates use `YYYY-MM-DD`, date-times RFC 3339.
    pub fn parse(kind: VariableKind, text: &str) -> Result<Self> {
        let invalid = || Error::InvalidVariableValue {
            kind,
            value: text.to_owned(),
        };
        let value = match kind {
            VariableKind::String => VariableValue::String(text.to_owned()),
            VariableKind::Integer => VariableValue::Integer(text.trim().parse().map_err(|_| invalid())?),
            VariableKind::Boolean => VariableValue::Boolean(text.trim().parse().map_err(|_| invalid())?),
            VariableKind::Date => VariableValue::Date(
                NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").map_err(|_| invalid())?,
            ),
            VariableKind::DateTime => VariableValue::DateTime(
                DateTime::parse_from_rfc3339(text.trim())
                    .map_err(|_| invalid())?
                    .with_timezone(&Utc),
            ),
        };
        Ok(value)
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableValue::String(s) => f.write_str(s),
            VariableValue::Integer(i) => write!(f, "{i}"),
            VariableValue::Boolean(b) => write!(f, "{b}"),
            VariableValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            VariableValue::DateTime(dt) => f.write_str(&dt.to_rfc3339()),
        }
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        VariableValue::String(value.to_owned())
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        VariableValue::String(value)
    }
}

impl From<i64> for VariableValue {
    fn from(value: i64) -> Self {
        VariableValue::Integer(value)
    }
}

impl From<bool> for VariableValue {
    fn from(value: bool) -> Self {
        VariableValue::Boolean(value)
    }
}

impl From<NaiveDate> for VariableValue {
    fn from(value: NaiveDate) -> Self {
        VariableValue::Date(value)
    }
}

impl From<DateTime<Utc>> for VariableValue {
    fn from(value: DateTime<Utc>) -> Self {
        VariableValue::DateTime(value)
    }
}

/// Variables by name, as sent when starting a process or setting variables.
pub type Variables = BTreeMap<String, VariableValue>;

/// A variable as reported by the query service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInstance {
    pub name: String,
    pub value: VariableValue,
}

impl VariableInstance {
    pub fn new(name: impl Into<String>, value: impl Into<VariableValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn kind(&self) -> VariableKind {
        self.value.kind()
    }
}
