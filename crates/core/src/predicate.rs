use std::fmt;

use crate::fields::FieldMap;

/// Boolean predicate over the attributes of a single object.
///
/// Leaves compare one attribute against a raw record value; the store
/// coerces the value with the attribute's declared kind before comparing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Matches every object.
    Always,
    Eq { field: String, value: String },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Predicate::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Left fold of conjunctions. An empty input yields `Always`.
    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        predicates
            .into_iter()
            .reduce(Predicate::and)
            .unwrap_or(Predicate::Always)
    }

    /// Evaluate against plain string attributes. A missing attribute never
    /// equals anything.
    pub fn matches(&self, values: &FieldMap) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::Eq { field, value } => values.get(field) == Some(value.as_str()),
            Predicate::And(a, b) => a.matches(values) && b.matches(values),
            Predicate::Or(a, b) => a.matches(values) || b.matches(values),
            Predicate::Not(p) => !p.matches(values),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Always => write!(f, "TRUE"),
            Predicate::Eq { field, value } => write!(f, "{field} = {value:?}"),
            Predicate::And(a, b) => write!(f, "({a} AND {b})"),
            Predicate::Or(a, b) => write!(f, "({a} OR {b})"),
            Predicate::Not(p) => write!(f, "NOT {p}"),
        }
    }
}
