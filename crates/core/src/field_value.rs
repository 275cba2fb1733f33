use serde::{Deserialize, Serialize};

use crate::ids::ObjectId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Reference(ObjectId),
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b).is_eq(),
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Reference(a), Self::Reference(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FieldValue {}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Null or the empty string. Unforced updates only write blank attributes.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            FieldValue::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Canonical text form used for equality matching in the store.
    /// `None` for null.
    pub fn match_text(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Integer(n) => Some(n.to_string()),
            FieldValue::Float(v) => Some(v.to_string()),
            FieldValue::Boolean(b) => Some(b.to_string()),
            FieldValue::Reference(id) => Some(id.to_string()),
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_only_match_their_own_kind() {
        assert_eq!(FieldValue::Integer(3).as_integer(), Some(3));
        assert_eq!(FieldValue::Text("3".into()).as_integer(), None);
        assert_eq!(FieldValue::Boolean(true).as_boolean(), Some(true));
        assert_eq!(FieldValue::Null.as_boolean(), None);
        assert_eq!(FieldValue::Null.as_text(), None);
    }

    #[test]
    fn blank_is_null_or_empty_text() {
        assert!(FieldValue::Null.is_blank());
        assert!(FieldValue::Text(String::new()).is_blank());
        assert!(!FieldValue::Integer(0).is_blank());
        assert!(!FieldValue::Boolean(false).is_blank());
    }

    #[test]
    fn match_text_is_canonical() {
        assert_eq!(FieldValue::Null.match_text(), None);
        assert_eq!(FieldValue::Boolean(false).match_text().as_deref(), Some("false"));
        assert_eq!(FieldValue::Float(1.5).match_text().as_deref(), Some("1.5"));
    }
}
