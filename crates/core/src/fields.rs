//! Record field maps and referential key parsing.
//!
//! A key of the form `base=>related` asks for the relation `base` to be
//! resolved by looking up a related object whose `related` attribute equals
//! the value. Many-valued relations prefix the related segment with an edit
//! character: `base=>+related` adds, `base=>-related` removes and
//! `base=>=related` replaces the whole relation.

pub const REFERRED_TO_DELIMITER: &str = "=>";

/// Insertion-ordered map of attribute name to raw string value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKey<'a> {
    Direct(&'a str),
    Referential { base: &'a str, related: &'a str },
}

impl<'a> FieldKey<'a> {
    pub fn parse(key: &'a str) -> Self {
        match key.split_once(REFERRED_TO_DELIMITER) {
            Some((base, related)) => FieldKey::Referential { base, related },
            None => FieldKey::Direct(key),
        }
    }
}

/// Edit applied to a many-valued relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationEdit {
    Add,
    Remove,
    Replace,
}

impl RelationEdit {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Self::Add),
            '-' => Some(Self::Remove),
            '=' => Some(Self::Replace),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Self::Add => '+',
            Self::Remove => '-',
            Self::Replace => '=',
        }
    }

    /// Split the leading edit character off a related-field segment.
    /// Returns `None` when the segment does not start with one.
    pub fn split(related: &str) -> Option<(Self, &str)> {
        let mut chars = related.chars();
        let edit = Self::from_char(chars.next()?)?;
        Some((edit, chars.as_str()))
    }
}
