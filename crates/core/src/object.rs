use std::collections::{BTreeMap, BTreeSet};

use crate::field_value::FieldValue;
use crate::ids::{ObjectId, ObjectRef};

/// An entity in the store. Scalar attributes and scalar relations live in
/// `values`; many-valued relations live in `links`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetObject {
    type_tag: String,
    id: Option<ObjectId>,
    values: BTreeMap<String, FieldValue>,
    links: BTreeMap<String, BTreeSet<ObjectId>>,
}

impl TargetObject {
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            id: None,
            values: BTreeMap::new(),
            links: BTreeMap::new(),
        }
    }

    /// Rebuild a persisted object.
    pub fn from_parts(
        type_tag: String,
        id: ObjectId,
        values: BTreeMap<String, FieldValue>,
        links: BTreeMap<String, BTreeSet<ObjectId>>,
    ) -> Self {
        Self {
            type_tag,
            id: Some(id),
            values,
            links,
        }
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// `None` until the object has been saved.
    pub fn id(&self) -> Option<ObjectId> {
        self.id
    }

    pub fn set_id(&mut self, id: Option<ObjectId>) {
        self.id = id;
    }

    pub fn object_ref(&self) -> Option<ObjectRef> {
        self.id.map(|id| ObjectRef::new(self.type_tag.clone(), id))
    }

    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(FieldValue::as_text)
    }

    /// Missing, null or the empty string.
    pub fn is_blank(&self, name: &str) -> bool {
        self.value(name).is_none_or(FieldValue::is_blank)
    }

    pub fn set_value(&mut self, name: &str, value: FieldValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn links(&self, relation: &str) -> Option<&BTreeSet<ObjectId>> {
        self.links.get(relation)
    }

    pub fn links_mut(&mut self, relation: &str) -> &mut BTreeSet<ObjectId> {
        self.links.entry(relation.to_string()).or_default()
    }

    pub fn all_links(&self) -> impl Iterator<Item = (&str, &BTreeSet<ObjectId>)> {
        self.links.iter().map(|(k, v)| (k.as_str(), v))
    }
}
