use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::field_value::FieldValue;
use crate::object::TargetObject;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Boolean,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
        }
    }

    fn parse_raw(&self, raw: &str) -> Option<FieldValue> {
        match self {
            Self::Text => Some(FieldValue::Text(raw.to_string())),
            Self::Integer => raw.trim().parse().ok().map(FieldValue::Integer),
            Self::Float => raw.trim().parse().ok().map(FieldValue::Float),
            Self::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(FieldValue::Boolean(true)),
                "false" | "0" | "no" => Some(FieldValue::Boolean(false)),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    /// Raw default, coerced like any record value.
    #[serde(default)]
    pub default: Option<String>,
}

impl FieldDef {
    fn simple(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            unique: false,
            default: None,
        }
    }

    pub fn text(name: &str) -> Self {
        Self::simple(name, FieldKind::Text)
    }

    pub fn integer(name: &str) -> Self {
        Self::simple(name, FieldKind::Integer)
    }

    pub fn float(name: &str) -> Self {
        Self::simple(name, FieldKind::Float)
    }

    pub fn boolean(name: &str) -> Self {
        Self::simple(name, FieldKind::Boolean)
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_default(mut self, default: &str) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Convert a raw record value. The empty string becomes null when the
    /// field allows it.
    pub fn coerce(&self, raw: &str) -> Result<FieldValue, CoreError> {
        if raw.is_empty() && self.nullable {
            return Ok(FieldValue::Null);
        }
        self.kind
            .parse_raw(raw)
            .ok_or_else(|| CoreError::InvalidValue {
                field: self.name.clone(),
                kind: self.kind.as_str(),
                value: raw.to_string(),
            })
    }

    /// Value a freshly instantiated object starts with.
    pub fn initial_value(&self) -> Result<FieldValue, CoreError> {
        match (&self.default, self.kind) {
            (Some(raw), _) => self.coerce(raw),
            (None, FieldKind::Text) if !self.nullable => Ok(FieldValue::Text(String::new())),
            (None, _) => Ok(FieldValue::Null),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDef {
    pub name: String,
    /// Type tag of the related entity.
    pub target: String,
    pub cardinality: Cardinality,
    #[serde(default)]
    pub nullable: bool,
}

impl RelationDef {
    pub fn one(name: &str, target: &str) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::One,
            nullable: false,
        }
    }

    pub fn many(name: &str, target: &str) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::Many,
            nullable: true,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Attribute<'a> {
    Field(&'a FieldDef),
    Relation(&'a RelationDef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Field(usize),
    Relation(usize),
}

/// Serialized shape of an [`EntitySchema`], validated on conversion.
#[derive(Debug, Clone, Deserialize)]
pub struct EntitySchemaConfig {
    pub type_tag: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub relations: Vec<RelationDef>,
}

/// Field and relation definitions for one entity type, indexed by name.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "EntitySchemaConfig")]
pub struct EntitySchema {
    type_tag: String,
    fields: Vec<FieldDef>,
    relations: Vec<RelationDef>,
    index: BTreeMap<String, Slot>,
}

impl TryFrom<EntitySchemaConfig> for EntitySchema {
    type Error = CoreError;

    fn try_from(config: EntitySchemaConfig) -> Result<Self, Self::Error> {
        EntitySchema::new(config.type_tag, config.fields, config.relations)
    }
}

impl EntitySchema {
    pub fn new(
        type_tag: impl Into<String>,
        fields: Vec<FieldDef>,
        relations: Vec<RelationDef>,
    ) -> Result<Self, CoreError> {
        let type_tag = type_tag.into();
        if type_tag.trim().is_empty() {
            return Err(CoreError::InvalidSchema("type tag must not be empty".into()));
        }

        let mut index = BTreeMap::new();
        let names = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.as_str(), Slot::Field(i)))
            .chain(
                relations
                    .iter()
                    .enumerate()
                    .map(|(i, r)| (r.name.as_str(), Slot::Relation(i))),
            );
        for (name, slot) in names {
            if name.is_empty() || name.contains(crate::fields::REFERRED_TO_DELIMITER) {
                return Err(CoreError::InvalidSchema(format!(
                    "{type_tag}: invalid attribute name {name:?}"
                )));
            }
            if index.insert(name.to_string(), slot).is_some() {
                return Err(CoreError::InvalidSchema(format!(
                    "{type_tag}: duplicate attribute '{name}'"
                )));
            }
        }

        Ok(Self {
            type_tag,
            fields,
            relations,
            index,
        })
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn relations(&self) -> &[RelationDef] {
        &self.relations
    }

    pub fn attribute(&self, name: &str) -> Option<Attribute<'_>> {
        match self.index.get(name)? {
            Slot::Field(i) => self.fields.get(*i).map(Attribute::Field),
            Slot::Relation(i) => self.relations.get(*i).map(Attribute::Relation),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        match self.attribute(name)? {
            Attribute::Field(def) => Some(def),
            Attribute::Relation(_) => None,
        }
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        match self.attribute(name)? {
            Attribute::Relation(def) => Some(def),
            Attribute::Field(_) => None,
        }
    }

    /// A new, unsaved object carrying every field's initial value.
    pub fn instantiate(&self) -> Result<TargetObject, CoreError> {
        let mut object = TargetObject::new(self.type_tag.clone());
        for field in &self.fields {
            object.set_value(&field.name, field.initial_value()?);
        }
        for relation in self.relations.iter().filter(|r| !r.is_many()) {
            object.set_value(&relation.name, FieldValue::Null);
        }
        Ok(object)
    }
}

/// Every entity type known to a store, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Arc<EntitySchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every schema, then check that relation targets exist.
    pub fn from_schemas(
        schemas: impl IntoIterator<Item = EntitySchema>,
    ) -> Result<Self, CoreError> {
        let mut registry = Self::new();
        for schema in schemas {
            registry.register(schema)?;
        }
        registry.validate()?;
        Ok(registry)
    }

    pub fn register(&mut self, schema: EntitySchema) -> Result<Arc<EntitySchema>, CoreError> {
        let type_tag = schema.type_tag().to_string();
        if self.schemas.contains_key(&type_tag) {
            return Err(CoreError::InvalidSchema(format!(
                "duplicate entity type '{type_tag}'"
            )));
        }
        let schema = Arc::new(schema);
        self.schemas.insert(type_tag, Arc::clone(&schema));
        Ok(schema)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        for schema in self.schemas.values() {
            for relation in schema.relations() {
                if !self.schemas.contains_key(&relation.target) {
                    return Err(CoreError::InvalidSchema(format!(
                        "{}.{} targets unknown entity type '{}'",
                        schema.type_tag(),
                        relation.name,
                        relation.target
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, type_tag: &str) -> Option<Arc<EntitySchema>> {
        self.schemas.get(type_tag).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntitySchema> {
        self.schemas.values().map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
