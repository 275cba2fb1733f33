use rusqlite::types::Value;

use recsync_core::{
    field_value::FieldValue,
    predicate::Predicate,
    schema::{Attribute, EntitySchema},
};

use crate::error::StorageError;

/// A predicate lowered to a SQL boolean expression over `objects o`.
#[derive(Debug, Default)]
pub(crate) struct Compiled {
    pub sql: String,
    pub params: Vec<Value>,
}

pub(crate) fn compile(schema: &EntitySchema, predicate: &Predicate) -> Result<Compiled, StorageError> {
    let mut out = Compiled::default();
    push(schema, predicate, &mut out)?;
    Ok(out)
}

fn push(schema: &EntitySchema, predicate: &Predicate, out: &mut Compiled) -> Result<(), StorageError> {
    match predicate {
        Predicate::Always => out.sql.push('1'),
        Predicate::Eq { field, value } => push_leaf(schema, field, value, out)?,
        Predicate::And(a, b) | Predicate::Or(a, b) => {
            let op = if matches!(predicate, Predicate::And(..)) { " AND " } else { " OR " };
            out.sql.push('(');
            push(schema, a, out)?;
            out.sql.push_str(op);
            push(schema, b, out)?;
            out.sql.push(')');
        }
        Predicate::Not(p) => {
            out.sql.push_str("(NOT ");
            push(schema, p, out)?;
            out.sql.push(')');
        }
    }
    Ok(())
}

const FIELD_MATCH: &str = "EXISTS (SELECT 1 FROM object_fields f WHERE f.object_id = o.object_id AND f.field_key = ? AND f.match_text = ?)";
const FIELD_NULL: &str = "NOT EXISTS (SELECT 1 FROM object_fields f WHERE f.object_id = o.object_id AND f.field_key = ? AND f.match_text IS NOT NULL)";
const LINK_MATCH: &str = "EXISTS (SELECT 1 FROM object_links l WHERE l.object_id = o.object_id AND l.relation = ? AND l.target_id = ?)";
const LINK_NONE: &str = "NOT EXISTS (SELECT 1 FROM object_links l WHERE l.object_id = o.object_id AND l.relation = ?)";

/// A literal that cannot be read as the attribute's kind matches nothing.
fn push_leaf(schema: &EntitySchema, name: &str, raw: &str, out: &mut Compiled) -> Result<(), StorageError> {
    let attribute = schema
        .attribute(name)
        .ok_or_else(|| StorageError::UnknownAttribute {
            type_tag: schema.type_tag().to_string(),
            attribute: name.to_string(),
        })?;

    let key = Value::Text(name.to_string());
    match attribute {
        Attribute::Field(def) => match def.coerce(raw).ok().map(|v| v.match_text()) {
            Some(Some(text)) => {
                out.sql.push_str(FIELD_MATCH);
                out.params.extend([key, Value::Text(text)]);
            }
            Some(None) => {
                out.sql.push_str(FIELD_NULL);
                out.params.push(key);
            }
            None => out.sql.push('0'),
        },
        Attribute::Relation(def) => {
            let empty = raw.trim().is_empty();
            match (def.is_many(), empty, raw.trim().parse::<i64>()) {
                (true, true, _) => {
                    out.sql.push_str(LINK_NONE);
                    out.params.push(key);
                }
                (true, false, Ok(id)) => {
                    out.sql.push_str(LINK_MATCH);
                    out.params.extend([key, Value::Integer(id)]);
                }
                (false, true, _) if def.nullable => {
                    out.sql.push_str(FIELD_NULL);
                    out.params.push(key);
                }
                (false, false, Ok(id)) => {
                    let text = FieldValue::Reference(id.into()).match_text().unwrap_or_default();
                    out.sql.push_str(FIELD_MATCH);
                    out.params.extend([key, Value::Text(text)]);
                }
                _ => out.sql.push('0'),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use recsync_core::schema::{FieldDef, RelationDef};

    fn house() -> EntitySchema {
        EntitySchema::new(
            "House",
            vec![FieldDef::text("address"), FieldDef::integer("floors").nullable()],
            vec![RelationDef::one("owner", "Person").nullable()],
        )
        .unwrap()
    }

    #[test]
    fn always_compiles_to_true() {
        let compiled = compile(&house(), &Predicate::Always).unwrap();
        assert_eq!(compiled.sql, "1");
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn conjunction_binds_params_in_order() {
        let predicate = Predicate::eq("address", "1 Road").and(Predicate::eq("floors", "2"));
        let compiled = compile(&house(), &predicate).unwrap();
        assert!(compiled.sql.starts_with("(EXISTS"));
        assert!(compiled.sql.contains(" AND "));
        assert_eq!(
            compiled.params,
            vec![
                Value::Text("address".into()),
                Value::Text("1 Road".into()),
                Value::Text("floors".into()),
                Value::Text("2".into()),
            ]
        );
    }

    #[test]
    fn uncoercible_literal_matches_nothing() {
        let compiled = compile(&house(), &Predicate::eq("floors", "many")).unwrap();
        assert_eq!(compiled.sql, "0");
    }

    #[test]
    fn empty_nullable_literal_checks_for_null() {
        let compiled = compile(&house(), &Predicate::eq("floors", "")).unwrap();
        assert!(compiled.sql.starts_with("NOT EXISTS"));
        let compiled = compile(&house(), &Predicate::eq("owner", "")).unwrap();
        assert!(compiled.sql.starts_with("NOT EXISTS"));
    }

    #[test]
    fn unknown_attribute_is_an_error() {
        let result = compile(&house(), &Predicate::eq("colour", "red").negate());
        assert!(matches!(result, Err(StorageError::UnknownAttribute { .. })));
    }
}
