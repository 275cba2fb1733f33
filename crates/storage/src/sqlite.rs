use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use recsync_core::{
    field_value::FieldValue,
    ids::*,
    object::TargetObject,
    predicate::Predicate,
    schema::{EntitySchema, SchemaRegistry},
};

use crate::error::StorageError;
use crate::query;
use crate::traits::{ExternalKeyMapping, ExternalSystem, Lookup, ObjectStore};

/// Map a unique or not-null violation onto [`StorageError::IntegrityConflict`].
fn integrity(e: rusqlite::Error) -> StorageError {
    match e {
        rusqlite::Error::SqliteFailure(err, msg)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StorageError::IntegrityConflict(msg.unwrap_or_else(|| err.to_string()))
        }
        e => StorageError::Sqlite(e),
    }
}

fn encode(value: &FieldValue) -> Result<Vec<u8>, StorageError> {
    value
        .to_msgpack()
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<FieldValue, StorageError> {
    FieldValue::from_msgpack(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

pub struct SqliteStore {
    conn: Connection,
    schemas: SchemaRegistry,
    in_transaction: bool,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>, schemas: SchemaRegistry) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn,
            schemas,
            in_transaction: false,
        })
    }

    pub fn open_in_memory(schemas: SchemaRegistry) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn,
            schemas,
            in_transaction: false,
        })
    }

    /// Raw connection, for inspection in tests.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn schema(&self, type_tag: &str) -> Result<std::sync::Arc<EntitySchema>, StorageError> {
        self.schemas
            .get(type_tag)
            .ok_or_else(|| StorageError::UnknownEntityType(type_tag.to_string()))
    }

    fn matching_ids(
        &self,
        schema: &EntitySchema,
        predicate: &Predicate,
        limit: Option<u32>,
    ) -> Result<Vec<ObjectId>, StorageError> {
        let compiled = query::compile(schema, predicate)?;
        let mut sql = format!(
            "SELECT o.object_id FROM objects o WHERE o.type_tag = ? AND {} ORDER BY o.object_id",
            compiled.sql
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        let params = std::iter::once(rusqlite::types::Value::Text(schema.type_tag().to_string()))
            .chain(compiled.params);

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| row.get::<_, i64>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(ObjectId::new(row?));
        }
        Ok(ids)
    }
}

fn load_object(
    conn: &Connection,
    schema: &EntitySchema,
    id: ObjectId,
) -> Result<TargetObject, StorageError> {
    let mut values = BTreeMap::new();
    let mut stmt = conn.prepare("SELECT field_key, value FROM object_fields WHERE object_id = ?1")?;
    let rows = stmt.query_map(rusqlite::params![id.get()], |row| {
        let key: String = row.get(0)?;
        let bytes: Vec<u8> = row.get(1)?;
        Ok((key, bytes))
    })?;
    for row in rows {
        let (key, bytes) = row?;
        values.insert(key, decode(&bytes)?);
    }

    let mut links: BTreeMap<String, BTreeSet<ObjectId>> = schema
        .relations()
        .iter()
        .filter(|r| r.is_many())
        .map(|r| (r.name.clone(), BTreeSet::new()))
        .collect();
    let mut stmt = conn.prepare("SELECT relation, target_id FROM object_links WHERE object_id = ?1")?;
    let rows = stmt.query_map(rusqlite::params![id.get()], |row| {
        let relation: String = row.get(0)?;
        let target: i64 = row.get(1)?;
        Ok((relation, target))
    })?;
    for row in rows {
        let (relation, target) = row?;
        links.entry(relation).or_default().insert(ObjectId::new(target));
    }

    Ok(TargetObject::from_parts(
        schema.type_tag().to_string(),
        id,
        values,
        links,
    ))
}

fn object_type(conn: &Connection, id: ObjectId) -> Result<Option<String>, StorageError> {
    Ok(conn
        .query_row(
            "SELECT type_tag FROM objects WHERE object_id = ?1",
            rusqlite::params![id.get()],
            |row| row.get(0),
        )
        .optional()?)
}

/// Reject values the schema would refuse before anything is written.
fn check_object(
    conn: &Connection,
    schema: &EntitySchema,
    object: &TargetObject,
) -> Result<(), StorageError> {
    let unknown = |name: &str| StorageError::UnknownAttribute {
        type_tag: schema.type_tag().to_string(),
        attribute: name.to_string(),
    };
    for (name, _) in object.values() {
        if schema.field(name).is_none() && !schema.relation(name).is_some_and(|r| !r.is_many()) {
            return Err(unknown(name));
        }
    }
    for (name, _) in object.all_links() {
        if !schema.relation(name).is_some_and(|r| r.is_many()) {
            return Err(unknown(name));
        }
    }

    for field in schema.fields() {
        let value = object.value(&field.name).unwrap_or(&FieldValue::Null);
        if value.is_null() && !field.nullable {
            return Err(StorageError::IntegrityConflict(format!(
                "NOT NULL constraint failed: {}.{}",
                schema.type_tag(),
                field.name
            )));
        }
    }

    for relation in schema.relations() {
        let targets: Vec<ObjectId> = if relation.is_many() {
            object
                .links(&relation.name)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default()
        } else {
            match object.value(&relation.name).unwrap_or(&FieldValue::Null) {
                FieldValue::Null if relation.nullable => vec![],
                FieldValue::Null => {
                    return Err(StorageError::IntegrityConflict(format!(
                        "NOT NULL constraint failed: {}.{}",
                        schema.type_tag(),
                        relation.name
                    )));
                }
                FieldValue::Reference(id) => vec![*id],
                other => {
                    return Err(StorageError::Serialization(format!(
                        "{}.{} holds {other:?}, expected a reference",
                        schema.type_tag(),
                        relation.name
                    )));
                }
            }
        };
        for target in targets {
            let found = object_type(conn, target)?;
            if found.as_deref() != Some(relation.target.as_str()) {
                return Err(StorageError::IntegrityConflict(format!(
                    "FOREIGN KEY constraint failed: {}.{} -> {}#{}",
                    schema.type_tag(),
                    relation.name,
                    relation.target,
                    target
                )));
            }
        }
    }
    Ok(())
}

fn write_object(
    conn: &Connection,
    schema: &EntitySchema,
    object: &TargetObject,
    id: ObjectId,
) -> Result<(), StorageError> {
    conn.execute("DELETE FROM object_fields WHERE object_id = ?1", rusqlite::params![id.get()])?;
    conn.execute("DELETE FROM unique_values WHERE object_id = ?1", rusqlite::params![id.get()])?;
    conn.execute("DELETE FROM object_links WHERE object_id = ?1", rusqlite::params![id.get()])?;

    for (name, value) in object.values() {
        let match_text = value.match_text();
        conn.execute(
            "INSERT INTO object_fields (object_id, field_key, value, match_text) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id.get(), name, encode(value)?, match_text],
        )?;
        let unique = schema.field(name).is_some_and(|f| f.unique);
        if let (true, Some(text)) = (unique, match_text) {
            conn.execute(
                "INSERT INTO unique_values (type_tag, field_key, match_text, object_id) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![schema.type_tag(), name, text, id.get()],
            )
            .map_err(integrity)?;
        }
    }

    for (relation, targets) in object.all_links() {
        for target in targets {
            conn.execute(
                "INSERT INTO object_links (object_id, relation, target_id) VALUES (?1, ?2, ?3)",
                rusqlite::params![id.get(), relation, target.get()],
            )
            .map_err(integrity)?;
        }
    }
    Ok(())
}

/// Delete one object and clear every reference to it.
/// Mappings are left in place.
fn remove_object(
    conn: &Connection,
    schemas: &SchemaRegistry,
    target: &ObjectRef,
) -> Result<bool, StorageError> {
    if object_type(conn, target.id)?.as_deref() != Some(target.type_tag.as_str()) {
        return Ok(false);
    }

    let cleared = encode(&FieldValue::Null)?;
    let id_text = FieldValue::Reference(target.id).match_text();
    for schema in schemas.iter() {
        for relation in schema
            .relations()
            .iter()
            .filter(|r| !r.is_many() && r.target == target.type_tag)
        {
            conn.execute(
                "UPDATE object_fields SET value = ?1, match_text = NULL
                 WHERE field_key = ?2 AND match_text = ?3
                 AND object_id IN (SELECT object_id FROM objects WHERE type_tag = ?4)",
                rusqlite::params![cleared, relation.name, id_text, schema.type_tag()],
            )?;
        }
    }

    // Fields, unique values and links in both directions cascade.
    conn.execute(
        "DELETE FROM objects WHERE object_id = ?1",
        rusqlite::params![target.id.get()],
    )?;
    debug!(object = %target, "deleted object");
    Ok(true)
}

fn read_mapping(row: &rusqlite::Row) -> rusqlite::Result<ExternalKeyMapping> {
    let mapping_id: i64 = row.get(0)?;
    let system_id: i64 = row.get(1)?;
    let external_key: String = row.get(2)?;
    let type_tag: String = row.get(3)?;
    let object_id: i64 = row.get(4)?;
    Ok(ExternalKeyMapping {
        mapping_id: Some(MappingId::new(mapping_id)),
        system_id: ExternalSystemId::new(system_id),
        external_key,
        target: ObjectRef::new(type_tag, ObjectId::new(object_id)),
    })
}

impl ObjectStore for SqliteStore {
    fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    fn get_one(
        &self,
        type_tag: &str,
        predicate: &Predicate,
    ) -> Result<Lookup<TargetObject>, StorageError> {
        let schema = self.schema(type_tag)?;
        let ids = self.matching_ids(&schema, predicate, Some(2))?;
        match ids.as_slice() {
            [] => Ok(Lookup::NotFound),
            [id] => Ok(Lookup::Found(load_object(&self.conn, &schema, *id)?)),
            _ => Ok(Lookup::Ambiguous),
        }
    }

    fn delete_matching(
        &mut self,
        type_tag: &str,
        predicate: &Predicate,
    ) -> Result<usize, StorageError> {
        let schema = self.schema(type_tag)?;
        let ids = self.matching_ids(&schema, predicate, None)?;

        let sp = self.conn.savepoint()?;
        let mut deleted = 0;
        for id in ids {
            if remove_object(&sp, &self.schemas, &ObjectRef::new(type_tag, id))? {
                deleted += 1;
            }
        }
        sp.commit()?;
        Ok(deleted)
    }

    fn save(&mut self, object: &mut TargetObject) -> Result<(), StorageError> {
        let schema = self.schema(object.type_tag())?;
        let sp = self.conn.savepoint()?;
        check_object(&sp, &schema, object)?;

        let (id, created) = match object.id() {
            Some(id) => match object_type(&sp, id)? {
                Some(tag) if tag == schema.type_tag() => (id, false),
                _ => {
                    return Err(StorageError::NotFound(format!(
                        "{}#{id}",
                        schema.type_tag()
                    )));
                }
            },
            None => {
                sp.execute(
                    "INSERT INTO objects (type_tag) VALUES (?1)",
                    rusqlite::params![schema.type_tag()],
                )?;
                (ObjectId::new(sp.last_insert_rowid()), true)
            }
        };

        // Dropping the savepoint on error rolls back the partial write.
        write_object(&sp, &schema, object, id)?;
        sp.commit()?;

        if created {
            object.set_id(Some(id));
        }
        debug!(object = %ObjectRef::new(schema.type_tag(), id), created, "saved object");
        Ok(())
    }

    fn delete_object(&mut self, target: &ObjectRef) -> Result<bool, StorageError> {
        let sp = self.conn.savepoint()?;
        let deleted = remove_object(&sp, &self.schemas, target)?;
        sp.commit()?;
        Ok(deleted)
    }

    fn resolve(&self, target: &ObjectRef) -> Result<Option<TargetObject>, StorageError> {
        let Some(schema) = self.schemas.get(&target.type_tag) else {
            return Ok(None);
        };
        match object_type(&self.conn, target.id)? {
            Some(tag) if tag == target.type_tag => {
                Ok(Some(load_object(&self.conn, &schema, target.id)?))
            }
            _ => Ok(None),
        }
    }

    fn count(&self, type_tag: &str) -> Result<u64, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM objects WHERE type_tag = ?1",
            rusqlite::params![type_tag],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn begin(&mut self) -> Result<(), StorageError> {
        if self.in_transaction {
            return Err(StorageError::Transaction("transaction already open".into()));
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        if !self.in_transaction {
            return Err(StorageError::Transaction("no open transaction".into()));
        }
        self.conn.execute_batch("COMMIT")?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        if !self.in_transaction {
            return Err(StorageError::Transaction("no open transaction".into()));
        }
        self.in_transaction = false;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn find_external_system(&self, name: &str) -> Result<Option<ExternalSystem>, StorageError> {
        Ok(self
            .conn
            .query_row(
                "SELECT system_id, name, description FROM external_systems WHERE name = ?1",
                rusqlite::params![name],
                |row| {
                    Ok(ExternalSystem {
                        system_id: ExternalSystemId::new(row.get(0)?),
                        name: row.get(1)?,
                        description: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    fn create_external_system(
        &mut self,
        name: &str,
        description: &str,
    ) -> Result<ExternalSystem, StorageError> {
        self.conn
            .execute(
                "INSERT INTO external_systems (name, description) VALUES (?1, ?2)",
                rusqlite::params![name, description],
            )
            .map_err(integrity)?;
        let system_id = ExternalSystemId::new(self.conn.last_insert_rowid());
        debug!(system = name, %system_id, "created external system");
        Ok(ExternalSystem {
            system_id,
            name: name.to_string(),
            description: description.to_string(),
        })
    }

    fn get_mapping(
        &self,
        system_id: ExternalSystemId,
        external_key: &str,
    ) -> Result<Option<ExternalKeyMapping>, StorageError> {
        Ok(self
            .conn
            .query_row(
                "SELECT mapping_id, system_id, external_key, type_tag, object_id
                 FROM external_key_mappings WHERE system_id = ?1 AND external_key = ?2",
                rusqlite::params![system_id.get(), external_key],
                read_mapping,
            )
            .optional()?)
    }

    fn mappings_for_object(
        &self,
        target: &ObjectRef,
    ) -> Result<Vec<ExternalKeyMapping>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT mapping_id, system_id, external_key, type_tag, object_id
             FROM external_key_mappings WHERE type_tag = ?1 AND object_id = ?2
             ORDER BY mapping_id",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![target.type_tag, target.id.get()],
            read_mapping,
        )?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn save_mapping(&mut self, mapping: &mut ExternalKeyMapping) -> Result<(), StorageError> {
        let mapping_id: i64 = self
            .conn
            .query_row(
                "INSERT INTO external_key_mappings (system_id, external_key, type_tag, object_id)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (system_id, external_key)
                 DO UPDATE SET type_tag = excluded.type_tag, object_id = excluded.object_id
                 RETURNING mapping_id",
                rusqlite::params![
                    mapping.system_id.get(),
                    mapping.external_key,
                    mapping.target.type_tag,
                    mapping.target.id.get(),
                ],
                |row| row.get(0),
            )
            .map_err(integrity)?;
        mapping.mapping_id = Some(MappingId::new(mapping_id));
        debug!(key = %mapping.external_key, target = %mapping.target, "saved mapping");
        Ok(())
    }

    fn delete_mappings(
        &mut self,
        system_id: ExternalSystemId,
        external_key: &str,
    ) -> Result<usize, StorageError> {
        Ok(self.conn.execute(
            "DELETE FROM external_key_mappings WHERE system_id = ?1 AND external_key = ?2",
            rusqlite::params![system_id.get(), external_key],
        )?)
    }

    fn mapping_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM external_key_mappings",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("entity_types", &self.schemas.len())
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}
