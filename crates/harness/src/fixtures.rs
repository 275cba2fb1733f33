use recsync_core::{
    config::{PolicyKind, SyncConfig},
    fields::FieldMap,
    intent,
    object::TargetObject,
    predicate::Predicate,
    schema::{EntitySchema, FieldDef, RelationDef, SchemaRegistry},
    selector::MatchSpec,
};
use recsync_engine::{
    actions::ModelAction, ActionFactory, EngineError, Synchronizer,
};
use recsync_storage::{ExternalSystem, Lookup, ObjectStore, SqliteStore, StorageError};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

pub fn person_schema() -> Result<EntitySchema, recsync_core::CoreError> {
    EntitySchema::new(
        "Person",
        vec![
            FieldDef::text("first_name"),
            FieldDef::text("last_name"),
            FieldDef::integer("age").nullable(),
            FieldDef::text("hair_colour").with_default("Unknown"),
        ],
        vec![],
    )
}

pub fn house_schema() -> Result<EntitySchema, recsync_core::CoreError> {
    EntitySchema::new(
        "House",
        vec![
            FieldDef::text("address").unique(),
            FieldDef::text("country"),
            FieldDef::integer("floors").nullable(),
        ],
        vec![RelationDef::one("owner", "Person").nullable()],
    )
}

pub fn builder_schema() -> Result<EntitySchema, recsync_core::CoreError> {
    EntitySchema::new(
        "Builder",
        vec![FieldDef::text("first_name"), FieldDef::text("last_name")],
        vec![RelationDef::many("buildings", "House")],
    )
}

/// Person, House (owned by a Person) and Builder (of many Houses).
pub fn registry() -> Result<SchemaRegistry, recsync_core::CoreError> {
    SchemaRegistry::from_schemas([person_schema()?, house_schema()?, builder_schema()?])
}

pub fn open_store() -> Result<SqliteStore, StorageError> {
    SqliteStore::open_in_memory(registry()?)
}

pub fn config(policy: PolicyKind, transactional: bool) -> SyncConfig {
    SyncConfig {
        policy,
        transactional,
        ..SyncConfig::default()
    }
}

pub fn synchronizer(policy: PolicyKind, transactional: bool) -> TestResult<Synchronizer<SqliteStore>> {
    Ok(Synchronizer::new(open_store()?, config(policy, transactional)))
}

pub fn record(pairs: &[(&str, &str)]) -> FieldMap {
    pairs.iter().copied().collect()
}

pub fn model_action(
    store: &dyn ObjectStore,
    type_tag: &str,
    match_on: &str,
    pairs: &[(&str, &str)],
) -> TestResult<ModelAction> {
    let schema = store
        .schemas()
        .get(type_tag)
        .ok_or_else(|| EngineError::UnknownEntityType(type_tag.to_string()))?;
    Ok(ModelAction::new(schema, &MatchSpec::parse(match_on), record(pairs))?)
}

pub fn factory(
    store: &dyn ObjectStore,
    type_tag: &str,
    system: Option<ExternalSystem>,
) -> TestResult<ActionFactory> {
    let schema = store
        .schemas()
        .get(type_tag)
        .ok_or_else(|| EngineError::UnknownEntityType(type_tag.to_string()))?;
    Ok(ActionFactory::new(schema, system))
}

/// Build the actions for `flags` and run them in order.
pub fn run(
    store: &mut dyn ObjectStore,
    factory: &ActionFactory,
    flags: &str,
    match_on: &str,
    external_key: Option<&str>,
    pairs: &[(&str, &str)],
) -> TestResult<Vec<Option<TargetObject>>> {
    let intent = intent::decode(Some(flags))?;
    let actions = factory.build(&intent, &MatchSpec::parse(match_on), external_key, record(pairs))?;
    let mut results = Vec::new();
    for action in &actions {
        results.push(action.execute(store)?);
    }
    Ok(results)
}

/// Save a new object built from raw values, bypassing the actions.
pub fn insert(
    store: &mut dyn ObjectStore,
    type_tag: &str,
    pairs: &[(&str, &str)],
) -> TestResult<TargetObject> {
    let schema = store
        .schemas()
        .get(type_tag)
        .ok_or_else(|| StorageError::UnknownEntityType(type_tag.to_string()))?;
    let mut object = schema.instantiate()?;
    for (name, raw) in pairs {
        let def = schema
            .field(name)
            .ok_or_else(|| format!("{type_tag} has no field {name}"))?;
        object.set_value(name, def.coerce(raw)?);
    }
    store.save(&mut object)?;
    Ok(object)
}

/// The single object of `type_tag` whose `field` equals `value`.
pub fn find(
    store: &dyn ObjectStore,
    type_tag: &str,
    field: &str,
    value: &str,
) -> TestResult<Option<TargetObject>> {
    match store.get_one(type_tag, &Predicate::eq(field, value))? {
        Lookup::Found(object) => Ok(Some(object)),
        Lookup::NotFound => Ok(None),
        Lookup::Ambiguous => Err(format!("{type_tag}.{field} = {value:?} is ambiguous").into()),
    }
}
