use pretty_assertions::assert_eq;
use recsync_core::{config::RecordLabels, intent, selector::MatchSpec, CoreError};
use recsync_engine::{ActionFactory, ActionType, EngineError, SyncAction};
use recsync_harness::{factory, open_store, record};
use recsync_storage::{ExternalSystem, ObjectStore};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn build(
    factory: &ActionFactory,
    flags: &str,
    external_key: Option<&str>,
) -> Result<Vec<Box<dyn SyncAction>>, EngineError> {
    let intent = intent::decode(Some(flags))?;
    factory.build(
        &intent,
        &MatchSpec::parse("address"),
        external_key,
        record(&[("address", "H1")]),
    )
}

fn types(actions: &[Box<dyn SyncAction>]) -> Vec<ActionType> {
    actions.iter().map(|a| a.action_type()).collect()
}

fn names(actions: &[Box<dyn SyncAction>]) -> Vec<String> {
    actions
        .iter()
        .map(|a| {
            let debug = format!("{a:?}");
            debug
                .split(|c: char| !c.is_alphanumeric())
                .next()
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

fn with_system() -> Result<(ActionFactory, ActionFactory), Box<dyn std::error::Error>> {
    let mut store = open_store()?;
    let system: ExternalSystem = store.create_external_system("crm", "crm")?;
    Ok((factory(&store, "House", Some(system))?, factory(&store, "House", None)?))
}

#[test]
fn externally_mappable_needs_system_and_non_blank_key() -> TestResult {
    let (mapped, unmapped) = with_system()?;
    assert!(mapped.is_externally_mappable(Some("K1")));
    assert!(!mapped.is_externally_mappable(Some("   ")));
    assert!(!mapped.is_externally_mappable(Some("")));
    assert!(!mapped.is_externally_mappable(None));
    assert!(!unmapped.is_externally_mappable(Some("K1")));
    Ok(())
}

#[test]
fn impotent_intent_builds_a_no_op() -> TestResult {
    let (mapped, _) = with_system()?;
    let actions = build(&mapped, "", Some("K1"))?;
    assert_eq!(types(&actions), vec![ActionType::None]);
    assert_eq!(names(&actions), vec!["ModelAction"]);
    Ok(())
}

#[test]
fn delete_variants() -> TestResult {
    let (mapped, unmapped) = with_system()?;

    let actions = build(&mapped, "d", Some("K1"))?;
    assert_eq!(types(&actions), vec![ActionType::Delete, ActionType::Delete]);
    assert_eq!(
        names(&actions),
        vec!["DeleteIfOnlyReferenceModelAction", "DeleteExternalReferenceAction"]
    );

    let actions = build(&mapped, "d*", Some("K1"))?;
    assert_eq!(names(&actions), vec!["DeleteModelAction", "DeleteExternalReferenceAction"]);

    let actions = build(&unmapped, "d*", Some("K1"))?;
    assert_eq!(names(&actions), vec!["DeleteModelAction"]);

    assert!(build(&unmapped, "d", None)?.is_empty());
    assert!(build(&mapped, "D", Some(" "))?.is_empty());
    Ok(())
}

#[test]
fn create_and_update_variants() -> TestResult {
    let (mapped, unmapped) = with_system()?;

    assert_eq!(names(&build(&mapped, "c", Some("K1"))?), vec!["CreateModelWithReferenceAction"]);
    assert_eq!(names(&build(&unmapped, "c", Some("K1"))?), vec!["CreateModelAction"]);
    assert_eq!(names(&build(&mapped, "u", Some("K1"))?), vec!["UpdateModelWithReferenceAction"]);
    assert_eq!(names(&build(&mapped, "u*", None)?), vec!["UpdateModelAction"]);

    let both = build(&mapped, "CU*", Some("K1"))?;
    assert_eq!(types(&both), vec![ActionType::Create, ActionType::Update]);
    Ok(())
}

#[test]
fn invalid_intent_is_fatal_to_the_record() {
    assert!(matches!(intent::decode(Some("cd")), Err(CoreError::InvalidIntent(_))));
    assert!(matches!(intent::decode(Some("ud*")), Err(CoreError::InvalidIntent(_))));
}

// ============================================================================
// Record ingestion
// ============================================================================

#[test]
fn from_record_splits_reserved_keys() -> TestResult {
    let mut store = open_store()?;
    let system = store.create_external_system("crm", "crm")?;
    let houses = factory(&store, "House", Some(system))?;
    let labels = RecordLabels::default();

    let actions = houses.from_record(
        record(&[
            ("action_flags", "c"),
            ("match_on", "address"),
            ("external_key", "K1"),
            ("address", "H1"),
        ]),
        &labels,
    )?;
    assert_eq!(names(&actions), vec!["CreateModelWithReferenceAction"]);

    let house = actions[0].execute(&mut store)?.ok_or("nothing created")?;
    // Reserved keys are not written as attributes.
    assert_eq!(house.value("action_flags"), None);
    assert_eq!(store.mapping_count()?, 1);
    Ok(())
}

#[test]
fn from_record_edge_cases() -> TestResult {
    let (_, houses) = with_system()?;
    let labels = RecordLabels::default();

    assert!(houses.from_record(record(&[]), &labels)?.is_empty());

    let no_flags = houses.from_record(record(&[("match_on", "address"), ("address", "H1")]), &labels)?;
    assert_eq!(types(&no_flags), vec![ActionType::None]);

    let missing_spec = houses.from_record(record(&[("action_flags", "c"), ("address", "H1")]), &labels);
    assert!(matches!(missing_spec, Err(EngineError::MissingRecordKey(ref k)) if k == "match_on"));

    let bad_flags = houses.from_record(
        record(&[("action_flags", "cd"), ("match_on", "address"), ("address", "H1")]),
        &labels,
    );
    assert!(matches!(bad_flags, Err(EngineError::Core(CoreError::InvalidIntent(_)))));

    let missing_field = houses.from_record(
        record(&[("action_flags", "c"), ("match_on", "address country"), ("address", "H1")]),
        &labels,
    );
    assert!(matches!(
        missing_field,
        Err(EngineError::Core(CoreError::MissingMatchField(ref f))) if f == "country"
    ));
    Ok(())
}

#[test]
fn custom_labels_are_honoured() -> TestResult {
    let mut store = open_store()?;
    let houses = factory(&store, "House", None)?;
    let labels = RecordLabels {
        action_flags: "flags".into(),
        match_on: "match_field_name".into(),
        external_key: "key".into(),
    };

    let actions = houses.from_record(
        record(&[("flags", "c"), ("match_field_name", "address"), ("address", "H1")]),
        &labels,
    )?;
    actions[0].execute(&mut store)?;
    assert_eq!(store.count("House")?, 1);
    Ok(())
}
