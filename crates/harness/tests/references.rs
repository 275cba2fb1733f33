use pretty_assertions::assert_eq;
use recsync_core::ids::ObjectRef;
use recsync_engine::{
    actions::{
        AlignExternalReferenceAction, CreateModelAction, DeleteExternalReferenceAction,
        DeleteIfOnlyReferenceModelAction, DeleteModelAction, UpdateModelAction,
    },
    ActionType, SyncAction,
};
use recsync_harness::{factory, find, insert, model_action, open_store, run};
use recsync_storage::{ExternalKeyMapping, ExternalSystem, ObjectStore, SqliteStore};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn store_with_systems() -> Result<(SqliteStore, ExternalSystem, ExternalSystem), Box<dyn std::error::Error>> {
    let mut store = open_store()?;
    let crm = store.create_external_system("crm", "Customer records")?;
    let erp = store.create_external_system("erp", "Planning")?;
    Ok((store, crm, erp))
}

fn mapped_target(
    store: &dyn ObjectStore,
    system: &ExternalSystem,
    key: &str,
) -> Result<Option<ObjectRef>, Box<dyn std::error::Error>> {
    Ok(store.get_mapping(system.system_id, key)?.map(|m| m.target))
}

// ============================================================================
// Align
// ============================================================================

#[test]
fn align_records_the_inner_result() -> TestResult {
    let (mut store, crm, _) = store_with_systems()?;
    let create = CreateModelAction::new(model_action(&store, "House", "address", &[("address", "H1")])?);
    let align = AlignExternalReferenceAction::new(crm.clone(), "K1", Box::new(create));
    assert_eq!(align.action_type(), ActionType::Create);

    let house = align.execute(&mut store)?.ok_or("nothing created")?;
    assert_eq!(mapped_target(&store, &crm, "K1")?, house.object_ref());
    Ok(())
}

#[test]
fn align_leaves_mapping_alone_when_inner_returns_nothing() -> TestResult {
    let (mut store, crm, _) = store_with_systems()?;
    let update = UpdateModelAction::new(model_action(&store, "House", "address", &[("address", "H1")])?, true);
    let align = AlignExternalReferenceAction::new(crm.clone(), "K1", Box::new(update));
    assert_eq!(align.action_type(), ActionType::Update);

    assert_eq!(align.execute(&mut store)?, None);
    assert_eq!(store.mapping_count()?, 0);
    Ok(())
}

// ============================================================================
// Create / update with reference
// ============================================================================

#[test]
fn mapping_wins_over_match_fields_on_create() -> TestResult {
    let (mut store, crm, _) = store_with_systems()?;
    let houses = factory(&store, "House", Some(crm.clone()))?;
    let first = run(&mut store, &houses, "c", "address", Some("K1"), &[("address", "H1")])?;
    let first = first[0].clone().ok_or("nothing created")?;

    let again = run(&mut store, &houses, "c", "address", Some("K1"), &[("address", "H2")])?;
    assert_eq!(again[0].as_ref().and_then(|h| h.id()), first.id());
    assert_eq!(store.count("House")?, 1);
    assert_eq!(find(&store, "House", "address", "H2")?, None);
    Ok(())
}

#[test]
fn dangling_mapping_is_repointed_by_create() -> TestResult {
    let (mut store, crm, _) = store_with_systems()?;
    let houses = factory(&store, "House", Some(crm.clone()))?;
    let first = run(&mut store, &houses, "c", "address", Some("K1"), &[("address", "H1")])?;
    let first = first[0].clone().and_then(|h| h.object_ref()).ok_or("nothing created")?;
    store.delete_object(&first)?;

    let second = run(&mut store, &houses, "c", "address", Some("K1"), &[("address", "H2")])?;
    let second = second[0].clone().and_then(|h| h.object_ref()).ok_or("nothing created")?;
    assert_ne!(second, first);
    assert_eq!(mapped_target(&store, &crm, "K1")?, Some(second));
    assert_eq!(store.mapping_count()?, 1);
    Ok(())
}

#[test]
fn forced_update_through_mapping_ignores_match_fields() -> TestResult {
    let (mut store, crm, _) = store_with_systems()?;
    let houses = factory(&store, "House", Some(crm.clone()))?;
    run(&mut store, &houses, "c", "address", Some("K1"), &[("address", "Old")])?;
    let original = mapped_target(&store, &crm, "K1")?.ok_or("no mapping")?;

    run(&mut store, &houses, "u*", "address", Some("K1"), &[("address", "New")])?;
    let house = store.resolve(&original)?.ok_or("mapped house gone")?;
    assert_eq!(house.text("address"), Some("New"));
    assert_eq!(mapped_target(&store, &crm, "K1")?, Some(original.clone()));

    // Already equal: still the same object, still mapped.
    run(&mut store, &houses, "u*", "address", Some("K1"), &[("address", "New"), ("country", "UK")])?;
    let house = store.resolve(&original)?.ok_or("mapped house gone")?;
    assert_eq!(house.text("country"), Some("UK"));
    assert_eq!(mapped_target(&store, &crm, "K1")?, Some(original));
    assert_eq!(store.count("House")?, 1);
    Ok(())
}

#[test]
fn update_with_reference_removes_matched_duplicate() -> TestResult {
    let (mut store, crm, _) = store_with_systems()?;
    let houses = factory(&store, "House", Some(crm.clone()))?;
    run(&mut store, &houses, "c", "address", Some("K1"), &[("address", "A1")])?;
    let linked = mapped_target(&store, &crm, "K1")?.ok_or("no mapping")?;
    let duplicate = insert(&mut store, "House", &[("address", "A2")])?;

    run(&mut store, &houses, "u*", "address", Some("K1"), &[("address", "A2"), ("country", "FR")])?;

    assert_eq!(store.resolve(&duplicate.object_ref().ok_or("unsaved")?)?, None);
    let house = store.resolve(&linked)?.ok_or("linked house gone")?;
    assert_eq!(house.text("address"), Some("A2"));
    assert_eq!(house.text("country"), Some("FR"));
    assert_eq!(store.count("House")?, 1);
    Ok(())
}

#[test]
fn update_with_reference_falls_back_to_match_and_maps_it() -> TestResult {
    let (mut store, crm, _) = store_with_systems()?;
    let houses = factory(&store, "House", Some(crm.clone()))?;
    let house = insert(&mut store, "House", &[("address", "H1")])?;

    run(&mut store, &houses, "u", "address", Some("K1"), &[("address", "H1"), ("country", "UK")])?;
    assert_eq!(mapped_target(&store, &crm, "K1")?, house.object_ref());
    let house = find(&store, "House", "address", "H1")?.ok_or("house gone")?;
    assert_eq!(house.text("country"), Some("UK"));
    Ok(())
}

#[test]
fn update_with_reference_without_target_is_a_no_op() -> TestResult {
    let (mut store, crm, _) = store_with_systems()?;
    let houses = factory(&store, "House", Some(crm.clone()))?;
    let results = run(&mut store, &houses, "u*", "address", Some("K1"), &[("address", "H1")])?;
    assert_eq!(results, vec![None]);
    assert_eq!(store.mapping_count()?, 0);
    assert_eq!(store.count("House")?, 0);
    Ok(())
}

#[test]
fn update_with_reference_integrity_conflict_keeps_mapping() -> TestResult {
    let (mut store, crm, _) = store_with_systems()?;
    let houses = factory(&store, "House", Some(crm.clone()))?;
    run(&mut store, &houses, "c", "address", Some("K1"), &[("address", "H1"), ("country", "UK")])?;
    let linked = mapped_target(&store, &crm, "K1")?.ok_or("no mapping")?;
    insert(&mut store, "House", &[("address", "H2"), ("country", "UK")])?;

    // Matched on country: ambiguous, so the linked object is used and its new
    // address collides with H2.
    let results = run(&mut store, &houses, "u*", "country", Some("K1"), &[("country", "UK"), ("address", "H2")])?;
    assert_eq!(results, vec![None]);
    assert_eq!(mapped_target(&store, &crm, "K1")?, Some(linked.clone()));
    let house = store.resolve(&linked)?.ok_or("linked house gone")?;
    assert_eq!(house.text("address"), Some("H1"));
    Ok(())
}

// ============================================================================
// Reference-counted delete
// ============================================================================

fn delete_if_only(
    store: &dyn ObjectStore,
    system: &ExternalSystem,
    key: &str,
    address: &str,
) -> Result<DeleteIfOnlyReferenceModelAction, Box<dyn std::error::Error>> {
    let delete = DeleteModelAction::new(model_action(store, "House", "address", &[("address", address)])?);
    Ok(DeleteIfOnlyReferenceModelAction::new(system.clone(), key, delete))
}

fn map(store: &mut dyn ObjectStore, system: &ExternalSystem, key: &str, target: &ObjectRef) -> TestResult {
    store.save_mapping(&mut ExternalKeyMapping::new(system.system_id, key, target.clone()))?;
    Ok(())
}

#[test]
fn deletes_when_own_mapping_is_the_only_one() -> TestResult {
    let (mut store, crm, _) = store_with_systems()?;
    let house = insert(&mut store, "House", &[("address", "H1")])?.object_ref().ok_or("unsaved")?;
    map(&mut store, &crm, "K1", &house)?;

    let action = delete_if_only(&store, &crm, "K1", "H1")?;
    assert_eq!(action.action_type(), ActionType::Delete);
    action.execute(&mut store)?;
    assert_eq!(store.resolve(&house)?, None);
    Ok(())
}

#[test]
fn no_op_without_any_mapping() -> TestResult {
    let (mut store, crm, _) = store_with_systems()?;
    let house = insert(&mut store, "House", &[("address", "H1")])?.object_ref().ok_or("unsaved")?;

    delete_if_only(&store, &crm, "K1", "H1")?.execute(&mut store)?;
    assert!(store.resolve(&house)?.is_some());
    Ok(())
}

#[test]
fn no_op_when_another_system_owns_the_mapping() -> TestResult {
    let (mut store, crm, erp) = store_with_systems()?;
    let house = insert(&mut store, "House", &[("address", "H1")])?.object_ref().ok_or("unsaved")?;
    map(&mut store, &erp, "K1", &house)?;

    delete_if_only(&store, &crm, "K1", "H1")?.execute(&mut store)?;
    assert!(store.resolve(&house)?.is_some());
    Ok(())
}

#[test]
fn no_op_when_more_than_one_mapping_exists() -> TestResult {
    let (mut store, crm, erp) = store_with_systems()?;
    let house = insert(&mut store, "House", &[("address", "H1")])?.object_ref().ok_or("unsaved")?;
    map(&mut store, &crm, "K1", &house)?;
    map(&mut store, &erp, "E9", &house)?;

    delete_if_only(&store, &crm, "K1", "H1")?.execute(&mut store)?;
    assert!(store.resolve(&house)?.is_some());
    Ok(())
}

#[test]
fn other_keys_of_the_same_system_do_not_block_delete() -> TestResult {
    let (mut store, crm, _) = store_with_systems()?;
    let house = insert(&mut store, "House", &[("address", "H1")])?.object_ref().ok_or("unsaved")?;
    map(&mut store, &crm, "K1", &house)?;
    map(&mut store, &crm, "K2", &house)?;

    delete_if_only(&store, &crm, "K1", "H1")?.execute(&mut store)?;
    assert_eq!(store.resolve(&house)?, None);
    Ok(())
}

#[test]
fn ambiguous_match_deletes_nothing() -> TestResult {
    let (mut store, crm, _) = store_with_systems()?;
    let first = insert(&mut store, "House", &[("address", "H1"), ("country", "UK")])?
        .object_ref()
        .ok_or("unsaved")?;
    let second = insert(&mut store, "House", &[("address", "H2"), ("country", "UK")])?
        .object_ref()
        .ok_or("unsaved")?;
    map(&mut store, &crm, "K1", &first)?;

    let delete = DeleteModelAction::new(model_action(&store, "House", "country", &[("country", "UK")])?);
    let action = DeleteIfOnlyReferenceModelAction::new(crm.clone(), "K1", delete);
    assert_eq!(action.execute(&mut store)?, None);

    assert!(store.resolve(&first)?.is_some());
    assert!(store.resolve(&second)?.is_some());
    assert_eq!(store.mapping_count()?, 1);
    Ok(())
}

#[test]
fn no_op_when_the_only_mapping_uses_another_key() -> TestResult {
    let (mut store, crm, _) = store_with_systems()?;
    let house = insert(&mut store, "House", &[("address", "H1")])?.object_ref().ok_or("unsaved")?;
    map(&mut store, &crm, "K2", &house)?;

    delete_if_only(&store, &crm, "K1", "H1")?.execute(&mut store)?;
    assert!(store.resolve(&house)?.is_some());
    Ok(())
}

#[test]
fn delete_external_reference_retracts_the_claim_only() -> TestResult {
    let (mut store, crm, erp) = store_with_systems()?;
    let house = insert(&mut store, "House", &[("address", "H1")])?.object_ref().ok_or("unsaved")?;
    map(&mut store, &crm, "K1", &house)?;
    map(&mut store, &erp, "K1", &house)?;

    let action = DeleteExternalReferenceAction::new(crm.clone(), "K1");
    assert_eq!(action.action_type(), ActionType::Delete);
    assert_eq!(action.execute(&mut store)?, None);

    assert_eq!(mapped_target(&store, &crm, "K1")?, None);
    assert_eq!(mapped_target(&store, &erp, "K1")?, Some(house.clone()));
    assert!(store.resolve(&house)?.is_some());

    // Nothing left to retract.
    action.execute(&mut store)?;
    assert_eq!(store.mapping_count()?, 1);
    Ok(())
}

#[test]
fn two_systems_must_both_delete() -> TestResult {
    let (mut store, crm, erp) = store_with_systems()?;
    let from_crm = factory(&store, "House", Some(crm.clone()))?;
    let from_erp = factory(&store, "House", Some(erp.clone()))?;
    run(&mut store, &from_crm, "c", "address", Some("C-1"), &[("address", "H1")])?;
    run(&mut store, &from_erp, "c", "address", Some("E-1"), &[("address", "H1")])?;
    let house = mapped_target(&store, &crm, "C-1")?.ok_or("no crm mapping")?;
    assert_eq!(mapped_target(&store, &erp, "E-1")?, Some(house.clone()));

    run(&mut store, &from_crm, "d", "address", Some("C-1"), &[("address", "H1")])?;
    assert!(store.resolve(&house)?.is_some());
    assert_eq!(mapped_target(&store, &crm, "C-1")?, None);

    run(&mut store, &from_erp, "d", "address", Some("E-1"), &[("address", "H1")])?;
    assert_eq!(store.resolve(&house)?, None);
    assert_eq!(store.mapping_count()?, 0);
    Ok(())
}

#[test]
fn forced_delete_ignores_other_claims() -> TestResult {
    let (mut store, crm, erp) = store_with_systems()?;
    let house = insert(&mut store, "House", &[("address", "H1")])?.object_ref().ok_or("unsaved")?;
    map(&mut store, &crm, "K1", &house)?;
    map(&mut store, &erp, "K1", &house)?;

    let from_crm = factory(&store, "House", Some(crm.clone()))?;
    run(&mut store, &from_crm, "d*", "address", Some("K1"), &[("address", "H1")])?;
    assert_eq!(store.resolve(&house)?, None);
    assert_eq!(mapped_target(&store, &crm, "K1")?, None);
    // The other system's mapping now dangles.
    assert_eq!(mapped_target(&store, &erp, "K1")?, Some(house));
    Ok(())
}
