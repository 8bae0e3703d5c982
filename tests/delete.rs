mod common;

use plantdb_sdk::{apply_schema, AppError, CrudService};
use serde_json::json;

#[tokio::test]
async fn deleting_a_family_cascades_to_descendants() {
    let store = common::store().await;
    store.family_with_plants(&["a", "b"]).await;
    let out = store.delete("Family", json!({"where": {"familyId": 1}})).await.unwrap();
    assert_eq!(
        serde_json::to_value(&out).unwrap(),
        json!({"families": [1], "generations": [1], "genotypes": [1, 2], "plants": [1, 2]})
    );
    assert!(store.ids("Plant", json!({})).await.is_empty());
    assert!(store.ids("Genotype", json!({})).await.is_empty());
}

#[tokio::test]
async fn parent_links_go_with_either_side() {
    let store = common::store().await;
    store.family_with_plants(&["mother", "father"]).await;
    store
        .create("Generation", json!({"generationName": "F2", "familyId": 1, "generationParents": [1, 2]}))
        .await
        .unwrap();

    let out = store.delete("Plant", json!({"where": {"plantId": 1}})).await.unwrap();
    assert_eq!(out.get("plants"), Some(&vec![1]));
    let found = store.find("Generation", json!({"where": {"generationId": 2}})).await.unwrap();
    assert_eq!(found.entities["generations"]["2"]["generationParents"], json!([2]));

    let out = store.delete("Generation", json!({"where": {"generationId": 2}})).await.unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(store.ids("Plant", json!({})).await, vec![2]);
}

#[tokio::test]
async fn clones_survive_with_the_reference_nulled() {
    let store = common::store().await;
    store.family_with_plants(&["mother"]).await;
    store
        .create("Plant", json!({"plantName": "clone", "plantClonedFrom": 1, "genotypeId": 1}))
        .await
        .unwrap();
    let out = store.delete("Plant", json!({"where": {"plantId": 1}})).await.unwrap();
    assert_eq!(out.get("plants"), Some(&vec![1]));

    let found = store.find("Plant", json!({})).await.unwrap();
    assert_eq!(found.found, 1);
    assert_eq!(found.entities["plants"]["2"]["plantClonedFrom"], json!(null));
}

#[tokio::test]
async fn environment_takes_mediums_plants_and_journals() {
    let store = common::store().await;
    store.family_with_plants(&[]).await;
    store.create("Environment", json!({"environmentName": "tent"})).await.unwrap();
    store.create("Medium", json!({"mediumName": "pot", "environmentId": 1})).await.unwrap();
    store
        .create("Plant", json!({"plantName": "potted", "genotypeName": "g", "generationId": 1, "mediumId": 1}))
        .await
        .unwrap();
    store
        .create("Journal", json!({"journalType": "watering", "journalValue": {"ml": 200}, "plantId": 1}))
        .await
        .unwrap();
    store
        .create("Journal", json!({"journalType": "log", "journalValue": "moved", "environmentId": 1}))
        .await
        .unwrap();

    let out = store.delete("Environment", json!({"where": {"environmentId": 1}})).await.unwrap();
    assert_eq!(
        serde_json::to_value(&out).unwrap(),
        json!({"environments": [1], "journals": [1, 2], "mediums": [1], "plants": [1]})
    );
    // the genotype the plant belonged to is untouched
    assert_eq!(store.ids("Genotype", json!({})).await, vec![1]);
}

#[tokio::test]
async fn nothing_matched_is_an_empty_result() {
    let store = common::store().await;
    let out = store.delete("Family", json!({"where": {"familyId": 7}})).await.unwrap();
    assert!(out.is_empty());
}

#[tokio::test]
async fn criteria_is_required() {
    let store = common::store().await;
    let family = store.model.entity("Family").unwrap();
    let err = CrudService::delete(&store.pool, &store.model, family, None).await.unwrap_err();
    assert!(matches!(err, AppError::Shape(_)));
    assert_eq!(err.to_string(), "No criteria object passed");
}

#[tokio::test]
async fn failure_midway_leaves_everything_in_place() {
    let store = common::store().await;
    store.family_with_plants(&["a"]).await;
    apply_schema(
        &store.pool,
        "CREATE TRIGGER keep_haze BEFORE DELETE ON families WHEN OLD.familyName = 'Haze' \
         BEGIN SELECT RAISE(ABORT, 'family is locked'); END;",
    )
    .await
    .unwrap();

    let err = store.delete("Family", json!({"where": {"familyId": 1}})).await.unwrap_err();
    assert!(matches!(err, AppError::Db(_)));
    assert_eq!(store.ids("Plant", json!({})).await, vec![1]);
    assert_eq!(store.ids("Generation", json!({})).await, vec![1]);
}
