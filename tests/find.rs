mod common;

use plantdb_sdk::AppError;
use serde_json::json;

async fn four_families() -> common::Store {
    let store = common::store().await;
    for name in ["Haze", "Kush", "Diesel", "Skunk"] {
        store.create("Family", json!({"familyName": name})).await.unwrap();
    }
    store
}

#[tokio::test]
async fn limit_reports_found_and_remaining() {
    let store = four_families().await;
    let out = store.find("Family", json!({"limit": 2})).await.unwrap();
    assert_eq!((out.found, out.remaining), (4, 2));
    assert_eq!(store.ids("Family", json!({"limit": 2})).await, vec![1, 2]);
}

#[tokio::test]
async fn offset_past_the_end() {
    let store = four_families().await;
    let out = store.find("Family", json!({"limit": 2, "offset": 3})).await.unwrap();
    assert_eq!((out.found, out.remaining), (4, 0));
    assert_eq!(out.entities["families"].as_object().unwrap().len(), 1);

    let out = store.find("Family", json!({"offset": 10})).await.unwrap();
    assert_eq!((out.found, out.remaining), (4, 0));
    assert!(out.entities["families"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn default_limit_is_ten() {
    let store = common::store().await;
    for i in 0..12 {
        store.create("Family", json!({"familyName": format!("f{}", i)})).await.unwrap();
    }
    let out = store.find("Family", json!({})).await.unwrap();
    assert_eq!((out.found, out.remaining), (12, 2));
}

#[tokio::test]
async fn sort_orders_the_page() {
    let store = four_families().await;
    let ids = store.ids("Family", json!({"sort": "familyName DESC", "limit": 1})).await;
    assert_eq!(ids, vec![4]);
    let ids = store.ids("Family", json!({"sort": "familyName ASC", "limit": 1})).await;
    assert_eq!(ids, vec![3]);
}

#[tokio::test]
async fn create_then_find_round_trips() {
    let store = common::store().await;
    store.family_with_plants(&[]).await;
    let created = store
        .create(
            "Plant",
            json!({"plantName": "Clone A", "plantSex": "female", "genotypeName": "g", "generationId": 1}),
        )
        .await
        .unwrap();
    let found = store.find("Plant", json!({"where": {"plantId": 1}})).await.unwrap();
    let plant = &found.entities["plants"]["1"];
    for key in ["plantId", "plantName", "plantSex", "genotypeId", "plantCreatedAt", "plantModifiedAt"] {
        assert_eq!(plant[key], created["plants"]["1"][key], "{}", key);
    }
    assert_eq!(plant["generationId"], json!(1));
    assert_eq!(plant["familyId"], json!(1));
    // ids only: no joined buckets
    assert!(found.entities.get("families").is_none());
}

#[tokio::test]
async fn joined_attributes_fill_related_buckets() {
    let store = common::store().await;
    store.family_with_plants(&["a", "b"]).await;
    let found = store
        .find("Plant", json!({"attributes": ["plantName", "familyName"], "where": {"familyName": "Haze"}}))
        .await
        .unwrap();
    assert_eq!(found.found, 2);
    assert_eq!(found.entities["families"]["1"], json!({"familyId": 1, "familyName": "Haze"}));
    assert_eq!(found.entities["plants"]["2"], json!({"plantId": 2, "plantName": "b"}));
    assert!(found.entities.get("genotypes").is_none());
}

#[tokio::test]
async fn one_to_many_ids_are_aggregated() {
    let store = common::store().await;
    store.family_with_plants(&["a", "b"]).await;
    store
        .create("Generation", json!({"generationName": "F2", "familyId": 1}))
        .await
        .unwrap();
    let found = store.find("Family", json!({})).await.unwrap();
    assert_eq!(found.found, 1);
    assert_eq!(found.entities["families"]["1"]["familyGenerations"], json!([1, 2]));

    let found = store.find("Genotype", json!({"where": {"generationId": 1}})).await.unwrap();
    assert_eq!(found.found, 2);
    assert_eq!(found.entities["genotypes"]["1"]["genotypePlants"], json!([1]));
}

#[tokio::test]
async fn unknown_attributes_are_ignored() {
    let store = four_families().await;
    let out = store
        .find("Family", json!({"attributes": ["familyName", "nope"], "where": {"nope": 1}}))
        .await
        .unwrap();
    assert_eq!(out.found, 4);
    assert_eq!(out.entities["families"]["1"], json!({"familyId": 1, "familyName": "Haze"}));
}

#[tokio::test]
async fn malformed_criteria_is_a_shape_error() {
    let store = common::store().await;
    assert!(matches!(store.find("Family", json!([1])).await, Err(AppError::Shape(_))));
    assert!(matches!(store.find("Family", json!({"limit": "x"})).await, Err(AppError::Shape(_))));
}
