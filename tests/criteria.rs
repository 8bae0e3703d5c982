mod common;

use serde_json::{json, Value};

/// Generation 1 has no parents; 2 = {1, 2}, 3 = {2}, 4 = {1, 2, 3}.
async fn parent_sets() -> common::Store {
    let store = common::store().await;
    store.family_with_plants(&["p1", "p2", "p3"]).await;
    for parents in [json!([1, 2]), json!([2]), json!([1, 2, 3])] {
        store
            .create(
                "Generation",
                json!({"generationName": "cross", "familyId": 1, "generationParents": parents}),
            )
            .await
            .unwrap();
    }
    store
}

async fn generations(store: &common::Store, parents: Value) -> Vec<i64> {
    store.ids("Generation", json!({"where": {"generationParents": parents}})).await
}

#[tokio::test]
async fn parent_array_is_an_exact_set_match() {
    let store = parent_sets().await;
    assert_eq!(generations(&store, json!([2, 1])).await, vec![2]);
    assert_eq!(generations(&store, json!([2])).await, vec![3]);
    assert_eq!(generations(&store, json!(2)).await, vec![3]);
    assert_eq!(generations(&store, json!({"$eq": 2})).await, vec![3]);
    assert_eq!(generations(&store, json!([])).await, vec![1]);
    assert_eq!(generations(&store, json!({"$neq": [1, 2]})).await, vec![1, 3, 4]);
}

#[tokio::test]
async fn has_and_nhas_are_complements() {
    let store = parent_sets().await;
    let has = generations(&store, json!({"$has": 2})).await;
    let nhas = generations(&store, json!({"$nhas": 2})).await;
    assert_eq!(has, vec![2, 3, 4]);
    assert_eq!(nhas, vec![1]);
    assert_eq!(generations(&store, json!({"$has": [1, 2]})).await, vec![2, 4]);
    assert_eq!(generations(&store, json!({"$in": [3]})).await, vec![4]);
}

#[tokio::test]
async fn parents_are_returned_sorted() {
    let store = parent_sets().await;
    let found = store.find("Generation", json!({"where": {"generationId": 4}})).await.unwrap();
    assert_eq!(found.entities["generations"]["4"]["generationParents"], json!([1, 2, 3]));
}

async fn journals() -> common::Store {
    let store = common::store().await;
    store.create("Environment", json!({"environmentName": "tent"})).await.unwrap();
    for value in [
        json!({"amount": 5, "unit": "ml"}),
        json!({"amount": "5"}),
        json!({"done": true}),
        json!({"tags": ["a", "b"]}),
        json!({"nested": {"ph": 6.5}}),
    ] {
        store
            .create("Journal", json!({"journalType": "log", "journalValue": value, "environmentId": 1}))
            .await
            .unwrap();
    }
    store
}

async fn matching(store: &common::Store, filter: Value) -> Vec<i64> {
    store.ids("Journal", json!({"where": filter})).await
}

#[tokio::test]
async fn json_paths_use_typed_equality() {
    let store = journals().await;
    assert_eq!(matching(&store, json!({"journalValue.amount": 5})).await, vec![1]);
    assert_eq!(matching(&store, json!({"journalValue.amount": "5"})).await, vec![2]);
    assert_eq!(matching(&store, json!({"journalValue.done": true})).await, vec![3]);
    assert!(matching(&store, json!({"journalValue.done": false})).await.is_empty());
    assert_eq!(matching(&store, json!({"journalValue.nested.ph": 6.5})).await, vec![5]);
    assert_eq!(
        matching(&store, json!({"journalValue.amount": {"$neq": 5}})).await,
        vec![2, 3, 4, 5]
    );
    assert_eq!(matching(&store, json!({"journalValue.unit": {"$like": "m%"}})).await, vec![1]);
}

#[tokio::test]
async fn json_arrays_and_objects_compare_whole() {
    let store = journals().await;
    assert_eq!(matching(&store, json!({"journalValue.tags": ["a", "b"]})).await, vec![4]);
    assert!(matching(&store, json!({"journalValue.tags": ["b", "a"]})).await.is_empty());
    assert_eq!(matching(&store, json!({"journalValue": {"done": true}})).await, vec![3]);
}

#[tokio::test]
async fn json_key_presence() {
    let store = journals().await;
    assert_eq!(matching(&store, json!({"journalValue": {"$has": "amount"}})).await, vec![1, 2]);
    assert_eq!(matching(&store, json!({"journalValue": {"$nhas": "amount"}})).await, vec![3, 4, 5]);
    assert_eq!(matching(&store, json!({"journalValue.nested": {"$has": "ph"}})).await, vec![5]);
}

async fn families() -> common::Store {
    let store = common::store().await;
    for name in ["Haze", "Kush", "Diesel", "Skunk"] {
        store.create("Family", json!({"familyName": name})).await.unwrap();
    }
    store
}

async fn named(store: &common::Store, filter: Value) -> Vec<i64> {
    store.ids("Family", json!({"where": filter})).await
}

#[tokio::test]
async fn or_groups_widen_the_match() {
    let store = families().await;
    assert_eq!(
        named(&store, json!({"familyName": "Haze", "$or": {"familyName": "Diesel"}})).await,
        vec![1, 3]
    );
    assert_eq!(
        named(&store, json!({"$or": [{"familyName": "Kush"}, {"familyId": 4}]})).await,
        vec![2, 4]
    );
    assert_eq!(
        named(&store, json!({"familyName": {"$eq": "Haze", "$or": {"$eq": "Skunk"}}})).await,
        vec![1, 4]
    );
}

#[tokio::test]
async fn column_operators() {
    let store = families().await;
    assert_eq!(named(&store, json!({"familyName": {"$in": ["Kush", "Skunk"]}})).await, vec![2, 4]);
    assert_eq!(named(&store, json!({"familyName": {"$like": "%s%"}})).await, vec![2, 3, 4]);
    assert_eq!(named(&store, json!({"familyName": {"$neq": "Haze"}})).await, vec![2, 3, 4]);
    assert_eq!(named(&store, json!({"familyDescription": ""})).await, vec![1, 2, 3, 4]);
    assert!(named(&store, json!({"familyDescription": null})).await.is_empty());
}
