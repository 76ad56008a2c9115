mod common;

use common::{user_config, user_service, FailingStore, InMemoryStore};
use serde_json::{json, Value};
use std::sync::Arc;

use crudguard_core::errors::ExErrorKind;
use crudguard_core::policy::{AccessPolicy, MustMatchValue};
use crudguard_core::query::{CrudQueryDescriptor, QueryInput, SelectSpec};
use crudguard_core::{inject_predicate, DisconnectPolicy, EntityConfig, PaginationSettings, RelationSchema};
use async_trait::async_trait;
use crudguard_core::errors::Result;
use crudguard_core::mutation::WriteData;
use crudguard_core::query::WhereNode;
use crudguard_engine::{CrudMethodOpts, CrudService, FindArgs, PersistenceClient, RecordKey};

fn seeded() -> (Arc<InMemoryStore>, CrudService, i64) {
    let store = InMemoryStore::new();
    let nl = store.insert_country("NL");
    let alice = store.insert_user(json!({
        "name": "alice",
        "email": "a@example.com",
        "password": "hunter2",
        "tenantId": 1,
        "countryId": nl
    }));
    store.insert_post("first", Some(alice));
    store.insert_post("second", Some(alice));
    let service = user_service(store.clone());
    (store, service, alice)
}

fn query(raw: &str) -> CrudMethodOpts {
    CrudMethodOpts::new().with_query(raw)
}

// ===== Joins =====

#[tokio::test]
async fn test_join_outside_allowlist_rejected_before_store_call() {
    let store = InMemoryStore::new();
    let config = EntityConfig::new("user")
        .with_allowed_joins(["posts", "posts.comments"])
        .with_relation("posts", RelationSchema::to_many());
    let service = CrudService::new(&config, store.clone()).unwrap();

    let err = service
        .find_many(&query(r#"{"joins": ["posts.comments.post"]}"#))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Forbidden);
    assert_eq!(err.path(), Some("posts.comments.post"));
    assert_eq!(store.reads(), 0);
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_default_joins_apply_when_request_names_none() {
    let (_store, service, alice) = seeded();

    let user = service.find_one(&json!(alice), &CrudMethodOpts::new()).await.unwrap();

    assert_eq!(user["country"]["name"], json!("NL"));
    assert!(user.get("posts").is_none());
}

#[tokio::test]
async fn test_requested_joins_replace_defaults() {
    let (_store, service, alice) = seeded();

    let user = service
        .find_one(&json!(alice), &query(r#"{"joins": ["posts"]}"#))
        .await
        .unwrap();

    assert_eq!(user["posts"].as_array().map(Vec::len), Some(2));
    assert!(user.get("country").is_none());
}

#[tokio::test]
async fn test_filter_through_unlisted_relation_is_forbidden() {
    let (store, service, _) = seeded();

    let err = service
        .find_many(&query(r#"{"where": {"posts": {"some": {"comments": {"some": {"body": "x"}}}}}}"#))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Forbidden);
    assert_eq!(store.reads(), 0);
}

// ===== Pagination =====

#[tokio::test]
async fn test_page_size_clamped_and_page_count_reported() {
    let store = InMemoryStore::new();
    for i in 0..7 {
        store.insert_user(json!({"name": format!("u{}", i)}));
    }
    let config = user_config().with_pagination(PaginationSettings {
        default_page_size: 2,
        max_page_size: 3,
        default_order_by: None,
    });
    let service = CrudService::new(&config, store).unwrap();

    let page = service
        .find_many(&query(r#"{"page": 3, "pageSize": 50}"#))
        .await
        .unwrap();

    assert_eq!(page.page_size, 3);
    assert_eq!(page.page, 3);
    assert_eq!(page.total_records, 7);
    assert_eq!(page.page_count, 3);
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0]["name"], json!("u6"));
    assert_eq!(page.order_by, json!([{"id": "asc"}]));
}

#[tokio::test]
async fn test_unusable_page_values_fall_back_to_defaults() {
    let (_store, service, _) = seeded();

    let page = service
        .find_many(&query(r#"{"page": -2, "pageSize": "abc"}"#))
        .await
        .unwrap();

    assert_eq!(page.page, 1);
    assert_eq!(page.page_size, 25);
}

#[tokio::test]
async fn test_empty_result_has_zero_page_count() {
    let (_store, service, _) = seeded();

    let page = service
        .find_many(&query(r#"{"where": {"name": "nobody"}}"#))
        .await
        .unwrap();

    assert_eq!(page.total_records, 0);
    assert_eq!(page.page_count, 0);
    assert!(page.data.is_empty());
}

#[tokio::test]
async fn test_client_order_by_sorts_rows() {
    let store = InMemoryStore::new();
    for name in ["b", "c", "a"] {
        store.insert_user(json!({"name": name}));
    }
    let service = user_service(store);

    let page = service
        .find_many(&query(r#"{"orderBy": [{"name": "desc"}]}"#))
        .await
        .unwrap();

    let names: Vec<&Value> = page.data.iter().map(|u| &u["name"]).collect();
    assert_eq!(names, vec![&json!("c"), &json!("b"), &json!("a")]);
    assert_eq!(page.order_by, json!([{"name": "desc"}]));
}

#[tokio::test]
async fn test_bad_sort_direction_is_validation_error() {
    let (_store, service, _) = seeded();

    let err = service
        .find_many(&query(r#"{"orderBy": [{"name": "up"}]}"#))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Validation);
}

// ===== Redaction =====

#[tokio::test]
async fn test_forbidden_field_never_returned() {
    let (_store, service, alice) = seeded();

    let user = service
        .find_one(
            &json!(alice),
            &CrudMethodOpts::new()
                .with_query(CrudQueryDescriptor::default().with_select(SelectSpec::only(["name", "password"]))),
        )
        .await
        .unwrap();

    assert_eq!(user, json!({"id": alice, "name": "alice"}));
}

#[tokio::test]
async fn test_forbidden_fields_returned_when_caller_opts_out() {
    let (_store, service, alice) = seeded();

    let user = service
        .find_one(&json!(alice), &CrudMethodOpts::new().including_forbidden_paths())
        .await
        .unwrap();

    assert_eq!(user["password"], json!("hunter2"));
}

#[tokio::test]
async fn test_find_many_redacts_every_row() {
    let (store, service, _) = seeded();
    store.insert_user(json!({"name": "bob", "password": "pw"}));

    let page = service.find_many(&CrudMethodOpts::new()).await.unwrap();

    assert_eq!(page.data.len(), 2);
    assert!(page.data.iter().all(|u| u.get("password").is_none()));
}

// ===== Policy scoping =====

#[tokio::test]
async fn test_policy_hides_record_from_update_without_writing() {
    let (store, service, alice) = seeded();
    let scoped = MustMatchValue::new("tenantId", json!(2))
        .scope(QueryInput::Absent)
        .unwrap();

    let err = service
        .update(
            &json!(alice),
            &json!({"name": "mallory"}),
            &CrudMethodOpts::new().with_query(scoped),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::NotFound);
    assert_eq!(store.writes(), 0);
    assert_eq!(store.user_row(alice).unwrap()["name"], json!("alice"));
}

#[tokio::test]
async fn test_policy_cannot_be_widened_by_client_or() {
    let (store, service, _) = seeded();
    store.insert_user(json!({"name": "bob", "tenantId": 2}));
    let scoped = inject_predicate(
        QueryInput::from(r#"{"where": {"OR": [{"tenantId": 1}, {"tenantId": 2}]}}"#),
        json!({"tenantId": 2}),
    )
    .unwrap();

    let page = service
        .find_many(&CrudMethodOpts::new().with_query(scoped))
        .await
        .unwrap();

    assert_eq!(page.total_records, 1);
    assert_eq!(page.data[0]["name"], json!("bob"));
}

#[tokio::test]
async fn test_policy_scoped_remove_of_visible_record() {
    let (store, service, alice) = seeded();
    let scoped = MustMatchValue::new("tenantId", json!(1))
        .scope(QueryInput::Absent)
        .unwrap();

    service
        .remove(&json!(alice), &CrudMethodOpts::new().with_query(scoped))
        .await
        .unwrap();

    assert!(store.user_row(alice).is_none());
}

// ===== Mutations =====

#[tokio::test]
async fn test_create_with_new_post_and_existing_country() {
    let store = InMemoryStore::new();
    let nl = store.insert_country("NL");
    let service = user_service(store.clone());

    let user = service
        .create(
            &json!({
                "name": "carol",
                "posts": [{"title": "a"}],
                "country": {"id": nl, "name": "ignored"}
            }),
            &query(r#"{"joins": ["posts", "country"]}"#),
        )
        .await
        .unwrap();

    assert_eq!(user["name"], json!("carol"));
    assert_eq!(user["country"], json!({"id": nl, "name": "NL"}));
    let posts = user["posts"].as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["title"], json!("a"));
}

#[tokio::test]
async fn test_create_with_forbidden_relation_writes_nothing() {
    let store = InMemoryStore::new();
    let service = user_service(store.clone());

    let err = service
        .create(&json!({"name": "x", "groups": [{"id": 1}]}), &CrudMethodOpts::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Forbidden);
    assert_eq!(store.writes(), 0);
    assert_eq!(store.user_count(), 0);
}

#[tokio::test]
async fn test_create_strips_client_supplied_id() {
    let store = InMemoryStore::new();
    let service = user_service(store.clone());

    let user = service
        .create(&json!({"id": 999, "name": "dave"}), &CrudMethodOpts::new())
        .await
        .unwrap();

    assert_ne!(user["id"], json!(999));
    assert!(store.user_row(999).is_none());
}

#[tokio::test]
async fn test_update_replaces_to_many_set() {
    let (store, service, alice) = seeded();
    let before = store.post_ids_of(alice);
    let loose = store.insert_post("loose", None);

    let user = service
        .update(
            &json!(alice),
            &json!({"posts": [{"id": before[0]}, {"id": loose}, {"title": "fresh"}]}),
            &query(r#"{"joins": ["posts"]}"#),
        )
        .await
        .unwrap();

    let after = store.post_ids_of(alice);
    assert_eq!(after.len(), 3);
    assert!(after.contains(&before[0]));
    assert!(after.contains(&loose));
    assert!(!after.contains(&before[1]));
    // default policy unlinks rather than deletes
    assert!(store.post_exists(before[1]));
    assert_eq!(user["posts"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn test_omitted_relation_untouched_and_empty_list_unlinks_all() {
    let (store, service, alice) = seeded();
    let before = store.post_ids_of(alice);
    let opts = CrudMethodOpts::new();

    service.update(&json!(alice), &json!({"name": "al"}), &opts).await.unwrap();
    assert_eq!(store.post_ids_of(alice), before);

    service.update(&json!(alice), &json!({"posts": []}), &opts).await.unwrap();
    assert!(store.post_ids_of(alice).is_empty());
    assert!(before.iter().all(|id| store.post_exists(*id)));
}

#[tokio::test]
async fn test_update_with_delete_policy_removes_dropped_members() {
    let store = InMemoryStore::new();
    let alice = store.insert_user(json!({"name": "alice"}));
    let keep = store.insert_post("keep", Some(alice));
    let drop = store.insert_post("drop", Some(alice));
    let config = EntityConfig::new("user")
        .with_allowed_joins(["posts"])
        .with_scalars(["name"])
        .with_relation(
            "posts",
            RelationSchema::to_many().with_on_disconnect(DisconnectPolicy::Delete),
        );
    let service = CrudService::new(&config, store.clone()).unwrap();

    service
        .update(&json!(alice), &json!({"posts": [{"id": keep}]}), &CrudMethodOpts::new())
        .await
        .unwrap();

    assert_eq!(store.post_ids_of(alice), vec![keep]);
    assert!(!store.post_exists(drop));
}

#[tokio::test]
async fn test_update_disconnects_to_one_on_null() {
    let (store, service, alice) = seeded();

    let user = service
        .update(&json!(alice), &json!({"country": null}), &CrudMethodOpts::new())
        .await
        .unwrap();

    assert_eq!(user["country"], Value::Null);
    assert_eq!(store.user_row(alice).unwrap()["countryId"], Value::Null);
}

#[tokio::test]
async fn test_update_ignores_payload_id() {
    let (store, service, alice) = seeded();
    let bob = store.insert_user(json!({"name": "bob"}));

    service
        .update(&json!(alice), &json!({"id": bob, "name": "alicia"}), &CrudMethodOpts::new())
        .await
        .unwrap();

    assert_eq!(store.user_row(alice).unwrap()["name"], json!("alicia"));
    assert_eq!(store.user_row(bob).unwrap()["name"], json!("bob"));
}

#[tokio::test]
async fn test_update_null_to_many_is_validation_error() {
    let (store, service, alice) = seeded();

    let err = service
        .update(&json!(alice), &json!({"posts": null}), &CrudMethodOpts::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Validation);
    assert_eq!(store.reads(), 0);
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_update_of_missing_record_is_not_found() {
    let (store, service, _) = seeded();

    let err = service
        .update(&json!(424242), &json!({"name": "x"}), &CrudMethodOpts::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::NotFound);
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_removed_record_is_no_longer_found() {
    let (_store, service, alice) = seeded();
    let opts = CrudMethodOpts::new();

    service.remove(&json!(alice), &opts).await.unwrap();

    let err = service.find_one(&json!(alice), &opts).await.unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotFound);
    let err = service.remove(&json!(alice), &opts).await.unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotFound);
}

// ===== Store plumbing =====

#[tokio::test]
async fn test_transaction_client_receives_every_call() {
    let (default_store, service, _) = seeded();
    let tx = InMemoryStore::new();
    let tx_user = tx.insert_user(json!({"name": "in-tx"}));
    let opts = CrudMethodOpts::new().with_transaction(tx.clone());

    let user = service.find_one(&json!(tx_user), &opts).await.unwrap();
    service.update(&json!(tx_user), &json!({"name": "renamed"}), &opts).await.unwrap();

    assert_eq!(user["name"], json!("in-tx"));
    assert_eq!(tx.user_row(tx_user).unwrap()["name"], json!("renamed"));
    assert_eq!(default_store.reads(), 0);
    assert_eq!(default_store.writes(), 0);
}

#[tokio::test]
async fn test_store_failure_is_opaque_internal_error() {
    let service = CrudService::new(&user_config(), Arc::new(FailingStore)).unwrap();

    let err = service.find_many(&CrudMethodOpts::new()).await.unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Internal);
    assert_eq!(err.op(), Some("find_many"));
    assert_eq!(err.model(), Some("user"));
    assert!(err.message().contains("store operation failed"));
    assert!(!err.to_string().contains("secret-host"));
}

/// Accepts a create but hands back a record without its id
struct IdlessCreateStore;

#[async_trait]
impl PersistenceClient for IdlessCreateStore {
    async fn create(&self, _model: &str, _data: WriteData) -> Result<Value> {
        Ok(json!({"name": "no-id"}))
    }

    async fn find_first(&self, _model: &str, _args: FindArgs) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn find_many(&self, _model: &str, _args: FindArgs) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn count(&self, _model: &str, _filter: &WhereNode) -> Result<u64> {
        Ok(0)
    }

    async fn update(&self, _model: &str, _key: &RecordKey, _data: WriteData) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn delete(&self, _model: &str, _key: &RecordKey) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_created_record_without_id_is_internal_error() {
    let service = CrudService::new(&user_config(), Arc::new(IdlessCreateStore)).unwrap();

    let err = service
        .create(&json!({"name": "x"}), &CrudMethodOpts::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Internal);
    assert_eq!(err.code(), "ERR_INTERNAL");
    assert!(err.message().contains("without its id field"));
}

#[tokio::test]
async fn test_validation_runs_before_failing_store() {
    let service = CrudService::new(&user_config(), Arc::new(FailingStore)).unwrap();

    let err = service
        .create(&json!({"name": "x", "shoeSize": 44}), &CrudMethodOpts::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Validation);
}

#[tokio::test]
async fn test_malformed_descriptor_is_validation_error() {
    let (store, service, _) = seeded();

    let err = service.find_many(&query("{not json")).await.unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Validation);
    assert_eq!(store.reads(), 0);
}

#[test]
fn test_bad_config_rejected_at_construction() {
    let config = user_config().with_default_joins(["posts.comments"]);
    let err = CrudService::new(&config, InMemoryStore::new()).err().unwrap();
    assert_eq!(err.kind(), ExErrorKind::Configuration);
}
