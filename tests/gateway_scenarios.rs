//! End-to-End Gateway Scenarios
//!
//! Drives the services the way the CLI does, against a spy adapter and an in-memory
//! catalog. Nothing here touches a real database or LLM provider.

mod common;

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{
    gateway_with, seed_connection, BalanceExhaustedEnricher, ScriptedGenerator, SpyAdapter, StaticEnricher,
    SALES_URL,
};
use sqlgate::{Catalog, EngineAdapter, MemoryCatalog};

// ============================================================================
// Query execution
// ============================================================================

#[tokio::test]
async fn test_delete_is_rejected_without_touching_the_adapter() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);
    seed_connection(&catalog, "sales", SALES_URL).await;

    let err = gateway.queries().execute(&catalog, "sales", "DELETE FROM orders").await.unwrap_err();

    assert_eq!(err.error_code(), "DISALLOWED_STATEMENT");
    assert!(err.is_validation_error());
    assert_eq!(spy.total_calls(), 0);
}

#[tokio::test]
async fn test_select_is_bounded_and_returned_unchanged() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);
    seed_connection(&catalog, "sales", SALES_URL).await;

    let result = gateway.queries().execute(&catalog, "sales", "SELECT * FROM orders").await.unwrap();

    assert_eq!(result.row_count, 3);
    assert_eq!(result.columns.len(), 2);
    assert!(result.rows.iter().all(|row| row.len() == 2));
    assert_eq!(result, common::three_orders());

    let executed = spy.executed_sql();
    assert_eq!(executed.len(), 1);
    assert!(executed[0].contains("LIMIT 1000"), "executed: {}", executed[0]);
}

#[tokio::test]
async fn test_existing_limit_is_kept() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);
    seed_connection(&catalog, "sales", SALES_URL).await;

    gateway
        .queries()
        .execute(&catalog, "sales", "select id from orders limit 5")
        .await
        .unwrap();

    assert_eq!(spy.executed_sql(), vec!["select id from orders limit 5".to_string()]);
}

#[tokio::test]
async fn test_explicit_limit_override() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);
    seed_connection(&catalog, "sales", SALES_URL).await;

    gateway
        .queries()
        .execute_with_limit(&catalog, "sales", "SELECT id FROM orders", 25)
        .await
        .unwrap();

    assert_eq!(spy.executed_sql(), vec!["SELECT id FROM orders LIMIT 25".to_string()]);
}

#[tokio::test]
async fn test_unknown_connection() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);

    let err = gateway.queries().execute(&catalog, "nope", "SELECT 1").await.unwrap_err();

    assert_eq!(err.error_code(), "CONNECTION_NOT_FOUND");
    assert_eq!(err.message(), "Database connection 'nope' not found");
}

#[tokio::test]
async fn test_adapter_failure_surfaces_as_query_execution_error() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);
    seed_connection(&catalog, "sales", SALES_URL).await;

    let err = gateway
        .queries()
        .execute(&catalog, "sales", "SELECT * FROM missing_table")
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "QUERY_EXECUTION_ERROR");
    assert!(err.message().contains("missing_table"));
}

#[tokio::test]
async fn test_connection_with_unregistered_engine() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);
    seed_connection(&catalog, "shop", "mysql://root@localhost/shop").await;

    let err = gateway.queries().execute(&catalog, "shop", "SELECT 1").await.unwrap_err();

    assert_eq!(err.error_code(), "UNSUPPORTED_ENGINE");
    assert_eq!(spy.total_calls(), 0);
}

// ============================================================================
// Metadata refresh
// ============================================================================

#[tokio::test]
async fn test_refresh_falls_back_when_balance_is_exhausted() {
    let spy = Arc::new(SpyAdapter::new());
    let enricher = Arc::new(BalanceExhaustedEnricher::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog).with_enricher(enricher.clone());
    seed_connection(&catalog, "sales", SALES_URL).await;

    let stored = gateway.metadata().refresh(&catalog, "sales").await.unwrap();
    assert_eq!(enricher.calls.load(Ordering::SeqCst), 1);

    let expected = json!({
        "tables": [{
            "name": "public.orders",
            "type": "table",
            "columns": [
                {"name": "id", "type": "integer", "nullable": false, "default": null},
                {"name": "total", "type": "numeric", "nullable": true, "default": null}
            ]
        }]
    });
    assert_eq!(stored.metadata, expected);

    let fetched = gateway.metadata().get(&catalog, "sales").await.unwrap().unwrap();
    assert_eq!(fetched.metadata, expected);
    assert_eq!(fetched.connection_name, "sales");
}

#[tokio::test]
async fn test_refresh_without_llm_uses_fallback() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);
    seed_connection(&catalog, "sales", SALES_URL).await;

    let stored = gateway.metadata().refresh(&catalog, "sales").await.unwrap();

    assert_eq!(stored.metadata["tables"][0]["name"], "public.orders");
    assert_eq!(spy.metadata_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_refresh_stores_enriched_document() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let document = json!({"tables": [{"name": "public.orders", "description": "Customer orders"}]});
    let gateway = gateway_with(Arc::clone(&spy), &catalog)
        .with_enricher(Arc::new(StaticEnricher(document.clone())));
    seed_connection(&catalog, "sales", SALES_URL).await;

    let stored = gateway.metadata().refresh(&catalog, "sales").await.unwrap();

    assert_eq!(stored.metadata, document);
}

#[tokio::test]
async fn test_refresh_replaces_previous_metadata() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);
    seed_connection(&catalog, "sales", SALES_URL).await;
    catalog.put_metadata("sales", json!({"stale": true})).await.unwrap();

    gateway.metadata().refresh(&catalog, "sales").await.unwrap();

    let fetched = catalog.get_metadata("sales").await.unwrap().unwrap();
    assert!(fetched.metadata.get("stale").is_none());
    assert_eq!(fetched.metadata["tables"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_refresh_fails_when_schema_listing_fails() {
    let spy = Arc::new(SpyAdapter::failing_metadata());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog)
        .with_enricher(Arc::new(StaticEnricher(json!({"tables": []}))));
    seed_connection(&catalog, "sales", SALES_URL).await;

    let err = gateway.metadata().refresh(&catalog, "sales").await.unwrap_err();

    assert_eq!(err.error_code(), "ENGINE_ERROR");
    assert_eq!(spy.metadata_calls.load(Ordering::SeqCst), 1);
    assert!(catalog.get_metadata("sales").await.unwrap().is_none());
}

#[tokio::test]
async fn test_refresh_discards_metadata_of_connection_deleted_midway() {
    let catalog = MemoryCatalog::new();
    let spy = Arc::new(SpyAdapter::deleting_during_listing(&catalog, "sales"));
    let gateway = gateway_with(Arc::clone(&spy), &catalog);
    seed_connection(&catalog, "sales", SALES_URL).await;

    let err = gateway.metadata().refresh(&catalog, "sales").await.unwrap_err();

    assert_eq!(err.error_code(), "CONNECTION_NOT_FOUND");
    assert!(catalog.get_connection("sales").await.unwrap().is_none());
    assert!(catalog.get_metadata("sales").await.unwrap().is_none());
}

#[tokio::test]
async fn test_metadata_lookups() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);

    let err = gateway.metadata().require(&catalog, "sales").await.unwrap_err();
    assert_eq!(err.error_code(), "CONNECTION_NOT_FOUND");

    seed_connection(&catalog, "sales", SALES_URL).await;
    assert!(gateway.metadata().get(&catalog, "sales").await.unwrap().is_none());
    let err = gateway.metadata().require(&catalog, "sales").await.unwrap_err();
    assert_eq!(err.error_code(), "METADATA_NOT_FOUND");
    // get never refreshes implicitly
    assert_eq!(spy.total_calls(), 0);
}

// ============================================================================
// Connection management
// ============================================================================

#[tokio::test]
async fn test_save_schedules_background_refresh() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog)
        .with_enricher(Arc::new(BalanceExhaustedEnricher::new()));

    let (stored, refresh) = gateway.connections().save(&catalog, "sales", SALES_URL).await.unwrap();
    assert_eq!(stored.engine, "postgresql");
    assert_eq!(stored.url, SALES_URL);

    refresh.await.unwrap();

    assert_eq!(spy.connectivity_calls.load(Ordering::SeqCst), 1);
    assert_eq!(spy.metadata_calls.load(Ordering::SeqCst), 1);
    let metadata = catalog.get_metadata("sales").await.unwrap().unwrap();
    assert_eq!(metadata.metadata["tables"][0]["type"], "table");
}

#[tokio::test]
async fn test_failed_background_refresh_keeps_previous_metadata() {
    let spy = Arc::new(SpyAdapter::failing_metadata());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);
    seed_connection(&catalog, "sales", SALES_URL).await;
    catalog.put_metadata("sales", json!({"tables": [{"name": "public.orders"}]})).await.unwrap();

    let (_, refresh) = gateway.connections().save(&catalog, "sales", SALES_URL).await.unwrap();
    refresh.await.unwrap();

    assert_eq!(spy.metadata_calls.load(Ordering::SeqCst), 1);
    let kept = catalog.get_metadata("sales").await.unwrap().unwrap();
    assert_eq!(kept.metadata, json!({"tables": [{"name": "public.orders"}]}));
}

#[tokio::test]
async fn test_save_keeps_created_at_on_update() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);

    let (first, refresh) = gateway.connections().save(&catalog, "sales", SALES_URL).await.unwrap();
    refresh.await.unwrap();
    let (second, refresh) = gateway
        .connections()
        .save(&catalog, "sales", "postgres://u:p@db.internal/sales")
        .await
        .unwrap();
    refresh.await.unwrap();

    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.url, "postgres://u:p@db.internal/sales");
    assert_eq!(gateway.connections().list(&catalog).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_save_rejects_unknown_scheme_before_any_call() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);

    let err = gateway
        .connections()
        .save(&catalog, "local", "sqlite:///tmp/app.db")
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "UNSUPPORTED_ENGINE");
    assert_eq!(spy.total_calls(), 0);
    assert!(catalog.list_connections().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_save_rejects_unreachable_database() {
    let spy = Arc::new(SpyAdapter::unreachable());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);

    let err = gateway.connections().save(&catalog, "sales", SALES_URL).await.unwrap_err();

    assert_eq!(err.error_code(), "CONNECTION_FAILED");
    assert!(!err.message().contains(":p@"), "password leaked: {}", err.message());
    assert!(catalog.get_connection("sales").await.unwrap().is_none());
}

#[tokio::test]
async fn test_save_rejects_blank_name() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);

    let err = gateway.connections().save(&catalog, "  ", SALES_URL).await.unwrap_err();

    assert_eq!(err.error_code(), "INVALID_INPUT");
    assert_eq!(spy.total_calls(), 0);
}

#[tokio::test]
async fn test_delete_drops_metadata() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);
    seed_connection(&catalog, "sales", SALES_URL).await;
    gateway.metadata().refresh(&catalog, "sales").await.unwrap();

    assert!(gateway.connections().delete(&catalog, "sales").await.unwrap());
    assert!(catalog.get_metadata("sales").await.unwrap().is_none());
    assert!(!gateway.connections().delete(&catalog, "sales").await.unwrap());
}

#[tokio::test]
async fn test_tables_grouped_by_schema() {
    let mut spy = SpyAdapter::new();
    let mut audit = common::orders_table();
    audit.schema = "audit".to_string();
    audit.name = "events".to_string();
    audit.kind = sqlgate::TableKind::View;
    spy.tables.push(audit);
    let spy = Arc::new(spy);

    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);
    seed_connection(&catalog, "sales", SALES_URL).await;

    let grouped = gateway.connections().tables(&catalog, "sales", None).await.unwrap();
    assert_eq!(grouped.keys().cloned().collect::<Vec<_>>(), vec!["audit".to_string(), "public".to_string()]);
    assert_eq!(
        serde_json::to_value(&grouped["audit"]).unwrap(),
        json!([{"schema": "audit", "name": "events", "kind": "view"}])
    );

    let only_public = gateway.connections().tables(&catalog, "sales", Some("public")).await.unwrap();
    assert_eq!(only_public.len(), 1);
    assert_eq!(only_public["public"][0].name, "orders");
}

#[tokio::test]
async fn test_columns_drill_down() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);
    seed_connection(&catalog, "sales", SALES_URL).await;

    let columns = gateway.connections().columns(&catalog, "sales", "public", "orders").await.unwrap();
    assert_eq!(
        serde_json::to_value(&columns).unwrap(),
        json!([
            {"name": "id", "dataType": "integer", "nullable": false, "defaultExpr": null, "position": 1},
            {"name": "total", "dataType": "numeric", "nullable": true, "defaultExpr": null, "position": 2}
        ])
    );

    let missing = gateway.connections().columns(&catalog, "sales", "public", "nope").await.unwrap();
    assert!(missing.is_empty());
}

// ============================================================================
// Natural-language queries
// ============================================================================

#[tokio::test]
async fn test_ask_runs_generated_sql_through_the_pipeline() {
    let spy = Arc::new(SpyAdapter::new());
    let generator = Arc::new(ScriptedGenerator::new("SELECT id, total FROM orders"));
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog).with_generator(generator.clone());
    seed_connection(&catalog, "sales", SALES_URL).await;
    gateway.metadata().refresh(&catalog, "sales").await.unwrap();

    let answer = gateway.queries().ask(&catalog, "sales", "all orders").await.unwrap();

    assert_eq!(answer.sql, "SELECT id, total FROM orders LIMIT 1000");
    assert_eq!(answer.result.row_count, 3);
    assert_eq!(spy.executed_sql(), vec![answer.sql.clone()]);
    assert_eq!(
        generator.prompts.lock().clone(),
        vec![("all orders".to_string(), "postgresql".to_string())]
    );
}

#[tokio::test]
async fn test_ask_rejects_generated_writes() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog)
        .with_generator(Arc::new(ScriptedGenerator::new("DROP TABLE orders")));
    seed_connection(&catalog, "sales", SALES_URL).await;
    gateway.metadata().refresh(&catalog, "sales").await.unwrap();

    let err = gateway.queries().ask(&catalog, "sales", "clean up").await.unwrap_err();

    assert_eq!(err.error_code(), "DISALLOWED_STATEMENT");
    assert_eq!(spy.query_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_ask_requires_metadata() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog)
        .with_generator(Arc::new(ScriptedGenerator::new("SELECT 1")));
    seed_connection(&catalog, "sales", SALES_URL).await;

    let err = gateway.queries().ask(&catalog, "sales", "anything").await.unwrap_err();

    assert_eq!(err.error_code(), "METADATA_NOT_FOUND");
}

#[tokio::test]
async fn test_ask_without_llm() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);
    seed_connection(&catalog, "sales", SALES_URL).await;
    gateway.metadata().refresh(&catalog, "sales").await.unwrap();

    let err = gateway.queries().ask(&catalog, "sales", "anything").await.unwrap_err();

    assert_eq!(err.error_code(), "LLM_ERROR");
    assert_eq!(spy.query_calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn test_registry_hands_out_one_instance() {
    let spy = Arc::new(SpyAdapter::new());
    let catalog = MemoryCatalog::new();
    let gateway = gateway_with(Arc::clone(&spy), &catalog);

    let first = gateway.registry().resolve("postgresql").unwrap();
    let second = gateway.registry().resolve("POSTGRESQL").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.engine_id(), "postgresql");
}
