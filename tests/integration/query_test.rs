//! Batch execution integration tests against PostgreSQL.
//!
//! Each test works in its own table so tests can run in parallel.

use super::get_test_client;
use dman::batch::{BatchOptions, ErrorKind, ExecutionOutcome, SplitMode};
use dman::db::{DatabaseClient, PostgresClient, Value};
use dman::error::DmanError;
use std::time::Duration;

fn without_timing() -> BatchOptions {
    BatchOptions::default().with_timing(false)
}

async fn create_table(client: &PostgresClient, table: &str) {
    client
        .execute_batch(
            &format!(
                "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} (id SERIAL PRIMARY KEY, name TEXT NOT NULL)"
            ),
            &without_timing(),
        )
        .await
        .unwrap();
}

async fn drop_table(client: &PostgresClient, table: &str) {
    client
        .execute_batch(&format!("DROP TABLE IF EXISTS {table}"), &without_timing())
        .await
        .unwrap();
}

async fn count_rows(client: &PostgresClient, table: &str) -> Value {
    let outcome = client
        .execute_batch(&format!("SELECT count(*) AS n FROM {table}"), &without_timing())
        .await
        .unwrap();
    outcome.rows[0][0].clone()
}

#[tokio::test]
async fn test_simple_select() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let outcome = client
        .execute_batch("SELECT 1 AS num, 'hello' AS greeting", &without_timing())
        .await
        .unwrap();

    assert_eq!(outcome.columns, vec!["num", "greeting"]);
    assert_eq!(
        outcome.rows,
        vec![vec![Value::Int(1), Value::Text("hello".to_string())]]
    );
    assert_eq!(outcome.affected_rows, 1);
    assert_eq!(outcome.error, None);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_insert_insert_select_overwrites_count() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let table = "dman_it_overwrite";
    create_table(&client, table).await;

    let outcome = client
        .execute_batch(
            &format!(
                "INSERT INTO {table} (name) VALUES ('a'), ('b'); \
                 INSERT INTO {table} (name) VALUES ('c'); \
                 SELECT name FROM {table} WHERE name <> 'c' ORDER BY name"
            ),
            &without_timing(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.columns, vec!["name"]);
    assert_eq!(
        outcome.rows,
        vec![vec![Value::from("a")], vec![Value::from("b")]]
    );
    assert_eq!(outcome.affected_rows, 2);

    drop_table(&client, table).await;
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_mutations_only_sum_affected_rows() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let table = "dman_it_mutations";
    create_table(&client, table).await;

    let outcome = client
        .execute_batch(
            &format!(
                "INSERT INTO {table} (name) VALUES ('a'), ('b'), ('c'); \
                 UPDATE {table} SET name = upper(name) WHERE name <> 'a'"
            ),
            &without_timing(),
        )
        .await
        .unwrap();

    assert!(outcome.columns.is_empty());
    assert!(outcome.rows.is_empty());
    assert_eq!(outcome.affected_rows, 5);

    drop_table(&client, table).await;
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_failure_rolls_back_earlier_statements() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let table = "dman_it_rollback";
    create_table(&client, table).await;

    let result = client
        .execute_batch(
            &format!("INSERT INTO {table} (name) VALUES ('kept?'); SELECT 1/0"),
            &without_timing(),
        )
        .await;

    let error = result.unwrap_err();
    assert!(matches!(error, DmanError::Query(_)));
    assert_eq!(error.message(), "division by zero");

    let outcome = ExecutionOutcome::failed(&error);
    assert_eq!(outcome.error_kind, Some(ErrorKind::Execution));
    assert!(outcome.columns.is_empty() && outcome.rows.is_empty());
    assert_eq!(outcome.affected_rows, 0);

    assert_eq!(count_rows(&client, table).await, Value::Int(0));

    drop_table(&client, table).await;
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_constraint_violation_message_passes_through() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let table = "dman_it_constraint";
    create_table(&client, table).await;

    let error = client
        .execute_batch(
            &format!("INSERT INTO {table} (id, name) VALUES (1, 'a'), (1, 'b')"),
            &without_timing(),
        )
        .await
        .unwrap_err();

    assert!(error
        .message()
        .starts_with("duplicate key value violates unique constraint"));
    assert!(error.message().contains("\n  DETAIL: Key (id)=(1) already exists."));
    assert_eq!(count_rows(&client, table).await, Value::Int(0));

    drop_table(&client, table).await;
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_empty_batch() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let outcome = client
        .execute_batch("  ;  ", &BatchOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, ExecutionOutcome::new());

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_empty_result_keeps_column_names() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let outcome = client
        .execute_batch(
            "SELECT 1 AS a, 'x' AS b WHERE false",
            &without_timing(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.columns, vec!["a", "b"]);
    assert!(outcome.rows.is_empty());
    assert_eq!(outcome.affected_rows, 0);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_timing_reports_execution_time_without_double_effects() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let table = "dman_it_timing";
    create_table(&client, table).await;

    // The probe of a writable CTE runs inside a rolled-back savepoint.
    let outcome = client
        .execute_batch(
            &format!(
                "WITH ins AS (INSERT INTO {table} (name) VALUES ('once') RETURNING name) \
                 SELECT name FROM ins"
            ),
            &BatchOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.rows, vec![vec![Value::from("once")]]);
    let elapsed = outcome.execution_time_ms.expect("timed statement");
    assert!(elapsed >= 0.0);
    assert_eq!(count_rows(&client, table).await, Value::Int(1));

    drop_table(&client, table).await;
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_lexical_mode_handles_dollar_quotes() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let options = without_timing().with_split_mode(SplitMode::Lexical);
    let outcome = client
        .execute_batch(
            "SELECT $$a;b$$ AS body, 'c;d' AS quoted; -- done",
            &options,
        )
        .await
        .unwrap();

    assert_eq!(
        outcome.rows,
        vec![vec![Value::from("a;b"), Value::from("c;d")]]
    );

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_timeout_cancels_batch() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let options = without_timing().with_timeout(Some(Duration::from_millis(200)));
    let error = client
        .execute_batch("SELECT pg_sleep(5)", &options)
        .await
        .unwrap_err();

    assert!(matches!(error, DmanError::Query(_)));
    assert!(error.message().contains("timed out"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_deferred_constraint_fails_at_commit() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let table = "dman_it_deferred";
    client
        .execute_batch(
            &format!(
                "DROP TABLE IF EXISTS {table}; \
                 CREATE TABLE {table} (id INT UNIQUE DEFERRABLE INITIALLY DEFERRED)"
            ),
            &without_timing(),
        )
        .await
        .unwrap();

    // Both inserts succeed; the unique check only runs at COMMIT.
    let error = client
        .execute_batch(
            &format!("INSERT INTO {table} VALUES (1); INSERT INTO {table} VALUES (1)"),
            &without_timing(),
        )
        .await
        .unwrap_err();

    assert!(matches!(error, DmanError::Commit(_)));
    assert!(error.message().starts_with("duplicate key value"));
    assert_eq!(
        ExecutionOutcome::failed(&error).error_kind,
        Some(ErrorKind::Commit)
    );
    assert_eq!(count_rows(&client, table).await, Value::Int(0));

    drop_table(&client, table).await;
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_read_only_batch_is_repeatable() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let table = "dman_it_repeatable";
    create_table(&client, table).await;
    client
        .execute_batch(
            &format!("INSERT INTO {table} (name) VALUES ('a'), ('b')"),
            &without_timing(),
        )
        .await
        .unwrap();

    let sql = format!(
        "SELECT count(*) AS n FROM {table}; SELECT id, name FROM {table} ORDER BY id"
    );
    let first = client
        .execute_batch(&sql, &BatchOptions::default())
        .await
        .unwrap();
    let second = client
        .execute_batch(&sql, &BatchOptions::default())
        .await
        .unwrap();

    assert_eq!(first.columns, vec!["id", "name"]);
    assert_eq!(first.columns, second.columns);
    assert_eq!(first.rows, second.rows);
    assert_eq!(first.affected_rows, second.affected_rows);
    assert_eq!(count_rows(&client, table).await, Value::Int(2));

    drop_table(&client, table).await;
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_non_finite_floats_are_not_null_in_json() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let outcome = client
        .execute_batch(
            "SELECT 'NaN'::float8 AS nan, '-Infinity'::float8 AS neg, NULL::float8 AS missing",
            &without_timing(),
        )
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&outcome.rows).unwrap(),
        serde_json::json!([["NaN", "-Infinity", null]])
    );

    client.close().await.unwrap();
}
