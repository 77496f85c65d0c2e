//! Catalog listing integration tests.

use super::get_test_client;
use dman::db::DatabaseClient;

#[tokio::test]
async fn test_list_databases_excludes_templates() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let databases = client.list_databases().await.unwrap();

    assert!(!databases.is_empty());
    assert!(databases
        .iter()
        .all(|db| db.name != "template0" && db.name != "template1"));
    assert!(databases.iter().all(|db| !db.owner.is_empty()));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_list_schemas_excludes_system_schemas() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let schemas = client.list_schemas().await.unwrap();
    let names: Vec<&str> = schemas.iter().map(|s| s.name.as_str()).collect();

    assert!(names.contains(&"public"));
    for hidden in ["pg_catalog", "information_schema", "pg_toast"] {
        assert!(!names.contains(&hidden), "{hidden} should be excluded");
    }

    client.close().await.unwrap();
}
