//! End-to-end tests: TOML configuration to working SQLite pools

use std::path::Path;
use std::sync::Arc;

use dynds_config::{DataSourceProperty, DynamicDataSourceProperties};
use dynds_core::DsError;
use dynds_creator::{DataSourceCreator, PoolDataSourceCreator};
use dynds_pool::{StatFilter, WallFilter};
use indoc::formatdoc;
use pretty_assertions::assert_eq;

fn configuration(dir: &Path) -> DynamicDataSourceProperties {
    let source = formatdoc! {r#"
        primary = "master"

        [pool]
        filters = "stat, wall"
        max-active = 4
        max-wait = 2000
        validation-query = "SELECT 1"
        test-on-borrow = true

        [pool.stat]
        merge-sql = true

        [datasource.master]
        url = 'sqlite:{master}'
        lazy = false

        [datasource.master.pool]
        initial-size = 2
        [datasource.master.pool.wall]
        delete-where-none-check = true

        [datasource.report]
        url = 'jdbc:sqlite:{report}'
        driver-class-name = "sqlite"

        [datasource.report.pool]
        default-read-only = true
        "#,
        master = dir.join("master.db").display(),
        report = dir.join("report.db").display(),
    };
    DynamicDataSourceProperties::from_toml_str(&source).unwrap()
}

// =============================================================================
// create_all
// =============================================================================

#[tokio::test]
async fn test_create_all_builds_every_datasource() {
    let dir = tempfile::tempdir().unwrap();
    let properties = configuration(dir.path());
    let creator = PoolDataSourceCreator::from_properties(&properties);

    let pools = creator.create_all(&properties).await.unwrap();
    let names: Vec<_> = pools.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["master", "report"]);

    let master = &pools["master"];
    assert_eq!(master.name(), "master");
    assert!(master.is_initialized());
    assert_eq!(master.stats().idle(), 2);
    assert_eq!(master.config().max_active(), 4);
    assert_eq!(master.filters().names(), vec!["stat", "wall"]);

    let report = &pools["report"];
    assert!(!report.is_initialized());
    assert!(report.config().default_read_only());
}

#[tokio::test]
async fn test_filters_are_live_on_borrowed_connections() {
    let dir = tempfile::tempdir().unwrap();
    let properties = configuration(dir.path());
    let creator = PoolDataSourceCreator::from_properties(&properties);
    let pools = creator.create_all(&properties).await.unwrap();
    let master = &pools["master"];

    let conn = master.get_connection().await.unwrap();
    conn.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[])
        .await
        .unwrap();
    conn.execute("INSERT INTO users (name) VALUES ('a')", &[])
        .await
        .unwrap();
    conn.execute("INSERT INTO users (name) VALUES ('b')", &[])
        .await
        .unwrap();

    let err = conn.execute("DELETE FROM users", &[]).await.unwrap_err();
    assert!(matches!(err, DsError::SqlRejected { .. }));
    conn.execute("DELETE FROM users WHERE id = 1", &[])
        .await
        .unwrap();

    let stat = master.filters().find::<StatFilter>().unwrap();
    let insert = stat
        .sql_stat("INSERT INTO users (name) VALUES ('z')")
        .unwrap();
    assert_eq!(insert.execute_count, 2);
    assert!(stat.sql_stat("DELETE FROM users").is_none());

    let wall = master.filters().find::<WallFilter>().unwrap();
    assert_eq!(wall.violation_count(), 1);
}

#[tokio::test]
async fn test_read_only_datasource() {
    let dir = tempfile::tempdir().unwrap();
    let properties = configuration(dir.path());
    let creator = PoolDataSourceCreator::from_properties(&properties);
    let pools = creator.create_all(&properties).await.unwrap();

    let conn = pools["report"].get_connection().await.unwrap();
    conn.query("SELECT 1", &[]).await.unwrap();
    assert!(conn.execute("CREATE TABLE t (id INTEGER)", &[]).await.is_err());
}

// =============================================================================
// Eager and lazy initialization
// =============================================================================

#[tokio::test]
async fn test_eager_failure_is_wrapped() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("nope").join("x.db").display());
    let property = DataSourceProperty::new(url)
        .with_pool_name("broken")
        .with_lazy(false);

    let err = PoolDataSourceCreator::default()
        .create_data_source(&property)
        .await
        .unwrap_err();

    assert!(matches!(err, DsError::CreateDataSource { .. }));
    assert!(err.to_string().contains("broken"));
    assert!(matches!(err.root_cause(), DsError::Connection(_)));
}

#[tokio::test]
async fn test_lazy_defers_failure_to_first_borrow() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("nope").join("x.db").display());

    for lazy in [None, Some(true)] {
        let mut property = DataSourceProperty::new(url.clone());
        property.lazy = lazy;

        let ds: Arc<_> = PoolDataSourceCreator::default()
            .create_data_source(&property)
            .await
            .unwrap();
        assert!(!ds.is_initialized());
        assert!(matches!(
            ds.get_connection().await,
            Err(DsError::Connection(_))
        ));
    }
}

#[tokio::test]
async fn test_unknown_driver_fails_eager_creation() {
    let mut property = DataSourceProperty::new("sqlite::memory:").with_lazy(false);
    property.driver_class_name = Some("oracle".into());

    let err = PoolDataSourceCreator::default()
        .create_data_source(&property)
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), DsError::Driver(_)));
}

#[tokio::test]
async fn test_bad_entries_do_not_stop_creation() {
    let property = DataSourceProperty::new("sqlite::memory:")
        .with_pool_entry("max-active", "lots")
        .with_pool_entry("no-such-setting", true)
        .with_pool_entry("min-idle", 1)
        .with_lazy(false);

    let ds = PoolDataSourceCreator::default()
        .create_data_source(&property)
        .await
        .unwrap();
    assert_eq!(ds.config().max_active(), 8);
    assert_eq!(ds.config().min_idle(), 1);
}

#[tokio::test]
async fn test_unsupported_type_rejected() {
    let mut properties = DynamicDataSourceProperties::default();
    let mut property = DataSourceProperty::new("sqlite::memory:");
    property.pool_type = Some("hikari".into());
    properties.datasource.insert("master".into(), property);

    let err = PoolDataSourceCreator::default()
        .create_all(&properties)
        .await
        .unwrap_err();
    assert!(matches!(err, DsError::Configuration(_)));
}
