//! Deletion repository tests

use sqlx::SqlitePool;

use super::harness::*;
use crate::{
    db::{
        DbError,
        repos::{ChangeSetRepo, DeletionRepo, SchemaRepo},
        sqlite::{SqliteChangeSetRepo, SqliteDeletionRepo, SqliteSchemaRepo},
    },
    models::{DeleteOperation, KeyFilter, RawSql, TableJoin},
};

async fn setup() -> (SqlitePool, SqliteDeletionRepo) {
    let pool = create_sqlite_pool().await;
    run_sqlite_migrations(&pool).await;
    (pool.clone(), SqliteDeletionRepo::new(pool))
}

fn version_delete(record_id: i64, versions: Vec<i64>, joins: Vec<TableJoin>) -> DeleteOperation {
    DeleteOperation {
        table: "Ship_Versions".into(),
        filter: KeyFilter::Versions {
            record_id,
            versions,
        },
        joins,
    }
}

#[tokio::test]
async fn test_delete_versions_leaves_the_rest() {
    let (pool, repo) = setup().await;
    create_versions_table(&pool, "Ship_Versions").await;
    seed_ship_history(&pool, "Ship_Versions", 1, "Ship", &[]).await;

    let deleted = repo
        .execute_delete(&version_delete(1, vec![6, 10], vec![]))
        .await
        .unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(
        remaining_versions(&pool, "Ship_Versions", 1).await,
        vec![1, 2, 3, 4, 5, 7, 8, 9, 11, 12, 13, 14]
    );
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let (pool, repo) = setup().await;
    create_versions_table(&pool, "Ship_Versions").await;
    seed_ship_history(&pool, "Ship_Versions", 1, "Ship", &[]).await;

    let op = version_delete(1, vec![1, 2, 3], vec![]);
    assert_eq!(repo.execute_delete(&op).await.unwrap(), 3);
    assert_eq!(repo.execute_delete(&op).await.unwrap(), 0);
    assert_eq!(count_rows(&pool, "Ship_Versions").await, 11);
}

#[tokio::test]
async fn test_delete_only_touches_named_record() {
    let (pool, repo) = setup().await;
    create_versions_table(&pool, "Ship_Versions").await;
    seed_ship_history(&pool, "Ship_Versions", 1, "Ship", &[]).await;
    seed_ship_history(&pool, "Ship_Versions", 2, "Ship", &[]).await;

    repo.execute_delete(&version_delete(1, vec![1, 2], vec![]))
        .await
        .unwrap();
    assert_eq!(remaining_versions(&pool, "Ship_Versions", 2).await.len(), 14);
}

#[tokio::test]
async fn test_delete_joined_subclass_tables() {
    let (pool, repo) = setup().await;
    create_versions_table(&pool, "Ship_Versions").await;
    create_joined_table(&pool, "CargoShip_Versions", false).await;
    seed_ship_history(&pool, "Ship_Versions", 1, "CargoShip", &["CargoShip_Versions"]).await;

    let op = version_delete(
        1,
        vec![1, 2, 3],
        vec![TableJoin::on_version_key("CargoShip_Versions", "Ship_Versions")],
    );
    assert_eq!(repo.execute_delete(&op).await.unwrap(), 3);

    let expected: Vec<i64> = (4..=14).collect();
    assert_eq!(remaining_versions(&pool, "Ship_Versions", 1).await, expected);
    assert_eq!(
        remaining_versions(&pool, "CargoShip_Versions", 1).await,
        expected
    );
}

#[tokio::test]
async fn test_failed_base_delete_rolls_back_joined_tables() {
    let (pool, repo) = setup().await;
    create_versions_table(&pool, "Ship_Versions").await;
    create_joined_table(&pool, "CargoShip_Versions", false).await;
    seed_ship_history(&pool, "Ship_Versions", 1, "CargoShip", &["CargoShip_Versions"]).await;
    sqlx::query(
        r#"CREATE TRIGGER "Ship_Versions_locked" BEFORE DELETE ON "Ship_Versions"
           BEGIN SELECT RAISE(ABORT, 'Ship_Versions is locked'); END"#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let op = version_delete(
        1,
        vec![1, 2, 3],
        vec![TableJoin::on_version_key("CargoShip_Versions", "Ship_Versions")],
    );
    assert!(repo.execute_delete(&op).await.is_err());

    // The subclass rows went first and must be restored
    assert_eq!(count_rows(&pool, "CargoShip_Versions").await, 14);
    assert_eq!(count_rows(&pool, "Ship_Versions").await, 14);
}

#[tokio::test]
async fn test_delete_with_missing_joined_rows() {
    let (pool, repo) = setup().await;
    create_versions_table(&pool, "Ship_Versions").await;
    create_joined_table(&pool, "CargoShip_Versions", false).await;
    seed_ship_history(&pool, "Ship_Versions", 1, "Ship", &[]).await;

    // Left join: base rows go even when the joined table has no match.
    let op = version_delete(
        1,
        vec![1, 2],
        vec![TableJoin::on_version_key("CargoShip_Versions", "Ship_Versions")],
    );
    assert_eq!(repo.execute_delete(&op).await.unwrap(), 2);
}

#[tokio::test]
async fn test_delete_localised_rows() {
    let (pool, repo) = setup().await;
    create_versions_table(&pool, "Ship_Versions").await;
    create_joined_table(&pool, "Ship_Localised_Versions", true).await;
    for n in 1..=4 {
        insert_version(&pool, "Ship_Versions", 1, n, Some("Ship"), fixture_base(), false).await;
        insert_joined(&pool, "Ship_Localised_Versions", 1, n, Some("en_NZ")).await;
    }

    let op = version_delete(
        1,
        vec![1, 2],
        vec![TableJoin::on_version_key(
            "Ship_Localised_Versions",
            "Ship_Versions",
        )],
    );
    repo.execute_delete(&op).await.unwrap();
    assert_eq!(
        remaining_versions(&pool, "Ship_Localised_Versions", 1).await,
        vec![3, 4]
    );
}

async fn seed_change_sets(pool: &SqlitePool) {
    for sql in [
        r#"CREATE TABLE "ChangeSet" ("ID" INTEGER PRIMARY KEY, "LastEdited" TEXT NOT NULL)"#,
        r#"CREATE TABLE "ChangeSetItem" ("ID" INTEGER PRIMARY KEY, "ChangeSetID" INTEGER NOT NULL)"#,
        r#"CREATE TABLE "ChangeSetItem_ReferencedBy" ("ID" INTEGER PRIMARY KEY, "ChangeSetItemID" INTEGER NOT NULL)"#,
        r#"INSERT INTO "ChangeSet" VALUES (1, '2024-01-01 00:00:00'), (2, '2024-01-02 00:00:00'), (3, '2024-06-01 00:00:00')"#,
        r#"INSERT INTO "ChangeSetItem" VALUES (10, 1), (11, 1), (20, 2), (30, 3)"#,
        r#"INSERT INTO "ChangeSetItem_ReferencedBy" VALUES (100, 10), (101, 11), (200, 20), (300, 30)"#,
    ] {
        sqlx::query(sql).execute(pool).await.unwrap();
    }
}

fn change_set_delete(ids: Vec<i64>) -> DeleteOperation {
    DeleteOperation {
        table: "ChangeSet".into(),
        filter: KeyFilter::Ids {
            column: "ID".into(),
            ids,
        },
        joins: vec![
            TableJoin::on_foreign_key("ChangeSetItem", "ChangeSet", "ChangeSetID"),
            TableJoin::on_foreign_key(
                "ChangeSetItem_ReferencedBy",
                "ChangeSetItem",
                "ChangeSetItemID",
            ),
        ],
    }
}

#[tokio::test]
async fn test_change_set_cascade() {
    let (pool, repo) = setup().await;
    seed_change_sets(&pool).await;

    let deleted = repo.execute_delete(&change_set_delete(vec![1, 2])).await.unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(count_rows(&pool, "ChangeSet").await, 1);
    assert_eq!(count_rows(&pool, "ChangeSetItem").await, 1);
    assert_eq!(count_rows(&pool, "ChangeSetItem_ReferencedBy").await, 1);
}

#[tokio::test]
async fn test_expired_change_sets() {
    let (pool, _) = setup().await;
    seed_change_sets(&pool).await;
    let repo = SqliteChangeSetRepo::new(pool);

    let cutoff = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc();
    // Strictly before the cutoff.
    assert_eq!(repo.find_expired_ids("ChangeSet", cutoff, 10).await.unwrap(), vec![1]);

    let later = cutoff + chrono::Duration::days(365);
    assert_eq!(
        repo.find_expired_ids("ChangeSet", later, 2).await.unwrap(),
        vec![1, 2]
    );
}

#[tokio::test]
async fn test_invalid_join_rejected() {
    let (pool, repo) = setup().await;
    seed_change_sets(&pool).await;

    let mut op = change_set_delete(vec![1]);
    op.joins.reverse();
    let result = repo.execute_delete(&op).await;
    assert!(matches!(result, Err(DbError::Validation(_))));
    // Nothing deleted
    assert_eq!(count_rows(&pool, "ChangeSet").await, 3);
}

#[tokio::test]
async fn test_invalid_identifier_rejected() {
    let (_pool, repo) = setup().await;
    let op = DeleteOperation {
        table: "Ship\"; DROP TABLE x; --".into(),
        filter: KeyFilter::Ids {
            column: "ID".into(),
            ids: vec![1],
        },
        joins: vec![],
    };
    assert!(matches!(
        repo.execute_delete(&op).await,
        Err(DbError::Validation(_))
    ));
}

#[tokio::test]
async fn test_empty_filter_is_noop() {
    let (pool, repo) = setup().await;
    seed_change_sets(&pool).await;
    assert_eq!(repo.execute_delete(&change_set_delete(vec![])).await.unwrap(), 0);
    assert_eq!(count_rows(&pool, "ChangeSet").await, 3);
}

#[tokio::test]
async fn test_delete_row() {
    let (pool, repo) = setup().await;
    seed_change_sets(&pool).await;
    assert_eq!(repo.delete_row("ChangeSetItem", "ID", 10).await.unwrap(), 1);
    assert_eq!(repo.delete_row("ChangeSetItem", "ID", 10).await.unwrap(), 0);
    assert_eq!(count_rows(&pool, "ChangeSetItem").await, 3);
}

#[tokio::test]
async fn test_raw_drop_and_table_listing() {
    let (pool, repo) = setup().await;
    for table in ["_obsolete_Ship", "_obsolete_Page", "XobsoleteXShip", "Ship"] {
        sqlx::query(&format!("CREATE TABLE \"{table}\" (\"ID\" INTEGER)"))
            .execute(&pool)
            .await
            .unwrap();
    }

    let schema = SqliteSchemaRepo::new(pool.clone());
    let found = schema.list_tables_with_prefix("_obsolete_").await.unwrap();
    assert_eq!(found, vec!["_obsolete_Page", "_obsolete_Ship"]);

    repo.execute_raw(&RawSql {
        statement: "DROP TABLE IF EXISTS \"_obsolete_Ship\"".into(),
        target: "_obsolete_Ship".into(),
    })
    .await
    .unwrap();

    let found = schema.list_tables_with_prefix("_obsolete_").await.unwrap();
    assert_eq!(found, vec!["_obsolete_Page"]);
}
