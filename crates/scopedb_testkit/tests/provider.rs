//! Query operations end to end: predicates, selects, bulk writes.

#![allow(deprecated)]

use scopedb_core::{Comparator, Config, CoreError, Database, Value};
use scopedb_engine::EngineError;
use scopedb_testkit::prelude::*;
use uuid::Uuid;

#[test]
fn can_connect() {
    let db = Database::open(Config::new().url(unique_memory_url())).unwrap();
    db.connect().unwrap();
    db.close().unwrap();
}

#[test]
fn can_create_table() {
    let db = Database::open(Config::new().url(unique_memory_url())).unwrap();
    db.create_table::<TestEntity>().unwrap();
    // creating an identical table again is harmless
    db.create_table::<TestEntity>().unwrap();
    assert_eq!(db.auto::<TestEntity>().unwrap().count().unwrap(), 0);
    db.close().unwrap();
}

#[test]
fn can_insert() {
    let db = TestDatabase::memory();
    let stored = db
        .auto::<TestEntity>()
        .unwrap()
        .insert(&TestEntity::new("t1"))
        .unwrap();
    assert_eq!(stored.id, Some(1));
    assert!(stored.uuid.is_some());
    assert!(stored.date_time.is_some());
    assert_eq!(stored.test.as_deref(), Some("t1"));
}

#[test]
fn can_select_count() {
    let db = TestDatabase::memory();
    db.begin_transaction().unwrap();
    db.query::<TestEntity>().unwrap().delete().unwrap();
    db.query::<TestEntity>()
        .unwrap()
        .insert(&TestEntity::new("t1"))
        .unwrap();
    assert_eq!(db.query::<TestEntity>().unwrap().select().unwrap().len(), 1);
    assert_eq!(
        db.query::<TestEntity>()
            .unwrap()
            .where_eq("test", "t1")
            .unwrap()
            .count()
            .unwrap(),
        1
    );
    db.close().unwrap();
}

#[test]
fn can_select_where() {
    let db = TestDatabase::memory();
    db.auto::<TestEntity>().unwrap().delete().unwrap();
    scenarios::insert_labels(&db, &["t1", "t2", "t2"]);

    assert_eq!(db.auto::<TestEntity>().unwrap().select().unwrap().len(), 3);
    let unique = db
        .auto::<TestEntity>()
        .unwrap()
        .where_eq("test", "t1")
        .unwrap()
        .select_unique()
        .unwrap();
    assert_eq!(unique.test.as_deref(), Some("t1"));
}

#[test]
fn can_update_where() {
    let db = TestDatabase::memory();
    let uid = Uuid::new_v4();
    let replacement = TestEntity::new("t2").with_uuid(uid);

    db.begin_transaction().unwrap();
    for label in ["t1", "t2", "t2", "t3"] {
        db.query::<TestEntity>()
            .unwrap()
            .insert(&TestEntity::new(label))
            .unwrap();
    }
    let updated = db
        .query::<TestEntity>()
        .unwrap()
        .where_eq("test", "t2")
        .unwrap()
        .update(&replacement, &[])
        .unwrap();
    assert_eq!(updated, 2);
    assert_eq!(
        db.query::<TestEntity>()
            .unwrap()
            .where_eq("test", "t2")
            .unwrap()
            .count()
            .unwrap(),
        2
    );
    db.commit_transaction().unwrap();

    let matching = db
        .auto::<TestEntity>()
        .unwrap()
        .where_eq("test", "t2")
        .unwrap()
        .select()
        .unwrap();
    assert_eq!(matching.iter().filter(|e| e.uuid == Some(uid)).count(), 2);
}

#[test]
fn can_delete_where() {
    let db = TestDatabase::memory();
    let transaction = db.transaction::<TestEntity>().unwrap();
    for label in ["t1", "t2", "t2", "t3"] {
        db.query::<TestEntity>()
            .unwrap()
            .insert(&TestEntity::new(label))
            .unwrap();
    }
    db.query::<TestEntity>()
        .unwrap()
        .where_eq("test", "t2")
        .unwrap()
        .delete()
        .unwrap();
    assert_eq!(
        db.query::<TestEntity>()
            .unwrap()
            .where_eq("test", "t2")
            .unwrap()
            .count()
            .unwrap(),
        0
    );
    assert_eq!(transaction.select().unwrap().len(), 2);
    transaction.close().unwrap();
    assert_eq!(db.auto::<TestEntity>().unwrap().count().unwrap(), 2);
}

#[test]
fn labelled_scenario_update_then_delete() {
    let db = TestDatabase::memory();
    let tx = db.transaction::<TestEntity>().unwrap();
    for label in ["t1", "t2", "t2", "t3"] {
        tx.insert(&TestEntity::new(label)).unwrap();
    }

    let mut t2 = db.query::<TestEntity>().unwrap();
    t2.where_eq("test", "t2").unwrap();
    assert_eq!(t2.count().unwrap(), 2);

    let stamped = TestEntity::new("t2").with_uuid(Uuid::new_v4());
    assert_eq!(t2.update(&stamped, &["uuid"]).unwrap(), 2);
    assert_eq!(t2.count().unwrap(), 2);
    assert!(t2
        .select()
        .unwrap()
        .iter()
        .all(|e| e.uuid == stamped.uuid && e.date_time.is_some()));

    assert_eq!(t2.delete().unwrap(), 2);
    assert_eq!(t2.count().unwrap(), 0);
    assert_eq!(tx.select().unwrap().len(), 2);
    tx.commit().unwrap();
}

#[test]
fn update_by_column_name_sets_only_that_column() {
    let db = scenarios::labelled_database();
    let before = db.auto::<TestEntity>().unwrap().select().unwrap();

    let mut auto = db.auto::<TestEntity>().unwrap();
    auto.where_eq("test", "t1").unwrap();
    // "test" is both the property and the column name
    assert_eq!(
        auto.update(&TestEntity::new("renamed"), &["test"]).unwrap(),
        1
    );

    let after = db.auto::<TestEntity>().unwrap().select().unwrap();
    assert_eq!(after[0].test.as_deref(), Some("renamed"));
    assert_eq!(after[0].uuid, before[0].uuid);
    assert_eq!(after[0].date_time, before[0].date_time);
}

#[test]
fn select_unique_reports_match_count() {
    let db = scenarios::labelled_database();
    let mut auto = db.auto::<TestEntity>().unwrap();

    auto.where_eq("test", "t2").unwrap();
    assert!(matches!(
        auto.select_unique(),
        Err(CoreError::NotUnique { matched: 2, .. })
    ));
    assert!(auto.select_unique_or_none().unwrap().is_none());

    auto.where_eq("test", "missing").unwrap();
    assert!(matches!(
        auto.select_unique(),
        Err(CoreError::NotUnique { matched: 0, .. })
    ));
    assert!(auto.select_unique_or_none().unwrap().is_none());

    auto.where_eq("test", "t3").unwrap();
    assert_eq!(
        auto.select_unique_or_none().unwrap().unwrap().test.as_deref(),
        Some("t3")
    );
}

#[test]
fn names_resolve_by_property_or_column() {
    let db = scenarios::labelled_database();
    let stored = db.auto::<TestEntity>().unwrap().select().unwrap();
    let stamp = stored[0].date_time.unwrap();

    let by_property = db
        .auto::<TestEntity>()
        .unwrap()
        .where_with("dateTime", Comparator::AtLeast, Value::Timestamp(stamp))
        .unwrap()
        .count()
        .unwrap();
    let by_column = db
        .auto::<TestEntity>()
        .unwrap()
        .where_with("timestamp", Comparator::AtLeast, Value::Timestamp(stamp))
        .unwrap()
        .count()
        .unwrap();
    assert_eq!(by_property, 4);
    assert_eq!(by_column, 4);
}

#[test]
fn unknown_names_fail_at_where_time() {
    let db = TestDatabase::memory();
    let mut query = db.query::<TestEntity>().unwrap();
    assert!(matches!(
        query.where_eq("nope", 1),
        Err(CoreError::UnresolvedColumn { .. })
    ));
    assert!(matches!(
        query.where_cmp("test", " throw ", "x"),
        Err(CoreError::UnsupportedComparator { .. })
    ));
    assert!(query.predicates().is_empty());
}

#[test]
fn greater_than_is_inclusive() {
    let db = TestDatabase::memory();
    let mut auto = db.auto::<TestTable>().unwrap();
    for id in 1..=5 {
        auto.insert(&TestTable::new(id, "row")).unwrap();
    }

    auto.where_cmp("id", ">", 3).unwrap();
    assert_eq!(auto.count().unwrap(), 3);
    auto.where_cmp("id", "<", 5).unwrap();
    assert_eq!(auto.count().unwrap(), 2);
    auto.reset().where_cmp("id", "<", 3).unwrap();
    assert_eq!(auto.count().unwrap(), 2);
}

#[test]
fn like_matches_patterns() {
    let db = TestDatabase::memory();
    scenarios::insert_labels(&db, &["alpha", "alps", "beta"]);
    let mut auto = db.auto::<TestEntity>().unwrap();

    auto.where_cmp("test", "LIKE", "al%").unwrap();
    assert_eq!(auto.count().unwrap(), 2);
    auto.where_cmp("test", "like", "_eta").unwrap();
    assert_eq!(auto.count().unwrap(), 1);
}

#[test]
fn identifier_matches_its_text_form() {
    let db = TestDatabase::memory();
    let rows: Vec<TestTable> = (1..=3).map(|id| TestTable::new(id, "row")).collect();
    for row in &rows {
        db.auto::<TestTable>().unwrap().insert(row).unwrap();
    }

    for row in &rows {
        let found = db
            .auto::<TestTable>()
            .unwrap()
            .where_eq("uuid_indexed", row.uuid_indexed.to_string())
            .unwrap()
            .select_unique()
            .unwrap();
        assert_eq!(&found, row);
    }

    let err = db
        .auto::<TestTable>()
        .unwrap()
        .where_eq("uuid", "not-a-uuid")
        .unwrap()
        .count()
        .unwrap_err();
    assert!(matches!(
        err.as_engine(),
        Some(EngineError::InvalidLiteral { .. })
    ));
}

#[test]
fn duplicate_key_is_an_engine_failure() {
    let db = TestDatabase::memory();
    let row = TestTable::new(1, "row");
    db.auto::<TestTable>().unwrap().insert(&row).unwrap();
    let err = db.auto::<TestTable>().unwrap().insert(&row).unwrap_err();
    assert!(matches!(
        err.as_engine(),
        Some(EngineError::PrimaryKeyViolation { .. })
    ));
    assert_eq!(db.auto::<TestTable>().unwrap().count().unwrap(), 1);
}

#[test]
fn file_store_survives_reopen() {
    let db = TestDatabase::file();
    scenarios::insert_labels(&db, &["t1", "t2"]);
    let db = db.reopen();
    assert_eq!(db.auto::<TestEntity>().unwrap().count().unwrap(), 2);

    // identity continues after the persisted rows
    let next = db
        .auto::<TestEntity>()
        .unwrap()
        .insert(&TestEntity::new("t3"))
        .unwrap();
    assert_eq!(next.id, Some(3));
}
