//! Property tests for predicate semantics.

use proptest::prelude::*;
use scopedb_core::Comparator;
use scopedb_testkit::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn inserted_entities_are_all_selected(labels in labels_strategy(12)) {
        let db = TestDatabase::memory();
        let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        scenarios::insert_labels(&db, &refs);
        prop_assert_eq!(
            db.auto::<TestEntity>().unwrap().select().unwrap().len(),
            labels.len()
        );
    }

    #[test]
    fn equality_count_is_exact(labels in labels_strategy(16), probe in label_strategy()) {
        let db = TestDatabase::memory();
        let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        scenarios::insert_labels(&db, &refs);

        let expected = labels.iter().filter(|l| **l == probe).count();
        let counted = db
            .auto::<TestEntity>()
            .unwrap()
            .where_eq("test", probe.as_str())
            .unwrap()
            .count()
            .unwrap();
        prop_assert_eq!(counted, expected);
    }

    #[test]
    fn later_value_overwrites_earlier(
        labels in labels_strategy(12),
        first in label_strategy(),
        second in label_strategy(),
    ) {
        let db = TestDatabase::memory();
        let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        scenarios::insert_labels(&db, &refs);

        let mut overwritten = db.auto::<TestEntity>().unwrap();
        overwritten
            .where_eq("test", first.as_str())
            .unwrap()
            .where_eq("test", second.as_str())
            .unwrap();
        let mut direct = db.auto::<TestEntity>().unwrap();
        direct.where_eq("test", second.as_str()).unwrap();

        prop_assert_eq!(overwritten.predicates(), direct.predicates());
        prop_assert_eq!(overwritten.count().unwrap(), direct.count().unwrap());
    }

    #[test]
    fn identifier_text_matches_exactly_one_row(rows in test_table_rows_strategy(8)) {
        let db = TestDatabase::memory();
        let mut auto = db.auto::<TestTable>().unwrap();
        for row in &rows {
            auto.insert(row).unwrap();
        }

        for row in &rows {
            let count = db
                .auto::<TestTable>()
                .unwrap()
                .where_eq("uuid", row.uuid.to_string())
                .unwrap()
                .count()
                .unwrap();
            prop_assert_eq!(count, 1);
        }
    }

    #[test]
    fn range_predicates_match_filtering(
        rows in test_table_rows_strategy(10),
        low in 0i64..12,
        high in 0i64..12,
    ) {
        let db = TestDatabase::memory();
        let mut auto = db.auto::<TestTable>().unwrap();
        for row in &rows {
            auto.insert(row).unwrap();
        }

        let expected = rows.iter().filter(|r| r.id >= low && r.id < high).count();
        let counted = db
            .auto::<TestTable>()
            .unwrap()
            .where_with("id", Comparator::AtLeast, low)
            .unwrap()
            .where_with("id", Comparator::LessThan, high)
            .unwrap()
            .count()
            .unwrap();
        prop_assert_eq!(counted, expected);
    }
}
