//! Property-based test generators using proptest.

use crate::entities::TestTable;
use proptest::prelude::*;
use scopedb_core::Comparator;
use uuid::Uuid;

/// Strategy for labels drawn from a small alphabet, so that generated sets
/// contain duplicates.
pub fn label_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["t1", "t2", "t3", "t4"]).prop_map(str::to_string)
}

/// Strategy for free-form labels.
pub fn free_label_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex")
}

/// Strategy for lists of labels.
pub fn labels_strategy(max_len: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(label_strategy(), 0..=max_len)
}

/// Strategy for identifiers.
pub fn uuid_strategy() -> impl Strategy<Value = Uuid> {
    any::<u128>().prop_map(Uuid::from_u128)
}

/// Strategy for predicate comparators.
pub fn comparator_strategy() -> impl Strategy<Value = Comparator> {
    prop_oneof![
        Just(Comparator::Eq),
        Just(Comparator::AtLeast),
        Just(Comparator::LessThan),
        Just(Comparator::Like),
    ]
}

/// Strategy for [`TestTable`] rows with keys `1..=len` and distinct identifiers.
pub fn test_table_rows_strategy(max_len: usize) -> impl Strategy<Value = Vec<TestTable>> {
    prop::collection::hash_set(uuid_strategy(), 0..=max_len).prop_flat_map(|uuids| {
        let uuids: Vec<Uuid> = uuids.into_iter().collect();
        let len = uuids.len();
        (
            Just(uuids),
            prop::collection::vec(label_strategy(), len),
            prop::collection::vec(uuid_strategy(), len),
        )
            .prop_map(|(uuids, labels, indexed)| {
                uuids
                    .into_iter()
                    .zip(labels)
                    .zip(indexed)
                    .enumerate()
                    .map(|(i, ((uuid, string), uuid_indexed))| TestTable {
                        id: i as i64 + 1,
                        string,
                        uuid,
                        uuid_indexed,
                    })
                    .collect()
            })
    })
}
