//! Table-level integration tests: index maintenance, rollback, deletes
//! and backfill through the public API.


use std::ops::Bound;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tessera::catalog::{Catalog, TableResolver};
use tessera::datum::Value;
use tessera::index::{Index, IndexEntry, IndexError, IndexKey, IndexMetadata, OrderedIndex};
use tessera::storage::{
    ConstraintViolation, DataTable, StorageConfig, StorageError, TileLayout, TupleLocation,
};
use tessera::tuple::Tuple;

use table_test_support::{RecordingIndex, init_tracing, ordered, people_schema, person, unique};

fn people(config: StorageConfig) -> Arc<DataTable> {
    let catalog = Catalog::new();
    catalog
        .create_table(1, 5, "people", people_schema(), config)
        .unwrap()
}

#[test]
fn test_point_lookup_finds_every_inserted_tuple() {
    init_tracing();
    let layouts = [
        TileLayout::Row,
        TileLayout::Columnar,
        TileLayout::Partitioned(vec![vec![0, 2], vec![1, 3]]),
    ];
    for layout in layouts {
        let table = people(
            StorageConfig::default()
                .with_tuples_per_tile_group(8)
                .with_layout(layout),
        );
        let indexes: Vec<Arc<dyn Index>> = vec![
            unique(1, "pk_people", vec![0]),
            ordered(2, "idx_age", vec![2]),
            ordered(3, "idx_city_name", vec![3, 1]),
        ];
        for index in &indexes {
            table.add_index(index.clone()).unwrap();
        }

        let cities = ["oslo", "lima", "pune"];
        let tuples: Vec<Tuple> = (0..50)
            .map(|i| person(i, &format!("p{}", i), 20 + i % 7, cities[i as usize % 3]))
            .collect();
        for tuple in &tuples {
            table.insert_tuple(tuple).unwrap();
        }

        assert_eq!(table.tile_group_count(), 7);
        for tuple in &tuples {
            for index in &indexes {
                let key = index.metadata().build_key(tuple);
                let found = index
                    .point_lookup(&key)
                    .into_iter()
                    .filter_map(|loc| table.get_tuple(loc))
                    .any(|stored| &stored == tuple);
                assert!(found, "{} lacks {}", index.name(), tuple);
            }
        }
    }
}

#[test]
fn test_rollback_runs_in_reverse_declaration_order() {
    init_tracing();
    let log = Arc::new(Mutex::new(Vec::new()));
    let table = people(StorageConfig::default());
    table
        .add_index(Arc::new(RecordingIndex::new(
            IndexMetadata::new(1, "a", vec![2]),
            log.clone(),
        )))
        .unwrap();
    table
        .add_index(Arc::new(RecordingIndex::new(
            IndexMetadata::new(2, "b", vec![3]),
            log.clone(),
        )))
        .unwrap();
    table
        .add_index(Arc::new(RecordingIndex::new(
            IndexMetadata::new(3, "c", vec![0]).unique(),
            log.clone(),
        )))
        .unwrap();

    table.insert_tuple(&person(1, "ann", 30, "oslo")).unwrap();
    log.lock().clear();

    let err = table.insert_tuple(&person(1, "bob", 40, "lima")).unwrap_err();
    assert!(matches!(
        err,
        StorageError::ConstraintViolation(ConstraintViolation::Unique(_))
    ));
    assert_eq!(
        *log.lock(),
        vec![
            "insert a", "insert b", "reject c", "delete b", "delete a"
        ]
    );

    // Nothing of the rejected tuple survives in any index.
    for index in table.indexes() {
        assert_eq!(index.entry_count(), 1, "{}", index.name());
    }
    assert!(
        table
            .get_index(0)
            .unwrap()
            .point_lookup(&IndexKey::new(vec![Value::Int32(40)]))
            .is_empty()
    );
    let slot = table.tile_group(0).unwrap();
    assert_eq!(slot.allocated_slot_count(), 2);
    assert!(!slot.is_live(1));
}

#[test]
fn test_null_in_not_null_column_wastes_no_slot() {
    let table = people(StorageConfig::default());
    table.add_index(ordered(1, "idx_age", vec![2])).unwrap();
    let bad = Tuple::new(vec![Value::Null, Value::from("x"), Value::Int32(1), Value::Null]);

    assert!(!table.check_nulls(&bad));
    assert!(matches!(
        table.insert_tuple(&bad),
        Err(StorageError::ConstraintViolation(ConstraintViolation::NotNull { .. }))
    ));
    assert_eq!(table.tile_group(0).unwrap().allocated_slot_count(), 0);
    assert_eq!(table.get_index(0).unwrap().entry_count(), 0);

    // NULL in a nullable indexed column is fine, also for unique indexes.
    table.add_index(unique(2, "uq_city", vec![3])).unwrap();
    table.insert_tuple(&Tuple::new(vec![Value::Int32(1), Value::Null, Value::Int32(5), Value::Null])).unwrap();
    table.insert_tuple(&Tuple::new(vec![Value::Int32(2), Value::Null, Value::Int32(6), Value::Null])).unwrap();
    assert_eq!(table.get_index(1).unwrap().entry_count(), 2);
}

#[test]
fn test_deleted_tuple_leaves_indexes() {
    init_tracing();
    let table = people(StorageConfig::default());
    let pk = unique(1, "pk", vec![0]);
    let by_city = ordered(2, "idx_city", vec![3]);
    table.add_index(pk.clone()).unwrap();
    table.add_index(by_city.clone()).unwrap();

    let keep = table.insert_tuple(&person(1, "ann", 30, "oslo")).unwrap();
    let gone = table.insert_tuple(&person(2, "bob", 31, "oslo")).unwrap();
    table.delete_tuple(gone).unwrap();

    let oslo = IndexKey::new(vec![Value::from("oslo")]);
    assert_eq!(by_city.point_lookup(&oslo), vec![keep]);
    assert!(pk.point_lookup(&IndexKey::new(vec![Value::Int32(2)])).is_empty());
    assert_eq!(table.live_tuples().len(), 1);
    assert_eq!(table.tuple_count(), 1);
}

#[test]
fn test_backfill_after_late_index() {
    init_tracing();
    let table = people(StorageConfig::default().with_tuples_per_tile_group(4));
    for i in 0..10 {
        table.insert_tuple(&person(i, "p", i % 3, "oslo")).unwrap();
    }
    table.delete_tuple(tessera::storage::TupleLocation::new(1, 1)).unwrap();

    let by_age = ordered(7, "idx_age", vec![2]);
    table.add_index(by_age.clone()).unwrap();
    assert!(!table.is_index_ready(7));
    assert!(table.to_string().contains("(backfill pending)"));

    assert_eq!(table.backfill_index(7).unwrap(), 9);
    assert!(table.is_index_ready(7));
    // Running it again finds nothing left to add.
    assert_eq!(table.backfill_index(7).unwrap(), 0);

    let zero = by_age.point_lookup(&IndexKey::new(vec![Value::Int32(0)]));
    assert_eq!(zero.len(), 4);
}

#[test]
fn test_unique_backfill_conflict_keeps_index_unchanged() {
    let table = people(StorageConfig::default());
    table.insert_tuple(&person(1, "ann", 30, "oslo")).unwrap();
    table.insert_tuple(&person(2, "bob", 30, "lima")).unwrap();

    let uq = unique(3, "uq_age", vec![2]);
    table.add_index(uq.clone()).unwrap();
    // Inserted after registration: indexed immediately.
    table.insert_tuple(&person(3, "cy", 44, "pune")).unwrap();
    assert_eq!(uq.entry_count(), 1);

    assert!(table.backfill_index(3).is_err());
    assert_eq!(uq.entry_count(), 1);
    assert!(!table.is_index_ready(3));
}

#[test]
fn test_tile_group_limit_leaves_no_index_entry() {
    init_tracing();
    let table = people(
        StorageConfig::default()
            .with_tuples_per_tile_group(3)
            .with_max_tile_groups(2),
    );
    let pk = unique(1, "pk", vec![0]);
    table.add_index(pk.clone()).unwrap();

    for i in 0..6 {
        table.insert_tuple(&person(i, "p", 1, "x")).unwrap();
    }
    let err = table.insert_tuple(&person(6, "p", 1, "x")).unwrap_err();
    assert_eq!(err, StorageError::OutOfSpace { tile_group_id: 1 });
    assert_eq!(pk.entry_count(), 6);
    assert!(pk.point_lookup(&IndexKey::new(vec![Value::Int32(6)])).is_empty());
    assert_eq!(table.tile_group_count(), 2);
}

#[test]
fn test_catalog_shares_table_handles() {
    let catalog = Catalog::new();
    let table = catalog
        .create_table(1, 5, "people", people_schema(), StorageConfig::default())
        .unwrap();
    table.insert_tuple(&person(1, "ann", 30, "oslo")).unwrap();

    let resolved = catalog.get_table_with_oid(1, 5).unwrap();
    assert_eq!(resolved.tuple_count(), 1);
    assert_eq!(resolved.name(), "people");
}

/// An index that, while an insert is being indexed, scans the table and
/// tries to delete whatever the scan returns for the incoming location.
#[derive(Debug)]
struct ScanningIndex {
    inner: OrderedIndex,
    table: Mutex<Weak<DataTable>>,
    seen_by_scan: Mutex<Vec<TupleLocation>>,
    deleted_in_flight: Mutex<Vec<TupleLocation>>,
}

impl ScanningIndex {
    fn new(metadata: IndexMetadata) -> Self {
        Self {
            inner: OrderedIndex::new(metadata),
            table: Mutex::new(Weak::new()),
            seen_by_scan: Mutex::new(Vec::new()),
            deleted_in_flight: Mutex::new(Vec::new()),
        }
    }

    fn attach(&self, table: &Arc<DataTable>) {
        *self.table.lock() = Arc::downgrade(table);
    }
}

impl Index for ScanningIndex {
    fn metadata(&self) -> &IndexMetadata {
        self.inner.metadata()
    }

    fn insert_entry(&self, key: &IndexKey, location: TupleLocation) -> Result<(), IndexError> {
        let table = self.table.lock().upgrade();
        if let Some(table) = table {
            if table.live_tuples().iter().any(|(l, _)| *l == location) {
                self.seen_by_scan.lock().push(location);
            }
            if table.delete_tuple(location).is_ok() {
                self.deleted_in_flight.lock().push(location);
            }
        }
        self.inner.insert_entry(key, location)
    }

    fn delete_entry(&self, key: &IndexKey, location: TupleLocation) -> bool {
        self.inner.delete_entry(key, location)
    }

    fn range_scan(&self, lower: Bound<&IndexKey>, upper: Bound<&IndexKey>) -> Vec<IndexEntry> {
        self.inner.range_scan(lower, upper)
    }

    fn entry_count(&self) -> usize {
        self.inner.entry_count()
    }
}

#[test]
fn test_tuple_is_invisible_until_fully_indexed() {
    init_tracing();
    let table = people(StorageConfig::default());
    let pk = Arc::new(ScanningIndex::new(IndexMetadata::new(1, "pk", vec![0]).unique()));
    pk.attach(&table);
    table.add_index(pk.clone()).unwrap();

    let location = table.insert_tuple(&person(1, "ann", 30, "oslo")).unwrap();
    assert!(pk.seen_by_scan.lock().is_empty());
    assert!(pk.deleted_in_flight.lock().is_empty());
    assert_eq!(table.tuple_count(), 1);
    assert_eq!(pk.entry_count(), 1);

    // The key is released once the tuple is really gone.
    table.delete_tuple(location).unwrap();
    assert_eq!(pk.entry_count(), 0);
    table.insert_tuple(&person(1, "ann", 31, "lima")).unwrap();
    assert_eq!(pk.entry_count(), 1);
    assert_eq!(table.tuple_count(), 1);
}

#[test]
fn test_rejected_insert_is_never_visible_to_scans() {
    init_tracing();
    let table = people(StorageConfig::default());
    let by_age = Arc::new(ScanningIndex::new(IndexMetadata::new(1, "idx_age", vec![2])));
    by_age.attach(&table);
    table.add_index(by_age.clone()).unwrap();
    table.add_index(unique(2, "pk", vec![0])).unwrap();

    table.insert_tuple(&person(1, "ann", 30, "oslo")).unwrap();
    let err = table.insert_tuple(&person(1, "bob", 40, "lima")).unwrap_err();
    assert!(matches!(
        err,
        StorageError::ConstraintViolation(ConstraintViolation::Unique(_))
    ));

    assert!(by_age.seen_by_scan.lock().is_empty());
    assert!(by_age.deleted_in_flight.lock().is_empty());
    assert_eq!(table.tuple_count(), 1);
    assert_eq!(by_age.entry_count(), 1);
}
