use crate::{
    db::{
        row::lookup,
        table::{Table, TableState},
    },
    error::Error,
    key::{IdKind, Key},
    model::TableLayout,
    value::Value,
};
use proptest::prelude::*;
use std::sync::Arc;

fn book_table() -> Table {
    Table::new(
        "Book",
        "id",
        IdKind::Numeric,
        vec!["publisher".to_string()],
        TableLayout::default(),
    )
}

fn insert(table: &Table, state: &TableState, publisher: i64) -> TableState {
    table
        .insert(state, lookup([("publisher", publisher)]))
        .expect("insert should succeed")
        .state
}

// Check the structural invariants every table state must hold.
fn assert_consistent(table: &Table, state: &TableState) {
    assert_eq!(state.items().len(), state.rows().len());
    for id in state.items() {
        assert!(state.contains(id), "sequence id {id} missing from row map");
    }

    for field in table.indexed_fields() {
        let index = state.index(field).expect("indexed field should own an index");
        for (target, owners) in index.iter() {
            assert!(!owners.is_empty(), "empty slots must be dropped");
            for owner in owners {
                let row = state.get(owner).expect("index owner must be live");
                assert_eq!(row.get(field), Some(&target.to_value()));
            }
        }

        for (id, row) in state.rows() {
            if let Some(target) = row.get(field).and_then(Key::from_value) {
                assert!(state.index_slot(field, &target).contains(id));
            }
        }
    }
}

#[test]
fn numeric_ids_allocate_from_zero_and_follow_explicit_ids() {
    let table = book_table();
    let state = table.empty_state();

    let first = table.insert(&state, lookup([("publisher", 1)])).unwrap();
    assert_eq!(first.row.id(), &Key::Int(0));
    let second = table.insert(&first.state, lookup([("publisher", 1)])).unwrap();
    assert_eq!(second.row.id(), &Key::Int(1));

    let explicit = table
        .insert(&second.state, lookup([("id", 5)]))
        .expect("explicit id should insert");
    assert_eq!(explicit.state.meta().max_id, Some(5));

    let next = table.insert(&explicit.state, lookup([("publisher", 2)])).unwrap();
    assert_eq!(next.row.id(), &Key::Int(6));
}

#[test]
fn text_ids_must_be_supplied() {
    let table = Table::new("Person", "id", IdKind::Text, Vec::new(), TableLayout::default());
    let state = table.empty_state();

    let err = table
        .insert(&state, lookup([("firstName", "A")]))
        .expect_err("text id tables never allocate");
    assert!(matches!(err, Error::MissingId { .. }));

    let err = table
        .insert(&state, lookup([("id", 3)]))
        .expect_err("numeric id on a text table is rejected");
    assert!(matches!(err, Error::Validation(_)));

    let write = table
        .insert(&state, lookup([("id", "A1")]))
        .expect("text id should insert");
    assert_eq!(write.state.meta().max_id, None);
}

#[test]
fn duplicate_id_is_rejected() {
    let table = book_table();
    let state = table.insert(&table.empty_state(), lookup([("id", 1)])).unwrap().state;

    let err = table
        .insert(&state, lookup([("id", 1)]))
        .expect_err("duplicate should fail");
    assert_eq!(
        err,
        Error::DuplicateId {
            entity: "Book".to_string(),
            id: Key::Int(1),
        }
    );
}

#[test]
fn update_moves_row_between_index_slots() {
    let table = book_table();
    let state = insert(&table, &table.empty_state(), 1);
    let state = insert(&table, &state, 1);

    let write = table
        .update(&state, &Key::Int(0), &lookup([("publisher", 2)]))
        .expect("update should succeed");

    assert_eq!(write.delta.inserts, 1);
    assert_eq!(write.delta.removes, 1);
    assert_eq!(write.state.index_slot("publisher", &Key::Int(1)), &[Key::Int(1)]);
    assert_eq!(write.state.index_slot("publisher", &Key::Int(2)), &[Key::Int(0)]);
    assert_consistent(&table, &write.state);
}

#[test]
fn update_only_replaces_touched_structures() {
    let table = book_table();
    let state = insert(&table, &table.empty_state(), 1);

    let write = table
        .update(&state, &Key::Int(0), &lookup([("title", "renamed")]))
        .unwrap();

    assert!(Arc::ptr_eq(&state.items, &write.state.items));
    assert!(Arc::ptr_eq(&state.meta, &write.state.meta));
    assert!(Arc::ptr_eq(&state.indexes, &write.state.indexes));
    assert!(!Arc::ptr_eq(&state.items_by_id, &write.state.items_by_id));
    assert_eq!(state.get(&Key::Int(0)).unwrap().get("title"), None);
}

#[test]
fn owned_transitions_reuse_unshared_structures() {
    let table = book_table();
    let state = insert(&table, &table.empty_state(), 1);
    let rows = Arc::as_ptr(&state.items_by_id);
    let items = Arc::as_ptr(&state.items);

    let state = table
        .insert_owned(state, lookup([("publisher", 2)]))
        .expect("insert should succeed")
        .state;
    let state = table
        .update_owned(state, &Key::Int(0), &lookup([("publisher", 2)]))
        .expect("update should succeed")
        .state;
    let state = table
        .delete_owned(state, &Key::Int(1))
        .expect("delete should succeed")
        .state;

    assert_eq!(Arc::as_ptr(&state.items_by_id), rows);
    assert_eq!(Arc::as_ptr(&state.items), items);
    assert_eq!(state.items(), &[Key::Int(0)]);
    assert_consistent(&table, &state);
}

#[test]
fn shared_state_is_never_edited_in_place() {
    let table = book_table();
    let state = insert(&table, &table.empty_state(), 1);
    let kept = state.clone();

    let next = table
        .insert_owned(state, lookup([("publisher", 2)]))
        .unwrap()
        .state;

    assert_eq!(kept.len(), 1);
    assert_eq!(next.len(), 2);
    assert!(!Arc::ptr_eq(&kept.items_by_id, &next.items_by_id));
}

#[test]
fn noop_update_keeps_the_same_snapshot() {
    let table = book_table();
    let state = insert(&table, &table.empty_state(), 1);

    let write = table
        .update(&state, &Key::Int(0), &lookup([("publisher", 1)]))
        .unwrap();

    assert!(Arc::ptr_eq(&state.items_by_id, &write.state.items_by_id));
    assert!(Arc::ptr_eq(state.get(&Key::Int(0)).unwrap(), &write.row));
}

#[test]
fn update_cannot_change_id() {
    let table = book_table();
    let state = insert(&table, &table.empty_state(), 1);

    let err = table
        .update(&state, &Key::Int(0), &lookup([("id", 9)]))
        .expect_err("id is immutable");
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn delete_removes_row_and_index_membership() {
    let table = book_table();
    let state = insert(&table, &table.empty_state(), 1);
    let state = insert(&table, &state, 1);

    let write = table.delete(&state, &Key::Int(0)).expect("delete should succeed");
    assert_eq!(write.row.id(), &Key::Int(0));
    assert_eq!(write.state.items(), &[Key::Int(1)]);
    assert_eq!(write.state.index_slot("publisher", &Key::Int(1)), &[Key::Int(1)]);
    assert_eq!(write.state.meta().max_id, Some(1));

    let err = table
        .delete(&write.state, &Key::Int(0))
        .expect_err("second delete should fail");
    assert!(err.is_not_found());
}

#[test]
fn get_index_rejects_unindexed_fields() {
    let table = book_table();
    let state = insert(&table, &table.empty_state(), 3);

    assert_eq!(
        table.get_index(&state, "publisher", &Key::Int(3)).unwrap(),
        &[Key::Int(0)]
    );
    assert!(matches!(
        table.get_index(&state, "title", &Key::Int(3)),
        Err(Error::UnknownField { .. })
    ));
}

#[test]
fn empty_state_serializes_to_plain_shape() {
    let table = book_table();
    let json = serde_json::to_value(table.empty_state()).unwrap();

    assert_eq!(
        json,
        serde_json::json!({
            "items": [],
            "itemsById": {},
            "meta": { "maxId": null },
            "indexes": { "publisher": {} },
        })
    );
}

#[derive(Clone, Debug)]
enum Op {
    Insert(Option<i64>),
    Update(usize, Option<i64>),
    Delete(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        proptest::option::of(0i64..4).prop_map(Op::Insert),
        (any::<usize>(), proptest::option::of(0i64..4)).prop_map(|(i, p)| Op::Update(i, p)),
        any::<usize>().prop_map(Op::Delete),
    ]
}

proptest! {
    #[test]
    fn random_mutations_keep_indexes_consistent(ops in prop::collection::vec(arb_op(), 0..40)) {
        let table = book_table();
        let mut state = table.empty_state();
        let mut last_max = None;

        for op in ops {
            let result = match op {
                Op::Insert(publisher) => {
                    table.insert(&state, lookup([("publisher", Value::from(publisher))]))
                }
                Op::Update(pick, publisher) => {
                    if state.is_empty() {
                        continue;
                    }
                    let id = state.items()[pick % state.len()].clone();
                    table.update(&state, &id, &lookup([("publisher", Value::from(publisher))]))
                }
                Op::Delete(pick) => {
                    if state.is_empty() {
                        continue;
                    }
                    let id = state.items()[pick % state.len()].clone();
                    table.delete(&state, &id)
                }
            };
            state = result.expect("generated operations are valid").state;

            prop_assert!(state.meta().max_id >= last_max);
            last_max = state.meta().max_id;
            assert_consistent(&table, &state);
        }
    }
}
