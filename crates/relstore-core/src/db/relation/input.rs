use crate::{
    db::{
        row::{PropValue, Ref},
        table::{Table, TableState},
    },
    error::Error,
    key::Key,
    value::Value,
};
use std::sync::Arc;

///
/// RelationInput
///
/// The accepted shapes of a relation value at a mutation call site.
/// Every form is normalized to a raw target id by [`resolve_one`] before
/// any table is touched.
///

#[derive(Clone, Debug, PartialEq)]
pub enum RelationInput {
    /// Raw target id.
    Id(Key),

    /// Row snapshot of the target.
    Ref(Arc<Ref>),

    /// Session-bound row handle; carries its entity for type checking.
    Handle { entity: String, id: Key },
}

impl RelationInput {
    fn into_key(self, target: &Table) -> Result<Key, Error> {
        match self {
            Self::Id(key) => Ok(key),
            Self::Ref(row) => owned_by(target, row.entity(), row.id()).map(|()| row.id().clone()),
            Self::Handle { entity, id } => owned_by(target, &entity, &id).map(|()| id),
        }
    }
}

// Rows and handles must come from the relation's target entity.
fn owned_by(target: &Table, entity: &str, id: &Key) -> Result<(), Error> {
    if entity == target.entity() {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "expected a '{}' row, got a '{entity}' row ({id})",
            target.entity()
        )))
    }
}

impl From<Key> for RelationInput {
    fn from(key: Key) -> Self {
        Self::Id(key)
    }
}

impl From<&Key> for RelationInput {
    fn from(key: &Key) -> Self {
        Self::Id(key.clone())
    }
}

impl From<i64> for RelationInput {
    fn from(n: i64) -> Self {
        Self::Id(Key::Int(n))
    }
}

impl From<i32> for RelationInput {
    fn from(n: i32) -> Self {
        Self::Id(Key::from(n))
    }
}

impl From<&str> for RelationInput {
    fn from(s: &str) -> Self {
        Self::Id(Key::from(s))
    }
}

impl From<String> for RelationInput {
    fn from(s: String) -> Self {
        Self::Id(Key::Text(s))
    }
}

impl From<Arc<Ref>> for RelationInput {
    fn from(row: Arc<Ref>) -> Self {
        Self::Ref(row)
    }
}

impl From<&Arc<Ref>> for RelationInput {
    fn from(row: &Arc<Ref>) -> Self {
        Self::Ref(Arc::clone(row))
    }
}

// Check kind and presence of one resolved target id.
fn check_target(field: &str, key: Key, target: &Table, state: &TableState) -> Result<Key, Error> {
    if key.kind() != target.id_kind() {
        return Err(Error::validation(format!(
            "field '{field}' expects {:?} ids of '{}', got {key}",
            target.id_kind(),
            target.entity()
        )));
    }
    if !state.contains(&key) {
        return Err(Error::validation(format!(
            "field '{field}' references missing '{}' row {key}",
            target.entity()
        )));
    }

    Ok(key)
}

// Interpret a plain value as a raw id.
fn value_to_input(field: &str, value: &Value) -> Result<RelationInput, Error> {
    Key::from_value(value).map(RelationInput::Id).ok_or_else(|| {
        Error::validation(format!(
            "field '{field}' expects an id, got {}",
            value.type_name()
        ))
    })
}

/// Resolve a single-valued relation prop. `Ok(None)` clears the relation.
pub(crate) fn resolve_one(
    field: &str,
    prop: &PropValue,
    target: &Table,
    state: &TableState,
) -> Result<Option<Key>, Error> {
    let input = match prop {
        PropValue::Value(Value::Null) => return Ok(None),
        PropValue::Value(value) => value_to_input(field, value)?,
        PropValue::Relation(input) => input.clone(),
        PropValue::Relations(_) => {
            return Err(Error::validation(format!(
                "field '{field}' holds a single relation, got a list"
            )));
        }
    };

    let key = input.into_key(target)?;
    check_target(field, key, target, state).map(Some)
}

/// Resolve a many-to-many prop into distinct target ids, first occurrence wins.
pub(crate) fn resolve_many(
    field: &str,
    prop: &PropValue,
    target: &Table,
    state: &TableState,
) -> Result<Vec<Key>, Error> {
    let inputs = match prop {
        PropValue::Value(Value::Null) => Vec::new(),
        PropValue::Value(Value::List(items)) => items
            .iter()
            .map(|item| value_to_input(field, item))
            .collect::<Result<Vec<_>, _>>()?,
        PropValue::Value(value) => vec![value_to_input(field, value)?],
        PropValue::Relation(input) => vec![input.clone()],
        PropValue::Relations(inputs) => inputs.clone(),
    };

    let mut keys: Vec<Key> = Vec::with_capacity(inputs.len());
    for input in inputs {
        let key = check_target(field, input.into_key(target)?, target, state)?;
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::row::lookup, key::IdKind, model::TableLayout};

    fn publishers() -> (Table, TableState) {
        let table = Table::new(
            "Publisher",
            "id",
            IdKind::Numeric,
            Vec::new(),
            TableLayout::default(),
        );
        let state = table
            .insert(&table.empty_state(), lookup([("name", "P0")]))
            .expect("seed insert")
            .state;

        (table, state)
    }

    #[test]
    fn every_form_resolves_to_the_same_id() {
        let (table, state) = publishers();
        let row = Arc::clone(state.get(&Key::Int(0)).expect("seeded row"));

        let forms = [
            PropValue::from(0),
            PropValue::from(RelationInput::Id(Key::Int(0))),
            PropValue::from(row),
            PropValue::from(RelationInput::Handle {
                entity: "Publisher".to_string(),
                id: Key::Int(0),
            }),
        ];
        for form in forms {
            assert_eq!(
                resolve_one("publisher", &form, &table, &state).expect("form should resolve"),
                Some(Key::Int(0))
            );
        }
    }

    #[test]
    fn wrong_kind_missing_row_and_foreign_handle_are_rejected() {
        let (table, state) = publishers();

        for prop in [
            PropValue::from("P1"),
            PropValue::from(7),
            PropValue::from(RelationInput::Handle {
                entity: "Person".to_string(),
                id: Key::Int(0),
            }),
        ] {
            let err = resolve_one("publisher", &prop, &table, &state).expect_err("should reject");
            assert!(matches!(err, Error::Validation(_)), "unexpected error: {err}");
        }
    }

    #[test]
    fn snapshot_from_another_entity_is_rejected() {
        let (publishers, state) = publishers();
        let people = Table::new("Person", "id", IdKind::Numeric, Vec::new(), TableLayout::default());
        let person = people
            .insert(&people.empty_state(), lookup([("name", "A0")]))
            .expect("seed insert")
            .row;
        assert_eq!(person.id(), &Key::Int(0));

        let err = resolve_one("publisher", &PropValue::from(&person), &publishers, &state)
            .expect_err("a Person row cannot stand in for a Publisher");
        assert!(matches!(err, Error::Validation(_)), "unexpected error: {err}");

        let err = resolve_many("publishers", &PropValue::from(vec![person]), &publishers, &state)
            .expect_err("list inputs are checked too");
        assert!(matches!(err, Error::Validation(_)), "unexpected error: {err}");
    }

    #[test]
    fn null_clears_and_lists_dedupe() {
        let (table, state) = publishers();

        assert_eq!(
            resolve_one("publisher", &PropValue::Value(Value::Null), &table, &state).unwrap(),
            None
        );
        let keys = resolve_many(
            "publishers",
            &PropValue::from(vec![Key::Int(0), Key::Int(0)]),
            &table,
            &state,
        )
        .unwrap();
        assert_eq!(keys, vec![Key::Int(0)]);
    }
}
