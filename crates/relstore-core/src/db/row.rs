use crate::{db::relation::RelationInput, error::Error, key::Key, value::Value};
use derive_more::IntoIterator;
use serde::{Serialize, Serializer};
use std::{collections::BTreeMap, sync::Arc};

///
/// Ref
///
/// Immutable snapshot of one row: attribute values plus foreign-key ids.
/// Many-to-many fields are never stored here; they live in through rows.
/// A changed row is always a new `Ref`; stored refs are shared as `Arc<Ref>`.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Ref {
    entity: Arc<str>,
    id: Key,
    fields: BTreeMap<String, Value>,
}

impl Ref {
    pub(crate) const fn new(entity: Arc<str>, id: Key, fields: BTreeMap<String, Value>) -> Self {
        Self { entity, id, fields }
    }

    /// Entity whose table stores this row.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    #[must_use]
    pub const fn id(&self) -> &Key {
        &self.id
    }

    /// Field value, including the id attribute.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Field value with `Null` standing in for absent fields.
    #[must_use]
    pub fn value(&self, field: &str) -> Value {
        self.fields.get(field).cloned().unwrap_or_default()
    }

    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// True when every `(field, value)` pair in `lookup` equals this row's value.
    /// Absent fields compare as `Null`.
    #[must_use]
    pub fn matches(&self, lookup: &BTreeMap<String, Value>) -> bool {
        lookup
            .iter()
            .all(|(field, expected)| self.fields.get(field).unwrap_or(&Value::Null) == expected)
    }

    // Build the successor snapshot, or `None` when nothing would change.
    pub(crate) fn merged(&self, changes: &BTreeMap<String, Value>) -> Option<Self> {
        let changed = changes
            .iter()
            .any(|(field, value)| self.fields.get(field) != Some(value));
        if !changed {
            return None;
        }

        let mut fields = self.fields.clone();
        for (field, value) in changes {
            fields.insert(field.clone(), value.clone());
        }

        Some(Self::new(Arc::clone(&self.entity), self.id.clone(), fields))
    }
}

impl Serialize for Ref {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

///
/// PropValue
///
/// One caller-supplied property for `create` / `update`.
/// Relation fields accept any of the three forms; plain values are
/// interpreted against the field's declared kind during resolution.
///

#[derive(Clone, Debug)]
pub enum PropValue {
    Value(Value),
    Relation(RelationInput),
    Relations(Vec<RelationInput>),
}

macro_rules! prop_value_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for PropValue {
                fn from(value: $ty) -> Self {
                    Self::Value(Value::from(value))
                }
            }
        )*
    };
}

prop_value_from!(bool, i64, i32, u32, f64, &str, String, Key, &Key);

impl From<Value> for PropValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<RelationInput> for PropValue {
    fn from(input: RelationInput) -> Self {
        Self::Relation(input)
    }
}

impl From<Arc<Ref>> for PropValue {
    fn from(row: Arc<Ref>) -> Self {
        Self::Relation(RelationInput::Ref(row))
    }
}

impl From<&Arc<Ref>> for PropValue {
    fn from(row: &Arc<Ref>) -> Self {
        Self::Relation(RelationInput::Ref(Arc::clone(row)))
    }
}

impl<T: Into<RelationInput>> From<Vec<T>> for PropValue {
    fn from(items: Vec<T>) -> Self {
        Self::Relations(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for PropValue {
    fn from(value: Option<T>) -> Self {
        Self::Value(Value::from(value))
    }
}

///
/// Props
///
/// Property bag handed to mutations. Keys that are not declared fields are
/// stored on the row as plain attributes.
///

#[derive(Clone, Debug, Default, IntoIterator)]
pub struct Props(#[into_iterator(owned, ref)] BTreeMap<String, PropValue>);

impl Props {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<PropValue>) {
        self.0.insert(field.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&PropValue> {
        self.0.get(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<PropValue> {
        self.0.remove(field)
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropValue)> {
        self.0.iter()
    }

    /// Build props from a JSON object, e.g. a host action payload.
    pub fn from_json(json: serde_json::Value) -> Result<Self, Error> {
        let serde_json::Value::Object(entries) = json else {
            return Err(Error::validation(format!(
                "props must be a JSON object, got {json}"
            )));
        };

        Ok(Self(
            entries
                .into_iter()
                .map(|(field, value)| (field, PropValue::Value(Value::from(value))))
                .collect(),
        ))
    }
}

impl<K: Into<String>, V: Into<PropValue>> FromIterator<(K, V)> for Props {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(field, value)| (field.into(), value.into()))
                .collect(),
        )
    }
}

/// Build a match map for `get` / `exists` / `filter` lookups.
pub fn lookup<K, V, I>(pairs: I) -> BTreeMap<String, Value>
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(field, value)| (field.into(), value.into()))
        .collect()
}
