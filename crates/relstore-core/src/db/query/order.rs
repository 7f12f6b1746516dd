use crate::{
    db::row::Ref,
    error::Error,
    value::{Value, canonical_cmp},
};
use std::{cmp::Ordering, fmt, rc::Rc, str::FromStr, sync::Arc};

///
/// Direction
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    const fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(Error::validation(format!(
                "sort direction must be 'asc' or 'desc', got '{other}'"
            ))),
        }
    }
}

/// `true` sorts ascending.
impl From<bool> for Direction {
    fn from(ascending: bool) -> Self {
        if ascending { Self::Asc } else { Self::Desc }
    }
}

///
/// IntoDirection
///
/// Anything accepted as a sort direction: a `Direction`, a `bool`
/// (`true` = ascending), or the strings `"asc"` / `"desc"`.
///

pub trait IntoDirection {
    fn into_direction(self) -> Result<Direction, Error>;
}

impl IntoDirection for Direction {
    fn into_direction(self) -> Result<Direction, Error> {
        Ok(self)
    }
}

impl IntoDirection for bool {
    fn into_direction(self) -> Result<Direction, Error> {
        Ok(Direction::from(self))
    }
}

impl IntoDirection for &str {
    fn into_direction(self) -> Result<Direction, Error> {
        self.parse()
    }
}

impl IntoDirection for String {
    fn into_direction(self) -> Result<Direction, Error> {
        self.parse()
    }
}

///
/// SortKey
///

#[derive(Clone)]
pub enum SortKey {
    Field(String),
    Accessor(Rc<dyn Fn(&Ref) -> Value>),
}

impl SortKey {
    pub fn accessor(f: impl Fn(&Ref) -> Value + 'static) -> Self {
        Self::Accessor(Rc::new(f))
    }

    fn extract(&self, row: &Ref) -> Value {
        match self {
            Self::Field(field) => row.value(field),
            Self::Accessor(f) => f(row),
        }
    }
}

impl From<&str> for SortKey {
    fn from(field: &str) -> Self {
        Self::Field(field.to_string())
    }
}

impl From<String> for SortKey {
    fn from(field: String) -> Self {
        Self::Field(field)
    }
}

impl fmt::Debug for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(field) => f.debug_tuple("Field").field(field).finish(),
            Self::Accessor(_) => f.write_str("Accessor(..)"),
        }
    }
}

/// Stable sort, lexicographic across `keys`.
pub(crate) fn sort_rows(rows: &mut Vec<Arc<Ref>>, keys: &[(SortKey, Direction)]) {
    let mut decorated: Vec<(Vec<Value>, Arc<Ref>)> = rows
        .drain(..)
        .map(|row| (keys.iter().map(|(key, _)| key.extract(&row)).collect(), row))
        .collect();

    decorated.sort_by(|(left, _), (right, _)| {
        keys.iter()
            .zip(left.iter().zip(right))
            .map(|((_, direction), (l, r))| direction.apply(canonical_cmp(l, r)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });

    rows.extend(decorated.into_iter().map(|(_, row)| row));
}
