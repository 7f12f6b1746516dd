use crate::{db::row::Ref, value::Value};
use std::{collections::BTreeMap, fmt, rc::Rc};

///
/// Lookup
///
/// Row predicate used by `filter`, `exclude`, `get` and `exists`:
/// either a partial field match or an arbitrary closure.
///

#[derive(Clone)]
pub enum Lookup {
    Match(BTreeMap<String, Value>),
    Predicate(Rc<dyn Fn(&Ref) -> bool>),
}

impl Lookup {
    pub fn predicate(f: impl Fn(&Ref) -> bool + 'static) -> Self {
        Self::Predicate(Rc::new(f))
    }

    #[must_use]
    pub fn matches(&self, row: &Ref) -> bool {
        match self {
            Self::Match(fields) => row.matches(fields),
            Self::Predicate(f) => f(row),
        }
    }
}

impl From<BTreeMap<String, Value>> for Lookup {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self::Match(fields)
    }
}

impl fmt::Debug for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match(fields) => f.debug_tuple("Match").field(fields).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}
