use crate::value::Value;
use std::{fmt, sync::Arc};

///
/// FieldKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    Attribute,
    ForeignKey,
    OneToOne,
    ManyToMany,
}

impl FieldKind {
    /// Relation kinds that store the target id on the row and own a reverse index.
    #[must_use]
    pub const fn is_indexed(self) -> bool {
        matches!(self, Self::ForeignKey | Self::OneToOne)
    }

    #[must_use]
    pub const fn is_relation(self) -> bool {
        !matches!(self, Self::Attribute)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Attribute => "attribute",
            Self::ForeignKey => "foreign key",
            Self::OneToOne => "one-to-one",
            Self::ManyToMany => "many-to-many",
        }
    }
}

///
/// DefaultValue
///
/// Producer invoked once per created row for an omitted attribute.
///

#[derive(Clone)]
pub struct DefaultValue(Arc<dyn Fn() -> Value + Send + Sync>);

impl DefaultValue {
    pub fn new(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    #[must_use]
    pub fn produce(&self) -> Value {
        (self.0)()
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DefaultValue(..)")
    }
}

///
/// ThroughFields
///
/// Explicit `(source, target)` foreign-key names on a through-entity.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ThroughFields {
    pub from: String,
    pub to: String,
}

///
/// FieldDescriptor
///
/// One declared attribute or relation. Relation options on an attribute
/// (and defaults on a relation) are rejected at registration time.
///

#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    kind: FieldKind,
    target: Option<String>,
    related_name: Option<String>,
    through: Option<String>,
    through_fields: Option<ThroughFields>,
    default: Option<DefaultValue>,
}

impl FieldDescriptor {
    const fn with_kind(kind: FieldKind, target: Option<String>) -> Self {
        Self {
            kind,
            target,
            related_name: None,
            through: None,
            through_fields: None,
            default: None,
        }
    }

    #[must_use]
    pub const fn attr() -> Self {
        Self::with_kind(FieldKind::Attribute, None)
    }

    #[must_use]
    pub fn fk(to: impl Into<String>) -> Self {
        Self::with_kind(FieldKind::ForeignKey, Some(to.into()))
    }

    #[must_use]
    pub fn one_to_one(to: impl Into<String>) -> Self {
        Self::with_kind(FieldKind::OneToOne, Some(to.into()))
    }

    #[must_use]
    pub fn many(to: impl Into<String>) -> Self {
        Self::with_kind(FieldKind::ManyToMany, Some(to.into()))
    }

    // ------------------------------------------------------------------
    // Builder options
    // ------------------------------------------------------------------

    /// Name of the reverse accessor installed on the target entity.
    #[must_use]
    pub fn related_name(mut self, name: impl Into<String>) -> Self {
        self.related_name = Some(name.into());
        self
    }

    /// Use a declared entity as the many-to-many linking table.
    #[must_use]
    pub fn through(mut self, entity: impl Into<String>) -> Self {
        self.through = Some(entity.into());
        self
    }

    #[must_use]
    pub fn through_fields(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.through_fields = Some(ThroughFields {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    #[must_use]
    pub fn default_with(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultValue::new(f));
        self
    }

    #[must_use]
    pub fn default_value(self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.default_with(move || value.clone())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        self.kind
    }

    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    #[must_use]
    pub fn declared_related_name(&self) -> Option<&str> {
        self.related_name.as_deref()
    }

    #[must_use]
    pub fn declared_through(&self) -> Option<&str> {
        self.through.as_deref()
    }

    #[must_use]
    pub const fn declared_through_fields(&self) -> Option<&ThroughFields> {
        self.through_fields.as_ref()
    }

    #[must_use]
    pub const fn default(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    pub(crate) fn set_through(&mut self, through: String, fields: ThroughFields) {
        self.through = Some(through);
        self.through_fields = Some(fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_records_relation_options() {
        let field = FieldDescriptor::many("Person")
            .related_name("books")
            .through("Authorship")
            .through_fields("book", "author");

        assert_eq!(field.kind(), FieldKind::ManyToMany);
        assert_eq!(field.target(), Some("Person"));
        assert_eq!(field.declared_related_name(), Some("books"));
        assert_eq!(field.declared_through(), Some("Authorship"));
        assert_eq!(
            field.declared_through_fields(),
            Some(&ThroughFields {
                from: "book".to_string(),
                to: "author".to_string(),
            })
        );
        assert!(!field.kind().is_indexed());
    }

    #[test]
    fn default_producer_runs_per_call() {
        let field = FieldDescriptor::attr().default_value("empty.png");
        let default = field.default().expect("default should be recorded");

        assert_eq!(default.produce(), Value::from("empty.png"));
        assert_eq!(default.produce(), Value::from("empty.png"));
    }
}
