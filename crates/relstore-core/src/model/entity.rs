use crate::{
    key::IdKind,
    model::field::{FieldDescriptor, ThroughFields},
};
use serde::Deserialize;

/// Default id attribute name.
pub const DEFAULT_ID_ATTRIBUTE: &str = "id";

/// Default state key for a table's ordered id sequence.
pub const DEFAULT_ITEMS_KEY: &str = "items";

/// Default state key for a table's id → row map.
pub const DEFAULT_ITEMS_BY_ID_KEY: &str = "itemsById";

///
/// TableLayout
///
/// State key names used when a table is exported as plain data.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TableLayout {
    pub items_key: String,
    pub items_by_id_key: String,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            items_key: DEFAULT_ITEMS_KEY.to_string(),
            items_by_id_key: DEFAULT_ITEMS_BY_ID_KEY.to_string(),
        }
    }
}

///
/// EntityDeclaration
///
/// Named, ordered set of field descriptors plus id configuration.
/// Declarations are inert until handed to the registry.
///

#[derive(Clone, Debug)]
pub struct EntityDeclaration {
    name: String,
    fields: Vec<(String, FieldDescriptor)>,
    id_attribute: String,
    id_kind: IdKind,
    layout: Option<TableLayout>,
}

impl EntityDeclaration {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            id_attribute: DEFAULT_ID_ATTRIBUTE.to_string(),
            id_kind: IdKind::Numeric,
            layout: None,
        }
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.fields.push((name.into(), descriptor));
        self
    }

    /// Set the id attribute name and its kind.
    #[must_use]
    pub fn id(mut self, attribute: impl Into<String>, kind: IdKind) -> Self {
        self.id_attribute = attribute.into();
        self.id_kind = kind;
        self
    }

    #[must_use]
    pub fn layout(mut self, layout: TableLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields
            .iter()
            .map(|(name, descriptor)| (name.as_str(), descriptor))
    }

    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, descriptor)| descriptor)
    }

    #[must_use]
    pub fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    #[must_use]
    pub const fn id_kind(&self) -> IdKind {
        self.id_kind
    }

    #[must_use]
    pub const fn declared_layout(&self) -> Option<&TableLayout> {
        self.layout.as_ref()
    }

    // Registry-only hook used when applying configuration overrides.
    pub(crate) fn set_layout(&mut self, layout: TableLayout) {
        self.layout = Some(layout);
    }

    // Point a many-to-many field at a synthesized through-entity.
    pub(crate) fn bind_through(&mut self, field: &str, through: String, fields: ThroughFields) {
        if let Some((_, descriptor)) = self.fields.iter_mut().find(|(name, _)| name == field) {
            descriptor.set_through(through, fields);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldKind;

    #[test]
    fn declaration_defaults_to_numeric_id() {
        let entity = EntityDeclaration::new("Publisher").field("name", FieldDescriptor::attr());

        assert_eq!(entity.id_attribute(), "id");
        assert_eq!(entity.id_kind(), IdKind::Numeric);
        assert!(entity.declared_layout().is_none());
    }

    #[test]
    fn fields_keep_declaration_order() {
        let entity = EntityDeclaration::new("Book")
            .id("title", IdKind::Text)
            .field("title", FieldDescriptor::attr())
            .field("publisher", FieldDescriptor::fk("Publisher"))
            .field("coverArt", FieldDescriptor::attr());

        let names: Vec<_> = entity.fields().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["title", "publisher", "coverArt"]);
        assert_eq!(
            entity.get_field("publisher").map(FieldDescriptor::kind),
            Some(FieldKind::ForeignKey)
        );
    }
}
