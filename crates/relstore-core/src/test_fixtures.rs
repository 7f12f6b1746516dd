use crate::{
    db::Registry,
    key::IdKind,
    model::{EntityDeclaration, FieldDescriptor},
};

/// Book / Authorship / Person / Publisher library schema, plus a one-to-one
/// `Cover` and an implicit-through `Book.tags` many-to-many.
pub(crate) fn library_entities() -> Vec<EntityDeclaration> {
    vec![
        EntityDeclaration::new("Book")
            .id("title", IdKind::Text)
            .field("title", FieldDescriptor::attr())
            .field("coverArt", FieldDescriptor::attr().default_value("empty.png"))
            .field("publisher", FieldDescriptor::fk("Publisher").related_name("books"))
            .field(
                "authors",
                FieldDescriptor::many("Person")
                    .related_name("books")
                    .through("Authorship"),
            )
            .field("tags", FieldDescriptor::many("Tag")),
        EntityDeclaration::new("Authorship")
            .field("year", FieldDescriptor::attr())
            .field("book", FieldDescriptor::fk("Book"))
            .field("author", FieldDescriptor::fk("Person")),
        EntityDeclaration::new("Person")
            .id("id", IdKind::Text)
            .field("id", FieldDescriptor::attr())
            .field("firstName", FieldDescriptor::attr())
            .field("lastName", FieldDescriptor::attr())
            .field("nationality", FieldDescriptor::attr()),
        EntityDeclaration::new("Publisher")
            .id("index", IdKind::Numeric)
            .field("index", FieldDescriptor::attr())
            .field("name", FieldDescriptor::attr()),
        EntityDeclaration::new("Cover")
            .field("src", FieldDescriptor::attr())
            .field("book", FieldDescriptor::one_to_one("Book").related_name("cover")),
        EntityDeclaration::new("Tag")
            .id("name", IdKind::Text)
            .field("name", FieldDescriptor::attr()),
    ]
}

pub(crate) fn library_registry() -> Registry {
    Registry::register(library_entities()).expect("library schema should register")
}
