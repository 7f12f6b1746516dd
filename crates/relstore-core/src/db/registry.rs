//! Module: db::registry
//! Responsibility: validate entity declarations, synthesize implicit
//! through-entities and resolve the relation graph once, up front.
//! Does not own: row storage (table) or mutation semantics (session).
//! Boundary: registration either yields a fully consistent `Registry` or
//! one `Error::Schema` listing every problem found.

use crate::{
    config::StoreConfig,
    db::{
        Branch, Session,
        relation::{Accessor, IncomingEdge, ManyLink, RelationGraph},
        table::Table,
    },
    error::Error,
    model::{EntityDeclaration, FieldDescriptor, FieldKind, ThroughFields},
};
use convert_case::{Case, Casing};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

///
/// Registry
///
/// The validated schema: declarations in registration order (implicit
/// through-entities last), one `Table` operator per entity, and the
/// resolved relation graph.
///

#[derive(Debug)]
pub struct Registry {
    entities: Vec<EntityDeclaration>,
    implicit: BTreeSet<String>,
    tables: BTreeMap<String, Table>,
    relations: RelationGraph,
    session_debug: bool,
}

impl Registry {
    pub fn register(entities: impl IntoIterator<Item = EntityDeclaration>) -> Result<Self, Error> {
        Self::register_with_config(entities, &StoreConfig::default())
    }

    pub fn register_with_config(
        entities: impl IntoIterator<Item = EntityDeclaration>,
        config: &StoreConfig,
    ) -> Result<Self, Error> {
        let mut entities: Vec<EntityDeclaration> = entities.into_iter().collect();

        for name in config.entities.keys() {
            if !entities.iter().any(|entity| entity.name() == name) {
                return Err(Error::Config(format!(
                    "layout override for unknown entity '{name}'"
                )));
            }
        }

        // Phase 1: declaration-local checks and implicit through synthesis.
        let mut errs = Vec::new();
        validate_names(&entities, &mut errs);
        validate_fields(&entities, &mut errs);
        if !errs.is_empty() {
            return Err(Error::Schema(errs));
        }

        let implicit = synthesize_through_entities(&mut entities, &mut errs);
        if !errs.is_empty() {
            return Err(Error::Schema(errs));
        }

        // Phase 2: resolve relation edges and accessors across entities.
        let relations = build_relation_graph(&entities, &implicit, &mut errs);
        if !errs.is_empty() {
            return Err(Error::Schema(errs));
        }

        for entity in &mut entities {
            let layout = config.layout_for(entity.name(), entity.declared_layout());
            entity.set_layout(layout);
        }

        let tables = entities
            .iter()
            .map(|entity| (entity.name().to_string(), build_table(entity)))
            .collect();

        tracing::debug!(
            entities = entities.len(),
            implicit_through = implicit.len(),
            "registry built"
        );

        Ok(Self {
            entities,
            implicit,
            tables,
            relations,
            session_debug: config.session.debug,
        })
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn entity(&self, name: &str) -> Result<&EntityDeclaration, Error> {
        self.entities
            .iter()
            .find(|entity| entity.name() == name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Entity names in registration order; implicit through-entities last.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(EntityDeclaration::name)
    }

    /// Declared (non-synthesized) entity names in registration order.
    pub fn declared_entity_names(&self) -> impl Iterator<Item = &str> {
        self.entity_names()
            .filter(|name| !self.implicit.contains(*name))
    }

    #[must_use]
    pub fn is_implicit_through(&self, name: &str) -> bool {
        self.implicit.contains(name)
    }

    pub fn table(&self, name: &str) -> Result<&Table, Error> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    #[must_use]
    pub const fn relations(&self) -> &RelationGraph {
        &self.relations
    }

    #[must_use]
    pub const fn session_debug(&self) -> bool {
        self.session_debug
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// A branch holding one empty table per entity.
    #[must_use]
    pub fn empty_state(&self) -> Branch {
        Branch::new(
            self.tables
                .iter()
                .map(|(name, table)| (name.clone(), Arc::new(table.empty_state())))
                .collect(),
        )
    }

    /// Open a session over `branch`.
    #[must_use]
    pub fn session(&self, branch: Branch) -> Session<'_> {
        Session::new(self, branch)
    }
}

fn build_table(entity: &EntityDeclaration) -> Table {
    let indexed_fields = entity
        .fields()
        .filter(|(_, descriptor)| descriptor.kind().is_indexed())
        .map(|(name, _)| name.to_string())
        .collect();

    Table::new(
        entity.name(),
        entity.id_attribute(),
        entity.id_kind(),
        indexed_fields,
        entity.declared_layout().cloned().unwrap_or_default(),
    )
}

// ----------------------------------------------------------------------
// Phase 1: names and field-local rules
// ----------------------------------------------------------------------

fn validate_names(entities: &[EntityDeclaration], errs: &mut Vec<String>) {
    let mut seen = BTreeSet::new();
    for entity in entities {
        if !seen.insert(entity.name()) {
            errs.push(format!("duplicate entity name '{}'", entity.name()));
        }

        let mut fields = BTreeSet::new();
        for (field, _) in entity.fields() {
            if !fields.insert(field) {
                errs.push(format!(
                    "entity '{}' declares field '{field}' more than once",
                    entity.name()
                ));
            }
        }
    }
}

fn validate_fields(entities: &[EntityDeclaration], errs: &mut Vec<String>) {
    let known: BTreeSet<&str> = entities.iter().map(EntityDeclaration::name).collect();

    for entity in entities {
        let name = entity.name();

        if let Some(descriptor) = entity.get_field(entity.id_attribute())
            && descriptor.kind().is_relation()
        {
            errs.push(format!(
                "entity '{name}' uses relation field '{}' as its id attribute",
                entity.id_attribute()
            ));
        }

        for (field, descriptor) in entity.fields() {
            let kind = descriptor.kind();
            let has_relation_options = descriptor.declared_related_name().is_some()
                || descriptor.declared_through().is_some()
                || descriptor.declared_through_fields().is_some();

            match kind {
                FieldKind::Attribute => {
                    if has_relation_options {
                        errs.push(format!(
                            "attribute '{name}.{field}' carries relation options"
                        ));
                    }
                    continue;
                }
                FieldKind::ForeignKey | FieldKind::OneToOne => {
                    if descriptor.declared_through().is_some()
                        || descriptor.declared_through_fields().is_some()
                    {
                        errs.push(format!(
                            "{} '{name}.{field}' cannot declare a through-entity",
                            kind.label()
                        ));
                    }
                }
                FieldKind::ManyToMany => match descriptor.declared_through() {
                    Some(through) if !known.contains(through) => errs.push(format!(
                        "many-to-many '{name}.{field}' names unknown through-entity '{through}'"
                    )),
                    None if descriptor.declared_through_fields().is_some() => errs.push(format!(
                        "many-to-many '{name}.{field}' declares through fields without a through-entity"
                    )),
                    _ => {}
                },
            }

            if descriptor.default().is_some() {
                errs.push(format!(
                    "{} '{name}.{field}' cannot declare a default",
                    kind.label()
                ));
            }

            match descriptor.target() {
                Some(target) if known.contains(target) => {}
                Some(target) => errs.push(format!(
                    "{} '{name}.{field}' targets unknown entity '{target}'",
                    kind.label()
                )),
                None => errs.push(format!(
                    "{} '{name}.{field}' has no target entity",
                    kind.label()
                )),
            }
        }
    }
}

// Implicit through-entity for every many-to-many without a declared one.
// Returns the synthesized names.
fn synthesize_through_entities(
    entities: &mut Vec<EntityDeclaration>,
    errs: &mut Vec<String>,
) -> BTreeSet<String> {
    let mut synthesized = Vec::new();

    for entity in entities.iter_mut() {
        let source = entity.name().to_string();
        let mut rewritten = Vec::new();

        for (field, descriptor) in entity.fields() {
            if descriptor.kind() != FieldKind::ManyToMany || descriptor.declared_through().is_some()
            {
                continue;
            }
            let Some(target) = descriptor.target() else {
                continue;
            };

            let through = format!("{source}{}", field.to_case(Case::Pascal));
            let from = format!("from{source}Id");
            let to = format!("to{target}Id");

            synthesized.push(
                EntityDeclaration::new(&through)
                    .field(&from, FieldDescriptor::fk(&source))
                    .field(&to, FieldDescriptor::fk(target)),
            );
            rewritten.push((field.to_string(), through, ThroughFields { from, to }));
        }

        for (field, through, fields) in rewritten {
            entity.bind_through(&field, through, fields);
        }
    }

    let mut names = BTreeSet::new();
    for through in synthesized {
        let name = through.name().to_string();
        if entities.iter().any(|entity| entity.name() == name) || !names.insert(name.clone()) {
            errs.push(format!(
                "implicit through-entity '{name}' collides with an existing entity"
            ));
            continue;
        }
        entities.push(through);
    }

    names
}

// ----------------------------------------------------------------------
// Phase 2: relation graph
// ----------------------------------------------------------------------

fn build_relation_graph(
    entities: &[EntityDeclaration],
    implicit: &BTreeSet<String>,
    errs: &mut Vec<String>,
) -> RelationGraph {
    let by_name: BTreeMap<&str, &EntityDeclaration> =
        entities.iter().map(|entity| (entity.name(), entity)).collect();
    let mut graph = RelationGraph::default();

    // Forward accessors are the declared field names themselves.
    for entity in entities {
        for (field, descriptor) in entity.fields() {
            let Some(target) = descriptor.target() else {
                continue;
            };
            if descriptor.kind().is_indexed() {
                graph.add_accessor(
                    entity.name(),
                    field,
                    Accessor::Forward {
                        field: field.to_string(),
                        target: target.to_string(),
                    },
                );
            }
        }
    }

    for entity in entities {
        let source = entity.name();

        for (field, descriptor) in entity.fields() {
            let Some(target) = descriptor.target() else {
                continue;
            };

            match descriptor.kind() {
                FieldKind::Attribute => {}
                kind @ (FieldKind::ForeignKey | FieldKind::OneToOne) => {
                    graph.add_incoming(
                        target,
                        IncomingEdge {
                            source: source.to_string(),
                            field: field.to_string(),
                            kind,
                        },
                    );
                    if implicit.contains(source) {
                        continue;
                    }

                    let (name, accessor) = if kind == FieldKind::OneToOne {
                        (
                            descriptor
                                .declared_related_name()
                                .map_or_else(|| source.to_lowercase(), str::to_string),
                            Accessor::ReverseOne {
                                source: source.to_string(),
                                field: field.to_string(),
                            },
                        )
                    } else {
                        (
                            reverse_name(source, descriptor),
                            Accessor::Reverse {
                                source: source.to_string(),
                                field: field.to_string(),
                            },
                        )
                    };
                    install_reverse(&mut graph, &by_name, target, &name, accessor, errs);
                }
                FieldKind::ManyToMany => {
                    let Some(link) = resolve_many_link(&by_name, source, field, descriptor, errs)
                    else {
                        continue;
                    };

                    let reverse = ManyLink {
                        through: link.through.clone(),
                        self_field: link.other_field.clone(),
                        other_field: link.self_field.clone(),
                        other: source.to_string(),
                    };
                    graph.add_accessor(source, field, Accessor::Many(link.clone()));
                    graph.add_many_field(source, field, link);

                    let name = reverse_name(source, descriptor);
                    install_reverse(&mut graph, &by_name, target, &name, Accessor::Many(reverse), errs);
                }
            }
        }
    }

    graph
}

fn reverse_name(source: &str, descriptor: &FieldDescriptor) -> String {
    descriptor
        .declared_related_name()
        .map_or_else(|| format!("{}Set", source.to_lowercase()), str::to_string)
}

fn install_reverse(
    graph: &mut RelationGraph,
    by_name: &BTreeMap<&str, &EntityDeclaration>,
    target: &str,
    name: &str,
    accessor: Accessor,
    errs: &mut Vec<String>,
) {
    let shadows_field = by_name.get(target).is_some_and(|entity| {
        entity.id_attribute() == name || entity.get_field(name).is_some()
    });

    if shadows_field || !graph.add_accessor(target, name, accessor) {
        errs.push(format!(
            "reverse accessor '{name}' collides with an existing field or accessor on '{target}'"
        ));
    }
}

// Find the through-entity foreign keys for one many-to-many field.
fn resolve_many_link(
    by_name: &BTreeMap<&str, &EntityDeclaration>,
    source: &str,
    field: &str,
    descriptor: &FieldDescriptor,
    errs: &mut Vec<String>,
) -> Option<ManyLink> {
    let target = descriptor.target()?;
    let through_name = descriptor.declared_through()?;
    let through = by_name.get(through_name)?;

    let fk_to = |name: &str, entity: &str| {
        through.get_field(name).is_some_and(|fk| {
            fk.kind() == FieldKind::ForeignKey && fk.target() == Some(entity)
        })
    };

    let fields = if let Some(explicit) = descriptor.declared_through_fields() {
        if !fk_to(&explicit.from, source) || !fk_to(&explicit.to, target) {
            errs.push(format!(
                "many-to-many '{source}.{field}': through fields ('{}', '{}') must be foreign keys on '{through_name}' to '{source}' and '{target}'",
                explicit.from, explicit.to
            ));
            return None;
        }
        explicit.clone()
    } else if source == target {
        errs.push(format!(
            "self-referential many-to-many '{source}.{field}' requires explicit through fields"
        ));
        return None;
    } else {
        let single_fk = |entity: &str| {
            let mut candidates = through
                .fields()
                .filter(|(_, fk)| fk.kind() == FieldKind::ForeignKey && fk.target() == Some(entity))
                .map(|(name, _)| name.to_string());
            match (candidates.next(), candidates.next()) {
                (Some(name), None) => Some(name),
                _ => None,
            }
        };

        let (Some(from), Some(to)) = (single_fk(source), single_fk(target)) else {
            errs.push(format!(
                "many-to-many '{source}.{field}': through-entity '{through_name}' needs exactly one foreign key to '{source}' and one to '{target}'"
            ));
            return None;
        };
        ThroughFields { from, to }
    };

    Some(ManyLink {
        through: through_name.to_string(),
        self_field: fields.from,
        other_field: fields.to,
        other: target.to_string(),
    })
}
