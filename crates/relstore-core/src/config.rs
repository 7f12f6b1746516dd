//! Module: config
//! Responsibility: TOML-backed store configuration (table layouts, session policy).
//! Does not own: schema validation; the registry applies and checks overrides.

use crate::{error::Error, model::TableLayout};
use serde::Deserialize;
use std::{collections::BTreeMap, path::Path};

///
/// StoreConfig
///
/// ```toml
/// [defaults]
/// items_key = "ids"
///
/// [session]
/// debug = true
///
/// [entities.Book]
/// items_by_id_key = "byTitle"
/// ```
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Layout keys for every entity that does not declare its own layout.
    pub defaults: LayoutOverride,
    pub session: SessionConfig,
    /// Per-entity layout keys; these win over declared layouts key by key.
    pub entities: BTreeMap<String, LayoutOverride>,
}

impl StoreConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml(source: &str) -> Result<Self, Error> {
        toml::from_str(source).map_err(|err| Error::Config(err.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let source = std::fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))?;

        Self::from_toml(&source)
    }

    /// Resolve the layout for one entity, key by key: entity override, then
    /// declared layout, then `[defaults]`, then the built-in names.
    #[must_use]
    pub fn layout_for(&self, entity: &str, declared: Option<&TableLayout>) -> TableLayout {
        let mut layout = declared.cloned().unwrap_or_else(|| {
            let mut base = TableLayout::default();
            self.defaults.apply(&mut base);
            base
        });
        if let Some(entity_override) = self.entities.get(entity) {
            entity_override.apply(&mut layout);
        }

        layout
    }
}

///
/// LayoutOverride
///
/// Partial `TableLayout`; only the keys present replace the layout below.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutOverride {
    pub items_key: Option<String>,
    pub items_by_id_key: Option<String>,
}

impl LayoutOverride {
    fn apply(&self, layout: &mut TableLayout) {
        if let Some(key) = &self.items_key {
            layout.items_key.clone_from(key);
        }
        if let Some(key) = &self.items_by_id_key {
            layout.items_by_id_key.clone_from(key);
        }
    }
}

///
/// SessionConfig
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Emit a per-operation summary for every mutation.
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_section() {
        let config = StoreConfig::from_toml(
            r#"
            [defaults]
            items_key = "ids"

            [session]
            debug = true

            [entities.Book]
            items_by_id_key = "byTitle"
            "#,
        )
        .expect("config should parse");

        assert!(config.session.debug);
        let book = config.layout_for("Book", None);
        assert_eq!(book.items_key, "ids", "unset override keys fall back to [defaults]");
        assert_eq!(book.items_by_id_key, "byTitle");

        let other = config.layout_for("Publisher", None);
        assert_eq!(other.items_key, "ids");
        assert_eq!(other.items_by_id_key, "itemsById");
    }

    #[test]
    fn declared_layout_beats_defaults_but_not_overrides() {
        let config = StoreConfig::from_toml("[defaults]\nitems_key = \"ids\"\n").unwrap();
        let declared = TableLayout {
            items_key: "order".to_string(),
            ..TableLayout::default()
        };

        assert_eq!(config.layout_for("Book", Some(&declared)).items_key, "order");
    }

    #[test]
    fn entity_override_merges_over_declared_layout() {
        let config = StoreConfig::from_toml("[entities.Book]\nitems_by_id_key = \"byTitle\"\n")
            .unwrap();
        let declared = TableLayout {
            items_key: "order".to_string(),
            ..TableLayout::default()
        };

        let layout = config.layout_for("Book", Some(&declared));
        assert_eq!(layout.items_key, "order");
        assert_eq!(layout.items_by_id_key, "byTitle");
    }

    #[test]
    fn unknown_keys_are_config_errors() {
        let err = StoreConfig::from_toml("[session]\nverbose = true\n").expect_err("unknown key");
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn empty_source_is_default() {
        assert_eq!(StoreConfig::from_toml("").unwrap(), StoreConfig::default());
    }
}
