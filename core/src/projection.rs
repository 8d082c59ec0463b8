//! Selection of the properties and links that are actually written.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

/// A tree of selected names. `None` at a level selects everything there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Projection {
    pub properties: Option<BTreeSet<String>>,
    /// Selected navigation links, each with the projection of its content.
    pub links: Option<BTreeMap<String, Projection>>,
}

impl Projection {
    /// Selects every property and every link at every level.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_link(mut self, name: impl Into<String>, content: Projection) -> Self {
        self.links
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), content);
        self
    }

    pub fn selects_property(&self, name: &str) -> bool {
        self.properties
            .as_ref()
            .map_or(true, |names| names.contains(name))
    }

    /// The projection for the content of link `name`, or `None` when the
    /// link is not selected.
    pub fn link(&self, name: &str) -> Option<Projection> {
        match &self.links {
            None => Some(Projection::all()),
            Some(links) => links.get(name).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_selects_everything() {
        let projection = Projection::all();
        assert!(projection.selects_property("Anything"));
        assert_eq!(projection.link("Orders"), Some(Projection::all()));
    }

    #[test]
    fn test_explicit_selection() {
        let orders = Projection::all().with_properties(["Total"]);
        let projection = Projection::all()
            .with_properties(["Name"])
            .with_link("Orders", orders.clone());

        assert!(projection.selects_property("Name"));
        assert!(!projection.selects_property("Age"));
        assert_eq!(projection.link("Orders"), Some(orders));
        assert_eq!(projection.link("Address"), None);
    }

    #[test]
    fn test_deserialize() {
        let projection: Projection = serde_json::from_str(
            r#"{"properties": ["Name"], "links": {"Orders": {"properties": ["Total"]}}}"#,
        )
        .unwrap();
        assert!(!projection.selects_property("Age"));
        let orders = projection.link("Orders").unwrap();
        assert!(orders.selects_property("Total"));
        assert!(!orders.selects_property("Id"));
        assert_eq!(orders.link("Lines"), Some(Projection::all()));
    }
}
