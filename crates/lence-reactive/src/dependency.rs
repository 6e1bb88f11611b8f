//! Input → dependent queries map
//!
//! Built in one go from a document's query specs and never patched; a reload
//! builds a new map.

use crate::client::QuerySpec;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyMap {
    /// input name → queries reading it
    dependents: BTreeMap<String, BTreeSet<String>>,

    /// query name → inputs it reads
    params: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyMap {
    pub fn build(specs: &[QuerySpec]) -> Self {
        let mut map = Self::default();
        for spec in specs {
            for input in &spec.params {
                map.dependents
                    .entry(input.clone())
                    .or_default()
                    .insert(spec.name.clone());
            }
            map.params.insert(spec.name.clone(), spec.params.clone());
        }
        map
    }

    /// Queries whose SQL references `input`, ordered by name
    pub fn dependents(&self, input: &str) -> impl Iterator<Item = &str> {
        self.dependents
            .get(input)
            .into_iter()
            .flat_map(|queries| queries.iter().map(String::as_str))
    }

    /// Inputs read by `query`
    pub fn params_of(&self, query: &str) -> Option<&BTreeSet<String>> {
        self.params.get(query)
    }

    pub fn queries(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &str> {
        self.dependents.keys().map(String::as_str)
    }

    pub fn contains(&self, query: &str) -> bool {
        self.params.contains_key(query)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn specs() -> Vec<QuerySpec> {
        vec![
            QuerySpec::from_sql("by_region", "SELECT * FROM o WHERE region = '${inputs.region.value}'"),
            QuerySpec::from_sql(
                "by_region_year",
                "SELECT * FROM o WHERE region = '${inputs.region.value}' AND year = ${inputs.year.value}",
            ),
            QuerySpec::from_sql("all_regions", "SELECT DISTINCT region FROM o"),
        ]
    }

    #[test]
    fn maps_inputs_to_dependents() {
        let map = DependencyMap::build(&specs());

        assert_eq!(map.dependents("region").collect::<Vec<_>>(), vec!["by_region", "by_region_year"]);
        assert_eq!(map.dependents("year").collect::<Vec<_>>(), vec!["by_region_year"]);
        assert_eq!(map.dependents("category").count(), 0);
    }

    #[test]
    fn independent_queries_are_still_known() {
        let map = DependencyMap::build(&specs());

        assert!(map.contains("all_regions"));
        assert!(map.params_of("all_regions").unwrap().is_empty());
        assert_eq!(map.queries().count(), 3);
        assert_eq!(map.inputs().collect::<Vec<_>>(), vec!["region", "year"]);
    }

    #[test]
    fn empty_page() {
        assert!(DependencyMap::build(&[]).is_empty());
    }
}
