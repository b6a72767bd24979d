use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;

use crate::action::{ActionDescriptor, RiskLevel};
use crate::error::{OrbitError, Result};

/// Catalog counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub total: usize,
    pub categories: usize,
    /// Always contains all four levels.
    pub by_risk: BTreeMap<RiskLevel, usize>,
}

/// Name-unique catalog of actions with a category index.
///
/// Listings are returned in registration order as owned snapshots.
#[derive(Debug, Default)]
pub struct Registry {
    actions: HashMap<String, Arc<ActionDescriptor>>,
    order: Vec<String>,
    categories: Vec<(String, Vec<String>)>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns [`OrbitError::DuplicateAction`] if the name is taken, or
    /// [`OrbitError::InvalidDescriptor`] if the descriptor is malformed.
    /// The catalog is unchanged on error.
    pub fn register(&mut self, action: ActionDescriptor) -> Result<()> {
        if self.actions.contains_key(&action.name) {
            return Err(OrbitError::DuplicateAction { name: action.name });
        }
        action
            .check_invariants()
            .map_err(|message| OrbitError::InvalidDescriptor {
                name: action.name.clone(),
                message,
            })?;

        let name = action.name.clone();
        match self.categories.iter_mut().find(|(c, _)| *c == action.category) {
            Some((_, names)) => names.push(name.clone()),
            None => self
                .categories
                .push((action.category.clone(), vec![name.clone()])),
        }
        tracing::debug!(action = %name, category = %action.category, risk = %action.risk_level, "registered action");
        self.order.push(name.clone());
        self.actions.insert(name, Arc::new(action));
        Ok(())
    }

    /// Register in order, stopping at the first failure. Earlier actions stay registered.
    ///
    /// # Errors
    ///
    /// Returns the first registration error.
    pub fn register_all(&mut self, actions: impl IntoIterator<Item = ActionDescriptor>) -> Result<()> {
        for action in actions {
            self.register(action)?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`OrbitError::ActionNotFound`] if no action has this name.
    pub fn unregister(&mut self, name: &str) -> Result<Arc<ActionDescriptor>> {
        let action = self
            .actions
            .remove(name)
            .ok_or_else(|| OrbitError::ActionNotFound {
                name: name.to_owned(),
            })?;
        self.order.retain(|n| n != name);
        if let Some(pos) = self.categories.iter().position(|(c, _)| *c == action.category) {
            let names = &mut self.categories[pos].1;
            names.retain(|n| n != name);
            if names.is_empty() {
                self.categories.remove(pos);
            }
        }
        tracing::debug!(action = %name, "unregistered action");
        Ok(action)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ActionDescriptor>> {
        self.actions.get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = &Arc<ActionDescriptor>> {
        self.order.iter().filter_map(|n| self.actions.get(n))
    }

    #[must_use]
    pub fn list_all(&self) -> Vec<Arc<ActionDescriptor>> {
        self.iter().cloned().collect()
    }

    #[must_use]
    pub fn list_by_category(&self, category: &str) -> Vec<Arc<ActionDescriptor>> {
        self.categories
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, names)| names.iter().filter_map(|n| self.get(n)).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn list_by_risk(&self, level: RiskLevel) -> Vec<Arc<ActionDescriptor>> {
        self.iter()
            .filter(|a| a.risk_level == level)
            .cloned()
            .collect()
    }

    /// Category names in first-registration order.
    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        self.categories.iter().map(|(c, _)| c.clone()).collect()
    }

    /// Case-insensitive substring match on name and description.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<Arc<ActionDescriptor>> {
        let needle = query.to_lowercase();
        self.iter()
            .filter(|a| {
                a.name.to_lowercase().contains(&needle)
                    || a.description.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn stats(&self) -> CatalogStats {
        let mut by_risk: BTreeMap<RiskLevel, usize> =
            RiskLevel::ALL.iter().map(|&l| (l, 0)).collect();
        for action in self.actions.values() {
            *by_risk.entry(action.risk_level).or_default() += 1;
        }
        CatalogStats {
            total: self.actions.len(),
            categories: self.categories.len(),
            by_risk,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ArgValue, ParamType, ParameterSpec};

    fn action(name: &str, category: &str, level: RiskLevel) -> ActionDescriptor {
        ActionDescriptor::new(name, &format!("{name} action"), category, level, "return 1")
    }

    fn names(list: &[Arc<ActionDescriptor>]) -> Vec<&str> {
        list.iter().map(|a| a.name.as_str()).collect()
    }

    fn sample() -> Registry {
        let mut r = Registry::new();
        r.register_all([
            action("file_list", "files", RiskLevel::Safe),
            action("music_play", "music", RiskLevel::Safe),
            action("file_delete", "files", RiskLevel::Dangerous),
            action("system_shutdown", "system", RiskLevel::Critical),
        ])
        .unwrap();
        r
    }

    #[test]
    fn register_and_get() {
        let r = sample();
        assert_eq!(r.len(), 4);
        assert!(!r.is_empty());
        assert!(r.contains("file_list"));
        assert_eq!(r.get("music_play").unwrap().category, "music");
        assert!(r.get("nope").is_none());
    }

    #[test]
    fn duplicate_rejected_and_catalog_unchanged() {
        let mut r = sample();
        let err = r
            .register(action("file_list", "other", RiskLevel::Critical))
            .unwrap_err();
        assert!(matches!(err, OrbitError::DuplicateAction { ref name } if name == "file_list"));
        assert_eq!(r.len(), 4);
        assert_eq!(r.get("file_list").unwrap().category, "files");
        assert_eq!(r.categories(), vec!["files", "music", "system"]);
    }

    #[test]
    fn invalid_descriptor_rejected() {
        let mut r = Registry::new();
        let bad = action("bad", "x", RiskLevel::Safe).with_parameter(ParameterSpec {
            required: true,
            ..ParameterSpec::optional("n", ParamType::Integer, "N", Some(ArgValue::Integer(1)))
        });
        let err = r.register(bad).unwrap_err();
        assert!(matches!(err, OrbitError::InvalidDescriptor { .. }));
        assert!(r.is_empty());
        assert!(r.categories().is_empty());
    }

    #[test]
    fn register_all_stops_at_first_error() {
        let mut r = Registry::new();
        let err = r
            .register_all([
                action("a", "x", RiskLevel::Safe),
                action("a", "x", RiskLevel::Safe),
                action("b", "x", RiskLevel::Safe),
            ])
            .unwrap_err();
        assert!(matches!(err, OrbitError::DuplicateAction { .. }));
        assert_eq!(names(&r.list_all()), vec!["a"]);
    }

    #[test]
    fn listings_keep_registration_order() {
        let r = sample();
        assert_eq!(
            names(&r.list_all()),
            vec!["file_list", "music_play", "file_delete", "system_shutdown"]
        );
        assert_eq!(
            names(&r.list_by_category("files")),
            vec!["file_list", "file_delete"]
        );
        assert_eq!(names(&r.list_by_risk(RiskLevel::Safe)), vec!["file_list", "music_play"]);
        assert!(r.list_by_category("missing").is_empty());
        assert!(r.list_by_risk(RiskLevel::Moderate).is_empty());
    }

    #[test]
    fn snapshots_unaffected_by_later_mutation() {
        let mut r = sample();
        let before = r.list_by_category("files");
        r.unregister("file_list").unwrap();
        r.register(action("file_copy", "files", RiskLevel::Moderate)).unwrap();
        assert_eq!(names(&before), vec!["file_list", "file_delete"]);
        assert_eq!(
            names(&r.list_by_category("files")),
            vec!["file_delete", "file_copy"]
        );
    }

    #[test]
    fn unregister_updates_both_indices() {
        let mut r = sample();
        let removed = r.unregister("music_play").unwrap();
        assert_eq!(removed.name, "music_play");
        assert!(!r.contains("music_play"));
        assert!(r.list_by_category("music").is_empty());
        assert_eq!(r.categories(), vec!["files", "system"]);
        assert_eq!(r.len(), 3);
    }

    #[test]
    fn unregister_missing_is_not_found() {
        let mut r = sample();
        let err = r.unregister("ghost").unwrap_err();
        assert!(matches!(err, OrbitError::ActionNotFound { ref name } if name == "ghost"));
        assert_eq!(r.len(), 4);
    }

    #[test]
    fn search_is_case_insensitive() {
        let mut r = sample();
        r.register(ActionDescriptor::new(
            "volume_set",
            "Adjust the MUSIC volume",
            "audio",
            RiskLevel::Safe,
            "x",
        ))
        .unwrap();
        assert_eq!(names(&r.search("Music")), vec!["music_play", "volume_set"]);
        assert_eq!(names(&r.search("FILE_")), vec!["file_list", "file_delete"]);
        assert!(r.search("zzz").is_empty());
    }

    #[test]
    fn stats_cover_every_level() {
        let s = sample().stats();
        assert_eq!(s.total, 4);
        assert_eq!(s.categories, 3);
        assert_eq!(s.by_risk.len(), 4);
        assert_eq!(s.by_risk[&RiskLevel::Safe], 2);
        assert_eq!(s.by_risk[&RiskLevel::Moderate], 0);
        assert_eq!(s.by_risk.values().sum::<usize>(), s.total);
    }

    #[test]
    fn empty_registry_stats() {
        let s = Registry::new().stats();
        assert_eq!(s.total, 0);
        assert_eq!(s.categories, 0);
        assert!(s.by_risk.values().all(|&n| n == 0));
    }
}
