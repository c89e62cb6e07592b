//! Persisted graph sets and user-curated set views.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use super::parameter::ParameterKey;

/// A named snapshot of the full graph and parameter state on the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphSetRecord {
    /// Name, the primary key.
    pub name: String,
    /// Loaded automatically when the runner starts.
    pub initial: bool,
    /// Most recently loaded or saved.
    pub latest: bool,
}

impl GraphSetRecord {
    /// Set with both flags cleared.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial: false,
            latest: false,
        }
    }
}

/// An ordered, curated parameter subset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphSetViewRecord {
    /// Runner-assigned id.
    pub id: u32,
    /// Display name.
    pub name: String,
    params: Vec<ParameterKey>,
    #[serde(skip)]
    membership: HashSet<ParameterKey>,
}

impl GraphSetViewRecord {
    /// Empty view.
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            params: Vec::new(),
            membership: HashSet::new(),
        }
    }

    /// Member parameters in display order.
    #[must_use]
    pub fn params(&self) -> &[ParameterKey] {
        &self.params
    }

    /// O(1) membership check.
    #[must_use]
    pub fn contains(&self, key: ParameterKey) -> bool {
        self.membership.contains(&key)
    }

    /// Replace the member list. Repeated keys keep their first position.
    pub fn set_params(&mut self, params: impl IntoIterator<Item = ParameterKey>) {
        self.membership.clear();
        self.params = params
            .into_iter()
            .filter(|key| self.membership.insert(*key))
            .collect();
    }

    /// Replace the member list from `"<instance>:<index>"` entries, skipping
    /// malformed ones.
    pub fn set_params_from_entries<S: AsRef<str>>(&mut self, entries: &[S]) {
        let keys: Vec<ParameterKey> = entries
            .iter()
            .filter_map(|entry| match entry.as_ref().parse() {
                Ok(key) => Some(key),
                Err(e) => {
                    log::warn!("[Sets] View {}: skipping entry: {}", self.id, e);
                    None
                }
            })
            .collect();
        self.set_params(keys);
    }
}

/// Sets, the current-set marker, and set views.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SetCollection {
    sets: BTreeMap<String, GraphSetRecord>,
    current: Option<String>,
    dirty: bool,
    initial: Option<String>,
    views: BTreeMap<u32, GraphSetViewRecord>,
    view_order: Vec<u32>,
}

impl SetCollection {
    /// Set by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&GraphSetRecord> {
        self.sets.get(name)
    }

    /// All sets, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &GraphSetRecord> {
        self.sets.values()
    }

    /// Number of sets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Whether there are no sets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Name of the currently loaded set.
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Whether the loaded set has unsaved changes.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Replace the set list. Flags are re-derived from the current and
    /// initial markers.
    pub fn replace_sets<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sets = names
            .into_iter()
            .map(Into::into)
            .filter(|name: &String| !name.is_empty())
            .map(|name| (name.clone(), GraphSetRecord::new(name)))
            .collect();
        self.refresh_flags();
    }

    /// Add a set if missing. Returns `true` if it was new.
    pub fn upsert(&mut self, name: &str) -> bool {
        if name.is_empty() || self.sets.contains_key(name) {
            return false;
        }
        self.sets
            .insert(name.to_string(), GraphSetRecord::new(name));
        self.refresh_flags();
        true
    }

    /// Remove a set. Returns `true` if it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        self.sets.remove(name).is_some()
    }

    /// Record the currently loaded set. An empty name clears it.
    pub fn set_current(&mut self, name: &str) {
        self.current = (!name.is_empty()).then(|| name.to_string());
        if let Some(name) = &self.current {
            if !self.sets.contains_key(name) {
                self.sets
                    .insert(name.clone(), GraphSetRecord::new(name.clone()));
            }
        }
        self.refresh_flags();
    }

    /// Record whether the loaded set has unsaved changes.
    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Record the startup set. An empty name clears it.
    pub fn set_initial(&mut self, name: &str) {
        self.initial = (!name.is_empty()).then(|| name.to_string());
        self.refresh_flags();
    }

    fn refresh_flags(&mut self) {
        for set in self.sets.values_mut() {
            set.latest = self.current.as_deref() == Some(set.name.as_str());
            set.initial = self.initial.as_deref() == Some(set.name.as_str());
        }
    }

    /// View by id.
    #[must_use]
    pub fn view(&self, id: u32) -> Option<&GraphSetViewRecord> {
        self.views.get(&id)
    }

    /// All views, ordered by id.
    pub fn views(&self) -> impl Iterator<Item = &GraphSetViewRecord> {
        self.views.values()
    }

    /// Views in the runner's display order. Ids without a view are skipped.
    pub fn ordered_views(&self) -> impl Iterator<Item = &GraphSetViewRecord> {
        self.view_order.iter().filter_map(|id| self.views.get(id))
    }

    /// Display order of view ids.
    #[must_use]
    pub fn view_order(&self) -> &[u32] {
        &self.view_order
    }

    /// Insert or replace a whole view.
    pub fn upsert_view(&mut self, view: GraphSetViewRecord) {
        self.views.insert(view.id, view);
    }

    /// Mutable view access, creating an unnamed view if missing.
    pub fn view_entry(&mut self, id: u32) -> &mut GraphSetViewRecord {
        self.views
            .entry(id)
            .or_insert_with(|| GraphSetViewRecord::new(id, String::new()))
    }

    /// Remove a view and its place in the display order.
    pub fn remove_view(&mut self, id: u32) -> Option<GraphSetViewRecord> {
        self.view_order.retain(|v| *v != id);
        self.views.remove(&id)
    }

    /// Keep only the listed views.
    pub fn retain_views(&mut self, ids: &HashSet<u32>) {
        self.views.retain(|id, _| ids.contains(id));
        self.view_order.retain(|id| ids.contains(id));
    }

    /// Replace the display order. Repeated ids keep their first position.
    pub fn set_view_order(&mut self, order: impl IntoIterator<Item = u32>) {
        let mut seen = HashSet::new();
        self.view_order = order.into_iter().filter(|id| seen.insert(*id)).collect();
    }

    /// Drop every parameter of `instance` from all views.
    pub fn forget_instance(&mut self, instance: u32) {
        for view in self.views.values_mut() {
            if view.params.iter().any(|k| k.instance == instance) {
                let kept: Vec<ParameterKey> = view
                    .params
                    .iter()
                    .copied()
                    .filter(|k| k.instance != instance)
                    .collect();
                view.set_params(kept);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_marks_latest() {
        let mut sets = SetCollection::default();
        sets.replace_sets(["Factory", "Live"]);
        sets.set_current("Factory");
        assert_eq!(sets.current(), Some("Factory"));
        assert!(sets.get("Factory").unwrap().latest);
        assert!(!sets.get("Live").unwrap().latest);

        sets.set_current("Live");
        assert!(!sets.get("Factory").unwrap().latest);
    }

    #[test]
    fn test_flags_survive_list_refresh() {
        let mut sets = SetCollection::default();
        sets.set_initial("Live");
        sets.replace_sets(["Factory", "Live", ""]);
        assert_eq!(sets.len(), 2);
        assert!(sets.get("Live").unwrap().initial);
    }

    #[test]
    fn test_view_membership_dedupes() {
        let mut view = GraphSetViewRecord::new(1, "Mix");
        view.set_params_from_entries(&["0:1", "1:0", "0:1", "junk"]);
        assert_eq!(view.params(), &[ParameterKey::new(0, 1), ParameterKey::new(1, 0)]);
        assert!(view.contains(ParameterKey::new(1, 0)));
        assert!(!view.contains(ParameterKey::new(2, 0)));
    }

    #[test]
    fn test_remove_view_prunes_order() {
        let mut sets = SetCollection::default();
        sets.upsert_view(GraphSetViewRecord::new(1, "A"));
        sets.upsert_view(GraphSetViewRecord::new(2, "B"));
        sets.set_view_order([2, 1, 2]);
        assert_eq!(sets.view_order(), &[2, 1]);

        sets.remove_view(2);
        assert_eq!(sets.view_order(), &[1]);
        assert_eq!(sets.ordered_views().count(), 1);
    }

    #[test]
    fn test_forget_instance() {
        let mut sets = SetCollection::default();
        sets.view_entry(1).set_params([ParameterKey::new(0, 0), ParameterKey::new(1, 0)]);
        sets.forget_instance(0);
        let view = sets.view(1).unwrap();
        assert_eq!(view.params(), &[ParameterKey::new(1, 0)]);
        assert!(!view.contains(ParameterKey::new(0, 0)));
    }
}
