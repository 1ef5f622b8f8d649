//! Tab projections: the open-graph strip and the right-panel detail tabs
//!
//! Both are UI state derived from (never authoritative over) the entity graph.
//! The store checks entity existence; these types only keep their own
//! ordering and "exactly one active" rules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::store_models::EntityKind;
use super::StoreError;

/// Ordered list of open graphs with at most one active
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphTabs {
    pub open_graph_ids: Vec<String>,
    pub active_graph_id: Option<String>,
    pub active_definition_node_id: Option<String>,
    #[serde(default)]
    pub expanded_graph_ids: BTreeSet<String>,
}

impl GraphTabs {
    pub fn is_open(&self, graph_id: &str) -> bool {
        self.open_graph_ids.iter().any(|id| id == graph_id)
    }

    pub fn position(&self, graph_id: &str) -> Option<usize> {
        self.open_graph_ids.iter().position(|id| id == graph_id)
    }

    /// Open (appending) or re-activate a graph tab. Never duplicates.
    pub fn open(&mut self, graph_id: &str, definition_node_id: Option<String>) {
        if !self.is_open(graph_id) {
            self.open_graph_ids.push(graph_id.to_string());
        }
        self.active_graph_id = Some(graph_id.to_string());
        self.active_definition_node_id = definition_node_id;
    }

    pub fn activate(
        &mut self,
        graph_id: &str,
        definition_node_id: Option<String>,
    ) -> Result<(), StoreError> {
        if !self.is_open(graph_id) {
            return Err(StoreError::not_found(EntityKind::GraphTab, graph_id));
        }
        self.active_graph_id = Some(graph_id.to_string());
        self.active_definition_node_id = definition_node_id;
        Ok(())
    }

    /// Close a tab. Returns true when the active graph changed.
    ///
    /// Closing the active tab activates its left neighbour, else the new
    /// first tab, else nothing.
    pub fn close(&mut self, graph_id: &str) -> Result<bool, StoreError> {
        let pos = self
            .position(graph_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::GraphTab, graph_id))?;
        self.open_graph_ids.remove(pos);
        self.expanded_graph_ids.remove(graph_id);

        if self.active_graph_id.as_deref() != Some(graph_id) {
            return Ok(false);
        }

        let next = if pos > 0 {
            self.open_graph_ids.get(pos - 1)
        } else {
            self.open_graph_ids.first()
        };
        self.active_graph_id = next.cloned();
        self.active_definition_node_id = None;
        Ok(true)
    }

    /// Returns whether the graph is now expanded
    pub fn toggle_expanded(&mut self, graph_id: &str) -> bool {
        if self.expanded_graph_ids.remove(graph_id) {
            false
        } else {
            self.expanded_graph_ids.insert(graph_id.to_string());
            true
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RightPanelTabKind {
    Home,
    #[serde(rename_all = "camelCase")]
    Node { node_id: String },
}

/// A pinned detail view; title/subtitle are cached copies of prototype fields
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RightPanelTab {
    pub kind: RightPanelTabKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    pub is_active: bool,
}

impl RightPanelTab {
    fn home(is_active: bool) -> Self {
        Self {
            kind: RightPanelTabKind::Home,
            title: "Home".to_string(),
            subtitle: String::new(),
            is_active,
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        match &self.kind {
            RightPanelTabKind::Node { node_id } => Some(node_id),
            RightPanelTabKind::Home => None,
        }
    }
}

/// Right-panel tabs. Index 0 is the permanent home tab.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RightPanelTabs {
    tabs: Vec<RightPanelTab>,
}

impl Default for RightPanelTabs {
    fn default() -> Self {
        Self {
            tabs: vec![RightPanelTab::home(true)],
        }
    }
}

impl RightPanelTabs {
    pub fn tabs(&self) -> &[RightPanelTab] {
        &self.tabs
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.tabs.iter().position(|t| t.is_active)
    }

    pub fn find_node(&self, node_id: &str) -> Option<usize> {
        self.tabs.iter().position(|t| t.node_id() == Some(node_id))
    }

    pub fn open_node(&mut self, node_id: &str, title: &str, subtitle: &str) -> usize {
        let index = match self.find_node(node_id) {
            Some(index) => {
                self.tabs[index].title = title.to_string();
                self.tabs[index].subtitle = subtitle.to_string();
                index
            }
            None => {
                self.tabs.push(RightPanelTab {
                    kind: RightPanelTabKind::Node {
                        node_id: node_id.to_string(),
                    },
                    title: title.to_string(),
                    subtitle: subtitle.to_string(),
                    is_active: false,
                });
                self.tabs.len() - 1
            }
        };
        self.set_active(index);
        index
    }

    pub fn activate(&mut self, index: usize) -> Result<(), StoreError> {
        self.check_index(index)?;
        self.set_active(index);
        Ok(())
    }

    pub fn close(&mut self, index: usize) -> Result<(), StoreError> {
        if index == 0 {
            return Err(StoreError::HomeTabLocked);
        }
        self.check_index(index)?;
        let removed = self.tabs.remove(index);
        if removed.is_active {
            self.set_active(index - 1);
        }
        Ok(())
    }

    pub fn move_tab(&mut self, from: usize, to: usize) -> Result<(), StoreError> {
        if from == 0 || to == 0 {
            return Err(StoreError::HomeTabLocked);
        }
        self.check_index(from)?;
        self.check_index(to)?;
        let tab = self.tabs.remove(from);
        self.tabs.insert(to, tab);
        Ok(())
    }

    /// Refresh cached fields of the node's tab, if one is open
    pub fn resync(&mut self, node_id: &str, title: &str, subtitle: &str) -> bool {
        match self.find_node(node_id) {
            Some(index) => {
                self.tabs[index].title = title.to_string();
                self.tabs[index].subtitle = subtitle.to_string();
                true
            }
            None => false,
        }
    }

    /// Drop the node's tab (the node is gone)
    pub fn forget_node(&mut self, node_id: &str) {
        if let Some(index) = self.find_node(node_id) {
            // index is never 0 for node tabs
            let _ = self.close(index);
        }
    }

    fn check_index(&self, index: usize) -> Result<(), StoreError> {
        if index < self.tabs.len() {
            Ok(())
        } else {
            Err(StoreError::not_found(
                EntityKind::RightPanelTab,
                &index.to_string(),
            ))
        }
    }

    fn set_active(&mut self, index: usize) {
        for (i, tab) in self.tabs.iter_mut().enumerate() {
            tab.is_active = i == index;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tabs_with(ids: &[&str]) -> GraphTabs {
        let mut tabs = GraphTabs::default();
        for id in ids {
            tabs.open(id, None);
        }
        tabs
    }

    #[test]
    fn test_reopen_does_not_duplicate() {
        let mut tabs = tabs_with(&["a", "b"]);
        tabs.open("a", None);
        assert_eq!(tabs.open_graph_ids, vec!["a", "b"]);
        assert_eq!(tabs.active_graph_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_close_active_activates_left_neighbour() {
        let mut tabs = tabs_with(&["a", "b", "c"]);
        tabs.activate("b", None).unwrap();
        assert!(tabs.close("b").unwrap());
        assert_eq!(tabs.active_graph_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_close_leftmost_active_activates_new_first() {
        let mut tabs = tabs_with(&["a", "b", "c"]);
        tabs.activate("a", None).unwrap();
        tabs.close("a").unwrap();
        assert_eq!(tabs.active_graph_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_close_last_tab_leaves_none_active() {
        let mut tabs = tabs_with(&["a"]);
        tabs.close("a").unwrap();
        assert!(tabs.active_graph_id.is_none());
        assert!(tabs.open_graph_ids.is_empty());
    }

    #[test]
    fn test_close_inactive_keeps_active() {
        let mut tabs = tabs_with(&["a", "b", "c"]);
        assert!(!tabs.close("a").unwrap());
        assert_eq!(tabs.active_graph_id.as_deref(), Some("c"));
    }

    #[test]
    fn test_close_unknown_tab_fails() {
        let mut tabs = tabs_with(&["a"]);
        assert!(matches!(
            tabs.close("zzz"),
            Err(StoreError::NotFound { kind: EntityKind::GraphTab, .. })
        ));
    }

    #[test]
    fn test_home_tab_is_locked() {
        let mut panel = RightPanelTabs::default();
        panel.open_node("p1", "Dog", "");
        assert!(matches!(panel.close(0), Err(StoreError::HomeTabLocked)));
        assert!(matches!(panel.move_tab(1, 0), Err(StoreError::HomeTabLocked)));
        assert!(matches!(panel.move_tab(0, 1), Err(StoreError::HomeTabLocked)));
    }

    #[test]
    fn test_right_panel_open_close_and_move() {
        let mut panel = RightPanelTabs::default();
        panel.open_node("p1", "Dog", "");
        panel.open_node("p2", "Cat", "");
        panel.open_node("p3", "Fox", "");
        assert_eq!(panel.active_index(), Some(3));

        panel.move_tab(3, 1).unwrap();
        assert_eq!(panel.tabs()[1].node_id(), Some("p3"));
        assert_eq!(panel.active_index(), Some(1));

        // reopening activates rather than duplicating
        assert_eq!(panel.open_node("p2", "Cat", "small"), 3);
        assert_eq!(panel.len(), 4);

        panel.close(3).unwrap();
        assert_eq!(panel.active_index(), Some(2));
        assert_eq!(panel.tabs()[2].node_id(), Some("p1"));
    }
}
