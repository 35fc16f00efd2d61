//! Selection prompts.
//!
//! The resolver never renders anything itself. It hands a list of
//! [`SelectableItem`]s to a [`Prompter`] and gets back the chosen item, or
//! `None` when the user dismissed the list.
//!
//! [`SelectList`] holds the presentation-independent part of a list widget:
//! filtering, marking the active item and choosing the empty message. The
//! terminal prompter in the `tibuild` CLI renders it.

use crate::types::BuildError;

/// Message shown when a list has no items at all.
pub const EMPTY_MESSAGE: &str = "No targets found.";
/// Message shown when the filter hides every item.
pub const NO_MATCHES_MESSAGE: &str = "No matches";

/// An entry in a selection list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectableItem {
    /// A single-line label.
    Plain(String),
    /// A label with a secondary line.
    ///
    /// `index` correlates the item with a parallel data list (simulators,
    /// history entries).
    Detailed {
        label: String,
        detail: String,
        index: Option<usize>,
    },
}

impl SelectableItem {
    pub fn plain(label: impl Into<String>) -> Self {
        SelectableItem::Plain(label.into())
    }

    pub fn detailed(label: impl Into<String>, detail: impl Into<String>, index: usize) -> Self {
        SelectableItem::Detailed {
            label: label.into(),
            detail: detail.into(),
            index: Some(index),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            SelectableItem::Plain(label) => label,
            SelectableItem::Detailed { label, .. } => label,
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            SelectableItem::Plain(_) => None,
            SelectableItem::Detailed { detail, .. } => Some(detail),
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            SelectableItem::Plain(_) => None,
            SelectableItem::Detailed { index, .. } => *index,
        }
    }
}

/// Presents a list of items and waits for the user's choice.
///
/// A single prompter is shared by every flow of an orchestrator; starting a
/// new flow simply presents a new list.
pub trait Prompter {
    /// Shows `items`, marking the one whose label equals `active`.
    ///
    /// Returns `Ok(None)` when the user cancels.
    fn present(
        &mut self,
        items: Vec<SelectableItem>,
        active: Option<&str>,
    ) -> Result<Option<SelectableItem>, BuildError>;

    /// Puts the surface in a loading state while a slow query runs.
    fn set_loading(&mut self, message: &str);

    /// Hides the surface once a flow is finished.
    fn hide(&mut self) {}
}

/// A list widget's model: items, filter and active marker.
#[derive(Debug, Clone, Default)]
pub struct SelectList {
    items: Vec<SelectableItem>,
    active: Option<String>,
    filter: String,
    loading: Option<String>,
    visible: bool,
}

impl SelectList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the items, clearing the filter and loading state.
    pub fn set_items(&mut self, items: Vec<SelectableItem>, active: Option<&str>) {
        self.items = items;
        self.active = active.map(str::to_string);
        self.filter.clear();
        self.loading = None;
    }

    pub fn set_loading(&mut self, message: &str) {
        self.loading = Some(message.to_string());
    }

    pub fn loading(&self) -> Option<&str> {
        self.loading.as_deref()
    }

    pub fn set_filter(&mut self, filter: &str) {
        self.filter = filter.trim().to_string();
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Shows the surface. Returns `false` when it was already visible.
    pub fn show(&mut self) -> bool {
        if self.visible {
            return false;
        }
        self.visible = true;
        true
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Items matching the filter, case-insensitively on label or detail.
    pub fn visible_items(&self) -> Vec<&SelectableItem> {
        let needle = self.filter.to_lowercase();
        self.items
            .iter()
            .filter(|item| {
                needle.is_empty()
                    || item.label().to_lowercase().contains(&needle)
                    || item
                        .detail()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            })
            .collect()
    }

    pub fn is_active(&self, item: &SelectableItem) -> bool {
        self.active.as_deref() == Some(item.label())
    }

    /// The message to show instead of an empty list, if the list is empty.
    pub fn empty_message(&self) -> Option<&'static str> {
        if self.items.is_empty() {
            Some(EMPTY_MESSAGE)
        } else if self.visible_items().is_empty() {
            Some(NO_MATCHES_MESSAGE)
        } else {
            None
        }
    }

    /// Picks the `position`-th visible item (0-based).
    pub fn choose(&self, position: usize) -> Option<SelectableItem> {
        self.visible_items().get(position).map(|item| (*item).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list() -> SelectList {
        let mut list = SelectList::new();
        list.set_items(
            vec![
                SelectableItem::plain("android"),
                SelectableItem::plain("ios"),
                SelectableItem::detailed("iPhone 15", "A1B2-C3", 0),
            ],
            Some("ios"),
        );
        list
    }

    #[test]
    fn test_empty_messages_differ() {
        let mut empty = SelectList::new();
        empty.set_items(vec![], None);
        assert_eq!(empty.empty_message(), Some("No targets found."));

        let mut filtered = list();
        filtered.set_filter("windows");
        assert_eq!(filtered.empty_message(), Some("No matches"));

        assert_eq!(list().empty_message(), None);
    }

    #[test]
    fn test_filter_matches_label_and_detail() {
        let mut list = list();
        list.set_filter("c3");
        let items = list.visible_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].index(), Some(0));

        list.set_filter("IOS");
        assert_eq!(list.visible_items()[0].label(), "ios");
    }

    #[test]
    fn test_active_item_is_marked() {
        let list = list();
        assert!(list.is_active(&SelectableItem::plain("ios")));
        assert!(!list.is_active(&SelectableItem::plain("android")));
    }

    #[test]
    fn test_show_is_idempotent() {
        let mut list = list();
        assert!(list.show());
        assert!(!list.show());
        list.hide();
        assert!(list.show());
    }

    #[test]
    fn test_choose_uses_visible_positions() {
        let mut list = list();
        list.set_filter("iphone");
        assert_eq!(list.choose(0).map(|i| i.index()), Some(Some(0)));
        assert_eq!(list.choose(1), None);
    }

    #[test]
    fn test_set_items_clears_loading() {
        let mut list = list();
        list.set_loading("loading...");
        assert_eq!(list.loading(), Some("loading..."));
        list.set_items(vec![], None);
        assert_eq!(list.loading(), None);
    }
}
