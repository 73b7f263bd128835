use crate::error::{AppError, AppResult};

use super::record::ListRecord;

/// What "select all" covers. The scope is chosen by the web client before it
/// sends the resulting ids; batch RPCs only see the explicit id list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionScope {
    /// Only the records rendered on the current page.
    #[default]
    Page,
    /// Every record matching the current filters, across pages.
    Filtered,
}

/// Ids checked for a batch operation, in selection order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    ids: Vec<String>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a selection from client-supplied ids, dropping duplicates.
    pub fn from_ids<I, S>(ids: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = SelectionSet::new();
        for id in ids {
            let id = id.into();
            let id = id.trim();
            if id.is_empty() {
                return Err(AppError::invalid("empty id in selection"));
            }
            if !set.contains(id) {
                set.ids.push(id.to_string());
            }
        }
        if set.is_empty() {
            return Err(AppError::invalid("no records selected"));
        }
        Ok(set)
    }

    /// Flips membership; returns whether `id` is now selected.
    pub fn toggle(&mut self, id: &str) -> bool {
        if let Some(pos) = self.ids.iter().position(|x| x == id) {
            self.ids.remove(pos);
            false
        } else {
            self.ids.push(id.to_string());
            true
        }
    }

    /// Replaces the selection with every id in `visible`.
    pub fn select_all_visible<R: ListRecord>(&mut self, visible: &[&R]) {
        self.ids.clear();
        for record in visible {
            if !self.contains(record.id()) {
                self.ids.push(record.id().to_string());
            }
        }
    }

    /// "Select all" honouring the chosen scope.
    pub fn select_all<R: ListRecord>(&mut self, scope: SelectionScope, page_items: &[&R], filtered: &[&R]) {
        match scope {
            SelectionScope::Page => self.select_all_visible(page_items),
            SelectionScope::Filtered => self.select_all_visible(filtered),
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|x| x == id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn into_ids(self) -> Vec<String> {
        self.ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::test_support::{doc, Doc};

    fn docs() -> Vec<Doc> {
        vec![
            doc("1", "a", "documento", 1, "2024-01-01"),
            doc("2", "b", "documento", 1, "2024-01-02"),
            doc("3", "c", "imagem", 1, "2024-01-03"),
        ]
    }

    #[test]
    fn test_toggle() {
        let mut set = SelectionSet::new();
        assert!(set.toggle("1"));
        assert!(set.toggle("2"));
        assert!(!set.toggle("1"));
        assert_eq!(set.ids(), &["2".to_string()]);
    }

    #[test]
    fn test_select_all_replaces() {
        let all = docs();
        let page: Vec<&Doc> = all.iter().take(2).collect();
        let filtered: Vec<&Doc> = all.iter().collect();

        let mut set = SelectionSet::new();
        set.toggle("3");
        set.select_all(SelectionScope::Page, &page, &filtered);
        assert_eq!(set.ids(), &["1".to_string(), "2".to_string()]);

        set.select_all(SelectionScope::Filtered, &page, &filtered);
        assert_eq!(set.len(), 3);

        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn test_from_ids() {
        let set = SelectionSet::from_ids(vec!["a", "b", "a"]).unwrap();
        assert_eq!(set.into_ids(), vec!["a".to_string(), "b".to_string()]);
        assert!(SelectionSet::from_ids(Vec::<String>::new()).is_err());
        assert!(SelectionSet::from_ids(vec!["a", " "]).is_err());
    }
}
