mod export;
mod loader;

pub use export::{write_dataset, write_tables};
pub use loader::ConfigLoader;

/// Dataset include/exclude lists. Exclusion wins; an empty include list allows all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl DatasetFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    pub fn allows(&self, dataset_id: &str) -> bool {
        if self.exclude.iter().any(|d| d == dataset_id) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|d| d == dataset_id)
    }

    pub fn apply(&self, dataset_ids: Vec<String>) -> Vec<String> {
        dataset_ids.into_iter().filter(|d| self.allows(d)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclude_wins() {
        let filter = DatasetFilter::new(vec!["a".into(), "b".into()], vec!["b".into()]);
        assert!(filter.allows("a"));
        assert!(!filter.allows("b"));
        assert!(!filter.allows("c"));
    }

    #[test]
    fn test_empty_include_allows_all() {
        let filter = DatasetFilter::new(vec![], vec!["x".into()]);
        assert_eq!(
            filter.apply(vec!["a".into(), "x".into(), "b".into()]),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
