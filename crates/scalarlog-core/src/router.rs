//! Category routing: `"category/metric"` names are split into per-category
//! buckets; names without a delimiter land in the default category.

use std::collections::BTreeMap;

/// Category used for metric names that carry no prefix (e.g. `lr`).
pub const DEFAULT_CATEGORY: &str = "train";
/// Separator between category prefix and metric name.
pub const CATEGORY_DELIMITER: char = '/';

/// Metrics grouped by category, then by metric name within the category.
pub type Routed<V> = BTreeMap<String, BTreeMap<String, V>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Router {
    delimiter: char,
    default_category: String,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(CATEGORY_DELIMITER, DEFAULT_CATEGORY)
    }
}

impl Router {
    pub fn new(delimiter: char, default_category: impl Into<String>) -> Self {
        Self {
            delimiter,
            default_category: default_category.into(),
        }
    }

    pub fn default_category(&self) -> &str {
        &self.default_category
    }

    /// Split a metric name into `(category, column)`.
    ///
    /// Only the first delimiter splits: `"a/b/c"` is column `"b/c"` of `"a"`.
    pub fn split<'a>(&'a self, key: &'a str) -> (&'a str, &'a str) {
        key.split_once(self.delimiter)
            .unwrap_or((self.default_category.as_str(), key))
    }

    /// Group `metrics` by category. Values pass through untouched.
    ///
    /// If a bare name and an explicitly prefixed name resolve to the same
    /// column (`loss` and `train/loss`), the prefixed one wins regardless of
    /// iteration order.
    pub fn route<I, K, V>(&self, metrics: I) -> Routed<V>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
    {
        let mut routed: Routed<V> = BTreeMap::new();
        for (key, value) in metrics {
            let key = key.as_ref();
            match key.split_once(self.delimiter) {
                Some((category, column)) => {
                    routed
                        .entry(category.to_string())
                        .or_default()
                        .insert(column.to_string(), value);
                }
                None => {
                    routed
                        .entry(self.default_category.clone())
                        .or_default()
                        .entry(key.to_string())
                        .or_insert(value);
                }
            }
        }
        routed
    }
}

/// Group `metrics` with the default `/` delimiter and `train` category.
pub fn route<I, K, V>(metrics: I) -> Routed<V>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
{
    Router::default().route(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn bare_names_go_to_train() {
        let routed = route([("loss", 0.5), ("lr", 0.01)]);
        assert_eq!(routed.len(), 1);
        assert_eq!(routed["train"]["loss"], 0.5);
        assert_eq!(routed["train"]["lr"], 0.01);
    }

    #[test]
    fn prefix_selects_category() {
        let routed = route([("val/acc", 0.9), ("loss", 0.4)]);
        assert_eq!(routed["val"]["acc"], 0.9);
        assert_eq!(routed["train"]["loss"], 0.4);
    }

    #[test]
    fn only_first_delimiter_splits() {
        let routed = route([("a/b/c", 1)]);
        assert_eq!(routed["a"]["b/c"], 1);
        assert_eq!(Router::default().split("a/b/c"), ("a", "b/c"));
        assert_eq!(Router::default().split("loss"), ("train", "loss"));
    }

    #[test]
    fn routing_partitions_without_loss() {
        let metrics: HashMap<String, i32> = [
            ("loss", 1),
            ("lr", 2),
            ("val/loss", 3),
            ("val/acc", 4),
            ("test/x/y", 5),
            ("grad/", 6),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let routed = route(&metrics);
        let total: usize = routed.values().map(|m| m.len()).sum();
        assert_eq!(total, metrics.len());
        let router = Router::default();
        for (key, value) in &metrics {
            let (category, column) = router.split(key);
            assert_eq!(routed[category][column], value);
        }
    }

    #[test]
    fn prefixed_name_wins_over_bare_alias() {
        for input in [
            vec![("loss", 1), ("train/loss", 2)],
            vec![("train/loss", 2), ("loss", 1)],
        ] {
            let routed = route(input);
            assert_eq!(routed["train"]["loss"], 2);
        }
    }

    #[test]
    fn custom_router() {
        let router = Router::new('.', "misc");
        let routed = router.route([("eval.f1", 0.7), ("step_time", 0.2)]);
        assert_eq!(routed["eval"]["f1"], 0.7);
        assert_eq!(routed["misc"]["step_time"], 0.2);
        assert_eq!(router.default_category(), "misc");
    }
}
