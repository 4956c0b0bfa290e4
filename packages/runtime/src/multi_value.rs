//! # Flexible multi-value holder
//!
//! Parent sets and watcher lists are almost always empty or hold a single
//! entry. [`MultiValue`] stores that common case inline and only allocates a
//! `Vec` once a second entry shows up.

/// Zero, one or many values without allocating for the single-value case.
#[derive(Debug, Clone)]
pub enum MultiValue<T> {
    Empty,
    One(T),
    Many(Vec<T>),
}

impl<T> MultiValue<T> {
    pub fn new() -> Self {
        MultiValue::Empty
    }

    /// Add a value. Duplicates are kept as separate entries.
    pub fn push(&mut self, value: T) {
        *self = match std::mem::take(self) {
            MultiValue::Empty => MultiValue::One(value),
            MultiValue::One(first) => MultiValue::Many(vec![first, value]),
            MultiValue::Many(mut values) => {
                values.push(value);
                MultiValue::Many(values)
            }
        };
    }

    /// Remove the first entry matching `pred` and return it.
    ///
    /// Only one occurrence is removed even if several entries match.
    pub fn remove_first(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
        match std::mem::take(self) {
            MultiValue::Empty => None,
            MultiValue::One(value) => {
                if pred(&value) {
                    Some(value)
                } else {
                    *self = MultiValue::One(value);
                    None
                }
            }
            MultiValue::Many(mut values) => {
                let removed = values
                    .iter()
                    .position(|v| pred(v))
                    .map(|pos| values.remove(pos));

                *self = match values.len() {
                    0 => MultiValue::Empty,
                    1 => MultiValue::One(values.remove(0)),
                    _ => MultiValue::Many(values),
                };
                removed
            }
        }
    }

    /// Keep only the entries matching `pred`.
    pub fn retain(&mut self, mut pred: impl FnMut(&T) -> bool) {
        while self.remove_first(|v| !pred(v)).is_some() {}
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            MultiValue::Empty => &[],
            MultiValue::One(value) => std::slice::from_ref(value),
            MultiValue::Many(values) => values.as_slice(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, MultiValue::Empty)
    }

    /// Take every value out, leaving the holder empty.
    pub fn take_all(&mut self) -> Vec<T> {
        match std::mem::take(self) {
            MultiValue::Empty => Vec::new(),
            MultiValue::One(value) => vec![value],
            MultiValue::Many(values) => values,
        }
    }
}

impl<T> Default for MultiValue<T> {
    fn default() -> Self {
        MultiValue::Empty
    }
}

impl<'a, T> IntoIterator for &'a MultiValue<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value_stays_inline() {
        let mut values = MultiValue::new();
        values.push(1);

        assert!(matches!(values, MultiValue::One(1)));
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_grows_and_shrinks() {
        let mut values = MultiValue::new();
        values.push("a");
        values.push("b");
        values.push("c");
        assert_eq!(values.as_slice(), &["a", "b", "c"]);

        assert_eq!(values.remove_first(|v| *v == "b"), Some("b"));
        assert_eq!(values.remove_first(|v| *v == "a"), Some("a"));
        assert!(matches!(values, MultiValue::One("c")));

        assert_eq!(values.remove_first(|v| *v == "c"), Some("c"));
        assert!(values.is_empty());
    }

    #[test]
    fn test_remove_only_one_duplicate() {
        let mut values = MultiValue::new();
        values.push(7);
        values.push(7);

        values.remove_first(|v| *v == 7);
        assert_eq!(values.as_slice(), &[7]);
    }

    #[test]
    fn test_remove_missing_value_is_noop() {
        let mut values = MultiValue::new();
        values.push(1);

        assert_eq!(values.remove_first(|v| *v == 2), None);
        assert_eq!(values.as_slice(), &[1]);
    }

    #[test]
    fn test_retain_and_take_all() {
        let mut values = MultiValue::new();
        for v in 0..6 {
            values.push(v);
        }

        values.retain(|v| v % 2 == 0);
        assert_eq!(values.as_slice(), &[0, 2, 4]);

        assert_eq!(values.take_all(), vec![0, 2, 4]);
        assert!(values.is_empty());
    }
}
