//! Ordered, case-insensitive, multi-valued header map.
//!
//! Fields are keyed by their ASCII-lowercased name. Each key keeps every
//! `(name, value)` pair supplied for it, in insertion order, with the name
//! spelled the way the caller spelled it. Keys iterate in first-insertion order.
//!
//! No operation fails for a missing field: [`HeaderMultimap::get`] returns an
//! empty string and [`HeaderMultimap::delete`] is a no-op.

use indexmap::IndexMap;

/// Ordered, case-insensitive multimap of HTTP header fields.
///
/// # Example
///
/// ```
/// use modkit_exchange::HeaderMultimap;
///
/// let mut headers = HeaderMultimap::new();
/// headers.add("Accept", Some("application/json"));
/// headers.add("accept", Some("text/plain"));
///
/// assert_eq!(headers.get("ACCEPT"), "application/json");
/// assert_eq!(headers.get_all("Accept").count(), 2);
///
/// headers.set("Accept", None);
/// assert_eq!(headers.get("accept"), "");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMultimap {
    fields: IndexMap<String, Vec<(String, String)>>,
}

fn fold(field: &str) -> String {
    field.to_ascii_lowercase()
}

impl HeaderMultimap {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// First value of `field`, or `""` when the field is absent.
    #[must_use]
    pub fn get(&self, field: &str) -> &str {
        self.fields
            .get(&fold(field))
            .and_then(|entries| entries.first())
            .map_or("", |(_, value)| value.as_str())
    }

    /// Every value of `field` in insertion order.
    pub fn get_all(&self, field: &str) -> impl Iterator<Item = &str> {
        self.fields
            .get(&fold(field))
            .into_iter()
            .flatten()
            .map(|(_, value)| value.as_str())
    }

    /// Whether at least one entry exists for `field`.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(&fold(field))
    }

    /// Replace every entry of `field` with a single pair, or delete the field when `value` is `None`.
    pub fn set(&mut self, field: &str, value: Option<&str>) {
        let Some(value) = value else {
            self.delete(field);
            return;
        };
        let entries = self.fields.entry(fold(field)).or_default();
        entries.clear();
        entries.push((field.to_owned(), value.to_owned()));
    }

    /// Append a pair for `field`, keeping existing entries. `None` is ignored.
    pub fn add(&mut self, field: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.fields
                .entry(fold(field))
                .or_default()
                .push((field.to_owned(), value.to_owned()));
        }
    }

    /// Remove every entry of `field`.
    pub fn delete(&mut self, field: &str) {
        self.fields.shift_remove(&fold(field));
    }

    /// Overlay `other`: each field present there replaces the same field here.
    pub fn merge(&mut self, other: &HeaderMultimap) {
        for (key, entries) in &other.fields {
            self.fields.insert(key.clone(), entries.clone());
        }
    }

    /// Iterate all `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .values()
            .flatten()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Total number of `(name, value)` pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.values().map(Vec::len).sum()
    }

    /// Whether the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build from a transport header map.
    ///
    /// Values that are not visible ASCII are decoded lossily.
    #[must_use]
    pub fn from_header_map(map: &http::HeaderMap) -> Self {
        let mut headers = Self::new();
        for (name, value) in map {
            let value = String::from_utf8_lossy(value.as_bytes());
            headers.add(name.as_str(), Some(&value));
        }
        headers
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for HeaderMultimap {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.add(name, Some(value));
        }
        headers
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_get_is_case_insensitive() {
        let mut headers = HeaderMultimap::new();
        headers.set("X-Foo", Some("a"));
        assert_eq!(headers.get("x-foo"), "a");
        assert_eq!(headers.get("X-FOO"), "a");
        assert!(headers.contains("x-FoO"));
    }

    #[test]
    fn test_missing_field_reads_as_empty() {
        let headers = HeaderMultimap::new();
        assert_eq!(headers.get("Content-Type"), "");
        assert_eq!(headers.get_all("Content-Type").count(), 0);
        assert!(!headers.contains("Content-Type"));
    }

    #[test]
    fn test_add_preserves_duplicates_in_order() {
        let mut headers = HeaderMultimap::new();
        headers.add("Set-Cookie", Some("a=1; Expires=Wed, 21 Oct 2015 07:28:00 GMT"));
        headers.add("set-cookie", Some("b=2"));

        assert_eq!(
            headers.get("Set-Cookie"),
            "a=1; Expires=Wed, 21 Oct 2015 07:28:00 GMT"
        );
        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(
            pairs,
            vec![
                ("Set-Cookie", "a=1; Expires=Wed, 21 Oct 2015 07:28:00 GMT"),
                ("set-cookie", "b=2"),
            ]
        );
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_add_none_is_noop() {
        let mut headers = HeaderMultimap::new();
        headers.add("X-Foo", None);
        assert!(headers.is_empty());

        headers.add("X-Foo", Some("a"));
        headers.add("X-Foo", None);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_set_replaces_all_entries() {
        let mut headers = HeaderMultimap::new();
        headers.add("Accept", Some("a"));
        headers.add("Accept", Some("b"));
        headers.set("ACCEPT", Some("c"));

        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(pairs, vec![("ACCEPT", "c")]);
    }

    #[test]
    fn test_set_none_equals_delete() {
        let mut set_none = HeaderMultimap::new();
        set_none.add("X-Foo", Some("a"));
        set_none.add("X-Bar", Some("b"));
        let mut deleted = set_none.clone();

        set_none.set("x-foo", None);
        deleted.delete("X-FOO");

        assert_eq!(set_none, deleted);
        assert_eq!(set_none.get("X-Foo"), "");
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let mut headers = HeaderMultimap::new();
        headers.add("A", Some("1"));
        headers.delete("B");
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_fields_iterate_in_first_insertion_order() {
        let mut headers = HeaderMultimap::new();
        headers.add("B", Some("1"));
        headers.add("A", Some("2"));
        headers.add("b", Some("3"));
        headers.set("A", Some("4"));

        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(pairs, vec![("B", "1"), ("b", "3"), ("A", "4")]);
    }

    #[test]
    fn test_merge_replaces_overlapping_fields() {
        let mut base: HeaderMultimap = [("Accept", "text/plain"), ("X-Keep", "yes")]
            .into_iter()
            .collect();
        let extra: HeaderMultimap = [("accept", "application/json"), ("accept", "text/xml")]
            .into_iter()
            .collect();

        base.merge(&extra);

        assert_eq!(base.get("X-Keep"), "yes");
        let accept: Vec<_> = base.get_all("Accept").collect();
        assert_eq!(accept, vec!["application/json", "text/xml"]);
    }

    #[test]
    fn test_from_header_map_keeps_duplicates() {
        let mut map = http::HeaderMap::new();
        map.append("vary", "accept".parse().unwrap());
        map.append("vary", "origin".parse().unwrap());
        map.insert("content-type", "text/plain".parse().unwrap());

        let headers = HeaderMultimap::from_header_map(&map);
        assert_eq!(headers.get_all("Vary").collect::<Vec<_>>(), vec!["accept", "origin"]);
        assert_eq!(headers.get("Content-Type"), "text/plain");
    }
}
