//! Ordered header list with case-insensitive lookup.

/// HTTP header fields in arrival (or insertion) order.
///
/// Names compare ASCII case-insensitively. [`append`](Self::append) keeps
/// duplicates; [`set`](Self::set) replaces every earlier value.
///
/// # Examples
///
/// ```
/// use revu::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.append("Vary", "Origin");
/// headers.set("content-type", "application/json");
///
/// assert_eq!(headers.get("Content-Type"), Some("application/json"));
/// assert!(headers.contains("vary"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Adds a field, keeping any existing fields with the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Replaces all fields named `name` with a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.fields.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.fields.push((name, value.into()));
    }

    /// First value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of fields, counting duplicates.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut h = Headers::new();
        h.append("X-Request-Id", "7");
        assert_eq!(h.get("x-request-id"), Some("7"));
        assert_eq!(h.get("X-REQUEST-ID"), Some("7"));
    }

    #[test]
    fn append_keeps_duplicates() {
        let mut h = Headers::new();
        h.append("Vary", "Origin");
        h.append("vary", "Accept");
        assert_eq!(h.len(), 2);
        assert_eq!(h.get("Vary"), Some("Origin"));
    }

    #[test]
    fn set_replaces_existing() {
        let mut h = Headers::new();
        h.append("Content-Type", "text/plain");
        h.append("content-type", "text/html");
        h.set("Content-Type", "application/json");
        assert_eq!(h.len(), 1);
        assert_eq!(h.get("content-type"), Some("application/json"));
    }
}
