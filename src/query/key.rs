use std::fmt;

/// Identifies one cached value: a resource kind followed by its parameters.
///
/// When a key is used as a filter it matches every key it is a prefix of, so
/// `["comments"]` addresses all comment collections while
/// `["comments", "P1"]` addresses only the comments of post `P1`.
///
/// # Example
///
/// ```rust
/// use campus_board::query::QueryKey;
///
/// let all = QueryKey::new("comments");
/// let one = QueryKey::new("comments").with("P1");
///
/// assert!(all.matches(&one));
/// assert!(!one.matches(&all));
/// assert_eq!(one.to_string(), "comments:P1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    segments: Vec<String>,
}

impl QueryKey {
    /// Creates a key for the given resource kind.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            segments: vec![kind.into()],
        }
    }

    /// Appends a parameter segment.
    #[must_use]
    pub fn with(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// The resource kind (first segment), if the key has any segment.
    pub fn kind(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns `true` if `other` equals this key or extends it.
    pub fn matches(&self, other: &QueryKey) -> bool {
        other.segments.starts_with(&self.segments)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join(":"))
    }
}

impl<const N: usize> From<[&str; N]> for QueryKey {
    fn from(segments: [&str; N]) -> Self {
        Self {
            segments: segments.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}
