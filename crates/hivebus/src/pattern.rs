//! Subscription pattern matching.
//!
//! Three forms are recognized:
//! - `""` or `"*"` matches every topic
//! - `"prefix.*"` is a literal byte-prefix match on `"prefix."`
//! - anything else matches only the identical topic name
//!
//! There is no other wildcard syntax and no escaping. The prefix form is not
//! segment aware: `"agents.*"` does not match `"agents/foo"`.

/// Classified form of a subscription pattern, borrowing from the source string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicPattern<'a> {
    /// Matches every topic
    All,
    /// Literal prefix, including the trailing dot
    Prefix(&'a str),
    /// Exact topic name
    Exact(&'a str),
}

impl<'a> TopicPattern<'a> {
    /// Classify a raw pattern string.
    pub fn parse(pattern: &'a str) -> Self {
        if pattern.is_empty() || pattern == "*" {
            TopicPattern::All
        } else if pattern.ends_with(".*") {
            // Strip the star, keep the dot.
            TopicPattern::Prefix(&pattern[..pattern.len() - 1])
        } else {
            TopicPattern::Exact(pattern)
        }
    }

    /// Check whether `topic` satisfies this pattern.
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicPattern::All => true,
            TopicPattern::Prefix(prefix) => topic.starts_with(prefix),
            TopicPattern::Exact(name) => topic == *name,
        }
    }
}

/// Check whether `topic` satisfies the subscription `pattern`.
pub fn matches(pattern: &str, topic: &str) -> bool {
    TopicPattern::parse(pattern).matches(topic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcards_match_everything() {
        assert!(matches("*", "hive.test"));
        assert!(matches("*", "agents/test"));
        assert!(matches("", "anything"));
        assert!(matches("", ""));
    }

    #[test]
    fn test_prefix_pattern() {
        assert!(matches("hive.*", "hive.test"));
        assert!(matches("hive.*", "hive.agent.foo"));
        assert!(!matches("hive.*", "other"));
        // The dot is part of the prefix
        assert!(!matches("hive.*", "hive"));
        assert!(!matches("hive.*", "hivemind.test"));
    }

    #[test]
    fn test_prefix_is_not_segment_aware() {
        assert!(matches("agents.*", "agents.foo"));
        assert!(!matches("agents.*", "agents/foo"));
    }

    #[test]
    fn test_exact_pattern() {
        assert!(matches("agents/test", "agents/test"));
        assert!(!matches("agents/test", "agents/test2"));
        assert!(!matches("agents/test", "agents"));
    }

    #[test]
    fn test_star_elsewhere_is_literal() {
        assert!(!matches("hive*", "hive.test"));
        assert!(matches("hive*", "hive*"));
        assert!(!matches("*.test", "hive.test"));
    }

    #[test]
    fn test_parse_classification() {
        assert_eq!(TopicPattern::parse(""), TopicPattern::All);
        assert_eq!(TopicPattern::parse("*"), TopicPattern::All);
        assert_eq!(TopicPattern::parse("hive.*"), TopicPattern::Prefix("hive."));
        assert_eq!(TopicPattern::parse(".*"), TopicPattern::Prefix("."));
        assert_eq!(
            TopicPattern::parse("agents/test"),
            TopicPattern::Exact("agents/test")
        );
    }
}
