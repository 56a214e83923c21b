//! Configuration access port.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// Lenient integer lookup: absent or unparsable values yield `default`.
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;

    /// True when `key` is present and non-blank.
    fn has_key(&self, section: &str, key: &str) -> bool {
        self.get_string(section, key)
            .is_some_and(|v| !v.trim().is_empty())
    }
}
