//! Configuration access port trait.
//!
//! Values are raw strings; typed parsing and range checks live in
//! `domain::config_validation`.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// Keys present under `section`, in no particular order.
    fn keys(&self, section: &str) -> Vec<String>;

    /// True when the key exists with a non-blank value.
    fn has_key(&self, section: &str, key: &str) -> bool {
        self.get_string(section, key)
            .is_some_and(|v| !v.trim().is_empty())
    }
}
