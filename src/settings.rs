// Kiki Companion — Settings Store
//
// Namespaced key-value settings (NVS on target, a map on the host).

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings namespace `{0}` could not be opened")]
    Namespace(String),
    #[error("storage error {code} writing `{namespace}/{key}`")]
    Storage {
        namespace: String,
        key: String,
        code: i32,
    },
}

pub trait SettingsStore: Send + Sync {
    fn get_string(&self, namespace: &str, key: &str) -> Option<String>;
    fn get_int(&self, namespace: &str, key: &str) -> Option<i32>;
    fn get_bool(&self, namespace: &str, key: &str) -> Option<bool>;
    fn set_string(&self, namespace: &str, key: &str, value: &str) -> Result<(), SettingsError>;
    fn set_int(&self, namespace: &str, key: &str, value: i32) -> Result<(), SettingsError>;
    fn set_bool(&self, namespace: &str, key: &str, value: bool) -> Result<(), SettingsError>;
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Str(String),
    Int(i32),
    Bool(bool),
}

/// In-memory store used by the simulator and tests.
#[derive(Debug, Default)]
pub struct MemorySettings {
    entries: Mutex<HashMap<(String, String), Value>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(namespace.to_owned(), key.to_owned()))
            .cloned()
    }

    fn put(&self, namespace: &str, key: &str, value: Value) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((namespace.to_owned(), key.to_owned()), value);
    }
}

impl SettingsStore for MemorySettings {
    fn get_string(&self, namespace: &str, key: &str) -> Option<String> {
        match self.get(namespace, key)? {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    fn get_int(&self, namespace: &str, key: &str) -> Option<i32> {
        match self.get(namespace, key)? {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }

    fn get_bool(&self, namespace: &str, key: &str) -> Option<bool> {
        match self.get(namespace, key)? {
            Value::Bool(v) => Some(v),
            Value::Int(v) => Some(v != 0),
            Value::Str(_) => None,
        }
    }

    fn set_string(&self, namespace: &str, key: &str, value: &str) -> Result<(), SettingsError> {
        self.put(namespace, key, Value::Str(value.to_owned()));
        Ok(())
    }

    fn set_int(&self, namespace: &str, key: &str, value: i32) -> Result<(), SettingsError> {
        self.put(namespace, key, Value::Int(value));
        Ok(())
    }

    fn set_bool(&self, namespace: &str, key: &str, value: bool) -> Result<(), SettingsError> {
        self.put(namespace, key, Value::Bool(value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_typed_per_namespace() {
        let s = MemorySettings::new();
        s.set_int("otto", "idle_timeout", 5).unwrap();
        s.set_string("storage", "delicious_kw", "pizza").unwrap();
        assert_eq!(s.get_int("otto", "idle_timeout"), Some(5));
        assert_eq!(s.get_string("otto", "idle_timeout"), None);
        assert_eq!(s.get_int("wifi", "idle_timeout"), None);
        assert_eq!(s.get_string("storage", "delicious_kw").as_deref(), Some("pizza"));
    }

    #[test]
    fn ints_read_as_bools() {
        let s = MemorySettings::new();
        s.set_int("wifi", "sleep_mode", 0).unwrap();
        assert_eq!(s.get_bool("wifi", "sleep_mode"), Some(false));
    }
}
