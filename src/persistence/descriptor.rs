// src/persistence/descriptor.rs
use super::PersistenceError;
use std::collections::BTreeMap;
use std::fmt;

const REDACTED_KEYS: &[&str] = &["password", "pwd"];

/// A validated `key=value;key=value` connection string.
///
/// Keys are case-insensitive and stored lowercased. Parsing fails eagerly on
/// blank or malformed input so a misconfigured store is caught at startup
/// rather than on first use.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    raw: String,
    settings: BTreeMap<String, String>,
}

impl ConnectionDescriptor {
    pub fn parse(raw: &str) -> Result<Self, PersistenceError> {
        let mut settings = BTreeMap::new();

        for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                PersistenceError::Malformed(format!("'{}' is not key=value", segment))
            })?;

            let key = key.trim();
            if key.is_empty() {
                return Err(PersistenceError::Malformed(format!(
                    "'{}' has an empty key",
                    segment
                )));
            }

            settings.insert(key.to_ascii_lowercase(), value.trim().to_string());
        }

        if settings.is_empty() {
            return Err(PersistenceError::NotConfigured);
        }

        Ok(Self {
            raw: raw.trim().to_string(),
            settings,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.settings
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The original string, for handing to a driver.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

// Debug and Display both redact secrets so descriptors are safe to log.
impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.settings {
            if !first {
                f.write_str(";")?;
            }
            first = false;

            if REDACTED_KEYS.contains(&key.as_str()) {
                write!(f, "{}=***", key)?;
            } else {
                write!(f, "{}={}", key, value)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionDescriptor({})", self)
    }
}
