use crate::error::ConfigError;

/// One `name=value` interface option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub name: String,
    pub value: String,
}

impl KeyValue {
    /// Whether this option has the given name (case-insensitive).
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Ordered option list handed to a transport during setup.
///
/// Options are consumed while the transport builds its configuration and
/// are not kept afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options(Vec<KeyValue>);

impl Options {
    /// Empty option list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated `name=value` list.
    pub fn parse_list(list: &str) -> Result<Self, ConfigError> {
        let mut options = Self::new();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, value) = item.split_once('=').ok_or_else(|| ConfigError::InvalidValue {
                option: item.to_string(),
                value: String::new(),
            })?;
            options.push(name.trim(), value.trim());
        }
        Ok(options)
    }

    /// Append an option.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(KeyValue {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Remove and return the last value of `name`, if any.
    ///
    /// Used by orchestrators to pull out settings that are not transport
    /// options before the list reaches the transport.
    pub fn take(&mut self, name: &str) -> Option<String> {
        let mut found = None;
        self.0.retain(|kv| {
            if kv.is(name) {
                found = Some(kv.value.clone());
                false
            } else {
                true
            }
        });
        found
    }

    /// Iterate over the options in order.
    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.0.iter()
    }

    /// Number of options.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Options {
    type Item = KeyValue;
    type IntoIter = std::vec::IntoIter<KeyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = Self::new();
        for (name, value) in iter {
            options.push(name, value);
        }
        options
    }
}

/// Parse a `qsize` value. Zero and non-numeric values are rejected.
pub fn parse_qsize(value: &str) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidQueueSize(value.to_string())),
    }
}

/// Parse a yes/no style flag.
pub fn parse_flag(option: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "on" | "true" | "1" => Ok(true),
        "no" | "n" | "off" | "false" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            option: option.to_string(),
            value: value.to_string(),
        }),
    }
}
