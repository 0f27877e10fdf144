//! Connection descriptor parsing and connector configuration.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    error::{RfcError, RfcResult},
    filter::DEFAULT_FILTER_MAX_LEN,
};

/// Descriptor key holding the logon password. Never printed.
pub const PASSWORD_KEY: &str = "PASSWD";

/// Parsed `KEY=VALUE;KEY=VALUE` connection descriptor.
///
/// Keys are case-sensitive and kept in descriptor order.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct ConnectionParams {
    entries: Vec<(String, String)>,
}

impl ConnectionParams {
    /// Parse a descriptor such as
    /// `ASHOST=host;SYSNR=00;CLIENT=100;LANG=EN;USER=u;PASSWD=p`.
    ///
    /// Empty entries (e.g. a trailing `;`) are skipped. Values are split on the
    /// first `=` only, so they may contain `=` themselves.
    pub fn parse(descriptor: &str) -> RfcResult<Self> {
        let mut entries: Vec<(String, String)> = Vec::new();

        for (position, raw) in descriptor.split(';').enumerate() {
            let entry = raw.trim();
            if entry.is_empty() {
                continue;
            }

            let Some((key, value)) = entry.split_once('=') else {
                return Err(RfcError::ConnectionString(format!(
                    "entry {} ('{}') is missing '='",
                    position + 1,
                    redact_entry(entry)
                )));
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(RfcError::ConnectionString(format!(
                    "entry {} has an empty key",
                    position + 1
                )));
            }

            if entries.iter().any(|(existing, _)| existing == key) {
                return Err(RfcError::ConnectionString(format!(
                    "key '{key}' appears more than once"
                )));
            }

            entries.push((key.to_string(), value.trim().to_string()));
        }

        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_map(&self) -> HashMap<String, String> {
        self.entries.iter().cloned().collect()
    }

    /// Value of `ASHOST`, falling back to `MSHOST` for load-balanced logons.
    pub fn host(&self) -> Option<&str> {
        self.get("ASHOST").or_else(|| self.get("MSHOST"))
    }
}

// Entries without '=' may be a mistyped password; only echo the first characters.
fn redact_entry(entry: &str) -> String {
    let visible: String = entry.chars().take(3).collect();
    if visible.len() < entry.len() {
        format!("{visible}...")
    } else {
        visible
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.entries {
            if key == PASSWORD_KEY {
                map.entry(key, &"****");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

/// Generic table reader function used by table queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadTableFunction {
    BbpRfcReadTable,
    #[default]
    RfcReadTable,
    /// Caller supplied reader with the same interface (e.g. a `Z` copy).
    Custom(String),
}

impl ReadTableFunction {
    pub fn function_name(&self) -> &str {
        match self {
            ReadTableFunction::BbpRfcReadTable => "BBP_RFC_READ_TABLE",
            ReadTableFunction::RfcReadTable => "RFC_READ_TABLE",
            ReadTableFunction::Custom(name) => name,
        }
    }
}

/// Per-query options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryOptions {
    /// Reader to use; falls back to `ConnectorConfig::default_reader` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_table_function: Option<ReadTableFunction>,
}

/// Connector-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectorConfig {
    /// Maximum characters per OPTIONS row of the table reader.
    #[serde(default = "default_filter_max_len")]
    pub filter_max_len: usize,
    #[serde(default)]
    pub default_reader: ReadTableFunction,
}

impl ConnectorConfig {
    pub fn default_filter_max_len() -> usize {
        default_filter_max_len()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.filter_max_len == 0 {
            return Err(format!(
                "filter_max_len must be greater than 0, default is {DEFAULT_FILTER_MAX_LEN}"
            ));
        }
        if let ReadTableFunction::Custom(name) = &self.default_reader {
            if name.trim().is_empty() {
                return Err("custom default_reader needs a function name".to_string());
            }
        }
        Ok(())
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            filter_max_len: default_filter_max_len(),
            default_reader: ReadTableFunction::default(),
        }
    }
}

fn default_filter_max_len() -> usize {
    DEFAULT_FILTER_MAX_LEN
}
