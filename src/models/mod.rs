use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Element type a result declares for its sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ValueKind {
    Int32,
    Uint32,
    String,
    Dict,
    /// Empty or absent list. Acceptable for every element type.
    #[default]
    None,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueKind::Int32 => write!(f, "int32"),
            ValueKind::Uint32 => write!(f, "uint32"),
            ValueKind::String => write!(f, "string"),
            ValueKind::Dict => write!(f, "dict"),
            ValueKind::None => write!(f, "none"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Int32(i32),
    Uint32(u32),
    String(String),
    Dict(Dict),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int32(_) => ValueKind::Int32,
            Value::Uint32(_) => ValueKind::Uint32,
            Value::String(_) => ValueKind::String,
            Value::Dict(_) => ValueKind::Dict,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int32(v) => write!(f, "{v}"),
            Value::Uint32(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Dict(d) => write!(f, "{d}"),
        }
    }
}

/// String-keyed mapping decoded from a result element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dict {
    entries: BTreeMap<String, Value>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    #[allow(dead_code)]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    #[allow(dead_code)]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.entries.get(key)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer lookup accepting either signed or unsigned storage.
    #[allow(dead_code)]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.entries.get(key)? {
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Uint32(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    #[allow(dead_code)]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl std::fmt::Display for Dict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<(String, Value)> for Dict {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// A row of the `media` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaEntry {
    pub id: u32,
    pub url: String,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: u32,
    pub added_at: DateTime<Utc>,
}

impl MediaEntry {
    pub fn new(url: String, title: String, duration: u32) -> Self {
        Self {
            id: 0,
            url,
            title,
            artist: None,
            album: None,
            duration,
            added_at: Utc::now(),
        }
    }

    pub fn display_name(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{artist} - {}", self.title),
            None => self.title.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub entries: usize,
    pub queries_served: u64,
    pub uptime_secs: u64,
}
