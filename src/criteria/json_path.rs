//! Paths into JSON-valued attributes, rendered for SQLite's `json_extract`/`json_type`.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

fn plain_key() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// `journalValue.readings.0.ph` addresses `$.readings[0].ph` inside `journalValue`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn root() -> Self {
        JsonPath::default()
    }

    /// Parse the part after the attribute name. None when any segment is empty.
    pub fn parse(dotted: &str) -> Option<Self> {
        let mut path = JsonPath::root();
        for part in dotted.split('.') {
            if part.is_empty() {
                return None;
            }
            path = path.child(part);
        }
        Some(path)
    }

    /// Key lookup, or array index when the key is all digits. Dotted paths in criteria go
    /// through here, so `readings.0` always means the first element of an array.
    pub fn child(&self, key: &str) -> Self {
        let mut segments = self.segments.clone();
        match key.parse::<usize>() {
            Ok(i) if key.chars().all(|c| c.is_ascii_digit()) => segments.push(Segment::Index(i)),
            _ => segments.push(Segment::Key(key.to_string())),
        }
        JsonPath { segments }
    }

    /// Object key lookup, digits included.
    pub fn key(&self, key: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Key(key.to_string()));
        JsonPath { segments }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for s in &self.segments {
            match s {
                Segment::Index(i) => write!(f, "[{}]", i)?,
                Segment::Key(k) if plain_key().is_match(k) => write!(f, ".{}", k)?,
                Segment::Key(k) => write!(f, ".\"{}\"", k.replace('"', "\\\""))?,
            }
        }
        Ok(())
    }
}
