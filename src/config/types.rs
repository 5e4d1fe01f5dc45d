//! Core configuration types
//!
//! This module defines the data structures that represent a psweep configuration file.
//! Every mapping keeps its declaration order: task order drives dependency
//! tie-breaking and parameter order drives the expansion sequence.

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use std::fmt;

/// Field holding the command template of a task
pub const COMMAND: &str = "command";
/// Alias for `command` used when only a program is named
pub const PROGRAM: &str = "program";
/// Free-form task description
pub const NAME: &str = "name";
/// Parameter mapping (flag -> value or list of values)
pub const PARAMS: &str = "params";
/// Prerequisite task ids
pub const AFTER: &str = "after";
/// Environment mapping (NAME -> value or list of values)
pub const ENVIRON: &str = "environ";

/// A configuration value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit null (e.g. a bare flag)
    Null,

    /// Any scalar, normalized to its textual form
    Scalar(String),

    /// A list of scalars
    List(Vec<String>),

    /// A nested mapping
    Map(Section),
}

impl Value {
    /// Create a scalar value
    pub fn scalar(s: impl Into<String>) -> Self {
        Value::Scalar(s.into())
    }

    /// Create a list value
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Textual form used when this value is referenced by `${...}`
    ///
    /// Lists serialize one item per line, each followed by a newline.
    /// Mappings have no textual form.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Scalar(s) => Some(s.clone()),
            Value::List(items) => Some(items.iter().map(|s| format!("{}\n", s)).collect()),
            Value::Map(_) => None,
        }
    }

    /// Number of values this entry contributes to an expansion
    pub fn arity(&self) -> usize {
        match self {
            Value::List(items) => items.len().max(1),
            _ => 1,
        }
    }

    /// Get the nested mapping, if this is one
    pub fn as_map(&self) -> Option<&Section> {
        match self {
            Value::Map(section) => Some(section),
            _ => None,
        }
    }

    /// Short description of the value kind for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Scalar(_) => "scalar",
            Value::List(_) => "list",
            Value::Map(_) => "mapping",
        }
    }
}

/// An ordered key/value mapping
///
/// Used both for a whole entry (a task or a section) and for nested mappings
/// such as `params` and `environ`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    entries: Vec<(String, Value)>,
}

impl Section {
    /// Create an empty section
    pub fn new() -> Self {
        Section::default()
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Insert or replace a value, keeping the original position on replace
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Check if a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterate entries in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate keys in declaration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Value)> for Section {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut section = Section::new();
        for (k, v) in iter {
            section.insert(k, v);
        }
        section
    }
}

/// Top-level configuration: entry id -> entry fields
///
/// Entries that define `command` (or `program`) are tasks; the rest are
/// sections that only exist to be referenced through `${section:key}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub entries: Section,
}

impl Config {
    /// Get the fields of an entry, if the entry is a mapping
    pub fn entry(&self, id: &str) -> Option<&Section> {
        self.entries.get(id).and_then(Value::as_map)
    }

    /// Entry ids in declaration order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys()
    }

    /// Check whether an entry is a task
    pub fn is_task(&self, id: &str) -> bool {
        self.entry(id).map(is_task_entry).unwrap_or(false)
    }

    /// Ids of all task entries, in declaration order
    pub fn task_ids(&self) -> Vec<&str> {
        self.ids().filter(|id| self.is_task(id)).collect()
    }
}

/// An entry is a task when it carries a command template
pub fn is_task_entry(fields: &Section) -> bool {
    fields.contains_key(COMMAND) || fields.contains_key(PROGRAM)
}

/// Textual form of a float that still reads as a float
///
/// `1.0` stays `1.0` and large or tiny magnitudes keep an exponent (`1e20`).
fn float_text(v: f64) -> String {
    format!("{:?}", v)
}

/// A scalar key or value in textual form
struct Scalar(String);

struct ScalarVisitor;

impl<'de> Visitor<'de> for ScalarVisitor {
    type Value = Scalar;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string, number or boolean")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Scalar, E> {
        Ok(Scalar(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Scalar, E> {
        Ok(Scalar(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Scalar, E> {
        Ok(Scalar(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Scalar, E> {
        Ok(Scalar(float_text(v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Scalar, E> {
        Ok(Scalar(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Scalar, E> {
        Ok(Scalar(v))
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ScalarVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a scalar, a list of scalars or a mapping")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Scalar(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Scalar(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(Value::Scalar(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Scalar(float_text(v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::Scalar(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::Scalar(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element::<Scalar>()? {
            items.push(item.0);
        }
        Ok(Value::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Value, A::Error> {
        SectionVisitor.visit_map(map).map(Value::Map)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct SectionVisitor;

impl<'de> Visitor<'de> for SectionVisitor {
    type Value = Section;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a mapping")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Section, E> {
        Ok(Section::new())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Section, A::Error> {
        let mut section = Section::new();
        while let Some(key) = map.next_key::<Scalar>()? {
            if section.contains_key(&key.0) {
                return Err(de::Error::custom(format!("duplicate key '{}'", key.0)));
            }
            let value = map.next_value::<Value>()?;
            section.entries.push((key.0, value));
        }
        Ok(section)
    }
}

impl<'de> Deserialize<'de> for Section {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(SectionVisitor)
    }
}

impl<'de> Deserialize<'de> for Config {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Section::deserialize(deserializer).map(|entries| Config { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_simple_config() {
        let yaml = r#"
hello:
  name: Say hello
  command: echo hello
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.entries.len(), 1);
        assert!(config.is_task("hello"));
    }

    #[test]
    fn test_mappings_keep_declaration_order() {
        let yaml = r#"
zeta:
  command: run
  params:
    --z: 1
    --a: 2
    --m: 3
alpha:
  value: 1
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.ids().collect::<Vec<_>>(), vec!["zeta", "alpha"]);

        let params = config.entry("zeta").unwrap().get(PARAMS).unwrap();
        let keys: Vec<_> = params.as_map().unwrap().keys().collect();
        assert_eq!(keys, vec!["--z", "--a", "--m"]);
    }

    #[test]
    fn test_scalars_are_normalized_to_text() {
        let yaml = r#"
t:
  command: run
  params:
    --int: 10
    --float: 2.5
    --bool: true
    --list: [1, 11]
    --flag:
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let params = config.entry("t").unwrap().get(PARAMS).unwrap().as_map().unwrap();
        assert_eq!(params.get("--int"), Some(&Value::scalar("10")));
        assert_eq!(params.get("--float"), Some(&Value::scalar("2.5")));
        assert_eq!(params.get("--bool"), Some(&Value::scalar("true")));
        assert_eq!(params.get("--list"), Some(&Value::list(["1", "11"])));
        assert_eq!(params.get("--flag"), Some(&Value::Null));
    }

    #[test]
    fn test_floats_keep_their_form() {
        let yaml = "t:\n  command: run\n  params:\n    --tol: 1.0\n    --steps: [0.5, 2.0]\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let params = config.entry("t").unwrap().get(PARAMS).unwrap().as_map().unwrap();
        assert_eq!(params.get("--tol"), Some(&Value::scalar("1.0")));
        assert_eq!(params.get("--steps"), Some(&Value::list(["0.5", "2.0"])));

        let json = r#"{"t": {"command": "run", "params": {"--big": 1e20, "--small": 1e-7}}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let params = config.entry("t").unwrap().get(PARAMS).unwrap().as_map().unwrap();
        assert_eq!(params.get("--big"), Some(&Value::scalar("1e20")));
        assert_eq!(params.get("--small"), Some(&Value::scalar("1e-7")));
    }

    #[test]
    fn test_json_keeps_declaration_order() {
        let json = r#"{"b": {"command": "x", "params": {"-y": 1, "-x": [1, 2]}}, "a": {"k": "v"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.ids().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(config.is_task("b"));
        assert!(!config.is_task("a"));
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let json = r#"{"a": {"command": "x", "command": "y"}}"#;
        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_nested_lists_rejected() {
        let yaml = r#"
t:
  command: run
  params:
    --x: [[1, 2]]
"#;
        let result: Result<Config, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_list_text_form() {
        assert_eq!(Value::list(["10", "30"]).as_text().unwrap(), "10\n30\n");
        assert_eq!(Value::scalar("x").as_text().unwrap(), "x");
        assert!(Value::Map(Section::new()).as_text().is_none());
    }

    #[test]
    fn test_section_insert_replaces_in_place() {
        let mut section = Section::new()
            .with("a", Value::scalar("1"))
            .with("b", Value::scalar("2"));
        section.insert("a", Value::scalar("3"));
        assert_eq!(section.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(section.get("a"), Some(&Value::scalar("3")));
    }
}
