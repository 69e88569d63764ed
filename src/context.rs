//! Activity context: ordered substitution values and template rendering.
//!
//! Titles and descriptions are templates with `{name}` placeholders. The
//! context is stored on the activity in its serialized JSON form; the
//! encoding round-trips strings, integers, floats and booleans exactly.

use crate::error::Result;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A single substitution value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Bool(b) => write!(f, "{}", b),
            ContextValue::Int(n) => write!(f, "{}", n),
            ContextValue::Float(x) => write!(f, "{}", x),
            ContextValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::Text(s.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        ContextValue::Text(s)
    }
}

impl From<bool> for ContextValue {
    fn from(b: bool) -> Self {
        ContextValue::Bool(b)
    }
}

impl From<i64> for ContextValue {
    fn from(n: i64) -> Self {
        ContextValue::Int(n)
    }
}

impl From<u64> for ContextValue {
    fn from(n: u64) -> Self {
        match i64::try_from(n) {
            Ok(n) => ContextValue::Int(n),
            Err(_) => ContextValue::Text(n.to_string()),
        }
    }
}

impl From<f64> for ContextValue {
    fn from(x: f64) -> Self {
        ContextValue::Float(x)
    }
}

/// Insertion-ordered, string-keyed map of substitution values.
///
/// Setting an existing key replaces its value in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Context {
    entries: Vec<(String, ContextValue)>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert only when a value is present.
    pub fn with_opt<V: Into<ContextValue>>(mut self, key: impl Into<String>, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.insert(key, value);
        }
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Encode for storage on an activity.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a stored context.
    pub fn decode(encoded: &str) -> Result<Self> {
        Ok(serde_json::from_str(encoded)?)
    }
}

impl Serialize for Context {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct ContextVisitor;

impl<'de> Visitor<'de> for ContextVisitor {
    type Value = Context;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of context values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Context, A::Error> {
        let mut context = Context::new();
        while let Some((key, value)) = access.next_entry::<String, ContextValue>()? {
            context.insert(key, value);
        }
        Ok(context)
    }
}

impl<'de> Deserialize<'de> for Context {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(ContextVisitor)
    }
}

/// Render a `{name}` template against a context.
///
/// `{{` and `}}` produce literal braces. Placeholders with no matching key,
/// and unterminated placeholders, are emitted verbatim.
pub fn render(template: &str, context: &Context) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                out.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                out.push('}');
            }
            '{' => match template[i + 1..].find('}') {
                Some(len) => {
                    let name = &template[i + 1..i + 1 + len];
                    match context.get(name) {
                        Some(value) => out.push_str(&value.to_string()),
                        None => {
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    // Skip the placeholder name and the closing brace.
                    for _ in 0..name.chars().count() + 1 {
                        chars.next();
                    }
                }
                None => out.push('{'),
            },
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_preserves_order_and_types() {
        let context = Context::new()
            .with("name", "Ticket 42")
            .with("priority", 3i64)
            .with("ratio", 0.5f64)
            .with("whole", 2.0f64)
            .with("urgent", true);

        let encoded = context.encode().unwrap();
        assert!(encoded.starts_with("{\"name\""));

        let decoded = Context::decode(&encoded).unwrap();
        assert_eq!(decoded, context);
        assert_eq!(decoded.get("whole"), Some(&ContextValue::Float(2.0)));
        assert_eq!(decoded.get("priority"), Some(&ContextValue::Int(3)));
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut context = Context::new().with("a", 1i64).with("b", 2i64);
        context.insert("a", "one");
        let keys: Vec<_> = context.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(context.get("a"), Some(&ContextValue::Text("one".into())));
    }

    #[test]
    fn test_render_placeholders() {
        let context = Context::new()
            .with("class", "ticket")
            .with("name", "Broken build")
            .with("author", "alice");
        assert_eq!(
            render("{class} {name} created by {author}", &context),
            "ticket Broken build created by alice"
        );
    }

    #[test]
    fn test_render_unknown_and_escaped() {
        let context = Context::new().with("x", 1i64);
        assert_eq!(render("{x} {missing}", &context), "1 {missing}");
        assert_eq!(render("{{x}} {x}", &context), "{x} 1");
        assert_eq!(render("open {x", &context), "open {x");
    }

    #[test]
    fn test_render_multibyte() {
        let context = Context::new().with("who", "Zoë");
        assert_eq!(render("→ {who} ←", &context), "→ Zoë ←");
    }
}
