use apollo_parser::{Lexer, TokenKind};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

use crate::utils::error::{EngineError, EngineResult};

/// Stable identity of a query, derived from its normalized form.
///
/// Hex-encoded SHA-256; equal descriptors always produce equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable GraphQL request: document, operation name and variables
#[derive(Debug, Clone)]
pub struct QueryDescriptor {
    document: Arc<str>,
    normalized: Arc<str>,
    operation_name: Arc<str>,
    variables: Arc<Map<String, Value>>,
}

impl QueryDescriptor {
    /// Create a descriptor with no variables
    pub fn new(document: &str, operation_name: &str) -> EngineResult<Self> {
        Self::with_variables(document, operation_name, Map::new())
    }

    /// Create a descriptor with a variable map
    pub fn with_variables(
        document: &str,
        operation_name: &str,
        variables: Map<String, Value>,
    ) -> EngineResult<Self> {
        let normalized = normalize_document(document)?;
        if normalized.is_empty() {
            return Err(EngineError::InvalidDescriptor(
                "document must not be empty".to_string(),
            ));
        }

        let operation_name = operation_name.trim();
        if operation_name.is_empty() {
            return Err(EngineError::InvalidDescriptor(
                "operation name must not be empty".to_string(),
            ));
        }

        Ok(Self {
            document: Arc::from(document),
            normalized: Arc::from(normalized.as_str()),
            operation_name: Arc::from(operation_name),
            variables: Arc::new(variables),
        })
    }

    /// Create a descriptor from a JSON variables value, which must be an
    /// object or null
    pub fn from_json_variables(
        document: &str,
        operation_name: &str,
        variables: Value,
    ) -> EngineResult<Self> {
        match variables {
            Value::Object(map) => Self::with_variables(document, operation_name, map),
            Value::Null => Self::new(document, operation_name),
            other => Err(EngineError::InvalidDescriptor(format!(
                "variables must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Return a copy with one variable set
    pub fn with_variable(&self, name: &str, value: impl Into<Value>) -> Self {
        let mut variables = (*self.variables).clone();
        variables.insert(name.to_string(), value.into());

        Self {
            document: self.document.clone(),
            normalized: self.normalized.clone(),
            operation_name: self.operation_name.clone(),
            variables: Arc::new(variables),
        }
    }

    /// The document as supplied by the caller
    pub fn document(&self) -> &str {
        &self.document
    }

    /// The document with insignificant whitespace, commas and comments removed
    pub fn normalized_document(&self) -> &str {
        &self.normalized
    }

    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    /// Derive the cache key.
    ///
    /// Each component is length-prefixed so distinct component splits cannot
    /// collide; variables are hashed in canonical (key-sorted) JSON.
    pub fn cache_key(&self) -> CacheKey {
        let mut canonical = String::new();
        write_canonical_object(&self.variables, &mut canonical);

        let mut hasher = Sha256::new();
        for part in [&*self.normalized, &*self.operation_name, canonical.as_str()] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }

        CacheKey(Arc::from(format!("{:x}", hasher.finalize()).as_str()))
    }
}

impl PartialEq for QueryDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
            && self.operation_name == other.operation_name
            && self.variables == other.variables
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_canonical_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Display for scalars is compact JSON with string escaping
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_canonical_object(map: &Map<String, Value>, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        if let Some(value) = map.get(key) {
            write_canonical(value, out);
        }
    }
    out.push('}');
}

/// Collapse a GraphQL document to a canonical single-line form.
///
/// The document is tokenized with the GraphQL lexer. Whitespace, comments
/// and commas are dropped; a single space is kept only between two adjacent
/// non-punctuator tokens, so documents with the same significant tokens
/// always normalize identically. String and block-string tokens are kept
/// verbatim.
pub fn normalize_document(document: &str) -> EngineResult<String> {
    let mut out = String::with_capacity(document.len());
    let mut previous_was_word = false;

    for token in Lexer::new(document) {
        let token = token.map_err(|e| {
            EngineError::InvalidDescriptor(format!("document is not valid GraphQL: {}", e.message()))
        })?;

        match token.kind() {
            TokenKind::Whitespace | TokenKind::Comment | TokenKind::Comma => continue,
            TokenKind::Eof => break,
            TokenKind::Name | TokenKind::StringValue | TokenKind::Int | TokenKind::Float => {
                if previous_was_word {
                    out.push(' ');
                }
                out.push_str(token.data());
                previous_was_word = true;
            }
            _ => {
                out.push_str(token.data());
                previous_was_word = false;
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_equal_descriptors_have_equal_keys() {
        let a = QueryDescriptor::new("query Hello { hello }", "Hello").unwrap();
        let b = QueryDescriptor::new("query Hello { hello }", "Hello").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key().as_str().len(), 64);
    }

    #[test]
    fn test_formatting_does_not_change_key() {
        let compact = QueryDescriptor::new("query Hello{hello}", "Hello").unwrap();
        let pretty = QueryDescriptor::new(
            "# greet the user\nquery Hello {\n  hello, # trailing comment\n}\n",
            "Hello",
        )
        .unwrap();

        assert_eq!(compact.normalized_document(), "query Hello{hello}");
        assert_eq!(pretty.normalized_document(), "query Hello{hello}");
        assert_eq!(compact.cache_key(), pretty.cache_key());
    }

    #[test]
    fn test_variable_order_does_not_change_key() {
        let doc = "query Feed($first: Int, $after: String) { feed(first: $first, after: $after) { id } }";
        let a = QueryDescriptor::with_variables(doc, "Feed", vars(json!({"first": 10, "after": "c1"}))).unwrap();
        let b = QueryDescriptor::new(doc, "Feed")
            .unwrap()
            .with_variable("after", "c1")
            .with_variable("first", 10);

        assert_eq!(a, b);
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_nested_variable_order_does_not_change_key() {
        let doc = "query Search($filter: Filter) { search(filter: $filter) { id } }";
        let a = QueryDescriptor::from_json_variables(
            doc,
            "Search",
            json!({"filter": {"tags": ["a", "b"], "owner": {"id": 1, "kind": "user"}}}),
        )
        .unwrap();
        let b = QueryDescriptor::from_json_variables(
            doc,
            "Search",
            json!({"filter": {"owner": {"kind": "user", "id": 1}, "tags": ["a", "b"]}}),
        )
        .unwrap();

        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_different_inputs_have_different_keys() {
        let doc = "query User($id: ID!) { user(id: $id) { name } }";
        let base = QueryDescriptor::new(doc, "User").unwrap();
        let one = base.with_variable("id", "1");
        let two = base.with_variable("id", "2");
        let renamed = QueryDescriptor::new(doc, "OtherUser").unwrap().with_variable("id", "1");
        let array_order = base.with_variable("id", json!(["1", "2"]));
        let array_swapped = base.with_variable("id", json!(["2", "1"]));

        assert_ne!(one.cache_key(), two.cache_key());
        assert_ne!(one.cache_key(), renamed.cache_key());
        assert_ne!(one.cache_key(), base.cache_key());
        assert_ne!(array_order.cache_key(), array_swapped.cache_key());
    }

    #[test]
    fn test_string_literals_are_preserved() {
        let doc = "query Q { search(text: \"a,  b # not a comment\") { id } }";
        let normalized = normalize_document(doc).unwrap();

        assert_eq!(normalized, "query Q{search(text:\"a,  b # not a comment\"){id}}");

        let other = QueryDescriptor::new("query Q { search(text: \"a, b # not a comment\") { id } }", "Q").unwrap();
        let original = QueryDescriptor::new(doc, "Q").unwrap();
        assert_ne!(original.cache_key(), other.cache_key());
    }

    #[test]
    fn test_escaped_quotes_and_block_strings() {
        assert_eq!(
            normalize_document("{ a(s: \"say \\\"hi\\\"\") }").unwrap(),
            "{a(s:\"say \\\"hi\\\"\")}"
        );
        assert_eq!(
            normalize_document("{ a(s: \"\"\"\n  multi, line\n\"\"\") }").unwrap(),
            "{a(s:\"\"\"\n  multi, line\n\"\"\")}"
        );
    }

    #[test]
    fn test_spaces_kept_between_names() {
        assert_eq!(
            normalize_document("fragment F on User { ... on Admin { level } }").unwrap(),
            "fragment F on User{...on Admin{level}}"
        );
    }

    #[test]
    fn test_empty_inputs_rejected() {
        assert!(matches!(
            QueryDescriptor::new("   # only a comment\n", "Hello"),
            Err(EngineError::InvalidDescriptor(_))
        ));
        assert!(matches!(
            QueryDescriptor::new("query { hello }", " "),
            Err(EngineError::InvalidDescriptor(_))
        ));
        assert!(matches!(
            QueryDescriptor::from_json_variables("query { hello }", "Hello", json!([1])),
            Err(EngineError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn test_null_variables_treated_as_empty() {
        let a = QueryDescriptor::from_json_variables("query { hello }", "Hello", Value::Null).unwrap();
        let b = QueryDescriptor::new("query { hello }", "Hello").unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
        assert!(a.variables().is_empty());
    }

    #[test]
    fn test_adjacent_literals_normalize_by_token() {
        let separated = QueryDescriptor::new("query Q { f(tags: [\"a\", \"b\"], ids: [1 2]) }", "Q").unwrap();
        let packed = QueryDescriptor::new("query Q{f(tags:[\"a\"\"b\"],ids:[1,2])}", "Q").unwrap();

        assert_eq!(separated.normalized_document(), "query Q{f(tags:[\"a\" \"b\"]ids:[1 2])}");
        assert_eq!(separated.normalized_document(), packed.normalized_document());
        assert_eq!(separated.cache_key(), packed.cache_key());
    }

    #[test]
    fn test_unlexable_document_rejected() {
        assert!(matches!(
            QueryDescriptor::new("query Q { f(text: \"unterminated) }", "Q"),
            Err(EngineError::InvalidDescriptor(_))
        ));
    }
}
