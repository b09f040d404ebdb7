//! Typed property values
//!
//! A [`Value`] is the desired-state description of a single resource property.
//! Besides plain data it can hold references to other nodes, parameter and
//! pseudo-parameter placeholders, string joins and apply-time lookups. None of
//! these are resolved at construction time; a [`Resolver`] renders them into
//! template JSON later.

use crate::param::{ParamValue, ParameterValues};
use serde_json::{Map, Value as Json, json};
use std::collections::{BTreeMap, BTreeSet};

/// Reference to a node, or to one of its runtime attributes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttrRef {
    /// Logical id of the referenced node
    pub node: String,
    /// Attribute name, or `None` for the node's primary reference
    pub attribute: Option<String>,
}

/// Values supplied by the provisioning environment rather than by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pseudo {
    Account,
    Region,
    Partition,
}

impl Pseudo {
    /// Token used when the value is not known at render time
    pub fn token(self) -> &'static str {
        match self {
            Self::Account => "AWS::AccountId",
            Self::Region => "AWS::Region",
            Self::Partition => "AWS::Partition",
        }
    }
}

/// A declared property value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Runtime attribute of another node in the graph
    Ref(AttrRef),
    /// Operator-supplied parameter, by name
    Param(String),
    /// Environment-supplied value
    Pseudo(Pseudo),
    /// String concatenation of the parts
    Join(Vec<Value>),
    /// Base64 encoding performed by the provisioning engine
    Base64(Box<Value>),
    /// Query resolved by the provisioning engine at apply time
    Lookup {
        provider: String,
        query: BTreeMap<String, Value>,
    },
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn join<I>(parts: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Self::Join(parts.into_iter().map(Into::into).collect())
    }

    pub fn base64(inner: Value) -> Self {
        Self::Base64(Box::new(inner))
    }

    /// The literal wildcard resource scope
    pub fn wildcard() -> Self {
        Self::str("*")
    }

    /// Whether this value is the literal wildcard `*`
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Str(s) if s == "*")
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a key when this value is a map
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Ids of every node this value references, recursively
    pub fn references(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Ref(r) => {
                out.insert(r.node.clone());
            }
            Self::List(items) | Self::Join(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Self::Map(entries) => {
                for v in entries.values() {
                    v.collect_references(out);
                }
            }
            Self::Lookup { query, .. } => {
                for v in query.values() {
                    v.collect_references(out);
                }
            }
            Self::Base64(inner) => inner.collect_references(out),
            Self::Null
            | Self::Bool(_)
            | Self::Int(_)
            | Self::Str(_)
            | Self::Param(_)
            | Self::Pseudo(_) => {}
        }
    }

    /// Names of every parameter this value uses
    pub fn parameters(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_parameters(&mut out);
        out
    }

    fn collect_parameters(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Param(name) => {
                out.insert(name.clone());
            }
            Self::List(items) | Self::Join(items) => {
                for item in items {
                    item.collect_parameters(out);
                }
            }
            Self::Map(entries) => {
                for v in entries.values() {
                    v.collect_parameters(out);
                }
            }
            Self::Lookup { query, .. } => {
                for v in query.values() {
                    v.collect_parameters(out);
                }
            }
            Self::Base64(inner) => inner.collect_parameters(out),
            _ => {}
        }
    }

    /// Splice a runtime value into static text at every occurrence of `placeholder`
    pub fn interpolate(text: &str, placeholder: &str, value: &Value) -> Value {
        let mut parts = Vec::new();
        let mut pieces = text.split(placeholder).peekable();
        while let Some(piece) = pieces.next() {
            if !piece.is_empty() {
                parts.push(Value::str(piece));
            }
            if pieces.peek().is_some() {
                parts.push(value.clone());
            }
        }
        Value::Join(parts)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Pseudo> for Value {
    fn from(p: Pseudo) -> Self {
        Self::Pseudo(p)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

/// Account and region the graph is provisioned into
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub account: Option<String>,
    pub region: Option<String>,
}

impl Environment {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: Some(account.into()),
            region: Some(region.into()),
        }
    }

    /// Concrete value of a pseudo parameter, when known
    pub fn pseudo(&self, pseudo: Pseudo) -> Option<String> {
        match pseudo {
            Pseudo::Account => self.account.clone(),
            Pseudo::Region => self.region.clone(),
            Pseudo::Partition => Some("aws".to_string()),
        }
    }
}

/// Renders [`Value`]s into template JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct Resolver<'a> {
    parameters: Option<&'a ParameterValues>,
    environment: Option<&'a Environment>,
}

impl<'a> Resolver<'a> {
    /// Keep parameters and pseudo parameters as references
    pub fn symbolic() -> Self {
        Self::default()
    }

    /// Substitute parameter values and the known environment
    pub fn with_environment(parameters: &'a ParameterValues, environment: &'a Environment) -> Self {
        Self {
            parameters: Some(parameters),
            environment: Some(environment),
        }
    }

    fn param(&self, name: &str) -> Option<&ParamValue> {
        self.parameters.and_then(|p| p.get(name))
    }

    fn pseudo(&self, pseudo: Pseudo) -> Option<String> {
        self.environment.and_then(|env| env.pseudo(pseudo))
    }

    /// Render a value into template JSON
    pub fn render(&self, value: &Value) -> Json {
        match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(n) => json!(n),
            Value::Str(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(items.iter().map(|v| self.render(v)).collect()),
            Value::Map(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), self.render(v)))
                    .collect::<Map<_, _>>(),
            ),
            Value::Ref(AttrRef {
                node,
                attribute: None,
            }) => json!({ "Ref": node }),
            Value::Ref(AttrRef {
                node,
                attribute: Some(attr),
            }) => json!({ "Fn::GetAtt": [node, attr] }),
            Value::Param(name) => match self.param(name) {
                Some(ParamValue::String(s)) => Json::String(s.clone()),
                Some(ParamValue::Number(n)) => json!(n),
                None => json!({ "Ref": name }),
            },
            Value::Pseudo(p) => match self.pseudo(*p) {
                Some(s) => Json::String(s),
                None => json!({ "Ref": p.token() }),
            },
            Value::Join(parts) => self.render_join(parts),
            Value::Base64(inner) => json!({ "Fn::Base64": self.render(inner) }),
            Value::Lookup { provider, query } => {
                let query: Map<_, _> = query
                    .iter()
                    .map(|(k, v)| (k.clone(), self.render(v)))
                    .collect();
                json!({ "Lookup": { "Provider": provider, "Query": query } })
            }
        }
    }

    fn render_join(&self, parts: &[Value]) -> Json {
        let mut rendered: Vec<Json> = Vec::new();
        for part in parts {
            match self.render(part) {
                Json::String(s) => push_text(&mut rendered, &s),
                Json::Number(n) => push_text(&mut rendered, &n.to_string()),
                Json::Object(obj) if is_plain_join(&obj) => {
                    if let Some(Json::Array(inner)) = obj
                        .get("Fn::Join")
                        .and_then(|j| j.get(1))
                        .cloned()
                    {
                        for item in inner {
                            match item {
                                Json::String(s) => push_text(&mut rendered, &s),
                                other => rendered.push(other),
                            }
                        }
                    }
                }
                other => rendered.push(other),
            }
        }
        match rendered.as_slice() {
            [] => Json::String(String::new()),
            [Json::String(s)] => Json::String(s.clone()),
            _ => json!({ "Fn::Join": ["", rendered] }),
        }
    }

    /// Render a value as display text, using `${...}` tokens for anything unresolved
    pub fn render_text(&self, value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Str(s) => s.clone(),
            Value::Ref(AttrRef {
                node,
                attribute: None,
            }) => format!("${{{node}}}"),
            Value::Ref(AttrRef {
                node,
                attribute: Some(attr),
            }) => format!("${{{node}.{attr}}}"),
            Value::Param(name) => match self.param(name) {
                Some(v) => v.to_string(),
                None => format!("${{{name}}}"),
            },
            Value::Pseudo(p) => self
                .pseudo(*p)
                .unwrap_or_else(|| format!("${{{}}}", p.token())),
            Value::Join(parts) => parts.iter().map(|p| self.render_text(p)).collect(),
            other => self.render(other).to_string(),
        }
    }
}

fn push_text(rendered: &mut Vec<Json>, text: &str) {
    if let Some(Json::String(last)) = rendered.last_mut() {
        last.push_str(text);
    } else {
        rendered.push(Json::String(text.to_string()));
    }
}

fn is_plain_join(obj: &Map<String, Json>) -> bool {
    obj.len() == 1
        && obj
            .get("Fn::Join")
            .and_then(|j| j.get(0))
            .is_some_and(|sep| sep == "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_ref(node: &str, attr: Option<&str>) -> Value {
        Value::Ref(AttrRef {
            node: node.to_string(),
            attribute: attr.map(str::to_string),
        })
    }

    #[test]
    fn test_references_are_collected_recursively() {
        let value = Value::map([
            ("Url", node_ref("Queue", Some("QueueUrl"))),
            (
                "Nested",
                Value::list([Value::join([Value::str("s3://"), node_ref("Bucket", None)])]),
            ),
        ]);

        let refs: Vec<_> = value.references().into_iter().collect();
        assert_eq!(refs, vec!["Bucket".to_string(), "Queue".to_string()]);
    }

    #[test]
    fn test_join_collapses_when_fully_resolved() {
        let mut params = ParameterValues::default();
        params.insert("prefix", ParamValue::String("demo".into()));
        let env = Environment::new("123456789012", "us-east-1");
        let resolver = Resolver::with_environment(&params, &env);

        let value = Value::join([
            Value::Param("prefix".into()),
            Value::str("-"),
            Value::Pseudo(Pseudo::Account),
            Value::str("-"),
            Value::Pseudo(Pseudo::Region),
        ]);

        assert_eq!(
            resolver.render(&value),
            Json::String("demo-123456789012-us-east-1".into())
        );
    }

    #[test]
    fn test_join_keeps_intrinsics_for_references() {
        let value = Value::join([
            Value::str("s3://"),
            node_ref("Bucket", None),
            Value::str("/input/"),
        ]);

        let rendered = Resolver::symbolic().render(&value);
        assert_eq!(
            rendered,
            json!({ "Fn::Join": ["", ["s3://", { "Ref": "Bucket" }, "/input/"]] })
        );
    }

    #[test]
    fn test_nested_joins_are_flattened() {
        let inner = Value::join([Value::str("a"), node_ref("X", None)]);
        let outer = Value::join([inner, Value::str("b"), Value::str("c")]);

        let rendered = Resolver::symbolic().render(&outer);
        assert_eq!(
            rendered,
            json!({ "Fn::Join": ["", ["a", { "Ref": "X" }, "bc"]] })
        );
    }

    #[test]
    fn test_symbolic_pseudo_renders_as_ref() {
        let rendered = Resolver::symbolic().render(&Value::Pseudo(Pseudo::Region));
        assert_eq!(rendered, json!({ "Ref": "AWS::Region" }));
    }

    #[test]
    fn test_interpolate_splices_value() {
        let region = Value::Pseudo(Pseudo::Region);
        let value = Value::interpolate("{\"region\":\"@R@\",\"again\":\"@R@\"}", "@R@", &region);

        let env = Environment::new("1", "eu-west-1");
        let params = ParameterValues::default();
        let text = Resolver::with_environment(&params, &env).render_text(&value);
        assert_eq!(text, "{\"region\":\"eu-west-1\",\"again\":\"eu-west-1\"}");
    }

    #[test]
    fn test_render_text_uses_tokens() {
        let value = Value::join([Value::str("url="), node_ref("Queue", Some("QueueUrl"))]);
        assert_eq!(
            Resolver::symbolic().render_text(&value),
            "url=${Queue.QueueUrl}"
        );
    }
}
