//! Resource graph - nodes, dependency edges and output bindings
//!
//! Graphs are assembled with a [`GraphBuilder`]. Inserting a node that reads
//! another node's attribute records a reference edge right away, so a node can
//! only ever point at nodes declared before it. Explicit ordering edges for
//! side-effect-only dependencies are added with [`GraphBuilder::depend`]; those
//! are the only edges that can close a cycle, and [`GraphBuilder::finish`]
//! rejects them.

use crate::error::{Error, Result};
use crate::param::{ParameterBinding, ParameterValues};
use crate::value::{AttrRef, Resolver, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use std::time::Duration;

/// How noteworthy an annotation is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
}

/// A flag attached to a node for the operator's attention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub severity: Severity,
    /// Machine-readable code, e.g. `broad-grant`
    pub code: String,
    pub message: String,
}

impl Annotation {
    pub fn info(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code: code.into(),
            message: message.into(),
        }
    }
}

/// What the provisioning engine does when a barrier exceeds its wait ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpiryAction {
    /// Fail the whole apply
    FailApply,
}

/// Marks a node whose creation blocks until an external job finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Barrier {
    pub wait_ceiling: Duration,
    pub on_expiry: ExpiryAction,
}

/// What happens to the live resource when its node leaves the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    Delete,
    Retain,
}

/// A single infrastructure unit to be provisioned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNode {
    pub id: String,
    pub kind: String,
    pub properties: BTreeMap<String, Value>,
    pub annotations: Vec<Annotation>,
    pub barrier: Option<Barrier>,
    pub deletion: Option<DeletionPolicy>,
}

impl ResourceNode {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            properties: BTreeMap::new(),
            annotations: Vec::new(),
            barrier: None,
            deletion: None,
        }
    }

    /// Set a property
    pub fn prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn barrier(mut self, barrier: Barrier) -> Self {
        self.barrier = Some(barrier);
        self
    }

    pub fn deletion(mut self, policy: DeletionPolicy) -> Self {
        self.deletion = Some(policy);
        self
    }

    /// Every node id referenced by this node's properties
    pub fn references(&self) -> BTreeSet<String> {
        self.properties
            .values()
            .flat_map(Value::references)
            .collect()
    }

    /// Stable identity of the declared configuration
    ///
    /// Hashes the kind and the symbolically rendered properties, so two nodes
    /// with the same fingerprint are declared identically.
    pub fn fingerprint(&self) -> String {
        let resolver = Resolver::symbolic();
        let props: serde_json::Map<_, _> = self
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), resolver.render(v)))
            .collect();
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.kind.as_bytes());
        hasher.update(&[0]);
        hasher.update(serde_json::Value::Object(props).to_string().as_bytes());
        hasher.finalize().to_hex()[..16].to_string()
    }
}

/// Handle to an inserted node, passed forward to downstream builders
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    id: String,
    kind: String,
}

impl NodeHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The node's primary reference
    pub fn reference(&self) -> Value {
        Value::Ref(AttrRef {
            node: self.id.clone(),
            attribute: None,
        })
    }

    /// One of the node's runtime attributes
    pub fn attr(&self, attribute: &str) -> Value {
        Value::Ref(AttrRef {
            node: self.id.clone(),
            attribute: Some(attribute.to_string()),
        })
    }
}

/// Why one node must come before another
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeReason {
    /// The dependent reads one or more of the dependency's attributes
    Reference { attributes: Vec<String> },
    /// Side-effect-only ordering
    Ordering { reason: String },
}

/// "`dependency` must exist and be stable before `dependent` is created or replaced"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub dependency: String,
    pub dependent: String,
    pub reason: EdgeReason,
}

impl DependencyEdge {
    pub fn is_explicit(&self) -> bool {
        matches!(self.reason, EdgeReason::Ordering { .. })
    }
}

/// A named value exposed after provisioning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBinding {
    pub name: String,
    pub source: String,
    pub value: Value,
    pub description: String,
    pub export_name: Option<String>,
}

impl OutputBinding {
    pub fn new(
        name: impl Into<String>,
        source: &NodeHandle,
        value: Value,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.id.clone(),
            value,
            description: description.into(),
            export_name: None,
        }
    }

    pub fn export(mut self, export_name: impl Into<String>) -> Self {
        self.export_name = Some(export_name.into());
        self
    }
}

/// Assembles a [`ResourceGraph`]
#[derive(Debug)]
pub struct GraphBuilder {
    description: String,
    parameters: Vec<ParameterBinding>,
    values: ParameterValues,
    nodes: Vec<ResourceNode>,
    index: HashMap<String, usize>,
    edges: Vec<DependencyEdge>,
    outputs: Vec<OutputBinding>,
}

impl GraphBuilder {
    /// Start a graph, resolving every parameter binding up front
    ///
    /// Nothing is declared if any supplied value is missing or out of bounds.
    pub fn new(
        description: impl Into<String>,
        parameters: Vec<ParameterBinding>,
        supplied: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for binding in &parameters {
            if !seen.insert(binding.name.as_str()) {
                return Err(Error::Duplicate {
                    kind: "parameter",
                    name: binding.name.clone(),
                });
            }
        }
        let values = ParameterValues::resolve_all(&parameters, supplied)?;
        log::debug!("Resolved {} parameter(s)", parameters.len());

        Ok(Self {
            description: description.into(),
            parameters,
            values,
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            outputs: Vec::new(),
        })
    }

    /// Placeholder for a declared parameter
    pub fn param(&self, name: &str) -> Result<Value> {
        if self.parameters.iter().any(|p| p.name == name) {
            Ok(Value::Param(name.to_string()))
        } else {
            Err(Error::UnknownParameter(name.to_string()))
        }
    }

    /// Resolved parameter values
    pub fn values(&self) -> &ParameterValues {
        &self.values
    }

    /// Insert a node, recording one reference edge per referenced node
    pub fn add(&mut self, node: ResourceNode) -> Result<NodeHandle> {
        if self.index.contains_key(&node.id) {
            return Err(Error::DuplicateResource(node.id));
        }

        for param in node.properties.values().flat_map(Value::parameters) {
            if !self.parameters.iter().any(|p| p.name == param) {
                return Err(Error::UnknownParameter(param));
            }
        }

        let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for value in node.properties.values() {
            collect_attributes(value, &mut attributes);
        }
        for (dependency, attrs) in attributes {
            if dependency == node.id {
                return Err(Error::SelfDependency(node.id));
            }
            if !self.index.contains_key(&dependency) {
                return Err(Error::UnknownResource {
                    context: format!("resource '{}'", node.id),
                    id: dependency,
                });
            }
            self.edges.push(DependencyEdge {
                dependency,
                dependent: node.id.clone(),
                reason: EdgeReason::Reference { attributes: attrs },
            });
        }

        let handle = NodeHandle {
            id: node.id.clone(),
            kind: node.kind.clone(),
        };
        log::debug!("Declared {} ({})", node.id, node.kind);
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(handle)
    }

    /// Declare that `dependent` must wait for `dependency`
    pub fn depend(
        &mut self,
        dependent: &NodeHandle,
        dependency: &NodeHandle,
        reason: impl Into<String>,
    ) -> Result<()> {
        if dependent.id == dependency.id {
            return Err(Error::SelfDependency(dependent.id.clone()));
        }
        for id in [&dependent.id, &dependency.id] {
            if !self.index.contains_key(id) {
                return Err(Error::UnknownResource {
                    context: "dependency edge".to_string(),
                    id: id.clone(),
                });
            }
        }
        self.edges.push(DependencyEdge {
            dependency: dependency.id.clone(),
            dependent: dependent.id.clone(),
            reason: EdgeReason::Ordering {
                reason: reason.into(),
            },
        });
        Ok(())
    }

    /// Expose a value after provisioning
    pub fn output(&mut self, output: OutputBinding) -> Result<()> {
        if self.outputs.iter().any(|o| o.name == output.name) {
            return Err(Error::Duplicate {
                kind: "output",
                name: output.name,
            });
        }
        let context = format!("output '{}'", output.name);
        for id in std::iter::once(output.source.clone()).chain(output.value.references()) {
            if !self.index.contains_key(&id) {
                return Err(Error::UnknownResource { context, id });
            }
        }
        self.outputs.push(output);
        Ok(())
    }

    /// Validate and freeze the graph
    pub fn finish(self) -> Result<ResourceGraph> {
        let graph = ResourceGraph {
            description: self.description,
            parameters: self.parameters,
            values: self.values,
            nodes: self.nodes,
            index: self.index,
            edges: self.edges,
            outputs: self.outputs,
        };
        graph.topological_order()?;
        log::debug!(
            "Graph complete: {} node(s), {} edge(s)",
            graph.nodes.len(),
            graph.edges.len()
        );
        Ok(graph)
    }
}

fn collect_attributes(value: &Value, out: &mut BTreeMap<String, Vec<String>>) {
    match value {
        Value::Ref(AttrRef { node, attribute }) => {
            let attrs = out.entry(node.clone()).or_default();
            let attr = attribute.clone().unwrap_or_else(|| "Ref".to_string());
            if !attrs.contains(&attr) {
                attrs.push(attr);
            }
        }
        Value::List(items) | Value::Join(items) => {
            for item in items {
                collect_attributes(item, out);
            }
        }
        Value::Map(entries) => {
            for v in entries.values() {
                collect_attributes(v, out);
            }
        }
        Value::Lookup { query, .. } => {
            for v in query.values() {
                collect_attributes(v, out);
            }
        }
        Value::Base64(inner) => collect_attributes(inner, out),
        _ => {}
    }
}

/// A validated, immutable resource graph
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    description: String,
    parameters: Vec<ParameterBinding>,
    values: ParameterValues,
    nodes: Vec<ResourceNode>,
    index: HashMap<String, usize>,
    edges: Vec<DependencyEdge>,
    outputs: Vec<OutputBinding>,
}

impl ResourceGraph {
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &[ParameterBinding] {
        &self.parameters
    }

    pub fn values(&self) -> &ParameterValues {
        &self.values
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&ResourceNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn outputs(&self) -> &[OutputBinding] {
        &self.outputs
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes of one kind
    pub fn nodes_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a ResourceNode> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    /// Direct dependencies of a node (deduplicated, declaration order)
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        let mut deps: Vec<&str> = self
            .edges
            .iter()
            .filter(|e| e.dependent == id)
            .map(|e| e.dependency.as_str())
            .collect();
        deps.sort_by_key(|d| self.index.get(*d).copied().unwrap_or(usize::MAX));
        deps.dedup();
        deps
    }

    /// Direct dependents of a node (deduplicated, declaration order)
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        let mut deps: Vec<&str> = self
            .edges
            .iter()
            .filter(|e| e.dependency == id)
            .map(|e| e.dependent.as_str())
            .collect();
        deps.sort_by_key(|d| self.index.get(*d).copied().unwrap_or(usize::MAX));
        deps.dedup();
        deps
    }

    /// Whether a direct edge `dependency -> dependent` exists
    pub fn has_edge(&self, dependency: &str, dependent: &str) -> bool {
        self.edges
            .iter()
            .any(|e| e.dependency == dependency && e.dependent == dependent)
    }

    /// Whether `dependent` (transitively) depends on `dependency`
    pub fn depends_transitively(&self, dependent: &str, dependency: &str) -> bool {
        let mut stack = vec![dependent];
        let mut seen = BTreeSet::new();
        while let Some(current) = stack.pop() {
            for dep in self.dependencies_of(current) {
                if dep == dependency {
                    return true;
                }
                if seen.insert(dep) {
                    stack.push(dep);
                }
            }
        }
        false
    }

    /// Node ids with every dependency before its dependents
    ///
    /// Ties are broken by declaration order, so the result is deterministic.
    pub fn topological_order(&self) -> Result<Vec<&str>> {
        let n = self.nodes.len();
        let mut indegree = vec![0usize; n];
        let mut adjacency: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        for edge in &self.edges {
            let (Some(&from), Some(&to)) =
                (self.index.get(&edge.dependency), self.index.get(&edge.dependent))
            else {
                continue;
            };
            if adjacency[from].insert(to) {
                indegree[to] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(next) = ready.pop_first() {
            order.push(self.nodes[next].id.as_str());
            for &to in &adjacency[next] {
                indegree[to] -= 1;
                if indegree[to] == 0 {
                    ready.insert(to);
                }
            }
        }

        if order.len() < n {
            let remaining: Vec<usize> = (0..n).filter(|&i| indegree[i] > 0).collect();
            return Err(Error::Cycle(self.find_cycle(&remaining, &adjacency)));
        }
        Ok(order)
    }

    fn find_cycle(&self, remaining: &[usize], adjacency: &[BTreeSet<usize>]) -> Vec<String> {
        // Every node left after Kahn's algorithm has an unresolved predecessor,
        // so walking predecessors inside the remainder must revisit a node.
        let in_remainder: BTreeSet<usize> = remaining.iter().copied().collect();
        let Some(&start) = remaining.first() else {
            return Vec::new();
        };
        let mut path = vec![start];
        let mut current = start;
        loop {
            let Some(pred) = (0..adjacency.len())
                .find(|&p| in_remainder.contains(&p) && adjacency[p].contains(&current))
            else {
                break;
            };
            if let Some(pos) = path.iter().position(|&p| p == pred) {
                let mut cycle = vec![self.nodes[pred].id.clone()];
                cycle.extend(path[pos..].iter().rev().map(|&i| self.nodes[i].id.clone()));
                return cycle;
            }
            path.push(pred);
            current = pred;
        }
        path.iter().map(|&i| self.nodes[i].id.clone()).collect()
    }

    /// Render the graph in Graphviz dot format
    ///
    /// Explicit ordering edges are dashed; barrier nodes are drawn as octagons.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph resources {\n    rankdir=LR;\n");
        for node in &self.nodes {
            let shape = if node.barrier.is_some() {
                "octagon"
            } else {
                "box"
            };
            let _ = writeln!(
                out,
                "    \"{}\" [label=\"{}\\n{}\", shape={}];",
                node.id, node.id, node.kind, shape
            );
        }
        for edge in &self.edges {
            let style = match &edge.reason {
                EdgeReason::Reference { .. } => String::new(),
                EdgeReason::Ordering { reason } => {
                    format!(" [style=dashed, label=\"{}\"]", reason.replace('"', "'"))
                }
            };
            let _ = writeln!(
                out,
                "    \"{}\" -> \"{}\"{};",
                edge.dependency, edge.dependent, style
            );
        }
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::ParamValue;

    fn builder() -> GraphBuilder {
        GraphBuilder::new("test", Vec::new(), &BTreeMap::new()).unwrap()
    }

    #[test]
    fn test_reference_creates_edge() {
        let mut b = builder();
        let queue = b.add(ResourceNode::new("Queue", "queue")).unwrap();
        b.add(ResourceNode::new("Fn", "function").prop("Url", queue.attr("QueueUrl")))
            .unwrap();
        let graph = b.finish().unwrap();

        assert!(graph.has_edge("Queue", "Fn"));
        assert_eq!(
            graph.edges()[0].reason,
            EdgeReason::Reference {
                attributes: vec!["QueueUrl".into()]
            }
        );
    }

    #[test]
    fn test_forward_reference_is_rejected() {
        let mut b = builder();
        let ghost = NodeHandle {
            id: "Later".into(),
            kind: "x".into(),
        };
        let err = b
            .add(ResourceNode::new("Early", "x").prop("P", ghost.reference()))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownResource { ref id, .. } if id == "Later"));
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let mut b = builder();
        b.add(ResourceNode::new("A", "x")).unwrap();
        assert_eq!(
            b.add(ResourceNode::new("A", "y")).unwrap_err(),
            Error::DuplicateResource("A".into())
        );
    }

    #[test]
    fn test_explicit_cycle_is_rejected() {
        let mut b = builder();
        let a = b.add(ResourceNode::new("A", "x")).unwrap();
        let c = b.add(ResourceNode::new("B", "x").prop("P", a.reference())).unwrap();
        b.depend(&a, &c, "loop").unwrap();

        match b.finish().unwrap_err() {
            Error::Cycle(path) => {
                assert_eq!(path.first(), path.last());
                assert!(path.contains(&"A".to_string()));
                assert!(path.contains(&"B".to_string()));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_rejected() {
        let mut b = builder();
        let a = b.add(ResourceNode::new("A", "x")).unwrap();
        assert_eq!(
            b.depend(&a, &a, "self").unwrap_err(),
            Error::SelfDependency("A".into())
        );
    }

    #[test]
    fn test_topological_order_respects_edges_and_declaration_order() {
        let mut b = builder();
        let a = b.add(ResourceNode::new("A", "x")).unwrap();
        let z = b.add(ResourceNode::new("Z", "x")).unwrap();
        let c = b.add(ResourceNode::new("C", "x").prop("P", a.reference())).unwrap();
        b.depend(&z, &c, "z after c").unwrap();
        let graph = b.finish().unwrap();

        assert_eq!(graph.topological_order().unwrap(), vec!["A", "C", "Z"]);
        assert!(graph.depends_transitively("Z", "A"));
        assert!(!graph.depends_transitively("A", "Z"));
    }

    #[test]
    fn test_output_with_unknown_source_is_rejected() {
        let mut b = builder();
        let a = b.add(ResourceNode::new("A", "x")).unwrap();
        b.output(OutputBinding::new("Out", &a, a.reference(), "ok"))
            .unwrap();
        let ghost = NodeHandle {
            id: "Ghost".into(),
            kind: "x".into(),
        };
        assert!(matches!(
            b.output(OutputBinding::new("Other", &ghost, Value::str("v"), "bad")),
            Err(Error::UnknownResource { .. })
        ));
        assert!(matches!(
            b.output(OutputBinding::new("Out", &a, Value::str("v"), "dup")),
            Err(Error::Duplicate { kind: "output", .. })
        ));
    }

    #[test]
    fn test_invalid_parameter_fails_before_any_node() {
        let bindings = vec![
            ParameterBinding::number("size", "size")
                .with_default(ParamValue::Number(5))
                .with_min_value(1),
        ];
        let mut supplied = BTreeMap::new();
        supplied.insert("size".to_string(), "0".to_string());

        assert!(matches!(
            GraphBuilder::new("test", bindings, &supplied),
            Err(Error::ConstraintViolation { .. })
        ));
    }

    #[test]
    fn test_undeclared_parameter_in_property_is_rejected() {
        let mut b = builder();
        let err = b
            .add(ResourceNode::new("A", "x").prop("P", Value::Param("missing".into())))
            .unwrap_err();
        assert_eq!(err, Error::UnknownParameter("missing".into()));
    }

    #[test]
    fn test_fingerprint_tracks_configuration() {
        let a = ResourceNode::new("A", "queue").prop("Timeout", 30i64);
        let b = ResourceNode::new("B", "queue").prop("Timeout", 30i64);
        let c = ResourceNode::new("A", "queue").prop("Timeout", 60i64);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_dot_marks_ordering_edges() {
        let mut b = builder();
        let a = b.add(ResourceNode::new("A", "x")).unwrap();
        let c = b.add(ResourceNode::new("C", "x")).unwrap();
        b.depend(&c, &a, "after a").unwrap();
        let dot = b.finish().unwrap().to_dot();
        assert!(dot.contains("\"A\" -> \"C\" [style=dashed, label=\"after a\"];"));
    }
}
