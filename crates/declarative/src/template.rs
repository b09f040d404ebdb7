//! Synthesized templates - the hand-off format for the provisioning engine

use crate::graph::{Annotation, DeletionPolicy, ExpiryAction, ResourceGraph};
use crate::param::{ParamKind, ParamValue};
use crate::value::Resolver;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::{BTreeMap, BTreeSet};

/// A rendered resource graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, TemplateParameter>,
    #[serde(default)]
    pub resources: BTreeMap<String, TemplateResource>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, TemplateOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateParameter {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Json>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, Json>,
    /// Explicit ordering dependencies only; reference edges are implied by the properties
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,
    #[serde(default)]
    pub metadata: ResourceMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceMetadata {
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barrier: Option<BarrierMetadata>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BarrierMetadata {
    pub wait_ceiling_seconds: u64,
    pub on_expiry: ExpiryAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateOutput {
    pub value: Json,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<OutputExport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutputExport {
    pub name: String,
}

impl TemplateResource {
    /// Every resource this one depends on: explicit `DependsOn` plus `Ref`/`Fn::GetAtt` targets
    ///
    /// Pseudo-parameter references (`AWS::...`) and parameter references are
    /// included verbatim; callers filter against the ids they know.
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut out: BTreeSet<String> = self.depends_on.iter().cloned().collect();
        for value in self.properties.values() {
            collect_refs(value, &mut out);
        }
        out
    }
}

fn collect_refs(value: &Json, out: &mut BTreeSet<String>) {
    match value {
        Json::Object(obj) => {
            if let Some(Json::String(id)) = obj.get("Ref") {
                out.insert(id.clone());
            }
            if let Some(Json::String(id)) = obj.get("Fn::GetAtt").and_then(|a| a.get(0)) {
                out.insert(id.clone());
            }
            for v in obj.values() {
                collect_refs(v, out);
            }
        }
        Json::Array(items) => {
            for v in items {
                collect_refs(v, out);
            }
        }
        _ => {}
    }
}

impl Template {
    /// Render a graph with the given resolver
    pub fn synthesize(graph: &ResourceGraph, resolver: &Resolver<'_>) -> Self {
        let parameters = graph
            .parameters()
            .iter()
            .map(|p| {
                let default = p.default.as_ref().map(|d| match d {
                    ParamValue::Number(n) => Json::from(*n),
                    ParamValue::String(s) => Json::from(s.as_str()),
                });
                let kind = match p.kind {
                    ParamKind::String => "String",
                    ParamKind::Number => "Number",
                };
                (
                    p.name.clone(),
                    TemplateParameter {
                        kind: kind.to_string(),
                        default,
                        description: p.description.clone(),
                        min_value: p.min_value,
                        allowed_pattern: p.allowed_pattern.clone(),
                    },
                )
            })
            .collect();

        let resources = graph
            .nodes()
            .iter()
            .map(|node| {
                let properties = node
                    .properties
                    .iter()
                    .map(|(k, v)| (k.clone(), resolver.render(v)))
                    .collect();
                let mut depends_on: Vec<String> = graph
                    .edges()
                    .iter()
                    .filter(|e| e.dependent == node.id && e.is_explicit())
                    .map(|e| e.dependency.clone())
                    .collect();
                depends_on.sort();
                depends_on.dedup();

                let resource = TemplateResource {
                    kind: node.kind.clone(),
                    properties,
                    depends_on,
                    deletion_policy: node.deletion,
                    metadata: ResourceMetadata {
                        fingerprint: node.fingerprint(),
                        barrier: node.barrier.map(|b| BarrierMetadata {
                            wait_ceiling_seconds: b.wait_ceiling.as_secs(),
                            on_expiry: b.on_expiry,
                        }),
                        annotations: node.annotations.clone(),
                    },
                };
                (node.id.clone(), resource)
            })
            .collect();

        let outputs = graph
            .outputs()
            .iter()
            .map(|o| {
                (
                    o.name.clone(),
                    TemplateOutput {
                        value: resolver.render(&o.value),
                        description: o.description.clone(),
                        export: o
                            .export_name
                            .as_ref()
                            .map(|name| OutputExport { name: name.clone() }),
                    },
                )
            })
            .collect();

        Self {
            description: graph.description().to_string(),
            parameters,
            resources,
            outputs,
        }
    }

    /// Output values as display text; anything unresolved is left as a `${...}` token
    pub fn resolve_outputs(graph: &ResourceGraph, resolver: &Resolver<'_>) -> BTreeMap<String, String> {
        graph
            .outputs()
            .iter()
            .map(|o| (o.name.clone(), resolver.render_text(&o.value)))
            .collect()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }
}
