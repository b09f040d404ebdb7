//! Diff computation between a desired template and the last applied one

use crate::template::{Template, TemplateResource};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// What has to happen to one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    /// Not provisioned yet
    Add,
    /// No longer declared
    Remove,
    /// Declared differently; lists the changed top-level keys
    Modify { changed_keys: Vec<String> },
    /// Resource type changed, so the old resource is destroyed and a new one created
    Replace { from_kind: String },
}

/// A diff between the desired and the applied state of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDiff {
    pub resource_id: String,
    pub resource_type: String,
    pub change: Change,
}

impl ResourceDiff {
    fn between(id: &str, desired: &TemplateResource, current: &TemplateResource) -> Option<Self> {
        if desired.kind != current.kind {
            return Some(Self {
                resource_id: id.to_string(),
                resource_type: desired.kind.clone(),
                change: Change::Replace {
                    from_kind: current.kind.clone(),
                },
            });
        }

        let keys: BTreeSet<&String> = desired
            .properties
            .keys()
            .chain(current.properties.keys())
            .collect();
        let mut changed_keys: Vec<String> = keys
            .into_iter()
            .filter(|k| desired.properties.get(*k) != current.properties.get(*k))
            .cloned()
            .collect();
        if desired.depends_on != current.depends_on {
            changed_keys.push("DependsOn".to_string());
        }
        if desired.deletion_policy != current.deletion_policy {
            changed_keys.push("DeletionPolicy".to_string());
        }

        if changed_keys.is_empty() {
            None
        } else {
            Some(Self {
                resource_id: id.to_string(),
                resource_type: desired.kind.clone(),
                change: Change::Modify { changed_keys },
            })
        }
    }

    pub fn is_addition(&self) -> bool {
        matches!(self.change, Change::Add)
    }

    pub fn is_removal(&self) -> bool {
        matches!(self.change, Change::Remove)
    }

    pub fn is_modification(&self) -> bool {
        matches!(self.change, Change::Modify { .. } | Change::Replace { .. })
    }
}

/// Compute diffs between the desired template and the previously applied one
///
/// Returns only resources that differ: additions and modifications in the
/// desired template's key order, followed by removals.
pub fn compute_diffs(desired: &Template, previous: &Template) -> Vec<ResourceDiff> {
    let mut diffs = Vec::new();

    for (id, resource) in &desired.resources {
        match previous.resources.get(id) {
            None => diffs.push(ResourceDiff {
                resource_id: id.clone(),
                resource_type: resource.kind.clone(),
                change: Change::Add,
            }),
            Some(current) => diffs.extend(ResourceDiff::between(id, resource, current)),
        }
    }

    for (id, resource) in &previous.resources {
        if !desired.resources.contains_key(id) {
            diffs.push(ResourceDiff {
                resource_id: id.clone(),
                resource_type: resource.kind.clone(),
                change: Change::Remove,
            });
        }
    }

    diffs
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    pub additions: usize,
    pub removals: usize,
    pub modifications: usize,
}

impl DiffSummary {
    pub fn from_diffs(diffs: &[ResourceDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            if diff.is_addition() {
                summary.additions += 1;
            } else if diff.is_removal() {
                summary.removals += 1;
            } else {
                summary.modifications += 1;
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications
    }

    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by resource type
pub fn group_by_type(diffs: &[ResourceDiff]) -> HashMap<String, Vec<&ResourceDiff>> {
    let mut groups: HashMap<String, Vec<&ResourceDiff>> = HashMap::new();
    for diff in diffs {
        groups
            .entry(diff.resource_type.clone())
            .or_default()
            .push(diff);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::ResourceMetadata;
    use serde_json::json;

    fn resource(kind: &str, props: serde_json::Value) -> TemplateResource {
        TemplateResource {
            kind: kind.to_string(),
            properties: props.as_object().cloned().unwrap_or_default(),
            depends_on: Vec::new(),
            deletion_policy: None,
            metadata: ResourceMetadata::default(),
        }
    }

    fn template(resources: Vec<(&str, TemplateResource)>) -> Template {
        Template {
            resources: resources
                .into_iter()
                .map(|(id, r)| (id.to_string(), r))
                .collect(),
            ..Template::default()
        }
    }

    #[test]
    fn test_empty_previous_means_all_additions() {
        let desired = template(vec![
            ("Queue", resource("AWS::SQS::Queue", json!({}))),
            ("Topic", resource("AWS::SNS::Topic", json!({}))),
        ]);
        let diffs = compute_diffs(&desired, &Template::default());
        let summary = DiffSummary::from_diffs(&diffs);
        assert_eq!(summary.additions, 2);
        assert!(summary.has_changes());
    }

    #[test]
    fn test_identical_templates_have_no_diff() {
        let t = template(vec![("Queue", resource("AWS::SQS::Queue", json!({"A": 1})))]);
        assert!(compute_diffs(&t, &t.clone()).is_empty());
    }

    #[test]
    fn test_changed_property_is_modification() {
        let old = template(vec![(
            "Queue",
            resource("AWS::SQS::Queue", json!({"VisibilityTimeout": 30, "Name": "q"})),
        )]);
        let new = template(vec![(
            "Queue",
            resource("AWS::SQS::Queue", json!({"VisibilityTimeout": 3600, "Name": "q"})),
        )]);
        let diffs = compute_diffs(&new, &old);
        assert_eq!(
            diffs[0].change,
            Change::Modify {
                changed_keys: vec!["VisibilityTimeout".into()]
            }
        );
    }

    #[test]
    fn test_kind_change_is_replacement_and_missing_is_removal() {
        let old = template(vec![
            ("Thing", resource("AWS::SQS::Queue", json!({}))),
            ("Gone", resource("AWS::SNS::Topic", json!({}))),
        ]);
        let new = template(vec![("Thing", resource("AWS::SNS::Topic", json!({})))]);
        let diffs = compute_diffs(&new, &old);

        assert_eq!(
            diffs[0].change,
            Change::Replace {
                from_kind: "AWS::SQS::Queue".into()
            }
        );
        assert!(diffs[1].is_removal());
        assert_eq!(group_by_type(&diffs).len(), 1);
    }
}
