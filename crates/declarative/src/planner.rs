//! Execution planner - groups graph nodes into dependency waves

use crate::error::Result;
use crate::graph::ResourceGraph;
use std::collections::{BTreeSet, HashMap};

/// An execution plan: waves of mutually independent nodes
///
/// Every dependency of a node sits in an earlier wave, so a wave can be
/// created in parallel once the previous wave has finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub waves: Vec<Vec<String>>,
}

impl ExecutionPlan {
    /// Build the plan for a whole graph
    pub fn from_graph(graph: &ResourceGraph) -> Result<Self> {
        let order = graph.topological_order()?;
        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut waves: Vec<Vec<String>> = Vec::new();

        for id in order {
            let wave = graph
                .dependencies_of(id)
                .iter()
                .filter_map(|dep| depth.get(dep))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(id, wave);
            if waves.len() <= wave {
                waves.resize(wave + 1, Vec::new());
            }
            waves[wave].push(id.to_string());
        }

        Ok(Self { waves })
    }

    /// Keep only nodes matching a target pattern, plus everything they depend on
    ///
    /// Target format: "type" or "type.name", where "type" matches the
    /// service segment of a resource kind (`sqs` matches `AWS::SQS::Queue`)
    /// or the full kind, and "name" is a substring of the logical id.
    pub fn filter_by_target(self, graph: &ResourceGraph, target: Option<&str>) -> Self {
        let Some(t) = target else {
            return self;
        };
        let (kind, name) = parse_target(t);

        let mut keep: BTreeSet<String> = BTreeSet::new();
        let mut stack: Vec<String> = graph
            .nodes()
            .iter()
            .filter(|n| matches_filter(&n.kind, &n.id, kind.as_deref(), name.as_deref()))
            .map(|n| n.id.clone())
            .collect();
        while let Some(id) = stack.pop() {
            if keep.insert(id.clone()) {
                stack.extend(graph.dependencies_of(&id).into_iter().map(str::to_string));
            }
        }

        let waves = self
            .waves
            .into_iter()
            .map(|wave| wave.into_iter().filter(|id| keep.contains(id)).collect())
            .filter(|wave: &Vec<String>| !wave.is_empty())
            .collect();
        Self { waves }
    }

    /// Wave index of a node, if planned
    pub fn wave_of(&self, id: &str) -> Option<usize> {
        self.waves
            .iter()
            .position(|wave| wave.iter().any(|w| w == id))
    }

    /// Total number of nodes in the plan
    pub fn total_resources(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.iter().all(Vec::is_empty)
    }

    /// All planned ids in execution order
    pub fn ordered_ids(&self) -> impl Iterator<Item = &str> {
        self.waves.iter().flatten().map(String::as_str)
    }
}

/// Parse a target string like "type.name" into (type, name)
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = target.split('.').collect();
    match parts.len() {
        1 => (Some(parts[0].to_string()), None),
        2 => (Some(parts[0].to_string()), Some(parts[1].to_string())),
        _ => (None, Some(target.to_string())),
    }
}

/// Check if a node matches the filter criteria
fn matches_filter(kind: &str, id: &str, filter_kind: Option<&str>, name: Option<&str>) -> bool {
    if let Some(fk) = filter_kind {
        let fk = fk.to_ascii_lowercase();
        let full = kind.to_ascii_lowercase();
        let service = full.split("::").nth(1).unwrap_or(&full);
        // Allow common aliases
        let matches_kind = match fk.as_str() {
            "queue" => service == "sqs",
            "topic" => service == "sns",
            "storage" | "bucket" => service == "s3" || full.contains("bucket"),
            "fleet" | "asg" => service == "autoscaling" || service == "ec2",
            "iam" | "policies" => service == "iam",
            _ => service == fk || full == fk || full.starts_with(&format!("{fk}::")),
        };
        if !matches_kind {
            return false;
        }
    }

    if let Some(n) = name
        && !id.to_ascii_lowercase().contains(&n.to_ascii_lowercase())
    {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, ResourceNode};
    use std::collections::BTreeMap;

    fn graph() -> ResourceGraph {
        let mut b = GraphBuilder::new("plan", Vec::new(), &BTreeMap::new()).unwrap();
        let queue = b.add(ResourceNode::new("Queue", "AWS::SQS::Queue")).unwrap();
        let bucket = b.add(ResourceNode::new("Bucket", "AWS::S3::Bucket")).unwrap();
        let job = b
            .add(ResourceNode::new("Job", "Custom::Build").prop("Dest", bucket.reference()))
            .unwrap();
        let fleet = b
            .add(
                ResourceNode::new("Fleet", "AWS::AutoScaling::AutoScalingGroup")
                    .prop("Queue", queue.attr("QueueUrl")),
            )
            .unwrap();
        b.depend(&fleet, &job, "artifact").unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("sqs"), (Some("sqs".to_string()), None));
        assert_eq!(
            parse_target("sqs.Queue"),
            (Some("sqs".to_string()), Some("Queue".to_string()))
        );
        assert_eq!(parse_target("a.b.c"), (None, Some("a.b.c".to_string())));
    }

    #[test]
    fn test_waves_follow_dependency_depth() {
        let plan = ExecutionPlan::from_graph(&graph()).unwrap();
        assert_eq!(
            plan.waves,
            vec![
                vec!["Queue".to_string(), "Bucket".to_string()],
                vec!["Job".to_string()],
                vec!["Fleet".to_string()],
            ]
        );
        assert_eq!(plan.total_resources(), 4);
        assert_eq!(plan.wave_of("Fleet"), Some(2));
    }

    #[test]
    fn test_filter_keeps_dependencies() {
        let g = graph();
        let plan = ExecutionPlan::from_graph(&g)
            .unwrap()
            .filter_by_target(&g, Some("custom"));
        assert_eq!(
            plan.ordered_ids().collect::<Vec<_>>(),
            vec!["Bucket", "Job"]
        );
    }

    #[test]
    fn test_filter_alias_and_name() {
        let g = graph();
        let plan = ExecutionPlan::from_graph(&g)
            .unwrap()
            .filter_by_target(&g, Some("queue.que"));
        assert_eq!(plan.ordered_ids().collect::<Vec<_>>(), vec!["Queue"]);
    }
}
