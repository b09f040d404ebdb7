//! The media-processing stack
//!
//! [`build`] is a pure function of the parameter values and the asset hashes.
//! Each sub-builder takes the handles produced upstream and returns its own:
//!
//! 1. queue and notification topic
//! 2. bucket plus its one-time content seeding
//! 3. bucket-event function feeding the queue (after seeding)
//! 4. artifact build job behind a blocking custom step
//! 5. worker fleet (after the artifact exists)
//! 6. scaling and lifecycle policies on the fleet

pub mod artifact;
pub mod buildspec;
pub mod fleet;
pub mod policy;
pub mod queue;
pub mod scaling;
pub mod storage;
pub mod subscription;
pub mod topic;
pub mod userdata;

use crate::assets::{AssetSource, StackAssets};
use declarative::{
    GraphBuilder, NodeHandle, ParamValue, ParameterBinding, ResourceGraph, ResourceNode, Value,
};
use std::collections::BTreeMap;
use thiserror::Error;

/// Parameter: prefix of the bucket name
pub const BUCKET_NAME_PREFIX: &str = "bucketNamePrefix";

/// Parameter: upper bound of the worker fleet
pub const MAX_FLEET_CAPACITY: &str = "maxFleetCapacity";

const DESCRIPTION: &str =
    "Asynchronous media processing: bucket uploads are queued and drained by an autoscaling worker fleet";

const FUNCTION_KIND: &str = "AWS::Lambda::Function";
const FUNCTION_RUNTIME: &str = "python3.7";

#[derive(Error, Debug)]
pub enum StackError {
    #[error(transparent)]
    Graph(#[from] declarative::Error),

    #[error("failed to render {what}: {source}")]
    Render {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, StackError>;

/// Everything the graph is built from
#[derive(Debug, Clone, Copy)]
pub struct StackInputs<'a> {
    /// Raw parameter values by name; missing ones take their defaults
    pub parameters: &'a BTreeMap<String, String>,
    pub assets: &'a StackAssets,
}

/// The operator-facing parameters
pub fn parameters() -> Vec<ParameterBinding> {
    vec![
        ParameterBinding::string(BUCKET_NAME_PREFIX, "Please enter a custom name the S3 bucket")
            .with_default(ParamValue::String(
                "voice-focus-processing-bucket".to_string(),
            ))
            .with_allowed_pattern("[a-z0-9][a-z0-9.-]*"),
        ParameterBinding::number(
            MAX_FLEET_CAPACITY,
            "Please enter the maximum capacity of the autoscaling group",
        )
        .with_default(ParamValue::Number(5))
        .with_min_value(1),
    ]
}

/// Build the complete resource graph
pub fn build(inputs: &StackInputs<'_>) -> Result<ResourceGraph> {
    let mut g = GraphBuilder::new(DESCRIPTION, parameters(), inputs.parameters)?;

    let queue = queue::declare(&mut g)?;
    let topic = topic::declare(&mut g)?;
    let storage = storage::declare(&mut g, &inputs.assets.seed)?;
    let function = subscription::declare(
        &mut g,
        &storage,
        &queue,
        &topic,
        &inputs.assets.bucket_handler,
    )?;
    log::debug!("{} subscribed to {}", function.id(), storage.bucket.id());
    let artifact_ready = artifact::declare(&mut g, &storage, &inputs.assets.build_runner)?;
    let group = fleet::declare(&mut g, &storage, &queue, &topic, &artifact_ready)?;
    log::debug!("{} waits on {}", group.id(), artifact_ready.id());
    scaling::declare(&mut g, &group)?;

    let graph = g.finish()?;
    log::debug!("Stack graph built with {} resource(s)", graph.len());
    Ok(graph)
}

/// Code bundle property of a function
fn asset_code(asset: &AssetSource) -> Value {
    let mut entries = vec![("Asset", Value::str(asset.path.clone()))];
    if let Some(hash) = &asset.hash {
        entries.push(("SourceHash", Value::str(hash.clone())));
    }
    Value::map(entries)
}

/// Settings of one function
struct FunctionSpec<'a> {
    id: &'a str,
    name: &'a str,
    handler: &'a str,
    timeout_seconds: Option<i64>,
    memory_mb: Option<i64>,
    environment: Vec<(&'a str, Value)>,
}

impl FunctionSpec<'_> {
    fn into_node(self, role: &NodeHandle, code: &AssetSource) -> ResourceNode {
        let mut node = ResourceNode::new(self.id, FUNCTION_KIND)
            .prop("FunctionName", self.name)
            .prop("Handler", self.handler)
            .prop("Runtime", FUNCTION_RUNTIME)
            .prop("Role", role.attr("Arn"))
            .prop("Code", asset_code(code))
            .prop(
                "Environment",
                Value::map([("Variables", Value::map(self.environment))]),
            );
        if let Some(timeout) = self.timeout_seconds {
            node = node.prop("Timeout", timeout);
        }
        if let Some(memory) = self.memory_mb {
            node = node.prop("MemorySize", memory);
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Environment, Error, Resolver, Template};

    fn build_with(params: &[(&str, &str)]) -> Result<ResourceGraph> {
        let supplied: BTreeMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let assets = StackAssets::unscanned();
        build(&StackInputs {
            parameters: &supplied,
            assets: &assets,
        })
    }

    #[test]
    fn test_graph_is_acyclic_for_valid_parameters() {
        let large = i64::MAX.to_string();
        let capacities = (1..=64)
            .map(|n: i64| n.to_string())
            .chain([large])
            .collect::<Vec<_>>();
        let prefixes = ["m", "voice-focus-processing-bucket", "media.v2-batch", "0-a.b"];

        for prefix in prefixes {
            for capacity in &capacities {
                let graph = build_with(&[
                    (BUCKET_NAME_PREFIX, prefix),
                    (MAX_FLEET_CAPACITY, capacity.as_str()),
                ])
                .unwrap_or_else(|e| panic!("{prefix}/{capacity}: {e}"));
                let order = graph.topological_order().unwrap();
                assert_eq!(order.len(), graph.len(), "{prefix}/{capacity}");
            }
        }
    }

    #[test]
    fn test_seeding_precedes_subscription() {
        let graph = build_with(&[]).unwrap();
        assert!(graph.has_edge(storage::SEEDING_ID, subscription::FUNCTION_ID));
        assert!(graph.depends_transitively(subscription::NOTIFICATION_ID, storage::SEEDING_ID));
    }

    #[test]
    fn test_fleet_follows_artifact_barrier() {
        let graph = build_with(&[]).unwrap();
        assert!(graph.has_edge(artifact::BARRIER_ID, fleet::GROUP_ID));

        let barrier = graph.node(artifact::BARRIER_ID).unwrap().barrier.unwrap();
        assert_eq!(barrier.wait_ceiling.as_secs(), 900);
    }

    #[test]
    fn test_zero_fleet_capacity_is_rejected() {
        let err = build_with(&[(MAX_FLEET_CAPACITY, "0")]).unwrap_err();
        assert!(matches!(
            err,
            StackError::Graph(Error::ConstraintViolation { ref name, .. }) if name == MAX_FLEET_CAPACITY
        ));
    }

    #[test]
    fn test_invalid_bucket_prefix_is_rejected() {
        let err = build_with(&[(BUCKET_NAME_PREFIX, "Upper_Case")]).unwrap_err();
        assert!(matches!(
            err,
            StackError::Graph(Error::ConstraintViolation { .. })
        ));
    }

    #[test]
    fn test_path_outputs_resolve_exactly() {
        let graph = build_with(&[(BUCKET_NAME_PREFIX, "demo")]).unwrap();
        let env = Environment::new("111122223333", "eu-west-1");
        let outputs =
            Template::resolve_outputs(&graph, &Resolver::with_environment(graph.values(), &env));

        assert_eq!(
            outputs[storage::INPUT_OUTPUT],
            "s3://demo-111122223333-eu-west-1/input/"
        );
        assert_eq!(
            outputs[storage::OUTPUT_OUTPUT],
            "s3://demo-111122223333-eu-west-1/output/"
        );
    }

    #[test]
    fn test_grants_are_scoped_or_acknowledged() {
        let graph = build_with(&[]).unwrap();
        let findings = crate::audit::audit(&graph);
        assert!(
            findings.iter().all(|f| !f.is_error()),
            "unexpected audit errors: {findings:?}"
        );

        let broad: Vec<_> = findings
            .iter()
            .filter(|f| f.code == policy::BROAD_GRANT)
            .collect();
        assert_eq!(broad.len(), 2);
        assert!(broad.iter().all(|f| f.resource == fleet::POLICY_ID));

        let mut managed: Vec<&str> = findings
            .iter()
            .filter(|f| f.code == policy::MANAGED_POLICY)
            .map(|f| f.resource.as_str())
            .collect();
        managed.sort_unstable();
        assert_eq!(
            managed,
            [
                subscription::ROLE_ID,
                fleet::ROLE_ID,
                artifact::RUNNER_ROLE_ID,
            ]
        );
    }

    #[test]
    fn test_synthesized_template_has_parameters_and_outputs() {
        let graph = build_with(&[]).unwrap();
        let template = Template::synthesize(&graph, &Resolver::symbolic());

        assert_eq!(template.parameters.len(), 2);
        assert_eq!(
            template.parameters[MAX_FLEET_CAPACITY].min_value,
            Some(1)
        );
        for name in ["SQSURL", "SNSARN", storage::INPUT_OUTPUT, storage::OUTPUT_OUTPUT] {
            assert!(template.outputs.contains_key(name), "missing output {name}");
        }
        assert_eq!(
            template.resources[fleet::GROUP_ID].depends_on,
            vec![artifact::BARRIER_ID.to_string(), fleet::ROUTE_ID.to_string()]
        );
    }
}
