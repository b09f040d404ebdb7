//! # Declarative
//!
//! Declarative resource graphs: declare infrastructure as nodes and
//! dependency edges, validate the graph, render it, plan it and converge it.
//!
//! ## Core Concepts
//!
//! - **ResourceNode**: One unit of infrastructure, described by typed [`Value`]s
//! - **DependencyEdge**: "A must exist before B"; recorded for every attribute
//!   reference and for explicit side-effect ordering
//! - **ParameterBinding** / **OutputBinding**: the operator-facing surface
//! - **Template**: the rendered graph handed to a provisioning engine
//! - **ExecutionPlan**: topological waves of independent nodes
//! - **Executor**: applies a change set wave by wave behind a [`Provisioner`]
//!
//! ## Example
//!
//! ```
//! use declarative::{
//!     GraphBuilder, OutputBinding, ParamValue, ParameterBinding, ResourceNode, Resolver,
//!     Template, Value,
//! };
//! use std::collections::BTreeMap;
//!
//! let params = vec![
//!     ParameterBinding::number("maxSize", "Upper bound of the fleet")
//!         .with_default(ParamValue::Number(5))
//!         .with_min_value(1),
//! ];
//! let mut graph = GraphBuilder::new("demo", params, &BTreeMap::new())?;
//!
//! let queue = graph.add(
//!     ResourceNode::new("Queue", "AWS::SQS::Queue").prop("VisibilityTimeout", 3600i64),
//! )?;
//! let fleet = graph.add(
//!     ResourceNode::new("Fleet", "AWS::AutoScaling::AutoScalingGroup")
//!         .prop("MaxSize", graph.param("maxSize")?)
//!         .prop("QueueUrl", queue.attr("QueueUrl")),
//! )?;
//! graph.output(OutputBinding::new("QueueUrl", &queue, queue.attr("QueueUrl"), "queue address"))?;
//! let graph = graph.finish()?;
//!
//! assert!(graph.has_edge(queue.id(), fleet.id()));
//! let template = Template::synthesize(&graph, &Resolver::symbolic());
//! assert_eq!(template.resources.len(), 2);
//! # Ok::<(), declarative::Error>(())
//! ```
//!
//! ## Provider Traits
//!
//! - [`Provisioner`]: Performs each change against live state
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations

pub mod context;
pub mod diff;
mod error;
pub mod executor;
pub mod graph;
pub mod param;
pub mod planner;
pub mod template;
pub mod types;
pub mod value;

// Re-export main types at crate root
pub use context::{
    ApplyContext, AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback,
    ProvisionRequest, Provisioner,
};
pub use diff::{Change, DiffSummary, ResourceDiff, compute_diffs, group_by_type};
pub use error::{Error, Result};
pub use executor::execute;
pub use graph::{
    Annotation, Barrier, DeletionPolicy, DependencyEdge, EdgeReason, ExpiryAction, GraphBuilder,
    NodeHandle, OutputBinding, ResourceGraph, ResourceNode, Severity,
};
pub use param::{ParamKind, ParamValue, ParameterBinding, ParameterValues};
pub use planner::ExecutionPlan;
pub use template::{Template, TemplateOutput, TemplateParameter, TemplateResource};
pub use types::{ApplyResult, ExecuteOptions, ExecuteSummary};
pub use value::{AttrRef, Environment, Pseudo, Resolver, Value};
