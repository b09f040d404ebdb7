//! Scaling and lifecycle policies of the worker fleet

use super::Result;
use declarative::{GraphBuilder, NodeHandle, ResourceNode, Value};

pub const TARGET_TRACKING_ID: &str = "VFTargetTrackingScalingPolicy";
pub const START_HOOK_ID: &str = "VFStartHook";
pub const END_HOOK_ID: &str = "VFEndHook";

const CPU_TARGET_PERCENT: i64 = 75;
const HEARTBEAT_SECONDS: i64 = 30 * 60;

/// Taken when a hook's heartbeat runs out: the transition is aborted, so no
/// unhealthy launch enters service and no instance is removed before cleanup
const ON_HEARTBEAT_TIMEOUT: &str = "ABANDON";

/// Instance transition a hook intercepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleTransition {
    Launching,
    Terminating,
}

impl LifecycleTransition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Launching => "autoscaling:EC2_INSTANCE_LAUNCHING",
            Self::Terminating => "autoscaling:EC2_INSTANCE_TERMINATING",
        }
    }
}

pub fn declare(g: &mut GraphBuilder, group: &NodeHandle) -> Result<()> {
    g.add(
        ResourceNode::new(TARGET_TRACKING_ID, "AWS::AutoScaling::ScalingPolicy")
            .prop("AutoScalingGroupName", group.reference())
            .prop("PolicyType", "TargetTrackingScaling")
            .prop("EstimatedInstanceWarmup", 0i64)
            .prop(
                "TargetTrackingConfiguration",
                Value::map([
                    (
                        "PredefinedMetricSpecification",
                        Value::map([("PredefinedMetricType", "ASGAverageCPUUtilization")]),
                    ),
                    ("TargetValue", Value::Int(CPU_TARGET_PERCENT)),
                ]),
            ),
    )?;

    g.add(hook(
        START_HOOK_ID,
        "start_hook",
        group,
        LifecycleTransition::Launching,
    ))?;
    g.add(hook(
        END_HOOK_ID,
        "terminate_hook",
        group,
        LifecycleTransition::Terminating,
    ))?;
    Ok(())
}

fn hook(id: &str, name: &str, group: &NodeHandle, transition: LifecycleTransition) -> ResourceNode {
    ResourceNode::new(id, "AWS::AutoScaling::LifecycleHook")
        .prop("AutoScalingGroupName", group.reference())
        .prop("LifecycleHookName", name)
        .prop("LifecycleTransition", transition.as_str())
        .prop("HeartbeatTimeout", HEARTBEAT_SECONDS)
        .prop("DefaultResult", ON_HEARTBEAT_TIMEOUT)
}
