//! Static security audit of a resource graph
//!
//! Surfaces every annotation and checks that each policy statement is
//! scoped to nodes of the graph. A `*` resource only passes when the
//! policy acknowledges it with a `broad-grant` annotation naming the
//! statement's actions. Roles surface their managed policy attachments,
//! and an attachment without a `managed-policy` annotation is an error.

use crate::stack::policy::{self, BROAD_GRANT, MANAGED_POLICY, POLICY_KIND, ROLE_KIND};
use declarative::{ResourceGraph, ResourceNode, Severity, Value};
use std::fmt;

pub const UNACKNOWLEDGED_WILDCARD: &str = "unacknowledged-wildcard";
pub const UNSCOPED_RESOURCE: &str = "unscoped-resource";
pub const UNACKNOWLEDGED_MANAGED_POLICY: &str = "unacknowledged-managed-policy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FindingSeverity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for FindingSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

impl From<Severity> for FindingSeverity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Info => Self::Info,
            Severity::Warning => Self::Warning,
        }
    }
}

/// One audit result, attributed to a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: FindingSeverity,
    pub code: String,
    pub resource: String,
    pub message: String,
}

impl Finding {
    pub fn is_error(&self) -> bool {
        self.severity == FindingSeverity::Error
    }

    fn error(resource: &str, code: &str, message: String) -> Self {
        Self {
            severity: FindingSeverity::Error,
            code: code.to_string(),
            resource: resource.to_string(),
            message,
        }
    }
}

/// Audit `graph`, most severe findings first
pub fn audit(graph: &ResourceGraph) -> Vec<Finding> {
    let mut findings = Vec::new();

    for node in graph.nodes() {
        findings.extend(node.annotations.iter().map(|a| Finding {
            severity: a.severity.into(),
            code: a.code.clone(),
            resource: node.id.clone(),
            message: a.message.clone(),
        }));
    }

    for node in graph.nodes_of_kind(POLICY_KIND) {
        check_policy(node, &mut findings);
    }
    for node in graph.nodes_of_kind(ROLE_KIND) {
        check_role(node, &mut findings);
    }

    findings.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| a.resource.cmp(&b.resource))
    });
    log::debug!("Audit produced {} finding(s)", findings.len());
    findings
}

fn check_policy(node: &ResourceNode, findings: &mut Vec<Finding>) {
    let statements = node
        .properties
        .get("PolicyDocument")
        .and_then(|doc| doc.get("Statement"))
        .and_then(Value::as_list)
        .unwrap_or_default();

    let acknowledged: Vec<&str> = node
        .annotations
        .iter()
        .filter(|a| a.code == BROAD_GRANT)
        .map(|a| a.message.as_str())
        .collect();

    for (index, statement) in statements.iter().enumerate() {
        let actions: Vec<&str> = statement
            .get("Action")
            .and_then(Value::as_list)
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        let resources = statement
            .get("Resource")
            .and_then(Value::as_list)
            .unwrap_or_default();

        for resource in resources {
            if resource.is_wildcard() {
                let named = actions
                    .iter()
                    .all(|action| acknowledged.iter().any(|m| m.contains(action)));
                if !named || actions.is_empty() {
                    findings.push(Finding::error(
                        &node.id,
                        UNACKNOWLEDGED_WILDCARD,
                        format!(
                            "statement {index} grants {} on every resource without acknowledgement",
                            actions.join(", ")
                        ),
                    ));
                }
            } else if resource.references().is_empty() {
                findings.push(Finding::error(
                    &node.id,
                    UNSCOPED_RESOURCE,
                    format!("statement {index} names a resource outside the graph"),
                ));
            }
        }
    }
}

fn check_role(node: &ResourceNode, findings: &mut Vec<Finding>) {
    let arns = node
        .properties
        .get("ManagedPolicyArns")
        .and_then(Value::as_list)
        .unwrap_or_default();

    for (index, arn) in arns.iter().enumerate() {
        let acknowledged = policy::managed_policy_name(arn).is_some_and(|name| {
            node.annotations
                .iter()
                .any(|a| a.code == MANAGED_POLICY && a.message.starts_with(name))
        });
        if !acknowledged {
            findings.push(Finding::error(
                &node.id,
                UNACKNOWLEDGED_MANAGED_POLICY,
                format!("managed policy {index} is attached without acknowledgement"),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::policy::{self, PolicyStatement, ServicePrincipal};
    use declarative::{GraphBuilder, NodeHandle};
    use std::collections::BTreeMap;

    fn policy_graph(resource: impl FnOnce(&NodeHandle) -> Value) -> ResourceGraph {
        let mut g = GraphBuilder::new("t", Vec::new(), &BTreeMap::new()).unwrap();
        let role = g
            .add(policy::service_role("Role", ServicePrincipal::Lambda, &[]))
            .unwrap();
        let queue = g.add(ResourceNode::new("Queue", "AWS::SQS::Queue")).unwrap();
        g.add(policy::inline_policy(
            "Scoped",
            &role,
            &[
                PolicyStatement::allow(&["sqs:SendMessage"], [queue.attr("Arn")]),
                PolicyStatement::broad(&["sns:Publish"]),
            ],
        ))
        .unwrap();

        let document = Value::map([(
            "Statement",
            Value::list([Value::map([
                ("Effect", Value::str("Allow")),
                ("Action", Value::list(["s3:GetObject"])),
                ("Resource", Value::list([resource(&queue)])),
            ])]),
        )]);
        g.add(
            ResourceNode::new("Handwritten", POLICY_KIND)
                .prop("PolicyDocument", document)
                .prop("Roles", Value::list([role.reference()])),
        )
        .unwrap();
        g.finish().unwrap()
    }

    #[test]
    fn test_acknowledged_wildcard_is_informational() {
        let findings = audit(&policy_graph(|queue| queue.attr("Arn")));

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, BROAD_GRANT);
        assert_eq!(findings[0].resource, "Scoped");
        assert_eq!(findings[0].severity, FindingSeverity::Info);
    }

    #[test]
    fn test_unacknowledged_wildcard_is_an_error() {
        let findings = audit(&policy_graph(|_| Value::wildcard()));

        let errors: Vec<_> = findings.iter().filter(|f| f.is_error()).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, UNACKNOWLEDGED_WILDCARD);
        assert_eq!(errors[0].resource, "Handwritten");
        assert_eq!(findings[0], *errors[0]);
    }

    #[test]
    fn test_managed_policy_attachments_are_surfaced() {
        let mut g = GraphBuilder::new("t", Vec::new(), &BTreeMap::new()).unwrap();
        g.add(policy::service_role(
            "Annotated",
            ServicePrincipal::Ec2,
            &["CloudWatchAgentServerPolicy"],
        ))
        .unwrap();
        g.add(
            ResourceNode::new("Bare", ROLE_KIND).prop(
                "ManagedPolicyArns",
                Value::list([policy::managed_policy_arn("AdministratorAccess")]),
            ),
        )
        .unwrap();
        let findings = audit(&g.finish().unwrap());

        assert_eq!(findings.len(), 2);
        assert!(findings[0].is_error());
        assert_eq!(findings[0].code, UNACKNOWLEDGED_MANAGED_POLICY);
        assert_eq!(findings[0].resource, "Bare");
        assert_eq!(findings[1].code, MANAGED_POLICY);
        assert_eq!(findings[1].resource, "Annotated");
        assert_eq!(findings[1].severity, FindingSeverity::Info);
        assert!(findings[1].message.contains("CloudWatchAgentServerPolicy"));
    }

    #[test]
    fn test_literal_arn_is_unscoped() {
        let findings = audit(&policy_graph(|_| Value::str("arn:aws:s3:::someone-elses-bucket/*")));

        assert!(
            findings
                .iter()
                .any(|f| f.is_error() && f.code == UNSCOPED_RESOURCE && f.resource == "Handwritten")
        );
    }
}
