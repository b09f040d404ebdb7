//! IAM building blocks: service roles, scoped statements and inline policies
//!
//! Every statement either names resources produced in this graph or is a
//! deliberate wildcard. Wildcards are built with [`PolicyStatement::broad`],
//! which makes the policy node carry a `broad-grant` annotation naming the
//! actions, so `vfstack audit` can tell intended breadth from a mistake.
//! Managed policies carry their own wildcard grants, so every attachment is
//! annotated `managed-policy` with the policy name.

use declarative::{Annotation, NodeHandle, Pseudo, ResourceNode, Value};

/// Annotation code for intentional wildcard grants
pub const BROAD_GRANT: &str = "broad-grant";

/// Annotation code for an attached managed policy
pub const MANAGED_POLICY: &str = "managed-policy";

const MANAGED_ARN_PREFIX: &str = ":iam::aws:policy/";

pub const POLICY_KIND: &str = "AWS::IAM::Policy";
pub const ROLE_KIND: &str = "AWS::IAM::Role";

/// Services allowed to assume a role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServicePrincipal {
    Lambda,
    CodeBuild,
    Ec2,
}

impl ServicePrincipal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lambda => "lambda.amazonaws.com",
            Self::CodeBuild => "codebuild.amazonaws.com",
            Self::Ec2 => "ec2.amazonaws.com",
        }
    }
}

/// Where a statement applies
#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    /// An expression over one or more graph nodes
    Node(Value),
    Wildcard,
}

/// One `Allow` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStatement {
    actions: Vec<String>,
    scopes: Vec<Scope>,
}

impl PolicyStatement {
    /// Allow `actions` on resources derived from graph nodes
    pub fn allow<I>(actions: &[&str], resources: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self {
            actions: actions.iter().map(ToString::to_string).collect(),
            scopes: resources.into_iter().map(Scope::Node).collect(),
        }
    }

    /// Allow `actions` on every resource
    pub fn broad(actions: &[&str]) -> Self {
        Self {
            actions: actions.iter().map(ToString::to_string).collect(),
            scopes: vec![Scope::Wildcard],
        }
    }

    pub fn is_broad(&self) -> bool {
        self.scopes.iter().any(|s| matches!(s, Scope::Wildcard))
    }

    fn to_value(&self) -> Value {
        let resources = self
            .scopes
            .iter()
            .map(|scope| match scope {
                Scope::Node(value) => value.clone(),
                Scope::Wildcard => Value::wildcard(),
            })
            .collect::<Vec<_>>();
        Value::map([
            ("Effect", Value::str("Allow")),
            ("Action", Value::list(self.actions.iter().cloned())),
            ("Resource", Value::List(resources)),
        ])
    }
}

/// ARN of an AWS managed policy
pub fn managed_policy_arn(name: &str) -> Value {
    Value::join([
        Value::str("arn:"),
        Value::from(Pseudo::Partition),
        Value::str(format!("{MANAGED_ARN_PREFIX}{name}")),
    ])
}

/// Name of the managed policy an ARN points at, if it is one
pub fn managed_policy_name(arn: &Value) -> Option<&str> {
    let text = match arn {
        Value::Join(parts) => parts.last()?.as_str()?,
        other => other.as_str()?,
    };
    let (_, name) = text.split_once(MANAGED_ARN_PREFIX)?;
    (!name.is_empty()).then_some(name)
}

/// A role the given service may assume, with managed policies attached
pub fn service_role(id: &str, service: ServicePrincipal, managed: &[&str]) -> ResourceNode {
    let trust = Value::map([
        ("Version", Value::str("2012-10-17")),
        (
            "Statement",
            Value::list([Value::map([
                ("Action", Value::str("sts:AssumeRole")),
                ("Effect", Value::str("Allow")),
                (
                    "Principal",
                    Value::map([("Service", Value::str(service.as_str()))]),
                ),
            ])]),
        ),
    ]);

    let mut role = ResourceNode::new(id, ROLE_KIND).prop("AssumeRolePolicyDocument", trust);
    if !managed.is_empty() {
        role = role.prop(
            "ManagedPolicyArns",
            Value::List(managed.iter().map(|m| managed_policy_arn(m)).collect()),
        );
    }
    for name in managed {
        role = role.annotate(Annotation::info(
            MANAGED_POLICY,
            format!("{name} is attached; its grants are not scoped to this graph"),
        ));
    }
    role
}

/// An inline policy attached to `role`
pub fn inline_policy(
    id: &str,
    role: &NodeHandle,
    statements: &[PolicyStatement],
) -> ResourceNode {
    let document = Value::map([
        ("Version", Value::str("2012-10-17")),
        (
            "Statement",
            Value::List(statements.iter().map(PolicyStatement::to_value).collect()),
        ),
    ]);

    let mut node = ResourceNode::new(id, POLICY_KIND)
        .prop("PolicyName", id)
        .prop("PolicyDocument", document)
        .prop("Roles", Value::list([role.reference()]));

    for statement in statements.iter().filter(|s| s.is_broad()) {
        node = node.annotate(Annotation::info(
            BROAD_GRANT,
            format!("{} is granted on every resource", statement.actions.join(", ")),
        ));
    }
    node
}
