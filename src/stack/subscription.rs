//! Bucket-event function that turns uploads into queue messages

use super::policy::{self, PolicyStatement, ServicePrincipal};
use super::storage::{INPUT_PREFIX, Storage};
use super::{FunctionSpec, Result};
use crate::assets::AssetSource;
use declarative::{GraphBuilder, NodeHandle, Pseudo, ResourceNode, Value};

pub const ROLE_ID: &str = "FunctionServiceRole";
pub const FUNCTION_ID: &str = "Function";
pub const POLICY_ID: &str = "send_sqs_policy";
pub const PERMISSION_ID: &str = "FunctionAllowBucketNotifications";
pub const NOTIFICATION_ID: &str = "BucketNotifications";

/// Declare the function and its bucket subscription, returning the function
pub fn declare(
    g: &mut GraphBuilder,
    storage: &Storage,
    queue: &NodeHandle,
    topic: &NodeHandle,
    code: &AssetSource,
) -> Result<NodeHandle> {
    let role = g.add(policy::service_role(
        ROLE_ID,
        ServicePrincipal::Lambda,
        &["service-role/AWSLambdaBasicExecutionRole"],
    ))?;

    let send = g.add(policy::inline_policy(
        POLICY_ID,
        &role,
        &[PolicyStatement::allow(
            &["sqs:SendMessage"],
            [queue.attr("Arn")],
        )],
    ))?;

    let function = g.add(
        FunctionSpec {
            id: FUNCTION_ID,
            name: "BucketPutHandler",
            handler: "sqs_handler.lambda_handler",
            timeout_seconds: None,
            memory_mb: None,
            // The handler reads SQS_URL; QUEUE_ADDRESS is the published name
            environment: vec![
                ("SQS_URL", queue.reference()),
                ("QUEUE_ADDRESS", queue.reference()),
                ("SNS_ARN", topic.reference()),
            ],
        }
        .into_node(&role, code),
    )?;
    g.depend(&function, &send, "send rights must exist before the first event")?;
    g.depend(
        &function,
        &storage.seeding,
        "seed uploads must not trigger the function",
    )?;

    let permission = g.add(
        ResourceNode::new(PERMISSION_ID, "AWS::Lambda::Permission")
            .prop("Action", "lambda:InvokeFunction")
            .prop("FunctionName", function.attr("Arn"))
            .prop("Principal", "s3.amazonaws.com")
            .prop("SourceAccount", Pseudo::Account)
            .prop("SourceArn", storage.bucket.attr("Arn")),
    )?;

    let filter = Value::map([(
        "Key",
        Value::map([(
            "FilterRules",
            Value::list([Value::map([("Name", "prefix"), ("Value", INPUT_PREFIX)])]),
        )]),
    )]);
    let notification = g.add(
        ResourceNode::new(NOTIFICATION_ID, "Custom::S3BucketNotifications")
            .prop("BucketName", storage.bucket.reference())
            .prop(
                "NotificationConfiguration",
                Value::map([(
                    "LambdaFunctionConfigurations",
                    Value::list([Value::map([
                        ("Events", Value::list(["s3:ObjectCreated:*"])),
                        ("Filter", filter),
                        ("LambdaFunctionArn", function.attr("Arn")),
                    ])]),
                )]),
            ),
    )?;
    g.depend(
        &notification,
        &permission,
        "the bucket validates invoke rights when the notification is set",
    )?;

    Ok(function)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{queue, storage, topic};
    use declarative::{Resolver, Template};
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_function_wiring() {
        let mut g =
            GraphBuilder::new("t", crate::stack::parameters(), &BTreeMap::new()).unwrap();
        let q = queue::declare(&mut g).unwrap();
        let t = topic::declare(&mut g).unwrap();
        let s = storage::declare(&mut g, &AssetSource::unscanned("assets/s3")).unwrap();
        let function =
            declare(&mut g, &s, &q, &t, &AssetSource::unscanned("assets/sqs")).unwrap();
        let graph = g.finish().unwrap();

        assert!(graph.has_edge(q.id(), function.id()));
        assert!(graph.has_edge(t.id(), function.id()));
        assert!(graph.has_edge(POLICY_ID, function.id()));
        assert!(graph.has_edge(function.id(), NOTIFICATION_ID));
        assert!(graph.has_edge(PERMISSION_ID, NOTIFICATION_ID));

        let template = Template::synthesize(&graph, &Resolver::symbolic());
        let function = &template.resources[FUNCTION_ID];
        assert_eq!(
            function.properties["Environment"],
            json!({ "Variables": {
                "QUEUE_ADDRESS": { "Ref": "VfAmiFileQueue" },
                "SNS_ARN": { "Ref": "snsTopic" },
                "SQS_URL": { "Ref": "VfAmiFileQueue" },
            }})
        );
        assert_eq!(function.properties["Runtime"], json!("python3.7"));

        let rules = &template.resources[NOTIFICATION_ID].properties["NotificationConfiguration"]
            ["LambdaFunctionConfigurations"][0]["Filter"]["Key"]["FilterRules"][0];
        assert_eq!(rules["Value"], json!("input/"));
    }
}
