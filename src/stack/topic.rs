//! Notification topic for fleet and job events

use super::Result;
use declarative::{GraphBuilder, NodeHandle, OutputBinding, ResourceNode};

pub const TOPIC_ID: &str = "snsTopic";

pub fn declare(g: &mut GraphBuilder) -> Result<NodeHandle> {
    let topic =
        g.add(ResourceNode::new(TOPIC_ID, "AWS::SNS::Topic").prop("TopicName", "voice-focus-sns"))?;

    g.output(
        OutputBinding::new(
            "SNSARN",
            &topic,
            topic.reference(),
            "Notification will be sent to this topic. Please subscribe to it in order to receive messages",
        )
        .export("vf-ami-sns-arn"),
    )?;

    Ok(topic)
}
