//! Work queue drained by the fleet

use super::Result;
use declarative::{DeletionPolicy, GraphBuilder, NodeHandle, OutputBinding, ResourceNode};

pub const QUEUE_ID: &str = "VfAmiFileQueue";
pub const QUEUE_NAME: &str = "voice-focus-sqs";

/// Long enough for one media file to be processed before redelivery
const VISIBILITY_TIMEOUT_SECONDS: i64 = 3600;

pub fn declare(g: &mut GraphBuilder) -> Result<NodeHandle> {
    let queue = g.add(
        ResourceNode::new(QUEUE_ID, "AWS::SQS::Queue")
            .prop("QueueName", QUEUE_NAME)
            .prop("VisibilityTimeout", VISIBILITY_TIMEOUT_SECONDS)
            .deletion(DeletionPolicy::Delete),
    )?;

    g.output(
        OutputBinding::new(
            "SQSURL",
            &queue,
            queue.reference(),
            "Send messages directly to this queue so that they will be caught by VF AMI workers",
        )
        .export("vf-ami-sqs-url"),
    )?;

    Ok(queue)
}
