//! Processing bucket, its seeding and the path outputs

use super::{BUCKET_NAME_PREFIX, Result};
use crate::assets::AssetSource;
use declarative::{
    DeletionPolicy, GraphBuilder, NodeHandle, OutputBinding, Pseudo, ResourceNode, Value,
};

pub const BUCKET_ID: &str = "VFAMIInfraBucket";
pub const SEEDING_ID: &str = "DeployResources";
pub const AUTO_DELETE_ID: &str = "VFAMIInfraBucketAutoDeleteObjects";

pub const INPUT_OUTPUT: &str = "InputS3URI";
pub const OUTPUT_OUTPUT: &str = "OutputS3URI";

/// Key prefix watched for uploads
pub const INPUT_PREFIX: &str = "input/";

/// Handles produced by [`declare`]
#[derive(Debug, Clone)]
pub struct Storage {
    pub bucket: NodeHandle,
    pub seeding: NodeHandle,
}

impl Storage {
    /// ARN covering every object in the bucket
    pub fn objects_arn(&self) -> Value {
        Value::join([self.bucket.attr("Arn"), Value::str("/*")])
    }
}

pub fn declare(g: &mut GraphBuilder, seed: &AssetSource) -> Result<Storage> {
    // Known before the bucket exists, so the path outputs need no reference to it
    let bucket_name = Value::join([
        g.param(BUCKET_NAME_PREFIX)?,
        Value::str("-"),
        Value::from(Pseudo::Account),
        Value::str("-"),
        Value::from(Pseudo::Region),
    ]);

    let bucket = g.add(
        ResourceNode::new(BUCKET_ID, "AWS::S3::Bucket")
            .prop("BucketName", bucket_name.clone())
            .prop(
                "VersioningConfiguration",
                Value::map([("Status", "Enabled")]),
            )
            .deletion(DeletionPolicy::Delete),
    )?;

    // Empties the bucket so the Delete policy can succeed
    g.add(
        ResourceNode::new(AUTO_DELETE_ID, "Custom::S3AutoDeleteObjects")
            .prop("BucketName", bucket.reference()),
    )?;

    let mut seeding = ResourceNode::new(SEEDING_ID, "Custom::CDKBucketDeployment")
        .prop("SourceAsset", seed.path.clone())
        .prop("DestinationBucketName", bucket.reference())
        .prop("RetainOnDelete", false)
        .prop("Prune", true);
    if let Some(hash) = &seed.hash {
        seeding = seeding.prop("SourceHash", hash.clone());
    }
    let seeding = g.add(seeding)?;

    for (name, folder, description) in [
        (
            INPUT_OUTPUT,
            "input",
            "Use this URI to upload media files in supported format (audio/wav, video/mp4)",
        ),
        (
            OUTPUT_OUTPUT,
            "output",
            "Use this URI to download processed media files",
        ),
    ] {
        let uri = Value::join([
            Value::str("s3://"),
            bucket_name.clone(),
            Value::str(format!("/{folder}/")),
        ]);
        g.output(
            OutputBinding::new(name, &bucket, uri, description)
                .export(format!("vf-ami-bucket-{folder}-path")),
        )?;
    }

    Ok(Storage { bucket, seeding })
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Resolver, Template};
    use std::collections::BTreeMap;

    #[test]
    fn test_seeding_and_cleanup_reference_the_bucket() {
        let mut g =
            GraphBuilder::new("t", crate::stack::parameters(), &BTreeMap::new()).unwrap();
        let storage = declare(&mut g, &AssetSource::unscanned("assets/s3")).unwrap();
        let graph = g.finish().unwrap();

        assert!(graph.has_edge(BUCKET_ID, storage.seeding.id()));
        assert!(graph.has_edge(BUCKET_ID, AUTO_DELETE_ID));
        assert_eq!(
            graph.node(BUCKET_ID).unwrap().deletion,
            Some(DeletionPolicy::Delete)
        );

        let outputs = Template::resolve_outputs(&graph, &Resolver::symbolic());
        assert_eq!(
            outputs[INPUT_OUTPUT],
            "s3://${bucketNamePrefix}-${AWS::AccountId}-${AWS::Region}/input/"
        );
    }
}
