//! Media-tool artifact build, run once while the stack is provisioned
//!
//! The build job writes `resources/ffmpeg_artifact/FFmpeg/ffmpeg` into the
//! bucket. A custom step invokes it through the orchestration function and
//! blocks until the job finishes, bounded by [`WAIT_CEILING`].

use super::buildspec::BuildSpec;
use super::policy::{self, PolicyStatement, ServicePrincipal};
use super::storage::Storage;
use super::{FunctionSpec, Result, StackError};
use crate::assets::AssetSource;
use declarative::{Barrier, ExpiryAction, GraphBuilder, NodeHandle, ResourceNode, Value};
use std::time::Duration;

pub const PROJECT_ID: &str = "ffmpeg_static";
pub const PROJECT_NAME: &str = "ffmpeg_static_project";
pub const BUILD_ROLE_ID: &str = "ffmpeg_staticRole";
pub const BUILD_POLICY_ID: &str = "ffmpeg_staticRolePolicy";
pub const RUNNER_ROLE_ID: &str = "crFunctionServiceRole";
pub const RUNNER_ID: &str = "crFunction";
pub const RUNNER_POLICY_ID: &str = "build_ffmpeg_policy";
pub const PROVIDER_ID: &str = "codebuild_cr_provider";
pub const BARRIER_ID: &str = "codeBuildCustomResource";

const WAIT_CEILING_SECONDS: i64 = 15 * 60;

/// Longest the stack waits for the build
pub const WAIT_CEILING: Duration = Duration::from_secs(WAIT_CEILING_SECONDS.unsigned_abs());

const PROVIDER_QUERY_INTERVAL_SECONDS: i64 = 5;
const BUILD_IMAGE: &str = "aws/codebuild/amazonlinux2-x86_64-standard:3.0";

/// Declare the build and return the blocking step
///
/// Everything that needs the artifact orders after the returned node.
pub fn declare(
    g: &mut GraphBuilder,
    storage: &Storage,
    code: &AssetSource,
) -> Result<NodeHandle> {
    let spec = BuildSpec::ffmpeg_static()
        .to_json()
        .map_err(|source| StackError::Render {
            what: "build spec",
            source,
        })?;

    let build_role = g.add(policy::service_role(
        BUILD_ROLE_ID,
        ServicePrincipal::CodeBuild,
        &[],
    ))?;
    let build_write = g.add(policy::inline_policy(
        BUILD_POLICY_ID,
        &build_role,
        &[PolicyStatement::allow(
            &[
                "s3:DeleteObject*",
                "s3:PutObject",
                "s3:PutObjectLegalHold",
                "s3:PutObjectRetention",
                "s3:PutObjectTagging",
                "s3:PutObjectVersionTagging",
                "s3:Abort*",
            ],
            [storage.bucket.attr("Arn"), storage.objects_arn()],
        )],
    ))?;

    let project = g.add(
        ResourceNode::new(PROJECT_ID, "AWS::CodeBuild::Project")
            .prop("Name", PROJECT_NAME)
            .prop("ServiceRole", build_role.attr("Arn"))
            .prop(
                "Source",
                Value::map([("Type", Value::str("NO_SOURCE")), ("BuildSpec", Value::str(spec))]),
            )
            .prop(
                "Artifacts",
                Value::map([
                    ("Type", Value::str("S3")),
                    ("Location", storage.bucket.reference()),
                    ("Path", Value::str("resources/")),
                    ("Name", Value::str("ffmpeg_artifact")),
                    ("Packaging", Value::str("NONE")),
                    ("NamespaceType", Value::str("NONE")),
                ]),
            )
            .prop(
                "Environment",
                Value::map([
                    ("Type", "LINUX_CONTAINER"),
                    ("Image", BUILD_IMAGE),
                    ("ComputeType", "BUILD_GENERAL1_SMALL"),
                ]),
            ),
    )?;

    let runner_role = g.add(policy::service_role(
        RUNNER_ROLE_ID,
        ServicePrincipal::Lambda,
        &["service-role/AWSLambdaBasicExecutionRole"],
    ))?;
    let runner_policy = g.add(policy::inline_policy(
        RUNNER_POLICY_ID,
        &runner_role,
        &[PolicyStatement::allow(
            &["codebuild:StartBuild", "codebuild:BatchGetBuilds"],
            [project.attr("Arn")],
        )],
    ))?;

    let runner = g.add(
        FunctionSpec {
            id: RUNNER_ID,
            name: "codebuild_run_build",
            handler: "codebuild_run_build.lambda_handler",
            timeout_seconds: Some(WAIT_CEILING_SECONDS),
            memory_mb: Some(1024),
            environment: vec![("projectName", project.reference())],
        }
        .into_node(&runner_role, code),
    )?;
    g.depend(&runner, &runner_policy, "start/poll rights before the first build")?;

    let provider = g.add(
        ResourceNode::new(PROVIDER_ID, "Custom::ProviderFramework")
            .prop("OnEventHandler", runner.attr("Arn"))
            .prop("QueryIntervalSeconds", PROVIDER_QUERY_INTERVAL_SECONDS)
            .prop("TotalTimeoutSeconds", WAIT_CEILING_SECONDS),
    )?;

    let barrier = g.add(
        ResourceNode::new(BARRIER_ID, "AWS::CloudFormation::CustomResource")
            .prop("ServiceToken", provider.attr("ServiceToken"))
            .barrier(Barrier {
                wait_ceiling: WAIT_CEILING,
                on_expiry: ExpiryAction::FailApply,
            }),
    )?;
    g.depend(
        &barrier,
        &build_write,
        "the build writes its artifact into the bucket",
    )?;

    Ok(barrier)
}
