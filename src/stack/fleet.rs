//! Worker fleet: network, firewall, instance identity and the scaling group
//!
//! The group is ordered after the artifact barrier because every instance
//! copies the compiled tool out of the bucket at boot.

use super::policy::{self, PolicyStatement, ServicePrincipal};
use super::storage::Storage;
use super::userdata::{UserData, WorkerHandles};
use super::{MAX_FLEET_CAPACITY, Result};
use declarative::{Annotation, GraphBuilder, NodeHandle, Pseudo, ResourceNode, Value};
use std::collections::BTreeMap;

pub const VPC_ID: &str = "vpc";
pub const GATEWAY_ID: &str = "vpcIGW";
pub const ATTACHMENT_ID: &str = "vpcVPCGW";
pub const ROUTE_TABLE_ID: &str = "vpcPublicRouteTable";
pub const ROUTE_ID: &str = "vpcPublicDefaultRoute";
pub const SECURITY_GROUP_ID: &str = "security_group";
pub const ROLE_ID: &str = "asgInstanceRole";
pub const PROFILE_ID: &str = "asgInstanceProfile";
pub const LAUNCH_CONFIG_ID: &str = "asgLaunchConfig";
pub const GROUP_ID: &str = "asg";
pub const GROUP_NAME: &str = "voice-focus-asg";
pub const POLICY_ID: &str = "asg_policy";

/// Annotation code for firewall rules open to any address
pub const INSECURE_INGRESS: &str = "insecure-ingress";

const VPC_CIDR: &str = "10.0.0.0/16";
const PUBLIC_SUBNETS: [&str; 2] = ["10.0.0.0/18", "10.0.64.0/18"];
const ANY_IPV4: &str = "0.0.0.0/0";
const INSTANCE_TYPE: &str = "c5.2xlarge";

/// Marketplace product the worker image is published under
pub const IMAGE_PRODUCT_CODE: &str = "8dr8712nir8cvnlfn92e8fyz2";

const SCALING_EVENTS: [&str; 4] = [
    "autoscaling:EC2_INSTANCE_LAUNCH",
    "autoscaling:EC2_INSTANCE_LAUNCH_ERROR",
    "autoscaling:EC2_INSTANCE_TERMINATE",
    "autoscaling:EC2_INSTANCE_TERMINATE_ERROR",
];

/// One inbound TCP rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IngressRule {
    cidr: &'static str,
    port: i64,
    description: &'static str,
}

impl IngressRule {
    fn is_open_to_world(self) -> bool {
        self.cidr == ANY_IPV4
    }

    fn to_value(self) -> Value {
        Value::map([
            ("CidrIp", Value::str(self.cidr)),
            ("Description", Value::str(self.description)),
            ("FromPort", Value::Int(self.port)),
            ("IpProtocol", Value::str("tcp")),
            ("ToPort", Value::Int(self.port)),
        ])
    }
}

// Not parameterized: remote access stays open to any address and is flagged
const SSH_FROM_ANYWHERE: IngressRule = IngressRule {
    cidr: ANY_IPV4,
    port: 22,
    description: "SSH from anywhere",
};

pub fn declare(
    g: &mut GraphBuilder,
    storage: &Storage,
    queue: &NodeHandle,
    topic: &NodeHandle,
    artifact_ready: &NodeHandle,
) -> Result<NodeHandle> {
    let (vpc, subnets, route) = network(g)?;

    let mut sg = ResourceNode::new(SECURITY_GROUP_ID, "AWS::EC2::SecurityGroup")
        .prop("GroupDescription", "Worker fleet")
        .prop("VpcId", vpc.reference())
        .prop(
            "SecurityGroupEgress",
            Value::list([Value::map([
                ("CidrIp", ANY_IPV4),
                ("Description", "Allow all outbound traffic by default"),
                ("IpProtocol", "-1"),
            ])]),
        )
        .prop(
            "SecurityGroupIngress",
            Value::list([SSH_FROM_ANYWHERE.to_value()]),
        );
    if SSH_FROM_ANYWHERE.is_open_to_world() {
        sg = sg.annotate(Annotation::warning(
            INSECURE_INGRESS,
            format!(
                "Inbound TCP {} is open to {}",
                SSH_FROM_ANYWHERE.port, SSH_FROM_ANYWHERE.cidr
            ),
        ));
    }
    let security_group = g.add(sg)?;

    let role = g.add(policy::service_role(
        ROLE_ID,
        ServicePrincipal::Ec2,
        &["CloudWatchAgentServerPolicy"],
    ))?;
    let profile = g.add(
        ResourceNode::new(PROFILE_ID, "AWS::IAM::InstanceProfile")
            .prop("Roles", Value::list([role.reference()])),
    )?;

    let user_data = UserData::for_worker(&WorkerHandles {
        bucket_name: storage.bucket.reference(),
        queue_url: queue.reference(),
        region: Value::from(Pseudo::Region),
    });
    let launch_config = g.add(
        ResourceNode::new(LAUNCH_CONFIG_ID, "AWS::AutoScaling::LaunchConfiguration")
            .prop("ImageId", image_lookup())
            .prop("InstanceType", INSTANCE_TYPE)
            .prop("InstanceMonitoring", true)
            .prop("IamInstanceProfile", profile.reference())
            .prop(
                "SecurityGroups",
                Value::list([security_group.attr("GroupId")]),
            )
            .prop("UserData", user_data.to_base64()),
    )?;

    let max_size = g.param(MAX_FLEET_CAPACITY)?;
    let group = g.add(
        ResourceNode::new(GROUP_ID, "AWS::AutoScaling::AutoScalingGroup")
            .prop("AutoScalingGroupName", GROUP_NAME)
            .prop("LaunchConfigurationName", launch_config.reference())
            .prop("MinSize", 1i64)
            .prop("DesiredCapacity", 1i64)
            .prop("MaxSize", max_size)
            .prop(
                "VPCZoneIdentifier",
                Value::List(subnets.iter().map(NodeHandle::reference).collect()),
            )
            .prop(
                "MetricsCollection",
                Value::list([Value::map([("Granularity", "1Minute")])]),
            )
            .prop(
                "NotificationConfigurations",
                Value::list([Value::map([
                    ("TopicARN", topic.reference()),
                    ("NotificationTypes", Value::list(SCALING_EVENTS)),
                ])]),
            ),
    )?;
    g.depend(
        &group,
        artifact_ready,
        "instances fetch the compiled artifact at boot",
    )?;
    g.depend(&group, &route, "instances need a route to the internet")?;

    let group_arn = Value::join([
        Value::str("arn:"),
        Value::from(Pseudo::Partition),
        Value::str(":autoscaling:"),
        Value::from(Pseudo::Region),
        Value::str(":"),
        Value::from(Pseudo::Account),
        Value::str(":autoScalingGroup:*:autoScalingGroupName/"),
        group.reference(),
    ]);
    g.add(policy::inline_policy(
        POLICY_ID,
        &role,
        &[
            PolicyStatement::allow(&["autoscaling:CompleteLifecycleAction"], [group_arn]),
            PolicyStatement::broad(&["autoscaling:DescribeAutoScalingInstances"]),
            PolicyStatement::allow(
                &["sqs:DeleteMessage", "sqs:ReceiveMessage"],
                [queue.attr("Arn")],
            ),
            PolicyStatement::allow(
                &["s3:GetObject", "s3:PutObject"],
                [storage.objects_arn()],
            ),
            PolicyStatement::broad(&["sns:Publish"]),
        ],
    ))?;

    Ok(group)
}

/// VPC with public subnets routed through an internet gateway
fn network(g: &mut GraphBuilder) -> Result<(NodeHandle, Vec<NodeHandle>, NodeHandle)> {
    let vpc = g.add(
        ResourceNode::new(VPC_ID, "AWS::EC2::VPC")
            .prop("CidrBlock", VPC_CIDR)
            .prop("EnableDnsHostnames", true)
            .prop("EnableDnsSupport", true),
    )?;
    let gateway = g.add(ResourceNode::new(GATEWAY_ID, "AWS::EC2::InternetGateway"))?;
    let attachment = g.add(
        ResourceNode::new(ATTACHMENT_ID, "AWS::EC2::VPCGatewayAttachment")
            .prop("VpcId", vpc.reference())
            .prop("InternetGatewayId", gateway.reference()),
    )?;

    let table = g.add(
        ResourceNode::new(ROUTE_TABLE_ID, "AWS::EC2::RouteTable").prop("VpcId", vpc.reference()),
    )?;
    let route = g.add(
        ResourceNode::new(ROUTE_ID, "AWS::EC2::Route")
            .prop("RouteTableId", table.reference())
            .prop("DestinationCidrBlock", ANY_IPV4)
            .prop("GatewayId", gateway.reference()),
    )?;
    g.depend(&route, &attachment, "the gateway must be attached first")?;

    let mut subnets = Vec::new();
    for (index, cidr) in (0i64..).zip(PUBLIC_SUBNETS) {
        let id = format!("vpcPublicSubnet{}", index + 1);
        let subnet = g.add(
            ResourceNode::new(&id, "AWS::EC2::Subnet")
                .prop("VpcId", vpc.reference())
                .prop("CidrBlock", cidr)
                .prop("AvailabilityZone", availability_zone(index))
                .prop("MapPublicIpOnLaunch", true),
        )?;
        g.add(
            ResourceNode::new(
                format!("{id}RouteTableAssociation"),
                "AWS::EC2::SubnetRouteTableAssociation",
            )
            .prop("SubnetId", subnet.reference())
            .prop("RouteTableId", table.reference()),
        )?;
        subnets.push(subnet);
    }

    Ok((vpc, subnets, route))
}

/// Zone picked by the provisioning engine at apply time
fn availability_zone(index: i64) -> Value {
    Value::Lookup {
        provider: "availability-zones".to_string(),
        query: BTreeMap::from([
            ("index".to_string(), Value::Int(index)),
            ("region".to_string(), Value::from(Pseudo::Region)),
        ]),
    }
}

/// Latest marketplace image for the worker product, resolved at apply time
fn image_lookup() -> Value {
    Value::Lookup {
        provider: "machine-image".to_string(),
        query: BTreeMap::from([
            ("name".to_string(), Value::str("*")),
            ("owners".to_string(), Value::list(["aws-marketplace"])),
            (
                "product-code".to_string(),
                Value::list([IMAGE_PRODUCT_CODE]),
            ),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetSource;
    use crate::stack::{artifact, queue, storage, topic};
    use declarative::{Environment, Resolver, Severity, Template};
    use serde_json::json;

    fn graph() -> declarative::ResourceGraph {
        let mut g = GraphBuilder::new(
            "t",
            crate::stack::parameters(),
            &BTreeMap::from([(MAX_FLEET_CAPACITY.to_string(), "3".to_string())]),
        )
        .unwrap();
        let q = queue::declare(&mut g).unwrap();
        let t = topic::declare(&mut g).unwrap();
        let s = storage::declare(&mut g, &AssetSource::unscanned("assets/s3")).unwrap();
        let barrier =
            artifact::declare(&mut g, &s, &AssetSource::unscanned("assets/codebuild")).unwrap();
        declare(&mut g, &s, &q, &t, &barrier).unwrap();
        g.finish().unwrap()
    }

    #[test]
    fn test_group_settings() {
        let graph = graph();
        let env = Environment::default();
        let template = Template::synthesize(&graph, &Resolver::with_environment(graph.values(), &env));
        let group = &template.resources[GROUP_ID];

        assert_eq!(group.properties["MaxSize"], json!(3));
        assert_eq!(group.properties["MinSize"], json!(1));
        assert_eq!(group.properties["AutoScalingGroupName"], json!(GROUP_NAME));
        assert_eq!(
            group.properties["NotificationConfigurations"][0]["NotificationTypes"]
                .as_array()
                .map(Vec::len),
            Some(4)
        );

        let lc = &template.resources[LAUNCH_CONFIG_ID];
        assert_eq!(lc.properties["InstanceType"], json!("c5.2xlarge"));
        assert_eq!(
            lc.properties["ImageId"]["Lookup"]["Query"]["product-code"],
            json!([IMAGE_PRODUCT_CODE])
        );
        assert!(lc.properties["UserData"].get("Fn::Base64").is_some());
    }

    #[test]
    fn test_open_ssh_is_flagged() {
        let graph = graph();
        let sg = graph.node(SECURITY_GROUP_ID).unwrap();
        assert_eq!(sg.annotations.len(), 1);
        assert_eq!(sg.annotations[0].code, INSECURE_INGRESS);
        assert_eq!(sg.annotations[0].severity, Severity::Warning);
    }

    #[test]
    fn test_policy_follows_group_and_grants_five_statements() {
        let graph = graph();
        assert!(graph.has_edge(GROUP_ID, POLICY_ID));
        assert!(graph.has_edge(ROLE_ID, POLICY_ID));
        assert!(graph.has_edge(VPC_ID, SECURITY_GROUP_ID));

        let node = graph.node(POLICY_ID).unwrap();
        let statements = node
            .properties
            .get("PolicyDocument")
            .and_then(|d| d.get("Statement"))
            .and_then(Value::as_list)
            .unwrap();
        assert_eq!(statements.len(), 5);
        assert_eq!(node.annotations.len(), 2);
    }
}
