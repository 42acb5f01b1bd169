//! Building blocks that declare related nodes together
//!
//! Each construct declares its parameters, their console grouping and its nodes into a
//! [Stack](crate::stack::Stack) and hands back the ids later constructs need.
pub mod cache;
pub mod compute;
pub mod database;
pub mod dns;
pub mod email;
pub mod load_balancer;
pub mod network;
pub mod queue;
pub mod secrets;
pub mod storage;

use crate::stack::Stack;
use crate::template::{Kind, NodeId, Resource};
use crate::value::Value;

/// `Tags` with a single `Name` tag of `<stack name>/<name>`
pub(crate) fn name_tag(name: &str) -> Value {
    vec![crate::object! {
        "Key" => "Name",
        "Value" => Value::sub(format!("${{AWS::StackName}}/{name}")),
    }]
    .into()
}

/// Security group inside the stack's VPC, without any ingress
pub(crate) fn security_group(stack: &mut Stack, logical_id: &str, vpc: &NodeId) -> NodeId {
    stack.insert(
        Resource::new(logical_id, Kind::SecurityGroup, "AWS::EC2::SecurityGroup")
            .property(
                "GroupDescription",
                Value::sub(format!("${{AWS::StackName}}/{logical_id}")),
            )
            .property("VpcId", vpc.reference())
            .property("Tags", name_tag(logical_id)),
    )
}

/// Allow tcp `port` on `target` from members of `source`
pub(crate) fn ingress_from_group(
    logical_id: &str,
    target: &NodeId,
    source: &NodeId,
    port: u16,
    description: &str,
) -> Resource {
    Resource::new(logical_id, Kind::Ingress, "AWS::EC2::SecurityGroupIngress")
        .property("Description", description)
        .property("FromPort", port)
        .property("GroupId", target.get_att("GroupId"))
        .property("IpProtocol", "tcp")
        .property("SourceSecurityGroupId", source.get_att("GroupId"))
        .property("ToPort", port)
}

/// Allow tcp `port` on `target` from the block held by `cidr`
pub(crate) fn ingress_from_cidr(
    logical_id: &str,
    target: &NodeId,
    cidr: Value,
    port: u16,
    description: &str,
) -> Resource {
    Resource::new(logical_id, Kind::Ingress, "AWS::EC2::SecurityGroupIngress")
        .property("CidrIp", cidr)
        .property("Description", description)
        .property("FromPort", port)
        .property("GroupId", target.get_att("GroupId"))
        .property("IpProtocol", "tcp")
        .property("ToPort", port)
}
