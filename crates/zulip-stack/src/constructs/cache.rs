use super::network::Vpc;
use super::security_group;
use crate::metadata::ParameterGroup;
use crate::parameters::{Parameter, ParameterError};
use crate::stack::Stack;
use crate::template::{Kind, NodeId, Resource};
use crate::value::Value;

pub const REDIS_PORT: u16 = 6379;

/// Single node Redis replication group in the private subnets
#[derive(Debug, Clone)]
pub struct Redis {
    pub security_group: NodeId,
    pub replication_group: NodeId,
}

impl Redis {
    pub fn new(stack: &mut Stack, vpc: &Vpc) -> Result<Self, ParameterError> {
        let node_type = stack.parameter(
            Parameter::string(
                "RedisNodeType",
                "Required: The compute and memory capacity of the nodes in the Redis cluster.",
            )
            .with_default("cache.t3.micro")
            .with_allowed_values([
                "cache.t3.micro",
                "cache.t3.small",
                "cache.t3.medium",
                "cache.m5.large",
                "cache.m5.xlarge",
                "cache.r5.large",
                "cache.r5.xlarge",
            ]),
            "Node Type",
        )?;
        stack.parameter_group(ParameterGroup::application("Redis", ["RedisNodeType"]));

        let subnet_group = stack.insert(
            Resource::new(
                "RedisSubnetGroup",
                Kind::Cache,
                "AWS::ElastiCache::SubnetGroup",
            )
            .property("Description", Value::sub("${AWS::StackName}/RedisSubnetGroup"))
            .property("SubnetIds", vpc.private_subnet_ids()),
        );

        let sg = security_group(stack, "RedisSg", &vpc.vpc);

        let replication_group = stack.insert(
            Resource::new(
                "RedisReplicationGroup",
                Kind::Cache,
                "AWS::ElastiCache::ReplicationGroup",
            )
            .property("AtRestEncryptionEnabled", true)
            .property("CacheNodeType", node_type.reference())
            .property("CacheSubnetGroupName", subnet_group.reference())
            .property("Engine", "redis")
            .property("NumCacheClusters", 1u32)
            .property("Port", REDIS_PORT)
            .property(
                "ReplicationGroupDescription",
                Value::sub("${AWS::StackName}/Redis"),
            )
            .property("SecurityGroupIds", vec![sg.get_att("GroupId")]),
        );

        Ok(Self {
            security_group: sg,
            replication_group,
        })
    }

    /// `host` of the primary endpoint
    pub fn endpoint(&self) -> Value {
        self.replication_group.get_att("PrimaryEndPoint.Address")
    }
}
