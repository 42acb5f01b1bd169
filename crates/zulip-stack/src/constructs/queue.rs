use super::network::Vpc;
use super::secrets::resolve;
use super::security_group;
use crate::metadata::ParameterGroup;
use crate::parameters::{Parameter, ParameterError};
use crate::readiness::{Broker, Ready};
use crate::stack::Stack;
use crate::template::{Kind, NodeId, Resource};
use crate::value::Value;

pub const AMQPS_PORT: u16 = 5671;

/// Amazon MQ RabbitMQ broker, single instance in the first private subnet
#[derive(Debug, Clone)]
pub struct RabbitMq {
    pub security_group: NodeId,
    pub broker: NodeId,
}

impl RabbitMq {
    pub fn new(stack: &mut Stack, vpc: &Vpc, secret: &NodeId) -> Result<Self, ParameterError> {
        let instance_type = stack.parameter(
            Parameter::string(
                "MqInstanceType",
                "Required: The instance type of the RabbitMQ broker.",
            )
            .with_default("mq.t3.micro")
            .with_allowed_values(["mq.t3.micro", "mq.m5.large", "mq.m5.xlarge", "mq.m5.2xlarge"]),
            "Broker Instance Type",
        )?;
        stack.parameter_group(ParameterGroup::application("RabbitMQ", ["MqInstanceType"]));

        let sg = security_group(stack, "RabbitMqSg", &vpc.vpc);

        // single instance brokers take exactly one subnet
        let subnets: Vec<Value> = vpc
            .private_subnets
            .iter()
            .take(1)
            .map(NodeId::reference)
            .collect();

        let broker = stack.insert(
            Resource::new("RabbitMqBroker", Kind::Queue, "AWS::AmazonMQ::Broker")
                .property("AutoMinorVersionUpgrade", true)
                .property("BrokerName", Value::sub("${AWS::StackName}-rabbitmq"))
                .property("DeploymentMode", "SINGLE_INSTANCE")
                .property("EngineType", "RABBITMQ")
                .property("EngineVersion", "3.11.20")
                .property("HostInstanceType", instance_type.reference())
                .property("PubliclyAccessible", false)
                .property("SecurityGroups", vec![sg.get_att("GroupId")])
                .property("SubnetIds", subnets)
                .property(
                    "Users",
                    vec![crate::object! {
                        "Username" => resolve(secret, "username"),
                        "Password" => resolve(secret, "password"),
                    }],
                ),
        );

        Ok(Self {
            security_group: sg,
            broker,
        })
    }

    /// The broker has been declared
    pub fn broker_ready(&self) -> Ready<Broker> {
        Ready::new(self.broker.as_str())
    }

    /// `amqps://` endpoint of the broker
    pub fn endpoint(&self) -> Value {
        Value::select(0, self.broker.get_att("AmqpEndpoints"))
    }
}
