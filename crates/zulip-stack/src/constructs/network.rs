use super::name_tag;
use crate::metadata::ParameterGroup;
use crate::parameters::{Parameter, ParameterError, CIDR_PATTERN};
use crate::stack::Stack;
use crate::template::{Kind, NodeId, Resource};
use crate::value::Value;

/// The network every other node lives in
///
/// Two public subnets (routed through an internet gateway) for load balancers and instances,
/// two private subnets for the managed services. Subnets are spread over the first two
/// availability zones of the region.
#[derive(Debug, Clone)]
pub struct Vpc {
    pub vpc: NodeId,
    pub public_subnets: Vec<NodeId>,
    pub private_subnets: Vec<NodeId>,
}

impl Vpc {
    /// Size of each subnet, `/24` inside the default `/16`
    const SUBNET_BITS: u32 = 8;

    pub fn new(stack: &mut Stack) -> Result<Self, ParameterError> {
        let cidr = stack.parameter(
            Parameter::string(
                "VpcCidr",
                "Optional: IPv4 CIDR block of the VPC created for this stack.",
            )
            .with_default("10.0.0.0/16")
            .with_allowed_pattern(CIDR_PATTERN),
            "VPC IPv4 CIDR block",
        )?;
        stack.parameter_group(ParameterGroup::network("VPC", ["VpcCidr"]));

        let vpc = stack.insert(
            Resource::new("Vpc", Kind::Network, "AWS::EC2::VPC")
                .property("CidrBlock", cidr.reference())
                .property("EnableDnsHostnames", true)
                .property("EnableDnsSupport", true)
                .property("Tags", name_tag("Vpc")),
        );

        let gateway = stack.insert(
            Resource::new(
                "VpcInternetGateway",
                Kind::Gateway,
                "AWS::EC2::InternetGateway",
            )
            .property("Tags", name_tag("Vpc")),
        );
        let attachment = stack.insert(
            Resource::new(
                "VpcInternetGatewayAttachment",
                Kind::Gateway,
                "AWS::EC2::VPCGatewayAttachment",
            )
            .property("InternetGatewayId", gateway.reference())
            .property("VpcId", vpc.reference()),
        );
        let public_routes = stack.insert(
            Resource::new("VpcPublicRouteTable", Kind::Gateway, "AWS::EC2::RouteTable")
                .property("VpcId", vpc.reference())
                .property("Tags", name_tag("Vpc/Public")),
        );
        stack.insert(
            Resource::new("VpcPublicDefaultRoute", Kind::Gateway, "AWS::EC2::Route")
                .property("DestinationCidrBlock", "0.0.0.0/0")
                .property("GatewayId", gateway.reference())
                .property("RouteTableId", public_routes.reference())
                .depends_on(&attachment),
        );

        let mut public_subnets = vec![];
        let mut private_subnets = vec![];

        for index in 0..4u32 {
            let public = index < 2;
            let tier = if public { "Public" } else { "Private" };
            let logical_id = format!("Vpc{tier}Subnet{}", index % 2 + 1);

            let subnet = stack.insert(
                Resource::new(&logical_id, Kind::Subnet, "AWS::EC2::Subnet")
                    .property("AvailabilityZone", Value::availability_zone(index % 2))
                    .property(
                        "CidrBlock",
                        Value::select(
                            index,
                            Value::cidr(vpc.get_att("CidrBlock"), 4, Self::SUBNET_BITS),
                        ),
                    )
                    .property("MapPublicIpOnLaunch", public)
                    .property("VpcId", vpc.reference())
                    .property("Tags", name_tag(&logical_id)),
            );

            if public {
                stack.insert(
                    Resource::new(
                        format!("{logical_id}RouteTableAssociation"),
                        Kind::Gateway,
                        "AWS::EC2::SubnetRouteTableAssociation",
                    )
                    .property("RouteTableId", public_routes.reference())
                    .property("SubnetId", subnet.reference()),
                );
                public_subnets.push(subnet);
            } else {
                private_subnets.push(subnet);
            }
        }

        Ok(Self {
            vpc,
            public_subnets,
            private_subnets,
        })
    }

    pub fn public_subnet_ids(&self) -> Value {
        self.public_subnets
            .iter()
            .map(NodeId::reference)
            .collect::<Vec<_>>()
            .into()
    }

    pub fn private_subnet_ids(&self) -> Value {
        self.private_subnets
            .iter()
            .map(NodeId::reference)
            .collect::<Vec<_>>()
            .into()
    }
}
