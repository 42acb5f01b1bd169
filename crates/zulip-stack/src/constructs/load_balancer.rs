//! Public entry points of the stack
//!
//! The application load balancer terminates HTTPS in front of the compute group. With incoming
//! email enabled a network load balancer takes over the public address. It forwards SMTP to the
//! instances and passes HTTP(S) through to the application load balancer.
use super::network::Vpc;
use super::storage::Buckets;
use super::{ingress_from_cidr, ingress_from_group, security_group};
use crate::metadata::ParameterGroup;
use crate::parameters::{Parameter, ParameterError, ParameterRef, CIDR_PATTERN};
use crate::stack::{Stack, INCOMING_EMAIL_CONDITION};
use crate::template::{Kind, NodeId, Resource};
use crate::value::Value;

pub const HTTP_PORT: u16 = 80;
pub const HTTPS_PORT: u16 = 443;
pub const SMTP_PORT: u16 = 25;

fn listener(logical_id: &str, load_balancer: &NodeId, port: u16, protocol: &str) -> Resource {
    Resource::new(
        logical_id,
        Kind::Listener,
        "AWS::ElasticLoadBalancingV2::Listener",
    )
    .property("LoadBalancerArn", load_balancer.reference())
    .property("Port", port)
    .property("Protocol", protocol)
}

fn forward_to(target_group: &NodeId) -> Value {
    vec![crate::object! {
        "TargetGroupArn" => target_group.reference(),
        "Type" => "forward",
    }]
    .into()
}

fn target_group(logical_id: &str, vpc: &Vpc, port: u16, protocol: &str) -> Resource {
    Resource::new(
        logical_id,
        Kind::TargetGroup,
        "AWS::ElasticLoadBalancingV2::TargetGroup",
    )
    .property("Port", port)
    .property("Protocol", protocol)
    .property("VpcId", vpc.vpc.reference())
}

pub struct AlbProps<'a> {
    pub vpc: &'a Vpc,
    /// security group of the compute group behind the load balancer
    pub app_security_group: &'a NodeId,
    pub buckets: &'a Buckets,
}

#[derive(Debug, Clone)]
pub struct Alb {
    pub security_group: NodeId,
    pub load_balancer: NodeId,
    pub http_listener: NodeId,
    pub https_listener: NodeId,
    pub https_target_group: NodeId,
}

impl Alb {
    pub fn new(stack: &mut Stack, props: AlbProps) -> Result<Self, ParameterError> {
        let certificate = stack.parameter(
            Parameter::string(
                "AlbCertificateArn",
                "Required: Specify the ARN of a ACM Certificate to configure HTTPS.",
            ),
            "ACM Certificate ARN",
        )?;
        let ingress_cidr = stack.parameter(
            Parameter::string(
                "AlbIngressCidr",
                "Optional: VPC IPv4 CIDR block to restrict public access to ALB (default is 0.0.0.0/0 which is open to internet).",
            )
            .with_default("0.0.0.0/0")
            .with_allowed_pattern(CIDR_PATTERN),
            "ALB Ingress CIDR",
        )?;
        stack.parameter_group(ParameterGroup::application(
            "Application Load Balancer",
            ["AlbCertificateArn", "AlbIngressCidr"],
        ));

        let sg = security_group(stack, "AlbSg", &props.vpc.vpc);
        stack.insert(ingress_from_cidr(
            "AlbSgHttpIngress",
            &sg,
            ingress_cidr.reference(),
            HTTP_PORT,
            "Allow HTTP traffic to ALB from anyone",
        ));
        stack.insert(ingress_from_cidr(
            "AlbSgHttpsIngress",
            &sg,
            ingress_cidr.reference(),
            HTTPS_PORT,
            "Allow HTTPS traffic to ALB from anyone",
        ));
        stack.insert(ingress_from_group(
            "AppSgHttpsIngressFromAlb",
            props.app_security_group,
            &sg,
            HTTPS_PORT,
            "Allow HTTPS traffic from the ALB",
        ));

        let load_balancer = stack.insert(
            Resource::new(
                "AppAlb",
                Kind::LoadBalancer,
                "AWS::ElasticLoadBalancingV2::LoadBalancer",
            )
            .property(
                "LoadBalancerAttributes",
                vec![
                    crate::object! {
                        "Key" => "access_logs.s3.enabled",
                        "Value" => "true",
                    },
                    crate::object! {
                        "Key" => "access_logs.s3.bucket",
                        "Value" => props.buckets.logs.reference(),
                    },
                ],
            )
            .property("Scheme", "internet-facing")
            .property("SecurityGroups", vec![sg.get_att("GroupId")])
            .property("Subnets", props.vpc.public_subnet_ids())
            .property("Type", "application")
            .depends_on(&props.buckets.logs_policy),
        );

        let http_listener = stack.insert(
            listener("HttpListener", &load_balancer, HTTP_PORT, "HTTP").property(
                "DefaultActions",
                vec![crate::object! {
                    "RedirectConfig" => crate::object! {
                        "Host" => "#{host}",
                        "Path" => "/#{path}",
                        "Port" => "443",
                        "Protocol" => "HTTPS",
                        "Query" => "#{query}",
                        "StatusCode" => "HTTP_301",
                    },
                    "Type" => "redirect",
                }],
            ),
        );

        let https_target_group = stack.insert(
            target_group("HttpsTargetGroup", props.vpc, HTTPS_PORT, "HTTPS")
                .property(
                    "TargetGroupAttributes",
                    vec![crate::object! {
                        "Key" => "deregistration_delay.timeout_seconds",
                        "Value" => "10",
                    }],
                )
                .property("TargetType", "instance"),
        );

        let https_listener = stack.insert(
            listener("HttpsListener", &load_balancer, HTTPS_PORT, "HTTPS")
                .property(
                    "Certificates",
                    vec![crate::object! { "CertificateArn" => certificate.reference() }],
                )
                .property("DefaultActions", forward_to(&https_target_group)),
        );

        Ok(Self {
            security_group: sg,
            load_balancer,
            http_listener,
            https_listener,
            https_target_group,
        })
    }
}

pub struct NlbProps<'a> {
    pub vpc: &'a Vpc,
    pub alb: &'a Alb,
    pub app_security_group: &'a NodeId,
    /// where SMTP connections may come from
    pub email_ingress_cidr: &'a ParameterRef,
}

/// Every node of this construct is guarded by [INCOMING_EMAIL_CONDITION]
#[derive(Debug, Clone)]
pub struct Nlb {
    pub load_balancer: NodeId,
    pub smtp_target_group: NodeId,
    pub http_target_group: NodeId,
    pub https_target_group: NodeId,
    pub smtp_ingress: NodeId,
}

impl Nlb {
    pub fn new(stack: &mut Stack, props: NlbProps) -> Self {
        let guarded = |resource: Resource| resource.condition(INCOMING_EMAIL_CONDITION);

        let load_balancer = stack.insert(guarded(
            Resource::new(
                "EmailNlb",
                Kind::LoadBalancer,
                "AWS::ElasticLoadBalancingV2::LoadBalancer",
            )
            .property("Scheme", "internet-facing")
            .property("Subnets", props.vpc.public_subnet_ids())
            .property("Type", "network")
            .depends_on(&props.alb.http_listener)
            .depends_on(&props.alb.https_listener),
        ));

        let smtp_target_group = stack.insert(guarded(
            target_group("SmtpTargetGroup", props.vpc, SMTP_PORT, "TCP")
                .property("TargetType", "instance"),
        ));

        let alb_target = |logical_id: &str, port: u16| {
            guarded(
                target_group(logical_id, props.vpc, port, "TCP")
                    .property(
                        "Targets",
                        vec![crate::object! {
                            "Id" => props.alb.load_balancer.reference(),
                            "Port" => port,
                        }],
                    )
                    .property("TargetType", "alb"),
            )
        };
        let http_target_group = stack.insert(alb_target("NlbHttpTargetGroup", HTTP_PORT));
        let https_target_group = stack.insert(alb_target("NlbHttpsTargetGroup", HTTPS_PORT));

        for (logical_id, port, target) in [
            ("NlbSmtpListener", SMTP_PORT, &smtp_target_group),
            ("NlbHttpListener", HTTP_PORT, &http_target_group),
            ("NlbHttpsListener", HTTPS_PORT, &https_target_group),
        ] {
            stack.insert(guarded(
                listener(logical_id, &load_balancer, port, "TCP")
                    .property("DefaultActions", forward_to(target)),
            ));
        }

        let smtp_ingress = stack.insert(guarded(ingress_from_cidr(
            "AppSgSmtpIngress",
            props.app_security_group,
            props.email_ingress_cidr.reference(),
            SMTP_PORT,
            "Allow SMTP traffic to the instances",
        )));

        // the application load balancer sees the private addresses of this one
        for (logical_id, port, description) in [
            (
                "AlbSgHttpIngressFromNlb",
                HTTP_PORT,
                "Allow HTTP traffic passed through the NLB",
            ),
            (
                "AlbSgHttpsIngressFromNlb",
                HTTPS_PORT,
                "Allow HTTPS traffic passed through the NLB",
            ),
        ] {
            stack.insert(guarded(ingress_from_cidr(
                logical_id,
                &props.alb.security_group,
                props.vpc.vpc.get_att("CidrBlock"),
                port,
                description,
            )));
        }

        Self {
            load_balancer,
            smtp_target_group,
            http_target_group,
            https_target_group,
            smtp_ingress,
        }
    }
}
