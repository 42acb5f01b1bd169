//! Snapshot tests
//!
//! Builds the stack with and without incoming email and compares the
//! declaration order of all nodes.

use zulip_stack::parameter_values;
use zulip_stack::parameters::ParameterValues;
use zulip_stack::stack::{build, StackProps};

fn node_order(mut parameters: ParameterValues) -> Vec<String> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("ZULIP_STACK_LOG"))
        .with_writer(std::io::stderr)
        .try_init();

    parameters.insert("AlbCertificateArn", "arn:aws:acm:us-east-1:123456789012:certificate/zulip");
    let props = StackProps::new(
        "zulip",
        include_str!("../../../zulip/launch_config_user_data.sh"),
    )
    .with_parameters(parameters);

    build(&props)
        .expect("stack builds")
        .resources()
        .map(|r| r.logical_id.clone())
        .collect()
}

#[test]
fn default_stack() {
    insta::assert_yaml_snapshot!(node_order(ParameterValues::default()), @r###"
    ---
    - Vpc
    - VpcInternetGateway
    - VpcInternetGatewayAttachment
    - VpcPublicRouteTable
    - VpcPublicDefaultRoute
    - VpcPublicSubnet1
    - VpcPublicSubnet1RouteTableAssociation
    - VpcPublicSubnet2
    - VpcPublicSubnet2RouteTableAssociation
    - VpcPrivateSubnet1
    - VpcPrivateSubnet2
    - AssetsBucket
    - AlbLogsBucket
    - AlbLogsBucketPolicy
    - SesSmtpUser
    - SesSmtpAccessKey
    - SesSmtpPasswordFunctionRole
    - SesSmtpPasswordFunction
    - SesSmtpPassword
    - SesSmtpCredentialsSecret
    - InstanceSecret
    - DbSecret
    - RabbitMqSecret
    - DbSubnetGroup
    - DbSg
    - DbCluster
    - DbPrimaryInstance
    - RedisSubnetGroup
    - RedisSg
    - RedisReplicationGroup
    - RabbitMqSg
    - RabbitMqBroker
    - AppLogGroup
    - SystemLogGroup
    - InstanceRole
    - InstanceProfile
    - AppSg
    - LaunchConfig
    - Asg
    - DbSgIngressFromApp
    - RabbitMqSgIngressFromApp
    - RedisSgIngressFromApp
    - AlbSg
    - AlbSgHttpIngress
    - AlbSgHttpsIngress
    - AppSgHttpsIngressFromAlb
    - AppAlb
    - HttpListener
    - HttpsTargetGroup
    - HttpsListener
    "###);
}

#[test]
fn incoming_email_with_hosted_zone() {
    let parameters = parameter_values! {
        "EnableIncomingEmail" => "true",
        "EmailIngressCidr" => "203.0.113.0/24",
        "EnableSubdomains" => "true",
        "DnsHostname" => "chat.example.com",
        "DnsRoute53HostedZoneName" => "example.com",
    };

    insta::assert_yaml_snapshot!(node_order(parameters), @r###"
    ---
    - Vpc
    - VpcInternetGateway
    - VpcInternetGatewayAttachment
    - VpcPublicRouteTable
    - VpcPublicDefaultRoute
    - VpcPublicSubnet1
    - VpcPublicSubnet1RouteTableAssociation
    - VpcPublicSubnet2
    - VpcPublicSubnet2RouteTableAssociation
    - VpcPrivateSubnet1
    - VpcPrivateSubnet2
    - AssetsBucket
    - AlbLogsBucket
    - AlbLogsBucketPolicy
    - SesDomainIdentity
    - SesSmtpUser
    - SesSmtpAccessKey
    - SesSmtpPasswordFunctionRole
    - SesSmtpPasswordFunction
    - SesSmtpPassword
    - SesSmtpCredentialsSecret
    - InstanceSecret
    - DbSecret
    - RabbitMqSecret
    - DbSubnetGroup
    - DbSg
    - DbCluster
    - DbPrimaryInstance
    - RedisSubnetGroup
    - RedisSg
    - RedisReplicationGroup
    - RabbitMqSg
    - RabbitMqBroker
    - AppLogGroup
    - SystemLogGroup
    - InstanceRole
    - InstanceProfile
    - AppSg
    - LaunchConfig
    - Asg
    - DbSgIngressFromApp
    - RabbitMqSgIngressFromApp
    - RedisSgIngressFromApp
    - AlbSg
    - AlbSgHttpIngress
    - AlbSgHttpsIngress
    - AppSgHttpsIngressFromAlb
    - AppAlb
    - HttpListener
    - HttpsTargetGroup
    - HttpsListener
    - EmailNlb
    - SmtpTargetGroup
    - NlbHttpTargetGroup
    - NlbHttpsTargetGroup
    - NlbSmtpListener
    - NlbHttpListener
    - NlbHttpsListener
    - AppSgSmtpIngress
    - AlbSgHttpIngressFromNlb
    - AlbSgHttpsIngressFromNlb
    - SiteDnsRecord
    - WildcardDnsRecord
    - MxDnsRecord
    "###);
}
