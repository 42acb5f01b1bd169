//! Builds the complete stack for a couple of parameter sets and checks the shape of the graph

use pretty_assertions::assert_eq;
use std::collections::{HashMap, HashSet, VecDeque};
use zulip_stack::mapping::{AmiRegionMap, MappingError};
use zulip_stack::parameter_values;
use zulip_stack::parameters::{ParameterError, ParameterValues};
use zulip_stack::stack::{build, BuildError, Environment, StackProps};
use zulip_stack::template::{Kind, Template};
use zulip_stack::value::Value;

const USER_DATA: &str = include_str!("../../../zulip/launch_config_user_data.sh");
const CERTIFICATE: &str = "arn:aws:acm:us-east-1:123456789012:certificate/zulip";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("ZULIP_STACK_LOG"))
        .with_writer(std::io::stderr)
        .try_init();
}

fn props(mut parameters: ParameterValues) -> StackProps {
    init_tracing();
    parameters.insert("AlbCertificateArn", CERTIFICATE);
    StackProps::new("zulip", USER_DATA).with_parameters(parameters)
}

fn synth(parameters: ParameterValues) -> Template {
    build(&props(parameters)).expect("stack builds")
}

fn email_disabled() -> Template {
    synth(parameter_values! {
        "EnableIncomingEmail" => "false",
        "AdminEmail" => "",
    })
}

fn email_enabled() -> Template {
    synth(parameter_values! {
        "EnableIncomingEmail" => "true",
        "EmailIngressCidr" => "203.0.113.0/24",
        "DnsHostname" => "chat.example.com",
        "DnsRoute53HostedZoneName" => "example.com",
    })
}

fn target_groups(template: &Template) -> &Value {
    template
        .resource("Asg")
        .and_then(|asg| asg.get("TargetGroupARNs"))
        .expect("autoscaling group has target groups")
}

fn logical_ids(template: &Template) -> Vec<&str> {
    template.resources().map(|r| r.logical_id.as_str()).collect()
}

/// Nodes reachable from the network node, edges followed in both directions
fn connected_to_network(template: &Template) -> HashSet<String> {
    let mut neighbours: HashMap<String, Vec<String>> = HashMap::new();
    for resource in template.resources() {
        for dependency in template.dependencies_of(&resource.logical_id) {
            neighbours
                .entry(resource.logical_id.clone())
                .or_default()
                .push(dependency.clone());
            neighbours
                .entry(dependency)
                .or_default()
                .push(resource.logical_id.clone());
        }
    }

    let network = template
        .resources()
        .find(|r| r.kind == Kind::Network)
        .expect("network node");

    let mut seen = HashSet::from([network.logical_id.clone()]);
    let mut queue = VecDeque::from([network.logical_id.clone()]);
    while let Some(id) = queue.pop_front() {
        for next in neighbours.get(&id).into_iter().flatten() {
            if seen.insert(next.clone()) {
                queue.push_back(next.clone());
            }
        }
    }
    seen
}

#[test]
fn single_network_node_without_orphans() {
    for template in [email_disabled(), email_enabled()] {
        let kinds = template.kinds();
        assert_eq!(kinds.get(&Kind::Network), Some(&1));
        assert_eq!(kinds.get(&Kind::Compute), Some(&1));

        let connected = connected_to_network(&template);
        let orphans: Vec<_> = logical_ids(&template)
            .into_iter()
            .filter(|id| !connected.contains(*id))
            .collect();
        assert_eq!(orphans, Vec::<&str>::new());
    }
}

#[test]
fn email_disabled_has_no_email_subgraph() {
    let template = email_disabled();

    for absent in [
        "EmailNlb",
        "SmtpTargetGroup",
        "NlbHttpTargetGroup",
        "NlbHttpsTargetGroup",
        "NlbSmtpListener",
        "NlbHttpListener",
        "NlbHttpsListener",
        "AppSgSmtpIngress",
        "AlbSgHttpIngressFromNlb",
        "AlbSgHttpsIngressFromNlb",
        "MxDnsRecord",
    ] {
        assert!(template.resource(absent).is_none(), "{absent} must be absent");
    }

    let load_balancers: Vec<_> = template
        .resources()
        .filter(|r| r.kind == Kind::LoadBalancer)
        .map(|r| r.logical_id.as_str())
        .collect();
    assert_eq!(load_balancers, vec!["AppAlb"]);

    assert_eq!(
        target_groups(&template),
        &Value::from(vec![Value::reference("HttpsTargetGroup")])
    );
    assert!(template.output("SiteUrlOutput").is_some());

    // the toggle is still part of the template
    assert!(template.condition("EnableIncomingEmailCondition").is_some());
}

#[test]
fn email_enabled_adds_network_load_balancer() {
    let template = email_enabled();

    let nlb = template.resource("EmailNlb").expect("network load balancer");
    assert_eq!(nlb.depends_on, vec!["HttpListener", "HttpsListener"]);
    assert_eq!(nlb.condition.as_deref(), Some("EnableIncomingEmailCondition"));

    let smtp = template.resource("SmtpTargetGroup").expect("smtp target group");
    assert_eq!(smtp.get("Port"), Some(&Value::Integer(25)));

    let ingress = template.resource("AppSgSmtpIngress").expect("smtp ingress");
    assert_eq!(ingress.get("CidrIp"), Some(&Value::reference("EmailIngressCidr")));
    assert_eq!(ingress.get("FromPort"), Some(&Value::Integer(25)));

    let mx = template.resource("MxDnsRecord").expect("mx record");
    assert_eq!(mx.condition.as_deref(), Some("DnsWithIncomingEmailCondition"));
    assert_eq!(mx.depends_on, vec!["SiteDnsRecord"]);
}

#[test]
fn mail_target_group_comes_first() {
    let template = email_enabled();

    assert_eq!(
        serde_json::to_value(target_groups(&template)).unwrap(),
        serde_json::json!({
            "Fn::If": [
                "EnableIncomingEmailCondition",
                [{"Ref": "SmtpTargetGroup"}, {"Ref": "HttpsTargetGroup"}],
                [{"Ref": "HttpsTargetGroup"}]
            ]
        })
    );
}

#[test]
fn site_record_points_at_active_load_balancer() {
    let template = email_enabled();
    let json = serde_json::to_value(&template).unwrap();

    assert_eq!(
        json["Resources"]["SiteDnsRecord"]["Properties"]["AliasTarget"]["DNSName"],
        serde_json::json!({
            "Fn::If": [
                "EnableIncomingEmailCondition",
                {"Fn::GetAtt": ["EmailNlb", "DNSName"]},
                {"Fn::GetAtt": ["AppAlb", "DNSName"]}
            ]
        })
    );
    assert_eq!(
        json["Resources"]["SiteDnsRecord"]["Properties"]["HostedZoneName"],
        serde_json::json!({"Fn::Sub": "${DnsRoute53HostedZoneName}."})
    );
}

#[test]
fn cidr_is_passed_through() {
    for cidr in ["0.0.0.0/0", "10.0.0.0/24"] {
        let props = props(parameter_values! { "AlbIngressCidr" => cidr });
        let template = build(&props).expect("stack builds");

        for rule in ["AlbSgHttpIngress", "AlbSgHttpsIngress"] {
            let rule = template.resource(rule).unwrap();
            assert_eq!(rule.get("CidrIp"), Some(&Value::reference("AlbIngressCidr")));
        }

        let parameter = template.parameter("AlbIngressCidr").unwrap();
        assert_eq!(
            parameter
                .resolve(props.parameters.get("AlbIngressCidr"))
                .unwrap(),
            cidr
        );
    }
}

#[test]
fn malformed_cidr_is_rejected_before_emission() {
    let err = build(&props(parameter_values! { "EmailIngressCidr" => "203.0.113.0" }))
        .expect_err("must fail");

    assert!(matches!(
        err,
        BuildError::Parameter(ParameterError::PatternMismatch { ref id, .. }) if id == "EmailIngressCidr"
    ));
}

#[test]
fn certificate_is_required() {
    init_tracing();
    let props = StackProps::new("zulip", USER_DATA);
    let err = build(&props).expect_err("must fail");

    assert!(matches!(
        err,
        BuildError::Parameter(ParameterError::Missing(ref id)) if id == "AlbCertificateArn"
    ));
}

#[test]
fn unknown_parameter_is_rejected() {
    let err = build(&props(parameter_values! { "EnableIncomingMail" => "true" }))
        .expect_err("must fail");

    assert!(matches!(
        err,
        BuildError::Parameter(ParameterError::Unknown(ref id)) if id == "EnableIncomingMail"
    ));
}

#[test]
fn hosted_zone_requires_hostname() {
    let err = build(&props(
        parameter_values! { "DnsRoute53HostedZoneName" => "example.com" },
    ))
    .expect_err("must fail");

    assert!(matches!(
        err,
        BuildError::Parameter(ParameterError::Requires { ref required, .. }) if required == "DnsHostname"
    ));
}

#[test]
fn image_is_selected_for_region() {
    let ami_map = AmiRegionMap::new("zulip-8")
        .with_image("us-east-1", "ami-0east")
        .with_image("eu-central-1", "ami-0central");

    for (region, image) in [("us-east-1", "ami-0east"), ("eu-central-1", "ami-0central")] {
        let props = props(ParameterValues::default())
            .with_ami_map(ami_map.clone())
            .with_environment(Environment::new(None, region.to_string()));
        let template = build(&props).expect("stack builds");

        let launch_config = template.resource("LaunchConfig").unwrap();
        assert_eq!(launch_config.get("ImageId"), Some(&Value::from(image)));
    }
}

#[test]
fn missing_region_fails_the_build() {
    let props = props(ParameterValues::default())
        .with_ami_map(AmiRegionMap::new("zulip-8").with_image("us-east-1", "ami-0east"))
        .with_environment(Environment::new(None, "ap-south-1".to_string()));

    let err = build(&props).expect_err("must fail");
    assert!(matches!(
        err,
        BuildError::Mapping(MappingError::MissingRegion { ref region, .. }) if region == "ap-south-1"
    ));
}

#[test]
fn image_is_looked_up_at_deploy_time_without_region() {
    let template = email_disabled();

    assert_eq!(
        serde_json::to_value(template.resource("LaunchConfig").unwrap().get("ImageId")).unwrap(),
        serde_json::json!({"Fn::FindInMap": ["AWSAMIRegionMap", {"Ref": "AWS::Region"}, "AMI"]})
    );
    assert!(template.mapping("AWSAMIRegionMap").is_some());
}

#[test]
fn compute_group_waits_for_services() {
    let template = email_disabled();
    let asg = template.resource("Asg").unwrap();

    assert_eq!(
        asg.depends_on,
        vec!["DbPrimaryInstance", "RabbitMqBroker", "SesSmtpPassword"]
    );
    assert!(!asg.is_deferred("TargetGroupARNs"));
}

#[test]
fn one_ingress_rule_per_service() {
    let template = email_disabled();

    for (rule, group, port) in [
        ("DbSgIngressFromApp", "DbSg", 5432),
        ("RabbitMqSgIngressFromApp", "RabbitMqSg", 5671),
        ("RedisSgIngressFromApp", "RedisSg", 6379),
    ] {
        let rule = template.resource(rule).unwrap();
        assert_eq!(rule.get("GroupId"), Some(&Value::get_att(group, "GroupId")));
        assert_eq!(
            rule.get("SourceSecurityGroupId"),
            Some(&Value::get_att("AppSg", "GroupId"))
        );
        assert_eq!(rule.get("FromPort"), Some(&Value::Integer(port)));
    }
}

#[test]
fn building_twice_is_identical() {
    let parameters = parameter_values! {
        "EnableIncomingEmail" => "true",
        "EnableSubdomains" => "true",
        "DnsHostname" => "chat.example.com",
        "DnsRoute53HostedZoneName" => "example.com",
    };

    let first = serde_json::to_string(&synth(parameters.clone())).unwrap();
    let second = serde_json::to_string(&synth(parameters)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn console_groups_network_last() {
    let template = email_disabled();
    let interface = template.interface().expect("interface metadata");

    let labels: Vec<_> = interface.groups.iter().map(|g| g.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "Zulip Configuration",
            "Incoming Email",
            "DNS Configuration",
            "Database",
            "Redis",
            "RabbitMQ",
            "Auto Scaling Group",
            "Application Load Balancer",
            "VPC",
        ]
    );

    for parameter in template.parameters() {
        assert!(interface.labels.contains_key(&parameter.id), "{}", parameter.id);
    }
}

#[test]
fn version_label_is_part_of_description_and_user_data() {
    let props = props(ParameterValues::default()).with_version("1.4.0");
    let template = build(&props).expect("stack builds");

    assert!(template.description().unwrap().contains("1.4.0"));

    let Some(Value::Base64(user_data)) = template.resource("LaunchConfig").unwrap().get("UserData")
    else {
        panic!("user data must be base64 encoded");
    };
    let Value::Sub(script, variables) = user_data.as_ref() else {
        panic!("user data must be substituted");
    };
    assert_eq!(script, USER_DATA);
    assert_eq!(variables.get("TemplateVersion"), Some(&Value::from("1.4.0")));
}

#[test]
fn network_load_balancer_reaches_application_load_balancer() {
    let template = synth(parameter_values! {
        "EnableIncomingEmail" => "true",
        "AlbIngressCidr" => "203.0.113.0/24",
    });

    for (rule, port) in [("AlbSgHttpIngressFromNlb", 80), ("AlbSgHttpsIngressFromNlb", 443)] {
        let rule = template.resource(rule).expect("ingress from the network load balancer");
        assert_eq!(rule.get("GroupId"), Some(&Value::get_att("AlbSg", "GroupId")));
        assert_eq!(rule.get("CidrIp"), Some(&Value::get_att("Vpc", "CidrBlock")));
        assert_eq!(rule.get("FromPort"), Some(&Value::Integer(port)));
        assert_eq!(rule.condition.as_deref(), Some("EnableIncomingEmailCondition"));
    }

    // public rules keep the restricted block
    let public = template.resource("AlbSgHttpsIngress").unwrap();
    assert_eq!(public.get("CidrIp"), Some(&Value::reference("AlbIngressCidr")));
}

#[test]
fn database_snapshot_is_chosen_at_deploy_time() {
    let fresh = email_disabled();
    let restored = synth(parameter_values! {
        "DbSnapshotIdentifier" => "arn:aws:rds:us-east-1:123456789012:cluster-snapshot:zulip",
    });

    // the same cluster serves both choices
    assert_eq!(fresh.resource("DbCluster"), restored.resource("DbCluster"));
    assert!(!fresh.condition("DbSnapshotIdentifierExists").unwrap().holds);
    assert!(restored.condition("DbSnapshotIdentifierExists").unwrap().holds);

    let cluster = serde_json::to_value(fresh.resource("DbCluster").unwrap().get("SnapshotIdentifier"))
        .unwrap();
    assert_eq!(
        cluster,
        serde_json::json!({
            "Fn::If": [
                "DbSnapshotIdentifierExists",
                {"Ref": "DbSnapshotIdentifier"},
                {"Ref": "AWS::NoValue"}
            ]
        })
    );

    let username =
        serde_json::to_value(fresh.resource("DbCluster").unwrap().get("MasterUsername")).unwrap();
    assert_eq!(
        username,
        serde_json::json!({
            "Fn::If": [
                "DbSnapshotIdentifierExists",
                {"Ref": "AWS::NoValue"},
                {"Fn::Sub": "{{resolve:secretsmanager:${DbSecret}:SecretString:username}}"}
            ]
        })
    );
}

#[test]
fn key_pair_is_chosen_at_deploy_time() {
    let without = email_disabled();
    let with = synth(parameter_values! { "AsgKeyName" => "zulip-admin" });

    assert_eq!(without.resource("LaunchConfig"), with.resource("LaunchConfig"));
    assert!(!without.condition("AsgKeyNameExists").unwrap().holds);
    assert!(with.condition("AsgKeyNameExists").unwrap().holds);
    assert_eq!(
        with.resource("LaunchConfig").unwrap().get("KeyName"),
        Some(&Value::if_(
            "AsgKeyNameExists",
            Value::reference("AsgKeyName"),
            Value::no_value()
        ))
    );
}

fn allowed_values<'t>(template: &'t Template, id: &str) -> Vec<&'t str> {
    let parameter = template.parameter(id).expect("declared parameter");
    parameter.allowed_values.iter().map(String::as_str).collect()
}

#[test]
fn gating_parameters_only_offer_the_built_value() {
    let disabled = email_disabled();
    assert_eq!(allowed_values(&disabled, "EnableIncomingEmail"), vec!["false"]);
    assert_eq!(
        disabled.parameter("EnableIncomingEmail").unwrap().default.as_deref(),
        Some("false")
    );
    assert_eq!(allowed_values(&disabled, "EmailIngressCidr"), vec!["0.0.0.0/0"]);
    assert_eq!(allowed_values(&disabled, "DnsRoute53HostedZoneName"), vec![""]);
    // without a zone subdomains only configure the application
    assert_eq!(allowed_values(&disabled, "EnableSubdomains"), vec!["true", "false"]);

    let enabled = email_enabled();
    assert_eq!(allowed_values(&enabled, "EnableIncomingEmail"), vec!["true"]);
    assert_eq!(allowed_values(&enabled, "EmailIngressCidr"), Vec::<&str>::new());
    assert_eq!(
        allowed_values(&enabled, "DnsRoute53HostedZoneName"),
        vec!["example.com"]
    );
    assert_eq!(allowed_values(&enabled, "EnableSubdomains"), vec!["false"]);
}

#[test]
fn site_url_follows_hostname_at_deploy_time() {
    let template = email_disabled();

    assert_eq!(
        serde_json::to_value(&template.output("SiteUrlOutput").unwrap().value).unwrap(),
        serde_json::json!({
            "Fn::If": [
                "DnsHostnameExists",
                {"Fn::Sub": "https://${DnsHostname}"},
                {"Fn::Join": ["", ["https://", {"Fn::GetAtt": ["AppAlb", "DNSName"]}]]}
            ]
        })
    );
}
