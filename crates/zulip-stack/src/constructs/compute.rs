//! The autoscaling group running the application
//!
//! Instances boot from the region's image and run the bootstrap script with the stack's
//! identifiers substituted in. The group is the only node that waits on [Ready] tokens.
use super::network::Vpc;
use super::security_group;
use crate::metadata::ParameterGroup;
use crate::parameters::{Parameter, ParameterError};
use crate::readiness::{Broker, DatabasePrimary, Ready, SmtpCredential};
use crate::stack::Stack;
use crate::template::{Kind, NodeId, Resource};
use crate::value::{Object, Value};

pub const TWO_YEARS_IN_DAYS: u32 = 731;

/// Deferred property holding the target groups of the group
pub const TARGET_GROUP_ARNS: &str = "TargetGroupARNs";

/// A key pair for SSH access was supplied
pub const KEY_NAME_CONDITION: &str = "AsgKeyNameExists";

/// Services that have to be up before the first instance launches
#[derive(Debug, Clone)]
pub struct LaunchAfter {
    pub database: Ready<DatabasePrimary>,
    pub broker: Ready<Broker>,
    pub smtp_credential: Ready<SmtpCredential>,
}

impl LaunchAfter {
    fn logical_ids(&self) -> [&str; 3] {
        [
            self.database.logical_id(),
            self.broker.logical_id(),
            self.smtp_credential.logical_id(),
        ]
    }
}

pub struct AsgProps<'a> {
    pub vpc: &'a Vpc,
    /// machine image id, literal or looked up at deploy time
    pub image: Value,
    /// bootstrap script, passed through `Fn::Sub`
    pub user_data: &'a str,
    pub user_data_variables: Object,
    /// buckets the instances read and write
    pub buckets: Vec<&'a NodeId>,
    /// secrets the instances read
    pub secrets: Vec<&'a NodeId>,
    pub launch_after: LaunchAfter,
}

#[derive(Debug, Clone)]
pub struct Asg {
    pub app_log_group: NodeId,
    pub system_log_group: NodeId,
    pub role: NodeId,
    pub security_group: NodeId,
    pub launch_config: NodeId,
    pub group: NodeId,
}

fn log_group(logical_id: &str) -> Resource {
    Resource::new(logical_id, Kind::Logging, "AWS::Logs::LogGroup")
        .property("RetentionInDays", TWO_YEARS_IN_DAYS)
        .retain()
}

fn statement(actions: &[&str], resources: Vec<Value>) -> Value {
    crate::object! {
        "Action" => actions.iter().map(|a| Value::from(*a)).collect::<Vec<_>>(),
        "Effect" => "Allow",
        "Resource" => resources,
    }
}

impl Asg {
    pub fn new(stack: &mut Stack, props: AsgProps) -> Result<Self, ParameterError> {
        let instance_type = stack.parameter(
            Parameter::string(
                "AsgInstanceType",
                "Required: The EC2 instance type for the application Auto Scaling Group.",
            )
            .with_default("t3.xlarge")
            .with_allowed_values([
                "t3.large",
                "t3.xlarge",
                "t3.2xlarge",
                "m5.large",
                "m5.xlarge",
                "m5.2xlarge",
                "c5.xlarge",
                "c5.2xlarge",
            ]),
            "Instance Type",
        )?;
        let key_name = stack.parameter(
            Parameter::string(
                "AsgKeyName",
                "Optional: The EC2 key pair name for SSH access to the instances.",
            )
            .with_default(""),
            "EC2 Key Name",
        )?;
        let min_size = stack.parameter(
            Parameter::number("AsgMinSize", "Required: Minimum size of the Auto Scaling Group.")
                .with_default("1"),
            "Minimum Size",
        )?;
        let max_size = stack.parameter(
            Parameter::number("AsgMaxSize", "Required: Maximum size of the Auto Scaling Group.")
                .with_default("1"),
            "Maximum Size",
        )?;
        let desired = stack.parameter(
            Parameter::number(
                "AsgDesiredCapacity",
                "Required: Desired capacity of the Auto Scaling Group.",
            )
            .with_default("1"),
            "Desired Capacity",
        )?;
        stack.parameter_group(ParameterGroup::application(
            "Auto Scaling Group",
            [
                "AsgInstanceType",
                "AsgKeyName",
                "AsgMinSize",
                "AsgMaxSize",
                "AsgDesiredCapacity",
            ],
        ));

        let app_log_group = stack.insert(log_group("AppLogGroup"));
        let system_log_group = stack.insert(log_group("SystemLogGroup"));

        let mut statements = vec![
            statement(
                &["logs:CreateLogStream", "logs:DescribeLogStreams", "logs:PutLogEvents"],
                vec![app_log_group.get_att("Arn"), system_log_group.get_att("Arn")],
            ),
            statement(&["ec2:AssociateAddress", "ec2:DescribeAddresses"], vec!["*".into()]),
        ];
        if !props.buckets.is_empty() {
            statements.push(statement(
                &["s3:DeleteObject", "s3:GetObject", "s3:ListBucket", "s3:PutObject"],
                props
                    .buckets
                    .iter()
                    .flat_map(|bucket| {
                        [
                            bucket.get_att("Arn"),
                            Value::sub(format!("${{{bucket}.Arn}}/*")),
                        ]
                    })
                    .collect(),
            ));
        }
        if !props.secrets.is_empty() {
            statements.push(statement(
                &["secretsmanager:GetSecretValue"],
                props.secrets.iter().map(|secret| secret.reference()).collect(),
            ));
        }

        let role = stack.insert(
            Resource::new("InstanceRole", Kind::Iam, "AWS::IAM::Role")
                .property(
                    "AssumeRolePolicyDocument",
                    crate::object! {
                        "Version" => "2012-10-17",
                        "Statement" => vec![crate::object! {
                            "Action" => "sts:AssumeRole",
                            "Effect" => "Allow",
                            "Principal" => crate::object! { "Service" => "ec2.amazonaws.com" },
                        }],
                    },
                )
                .property(
                    "ManagedPolicyArns",
                    vec![
                        Value::sub("arn:${AWS::Partition}:iam::aws:policy/AmazonSSMManagedInstanceCore"),
                        Value::sub("arn:${AWS::Partition}:iam::aws:policy/CloudWatchAgentServerPolicy"),
                    ],
                )
                .property(
                    "Policies",
                    vec![crate::object! {
                        "PolicyName" => "InstancePolicy",
                        "PolicyDocument" => crate::object! {
                            "Version" => "2012-10-17",
                            "Statement" => statements,
                        },
                    }],
                ),
        );
        let profile = stack.insert(
            Resource::new("InstanceProfile", Kind::Iam, "AWS::IAM::InstanceProfile")
                .property("Roles", vec![role.reference()]),
        );

        let sg = security_group(stack, "AppSg", &props.vpc.vpc);

        let mut variables = props.user_data_variables;
        variables.insert("AppLogGroup".into(), app_log_group.reference());
        variables.insert("SystemLogGroup".into(), system_log_group.reference());

        stack.condition(
            KEY_NAME_CONDITION,
            Value::not(Value::equals(key_name.reference(), "")),
            !key_name.is_empty(),
        );

        let launch_config = stack.insert(
            Resource::new(
                "LaunchConfig",
                Kind::LaunchConfiguration,
                "AWS::AutoScaling::LaunchConfiguration",
            )
            .property("IamInstanceProfile", profile.reference())
            .property("ImageId", props.image)
            .property("InstanceType", instance_type.reference())
            .property(
                "KeyName",
                Value::if_(KEY_NAME_CONDITION, key_name.reference(), Value::no_value()),
            )
            .property("SecurityGroups", vec![sg.get_att("GroupId")])
            .property(
                "UserData",
                Value::base64(Value::sub_with(props.user_data, variables)),
            ),
        );

        let mut group = Resource::new("Asg", Kind::Compute, "AWS::AutoScaling::AutoScalingGroup")
            .property("DesiredCapacity", desired.reference())
            .property("LaunchConfigurationName", launch_config.reference())
            .property("MaxSize", max_size.reference())
            .property("MinSize", min_size.reference())
            .defer(TARGET_GROUP_ARNS)
            .property("VPCZoneIdentifier", props.vpc.public_subnet_ids())
            .property(
                "Tags",
                vec![crate::object! {
                    "Key" => "Name",
                    "PropagateAtLaunch" => "true",
                    "Value" => Value::sub("${AWS::StackName}/Asg"),
                }],
            );
        for logical_id in props.launch_after.logical_ids() {
            group = group.depends_on(logical_id);
        }
        let group = stack.insert(group);

        Ok(Self {
            app_log_group,
            system_log_group,
            role,
            security_group: sg,
            launch_config,
            group,
        })
    }
}
