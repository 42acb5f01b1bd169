//! Outbound email through SES
//!
//! SES authenticates SMTP clients with a password derived from an IAM access key. The derivation
//! runs in a small function invoked as a custom resource. The compute group must not start before
//! its result exists, see [Ses::password_ready].
use super::dns::{Dns, ZONE_CONDITION};
use crate::readiness::{Ready, SmtpCredential};
use crate::stack::Stack;
use crate::template::{Kind, NodeId, Resource};
use crate::value::Value;

const PASSWORD_FUNCTION: &str = include_str!("../../assets/ses_smtp_password.py");

#[derive(Debug, Clone)]
pub struct Ses {
    pub identity: Option<NodeId>,
    pub user: NodeId,
    pub access_key: NodeId,
    pub password: NodeId,
    /// `{"username": .., "password": ..}` for the SMTP client
    pub credentials: NodeId,
    password_ready: Ready<SmtpCredential>,
}

impl Ses {
    pub fn new(stack: &mut Stack, dns: &Dns) -> Self {
        let identity = stack.holds(ZONE_CONDITION).then(|| {
            stack.insert(
                Resource::new("SesDomainIdentity", Kind::Email, "AWS::SES::EmailIdentity")
                    .property("EmailIdentity", dns.hostname.reference())
                    .condition(ZONE_CONDITION),
            )
        });

        let send_resource = match &identity {
            Some(identity) => Value::if_(
                ZONE_CONDITION,
                Value::sub(format!(
                    "arn:${{AWS::Partition}}:ses:${{AWS::Region}}:${{AWS::AccountId}}:identity/${{{identity}}}"
                )),
                "*".into(),
            ),
            None => "*".into(),
        };

        let user = stack.insert(
            Resource::new("SesSmtpUser", Kind::Iam, "AWS::IAM::User").property(
                "Policies",
                vec![crate::object! {
                    "PolicyName" => "SendRawEmail",
                    "PolicyDocument" => crate::object! {
                        "Version" => "2012-10-17",
                        "Statement" => vec![crate::object! {
                            "Action" => "ses:SendRawEmail",
                            "Effect" => "Allow",
                            "Resource" => send_resource,
                        }],
                    },
                }],
            ),
        );

        let access_key = stack.insert(
            Resource::new("SesSmtpAccessKey", Kind::Iam, "AWS::IAM::AccessKey")
                .property("UserName", user.reference()),
        );

        let role = stack.insert(
            Resource::new("SesSmtpPasswordFunctionRole", Kind::Iam, "AWS::IAM::Role")
                .property(
                    "AssumeRolePolicyDocument",
                    crate::object! {
                        "Version" => "2012-10-17",
                        "Statement" => vec![crate::object! {
                            "Action" => "sts:AssumeRole",
                            "Effect" => "Allow",
                            "Principal" => crate::object! {
                                "Service" => "lambda.amazonaws.com",
                            },
                        }],
                    },
                )
                .property(
                    "ManagedPolicyArns",
                    vec![Value::sub(
                        "arn:${AWS::Partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole",
                    )],
                ),
        );

        let function = stack.insert(
            Resource::new(
                "SesSmtpPasswordFunction",
                Kind::Function,
                "AWS::Lambda::Function",
            )
            .property("Code", crate::object! { "ZipFile" => PASSWORD_FUNCTION })
            .property("Handler", "index.lambda_handler")
            .property("Role", role.get_att("Arn"))
            .property("Runtime", "python3.12")
            .property("Timeout", 10u32),
        );

        let password = stack.insert(
            Resource::new("SesSmtpPassword", Kind::Function, "Custom::SesSmtpPassword")
                .property("ServiceToken", function.get_att("Arn"))
                .property("SecretAccessKey", access_key.get_att("SecretAccessKey"))
                .property("Region", Value::reference("AWS::Region")),
        );

        let credentials = stack.insert(
            Resource::new(
                "SesSmtpCredentialsSecret",
                Kind::Secret,
                "AWS::SecretsManager::Secret",
            )
            .property("Description", Value::sub("${AWS::StackName}/ses-smtp"))
            .property(
                "SecretString",
                Value::sub(format!(
                    r#"{{"username":"${{{access_key}}}","password":"${{{password}.Password}}"}}"#
                )),
            ),
        );

        let password_ready = Ready::new(password.as_str());

        Self {
            identity,
            user,
            access_key,
            password,
            credentials,
            password_ready,
        }
    }

    /// The SMTP password has been generated
    pub fn password_ready(&self) -> Ready<SmtpCredential> {
        self.password_ready.clone()
    }
}
