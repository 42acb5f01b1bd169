//! Resource graph builder
//!
//! [build] declares the whole stack in a single pass. The order of the steps matters: every node
//! only refers to nodes declared before it. The one exception, the target groups of the compute
//! group, is declared as a deferred property and resolved once the load balancers exist.
//!
//! Optional subgraphs are gated while building. A subgraph whose condition does not hold for the
//! supplied parameter values is never declared, its condition is still emitted so the guarded
//! nodes carry it. The parameters that gated a subgraph are pinned to the value they were built
//! with. Everything else stays a deploy-time choice.
use crate::constructs::cache::{Redis, REDIS_PORT};
use crate::constructs::compute::{Asg, AsgProps, LaunchAfter, TARGET_GROUP_ARNS};
use crate::constructs::database::{AuroraPostgresql, POSTGRES_PORT};
use crate::constructs::dns::{AliasTarget, Dns, HOSTNAME_CONDITION};
use crate::constructs::email::Ses;
use crate::constructs::ingress_from_group;
use crate::constructs::load_balancer::{Alb, AlbProps, Nlb, NlbProps};
use crate::constructs::network::Vpc;
use crate::constructs::queue::{RabbitMq, AMQPS_PORT};
use crate::constructs::secrets::Secrets;
use crate::constructs::storage::Buckets;
use crate::mapping::{AmiRegionMap, MappingError, MAPPING_NAME};
use crate::metadata::{self, ParameterGroup, ParameterLabels};
use crate::parameters::{
    Parameter, ParameterError, ParameterRef, ParameterValues, CIDR_PATTERN,
};
use crate::template::{NodeId, Output, Resource, Template, TemplateErrors};
use crate::value::{Object, Value};
use crate::version::VERSION_SENTINEL;

/// `EnableIncomingEmail` is `"true"`
pub const INCOMING_EMAIL_CONDITION: &str = "EnableIncomingEmailCondition";
/// `EnableSubdomains` is `"true"`
pub const SUBDOMAINS_CONDITION: &str = "EnableSubdomainsCondition";

/// Account and region the stack is built for
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct Environment {
    pub account: Option<String>,
    pub region: String,
}

/// Everything [build] needs
#[derive(Debug, Clone)]
pub struct StackProps {
    pub stack_name: String,
    /// without an environment the image is looked up at deploy time
    pub env: Option<Environment>,
    pub parameters: ParameterValues,
    /// contents of the instance bootstrap script
    pub user_data: String,
    pub ami_map: AmiRegionMap,
    pub version: String,
}

impl StackProps {
    pub fn new(stack_name: impl Into<String>, user_data: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            env: None,
            parameters: Default::default(),
            user_data: user_data.into(),
            ami_map: AmiRegionMap::generated(),
            version: VERSION_SENTINEL.to_string(),
        }
    }

    pub fn with_environment(mut self, env: Environment) -> Self {
        self.env = Some(env);
        self
    }

    pub fn with_parameters(mut self, parameters: ParameterValues) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_ami_map(mut self, ami_map: AmiRegionMap) -> Self {
        self.ami_map = ami_map;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("Invalid parameters")]
    Parameter(#[from] ParameterError),
    #[error("Unable to select a machine image")]
    Mapping(#[from] MappingError),
    #[error("Inconsistent resource graph")]
    Template(#[from] TemplateErrors),
}

/// Scope constructs declare their parameters, metadata and nodes into
pub struct Stack<'p> {
    props: &'p StackProps,
    template: Template,
    groups: Vec<ParameterGroup>,
    labels: ParameterLabels,
}

impl<'p> Stack<'p> {
    pub fn new(props: &'p StackProps) -> Self {
        Self {
            props,
            template: Template::default(),
            groups: vec![],
            labels: Default::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.props.stack_name
    }

    pub fn region(&self) -> Option<&str> {
        self.props.env.as_ref().map(|env| env.region.as_str())
    }

    /// Declare a parameter and resolve its effective value
    pub fn parameter(
        &mut self,
        parameter: Parameter,
        label: &str,
    ) -> Result<ParameterRef, ParameterError> {
        let value = parameter.resolve(self.props.parameters.get(&parameter.id))?;
        let id = parameter.id.clone();

        self.labels.insert(id.clone(), label.to_string());
        self.template.add_parameter(parameter);

        Ok(ParameterRef::new(id, value))
    }

    /// The value of `parameter` decided what was built, offer nothing else at deploy time
    pub fn pin(&mut self, parameter: &ParameterRef) {
        tracing::debug!(id = parameter.id(), value = parameter.value(), "parameter pinned");
        self.template.pin_parameter(parameter.id(), parameter.value());
    }

    pub fn parameter_group(&mut self, group: ParameterGroup) {
        self.groups.push(group);
    }

    pub fn condition(&mut self, name: &str, expression: Value, holds: bool) {
        self.template.add_condition(name, expression, holds);
    }

    pub fn holds(&self, condition: &str) -> bool {
        self.template.holds(condition)
    }

    pub fn insert(&mut self, resource: Resource) -> NodeId {
        self.template.insert(resource)
    }

    pub fn resolve_deferred(&mut self, node: &NodeId, property: &str, value: Value) {
        self.template
            .resolve_deferred(node.as_str(), property, value);
    }

    pub fn output(&mut self, id: &str, output: Output) {
        self.template.add_output(id, output);
    }

    /// Emit the image table and select the image for the environment's region
    ///
    /// Without a region the selection is left to the provisioning engine.
    pub fn image(&mut self) -> Result<Value, MappingError> {
        let ami_map = &self.props.ami_map;
        self.template.add_mapping(MAPPING_NAME, ami_map.to_mapping());

        match self.region() {
            Some(region) => {
                let image = ami_map.image_for(region)?;
                tracing::debug!(region, image, "machine image selected");
                Ok(image.into())
            }
            None => Ok(Value::find_in_map(
                MAPPING_NAME,
                Value::reference("AWS::Region"),
                "AMI".into(),
            )),
        }
    }

    fn finish(mut self, description: String) -> Result<Template, BuildError> {
        for id in self.props.parameters.ids() {
            if self.template.parameter(id).is_none() {
                return Err(ParameterError::Unknown(id.to_string()).into());
            }
        }

        let interface = metadata::aggregate(
            &self.groups,
            &self.labels,
            self.template.parameters().map(|p| p.id.as_str()),
        );
        self.template.set_interface(interface);
        self.template.set_description(description);

        Ok(self.template.finish()?)
    }
}

/// Incoming email, decided once from `EnableIncomingEmail`
#[derive(Debug, Clone)]
pub enum IncomingEmail {
    Disabled,
    Enabled {
        /// where SMTP connections may come from
        ingress_cidr: ParameterRef,
    },
}

impl IncomingEmail {
    pub fn is_enabled(&self) -> bool {
        matches!(self, IncomingEmail::Enabled { .. })
    }
}

/// Parameters of the application itself
struct Settings {
    admin_email: ParameterRef,
    subdomains: ParameterRef,
    giphy_api_key: ParameterRef,
    sentry_dsn: ParameterRef,
    incoming_email: IncomingEmail,
}

impl Settings {
    fn new(stack: &mut Stack) -> Result<Self, ParameterError> {
        let admin_email = stack.parameter(
            Parameter::string(
                "AdminEmail",
                "Optional: The email address of the initial administrator. Leave empty to create the organization from the web interface.",
            )
            .with_default(""),
            "Administrator Email",
        )?;
        let subdomains = stack.parameter(
            Parameter::toggle(
                "EnableSubdomains",
                "Optional: Host organizations on subdomains of the hostname. Adds a wildcard DNS record when a hosted zone is given.",
            ),
            "Enable Subdomains",
        )?;
        let giphy_api_key = stack.parameter(
            Parameter::string(
                "GiphyApiKey",
                "Optional: API key for the GIPHY integration.",
            )
            .with_default("")
            .with_no_echo(),
            "GIPHY API Key",
        )?;
        let sentry_dsn = stack.parameter(
            Parameter::string(
                "SentryDsn",
                "Optional: Sentry DSN to report server errors to.",
            )
            .with_default(""),
            "Sentry DSN",
        )?;
        let enable_incoming_email = stack.parameter(
            Parameter::toggle(
                "EnableIncomingEmail",
                "Optional: Receive email into streams. Adds a network load balancer in front of the application load balancer.",
            ),
            "Enable Incoming Email",
        )?;
        let email_ingress_cidr = stack.parameter(
            Parameter::string(
                "EmailIngressCidr",
                "Optional: IPv4 CIDR block allowed to deliver email to the instances (default is 0.0.0.0/0 which is open to internet).",
            )
            .with_default("0.0.0.0/0")
            .with_allowed_pattern(CIDR_PATTERN),
            "Email Ingress CIDR",
        )?;

        stack.parameter_group(ParameterGroup::application(
            "Zulip Configuration",
            ["AdminEmail", "EnableSubdomains", "GiphyApiKey", "SentryDsn"],
        ));
        stack.parameter_group(ParameterGroup::application(
            "Incoming Email",
            ["EnableIncomingEmail", "EmailIngressCidr"],
        ));

        stack.condition(
            INCOMING_EMAIL_CONDITION,
            Value::equals(enable_incoming_email.reference(), "true"),
            enable_incoming_email.is_enabled(),
        );
        stack.condition(
            SUBDOMAINS_CONDITION,
            Value::equals(subdomains.reference(), "true"),
            subdomains.is_enabled(),
        );

        stack.pin(&enable_incoming_email);
        let incoming_email = if enable_incoming_email.is_enabled() {
            IncomingEmail::Enabled {
                ingress_cidr: email_ingress_cidr,
            }
        } else {
            stack.pin(&email_ingress_cidr);
            IncomingEmail::Disabled
        };

        Ok(Self {
            admin_email,
            subdomains,
            giphy_api_key,
            sentry_dsn,
            incoming_email,
        })
    }
}

/// Build the complete stack
#[tracing::instrument(skip_all, fields(stack_name = %props.stack_name))]
pub fn build(props: &StackProps) -> Result<Template, BuildError> {
    let mut stack = Stack::new(props);
    let settings = Settings::new(&mut stack)?;
    let image = stack.image()?;

    // 1. network
    let vpc = Vpc::new(&mut stack)?;

    // 2. stateless supporting nodes
    let dns = Dns::new(
        &mut stack,
        settings.incoming_email.is_enabled(),
        &settings.subdomains,
    )?;
    let buckets = Buckets::new(&mut stack);
    let ses = Ses::new(&mut stack, &dns);
    let secrets = Secrets::new(&mut stack);

    // 3. managed services
    let database = AuroraPostgresql::new(&mut stack, &vpc, &secrets.database)?;
    let redis = Redis::new(&mut stack, &vpc)?;
    let rabbitmq = RabbitMq::new(&mut stack, &vpc, &secrets.broker)?;

    // 4. compute
    let mut variables = Object::new();
    for parameter in [
        &dns.hostname,
        &settings.admin_email,
        &settings.subdomains,
        &settings.giphy_api_key,
        &settings.sentry_dsn,
    ] {
        variables.insert(parameter.id().to_string(), parameter.reference());
    }
    variables.insert("AssetsBucket".into(), buckets.assets.reference());
    variables.insert("InstanceSecretArn".into(), secrets.instance.reference());
    variables.insert("DbSecretArn".into(), secrets.database.reference());
    variables.insert("RabbitMqSecretArn".into(), secrets.broker.reference());
    variables.insert("SmtpSecretArn".into(), ses.credentials.reference());
    variables.insert(
        "DbEndpoint".into(),
        database.cluster.get_att("Endpoint.Address"),
    );
    variables.insert("RedisEndpoint".into(), redis.endpoint());
    variables.insert("RabbitMqEndpoint".into(), rabbitmq.endpoint());
    variables.insert("TemplateVersion".into(), props.version.as_str().into());

    let asg = Asg::new(
        &mut stack,
        AsgProps {
            vpc: &vpc,
            image,
            user_data: &props.user_data,
            user_data_variables: variables,
            buckets: vec![&buckets.assets],
            secrets: vec![
                &secrets.instance,
                &secrets.database,
                &secrets.broker,
                &ses.credentials,
            ],
            launch_after: LaunchAfter {
                database: database.primary_ready(),
                broker: rabbitmq.broker_ready(),
                smtp_credential: ses.password_ready(),
            },
        },
    )?;

    // 5. one ingress rule per service
    for (logical_id, service, port, description) in [
        (
            "DbSgIngressFromApp",
            &database.security_group,
            POSTGRES_PORT,
            "Allow PostgreSQL from the application instances",
        ),
        (
            "RabbitMqSgIngressFromApp",
            &rabbitmq.security_group,
            AMQPS_PORT,
            "Allow AMQPS from the application instances",
        ),
        (
            "RedisSgIngressFromApp",
            &redis.security_group,
            REDIS_PORT,
            "Allow Redis from the application instances",
        ),
    ] {
        stack.insert(ingress_from_group(
            logical_id,
            service,
            &asg.security_group,
            port,
            description,
        ));
    }

    // 6. primary load balancer
    let alb = Alb::new(
        &mut stack,
        AlbProps {
            vpc: &vpc,
            app_security_group: &asg.security_group,
            buckets: &buckets,
        },
    )?;
    let https_only: Value = vec![alb.https_target_group.reference()].into();

    // 7. incoming email
    let (target_groups, alias) = match &settings.incoming_email {
        IncomingEmail::Disabled => {
            tracing::info!("incoming email disabled");
            (https_only, AliasTarget::load_balancer(&alb.load_balancer))
        }
        IncomingEmail::Enabled { ingress_cidr } => {
            tracing::info!(ingress_cidr = ingress_cidr.value(), "incoming email enabled");
            let nlb = Nlb::new(
                &mut stack,
                NlbProps {
                    vpc: &vpc,
                    alb: &alb,
                    app_security_group: &asg.security_group,
                    email_ingress_cidr: ingress_cidr,
                },
            );

            // mail target group first
            let with_smtp: Value = vec![
                nlb.smtp_target_group.reference(),
                alb.https_target_group.reference(),
            ]
            .into();

            (
                Value::if_(INCOMING_EMAIL_CONDITION, with_smtp, https_only),
                AliasTarget::either(
                    INCOMING_EMAIL_CONDITION,
                    &nlb.load_balancer,
                    &alb.load_balancer,
                ),
            )
        }
    };
    stack.resolve_deferred(&asg.group, TARGET_GROUP_ARNS, target_groups);

    // 8. dns records
    dns.records(&mut stack, &alias);

    // 9. outputs
    let site_url = Value::if_(
        HOSTNAME_CONDITION,
        Value::sub(format!("https://${{{}}}", dns.hostname.id())),
        Value::join("", vec!["https://".into(), alias.dns_name.clone()]),
    );
    stack.output(
        "SiteUrlOutput",
        Output::new("The URL Endpoint", site_url),
    );
    stack.output(
        "FirstUseInstructions",
        Output::new(
            "Instructions for getting started",
            Value::sub(format!(
                "The administrator password and the link to create the first organization are stored in the secret ${{{}}}. Open it in the AWS Secrets Manager console.",
                secrets.instance
            )),
        ),
    );

    stack.finish(format!(
        "Zulip chat server with managed PostgreSQL, Redis and RabbitMQ (template version {})",
        props.version
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parameter_values;
    use pretty_assertions::assert_eq;

    fn props(parameters: ParameterValues) -> StackProps {
        StackProps::new("zulip", "#!/bin/bash").with_parameters(parameters)
    }

    #[test]
    fn parameter_resolves_supplied_value_and_records_label() {
        let props = props(parameter_values! { "VpcCidr" => "10.1.0.0/16" });
        let mut stack = Stack::new(&props);

        let cidr = stack
            .parameter(
                Parameter::string("VpcCidr", "cidr").with_default("10.0.0.0/16"),
                "VPC IPv4 CIDR block",
            )
            .unwrap();

        assert_eq!(cidr.value(), "10.1.0.0/16");
        assert_eq!(stack.labels.get("VpcCidr").map(String::as_str), Some("VPC IPv4 CIDR block"));
        assert!(stack.template.parameter("VpcCidr").is_some());
    }

    #[test]
    fn image_without_region_is_looked_up_at_deploy_time() {
        let props = props(ParameterValues::default());
        let mut stack = Stack::new(&props);

        assert_eq!(
            stack.image().unwrap(),
            Value::find_in_map(MAPPING_NAME, Value::reference("AWS::Region"), "AMI".into())
        );
        assert!(stack.template.mapping(MAPPING_NAME).is_some());
    }

    #[test]
    fn settings_decide_incoming_email_once() {
        let props = props(parameter_values! {
            "EnableIncomingEmail" => "true",
            "EmailIngressCidr" => "203.0.113.0/24",
        });
        let mut stack = Stack::new(&props);
        let settings = Settings::new(&mut stack).unwrap();

        let IncomingEmail::Enabled { ingress_cidr } = &settings.incoming_email else {
            panic!("incoming email must be enabled");
        };
        assert_eq!(ingress_cidr.value(), "203.0.113.0/24");
        assert!(stack.holds(INCOMING_EMAIL_CONDITION));
        assert!(!stack.holds(SUBDOMAINS_CONDITION));
    }

    #[test]
    fn unknown_override_is_reported_by_finish() {
        let props = props(parameter_values! { "Typo" => "1" });
        let stack = Stack::new(&props);

        let err = stack.finish("test".into()).unwrap_err();
        assert!(matches!(err, BuildError::Parameter(ParameterError::Unknown(ref id)) if id == "Typo"));
    }
}
