use crate::stack::Stack;
use crate::template::{Kind, NodeId, Resource};
use crate::value::Value;

/// Credentials generated by the secrets service on creation
#[derive(Debug, Clone)]
pub struct Secrets {
    /// application secret, also holds the first admin password
    pub instance: NodeId,
    pub database: NodeId,
    pub broker: NodeId,
}

/// `{{resolve:secretsmanager:<secret>:SecretString:<key>}}` of `secret`
pub fn resolve(secret: &NodeId, key: &str) -> Value {
    Value::sub(format!(
        "{{{{resolve:secretsmanager:${{{secret}}}:SecretString:{key}}}}}"
    ))
}

fn generated(logical_id: &str, description: &str, username: &str, exclude: &str) -> Resource {
    Resource::new(logical_id, Kind::Secret, "AWS::SecretsManager::Secret")
        .property("Description", Value::sub(format!("${{AWS::StackName}}/{description}")))
        .property(
            "GenerateSecretString",
            crate::object! {
                "ExcludeCharacters" => exclude,
                "GenerateStringKey" => "password",
                "PasswordLength" => 32u32,
                "SecretStringTemplate" => format!(r#"{{"username":"{username}"}}"#),
            },
        )
}

impl Secrets {
    pub fn new(stack: &mut Stack) -> Self {
        let instance = stack.insert(generated(
            "InstanceSecret",
            "instance",
            "admin",
            r#""@/\"#,
        ));
        let database = stack.insert(generated("DbSecret", "database", "zulip", r#""@/\'"#));
        // broker passwords may not contain commas, colons or equal signs
        let broker = stack.insert(generated(
            "RabbitMqSecret",
            "rabbitmq",
            "zulip",
            r#""@/\,:="#,
        ));

        Self {
            instance,
            database,
            broker,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::template::{Kind, Resource, Template};
    use pretty_assertions::assert_eq;

    #[test]
    fn dynamic_reference_points_at_secret() {
        let mut template = Template::default();
        let secret = template.insert(Resource::new(
            "DbSecret",
            Kind::Secret,
            "AWS::SecretsManager::Secret",
        ));

        assert_eq!(
            serde_json::to_value(resolve(&secret, "password")).unwrap(),
            serde_json::json!({
                "Fn::Sub": "{{resolve:secretsmanager:${DbSecret}:SecretString:password}}"
            })
        );
    }
}
