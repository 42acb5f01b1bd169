use super::Visit;
use crate::value::Value;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceKind {
    /// `Ref` to a resource, parameter or pseudo parameter
    Ref,
    /// `Fn::GetAtt` of a resource attribute
    GetAtt(String),
    /// `${...}` placeholder inside `Fn::Sub`
    Sub,
    /// `Condition` or the condition name of `Fn::If`
    Condition,
    /// map name of `Fn::FindInMap`
    Mapping,
}

/// A single reference found inside a [Value]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub kind: ReferenceKind,
    /// logical id, condition name or mapping name
    pub target: String,
    /// conditions of all enclosing `Fn::If` true branches, outermost first
    pub guards: Vec<String>,
}

impl Reference {
    pub fn is_node(&self) -> bool {
        matches!(
            self.kind,
            ReferenceKind::Ref | ReferenceKind::GetAtt(_) | ReferenceKind::Sub
        )
    }
}

/// Recursively visit all [Reference]s
pub trait VisitReferences {
    fn visit_references(&self, visitor: &mut dyn Visit<Reference>);

    fn references(&self) -> Vec<Reference> {
        let mut references = vec![];
        self.visit_references(&mut |reference: &Reference| references.push(reference.clone()));
        references
    }
}

impl VisitReferences for Value {
    fn visit_references(&self, visitor: &mut dyn Visit<Reference>) {
        walk(self, &mut vec![], visitor);
    }
}

fn emit(visitor: &mut dyn Visit<Reference>, kind: ReferenceKind, target: &str, guards: &[String]) {
    visitor.visit(&Reference {
        kind,
        target: target.to_string(),
        guards: guards.to_vec(),
    });
}

fn walk(value: &Value, guards: &mut Vec<String>, visitor: &mut dyn Visit<Reference>) {
    match value {
        Value::Boolean(_) | Value::Integer(_) | Value::String(_) => {}
        Value::Array(values) | Value::Join(_, values) | Value::And(values) => {
            for value in values {
                walk(value, guards, visitor);
            }
        }
        Value::Object(object) => {
            for value in object.values() {
                walk(value, guards, visitor);
            }
        }
        Value::Ref(id) => emit(visitor, ReferenceKind::Ref, id, guards),
        Value::GetAtt(id, attribute) => {
            emit(visitor, ReferenceKind::GetAtt(attribute.clone()), id, guards)
        }
        Value::Sub(template, variables) => {
            for placeholder in sub_placeholders(template) {
                if variables.contains_key(placeholder) {
                    continue;
                }
                emit(visitor, ReferenceKind::Sub, placeholder, guards);
            }
            for value in variables.values() {
                walk(value, guards, visitor);
            }
        }
        Value::FindInMap(map, top, second) => {
            emit(visitor, ReferenceKind::Mapping, map, guards);
            walk(top, guards, visitor);
            walk(second, guards, visitor);
        }
        Value::If(condition, when_true, when_false) => {
            emit(visitor, ReferenceKind::Condition, condition, guards);

            guards.push(condition.clone());
            walk(when_true, guards, visitor);
            guards.pop();

            walk(when_false, guards, visitor);
        }
        Value::Equals(lhs, rhs) => {
            walk(lhs, guards, visitor);
            walk(rhs, guards, visitor);
        }
        Value::Not(value)
        | Value::Select(_, value)
        | Value::GetAzs(value)
        | Value::Cidr(value, _, _)
        | Value::Base64(value) => walk(value, guards, visitor),
        Value::Condition(name) => emit(visitor, ReferenceKind::Condition, name, guards),
    }
}

/// Logical ids referenced by `${...}` placeholders of a `Fn::Sub` template
///
/// `${Name.Attribute}` yields `Name`, escaped placeholders (`${!Literal}`) are skipped.
fn sub_placeholders(template: &str) -> Vec<&str> {
    static PLACEHOLDER: OnceLock<regex::Regex> = OnceLock::new();
    let re = PLACEHOLDER
        .get_or_init(|| regex::Regex::new(r"\$\{([^!}][^}]*)\}").expect("valid regex"));

    re.captures_iter(template)
        .filter_map(|captures| captures.get(1))
        .map(|name| {
            let name = name.as_str().trim();
            name.split_once('.').map_or(name, |(id, _attribute)| id)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sub_placeholders_skip_escaped() {
        assert_eq!(
            sub_placeholders("${AWS::Region} ${AppAlb.DNSName} ${!HOME} $PATH"),
            vec!["AWS::Region", "AppAlb"]
        );
    }

    #[test]
    fn if_true_branch_is_guarded() {
        let value = Value::if_(
            "EmailCondition",
            vec![Value::reference("SmtpTargetGroup"), Value::reference("HttpsTargetGroup")].into(),
            vec![Value::reference("HttpsTargetGroup")].into(),
        );

        let found: Vec<_> = value
            .references()
            .into_iter()
            .filter(Reference::is_node)
            .map(|r| (r.target, r.guards))
            .collect();

        assert_eq!(
            found,
            vec![
                ("SmtpTargetGroup".to_string(), vec!["EmailCondition".to_string()]),
                ("HttpsTargetGroup".to_string(), vec!["EmailCondition".to_string()]),
                ("HttpsTargetGroup".to_string(), vec![]),
            ]
        );
    }

    #[test]
    fn sub_variables_shadow_placeholders() {
        let mut variables = crate::value::Object::new();
        variables.insert("Endpoint".into(), Value::get_att("DbCluster", "Endpoint.Address"));
        let value = Value::sub_with("${Endpoint}:${AWS::StackName}", variables);

        let targets: Vec<_> = value.references().into_iter().map(|r| r.target).collect();
        assert_eq!(targets, vec!["AWS::StackName", "DbCluster"]);
    }
}
