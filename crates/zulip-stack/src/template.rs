//! The resource graph ([Template]) and the document it is emitted as
//!
//! Nodes are registered in declaration order. Every registration is checked right away, problems
//! are collected as [Issue]s and reported together by [Template::finish].
use crate::metadata::Interface;
use crate::parameters::Parameter;
use crate::value::{is_pseudo_parameter, Object, Value};
use crate::visit::{Reference, ReferenceKind, Visit, VisitReferences};
use indexmap::{IndexMap, IndexSet};
use serde::ser::SerializeMap;

pub const FORMAT_VERSION: &str = "2010-09-09";

/// A fully declared stack
#[derive(Debug, Default)]
pub struct Template {
    description: Option<String>,
    interface: Option<Interface>,
    parameters: IndexMap<String, Parameter>,
    mappings: IndexMap<String, Value>,
    conditions: IndexMap<String, Condition>,
    resources: IndexMap<String, Resource>,
    outputs: IndexMap<String, Output>,
    issues: TemplateErrors,
}

impl Template {
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    pub fn set_interface(&mut self, interface: Interface) {
        self.interface = Some(interface);
    }

    /// Declare a parameter
    ///
    /// Returns `false` when a parameter with that id already exists.
    pub fn add_parameter(&mut self, parameter: Parameter) -> bool {
        if self.parameters.contains_key(&parameter.id) || self.resources.contains_key(&parameter.id)
        {
            self.issues.log(Issue::DuplicateLogicalId(parameter.id));
            return false;
        }

        self.parameters.insert(parameter.id.clone(), parameter);
        true
    }

    /// Restrict a declared parameter to the value the template was built with
    pub fn pin_parameter(&mut self, id: &str, value: &str) {
        match self.parameters.get_mut(id) {
            Some(parameter) => parameter.pin(value),
            None => self.issues.log(Issue::UnknownParameter(id.to_string())),
        }
    }

    pub fn add_mapping(&mut self, name: impl Into<String>, mapping: Value) {
        let name = name.into();
        if self.mappings.contains_key(&name) {
            self.issues.log(Issue::DuplicateMapping(name));
            return;
        }

        self.mappings.insert(name, mapping);
    }

    /// Declare a named condition and whether it holds for this build
    pub fn add_condition(&mut self, name: impl Into<String>, expression: Value, holds: bool) {
        let name = name.into();
        if self.conditions.contains_key(&name) {
            self.issues.log(Issue::DuplicateCondition(name));
            return;
        }

        self.check_references(&name, &expression);
        tracing::debug!(condition = %name, holds, "condition declared");
        self.conditions
            .insert(name, Condition::new(expression, holds));
    }

    /// Whether a declared condition holds, unknown conditions never hold
    pub fn holds(&self, name: &str) -> bool {
        self.conditions.get(name).is_some_and(|c| c.holds)
    }

    /// Register a node
    ///
    /// Everything the node refers to must already be declared.
    pub fn insert(&mut self, resource: Resource) -> NodeId {
        let logical_id = resource.logical_id.clone();

        if self.resources.contains_key(&logical_id) || self.parameters.contains_key(&logical_id) {
            tracing::debug!(%logical_id, "collision");
            self.issues.log(Issue::DuplicateLogicalId(logical_id.clone()));
            return NodeId(logical_id);
        }

        for value in resource.properties.values() {
            self.check_references(&logical_id, value);
        }

        for dependency in &resource.depends_on {
            if !self.resources.contains_key(dependency) {
                self.issues.log(Issue::UndeclaredDependency {
                    from: logical_id.clone(),
                    to: dependency.clone(),
                });
            }
        }

        if let Some(condition) = &resource.condition {
            match self.conditions.get(condition) {
                None => self.issues.log(Issue::UnknownCondition {
                    from: logical_id.clone(),
                    condition: condition.clone(),
                }),
                Some(c) if !c.holds => self.issues.log(Issue::MaterializedUnderFalseCondition {
                    resource: logical_id.clone(),
                    condition: condition.clone(),
                }),
                Some(_) => {}
            }
        }

        tracing::trace!(%logical_id, kind = %resource.kind, "node declared");
        self.resources.insert(logical_id.clone(), resource);
        NodeId(logical_id)
    }

    /// Fill in a property that was left deferred at declaration
    pub fn resolve_deferred(&mut self, logical_id: &str, property: &str, value: Value) {
        self.check_references(logical_id, &value);

        let Some(resource) = self.resources.get_mut(logical_id) else {
            self.issues.log(Issue::UnknownResource(logical_id.to_string()));
            return;
        };

        if !resource.deferred.shift_remove(property) {
            self.issues.log(Issue::NotDeferred {
                resource: logical_id.to_string(),
                property: property.to_string(),
            });
            return;
        }

        tracing::debug!(%logical_id, property, "deferred property resolved");
        resource.properties.insert(property.to_string(), value);
    }

    pub fn add_output(&mut self, id: impl Into<String>, output: Output) {
        let id = id.into();
        if self.outputs.contains_key(&id) {
            self.issues.log(Issue::DuplicateOutput(id));
            return;
        }

        self.check_references(&id, &output.value);
        if let Some(condition) = &output.condition {
            if !self.conditions.contains_key(condition) {
                self.issues.log(Issue::UnknownCondition {
                    from: id.clone(),
                    condition: condition.clone(),
                });
            }
        }

        self.outputs.insert(id, output);
    }

    fn is_declared(&self, id: &str) -> bool {
        is_pseudo_parameter(id) || self.parameters.contains_key(id) || self.resources.contains_key(id)
    }

    fn check_references(&mut self, from: &str, value: &Value) {
        for reference in value.references() {
            let known = match reference.kind {
                ReferenceKind::Condition => self.conditions.contains_key(&reference.target),
                ReferenceKind::Mapping => self.mappings.contains_key(&reference.target),
                _ => self.is_declared(&reference.target),
            };

            if known {
                continue;
            }

            let issue = match reference.kind {
                ReferenceKind::Condition => Issue::UnknownCondition {
                    from: from.to_string(),
                    condition: reference.target,
                },
                ReferenceKind::Mapping => Issue::UnknownMapping {
                    from: from.to_string(),
                    mapping: reference.target,
                },
                _ => Issue::UndeclaredReference {
                    from: from.to_string(),
                    to: reference.target,
                },
            };
            self.issues.log(issue);
        }
    }

    /// `condition` being true implies `required` being true
    ///
    /// Either they are the same condition or `condition` is an `Fn::And` over `required`.
    fn implies(&self, condition: &str, required: &str) -> bool {
        self.implies_within(condition, required, &mut IndexSet::new())
    }

    /// [Template::implies], each condition expanded at most once
    fn implies_within<'a>(
        &'a self,
        condition: &'a str,
        required: &str,
        expanded: &mut IndexSet<&'a str>,
    ) -> bool {
        if condition == required {
            return true;
        }
        if !expanded.insert(condition) {
            return false;
        }

        match self.conditions.get(condition).map(|c| &c.expression) {
            Some(Value::And(parts)) => parts.iter().any(|part| match part {
                Value::Condition(name) => self.implies_within(name, required, expanded),
                _ => false,
            }),
            _ => false,
        }
    }

    /// References to guarded nodes from positions that are not guarded by the same condition
    fn guard_issues(&self) -> Vec<Issue> {
        let mut issues = vec![];

        let positions = self
            .resources
            .iter()
            .map(|(id, resource)| (id, resource.condition.as_deref(), resource.references()))
            .chain(self.outputs.iter().map(|(id, output)| {
                (id, output.condition.as_deref(), output.value.references())
            }));

        for (from, own_condition, references) in positions {
            for reference in references.iter().filter(|r| r.is_node()) {
                let Some(required) = self.condition_of(&reference.target) else {
                    continue;
                };

                let guarded = own_condition
                    .into_iter()
                    .chain(reference.guards.iter().map(String::as_str))
                    .any(|guard| self.implies(guard, required));

                if !guarded {
                    issues.push(Issue::ConditionEscape {
                        from: from.clone(),
                        to: reference.target.clone(),
                        condition: required.to_string(),
                    });
                }
            }
        }

        for (from, resource) in &self.resources {
            for dependency in &resource.depends_on {
                let Some(required) = self.condition_of(dependency) else {
                    continue;
                };

                let guarded = resource
                    .condition
                    .as_deref()
                    .is_some_and(|own| self.implies(own, required));

                if !guarded {
                    issues.push(Issue::ConditionEscape {
                        from: from.clone(),
                        to: dependency.clone(),
                        condition: required.to_string(),
                    });
                }
            }
        }

        issues
    }

    fn condition_of(&self, logical_id: &str) -> Option<&str> {
        self.resources
            .get(logical_id)
            .and_then(|resource| resource.condition.as_deref())
    }

    /// Validate the whole graph
    ///
    /// Returns all collected issues when there is at least one.
    pub fn finish(mut self) -> Result<Template, TemplateErrors> {
        let unresolved: Vec<_> = self
            .resources
            .values()
            .flat_map(|resource| {
                resource.deferred.iter().map(|property| Issue::UnresolvedDeferred {
                    resource: resource.logical_id.clone(),
                    property: property.clone(),
                })
            })
            .collect();

        for issue in unresolved.into_iter().chain(self.guard_issues()) {
            self.issues.log(issue);
        }

        if !self.issues.is_empty() {
            return Err(std::mem::take(&mut self.issues));
        }

        tracing::info!(
            resources = self.resources.len(),
            parameters = self.parameters.len(),
            outputs = self.outputs.len(),
            "template complete"
        );
        Ok(self)
    }
}

impl Template {
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn interface(&self) -> Option<&Interface> {
        self.interface.as_ref()
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.values()
    }

    pub fn parameter(&self, id: &str) -> Option<&Parameter> {
        self.parameters.get(id)
    }

    pub fn mapping(&self, name: &str) -> Option<&Value> {
        self.mappings.get(name)
    }

    pub fn condition(&self, name: &str) -> Option<&Condition> {
        self.conditions.get(name)
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.conditions.iter().map(|(name, c)| (name.as_str(), c))
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    /// Number of resources per kind, in order of first appearance
    pub fn kinds(&self) -> IndexMap<Kind, usize> {
        let mut kinds = IndexMap::new();
        for resource in self.resources.values() {
            *kinds.entry(resource.kind).or_insert(0) += 1;
        }
        kinds
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&str, &Output)> {
        self.outputs.iter().map(|(id, output)| (id.as_str(), output))
    }

    pub fn output(&self, id: &str) -> Option<&Output> {
        self.outputs.get(id)
    }

    /// Resources whose values a resource reads
    pub fn references_of(&self, logical_id: &str) -> IndexSet<String> {
        self.resources
            .get(logical_id)
            .map(|resource| {
                resource
                    .references()
                    .into_iter()
                    .filter(|r| r.is_node() && self.resources.contains_key(&r.target))
                    .map(|r| r.target)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resources that must exist before a resource, by reference or explicit edge
    pub fn dependencies_of(&self, logical_id: &str) -> IndexSet<String> {
        let mut dependencies = self.references_of(logical_id);
        if let Some(resource) = self.resources.get(logical_id) {
            dependencies.extend(resource.depends_on.iter().cloned());
        }
        dependencies
    }
}

/// Handle to a declared node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `{"Ref": id}`
    pub fn reference(&self) -> Value {
        Value::reference(&self.0)
    }

    /// `{"Fn::GetAtt": [id, attribute]}`
    pub fn get_att(&self, attribute: &str) -> Value {
        Value::get_att(&self.0, attribute)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named unit of infrastructure
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub logical_id: String,
    pub kind: Kind,
    pub resource_type: String,
    pub properties: Object,
    /// explicit dependency edges
    pub depends_on: Vec<String>,
    pub condition: Option<String>,
    pub deletion_policy: Option<DeletionPolicy>,
    pub update_replace_policy: Option<DeletionPolicy>,
    deferred: IndexSet<String>,
}

impl Resource {
    pub fn new(
        logical_id: impl Into<String>,
        kind: Kind,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            logical_id: logical_id.into(),
            kind,
            resource_type: resource_type.into(),
            properties: Default::default(),
            depends_on: vec![],
            condition: None,
            deletion_policy: None,
            update_replace_policy: None,
            deferred: Default::default(),
        }
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Keep a slot for a property that can only be filled in once later nodes exist
    pub fn defer(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.properties.insert(key.clone(), Value::no_value());
        self.deferred.insert(key);
        self
    }

    pub fn depends_on(mut self, logical_id: impl AsRef<str>) -> Self {
        let logical_id = logical_id.as_ref();
        if !self.depends_on.iter().any(|d| d == logical_id) {
            self.depends_on.push(logical_id.to_string());
        }
        self
    }

    /// Guard this node with a condition
    pub fn condition(mut self, name: impl Into<String>) -> Self {
        self.condition = Some(name.into());
        self
    }

    /// Keep the provider resource when it is removed from the stack or replaced
    pub fn retain(mut self) -> Self {
        self.deletion_policy = Some(DeletionPolicy::Retain);
        self.update_replace_policy = Some(DeletionPolicy::Retain);
        self
    }

    pub fn deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn is_deferred(&self, key: &str) -> bool {
        self.deferred.contains(key)
    }
}

impl VisitReferences for Resource {
    fn visit_references(&self, visitor: &mut dyn Visit<Reference>) {
        for value in self.properties.values() {
            value.visit_references(visitor);
        }
    }
}

impl serde::ser::Serialize for Resource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut ser = serializer.serialize_map(None)?;
        ser.serialize_entry("Type", &self.resource_type)?;
        if let Some(condition) = &self.condition {
            ser.serialize_entry("Condition", condition)?;
        }
        if !self.depends_on.is_empty() {
            ser.serialize_entry("DependsOn", &self.depends_on)?;
        }
        if !self.properties.is_empty() {
            ser.serialize_entry("Properties", &self.properties)?;
        }
        if let Some(policy) = &self.deletion_policy {
            ser.serialize_entry("DeletionPolicy", policy.as_str())?;
        }
        if let Some(policy) = &self.update_replace_policy {
            ser.serialize_entry("UpdateReplacePolicy", policy.as_str())?;
        }
        ser.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionPolicy {
    Delete,
    Retain,
    Snapshot,
}

impl DeletionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionPolicy::Delete => "Delete",
            DeletionPolicy::Retain => "Retain",
            DeletionPolicy::Snapshot => "Snapshot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// The VPC, exactly one per stack
    Network,
    Subnet,
    /// Internet gateway, routes and their attachments
    Gateway,
    SecurityGroup,
    /// A single security group ingress rule
    Ingress,
    Storage,
    Secret,
    Email,
    Iam,
    Function,
    Database,
    Cache,
    Queue,
    Logging,
    LaunchConfiguration,
    /// The autoscaling group, exactly one per stack
    Compute,
    LoadBalancer,
    Listener,
    TargetGroup,
    Record,
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Kind::Network => "network",
            Kind::Subnet => "subnet",
            Kind::Gateway => "gateway",
            Kind::SecurityGroup => "securitygroup",
            Kind::Ingress => "ingress",
            Kind::Storage => "storage",
            Kind::Secret => "secret",
            Kind::Email => "email",
            Kind::Iam => "iam",
            Kind::Function => "function",
            Kind::Database => "database",
            Kind::Cache => "cache",
            Kind::Queue => "queue",
            Kind::Logging => "logging",
            Kind::LaunchConfiguration => "launchconfiguration",
            Kind::Compute => "compute",
            Kind::LoadBalancer => "loadbalancer",
            Kind::Listener => "listener",
            Kind::TargetGroup => "targetgroup",
            Kind::Record => "record",
        };
        f.write_str(name)
    }
}

/// A named boolean guarding a subgraph
#[derive(Debug, Clone, PartialEq, derive_new::new)]
pub struct Condition {
    pub expression: Value,
    /// evaluated for this build
    pub holds: bool,
}

/// Informational value surfaced after provisioning
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub description: String,
    pub value: Value,
    pub condition: Option<String>,
}

impl Output {
    pub fn new(description: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            description: description.into(),
            value: value.into(),
            condition: None,
        }
    }

    pub fn condition(mut self, name: impl Into<String>) -> Self {
        self.condition = Some(name.into());
        self
    }
}

impl serde::ser::Serialize for Output {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut ser = serializer.serialize_map(None)?;
        ser.serialize_entry("Description", &self.description)?;
        ser.serialize_entry("Value", &self.value)?;
        if let Some(condition) = &self.condition {
            ser.serialize_entry("Condition", condition)?;
        }
        ser.end()
    }
}

impl serde::ser::Serialize for Template {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        struct Metadata<'a>(&'a Interface);
        impl serde::ser::Serialize for Metadata<'_> {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                let mut ser = serializer.serialize_map(Some(1))?;
                ser.serialize_entry("AWS::CloudFormation::Interface", self.0)?;
                ser.end()
            }
        }

        let mut ser = serializer.serialize_map(None)?;
        ser.serialize_entry("AWSTemplateFormatVersion", FORMAT_VERSION)?;
        if let Some(description) = &self.description {
            ser.serialize_entry("Description", description)?;
        }
        if let Some(interface) = &self.interface {
            ser.serialize_entry("Metadata", &Metadata(interface))?;
        }
        if !self.parameters.is_empty() {
            ser.serialize_entry("Parameters", &self.parameters)?;
        }
        if !self.mappings.is_empty() {
            ser.serialize_entry("Mappings", &self.mappings)?;
        }
        if !self.conditions.is_empty() {
            let conditions: IndexMap<&str, &Value> = self
                .conditions
                .iter()
                .map(|(name, c)| (name.as_str(), &c.expression))
                .collect();
            ser.serialize_entry("Conditions", &conditions)?;
        }
        ser.serialize_entry("Resources", &self.resources)?;
        if !self.outputs.is_empty() {
            ser.serialize_entry("Outputs", &self.outputs)?;
        }
        ser.end()
    }
}

/// Everything that is wrong with a template
#[derive(Debug, Default)]
pub struct TemplateErrors {
    issues: Vec<Issue>,
}

impl TemplateErrors {
    pub fn log(&mut self, issue: Issue) {
        tracing::trace!(?issue, "issue found");
        self.issues.push(issue);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

impl std::error::Error for TemplateErrors {}

impl std::fmt::Display for TemplateErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.issues.as_slice() {
            [] => f.write_str("no issues"),
            [issue] => std::fmt::Display::fmt(issue, f),
            [issue, rest @ ..] => write!(f, "{issue} (and {} more)", rest.len()),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    #[error("Logical id {0} is declared more than once")]
    DuplicateLogicalId(String),
    #[error("Mapping {0} is declared more than once")]
    DuplicateMapping(String),
    #[error("Condition {0} is declared more than once")]
    DuplicateCondition(String),
    #[error("Output {0} is declared more than once")]
    DuplicateOutput(String),
    #[error("{from} references {to} which is not declared before it")]
    UndeclaredReference { from: String, to: String },
    #[error("{from} depends on {to} which is not declared before it")]
    UndeclaredDependency { from: String, to: String },
    #[error("{from} uses unknown condition {condition}")]
    UnknownCondition { from: String, condition: String },
    #[error("{from} uses unknown mapping {mapping}")]
    UnknownMapping { from: String, mapping: String },
    #[error("Parameter {0} does not exist")]
    UnknownParameter(String),
    #[error("Resource {0} does not exist")]
    UnknownResource(String),
    #[error("{resource} is guarded by {condition} which does not hold")]
    MaterializedUnderFalseCondition { resource: String, condition: String },
    #[error("{resource}.{property} was never resolved")]
    UnresolvedDeferred { resource: String, property: String },
    #[error("{resource}.{property} is not a deferred property")]
    NotDeferred { resource: String, property: String },
    #[error("{from} references {to} outside of its condition {condition}")]
    ConditionEscape {
        from: String,
        to: String,
        condition: String,
    },
}
