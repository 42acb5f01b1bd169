//! Console presentation metadata (`AWS::CloudFormation::Interface`)
//!
//! Every construct describes how its parameters are grouped and labelled. [aggregate] combines
//! those contributions into a single [Interface]. It has no effect on the provisioned resources.
use indexmap::IndexMap;
use serde::ser::SerializeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupClass {
    /// Feature and application settings, shown first
    Application,
    /// Network settings, shown last
    Network,
}

#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct ParameterGroup {
    pub label: String,
    pub class: GroupClass,
    pub parameters: Vec<String>,
}

impl ParameterGroup {
    pub fn application<I, S>(label: impl Into<String>, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            label.into(),
            GroupClass::Application,
            parameters.into_iter().map(Into::into).collect(),
        )
    }

    pub fn network<I, S>(label: impl Into<String>, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            label.into(),
            GroupClass::Network,
            parameters.into_iter().map(Into::into).collect(),
        )
    }
}

/// parameter id → human readable label
pub type ParameterLabels = IndexMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interface {
    pub groups: Vec<ParameterGroup>,
    pub labels: ParameterLabels,
}

/// Combine group and label contributions
///
/// - application groups keep their declaration order and come before network groups
/// - groups sharing a label are merged into the first one
/// - every declared parameter is labelled, falling back to its id
pub fn aggregate<'a>(
    groups: &[ParameterGroup],
    labels: &ParameterLabels,
    declared: impl IntoIterator<Item = &'a str>,
) -> Interface {
    let mut merged: IndexMap<&str, ParameterGroup> = IndexMap::new();

    let ordered = groups
        .iter()
        .filter(|g| g.class == GroupClass::Application)
        .chain(groups.iter().filter(|g| g.class == GroupClass::Network));

    for group in ordered {
        match merged.get_mut(group.label.as_str()) {
            Some(existing) => {
                tracing::debug!(label = %group.label, "merging parameter group");
                for parameter in &group.parameters {
                    if !existing.parameters.contains(parameter) {
                        existing.parameters.push(parameter.clone());
                    }
                }
            }
            None => {
                merged.insert(group.label.as_str(), group.clone());
            }
        }
    }

    let labels = declared
        .into_iter()
        .map(|id| {
            let label = labels.get(id).cloned().unwrap_or_else(|| id.to_string());
            (id.to_string(), label)
        })
        .collect();

    Interface {
        groups: merged.into_values().collect(),
        labels,
    }
}

struct DefaultLabel<'a>(&'a str);

impl serde::ser::Serialize for DefaultLabel<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut ser = serializer.serialize_map(Some(1))?;
        ser.serialize_entry("default", self.0)?;
        ser.end()
    }
}

impl serde::ser::Serialize for ParameterGroup {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut ser = serializer.serialize_map(Some(2))?;
        ser.serialize_entry("Label", &DefaultLabel(&self.label))?;
        ser.serialize_entry("Parameters", &self.parameters)?;
        ser.end()
    }
}

impl serde::ser::Serialize for Interface {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        struct Labels<'a>(&'a ParameterLabels);
        impl serde::ser::Serialize for Labels<'_> {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                let mut ser = serializer.serialize_map(Some(self.0.len()))?;
                for (id, label) in self.0 {
                    ser.serialize_entry(id, &DefaultLabel(label))?;
                }
                ser.end()
            }
        }

        let mut ser = serializer.serialize_map(Some(2))?;
        ser.serialize_entry("ParameterGroups", &self.groups)?;
        ser.serialize_entry("ParameterLabels", &Labels(&self.labels))?;
        ser.end()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn labels(pairs: &[(&str, &str)]) -> ParameterLabels {
        pairs
            .iter()
            .map(|(id, label)| (id.to_string(), label.to_string()))
            .collect()
    }

    #[test]
    fn network_groups_go_last() {
        let groups = [
            ParameterGroup::network("VPC", ["VpcCidr"]),
            ParameterGroup::application("DNS", ["DnsHostname"]),
            ParameterGroup::application("Database", ["DbInstanceClass"]),
        ];

        let interface = aggregate(&groups, &Default::default(), []);
        let order: Vec<_> = interface.groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(order, vec!["DNS", "Database", "VPC"]);
    }

    #[test]
    fn duplicate_labels_are_merged() {
        let groups = [
            ParameterGroup::application("Zulip", ["AdminEmail"]),
            ParameterGroup::application("DNS", ["DnsHostname"]),
            ParameterGroup::application("Zulip", ["SentryDsn", "AdminEmail"]),
        ];

        let interface = aggregate(&groups, &Default::default(), []);
        assert_eq!(
            interface.groups,
            vec![
                ParameterGroup::application("Zulip", ["AdminEmail", "SentryDsn"]),
                ParameterGroup::application("DNS", ["DnsHostname"]),
            ]
        );
    }

    #[test]
    fn missing_label_falls_back_to_id() {
        let interface = aggregate(
            &[],
            &labels(&[("AdminEmail", "Administrator email")]),
            ["AdminEmail", "SentryDsn"],
        );

        assert_eq!(
            interface.labels,
            labels(&[("AdminEmail", "Administrator email"), ("SentryDsn", "SentryDsn")])
        );
    }

    #[test]
    fn serializes_console_format() {
        let interface = aggregate(
            &[ParameterGroup::application("DNS", ["DnsHostname"])],
            &labels(&[("DnsHostname", "Hostname")]),
            ["DnsHostname"],
        );

        assert_eq!(
            serde_json::to_value(&interface).unwrap(),
            serde_json::json!({
                "ParameterGroups": [
                    {"Label": {"default": "DNS"}, "Parameters": ["DnsHostname"]}
                ],
                "ParameterLabels": {"DnsHostname": {"default": "Hostname"}}
            })
        );
    }
}
