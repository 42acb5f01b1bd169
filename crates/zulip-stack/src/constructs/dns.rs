use crate::metadata::ParameterGroup;
use crate::parameters::{Parameter, ParameterError, ParameterRef};
use crate::stack::{Stack, INCOMING_EMAIL_CONDITION, SUBDOMAINS_CONDITION};
use crate::template::{Kind, NodeId, Resource};
use crate::value::Value;

/// A hostname was supplied
pub const HOSTNAME_CONDITION: &str = "DnsHostnameExists";
/// A hosted zone name was supplied
pub const ZONE_CONDITION: &str = "DnsRoute53HostedZoneNameExists";
/// Hosted zone and incoming email
pub const EMAIL_DNS_CONDITION: &str = "DnsWithIncomingEmailCondition";
/// Hosted zone and subdomains
pub const SUBDOMAINS_DNS_CONDITION: &str = "DnsWithSubdomainsCondition";

/// Hostname of the site and the optional hosted zone it lives in
#[derive(Debug, Clone)]
pub struct Dns {
    pub hostname: ParameterRef,
    pub zone: ParameterRef,
}

/// Where alias records point to
#[derive(Debug, Clone, PartialEq)]
pub struct AliasTarget {
    pub dns_name: Value,
    pub hosted_zone_id: Value,
}

impl AliasTarget {
    pub fn load_balancer(load_balancer: &NodeId) -> Self {
        Self {
            dns_name: load_balancer.get_att("DNSName"),
            hosted_zone_id: load_balancer.get_att("CanonicalHostedZoneID"),
        }
    }

    /// `when_true` while `condition` holds, `when_false` otherwise
    pub fn either(condition: &str, when_true: &NodeId, when_false: &NodeId) -> Self {
        let when_true = Self::load_balancer(when_true);
        let when_false = Self::load_balancer(when_false);
        Self {
            dns_name: Value::if_(condition, when_true.dns_name, when_false.dns_name),
            hosted_zone_id: Value::if_(
                condition,
                when_true.hosted_zone_id,
                when_false.hosted_zone_id,
            ),
        }
    }

    fn to_value(&self) -> Value {
        crate::object! {
            "DNSName" => self.dns_name.clone(),
            "HostedZoneId" => self.hosted_zone_id.clone(),
        }
    }
}

/// Records declared by [Dns::records]
#[derive(Debug, Clone, Default)]
pub struct DnsRecords {
    pub site: Option<NodeId>,
    pub wildcard: Option<NodeId>,
    pub mx: Option<NodeId>,
}

impl Dns {
    pub fn new(
        stack: &mut Stack,
        incoming_email: bool,
        subdomains: &ParameterRef,
    ) -> Result<Self, ParameterError> {
        let hostname = stack.parameter(
            Parameter::string(
                "DnsHostname",
                "Optional: The hostname to access the service. E.g. 'chat.company.io'",
            )
            .with_default(""),
            "Hostname",
        )?;
        let zone = stack.parameter(
            Parameter::string(
                "DnsRoute53HostedZoneName",
                "Optional: Route 53 Hosted Zone name in which a DNS record will be created by this template. Must already exist and be the domain part of the Hostname parameter, without trailing dot. E.g. 'company.io'",
            )
            .with_default(""),
            "Route 53 Hosted Zone Name",
        )?;
        stack.parameter_group(ParameterGroup::application(
            "DNS Configuration",
            ["DnsHostname", "DnsRoute53HostedZoneName"],
        ));

        if !zone.is_empty() && hostname.is_empty() {
            return Err(ParameterError::Requires {
                id: zone.id().to_string(),
                required: hostname.id().to_string(),
            });
        }

        let zone_exists = !zone.is_empty();
        stack.pin(&zone);
        if zone_exists {
            // the wildcard record is only there when built with subdomains
            stack.pin(subdomains);
        }

        stack.condition(
            HOSTNAME_CONDITION,
            Value::not(Value::equals(hostname.reference(), "")),
            !hostname.is_empty(),
        );
        stack.condition(
            ZONE_CONDITION,
            Value::not(Value::equals(zone.reference(), "")),
            zone_exists,
        );
        stack.condition(
            EMAIL_DNS_CONDITION,
            Value::and(vec![
                Value::condition(ZONE_CONDITION),
                Value::condition(INCOMING_EMAIL_CONDITION),
            ]),
            zone_exists && incoming_email,
        );
        stack.condition(
            SUBDOMAINS_DNS_CONDITION,
            Value::and(vec![
                Value::condition(ZONE_CONDITION),
                Value::condition(SUBDOMAINS_CONDITION),
            ]),
            zone_exists && subdomains.is_enabled(),
        );

        Ok(Self { hostname, zone })
    }

    fn record(&self, logical_id: &str, name: Value, record_type: &str) -> Resource {
        Resource::new(logical_id, Kind::Record, "AWS::Route53::RecordSet")
            .property(
                "HostedZoneName",
                Value::sub(format!("${{{}}}.", self.zone.id())),
            )
            .property("Name", name)
            .property("Type", record_type)
    }

    /// Records for the site, its subdomains and incoming mail
    ///
    /// Nothing is declared without a hosted zone.
    pub fn records(&self, stack: &mut Stack, alias: &AliasTarget) -> DnsRecords {
        let mut records = DnsRecords::default();

        if !stack.holds(ZONE_CONDITION) {
            tracing::info!("no hosted zone, skipping dns records");
            return records;
        }

        let site = stack.insert(
            self.record("SiteDnsRecord", self.hostname.reference(), "A")
                .property("AliasTarget", alias.to_value())
                .condition(ZONE_CONDITION),
        );

        if stack.holds(SUBDOMAINS_DNS_CONDITION) {
            records.wildcard = Some(
                stack.insert(
                    self.record(
                        "WildcardDnsRecord",
                        Value::sub(format!("*.${{{}}}", self.hostname.id())),
                        "A",
                    )
                    .property("AliasTarget", alias.to_value())
                    .condition(SUBDOMAINS_DNS_CONDITION),
                ),
            );
        }

        if stack.holds(EMAIL_DNS_CONDITION) {
            records.mx = Some(
                stack.insert(
                    self.record("MxDnsRecord", self.hostname.reference(), "MX")
                        .property(
                            "ResourceRecords",
                            vec![Value::sub(format!("10 ${{{}}}", self.hostname.id()))],
                        )
                        .property("TTL", "300")
                        .depends_on(&site)
                        .condition(EMAIL_DNS_CONDITION),
                ),
            );
        }

        records.site = Some(site);
        records
    }
}
