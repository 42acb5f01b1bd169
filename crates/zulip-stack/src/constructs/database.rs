use super::network::Vpc;
use super::secrets::resolve;
use super::security_group;
use crate::metadata::ParameterGroup;
use crate::parameters::{Parameter, ParameterError};
use crate::readiness::{DatabasePrimary, Ready};
use crate::stack::Stack;
use crate::template::{DeletionPolicy, Kind, NodeId, Resource};
use crate::value::Value;

pub const POSTGRES_PORT: u16 = 5432;

/// A snapshot to restore the cluster from was supplied
pub const SNAPSHOT_CONDITION: &str = "DbSnapshotIdentifierExists";

/// Aurora PostgreSQL cluster with a single primary instance
#[derive(Debug, Clone)]
pub struct AuroraPostgresql {
    pub security_group: NodeId,
    pub cluster: NodeId,
    pub primary: NodeId,
}

impl AuroraPostgresql {
    pub fn new(stack: &mut Stack, vpc: &Vpc, secret: &NodeId) -> Result<Self, ParameterError> {
        let instance_class = stack.parameter(
            Parameter::string(
                "DbInstanceClass",
                "Required: The class profile for memory and compute capacity for the database instance.",
            )
            .with_default("db.r5.large")
            .with_allowed_values([
                "db.r5.large",
                "db.r5.xlarge",
                "db.r5.2xlarge",
                "db.r6g.large",
                "db.r6g.xlarge",
                "db.t3.medium",
                "db.t4g.medium",
            ]),
            "Instance Class",
        )?;
        let snapshot = stack.parameter(
            Parameter::string(
                "DbSnapshotIdentifier",
                "Optional: RDS snapshot ARN from which to restore. If specified, manually edit the secret values to specify the snapshot credentials for the application. WARNING: Changing this value will re-provision the database.",
            )
            .with_default(""),
            "Existing DB Snapshot ARN",
        )?;
        stack.parameter_group(ParameterGroup::application(
            "Database",
            ["DbInstanceClass", "DbSnapshotIdentifier"],
        ));

        let subnet_group = stack.insert(
            Resource::new("DbSubnetGroup", Kind::Database, "AWS::RDS::DBSubnetGroup")
                .property(
                    "DBSubnetGroupDescription",
                    Value::sub("${AWS::StackName}/DbSubnetGroup"),
                )
                .property("SubnetIds", vpc.private_subnet_ids()),
        );

        let sg = security_group(stack, "DbSg", &vpc.vpc);

        stack.condition(
            SNAPSHOT_CONDITION,
            Value::not(Value::equals(snapshot.reference(), "")),
            !snapshot.is_empty(),
        );
        if !snapshot.is_empty() {
            tracing::info!(snapshot = snapshot.value(), "restoring database from snapshot");
        }

        // credentials come along with a restored snapshot
        let unless_restored = |value: Value| Value::if_(SNAPSHOT_CONDITION, Value::no_value(), value);

        let cluster = stack.insert(
            Resource::new("DbCluster", Kind::Database, "AWS::RDS::DBCluster")
                .property("DBSubnetGroupName", subnet_group.reference())
                .property("DatabaseName", unless_restored("zulip".into()))
                .property("Engine", "aurora-postgresql")
                .property("MasterUsername", unless_restored(resolve(secret, "username")))
                .property("MasterUserPassword", unless_restored(resolve(secret, "password")))
                .property("Port", POSTGRES_PORT)
                .property(
                    "SnapshotIdentifier",
                    Value::if_(SNAPSHOT_CONDITION, snapshot.reference(), Value::no_value()),
                )
                .property("StorageEncrypted", true)
                .property("VpcSecurityGroupIds", vec![sg.get_att("GroupId")])
                .deletion_policy(DeletionPolicy::Snapshot)
                .depends_on(secret),
        );

        let primary = stack.insert(
            Resource::new("DbPrimaryInstance", Kind::Database, "AWS::RDS::DBInstance")
                .property("DBClusterIdentifier", cluster.reference())
                .property("DBInstanceClass", instance_class.reference())
                .property("DBSubnetGroupName", subnet_group.reference())
                .property("Engine", "aurora-postgresql"),
        );

        Ok(Self {
            security_group: sg,
            cluster,
            primary,
        })
    }

    /// The primary instance has been declared
    pub fn primary_ready(&self) -> Ready<DatabasePrimary> {
        Ready::new(self.primary.as_str())
    }
}
