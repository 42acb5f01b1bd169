use crate::stack::Stack;
use crate::template::{Kind, NodeId, Resource};
use crate::value::Value;

/// Server side encryption with provider managed keys
fn encryption() -> Value {
    crate::object! {
        "ServerSideEncryptionConfiguration" => vec![crate::object! {
            "ServerSideEncryptionByDefault" => crate::object! {
                "SSEAlgorithm" => "AES256",
            },
        }],
    }
}

fn private_access() -> Value {
    crate::object! {
        "BlockPublicAcls" => true,
        "BlockPublicPolicy" => true,
        "IgnorePublicAcls" => true,
        "RestrictPublicBuckets" => true,
    }
}

/// Object storage of the stack
#[derive(Debug, Clone)]
pub struct Buckets {
    /// uploads and avatars, kept when the stack goes away
    pub assets: NodeId,
    /// load balancer access logs
    pub logs: NodeId,
    pub logs_policy: NodeId,
}

impl Buckets {
    pub fn new(stack: &mut Stack) -> Self {
        let assets = stack.insert(
            Resource::new("AssetsBucket", Kind::Storage, "AWS::S3::Bucket")
                .property("BucketEncryption", encryption())
                .property("PublicAccessBlockConfiguration", private_access())
                .retain(),
        );

        let logs = stack.insert(
            Resource::new("AlbLogsBucket", Kind::Storage, "AWS::S3::Bucket")
                .property("BucketEncryption", encryption())
                .property("PublicAccessBlockConfiguration", private_access())
                .retain(),
        );

        let logs_policy = stack.insert(
            Resource::new("AlbLogsBucketPolicy", Kind::Storage, "AWS::S3::BucketPolicy")
                .property("Bucket", logs.reference())
                .property(
                    "PolicyDocument",
                    crate::object! {
                        "Version" => "2012-10-17",
                        "Statement" => vec![crate::object! {
                            "Action" => "s3:PutObject",
                            "Effect" => "Allow",
                            "Principal" => crate::object! {
                                "Service" => "logdelivery.elasticloadbalancing.amazonaws.com",
                            },
                            "Resource" => Value::sub(format!("${{{}.Arn}}/*", logs.as_str())),
                        }],
                    },
                ),
        );

        Self {
            assets,
            logs,
            logs_policy,
        }
    }
}
