//! Caller and service identity types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The principal the ambient AWS session resolves to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// 12-digit AWS account id
    pub account: String,

    /// ARN of the calling principal
    pub arn: String,

    /// Unique id of the calling principal
    pub user_id: String,

    /// Region the session operates in
    pub region: String,
}

impl CallerIdentity {
    /// ARN partition of the caller (`aws`, `aws-cn`, `aws-us-gov`)
    ///
    /// Taken from the caller ARN when it parses, otherwise inferred from the region.
    pub fn partition(&self) -> String {
        partition_from_arn(&self.arn)
            .unwrap_or_else(|| partition_for_region(&self.region).to_string())
    }
}

/// Extract the partition segment from an ARN
pub fn partition_from_arn(arn: &str) -> Option<String> {
    let mut parts = arn.splitn(3, ':');
    match (parts.next(), parts.next()) {
        (Some("arn"), Some(partition)) if !partition.is_empty() => Some(partition.to_string()),
        _ => None,
    }
}

/// Infer the partition from a region name
pub fn partition_for_region(region: &str) -> &'static str {
    if region.starts_with("cn-") {
        "aws-cn"
    } else if region.starts_with("us-gov-") {
        "aws-us-gov"
    } else {
        "aws"
    }
}

/// A non-human IAM principal created for the CI pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentity {
    /// IAM user name
    pub name: String,

    /// IAM namespace path, e.g. `/ci-cd/`
    pub path: String,

    /// ARN assigned by IAM
    pub arn: String,

    /// Stable unique id assigned by IAM
    pub unique_id: String,

    /// Traceability tags
    pub tags: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(arn: &str, region: &str) -> CallerIdentity {
        CallerIdentity {
            account: "123456789012".to_string(),
            arn: arn.to_string(),
            user_id: "AIDAEXAMPLE".to_string(),
            region: region.to_string(),
        }
    }

    #[test]
    fn test_partition_from_caller_arn() {
        let id = caller("arn:aws-cn:iam::123456789012:user/ops", "us-east-1");
        assert_eq!(id.partition(), "aws-cn");
    }

    #[test]
    fn test_partition_falls_back_to_region() {
        assert_eq!(caller("", "us-gov-west-1").partition(), "aws-us-gov");
        assert_eq!(caller("not-an-arn", "cn-north-1").partition(), "aws-cn");
        assert_eq!(caller("", "eu-west-1").partition(), "aws");
    }
}
