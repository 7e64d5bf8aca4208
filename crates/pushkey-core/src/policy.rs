//! Least-privilege registry push policy
//!
//! Builds the authorization document attached to the CI identity. The document
//! is split into three statements by privilege class:
//!
//! 1. `GetAuthorizationToken` on `*` (registry login has no narrower scope)
//! 2. Image layer read/write on the allow-listed repositories
//! 3. Repository lifecycle and listing on the same repositories
//!
//! The repository allow-list is fixed. There is no discovery and no wildcard
//! repository pattern; a new application repository means a new entry in
//! [`REPOSITORIES`].

use crate::error::{Error, Result};
use crate::types::{AuthorizationDocument, CallerIdentity, Effect, Statement, POLICY_VERSION};

/// Registry repositories the CI identity may push to
pub const REPOSITORIES: [&str; 5] = [
    "retail-store-ui",
    "retail-store-catalog",
    "retail-store-cart",
    "retail-store-orders",
    "retail-store-checkout",
];

/// Registry service prefix used in ARNs and actions
pub const REGISTRY_SERVICE: &str = "ecr";

pub const AUTH_TOKEN_SID: &str = "RegistryAuthToken";
pub const IMAGE_ACCESS_SID: &str = "ImageLayerReadWrite";
pub const REPOSITORY_MANAGEMENT_SID: &str = "RepositoryLifecycle";

const AUTH_TOKEN_ACTIONS: &[&str] = &["ecr:GetAuthorizationToken"];

const IMAGE_ACCESS_ACTIONS: &[&str] = &[
    "ecr:BatchCheckLayerAvailability",
    "ecr:GetDownloadUrlForLayer",
    "ecr:BatchGetImage",
    "ecr:InitiateLayerUpload",
    "ecr:UploadLayerPart",
    "ecr:CompleteLayerUpload",
    "ecr:PutImage",
];

const REPOSITORY_MANAGEMENT_ACTIONS: &[&str] = &[
    "ecr:CreateRepository",
    "ecr:DescribeRepositories",
    "ecr:ListImages",
    "ecr:DescribeImages",
];

/// Format a repository ARN
pub fn repository_arn(partition: &str, region: &str, account: &str, name: &str) -> String {
    format!(
        "arn:{}:{}:{}:{}:repository/{}",
        partition, REGISTRY_SERVICE, region, account, name
    )
}

/// Builder for the registry push policy
#[derive(Debug, Clone)]
pub struct PolicyBuilder {
    account: String,
    region: String,
    partition: String,
}

impl PolicyBuilder {
    /// Create a builder for the given account and region in the `aws` partition
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
            partition: "aws".to_string(),
        }
    }

    /// Create a builder parameterized by a resolved caller identity
    pub fn for_caller(caller: &CallerIdentity) -> Self {
        Self::new(&caller.account, &caller.region).with_partition(caller.partition())
    }

    /// Override the ARN partition
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    /// ARNs of every allow-listed repository, in allow-list order
    pub fn repository_arns(&self) -> Vec<String> {
        REPOSITORIES
            .iter()
            .map(|name| repository_arn(&self.partition, &self.region, &self.account, name))
            .collect()
    }

    /// Build and validate the authorization document
    pub fn build(&self) -> Result<AuthorizationDocument> {
        self.validate_inputs()?;

        let repositories = self.repository_arns();
        let document = AuthorizationDocument {
            version: POLICY_VERSION.to_string(),
            statements: vec![
                statement(AUTH_TOKEN_SID, AUTH_TOKEN_ACTIONS, vec!["*".to_string()]),
                statement(IMAGE_ACCESS_SID, IMAGE_ACCESS_ACTIONS, repositories.clone()),
                statement(
                    REPOSITORY_MANAGEMENT_SID,
                    REPOSITORY_MANAGEMENT_ACTIONS,
                    repositories,
                ),
            ],
        };

        validate_document(&document)?;
        Ok(document)
    }

    fn validate_inputs(&self) -> Result<()> {
        if self.account.len() != 12 || !self.account.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::invalid_config(format!(
                "account id must be 12 digits, got '{}'",
                self.account
            )));
        }
        if self.region.trim().is_empty() {
            return Err(Error::MissingRegion);
        }
        if self.partition.trim().is_empty() {
            return Err(Error::invalid_config("ARN partition must not be empty"));
        }
        Ok(())
    }
}

fn statement(sid: &str, actions: &[&str], resources: Vec<String>) -> Statement {
    Statement {
        sid: Some(sid.to_string()),
        effect: Effect::Allow,
        actions: actions.iter().map(|a| a.to_string()).collect(),
        resources,
    }
}

/// Check the wildcard invariants of a registry push document
///
/// Only the authorization-token statement may use `*`, and it must use
/// nothing else. Every other resource must be an allow-listed repository ARN.
pub fn validate_document(document: &AuthorizationDocument) -> Result<()> {
    for stmt in &document.statements {
        let is_token_statement = stmt.sid.as_deref() == Some(AUTH_TOKEN_SID);

        if is_token_statement {
            if stmt.resources != ["*"] {
                return Err(Error::invalid_config(
                    "authorization token statement must target exactly '*'",
                ));
            }
            continue;
        }

        for resource in &stmt.resources {
            if resource.contains('*') {
                return Err(Error::invalid_config(format!(
                    "wildcard resource '{}' outside the authorization token statement",
                    resource
                )));
            }
            let allowed = resource
                .rsplit_once(":repository/")
                .map(|(_, name)| REPOSITORIES.contains(&name))
                .unwrap_or(false);
            if !allowed {
                return Err(Error::invalid_config(format!(
                    "resource '{}' is not an allow-listed repository",
                    resource
                )));
            }
        }
    }
    Ok(())
}
