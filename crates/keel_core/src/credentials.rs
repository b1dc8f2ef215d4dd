//! Credential contexts and caller identity.
//!
//! A [`CredentialContext`] names the account/region/role scope a backend call
//! runs under. Workflows resolve the contexts they need up front and hand them
//! to every call explicitly; nothing in keel reads credentials from ambient
//! process state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Where the credentials of a context come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// The default credential chain (the tools account)
    Default,
    /// A named local profile
    Profile(String),
    /// A role assumed from the default chain
    AssumedRole { role_arn: String },
}

/// An authenticated scope under which backend calls are made.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CredentialContext {
    pub source: CredentialSource,
    /// Region override; `None` uses the source's configured region
    pub region: Option<String>,
}

impl CredentialContext {
    pub fn default_chain() -> Self {
        Self {
            source: CredentialSource::Default,
            region: None,
        }
    }

    pub fn profile(name: impl Into<String>) -> Self {
        Self {
            source: CredentialSource::Profile(name.into()),
            region: None,
        }
    }

    pub fn assumed_role(role_arn: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            source: CredentialSource::AssumedRole {
                role_arn: role_arn.into(),
            },
            region: Some(region.into()),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

impl std::fmt::Display for CredentialContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            CredentialSource::Default => write!(f, "default")?,
            CredentialSource::Profile(name) => write!(f, "profile:{}", name)?,
            CredentialSource::AssumedRole { role_arn } => write!(f, "role:{}", role_arn)?,
        }
        if let Some(region) = &self.region {
            write!(f, "@{}", region)?;
        }
        Ok(())
    }
}

/// Resolves credential contexts.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Context for the default credential chain.
    async fn default_context(&self) -> anyhow::Result<CredentialContext>;

    /// Default credential chain pinned to a region.
    async fn default_with_region(&self, region: &str) -> anyhow::Result<CredentialContext>;

    /// Assume a role in the given region.
    async fn from_role(&self, role_arn: &str, region: &str) -> anyhow::Result<CredentialContext>;

    /// Context for a named profile.
    async fn from_profile(&self, profile: &str) -> anyhow::Result<CredentialContext>;
}

/// The principal behind a credential context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    /// Account ID
    pub account: String,
    /// ARN of the account's root principal
    pub root_user_arn: String,
}

impl Identity {
    pub fn new(account: impl Into<String>) -> Self {
        let account = account.into();
        let root_user_arn = format!("arn:aws:iam::{}:root", account);
        Self {
            account,
            root_user_arn,
        }
    }
}

/// Resolves which account a credential context authenticates as.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn get(&self, context: &CredentialContext) -> anyhow::Result<Identity>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display() {
        assert_eq!(CredentialContext::default_chain().to_string(), "default");
        assert_eq!(
            CredentialContext::default_chain()
                .with_region("eu-west-1")
                .to_string(),
            "default@eu-west-1"
        );
        assert_eq!(
            CredentialContext::profile("prod-admin").to_string(),
            "profile:prod-admin"
        );
        assert_eq!(
            CredentialContext::assumed_role("arn:aws:iam::2:role/m", "us-east-1").to_string(),
            "role:arn:aws:iam::2:role/m@us-east-1"
        );
    }

    #[test]
    fn test_identity_root_arn() {
        let identity = Identity::new("111122223333");
        assert_eq!(identity.root_user_arn, "arn:aws:iam::111122223333:root");
    }
}
