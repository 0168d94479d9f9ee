//! Identity service seam and its IAM implementation.

use async_trait::async_trait;
use aws_sdk_iam::error::DisplayErrorContext;
use aws_sdk_iam::Client as IamClient;
use aws_types::SdkConfig;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, instrument};

const MAX_PRINCIPAL_NAME_LEN: usize = 64;

/// Errors returned by identity service calls
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Identity service request failed ({operation}): {message}")]
    Transport { operation: &'static str, message: String },

    #[error("Principal {0} not found")]
    NotFound(String),

    #[error("Invalid principal name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },
}

impl IdentityError {
    fn transport(operation: &'static str, err: impl fmt::Display) -> Self {
        IdentityError::Transport {
            operation,
            message: err.to_string(),
        }
    }
}

/// A principal as reported by the identity service
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub name: String,
    pub id: String,
    pub arn: String,
}

/// A policy attached to a principal
#[derive(Debug, Clone, PartialEq)]
pub struct AttachedPolicy {
    pub name: String,
    pub arn: String,
}

/// Freshly issued credential pair. The secret is only ever available here.
#[derive(Clone, PartialEq)]
pub struct AccessKeyPair {
    pub key_id: String,
    pub secret: String,
}

impl fmt::Debug for AccessKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKeyPair")
            .field("key_id", &self.key_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Operations the provisioning workflows need from the identity service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn list_principals(&self) -> Result<Vec<Principal>, IdentityError>;

    async fn create_principal(&self, name: &str) -> Result<Principal, IdentityError>;

    async fn delete_principal(&self, name: &str) -> Result<(), IdentityError>;

    async fn attach_policy(&self, name: &str, policy_arn: &str) -> Result<(), IdentityError>;

    async fn detach_policy(&self, name: &str, policy_arn: &str) -> Result<(), IdentityError>;

    async fn list_attached_policies(&self, name: &str) -> Result<Vec<AttachedPolicy>, IdentityError>;

    async fn create_access_key(&self, name: &str) -> Result<AccessKeyPair, IdentityError>;

    /// Ids of every access key belonging to `name`
    async fn list_access_keys(&self, name: &str) -> Result<Vec<String>, IdentityError>;

    async fn delete_access_key(&self, name: &str, key_id: &str) -> Result<(), IdentityError>;
}

/// Check a principal name before it reaches the identity service.
///
/// Accepts 1 to 64 characters from `[A-Za-z0-9+=,.@_-]`.
pub fn validate_principal_name(name: &str) -> Result<(), IdentityError> {
    let invalid = |reason: &str| IdentityError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.len() > MAX_PRINCIPAL_NAME_LEN {
        return Err(invalid("longer than 64 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '=' | ',' | '.' | '@' | '_' | '-'))
    {
        return Err(invalid("contains characters outside [A-Za-z0-9+=,.@_-]"));
    }
    Ok(())
}

/// IAM-backed identity service
pub struct IamIdentityService {
    client: IamClient,
}

impl IamIdentityService {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        info!("IAM identity service initialized");
        Self {
            client: IamClient::new(sdk_config),
        }
    }

    /// Release the client handle
    pub fn close(self) {
        debug!("Releasing IAM client");
        drop(self.client);
    }
}

#[async_trait]
impl IdentityService for IamIdentityService {
    async fn list_principals(&self) -> Result<Vec<Principal>, IdentityError> {
        let mut pages = self.client.list_users().into_paginator().send();

        let mut principals = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| IdentityError::transport("list_users", DisplayErrorContext(e)))?;
            for user in page.users() {
                principals.push(Principal {
                    name: user.user_name().to_string(),
                    id: user.user_id().to_string(),
                    arn: user.arn().to_string(),
                });
            }
        }

        debug!(count = principals.len(), "Listed principals");
        Ok(principals)
    }

    #[instrument(skip(self))]
    async fn create_principal(&self, name: &str) -> Result<Principal, IdentityError> {
        let response = self
            .client
            .create_user()
            .user_name(name)
            .send()
            .await
            .map_err(|e| IdentityError::transport("create_user", DisplayErrorContext(e)))?;

        let user = response
            .user()
            .ok_or_else(|| IdentityError::transport("create_user", "response carried no user"))?;

        Ok(Principal {
            name: user.user_name().to_string(),
            id: user.user_id().to_string(),
            arn: user.arn().to_string(),
        })
    }

    #[instrument(skip(self))]
    async fn delete_principal(&self, name: &str) -> Result<(), IdentityError> {
        self.client
            .delete_user()
            .user_name(name)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map(|e| e.is_no_such_entity_exception())
                    .unwrap_or(false)
                {
                    IdentityError::NotFound(name.to_string())
                } else {
                    IdentityError::transport("delete_user", DisplayErrorContext(e))
                }
            })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn attach_policy(&self, name: &str, policy_arn: &str) -> Result<(), IdentityError> {
        self.client
            .attach_user_policy()
            .user_name(name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| IdentityError::transport("attach_user_policy", DisplayErrorContext(e)))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn detach_policy(&self, name: &str, policy_arn: &str) -> Result<(), IdentityError> {
        self.client
            .detach_user_policy()
            .user_name(name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| IdentityError::transport("detach_user_policy", DisplayErrorContext(e)))?;
        Ok(())
    }

    async fn list_attached_policies(&self, name: &str) -> Result<Vec<AttachedPolicy>, IdentityError> {
        let mut pages = self
            .client
            .list_attached_user_policies()
            .user_name(name)
            .into_paginator()
            .send();

        let mut policies = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                IdentityError::transport("list_attached_user_policies", DisplayErrorContext(e))
            })?;
            for policy in page.attached_policies() {
                if let Some(arn) = policy.policy_arn() {
                    policies.push(AttachedPolicy {
                        name: policy.policy_name().unwrap_or_default().to_string(),
                        arn: arn.to_string(),
                    });
                }
            }
        }
        Ok(policies)
    }

    #[instrument(skip(self))]
    async fn create_access_key(&self, name: &str) -> Result<AccessKeyPair, IdentityError> {
        let response = self
            .client
            .create_access_key()
            .user_name(name)
            .send()
            .await
            .map_err(|e| IdentityError::transport("create_access_key", DisplayErrorContext(e)))?;

        let key = response
            .access_key()
            .ok_or_else(|| IdentityError::transport("create_access_key", "response carried no key"))?;

        Ok(AccessKeyPair {
            key_id: key.access_key_id().to_string(),
            secret: key.secret_access_key().to_string(),
        })
    }

    async fn list_access_keys(&self, name: &str) -> Result<Vec<String>, IdentityError> {
        let mut pages = self
            .client
            .list_access_keys()
            .user_name(name)
            .into_paginator()
            .send();

        let mut key_ids = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page
                .map_err(|e| IdentityError::transport("list_access_keys", DisplayErrorContext(e)))?;
            key_ids.extend(
                page.access_key_metadata()
                    .iter()
                    .filter_map(|meta| meta.access_key_id().map(String::from)),
            );
        }
        Ok(key_ids)
    }

    #[instrument(skip(self))]
    async fn delete_access_key(&self, name: &str, key_id: &str) -> Result<(), IdentityError> {
        self.client
            .delete_access_key()
            .user_name(name)
            .access_key_id(key_id)
            .send()
            .await
            .map_err(|e| IdentityError::transport("delete_access_key", DisplayErrorContext(e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_principal_names() {
        assert!(validate_principal_name("TeacherA").is_ok());
        assert!(validate_principal_name("nguyen.van-a@school_01").is_ok());
        assert!(validate_principal_name("a+b=c,d").is_ok());
    }

    #[test]
    fn test_invalid_principal_names() {
        assert!(matches!(
            validate_principal_name(""),
            Err(IdentityError::InvalidName { .. })
        ));
        assert!(matches!(
            validate_principal_name("has space"),
            Err(IdentityError::InvalidName { .. })
        ));
        assert!(matches!(
            validate_principal_name("slash/name"),
            Err(IdentityError::InvalidName { .. })
        ));
        assert!(matches!(
            validate_principal_name(&"x".repeat(65)),
            Err(IdentityError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_access_key_debug_redacts_secret() {
        let pair = AccessKeyPair {
            key_id: "AKIAEXAMPLE".to_string(),
            secret: "super-secret".to_string(),
        };
        let debug = format!("{:?}", pair);
        assert!(debug.contains("AKIAEXAMPLE"));
        assert!(!debug.contains("super-secret"));
    }
}
