//! Per-user principal, credential and namespace lifecycle.
//!
//! Provisioning and teardown never roll back completed steps. A failure after
//! the first mutating step is reported as a [`PartialStateError`] naming what
//! was done, and [`IdentityInspector::status`] shows what is left.

use crate::identity::{
    validate_principal_name, AccessKeyPair, IdentityError, IdentityService, Principal,
};
use crate::storage::{ObjectStore, StorageError};
use std::fmt;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Individual mutating steps of the identity workflows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityStep {
    CreatePrincipal,
    AttachPolicy,
    IssueAccessKey,
    CreateNamespace,
    RevokeAccessKeys,
    DetachPolicies,
    DeletePrincipal,
    DeleteNamespace,
}

impl fmt::Display for IdentityStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdentityStep::CreatePrincipal => "create principal",
            IdentityStep::AttachPolicy => "attach policy",
            IdentityStep::IssueAccessKey => "issue access key",
            IdentityStep::CreateNamespace => "create namespace",
            IdentityStep::RevokeAccessKeys => "revoke access keys",
            IdentityStep::DetachPolicies => "detach policies",
            IdentityStep::DeletePrincipal => "delete principal",
            IdentityStep::DeleteNamespace => "delete namespace",
        };
        f.write_str(name)
    }
}

/// Root cause of a failed step
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A workflow stopped after some of its steps had already taken effect
#[derive(Error, Debug)]
#[error("{name}: {failed} failed after [{steps}] completed: {source}", steps = join_steps(.completed))]
pub struct PartialStateError {
    pub name: String,
    pub completed: Vec<IdentityStep>,
    pub failed: IdentityStep,
    #[source]
    pub source: StepError,
}

fn join_steps(steps: &[IdentityStep]) -> String {
    steps
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    PartialState(#[from] PartialStateError),
}

/// Storage prefix owned by a principal
pub fn namespace_prefix(name: &str) -> String {
    format!("{}/", name)
}

/// Whether a namespace marker was written or found in place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceStatus {
    Created,
    AlreadyExists,
}

/// A fully provisioned identity. The secret in `access_key` is not stored anywhere else.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub principal: Principal,
    pub policy_arn: String,
    pub access_key: AccessKeyPair,
    pub namespace_prefix: String,
    pub namespace: NamespaceStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionOutcome {
    Created(Identity),
    /// The principal existed already; nothing was created
    AlreadyExists { namespace_exists: bool },
}

/// Creates principal, policy attachment, access key and namespace
pub struct IdentityProvisioner<'a> {
    identity: &'a dyn IdentityService,
    store: &'a dyn ObjectStore,
    policy_arn: String,
}

impl<'a> IdentityProvisioner<'a> {
    pub fn new(
        identity: &'a dyn IdentityService,
        store: &'a dyn ObjectStore,
        policy_arn: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            store,
            policy_arn: policy_arn.into(),
        }
    }

    #[instrument(skip(self))]
    pub async fn provision(&self, name: &str) -> Result<ProvisionOutcome, ProvisionError> {
        validate_principal_name(name)?;
        let prefix = namespace_prefix(name);

        if principal_exists(self.identity, name).await? {
            let namespace_exists = self.store.exists(&prefix).await?;
            info!(namespace_exists, "Principal already exists, nothing created");
            return Ok(ProvisionOutcome::AlreadyExists { namespace_exists });
        }

        let principal = self.identity.create_principal(name).await?;
        info!(arn = %principal.arn, "Principal created");

        let mut completed = vec![IdentityStep::CreatePrincipal];
        let partial = |completed: &[IdentityStep], failed, source: StepError| PartialStateError {
            name: name.to_string(),
            completed: completed.to_vec(),
            failed,
            source,
        };

        if let Err(e) = self.identity.attach_policy(name, &self.policy_arn).await {
            return Err(partial(&completed, IdentityStep::AttachPolicy, e.into()).into());
        }
        completed.push(IdentityStep::AttachPolicy);
        info!(policy_arn = %self.policy_arn, "Policy attached");

        let access_key = match self.identity.create_access_key(name).await {
            Ok(key) => key,
            Err(e) => return Err(partial(&completed, IdentityStep::IssueAccessKey, e.into()).into()),
        };
        completed.push(IdentityStep::IssueAccessKey);
        info!(access_key_id = %access_key.key_id, "Access key issued");

        let namespace = match self.ensure_namespace(&prefix).await {
            Ok(status) => status,
            Err(e) => {
                return Err(partial(&completed, IdentityStep::CreateNamespace, e.into()).into())
            }
        };

        Ok(ProvisionOutcome::Created(Identity {
            principal,
            policy_arn: self.policy_arn.clone(),
            access_key,
            namespace_prefix: prefix,
            namespace,
        }))
    }

    async fn ensure_namespace(&self, prefix: &str) -> Result<NamespaceStatus, StorageError> {
        if self.store.exists(prefix).await? {
            info!(prefix = %prefix, "Namespace already exists");
            return Ok(NamespaceStatus::AlreadyExists);
        }
        self.store.put_empty(prefix).await?;
        info!(prefix = %prefix, "Namespace created");
        Ok(NamespaceStatus::Created)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeprovisionOutcome {
    Removed {
        revoked_keys: Vec<String>,
        detached_policies: Vec<String>,
    },
    /// No principal with that name; nothing touched
    NotFound,
}

/// Tears an identity down in the order the identity service requires
pub struct IdentityDeprovisioner<'a> {
    identity: &'a dyn IdentityService,
    store: &'a dyn ObjectStore,
}

impl<'a> IdentityDeprovisioner<'a> {
    pub fn new(identity: &'a dyn IdentityService, store: &'a dyn ObjectStore) -> Self {
        Self { identity, store }
    }

    /// Revoke keys, detach policies, delete the principal, then delete the
    /// namespace marker.
    #[instrument(skip(self))]
    pub async fn deprovision(&self, name: &str) -> Result<DeprovisionOutcome, ProvisionError> {
        validate_principal_name(name)?;

        if !principal_exists(self.identity, name).await? {
            info!("Principal does not exist, nothing removed");
            return Ok(DeprovisionOutcome::NotFound);
        }

        let mut completed: Vec<IdentityStep> = Vec::new();
        let partial = |completed: &[IdentityStep], failed, source: StepError| PartialStateError {
            name: name.to_string(),
            completed: completed.to_vec(),
            failed,
            source,
        };

        let revoked_keys = match self.revoke_keys(name).await {
            Ok(keys) => keys,
            Err(e) if e.revoked.is_empty() => {
                return Err(ProvisionError::Identity(e.source))
            }
            Err(e) => {
                return Err(partial(&completed, IdentityStep::RevokeAccessKeys, e.source.into()).into())
            }
        };
        completed.push(IdentityStep::RevokeAccessKeys);

        let detached_policies = match self.detach_policies(name).await {
            Ok(arns) => arns,
            Err(e) => {
                return Err(partial(&completed, IdentityStep::DetachPolicies, e.into()).into())
            }
        };
        completed.push(IdentityStep::DetachPolicies);

        if let Err(e) = self.identity.delete_principal(name).await {
            return Err(partial(&completed, IdentityStep::DeletePrincipal, e.into()).into());
        }
        completed.push(IdentityStep::DeletePrincipal);
        info!("Principal deleted");

        let prefix = namespace_prefix(name);
        if let Err(e) = self.store.delete(&prefix).await {
            warn!(prefix = %prefix, error = %e, "Namespace delete failed after principal removal");
            return Err(partial(&completed, IdentityStep::DeleteNamespace, e.into()).into());
        }
        info!(prefix = %prefix, "Namespace deleted");

        Ok(DeprovisionOutcome::Removed {
            revoked_keys,
            detached_policies,
        })
    }

    async fn revoke_keys(&self, name: &str) -> Result<Vec<String>, RevokeError> {
        let key_ids = self
            .identity
            .list_access_keys(name)
            .await
            .map_err(|source| RevokeError {
                revoked: Vec::new(),
                source,
            })?;

        let mut revoked = Vec::with_capacity(key_ids.len());
        for key_id in key_ids {
            if let Err(source) = self.identity.delete_access_key(name, &key_id).await {
                return Err(RevokeError { revoked, source });
            }
            info!(access_key_id = %key_id, "Access key revoked");
            revoked.push(key_id);
        }
        Ok(revoked)
    }

    async fn detach_policies(&self, name: &str) -> Result<Vec<String>, IdentityError> {
        let policies = self.identity.list_attached_policies(name).await?;

        let mut detached = Vec::with_capacity(policies.len());
        for policy in policies {
            self.identity.detach_policy(name, &policy.arn).await?;
            info!(policy = %policy.name, "Policy detached");
            detached.push(policy.arn);
        }
        Ok(detached)
    }
}

struct RevokeError {
    revoked: Vec<String>,
    source: IdentityError,
}

/// Readiness of an identity as seen by [`IdentityInspector::status`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Absent,
    Ready,
    Partial { missing: Vec<&'static str> },
}

/// Observed state of every resource belonging to one identity
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityStatus {
    pub name: String,
    pub principal_exists: bool,
    pub attached_policy_arns: Vec<String>,
    pub access_key_ids: Vec<String>,
    pub namespace_exists: bool,
}

impl IdentityStatus {
    pub fn readiness(&self, required_policy_arn: &str) -> Readiness {
        if !self.principal_exists && !self.namespace_exists {
            return Readiness::Absent;
        }

        let mut missing = Vec::new();
        if !self.principal_exists {
            missing.push("principal");
        }
        if !self.attached_policy_arns.iter().any(|arn| arn == required_policy_arn) {
            missing.push("policy");
        }
        if self.access_key_ids.is_empty() {
            missing.push("access key");
        }
        if !self.namespace_exists {
            missing.push("namespace");
        }

        if missing.is_empty() {
            Readiness::Ready
        } else {
            Readiness::Partial { missing }
        }
    }
}

/// Read-only queries over principals and namespaces
pub struct IdentityInspector<'a> {
    identity: &'a dyn IdentityService,
    store: &'a dyn ObjectStore,
}

impl<'a> IdentityInspector<'a> {
    pub fn new(identity: &'a dyn IdentityService, store: &'a dyn ObjectStore) -> Self {
        Self { identity, store }
    }

    pub async fn list_principals(&self) -> Result<Vec<Principal>, IdentityError> {
        self.identity.list_principals().await
    }

    #[instrument(skip(self))]
    pub async fn status(&self, name: &str) -> Result<IdentityStatus, ProvisionError> {
        validate_principal_name(name)?;

        let principal_exists = principal_exists(self.identity, name).await?;
        let (attached_policy_arns, access_key_ids) = if principal_exists {
            let policies = self.identity.list_attached_policies(name).await?;
            let keys = self.identity.list_access_keys(name).await?;
            (policies.into_iter().map(|p| p.arn).collect(), keys)
        } else {
            (Vec::new(), Vec::new())
        };
        let namespace_exists = self.store.exists(&namespace_prefix(name)).await?;

        Ok(IdentityStatus {
            name: name.to_string(),
            principal_exists,
            attached_policy_arns,
            access_key_ids,
            namespace_exists,
        })
    }
}

async fn principal_exists(identity: &dyn IdentityService, name: &str) -> Result<bool, IdentityError> {
    Ok(identity
        .list_principals()
        .await?
        .iter()
        .any(|principal| principal.name == name))
}
