//! Operator CLI for uploader identities.
//!
//! ```text
//! iam-users createIAMUser <name>
//! iam-users deleteIAMUser <name>
//! iam-users listIAMGroups
//! iam-users identityStatus <name>
//! ```

use anyhow::{Context, Result};
use archive_service::clients::load_sdk_config;
use archive_service::logging::init_tracing;
use archive_service::provisioning::{
    DeprovisionOutcome, IdentityStatus, NamespaceStatus, ProvisionOutcome, Readiness,
};
use archive_service::{
    Config, IamIdentityService, IdentityDeprovisioner, IdentityInspector, IdentityProvisioner,
    S3ObjectStore,
};
use clap::{Parser, Subcommand};
use tracing::error;

#[derive(Parser)]
#[command(name = "iam-users", about = "Provision and remove uploader identities")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create principal, policy attachment, access key and namespace
    #[command(name = "createIAMUser")]
    Create { name: String },
    /// Revoke keys, detach policies, delete principal and namespace
    #[command(name = "deleteIAMUser")]
    Delete { name: String },
    /// List every principal
    #[command(name = "listIAMGroups")]
    List,
    /// Show which resources of an identity exist
    #[command(name = "identityStatus")]
    Status { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Invalid selectors exit here with usage on stderr
    let cli = Cli::parse();

    let config = Config::load().context("Failed to load configuration")?;
    init_tracing(&config.service);

    let sdk_config = load_sdk_config(&config.storage).await;
    let identity = IamIdentityService::new(&sdk_config);
    let store = S3ObjectStore::new(&sdk_config, &config.storage);

    let result = run(&cli.command, &config, &identity, &store).await;

    identity.close();
    store.close();

    if let Err(ref e) = result {
        error!(error = %format!("{:#}", e), "Identity operation failed");
    }
    result
}

async fn run(
    command: &Command,
    config: &Config,
    identity: &IamIdentityService,
    store: &S3ObjectStore,
) -> Result<()> {
    match command {
        Command::Create { name } => {
            let policy_arn = config.policy_arn()?;
            let provisioner = IdentityProvisioner::new(identity, store, policy_arn);
            match provisioner.provision(name).await? {
                ProvisionOutcome::Created(created) => {
                    if created.namespace == NamespaceStatus::AlreadyExists {
                        println!("Folder {} already exists, left untouched.", created.namespace_prefix);
                    } else {
                        println!("Created folder {}", created.namespace_prefix);
                    }
                    println!(
                        "IAM user \"{}\" created, policy attached and access key issued.",
                        created.principal.name
                    );
                    let credentials = serde_json::json!({
                        "accessKey": created.access_key.key_id,
                        "accessSecret": created.access_key.secret,
                    });
                    println!("Access Key: {}", serde_json::to_string_pretty(&credentials)?);
                }
                ProvisionOutcome::AlreadyExists { namespace_exists } => {
                    println!("IAM user \"{}\" already exists. Nothing created.", name);
                    if namespace_exists {
                        println!("Folder {}/ already exists.", name);
                    } else {
                        println!("Folder {}/ is missing; run identityStatus for details.", name);
                    }
                }
            }
        }
        Command::Delete { name } => {
            let deprovisioner = IdentityDeprovisioner::new(identity, store);
            match deprovisioner.deprovision(name).await? {
                DeprovisionOutcome::Removed {
                    revoked_keys,
                    detached_policies,
                } => {
                    for key_id in &revoked_keys {
                        println!("Access key \"{}\" revoked.", key_id);
                    }
                    for arn in &detached_policies {
                        println!("Policy \"{}\" detached.", arn);
                    }
                    println!("Folder \"{}/\" deleted.", name);
                    println!("IAM user \"{}\" deleted.", name);
                }
                DeprovisionOutcome::NotFound => {
                    println!("IAM user \"{}\" does not exist. Nothing deleted.", name);
                }
            }
        }
        Command::List => {
            let inspector = IdentityInspector::new(identity, store);
            let principals = inspector.list_principals().await?;
            if principals.is_empty() {
                println!("No IAM users.");
            }
            for principal in principals {
                println!("User Name: {}", principal.name);
                println!("User ID: {}", principal.id);
                println!("Arn: {}", principal.arn);
                println!("--------------------");
            }
        }
        Command::Status { name } => {
            let inspector = IdentityInspector::new(identity, store);
            let status = inspector.status(name).await?;
            println!("Principal: {}", if status.principal_exists { "present" } else { "absent" });
            println!("Policies: {}", status.attached_policy_arns.join(", "));
            println!("Access keys: {}", status.access_key_ids.join(", "));
            println!("Namespace: {}", if status.namespace_exists { "present" } else { "absent" });

            println!("{}", readiness_line(&status, config.policy_arn().ok()));
        }
    }
    Ok(())
}

fn readiness_line(status: &IdentityStatus, policy_arn: Option<&str>) -> String {
    let Some(policy_arn) = policy_arn else {
        return "Status: unknown (identity.policy_arn is not configured)".to_string();
    };
    match status.readiness(policy_arn) {
        Readiness::Ready => "Status: ready".to_string(),
        Readiness::Absent => "Status: absent".to_string(),
        Readiness::Partial { missing } => format!("Status: partial (missing {})", missing.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_original_selectors() {
        let cli = Cli::try_parse_from(["iam-users", "createIAMUser", "TeacherA"]).unwrap();
        assert!(matches!(cli.command, Command::Create { ref name } if name == "TeacherA"));

        let cli = Cli::try_parse_from(["iam-users", "deleteIAMUser", "TeacherA"]).unwrap();
        assert!(matches!(cli.command, Command::Delete { .. }));

        let cli = Cli::try_parse_from(["iam-users", "listIAMGroups"]).unwrap();
        assert!(matches!(cli.command, Command::List));
    }

    fn complete_status() -> IdentityStatus {
        IdentityStatus {
            name: "TeacherA".to_string(),
            principal_exists: true,
            attached_policy_arns: vec!["arn:aws:iam::123456789012:policy/upload".to_string()],
            access_key_ids: vec!["AKIAEXAMPLE".to_string()],
            namespace_exists: true,
        }
    }

    #[test]
    fn test_readiness_line_without_policy_is_unknown() {
        let line = readiness_line(&complete_status(), None);
        assert!(line.starts_with("Status: unknown"));
        assert!(!line.contains("missing"));
    }

    #[test]
    fn test_readiness_line_with_policy() {
        assert_eq!(
            readiness_line(&complete_status(), Some("arn:aws:iam::123456789012:policy/upload")),
            "Status: ready"
        );
        assert_eq!(
            readiness_line(&complete_status(), Some("arn:aws:iam::123456789012:policy/other")),
            "Status: partial (missing policy)"
        );
    }

    #[test]
    fn test_unknown_selector_is_usage_error() {
        assert!(Cli::try_parse_from(["iam-users", "function1"]).is_err());
        assert!(Cli::try_parse_from(["iam-users", "createIAMUser"]).is_err());
        assert!(Cli::try_parse_from(["iam-users"]).is_err());
    }
}
