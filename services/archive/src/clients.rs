use crate::config::StorageConfig;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_s3::config::Credentials;
use aws_types::region::Region;
use tracing::debug;

/// Load the shared AWS configuration used by both the S3 and IAM clients.
///
/// Static keys from configuration take precedence; without them the default
/// provider chain (environment, profile, instance role) is used.
pub async fn load_sdk_config(config: &StorageConfig) -> SdkConfig {
    let loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()));

    match (&config.access_key_id, &config.secret_access_key) {
        (Some(access_key), Some(secret_key)) => {
            debug!("Using static credentials from configuration");
            let credentials = Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "StaticCredentialsProvider",
            );
            loader.credentials_provider(credentials).load().await
        }
        _ => loader.load().await,
    }
}
