use anyhow::{Context, Result};
use archive_service::clients::load_sdk_config;
use archive_service::logging::init_tracing;
use archive_service::{
    BatchSummary, Config, FfprobeProber, HttpClassifier, MetadataExtractor, OutcomeLog,
    RelocationEngine, RelocationSettings, S3ObjectStore,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service);

    info!(
        service = %config.service.name,
        bucket = %config.storage.bucket,
        "Starting relocation batch"
    );

    let target_zone = config.target_timezone()?;
    let source_zone = config.assumed_source_timezone()?;

    let sdk_config = load_sdk_config(&config.storage).await;
    let store = S3ObjectStore::new(&sdk_config, &config.storage);

    let prober = FfprobeProber::new(config.relocation.ffprobe_path.clone());
    let classifier = HttpClassifier::new(&config.classification);
    let log = OutcomeLog::new(&config.relocation.log_dir, target_zone);

    let settings = RelocationSettings {
        processed_root: config.relocation.processed_root.clone(),
        media_extension: config.relocation.media_extension.clone(),
        public_base_url: config.storage.public_base_url(),
        target_zone,
    };

    let result = {
        let engine = RelocationEngine::new(
            &store,
            MetadataExtractor::new(&prober, source_zone),
            &classifier,
            &log,
            settings,
        );
        engine.run().await
    };

    // Release the client whatever the batch result was
    store.close();

    match result {
        Ok(outcomes) => {
            let summary = BatchSummary::from_outcomes(&outcomes);
            info!(
                processed = summary.total(),
                relocated = summary.relocated,
                rejected = summary.rejected,
                failed = summary.failed,
                duplicated = summary.duplicated,
                log_dir = %log.dir().display(),
                "Relocation batch complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Relocation batch aborted");
            Err(e).context("Failed to list intake recordings")
        }
    }
}
