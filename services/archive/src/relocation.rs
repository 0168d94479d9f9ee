//! Relocation of intake recordings into the processed-results hierarchy.
//!
//! Each eligible object walks a fixed sequence of states:
//!
//! ```text
//! Listed ─▶ VisibilityEnsured ─▶ MetadataExtracted ─▶ Classified ─┬─▶ Relocated
//!    │              │                     │                       ├─▶ Rejected
//!    └──────────────┴─────────────────────┴───────────────────────┴─▶ Failed / Duplicated
//! ```
//!
//! The source object is only deleted after its copy to the destination key
//! succeeded. A failed delete leaves the recording in both places.

use crate::classifier::{ClassificationDecision, Classifier};
use crate::metadata::MetadataExtractor;
use crate::naming::{derive_names, sanitize_start_time, RECORDING_EXTENSION};
use crate::outcome_log::OutcomeLog;
use crate::storage::{public_url, ObjectStore, StorageError, StorageObject};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fmt;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Last state an object reached before its terminal outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationState {
    Listed,
    VisibilityEnsured,
    MetadataExtracted,
    Classified,
}

impl fmt::Display for RelocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelocationState::Listed => "listed",
            RelocationState::VisibilityEnsured => "visibility-ensured",
            RelocationState::MetadataExtracted => "metadata-extracted",
            RelocationState::Classified => "classified",
        };
        f.write_str(name)
    }
}

/// Terminal result for one object
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeKind {
    /// Copied to the destination and removed from intake
    Relocated {
        derived_file_name: String,
        owner_folder: String,
        canonical_start_time: String,
        classification_payload: String,
    },
    /// The classification service declined the recording
    Rejected { reason: String },
    /// A step failed; the source is where it was
    Failed {
        reached: RelocationState,
        error: String,
    },
    /// Copy succeeded but the source could not be deleted
    Duplicated { error: String },
}

/// Append-only record of one relocation attempt
#[derive(Debug, Clone, PartialEq)]
pub struct RelocationOutcome {
    pub run_id: Uuid,
    pub source_key: String,
    pub destination_key: Option<String>,
    pub kind: OutcomeKind,
    pub timestamp: DateTime<Utc>,
}

impl RelocationOutcome {
    /// Free-text body written to the outcome log
    pub fn log_body(&self) -> String {
        match &self.kind {
            OutcomeKind::Relocated {
                derived_file_name,
                owner_folder,
                canonical_start_time,
                classification_payload,
            } => format!(
                "Change file {} to {} with public\nDerived name: {}\nOwner: {}\nStart: {}\nData: {}\nRun: {}",
                self.source_key,
                self.destination_key.as_deref().unwrap_or_default(),
                derived_file_name,
                owner_folder,
                canonical_start_time,
                classification_payload,
                self.run_id
            ),
            OutcomeKind::Rejected { reason } => format!(
                "Rejected {}\nData: {}\nRun: {}",
                self.source_key, reason, self.run_id
            ),
            OutcomeKind::Failed { reached, error } => format!(
                "Error {}\nReached: {}\nCause: {}\nRun: {}",
                self.source_key, reached, error, self.run_id
            ),
            OutcomeKind::Duplicated { error } => format!(
                "Duplicated {} at {} (source delete failed)\nCause: {}\nRun: {}",
                self.source_key,
                self.destination_key.as_deref().unwrap_or_default(),
                error,
                self.run_id
            ),
        }
    }
}

/// Counts per outcome kind for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub relocated: usize,
    pub rejected: usize,
    pub failed: usize,
    pub duplicated: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[RelocationOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut summary, outcome| {
            match outcome.kind {
                OutcomeKind::Relocated { .. } => summary.relocated += 1,
                OutcomeKind::Rejected { .. } => summary.rejected += 1,
                OutcomeKind::Failed { .. } => summary.failed += 1,
                OutcomeKind::Duplicated { .. } => summary.duplicated += 1,
            }
            summary
        })
    }

    pub fn total(&self) -> usize {
        self.relocated + self.rejected + self.failed + self.duplicated
    }
}

/// Static settings for a relocation run
#[derive(Debug, Clone)]
pub struct RelocationSettings {
    pub processed_root: String,
    pub media_extension: String,
    pub public_base_url: String,
    pub target_zone: Tz,
}

impl RelocationSettings {
    /// Media objects outside the processed-results root
    pub fn is_eligible(&self, key: &str) -> bool {
        let root = format!("{}/", self.processed_root.trim_end_matches('/'));
        key.ends_with(&self.media_extension) && !key.starts_with(&root)
    }

    /// `<root>/<owner>/<date folder>/<sanitized start>.mp4`
    pub fn destination_key(&self, owner_folder: &str, date_folder: &str, start_time: &str) -> String {
        format!(
            "{}/{}/{}/{}{}",
            self.processed_root.trim_end_matches('/'),
            owner_folder.trim(),
            date_folder,
            sanitize_start_time(start_time),
            RECORDING_EXTENSION
        )
    }
}

/// First path segment of the intake key, trimmed
pub fn owner_candidate(key: &str) -> &str {
    key.split('/').next().unwrap_or(key).trim()
}

struct Failure {
    reached: RelocationState,
    error: String,
}

impl Failure {
    fn at(reached: RelocationState, error: impl fmt::Display) -> Self {
        Self {
            reached,
            error: error.to_string(),
        }
    }
}

/// Drives every eligible object through the relocation states, one at a time
pub struct RelocationEngine<'a> {
    store: &'a dyn ObjectStore,
    extractor: MetadataExtractor<'a>,
    classifier: &'a dyn Classifier,
    log: &'a OutcomeLog,
    settings: RelocationSettings,
    run_id: Uuid,
}

impl<'a> RelocationEngine<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        extractor: MetadataExtractor<'a>,
        classifier: &'a dyn Classifier,
        log: &'a OutcomeLog,
        settings: RelocationSettings,
    ) -> Self {
        Self {
            store,
            extractor,
            classifier,
            log,
            settings,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// List the bucket and process every eligible object in listing order.
    ///
    /// Only a listing failure aborts; per-object failures become outcomes.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub async fn run(&self) -> Result<Vec<RelocationOutcome>, StorageError> {
        let listing = self.store.list("").await?;
        let eligible: Vec<StorageObject> = listing
            .into_iter()
            .filter(|object| self.settings.is_eligible(&object.key))
            .collect();

        info!(eligible = eligible.len(), "Starting relocation batch");

        let mut outcomes = Vec::with_capacity(eligible.len());
        for object in &eligible {
            let outcome = self.process(object).await;
            self.record(&outcome).await;
            outcomes.push(outcome);
        }

        let summary = BatchSummary::from_outcomes(&outcomes);
        info!(
            relocated = summary.relocated,
            rejected = summary.rejected,
            failed = summary.failed,
            duplicated = summary.duplicated,
            "Relocation batch finished"
        );

        Ok(outcomes)
    }

    /// Run one object to a terminal outcome
    #[instrument(skip(self, object), fields(key = %object.key))]
    pub async fn process(&self, object: &StorageObject) -> RelocationOutcome {
        let (destination_key, kind) = match self.advance(&object.key).await {
            Ok((destination, kind)) => (destination, kind),
            Err(failure) => {
                warn!(reached = %failure.reached, error = %failure.error, "Relocation failed");
                (
                    None,
                    OutcomeKind::Failed {
                        reached: failure.reached,
                        error: failure.error,
                    },
                )
            }
        };

        RelocationOutcome {
            run_id: self.run_id,
            source_key: object.key.clone(),
            destination_key,
            kind,
            timestamp: Utc::now(),
        }
    }

    async fn advance(&self, key: &str) -> Result<(Option<String>, OutcomeKind), Failure> {
        let mut state = RelocationState::Listed;

        self.store
            .set_public_read(key)
            .await
            .map_err(|e| Failure::at(state, e))?;
        state = RelocationState::VisibilityEnsured;

        let locator = public_url(&self.settings.public_base_url, key);
        let info = self
            .extractor
            .extract(&locator)
            .await
            .map_err(|e| Failure::at(state, e))?;
        state = RelocationState::MetadataExtracted;

        let naming = derive_names(&info, self.settings.target_zone);
        debug!(
            file_name = %naming.file_name,
            date_folder = %naming.date_folder,
            duration_minutes = ?info.duration_minutes(),
            "Names derived"
        );

        let decision = self
            .classifier
            .classify(owner_candidate(key), naming.start_label())
            .await
            .map_err(|e| Failure::at(state, e))?;
        state = RelocationState::Classified;

        let (owner_folder, canonical_start_time, classification_payload) = match decision {
            ClassificationDecision::Rejected { reason } => {
                info!(reason = %reason, "Recording rejected by classification service");
                return Ok((None, OutcomeKind::Rejected { reason }));
            }
            ClassificationDecision::Accepted {
                owner_folder,
                canonical_start_time,
                payload,
            } => (owner_folder, canonical_start_time, payload),
        };

        let destination = self.settings.destination_key(
            &owner_folder,
            &naming.date_folder,
            &canonical_start_time,
        );

        self.store
            .copy_public(key, &destination)
            .await
            .map_err(|e| Failure::at(state, e))?;

        if let Err(e) = self.store.delete(key).await {
            error!(destination = %destination, error = %e, "Source delete failed after copy");
            return Ok((Some(destination), OutcomeKind::Duplicated { error: e.to_string() }));
        }

        info!(destination = %destination, "Recording relocated");
        Ok((
            Some(destination),
            OutcomeKind::Relocated {
                derived_file_name: naming.file_name,
                owner_folder,
                canonical_start_time,
                classification_payload,
            },
        ))
    }

    async fn record(&self, outcome: &RelocationOutcome) {
        if let Err(e) = self.log.append(outcome.timestamp, &outcome.log_body()).await {
            error!(
                key = %outcome.source_key,
                error = %e,
                "Failed to write outcome record"
            );
        }
    }
}
