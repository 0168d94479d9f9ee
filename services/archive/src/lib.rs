//! Archive Service
//!
//! Lifecycle automation for the lecture recording archive bucket.
//!
//! - **Relocation**: recordings uploaded into a teacher's intake folder are
//!   probed for their capture time, classified by the school's scheduling
//!   service, and moved under `ADMIN_RESULT/<owner>/<day>/<start>.mp4`.
//! - **Identity provisioning**: each uploader gets an IAM user, the upload
//!   policy, one access key and an intake folder, created and removed together.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────┐     ┌──────────────┐
//!  S3 bucket ───▶│ Relocation   │────▶│ Metadata     │──▶ ffprobe (public URL)
//!  (listing)     │ Engine       │     │ Extractor    │
//!                └──────────────┘     └──────────────┘
//!                  │    │    │
//!                  │    │    └──────▶ Classifier ──▶ HTTP form POST
//!                  │    ▼
//!                  │  Outcome log (logs/DD-MM-YYYY.txt)
//!                  ▼
//!             copy ─▶ delete
//!
//!  iam-users CLI ──▶ Provisioner / Deprovisioner / Inspector ──▶ IAM + S3
//! ```

pub mod classifier;
pub mod clients;
pub mod config;
pub mod identity;
pub mod logging;
pub mod metadata;
pub mod naming;
pub mod outcome_log;
pub mod provisioning;
pub mod relocation;
pub mod storage;

pub use classifier::{ClassificationDecision, ClassificationError, Classifier, HttpClassifier};
pub use config::{Config, ConfigError};
pub use identity::{IamIdentityService, IdentityError, IdentityService};
pub use metadata::{FfprobeProber, MediaFileInfo, MetadataError, MetadataExtractor, MetadataProber};
pub use naming::{derive_names, DerivedNaming};
pub use outcome_log::OutcomeLog;
pub use provisioning::{
    IdentityDeprovisioner, IdentityInspector, IdentityProvisioner, PartialStateError,
    ProvisionError,
};
pub use relocation::{BatchSummary, RelocationEngine, RelocationOutcome, RelocationSettings};
pub use storage::{ObjectStore, S3ObjectStore, StorageError, StorageObject};
