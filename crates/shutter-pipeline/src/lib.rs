//! Shutter Pipeline Library
//!
//! Drives upload items through their state machine: validation and
//! deduplication on submit, off-thread compression, brokered credentials,
//! bounded concurrent transfers with retries, durable progress and a single
//! batch commit.
//!
//! A pipeline is constructed explicitly per session with [`UploadPipeline::open`]
//! and shared by reference (`Arc`) between the task running it and the tasks
//! pausing, cancelling or observing it.

pub mod broker;
pub mod commit;
pub mod orchestrator;
pub mod state;
pub mod summary;

pub use broker::CredentialBroker;
pub use commit::BatchResult;
pub use orchestrator::{PipelineDeps, SourceFile, SubmitReport, UploadPipeline};
pub use state::RecoveryPolicy;
pub use summary::{BatchOutcome, BatchSummary};
