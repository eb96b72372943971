pub(crate) mod enrichment;
pub(crate) mod evaluation;
pub(crate) mod queue;
pub(crate) mod scheduler;
pub(crate) mod transcription;
pub(crate) mod worker;

use serde::{Deserialize, Serialize};

/// Payload shared by the transcription and evaluation stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct AttemptJob {
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_id: String,
}
