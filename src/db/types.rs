use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "examstatus", rename_all = "lowercase")]
pub(crate) enum ExamStatus {
    Draft,
    Published,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "questiontype", rename_all = "snake_case")]
pub(crate) enum QuestionType {
    Mcq,
    Viva,
    Interview,
    ShortAnswer,
    LongAnswer,
}

impl QuestionType {
    pub(crate) fn is_mcq(self) -> bool {
        matches!(self, Self::Mcq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "audiostatus", rename_all = "lowercase")]
pub(crate) enum AudioStatus {
    Pending,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "rubricstatus", rename_all = "lowercase")]
pub(crate) enum RubricStatus {
    Pending,
    Done,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attemptstatus", rename_all = "snake_case")]
pub(crate) enum AttemptStatus {
    InProgress,
    Submitted,
    Transcribed,
    Evaluated,
    Expired,
}

impl AttemptStatus {
    /// Statuses an attempt may move to `self` from. Re-applying the current status is allowed.
    pub(crate) fn predecessors(self) -> &'static [AttemptStatus] {
        match self {
            Self::InProgress => &[Self::InProgress],
            Self::Submitted => &[Self::InProgress, Self::Submitted],
            Self::Transcribed => &[Self::Submitted, Self::Transcribed],
            Self::Evaluated => &[Self::Submitted, Self::Transcribed, Self::Evaluated],
            Self::Expired => &[Self::InProgress, Self::Expired],
        }
    }

    pub(crate) fn can_advance_to(self, target: AttemptStatus) -> bool {
        target.predecessors().contains(&self)
    }
}

/// Per-answer progress of one pipeline stage (transcription or evaluation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "stagestatus", rename_all = "lowercase")]
pub(crate) enum StageStatus {
    Pending,
    Completed,
    Failed,
    Skipped,
}
