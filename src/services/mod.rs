pub(crate) mod answer_evaluation;
pub(crate) mod attempts;
pub(crate) mod errors;
pub(crate) mod publishing;
pub(crate) mod results;
pub(crate) mod speech_synthesis;
pub(crate) mod speech_to_text;
pub(crate) mod storage;
