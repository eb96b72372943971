mod parsing;
mod settings;
mod types;

pub(crate) use types::{
    ConfigError, EnrichmentSettings, Environment, QueueBackend, QueueSettings, Settings,
    SubmissionSettings,
};
