use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    metrics::describe_counter!("jobs_total", "Jobs finished per queue, labelled by outcome");
    metrics::describe_histogram!("job_duration_seconds", "Wall time spent inside job handlers");
    metrics::describe_counter!("enrichment_audio_total", "Question audio synthesis outcomes");
    metrics::describe_counter!("enrichment_rubric_total", "Question rubric generation outcomes");
    metrics::describe_counter!("answers_transcribed_total", "Per-answer transcription outcomes");
    metrics::describe_counter!("answers_evaluated_total", "Per-answer evaluation outcomes");
    metrics::describe_counter!("publish_rejected_total", "Publish attempts blocked by the gate");
    metrics::describe_counter!("attempts_expired_total", "Attempts flipped to expired");
    metrics::describe_counter!("stalled_jobs_requeued_total", "Claimed jobs returned to the queue");
}
