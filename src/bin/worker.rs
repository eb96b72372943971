#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = exam_pipeline::run_worker().await {
        eprintln!("exam-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
