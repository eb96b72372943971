#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = exam_pipeline::run().await {
        eprintln!("exam-pipeline fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
