use crate::cli::ResumeArgs;
use crate::state::Checkpoint;
use tracing::info;

use super::session::{build_orchestrator, drive};

pub async fn execute(args: ResumeArgs) -> anyhow::Result<()> {
    let config = args.service.load_config()?;
    let checkpoint = Checkpoint::load(&args.checkpoint)?;

    info!(
        "Loaded checkpoint for run {}: {} of {} tasks remaining",
        checkpoint.graph.run_id,
        checkpoint.remaining(),
        checkpoint.graph.len()
    );

    let orchestrator = build_orchestrator(&config)?;
    let question = checkpoint.question.clone();
    let graph = checkpoint.graph.clone();
    let completed = checkpoint.completed.clone();

    let (orchestrator, q) = (&orchestrator, &question);
    drive(
        &config,
        args.service.events,
        &question,
        Some((checkpoint, args.checkpoint.clone())),
        |tx, token| async move { orchestrator.resume(graph, completed, q, Some(tx), &token).await },
    )
    .await
}
