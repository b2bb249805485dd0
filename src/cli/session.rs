use crate::config::{Config, Provider};
use crate::error::ExecutionCancelled;
use crate::output::write_report;
use crate::provider::create_backend;
use crate::reasoning::ReasoningClient;
use crate::research::{
    ExecutionStatus, ExecutionUpdate, Orchestrator, ProgressSender, ResearchQuestion,
    ResearchReport,
};
use crate::state::Checkpoint;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit status used when the user interrupts a run
pub const EXIT_CANCELLED: i32 = 130;

pub fn build_orchestrator(config: &Config) -> anyhow::Result<Orchestrator> {
    if config.provider == Provider::Gemini {
        let key_env = &config.providers.gemini.api_key_env;
        if std::env::var(key_env).map_or(true, |k| k.trim().is_empty()) {
            warn!(
                "{} is not set; every stage will fall back to its offline output",
                key_env
            );
        }
    }

    let client = Arc::new(ReasoningClient::new(
        create_backend(config)?,
        config.retry.clone(),
        config.concurrency,
    ));
    info!(
        "Using {} backend with concurrency {}",
        client.backend_name(),
        config.concurrency
    );
    Ok(Orchestrator::new(
        client,
        config.stages.clone(),
        config.concurrency,
    ))
}

/// Consumes progress updates: prints them and keeps the checkpoint current
struct ProgressSink {
    events: bool,
    question: ResearchQuestion,
    state_dir: PathBuf,
    checkpoint: Option<(Checkpoint, PathBuf)>,
    status: ExecutionStatus,
}

impl ProgressSink {
    fn handle(&mut self, update: ExecutionUpdate) {
        self.status = update.status;
        if self.events {
            match serde_json::to_string(&update) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize progress event: {}", e),
            }
        } else if update.status != ExecutionStatus::Complete {
            eprintln!("[{:>3.0}%] {}", update.progress * 100.0, update.message);
        }

        if let Some(graph) = &update.task_graph {
            if self.checkpoint.is_none() {
                let checkpoint = Checkpoint::new(self.question.clone(), graph.clone());
                let path = match checkpoint.save(&self.state_dir) {
                    Ok(path) => {
                        info!("Checkpoint written to {}", path.display());
                        path
                    }
                    Err(e) => {
                        warn!("Failed to save checkpoint: {}", e);
                        Checkpoint::path_for(&self.state_dir, &graph.run_id)
                    }
                };
                self.checkpoint = Some((checkpoint, path));
            }
        }

        if let Some(result) = update.partial_result {
            if let Some((checkpoint, _)) = &mut self.checkpoint {
                checkpoint.record_result(result);
                self.persist();
            }
        }
    }

    fn persist(&self) {
        if let Some((checkpoint, path)) = &self.checkpoint {
            if let Err(e) = checkpoint.save_to(path) {
                warn!("Failed to save checkpoint: {}", e);
            }
        }
    }
}

/// Run one orchestrator call with Ctrl-C handling, progress output and
/// checkpointing, then write the report.
///
/// `resume_from` seeds the checkpoint when continuing an earlier run.
pub async fn drive<F, Fut>(
    config: &Config,
    events: bool,
    question: &ResearchQuestion,
    resume_from: Option<(Checkpoint, PathBuf)>,
    start: F,
) -> anyhow::Result<()>
where
    F: FnOnce(ProgressSender, CancellationToken) -> Fut,
    Fut: Future<Output = Result<ResearchReport, ExecutionCancelled>>,
{
    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling...");
            interrupt.cancel();
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut sink = ProgressSink {
        events,
        question: question.clone(),
        state_dir: config.state_dir.clone(),
        checkpoint: resume_from,
        status: ExecutionStatus::default(),
    };
    let consumer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            sink.handle(update);
        }
        (sink.checkpoint.map(|(_, path)| path), sink.status)
    });

    let outcome = start(tx, token).await;
    let (checkpoint_path, last_status) = consumer.await.unwrap_or_else(|e| {
        warn!("Progress consumer failed: {}", e);
        (None, ExecutionStatus::default())
    });

    match outcome {
        Ok(report) => {
            let md_path = write_report(&config.report_dir, &report)?;
            info!(
                "Report {} written (confidence {:.1}%)",
                report.run_id,
                report.confidence * 100.0
            );
            println!("{}", md_path.display());
            Ok(())
        }
        Err(ExecutionCancelled) => {
            info!("Run cancelled while {}", last_status);
            eprintln!("cancelled");
            if let Some(path) = checkpoint_path {
                eprintln!("Resume with: axiom resume {}", path.display());
            }
            std::process::exit(EXIT_CANCELLED);
        }
    }
}
