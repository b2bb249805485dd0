use crate::config::StagesConfig;
use crate::error::{ExecutionCancelled, SchedulerError};
use crate::reasoning::ReasoningClient;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::decomposer::decompose;
use super::executor::TaskContext;
use super::progress::{
    execution_progress, ExecutionStatus, ExecutionUpdate, ProgressReporter, ProgressSender,
};
use super::scheduler::Scheduler;
use super::synthesizer::{escape_html, synthesize, SynthesisInput};
use super::types::{
    generate_run_id, ResearchQuestion, ResearchReport, Severity, SubagentResult, TaskGraph,
};
use super::validator::{detect_contradictions, validate};

const CRITICAL_NOTICE_PROGRESS: f64 = 0.8;
const VALIDATION_DONE_PROGRESS: f64 = 0.85;

/// Drives decompose, execute, validate and synthesize for one question at a time.
///
/// Holds only configuration and the shared client, so one orchestrator can
/// serve any number of sequential runs.
pub struct Orchestrator {
    client: Arc<ReasoningClient>,
    stages: StagesConfig,
    concurrency: usize,
}

impl Orchestrator {
    pub fn new(client: Arc<ReasoningClient>, stages: StagesConfig, concurrency: usize) -> Self {
        Self {
            client,
            stages,
            concurrency,
        }
    }

    /// Run the full pipeline.
    ///
    /// The only error is cancellation; every other failure is folded into a
    /// degraded report after an `error` update.
    pub async fn run(
        &self,
        question: &ResearchQuestion,
        progress: Option<ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<ResearchReport, ExecutionCancelled> {
        let started = Instant::now();
        let mut reporter = ProgressReporter::new(progress);

        check_cancelled(cancel)?;
        reporter.emit(ExecutionUpdate::new(
            ExecutionStatus::Decomposing,
            execution_progress(ExecutionStatus::Decomposing, 0, 0),
            "Breaking down research question into atomic tasks...",
        ));

        let graph = decompose(&self.client, &self.stages.decompose, question).await;
        check_cancelled(cancel)?;

        let mut update = ExecutionUpdate::new(
            ExecutionStatus::Decomposing,
            execution_progress(ExecutionStatus::Executing, 0, graph.len()),
            format!("Decomposed into {} tasks", graph.len()),
        );
        update.task_graph = Some(graph.clone());
        reporter.emit(update);

        self.finish(question, graph, BTreeMap::new(), reporter, cancel, started)
            .await
    }

    /// Continue a run whose graph (and some results) already exist.
    ///
    /// Skips decomposition; seeded results are never re-executed.
    pub async fn resume(
        &self,
        graph: TaskGraph,
        completed: BTreeMap<String, SubagentResult>,
        question: &ResearchQuestion,
        progress: Option<ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<ResearchReport, ExecutionCancelled> {
        let started = Instant::now();
        let mut reporter = ProgressReporter::new(progress);

        check_cancelled(cancel)?;
        info!(
            "Resuming run {} with {}/{} tasks complete",
            graph.run_id,
            completed.len(),
            graph.len()
        );

        let mut update = ExecutionUpdate::new(
            ExecutionStatus::Executing,
            execution_progress(ExecutionStatus::Executing, completed.len(), graph.len()),
            format!("Resuming run {}", graph.run_id),
        );
        update.task_graph = Some(graph.clone());
        update.completed_tasks = completed.keys().cloned().collect();
        reporter.emit(update);

        self.finish(question, graph, completed, reporter, cancel, started)
            .await
    }

    /// Execute, validate and synthesize, degrading non-cancellation failures
    async fn finish(
        &self,
        question: &ResearchQuestion,
        graph: TaskGraph,
        seed: BTreeMap<String, SubagentResult>,
        mut reporter: ProgressReporter,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<ResearchReport, ExecutionCancelled> {
        match self
            .execute_and_report(question, &graph, seed, &mut reporter, cancel)
            .await
        {
            Ok(mut report) => {
                report.execution_time_ms = started.elapsed().as_millis() as u64;

                let mut update = ExecutionUpdate::new(
                    ExecutionStatus::Complete,
                    execution_progress(ExecutionStatus::Complete, graph.len(), graph.len()),
                    "Research complete!",
                );
                update.manuscript = Some(report.manuscript_html.clone());
                update.report = Some(Box::new(report.clone()));
                reporter.emit(update);

                info!(
                    "Run {} complete in {}ms (confidence {:.2})",
                    report.run_id, report.execution_time_ms, report.confidence
                );
                Ok(report)
            }
            Err(SchedulerError::Cancelled(cancelled)) => {
                warn!("Run {} cancelled", graph.run_id);
                Err(cancelled)
            }
            Err(e) => {
                let message = e.to_string();
                error!("Research execution failed: {}", message);

                let mut update = ExecutionUpdate::new(
                    ExecutionStatus::Error,
                    reporter.last_progress(),
                    format!("Error: {}", message),
                );
                update.error = Some(message.clone());
                reporter.emit(update);

                Ok(degraded_report(
                    &question.text,
                    &message,
                    started.elapsed().as_millis() as u64,
                ))
            }
        }
    }

    async fn execute_and_report(
        &self,
        question: &ResearchQuestion,
        graph: &TaskGraph,
        seed: BTreeMap<String, SubagentResult>,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<ResearchReport, SchedulerError> {
        let scheduler = Scheduler::new(self.client.clone(), self.stages.clone(), self.concurrency);
        let context = TaskContext::new(question.text.clone(), question.auxiliary_context.clone());

        let results = scheduler
            .execute_graph(graph, &context, seed, reporter, cancel)
            .await?;
        check_cancelled(cancel)?;

        let ordered: Vec<SubagentResult> = graph.in_order(&results).into_iter().cloned().collect();

        let mut update = ExecutionUpdate::new(
            ExecutionStatus::Validating,
            execution_progress(ExecutionStatus::Validating, results.len(), graph.len()),
            "Running adversarial validation...",
        );
        update.completed_tasks = results.keys().cloned().collect();
        reporter.emit(update);

        let validations = validate(&self.client, &self.stages.validate, &ordered, &question.text).await;
        check_cancelled(cancel)?;

        let critical = validations
            .iter()
            .flat_map(|v| &v.flags)
            .filter(|f| f.severity == Severity::Critical)
            .count();
        if critical > 0 {
            warn!("Validation found {} critical issues", critical);
            reporter.emit(ExecutionUpdate::new(
                ExecutionStatus::Validating,
                CRITICAL_NOTICE_PROGRESS,
                format!("Found {} critical issues", critical),
            ));
        }

        let contradictions = detect_contradictions(&ordered);
        if !contradictions.is_empty() {
            info!("Detected {} potential contradictions", contradictions.len());
        }

        reporter.emit(ExecutionUpdate::new(
            ExecutionStatus::Validating,
            VALIDATION_DONE_PROGRESS,
            "Validation complete",
        ));

        check_cancelled(cancel)?;
        reporter.emit(ExecutionUpdate::new(
            ExecutionStatus::Synthesizing,
            execution_progress(ExecutionStatus::Synthesizing, results.len(), graph.len()),
            "Synthesizing final manuscript...",
        ));

        let report = synthesize(
            &self.client,
            &self.stages.synthesize,
            SynthesisInput {
                graph,
                results: &results,
                validations,
                contradictions,
            },
        )
        .await;
        check_cancelled(cancel)?;

        Ok(report)
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), ExecutionCancelled> {
    if cancel.is_cancelled() {
        Err(ExecutionCancelled)
    } else {
        Ok(())
    }
}

/// Minimal report returned when a run fails for any reason but cancellation
pub fn degraded_report(question: &str, message: &str, execution_time_ms: u64) -> ResearchReport {
    ResearchReport {
        run_id: generate_run_id(),
        question: question.to_string(),
        manuscript_html: format!(
            "<h1>Error</h1><p>Research execution failed: {}</p>",
            escape_html(message)
        ),
        assumptions: Vec::new(),
        confidence: 0.0,
        sources: Vec::new(),
        execution_time_ms,
        tasks: BTreeMap::new(),
        validation_results: Vec::new(),
        contradictions: Vec::new(),
    }
}
