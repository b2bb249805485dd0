use crate::config::StagesConfig;
use crate::error::{ExecutionCancelled, GraphError, SchedulerError};
use crate::reasoning::ReasoningClient;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::executor::{execute_task, TaskContext};
use super::graph::topological_order;
use super::progress::{execution_progress, ExecutionStatus, ExecutionUpdate, ProgressReporter};
use super::types::{SubagentResult, TaskGraph};

/// Runs a task graph in dependency order on a bounded worker pool.
///
/// Only the coordinator loop in `execute_graph` touches the completed map;
/// workers hand their result back through their join handle.
pub struct Scheduler {
    client: Arc<ReasoningClient>,
    stages: StagesConfig,
    semaphore: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(client: Arc<ReasoningClient>, stages: StagesConfig, concurrency: usize) -> Self {
        Self {
            client,
            stages,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Execute every task not already present in `completed_seed`.
    ///
    /// Returns the full result map (seeded plus new). On cancellation all
    /// in-flight workers are aborted and nothing partial is returned.
    pub async fn execute_graph(
        &self,
        graph: &TaskGraph,
        context: &TaskContext,
        completed_seed: BTreeMap<String, SubagentResult>,
        progress: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, SubagentResult>, SchedulerError> {
        let order = topological_order(&graph.tasks)?;
        let total = graph.len();

        let mut completed: BTreeMap<String, SubagentResult> = completed_seed
            .into_iter()
            .filter(|(id, _)| graph.task(id).is_some())
            .collect();
        let mut pending: Vec<String> = order
            .into_iter()
            .filter(|id| !completed.contains_key(id))
            .collect();

        if !completed.is_empty() {
            info!(
                "Resuming with {} of {} tasks already complete",
                completed.len(),
                total
            );
        }

        let mut running = FuturesUnordered::new();
        let mut abort_handles: HashMap<String, AbortHandle> = HashMap::new();

        loop {
            if cancel.is_cancelled() {
                abort_all(&abort_handles);
                return Err(ExecutionCancelled.into());
            }

            // Dispatch every ready task while worker slots remain
            let mut index = 0;
            while index < pending.len() {
                let Some(task) = graph.task(&pending[index]) else {
                    index += 1;
                    continue;
                };
                if !task.dependencies.iter().all(|d| completed.contains_key(d)) {
                    index += 1;
                    continue;
                }
                let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                    break;
                };
                let id = pending.remove(index);

                let mut update = ExecutionUpdate::new(
                    ExecutionStatus::Executing,
                    execution_progress(ExecutionStatus::Executing, completed.len(), total),
                    format!("Executing {}: {}", task.id, task.title),
                );
                update.current_task = Some(id.clone());
                update.completed_tasks = completed.keys().cloned().collect();
                progress.emit(update);

                let task_context =
                    context.with_upstream(task.dependencies.iter().filter_map(|d| completed.get(d)));
                let client = self.client.clone();
                let stages = self.stages.clone();
                let task = task.clone();

                debug!("Dispatching task {}", id);
                let handle = tokio::spawn(async move {
                    let _permit = permit; // hold until done
                    execute_task(&client, &stages, &task, &task_context).await
                });
                abort_handles.insert(id.clone(), handle.abort_handle());
                running.push(async move { (id, handle.await) });
            }

            if running.is_empty() {
                if let Some(stuck) = pending.first() {
                    // Unreachable for a validated graph
                    return Err(GraphError::CircularDependency(stuck.clone()).into());
                }
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    warn!("Cancellation requested, aborting {} running tasks", abort_handles.len());
                    abort_all(&abort_handles);
                    return Err(ExecutionCancelled.into());
                }

                Some((id, joined)) = running.next() => {
                    abort_handles.remove(&id);
                    let result = match joined {
                        Ok(result) => result,
                        Err(e) if e.is_panic() => {
                            abort_all(&abort_handles);
                            return Err(SchedulerError::TaskPanicked {
                                task: id,
                                message: e.to_string(),
                            });
                        }
                        Err(_) => {
                            abort_all(&abort_handles);
                            return Err(ExecutionCancelled.into());
                        }
                    };

                    completed.insert(id.clone(), result.clone());

                    let mut update = ExecutionUpdate::new(
                        ExecutionStatus::Executing,
                        execution_progress(ExecutionStatus::Executing, completed.len(), total),
                        format!("Completed {} ({}/{})", id, completed.len(), total),
                    );
                    update.current_task = Some(id);
                    update.completed_tasks = completed.keys().cloned().collect();
                    update.partial_result = Some(result);
                    progress.emit(update);
                }
            }
        }

        info!("All {} tasks complete", total);
        Ok(completed)
    }
}

fn abort_all(handles: &HashMap<String, AbortHandle>) {
    for handle in handles.values() {
        handle.abort();
    }
}
