//! Structural checks and ordering over the task dependency relation

use crate::error::GraphError;
use std::collections::{HashMap, HashSet, VecDeque};

use super::types::Task;

/// Depth-first search with a recursion stack.
///
/// Returns the id at which a back edge closes a cycle. Unknown dependency ids
/// are ignored here; `check_dependencies` reports them.
pub fn detect_cycle(tasks: &[Task]) -> Option<String> {
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut on_stack: HashSet<&str> = HashSet::new();

    fn visit<'a>(
        id: &'a str,
        by_id: &HashMap<&'a str, &'a Task>,
        visited: &mut HashSet<&'a str>,
        on_stack: &mut HashSet<&'a str>,
    ) -> Option<String> {
        if on_stack.contains(id) {
            return Some(id.to_string());
        }
        if visited.contains(id) {
            return None;
        }
        let task: &'a Task = *by_id.get(id)?;

        visited.insert(id);
        on_stack.insert(id);
        for dep in &task.dependencies {
            if let Some(found) = visit(dep.as_str(), by_id, visited, on_stack) {
                return Some(found);
            }
        }
        on_stack.remove(id);
        None
    }

    tasks
        .iter()
        .find_map(|t| visit(t.id.as_str(), &by_id, &mut visited, &mut on_stack))
}

/// Every dependency must name a task in the graph
pub fn check_dependencies(tasks: &[Task]) -> Result<(), GraphError> {
    let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    for task in tasks {
        for dep in &task.dependencies {
            if !ids.contains(dep.as_str()) {
                return Err(GraphError::DanglingDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Full structural validation: unique ids, no dangling references, acyclic
pub fn validate_graph(tasks: &[Task]) -> Result<(), GraphError> {
    if tasks.is_empty() {
        return Err(GraphError::NoTasks);
    }

    let mut seen = HashSet::new();
    for task in tasks {
        if !seen.insert(task.id.as_str()) {
            return Err(GraphError::DuplicateId(task.id.clone()));
        }
    }

    if let Some(at) = detect_cycle(tasks) {
        return Err(GraphError::CircularDependency(at));
    }

    check_dependencies(tasks)
}

/// Kahn's algorithm; ties break by position in `tasks`, so the order is
/// deterministic. Fails on cycles and dangling references.
pub fn topological_order(tasks: &[Task]) -> Result<Vec<String>, GraphError> {
    check_dependencies(tasks)?;

    let position: HashMap<&str, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.as_str(), i))
        .collect();
    let mut in_degree: Vec<usize> = tasks.iter().map(|t| t.dependencies.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    for (i, task) in tasks.iter().enumerate() {
        for dep in &task.dependencies {
            dependents[position[dep.as_str()]].push(i);
        }
    }

    let mut ready: VecDeque<usize> = (0..tasks.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(tasks.len());

    while let Some(i) = ready.pop_front() {
        order.push(tasks[i].id.clone());
        let mut unlocked = Vec::new();
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                unlocked.push(d);
            }
        }
        unlocked.sort_unstable();
        ready.extend(unlocked);
    }

    if order.len() != tasks.len() {
        let stuck = tasks
            .iter()
            .enumerate()
            .find(|(i, _)| in_degree[*i] > 0)
            .map(|(_, t)| t.id.clone())
            .unwrap_or_default();
        return Err(GraphError::CircularDependency(stuck));
    }

    Ok(order)
}

#[cfg(test)]
pub(crate) fn task(id: &str, deps: &[&str]) -> Task {
    Task {
        id: id.to_string(),
        title: format!("Task {}", id),
        description: format!("Investigate part {}", id),
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        priority: super::types::Priority::Medium,
        token_budget: 2000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_cycle_in_diamond() {
        let tasks = vec![
            task("T1", &[]),
            task("T2", &["T1"]),
            task("T3", &["T1"]),
            task("T4", &["T2", "T3"]),
        ];
        assert_eq!(detect_cycle(&tasks), None);
        assert!(validate_graph(&tasks).is_ok());
    }

    #[test]
    fn test_detects_cycle() {
        let tasks = vec![
            task("T1", &["T3"]),
            task("T2", &["T1"]),
            task("T3", &["T2"]),
        ];
        assert!(detect_cycle(&tasks).is_some());
        assert!(matches!(
            validate_graph(&tasks),
            Err(GraphError::CircularDependency(_))
        ));
    }

    #[test]
    fn test_detects_self_loop() {
        let tasks = vec![task("T1", &["T1"])];
        assert_eq!(detect_cycle(&tasks), Some("T1".to_string()));
    }

    #[test]
    fn test_dangling_dependency() {
        let tasks = vec![task("T1", &[]), task("T2", &["T9"])];
        assert_eq!(
            check_dependencies(&tasks),
            Err(GraphError::DanglingDependency {
                task: "T2".to_string(),
                dependency: "T9".to_string(),
            })
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let tasks = vec![task("T1", &[]), task("T1", &[])];
        assert_eq!(
            validate_graph(&tasks),
            Err(GraphError::DuplicateId("T1".to_string()))
        );
    }

    #[test]
    fn test_topological_order_respects_dependencies() {
        let tasks = vec![
            task("T3", &["T1", "T2"]),
            task("T2", &["T1"]),
            task("T1", &[]),
        ];
        assert_eq!(topological_order(&tasks).unwrap(), vec!["T1", "T2", "T3"]);
    }

    #[test]
    fn test_topological_order_ties_follow_graph_order() {
        let tasks = vec![
            task("T1", &[]),
            task("T2", &["T1"]),
            task("T3", &["T1"]),
            task("T4", &["T1"]),
            task("T5", &["T2", "T3", "T4"]),
        ];
        assert_eq!(
            topological_order(&tasks).unwrap(),
            vec!["T1", "T2", "T3", "T4", "T5"]
        );
    }

    #[test]
    fn test_topological_order_rejects_cycle() {
        let tasks = vec![task("T1", &["T2"]), task("T2", &["T1"])];
        assert!(matches!(
            topological_order(&tasks),
            Err(GraphError::CircularDependency(_))
        ));
    }
}
