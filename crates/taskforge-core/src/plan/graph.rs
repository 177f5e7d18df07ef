//! Dependency graph checks and scheduling for task lists

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use super::task::Task;
use crate::tools::ValidationResult;

/// Check a task list for duplicate ids, empty tasks, dangling dependencies,
/// and dependency cycles. Every problem found is reported.
pub fn validate_task_sequence(tasks: &[Task]) -> ValidationResult {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for task in tasks {
        if !seen.insert(task.id.as_str()) {
            errors.push(format!("Duplicate task id '{}'", task.id));
        }
        if task.tool_calls.is_empty() {
            errors.push(format!("Task '{}' has no tool calls", task.id));
        }
    }

    for task in tasks {
        for dep in &task.dependencies {
            if !seen.contains(dep.as_str()) {
                errors.push(format!(
                    "Task '{}' depends on unknown task '{}'",
                    task.id, dep
                ));
            }
        }
    }

    let graph = Graph::new(tasks);
    let mut visited = vec![false; tasks.len()];
    let mut recursion_stack = vec![false; tasks.len()];
    for node in 0..tasks.len() {
        if !visited[node] && graph.has_cycle(node, &mut visited, &mut recursion_stack) {
            errors.push(format!(
                "Dependency cycle detected involving task '{}'",
                tasks[node].id
            ));
        }
    }

    ValidationResult::from_errors(errors)
}

/// Order tasks so every task follows its dependencies, picking the lowest
/// priority among ready tasks (ties keep input order).
pub fn schedule(tasks: &[Task]) -> Result<Vec<Task>, Vec<String>> {
    if let ValidationResult::Invalid(errors) = validate_task_sequence(tasks) {
        return Err(errors);
    }

    let graph = Graph::new(tasks);
    let mut remaining: Vec<usize> = tasks.iter().map(|t| t.dependencies.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    for (node, deps) in graph.edges.iter().enumerate() {
        for &dep in deps {
            dependents[dep].push(node);
        }
    }

    let mut ready: BinaryHeap<Reverse<(u32, usize)>> = remaining
        .iter()
        .enumerate()
        .filter(|(_, &n)| n == 0)
        .map(|(i, _)| Reverse((tasks[i].priority, i)))
        .collect();

    let mut ordered = Vec::with_capacity(tasks.len());
    while let Some(Reverse((_, node))) = ready.pop() {
        ordered.push(tasks[node].clone());
        for &next in &dependents[node] {
            remaining[next] -= 1;
            if remaining[next] == 0 {
                ready.push(Reverse((tasks[next].priority, next)));
            }
        }
    }
    Ok(ordered)
}

/// Adjacency by index: `edges[i]` are the tasks `tasks[i]` depends on
struct Graph {
    edges: Vec<Vec<usize>>,
}

impl Graph {
    fn new(tasks: &[Task]) -> Self {
        let index: HashMap<&str, usize> = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.as_str(), i))
            .collect();
        let edges = tasks
            .iter()
            .map(|t| {
                t.dependencies
                    .iter()
                    .filter_map(|dep| index.get(dep.as_str()).copied())
                    .collect()
            })
            .collect();
        Self { edges }
    }

    fn has_cycle(&self, node: usize, visited: &mut [bool], recursion_stack: &mut [bool]) -> bool {
        if recursion_stack[node] {
            return true;
        }
        if visited[node] {
            return false;
        }
        visited[node] = true;
        recursion_stack[node] = true;

        for &dep in &self.edges[node] {
            if self.has_cycle(dep, visited, recursion_stack) {
                return true;
            }
        }

        recursion_stack[node] = false;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolCall;

    fn task(id: &str, deps: &[&str], priority: u32) -> Task {
        let mut t = Task::new(id, id)
            .with_call(ToolCall::new("view").with_param("path", "."))
            .with_priority(priority);
        for dep in deps {
            t = t.depends_on(*dep);
        }
        t
    }

    #[test]
    fn acyclic_resolved_set_is_valid() {
        let tasks = vec![
            task("model", &[], 1),
            task("service", &["model"], 2),
            task("controller", &["service", "model"], 3),
        ];
        assert!(validate_task_sequence(&tasks).is_valid());
    }

    #[test]
    fn two_node_cycle_is_invalid() {
        let tasks = vec![task("a", &["b"], 0), task("b", &["a"], 0)];
        let result = validate_task_sequence(&tasks);
        assert!(!result.is_valid());
        assert!(result.errors()[0].contains("cycle"));
    }

    #[test]
    fn longer_cycle_behind_acyclic_prefix() {
        let tasks = vec![
            task("root", &[], 0),
            task("x", &["root", "z"], 0),
            task("y", &["x"], 0),
            task("z", &["y"], 0),
        ];
        let result = validate_task_sequence(&tasks);
        assert_eq!(result.errors().len(), 1);
    }

    #[test]
    fn dangling_dependency_and_duplicates_reported_together() {
        let mut empty = task("b", &[], 0);
        empty.tool_calls.clear();
        let tasks = vec![task("a", &["ghost"], 0), task("a", &[], 0), empty];

        let errors = validate_task_sequence(&tasks).errors().to_vec();
        assert!(errors.iter().any(|e| e.contains("unknown task 'ghost'")));
        assert!(errors.iter().any(|e| e.contains("Duplicate task id 'a'")));
        assert!(errors.iter().any(|e| e.contains("'b' has no tool calls")));
    }

    #[test]
    fn schedule_respects_dependencies_then_priority() {
        let tasks = vec![
            task("tests", &["controller"], 5),
            task("controller", &["service"], 3),
            task("docs", &[], 9),
            task("service", &["model"], 2),
            task("model", &[], 1),
        ];
        let order: Vec<String> = schedule(&tasks)
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(order, vec!["model", "service", "controller", "tests", "docs"]);
    }

    #[test]
    fn schedule_rejects_cycles() {
        let tasks = vec![task("a", &["b"], 0), task("b", &["a"], 0)];
        assert!(schedule(&tasks).is_err());
    }
}
