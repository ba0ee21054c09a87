//! Dependency levelization.
//!
//! A task's level is 0 when it has no dependencies, otherwise one more
//! than the highest level among its dependencies. Tasks of one level run
//! together; a level starts only after the previous one has fully landed.

use crate::types::PlannedTask;
use nanoswarm_core::{preview, SwarmError, SwarmResult, TaskResult};
use std::collections::{BTreeMap, HashMap};

/// A validated plan grouped into execution levels.
#[derive(Debug, Clone)]
pub struct LevelSchedule {
    levels: Vec<Vec<PlannedTask>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

impl LevelSchedule {
    /// Validates `tasks` and groups them by level.
    ///
    /// Empty or duplicate ids, dependencies on unknown ids, self
    /// dependencies and cycles are all rejected before anything runs.
    /// Within a level, tasks keep their plan order.
    pub fn build(tasks: &[PlannedTask]) -> SwarmResult<Self> {
        let mut by_id: HashMap<&str, &PlannedTask> = HashMap::with_capacity(tasks.len());
        for task in tasks {
            if task.id.trim().is_empty() {
                return Err(SwarmError::Planning("task with empty id".into()));
            }
            if by_id.insert(task.id.as_str(), task).is_some() {
                return Err(SwarmError::Planning(format!(
                    "duplicate task id '{}'",
                    task.id
                )));
            }
        }

        for task in tasks {
            for dep in &task.depends_on {
                if dep == &task.id {
                    return Err(SwarmError::Planning(format!(
                        "task '{}' depends on itself",
                        task.id
                    )));
                }
                if !by_id.contains_key(dep.as_str()) {
                    return Err(SwarmError::Planning(format!(
                        "task '{}' depends on unknown task '{dep}'",
                        task.id
                    )));
                }
            }
        }

        let mut visits: HashMap<&str, Visit> = HashMap::new();
        for task in tasks {
            if let Some(cycle_at) = find_cycle(&task.id, &by_id, &mut visits) {
                return Err(SwarmError::Planning(format!(
                    "dependency cycle detected at task '{cycle_at}'"
                )));
            }
        }

        let mut level_of: HashMap<&str, usize> = HashMap::with_capacity(tasks.len());
        for task in tasks {
            compute_level(&task.id, &by_id, &mut level_of);
        }

        let depth = level_of.values().copied().max().map_or(0, |m| m + 1);
        let mut levels: Vec<Vec<PlannedTask>> = vec![Vec::new(); depth];
        for task in tasks {
            let level = level_of.get(task.id.as_str()).copied().unwrap_or(0);
            levels[level].push(task.clone());
        }
        Ok(Self { levels })
    }

    /// Tasks grouped by level, level 0 first.
    pub fn levels(&self) -> &[Vec<PlannedTask>] {
        &self.levels
    }

    /// Number of levels.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Total number of tasks.
    pub fn task_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }
}

/// Depth-first search with in-progress/done marks. Returns the id where a
/// back edge was found.
fn find_cycle<'a>(
    id: &'a str,
    by_id: &HashMap<&'a str, &'a PlannedTask>,
    visits: &mut HashMap<&'a str, Visit>,
) -> Option<String> {
    match visits.get(id) {
        Some(Visit::InProgress) => return Some(id.to_string()),
        Some(Visit::Done) => return None,
        None => {}
    }
    visits.insert(id, Visit::InProgress);
    if let Some(&task) = by_id.get(id) {
        for dep in &task.depends_on {
            if let Some(at) = find_cycle(dep.as_str(), by_id, visits) {
                return Some(at);
            }
        }
    }
    visits.insert(id, Visit::Done);
    None
}

/// Only called on an acyclic graph.
fn compute_level<'a>(
    id: &'a str,
    by_id: &HashMap<&'a str, &'a PlannedTask>,
    level_of: &mut HashMap<&'a str, usize>,
) -> usize {
    if let Some(level) = level_of.get(id) {
        return *level;
    }
    let level = match by_id.get(id).copied() {
        Some(task) if !task.depends_on.is_empty() => {
            let mut deepest = 0;
            for dep in &task.depends_on {
                deepest = deepest.max(compute_level(dep.as_str(), by_id, level_of));
            }
            deepest + 1
        }
        _ => 0,
    };
    level_of.insert(id, level);
    level
}

/// Outputs of `task`'s declared dependencies, keyed by dependency id.
///
/// A failed dependency contributes its `FAILED: ...` text rather than
/// being skipped, so dependents still run with whatever context exists.
pub fn dependency_outputs(
    task: &PlannedTask,
    completed: &HashMap<String, TaskResult>,
    max_chars: usize,
) -> BTreeMap<String, String> {
    task.depends_on
        .iter()
        .filter_map(|dep| {
            completed
                .get(dep)
                .map(|r| (dep.clone(), preview(&r.context_text(), max_chars).to_string()))
        })
        .collect()
}

/// `instruction` followed by a "Context from prior tasks" block, or the
/// bare instruction when there is nothing to add.
pub fn with_dependency_context(instruction: &str, deps: &BTreeMap<String, String>) -> String {
    if deps.is_empty() {
        return instruction.to_string();
    }
    let blocks: Vec<String> = deps
        .iter()
        .map(|(id, output)| format!("[{id}]: {output}"))
        .collect();
    format!(
        "{instruction}\n\n## Context from prior tasks:\n{}",
        blocks.join("\n\n")
    )
}
