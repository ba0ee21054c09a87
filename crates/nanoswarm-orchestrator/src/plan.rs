//! Turning the planner's reply into a [`DependencyPlan`].

use crate::types::{DependencyPlan, RawPlan};
use nanoswarm_core::{preview, SwarmError, SwarmResult};
use regex::Regex;
use std::sync::LazyLock;

/// First fenced code block, with or without a `json` tag.
#[allow(clippy::unwrap_used)]
static FENCED_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?\s*([\s\S]+?)```").unwrap());

/// Parses a planner reply.
///
/// Accepts a bare JSON object, the first fenced code block, or the
/// outermost `{...}` span, in that order. Unknown roles and empty task
/// lists are planning errors; graph validation happens in the scheduler.
pub fn parse_plan(text: &str) -> SwarmResult<DependencyPlan> {
    let raw = extract_raw(text).ok_or_else(|| {
        SwarmError::Planning(format!(
            "Could not parse plan: {}",
            preview(text.trim(), 200)
        ))
    })?;
    let plan = DependencyPlan::try_from(raw)?;
    if plan.tasks.is_empty() {
        return Err(SwarmError::Planning("plan contains no tasks".into()));
    }
    Ok(plan)
}

fn extract_raw(text: &str) -> Option<RawPlan> {
    let trimmed = text.trim();
    if let Ok(plan) = serde_json::from_str::<RawPlan>(trimmed) {
        return Some(plan);
    }
    if let Some(inner) = FENCED_BLOCK_RE.captures(trimmed).and_then(|c| c.get(1)) {
        if let Ok(plan) = serde_json::from_str::<RawPlan>(inner.as_str().trim()) {
            return Some(plan);
        }
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<RawPlan>(&trimmed[start..=end]).ok()
}
