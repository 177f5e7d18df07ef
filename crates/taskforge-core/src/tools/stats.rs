//! Execution metadata and per-tool statistics

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

use crate::tools::registry::ToolResult;
use crate::tools::Parameters;

/// Aggregate counters for one tool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolStatistics {
    pub tool_name: String,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub total_duration_ms: u64,
    pub max_duration_ms: u64,
    pub last_executed_at: Option<i64>,
    pub last_error: Option<String>,
}

impl ToolStatistics {
    fn new(tool_name: &str) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            ..Default::default()
        }
    }

    /// Fraction of successful executions in `[0, 1]`
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            return 0.0;
        }
        self.successful_executions as f64 / self.total_executions as f64
    }

    pub fn average_duration_ms(&self) -> f64 {
        if self.total_executions == 0 {
            return 0.0;
        }
        self.total_duration_ms as f64 / self.total_executions as f64
    }

    fn record(&mut self, result: &ToolResult, duration_ms: u64, at: i64) {
        self.total_executions += 1;
        if result.success {
            self.successful_executions += 1;
        } else {
            self.failed_executions += 1;
            self.last_error = result.error.clone();
        }
        self.total_duration_ms = self.total_duration_ms.saturating_add(duration_ms);
        self.max_duration_ms = self.max_duration_ms.max(duration_ms);
        self.last_executed_at = Some(at);
    }
}

/// Stamps identity and timing metadata on every `ToolResult` and keeps
/// running statistics per tool name.
#[derive(Default)]
pub struct ExecutionMetadataManager {
    stats: Mutex<HashMap<String, ToolStatistics>>,
}

impl ExecutionMetadataManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enrich a finished result and record it
    pub fn finish(
        &self,
        tool_name: &str,
        params: &Parameters,
        result: ToolResult,
        duration: Duration,
    ) -> ToolResult {
        let (result, duration_ms, now) = Self::stamp(tool_name, params, result, duration);
        self.stats
            .lock()
            .entry(tool_name.to_string())
            .or_insert_with(|| ToolStatistics::new(tool_name))
            .record(&result, duration_ms, now);
        result
    }

    /// Enrich a result without touching the statistics. Used for names no
    /// handler is registered under, so the map only holds real tools.
    pub fn finish_untracked(
        &self,
        tool_name: &str,
        params: &Parameters,
        result: ToolResult,
        duration: Duration,
    ) -> ToolResult {
        Self::stamp(tool_name, params, result, duration).0
    }

    fn stamp(
        tool_name: &str,
        params: &Parameters,
        mut result: ToolResult,
        duration: Duration,
    ) -> (ToolResult, u64, i64) {
        let duration_ms = crate::duration_ms(duration);
        let now = crate::unix_timestamp();

        result.metadata.insert("tool_name".into(), json!(tool_name));
        result
            .metadata
            .insert("execution_time_ms".into(), json!(duration_ms));
        result.metadata.insert("timestamp".into(), json!(now));
        result
            .metadata
            .insert("parameter_count".into(), json!(params.len()));
        result
            .metadata
            .insert("output_size".into(), json!(result.output.len()));

        tracing::info!(
            tool = tool_name,
            duration_ms,
            success = result.success,
            error_code = result.error_code.as_deref().unwrap_or(""),
            output_len = result.output.len(),
            "Tool execution completed"
        );

        (result, duration_ms, now)
    }

    /// Snapshot of all statistics, sorted by tool name
    pub fn statistics(&self) -> Vec<ToolStatistics> {
        let mut all: Vec<ToolStatistics> = self.stats.lock().values().cloned().collect();
        all.sort_by(|a, b| a.tool_name.cmp(&b.tool_name));
        all
    }

    pub fn statistics_for(&self, tool_name: &str) -> Option<ToolStatistics> {
        self.stats.lock().get(tool_name).cloned()
    }

    pub fn reset(&self) {
        self.stats.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(n: usize) -> Parameters {
        (0..n).map(|i| (format!("p{}", i), json!(i))).collect()
    }

    #[test]
    fn finish_adds_metadata() {
        let manager = ExecutionMetadataManager::new();
        let result = manager.finish(
            "view",
            &params(2),
            ToolResult::success("hello"),
            Duration::from_millis(12),
        );

        assert_eq!(result.metadata["tool_name"], json!("view"));
        assert_eq!(result.metadata["execution_time_ms"], json!(12));
        assert_eq!(result.metadata["parameter_count"], json!(2));
        assert_eq!(result.metadata["output_size"], json!(5));
        assert!(result.metadata["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn statistics_accumulate_per_tool() {
        let manager = ExecutionMetadataManager::new();
        manager.finish("a", &params(0), ToolResult::success(""), Duration::from_millis(10));
        manager.finish("a", &params(0), ToolResult::error("boom"), Duration::from_millis(30));
        manager.finish("b", &params(0), ToolResult::success(""), Duration::from_millis(5));

        let a = manager.statistics_for("a").unwrap();
        assert_eq!(a.total_executions, 2);
        assert_eq!(a.successful_executions, 1);
        assert_eq!(a.failed_executions, 1);
        assert_eq!(a.max_duration_ms, 30);
        assert_eq!(a.average_duration_ms(), 20.0);
        assert_eq!(a.success_rate(), 0.5);
        assert_eq!(a.last_error.as_deref(), Some("boom"));

        let names: Vec<_> = manager.statistics().into_iter().map(|s| s.tool_name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn untracked_results_are_stamped_but_not_counted() {
        let manager = ExecutionMetadataManager::new();
        let result = manager.finish_untracked(
            "teleport",
            &params(1),
            ToolResult::unsupported_tool("teleport"),
            Duration::from_millis(3),
        );

        assert_eq!(result.metadata["tool_name"], json!("teleport"));
        assert_eq!(result.metadata["parameter_count"], json!(1));
        assert!(manager.statistics_for("teleport").is_none());
    }

    #[test]
    fn oversized_duration_saturates() {
        let manager = ExecutionMetadataManager::new();
        let result = manager.finish("slow", &params(0), ToolResult::success(""), Duration::MAX);

        assert_eq!(result.metadata["execution_time_ms"], json!(u64::MAX));
        assert_eq!(manager.statistics_for("slow").unwrap().max_duration_ms, u64::MAX);
    }

    #[test]
    fn reset_clears() {
        let manager = ExecutionMetadataManager::new();
        manager.finish("a", &params(0), ToolResult::success(""), Duration::ZERO);
        manager.reset();
        assert!(manager.statistics().is_empty());
        assert_eq!(ToolStatistics::default().success_rate(), 0.0);
    }
}
