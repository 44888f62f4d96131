/// Performance Analyzer
///
/// Runs the submission through the grading engine and turns the per-case
/// wall-clock times into a coarse complexity label.
///
/// **Heuristic (intentionally coarse):**
/// - average < 10ms  → "O(1) or O(log n)"
/// - average < 100ms → "O(n) or O(n log n)"
/// - otherwise       → "O(n²) or higher"
///
/// Space complexity is not measured. Pass/fail status is ignored; only
/// timings matter here.

use crate::error::GradeError;
use crate::executor::{Grader, Submission};
use tracing::{info, warn};
use tutor_common::types::{PerformanceReport, TestCase, TestResult};

const FAST_THRESHOLD_MS: u64 = 10;
const LINEAR_THRESHOLD_MS: u64 = 100;

const SPACE_UNKNOWN: &str = "Depends on implementation";
const SLOW_TIP: &str = "Consider optimizing your algorithm for better time complexity";

/// Map an average execution time to a complexity label
pub fn classify(average_ms: u64) -> &'static str {
    if average_ms < FAST_THRESHOLD_MS {
        "O(1) or O(log n)"
    } else if average_ms < LINEAR_THRESHOLD_MS {
        "O(n) or O(n log n)"
    } else {
        "O(n²) or higher"
    }
}

/// Build a report from graded results
pub fn build_report(results: &[TestResult]) -> PerformanceReport {
    if results.is_empty() {
        return PerformanceReport {
            time_complexity: "Unknown".to_string(),
            space_complexity: "Unknown".to_string(),
            average_execution_time_ms: 0,
            total_execution_time_ms: 0,
            performance_tips: Vec::new(),
        };
    }

    let total: u64 = results.iter().map(|r| r.execution_time_ms).sum();
    let average = (total as f64 / results.len() as f64).round() as u64;

    let mut tips = Vec::new();
    if average > LINEAR_THRESHOLD_MS {
        tips.push(SLOW_TIP.to_string());
    }

    PerformanceReport {
        time_complexity: classify(average).to_string(),
        space_complexity: SPACE_UNKNOWN.to_string(),
        average_execution_time_ms: average,
        total_execution_time_ms: total,
        performance_tips: tips,
    }
}

/// Report returned when the analysis itself could not run
pub fn analysis_failed(error: &GradeError) -> PerformanceReport {
    let tip = match error {
        GradeError::Analysis(_) => error.to_string(),
        other => GradeError::Analysis(other.to_string()).to_string(),
    };
    PerformanceReport {
        time_complexity: "Analysis failed".to_string(),
        space_complexity: "Analysis failed".to_string(),
        average_execution_time_ms: 0,
        total_execution_time_ms: 0,
        performance_tips: vec![tip],
    }
}

impl Grader {
    /// Time the submission over `test_cases`. Never fails.
    pub fn analyze_performance(&self, submission: &Submission, test_cases: &[TestCase]) -> PerformanceReport {
        match self.try_run(submission, test_cases) {
            Ok(results) => report_and_log(&results),
            Err(e) => {
                warn!(error = %e, "Performance analysis failed");
                analysis_failed(&e)
            }
        }
    }

    pub async fn analyze(&self, submission: Submission, test_cases: Vec<TestCase>) -> PerformanceReport {
        match self.try_grade(submission, test_cases).await {
            Ok(results) => report_and_log(&results),
            Err(e) => {
                warn!(error = %e, "Performance analysis failed");
                analysis_failed(&e)
            }
        }
    }
}

fn report_and_log(results: &[TestResult]) -> PerformanceReport {
    let report = build_report(results);
    info!(
        average_ms = report.average_execution_time_ms,
        total_ms = report.total_execution_time_ms,
        time_complexity = %report.time_complexity,
        "Performance analysis completed"
    );
    report
}

/// Analyze with the default configuration
pub fn analyze_performance(source: &str, test_cases: &[TestCase]) -> PerformanceReport {
    Grader::default().analyze_performance(&Submission::new(source), test_cases)
}
