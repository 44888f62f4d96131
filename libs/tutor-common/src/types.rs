use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single grading case as published by the content store.
///
/// `input` is either an object of named parameters (spread positionally in
/// declaration order) or any other JSON value, passed as the only argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: Value,
    pub expected: Value,
    #[serde(default)]
    pub description: String,
}

impl TestCase {
    pub fn new(input: Value, expected: Value, description: impl Into<String>) -> Self {
        Self {
            input,
            expected,
            description: description.into(),
        }
    }
}

/// Outcome of one test case, shaped for the result cards in the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// 1-based position of the case in the submitted list
    #[serde(rename = "testCase")]
    pub test_case: usize,
    pub passed: bool,
    pub input: String,
    pub expected: String,
    pub actual: Option<String>,
    pub description: String,
    #[serde(rename = "executionTime", with = "millis")]
    pub execution_time_ms: u64,
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Coarse timing-based performance estimate for a fully passing submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub time_complexity: String,
    pub space_complexity: String,
    #[serde(rename = "averageExecutionTime", with = "millis")]
    pub average_execution_time_ms: u64,
    #[serde(rename = "totalTime", with = "millis")]
    pub total_execution_time_ms: u64,
    pub performance_tips: Vec<String>,
}

/// Result of the cheap syntax gate run before grading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxCheck {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyntaxCheck {
    pub fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Example {
    pub input: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Problem metadata as stored under `problems/<id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: String,
    pub title: String,
    pub difficulty: Difficulty,
    pub description: String,
    #[serde(default)]
    pub examples: Vec<Example>,
    #[serde(default)]
    pub constraints: Vec<String>,
    pub starter_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub time_estimate: String,
    #[serde(default)]
    pub companies: Vec<String>,
    pub topic: String,
    /// Converts plain JSON inputs into a problem-specific shape (e.g. linked lists)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_process_code: Option<String>,
    /// Converts the candidate's return value back into plain JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_process_code: Option<String>,
}

/// Pass counts over one grading run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GradeSummary {
    pub passed: usize,
    pub total: usize,
}

impl GradeSummary {
    pub fn from_results(results: &[TestResult]) -> Self {
        Self {
            passed: results.iter().filter(|r| r.passed).count(),
            total: results.len(),
        }
    }

    /// An empty run never counts as solved.
    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.passed == self.total
    }
}

/// Durations travel as `"<n>ms"` strings, the format the result cards display.
pub mod millis {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}ms", value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.trim_end_matches("ms")
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid duration: {}", raw)))
    }
}
