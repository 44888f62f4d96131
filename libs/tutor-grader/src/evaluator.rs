/// Test Evaluator - Pass/Fail Classification
///
/// **Core Responsibility:**
/// Compare what the candidate returned against the expected value and build
/// the `TestResult` records the UI renders.
///
/// **Critical Properties:**
/// - Knows nothing about the script engine
/// - Pure function: (execution outputs, test cases) → results
/// - Always yields exactly one result per test case, in order
///
/// **Comparison Rules:**
/// - Values are compared by canonical serialization
/// - Object keys: order-insensitive (sorted before comparison)
/// - Arrays: order and shape significant
/// - Numbers: integral floats equal their integer form (`2.0 == 2`), no tolerance otherwise
/// - Unordered collections: NO (the expected value must already be in the order returned)

use crate::error::GradeError;
use serde_json::{Map, Number, Value};
use tracing::debug;
use tutor_common::types::{TestCase, TestResult};

/// Largest integer a JavaScript number holds exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Raw outcome of running one test case, produced by the executor
#[derive(Debug, Clone, PartialEq)]
pub struct TestExecutionOutput {
    /// 1-based position of the case
    pub test_index: usize,
    /// `JSON.stringify` of the (post-processed) result; `None` for `undefined`
    pub actual: Option<String>,
    pub logs: Vec<String>,
    pub execution_time_ms: u64,
    pub error: Option<GradeError>,
}

impl TestExecutionOutput {
    pub fn failed(test_index: usize, error: GradeError, logs: Vec<String>, execution_time_ms: u64) -> Self {
        Self {
            test_index,
            actual: None,
            logs,
            execution_time_ms,
            error: Some(error),
        }
    }
}

fn normalize_number(n: &Number) -> Value {
    if n.is_i64() || n.is_u64() {
        return Value::Number(n.clone());
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => Value::from(f as i64),
        _ => Value::Number(n.clone()),
    }
}

fn normalize(value: &Value, sort_keys: bool) -> Value {
    match value {
        Value::Number(n) => normalize_number(n),
        Value::Array(items) => Value::Array(items.iter().map(|v| normalize(v, sort_keys)).collect()),
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            if sort_keys {
                entries.sort_by(|a, b| a.0.cmp(b.0));
            }
            let normalized: Map<String, Value> = entries
                .into_iter()
                .map(|(k, v)| (k.clone(), normalize(v, sort_keys)))
                .collect();
            Value::Object(normalized)
        }
        other => other.clone(),
    }
}

/// Stable textual form used for equality: sorted keys, normalized numbers
pub fn canonical_string(value: &Value) -> String {
    normalize(value, true).to_string()
}

/// Compact display form matching `JSON.stringify`; keys keep their original order
pub fn display_string(value: &Value) -> String {
    normalize(value, false).to_string()
}

/// Compare a serialized candidate result with the expected value.
///
/// A result that is not valid JSON never matches.
pub fn values_match(actual_json: &str, expected: &Value) -> bool {
    match serde_json::from_str::<Value>(actual_json) {
        Ok(actual) => canonical_string(&actual) == canonical_string(expected),
        Err(_) => false,
    }
}

/// Evaluate a single test case execution output
///
/// Errors take priority: a case that failed to execute never passes, even if
/// a partial result was recorded.
pub fn evaluate_test(output: &TestExecutionOutput, test_case: &TestCase) -> TestResult {
    let passed = output.error.is_none()
        && output
            .actual
            .as_deref()
            .is_some_and(|actual| values_match(actual, &test_case.expected));

    TestResult {
        test_case: output.test_index,
        passed,
        input: display_string(&test_case.input),
        expected: display_string(&test_case.expected),
        actual: output.actual.clone(),
        description: test_case.description.clone(),
        execution_time_ms: output.execution_time_ms,
        logs: output.logs.clone(),
        error: output.error.as_ref().map(|e| e.to_string()),
    }
}

/// Pair outputs with their test cases positionally.
///
/// Cases without an output are reported as failed so callers can always
/// zip results with inputs.
pub fn evaluate(test_cases: &[TestCase], outputs: Vec<TestExecutionOutput>) -> Vec<TestResult> {
    let mut outputs = outputs.into_iter();

    test_cases
        .iter()
        .enumerate()
        .map(|(idx, test_case)| {
            let output = outputs.next().unwrap_or_else(|| {
                TestExecutionOutput::failed(
                    idx + 1,
                    GradeError::Invocation("No output recorded for test case".to_string()),
                    Vec::new(),
                    0,
                )
            });
            let result = evaluate_test(&output, test_case);

            debug!(
                test_num = result.test_case,
                passed = result.passed,
                execution_ms = result.execution_time_ms,
                error = result.error.as_deref().unwrap_or(""),
                "Evaluated test case"
            );

            result
        })
        .collect()
}

/// Mark every test case failed with the same error (the submission never ran)
pub fn uniform_failure(test_cases: &[TestCase], error: &GradeError) -> Vec<TestResult> {
    let outputs = (1..=test_cases.len())
        .map(|idx| TestExecutionOutput::failed(idx, error.clone(), Vec::new(), 0))
        .collect();
    evaluate(test_cases, outputs)
}
