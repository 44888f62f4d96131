// CLI commands for grading submissions locally
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tutor_common::catalog::ProblemCatalog;
use tutor_common::config::{GraderConfig, DEFAULT_CONFIG_PATH};
use tutor_common::types::{GradeSummary, PerformanceReport, TestCase, TestResult};
use tutor_grader::{validate_syntax, Grader, Submission};

pub struct RunRequest {
    pub code: PathBuf,
    pub tests: Option<PathBuf>,
    pub problem: Option<String>,
    pub content: PathBuf,
    pub pre: Option<PathBuf>,
    pub post: Option<PathBuf>,
    pub json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReport<'a> {
    results: &'a [TestResult],
    passed: usize,
    total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    performance: Option<&'a PerformanceReport>,
}

/// Load grader settings from an explicit file, or the default location
pub fn load_config(path: Option<&Path>) -> Result<GraderConfig> {
    let config = match path {
        Some(path) => GraderConfig::load(path)?.with_env_overrides(|key| std::env::var(key).ok())?,
        None => GraderConfig::load_default()?,
    };
    info!(
        timeout_ms = config.timeout_ms,
        memory_limit_mb = config.memory_limit_mb,
        source = %path.map(|p| p.display().to_string()).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string()),
        "Loaded grader config"
    );
    Ok(config)
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_test_cases(path: &Path) -> Result<Vec<TestCase>> {
    let content = read_source(path)?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse test cases in {}", path.display()))
}

/// Collect test cases plus the problem's transform hooks
fn resolve_cases(
    tests: Option<&Path>,
    problem: Option<&str>,
    content: &Path,
) -> Result<(Vec<TestCase>, Option<String>, Option<String>)> {
    match (tests, problem) {
        (Some(path), _) => Ok((read_test_cases(path)?, None, None)),
        (None, Some(id)) => {
            let catalog = ProblemCatalog::new(content);
            let problem = catalog.problem(id)?;
            let cases = catalog.test_cases(id)?;
            Ok((cases, problem.pre_process_code, problem.post_process_code))
        }
        (None, None) => bail!("Either --tests or --problem is required"),
    }
}

/// Grade a submission. Returns whether every test passed.
pub async fn run(config: GraderConfig, request: RunRequest) -> Result<bool> {
    let source = read_source(&request.code)?;
    let (test_cases, problem_pre, problem_post) =
        resolve_cases(request.tests.as_deref(), request.problem.as_deref(), &request.content)?;

    let pre_process = match request.pre.as_deref() {
        Some(path) => Some(read_source(path)?),
        None => problem_pre,
    };
    let post_process = match request.post.as_deref() {
        Some(path) => Some(read_source(path)?),
        None => problem_post,
    };

    let check = validate_syntax(&source);
    if !check.valid {
        let message = check.error.unwrap_or_else(|| "Syntax error".to_string());
        warn!(error = %message, "Submission failed syntax check");
        let results = vec![TestResult {
            test_case: 1,
            passed: false,
            input: String::new(),
            expected: String::new(),
            actual: None,
            description: "Syntax check".to_string(),
            execution_time_ms: 0,
            logs: Vec::new(),
            error: Some(message),
        }];
        print_report(&results, None, request.json)?;
        return Ok(false);
    }

    let submission = Submission {
        source,
        pre_process,
        post_process,
    };

    let grader = Grader::new(config);
    let results = grader.grade(submission.clone(), test_cases.clone()).await;
    let summary = GradeSummary::from_results(&results);

    let performance = if summary.all_passed() {
        Some(grader.analyze(submission, test_cases).await)
    } else {
        None
    };

    print_report(&results, performance.as_ref(), request.json)?;
    Ok(summary.all_passed())
}

fn print_report(results: &[TestResult], performance: Option<&PerformanceReport>, json: bool) -> Result<()> {
    let summary = GradeSummary::from_results(results);

    if json {
        let report = RunReport {
            results,
            passed: summary.passed,
            total: summary.total,
            performance,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for result in results {
        print_result(result);
    }
    println!("Passed {}/{} tests", summary.passed, summary.total);

    if let Some(report) = performance {
        println!();
        print_performance(report);
    }
    Ok(())
}

/// Same layout as the in-browser console panel
fn print_result(result: &TestResult) {
    let status = if result.passed { "PASSED" } else { "FAILED" };
    println!("--- Test {} {} ---", result.test_case, status);
    if !result.description.is_empty() {
        println!("{}", result.description);
    }
    for line in &result.logs {
        println!("{}", line);
    }
    println!("Expected: {}", result.expected);
    println!("Actual: {}", result.actual.as_deref().unwrap_or("undefined"));
    println!("Execution Time: {}ms", result.execution_time_ms);
    if let Some(error) = &result.error {
        println!("Error: {}", error);
    }
    println!();
}

fn print_performance(report: &PerformanceReport) {
    println!("Performance Analysis");
    println!("  Time Complexity: {}", report.time_complexity);
    println!("  Space Complexity: {}", report.space_complexity);
    println!("  Average Execution Time: {}ms", report.average_execution_time_ms);
    println!("  Total Time: {}ms", report.total_execution_time_ms);
    for tip in &report.performance_tips {
        println!("  Tip: {}", tip);
    }
}

pub fn validate(code: &Path) -> Result<bool> {
    let source = read_source(code)?;
    let check = validate_syntax(&source);

    match &check.error {
        None => println!("✅ Syntax OK"),
        Some(error) => println!("❌ Syntax error: {}", error),
    }
    Ok(check.valid)
}

pub async fn analyze(
    config: GraderConfig,
    code: &Path,
    tests: Option<&Path>,
    problem: Option<&str>,
    content: &Path,
) -> Result<bool> {
    let source = read_source(code)?;
    let (test_cases, pre_process, post_process) = resolve_cases(tests, problem, content)?;

    let submission = Submission {
        source,
        pre_process,
        post_process,
    };
    let report = Grader::new(config).analyze(submission, test_cases).await;
    print_performance(&report);

    Ok(report.time_complexity != "Analysis failed")
}

pub fn list_problems(content: &Path, topic: Option<&str>) -> Result<bool> {
    let catalog = ProblemCatalog::new(content);
    let problems = match topic {
        Some(topic) => catalog.problems_by_topic(topic)?,
        None => catalog.list_problems()?,
    };

    if problems.is_empty() {
        println!("No problems found");
        return Ok(true);
    }

    for problem in &problems {
        println!(
            "{:<28} {:<8} {:<16} {}",
            problem.id,
            format!("{:?}", problem.difficulty),
            problem.topic,
            problem.title
        );
    }
    Ok(true)
}
