/// Grading Executor - High-Level Orchestration
///
/// **Responsibility:**
/// Run a submission against every test case and hand raw outputs to the
/// evaluator.
///
/// **Architecture:**
/// 1. Resolve entry points with the analyzer (analyzer.rs)
/// 2. Compile once to reject broken submissions up front (engine.rs)
/// 3. Execute each case in a fresh sandbox context (engine.rs)
/// 4. Score outputs (evaluator.rs)
///
/// Cases run strictly one after another. A failing case never stops the
/// batch, and a submission that cannot be compiled yields one identical
/// failure per case, so the result list always lines up with the input list.

use crate::analyzer::resolve_entry_point_name;
use crate::engine::{program_body, Instance, Scope, ScriptEngine};
use crate::error::{GradeError, GradeResult, TransformStage};
use crate::evaluator::{self, display_string, TestExecutionOutput};
use rquickjs::{Function, Value};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, instrument, warn};
use tutor_common::config::GraderConfig;
use tutor_common::types::{TestCase, TestResult};
use uuid::Uuid;

/// Learner code plus the optional problem-specific transform hooks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Submission {
    pub source: String,
    /// Applied to every array argument before the call (e.g. array → linked list)
    pub pre_process: Option<String>,
    /// Applied to the return value before comparison (e.g. linked list → array)
    pub post_process: Option<String>,
}

impl Submission {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn with_pre_process(mut self, code: impl Into<String>) -> Self {
        self.pre_process = Some(code.into());
        self
    }

    pub fn with_post_process(mut self, code: impl Into<String>) -> Self {
        self.post_process = Some(code.into());
        self
    }
}

/// Post-processing hook, compiled separately from the submission
struct PostProcess {
    name: String,
    body: String,
}

/// Everything resolved once per run, before any case executes
struct Program {
    body: String,
    entry: String,
    pre_process: Option<String>,
    post_process: Option<PostProcess>,
    /// Non-fatal setup problems, repeated into every case's logs
    notes: Vec<String>,
}

impl Program {
    fn prepare(engine: &ScriptEngine, submission: &Submission) -> GradeResult<Self> {
        engine.check_size(&submission.source)?;
        let entry = resolve_entry_point_name(&submission.source)?;
        let mut notes = Vec::new();

        let pre_process = match submission.pre_process.as_deref() {
            Some(code) => match resolve_entry_point_name(code) {
                Ok(name) => Some(name),
                Err(e) => {
                    notes.push(transform_note(TransformStage::PreProcess, &e));
                    None
                }
            },
            None => None,
        };

        let combined = match submission.pre_process.as_deref() {
            Some(code) => format!("{}\n{}", code, submission.source),
            None => submission.source.clone(),
        };

        let mut exports = vec![entry.as_str()];
        if let Some(name) = pre_process.as_deref() {
            exports.push(name);
        }
        let body = program_body(&combined, &exports);
        engine.check_syntax(&body)?;

        let post_process = match submission.post_process.as_deref() {
            Some(code) => {
                let prepared = resolve_entry_point_name(code).and_then(|name| {
                    let body = program_body(code, &[name.as_str()]);
                    engine.check_syntax(&body)?;
                    Ok(PostProcess { name, body })
                });
                match prepared {
                    Ok(post) => Some(post),
                    Err(e) => {
                        notes.push(transform_note(TransformStage::PostProcess, &e));
                        None
                    }
                }
            }
            None => None,
        };

        debug!(
            entry = %entry,
            pre_process = pre_process.as_deref().unwrap_or("-"),
            post_process = post_process.as_ref().map(|p| p.name.as_str()).unwrap_or("-"),
            "Submission compiled"
        );

        Ok(Self {
            body,
            entry,
            pre_process,
            post_process,
            notes,
        })
    }

    fn exports(&self) -> Vec<&str> {
        let mut exports = vec![self.entry.as_str()];
        if let Some(name) = self.pre_process.as_deref() {
            exports.push(name);
        }
        exports
    }
}

fn transform_note(stage: TransformStage, err: &GradeError) -> String {
    let transform = GradeError::Transform {
        stage,
        message: err.to_string(),
    };
    format!("[error] {}", transform)
}

fn round_ms(elapsed: Duration) -> u64 {
    (elapsed.as_secs_f64() * 1000.0).round() as u64
}

/// Runs submissions against test cases inside the script engine
#[derive(Debug, Clone, Default)]
pub struct Grader {
    config: GraderConfig,
}

impl Grader {
    pub fn new(config: GraderConfig) -> Self {
        Self { config }
    }

    /// Grade a submission. Never fails: every problem is reported through the
    /// returned results, one per test case, in order.
    pub fn run_test_cases(&self, submission: &Submission, test_cases: &[TestCase]) -> Vec<TestResult> {
        match self.try_run(submission, test_cases) {
            Ok(results) => results,
            Err(e) => {
                error!(error = %e, "Grading run could not start");
                evaluator::uniform_failure(test_cases, &e)
            }
        }
    }

    /// Async entry point: the run executes on a blocking thread so the
    /// interpreter never stalls the caller's reactor.
    pub async fn grade(&self, submission: Submission, test_cases: Vec<TestCase>) -> Vec<TestResult> {
        match self.try_grade(submission, test_cases.clone()).await {
            Ok(results) => results,
            Err(e) => {
                error!(error = %e, "Grading run failed");
                evaluator::uniform_failure(&test_cases, &e)
            }
        }
    }

    pub(crate) async fn try_grade(
        &self,
        submission: Submission,
        test_cases: Vec<TestCase>,
    ) -> GradeResult<Vec<TestResult>> {
        let grader = self.clone();
        tokio::task::spawn_blocking(move || grader.try_run(&submission, &test_cases))
            .await
            .map_err(|e| GradeError::Engine(format!("Grading task failed: {}", e)))?
    }

    /// Only infrastructure failures (the sandbox cannot be created) surface as `Err`.
    pub(crate) fn try_run(&self, submission: &Submission, test_cases: &[TestCase]) -> GradeResult<Vec<TestResult>> {
        let run_id = Uuid::new_v4();
        let span = info_span!("grading_run", run_id = %run_id, test_count = test_cases.len());
        let _enter = span.enter();

        info!(
            source_size = submission.source.len(),
            pre_process = submission.pre_process.is_some(),
            post_process = submission.post_process.is_some(),
            timeout_ms = self.config.timeout_ms,
            "Starting grading run"
        );

        let engine = ScriptEngine::new(&self.config)?;

        let program = match Program::prepare(&engine, submission) {
            Ok(program) => program,
            Err(e) => {
                warn!(error = %e, "Submission rejected; all tests marked as failed");
                return Ok(evaluator::uniform_failure(test_cases, &e));
            }
        };

        let outputs: Vec<TestExecutionOutput> = test_cases
            .iter()
            .enumerate()
            .map(|(idx, test_case)| self.run_case(&engine, &program, idx + 1, test_case))
            .collect();

        let results = evaluator::evaluate(test_cases, outputs);
        let passed = results.iter().filter(|r| r.passed).count();
        info!(passed, total = results.len(), "Grading run completed");

        Ok(results)
    }

    #[instrument(skip(self, engine, program, test_case), fields(test_num = test_index))]
    fn run_case(
        &self,
        engine: &ScriptEngine,
        program: &Program,
        test_index: usize,
        test_case: &TestCase,
    ) -> TestExecutionOutput {
        let instance = match engine.instantiate() {
            Ok(instance) => instance,
            Err(e) => return TestExecutionOutput::failed(test_index, e, Vec::new(), 0),
        };

        if self.config.trace_harness {
            instance.log(format!("--- Starting Test Case {} ---", test_index));
        }
        for note in &program.notes {
            instance.log(note.clone());
        }

        let guard = engine.arm();
        let start = Instant::now();
        let outcome = self.execute(&instance, program, test_case);
        let elapsed = round_ms(start.elapsed());
        drop(guard);

        match outcome {
            Ok(actual) => {
                debug!(execution_ms = elapsed, "Test case executed");
                TestExecutionOutput {
                    test_index,
                    actual,
                    logs: instance.logs(),
                    execution_time_ms: elapsed,
                    error: None,
                }
            }
            Err(e @ GradeError::Timeout { .. }) => {
                warn!(execution_ms = elapsed, "Test case timed out");
                TestExecutionOutput::failed(test_index, e, instance.logs(), elapsed)
            }
            Err(e) => {
                debug!(error = %e, "Test case raised an error");
                TestExecutionOutput::failed(test_index, e, instance.logs(), 0)
            }
        }
    }

    fn execute(&self, instance: &Instance<'_>, program: &Program, test_case: &TestCase) -> GradeResult<Option<String>> {
        let trace = self.config.trace_harness;

        instance.with(|scope| {
            if trace {
                scope.log(format!("Input parameters: {}", display_string(&test_case.input)));
            }

            let exports = scope.load(&program.body, &program.exports())?;
            let entry = exports
                .first()
                .ok_or_else(|| GradeError::Invocation(format!("{} is not defined", program.entry)))?;
            let args = self.prepare_args(scope, &test_case.input, exports.get(1))?;
            let raw = scope.call(entry, args)?;
            scope.settle(raw)
        })?;

        // Microtasks queued by the call run inside this case, promise or not
        instance.drain_jobs()?;

        instance.with(|scope| {
            let raw = scope.settled()?;
            self.finish(scope, program, raw)
        })
    }

    /// Named parameters are spread in declaration order; anything else is
    /// passed as the single argument.
    fn prepare_args<'js>(
        &self,
        scope: &Scope<'js>,
        input: &serde_json::Value,
        pre_process: Option<&Function<'js>>,
    ) -> GradeResult<Vec<Value<'js>>> {
        let trace = self.config.trace_harness;

        match input {
            serde_json::Value::Object(params) => {
                if trace {
                    let names: Vec<&str> = params.keys().map(String::as_str).collect();
                    let values: Vec<String> = params.values().map(display_string).collect();
                    scope.log(format!(
                        "Calling function with parameters: {} = {}",
                        names.join(", "),
                        values.join(", ")
                    ));
                }
                params
                    .iter()
                    .map(|(name, value)| {
                        self.pre_process(scope, pre_process, &format!("parameter {}", name), value)
                    })
                    .collect()
            }
            other => {
                if trace {
                    scope.log(format!("Calling function with direct input: {}", display_string(other)));
                }
                Ok(vec![self.pre_process(scope, pre_process, "direct input", other)?])
            }
        }
    }

    /// Transform one array argument. A throwing hook falls back to the
    /// untransformed value; the failure is written to the case's logs.
    fn pre_process<'js>(
        &self,
        scope: &Scope<'js>,
        hook: Option<&Function<'js>>,
        target: &str,
        value: &serde_json::Value,
    ) -> GradeResult<Value<'js>> {
        let arg = scope.from_json(value)?;
        let Some(hook) = hook.filter(|_| value.is_array()) else {
            return Ok(arg);
        };

        if self.config.trace_harness {
            scope.log(format!("Applying pre-processing to {}", target));
        }

        match scope.call(hook, vec![arg]) {
            Ok(transformed) => Ok(transformed),
            Err(e @ GradeError::Timeout { .. }) => Err(e),
            Err(e) => {
                scope.log(transform_note(TransformStage::PreProcess, &e));
                scope.from_json(value)
            }
        }
    }

    /// Post-process (when configured) and serialize the result.
    fn finish<'js>(&self, scope: &Scope<'js>, program: &Program, raw: Value<'js>) -> GradeResult<Option<String>> {
        let result = match program.post_process.as_ref() {
            Some(post) if !raw.is_undefined() => {
                if self.config.trace_harness {
                    scope.log("Applying post-processing to result");
                }
                let transformed = scope.load(&post.body, &[post.name.as_str()]).and_then(|hooks| {
                    let hook = hooks
                        .first()
                        .ok_or_else(|| GradeError::Invocation(format!("{} is not defined", post.name)))?;
                    scope.call(hook, vec![raw.clone()])
                });
                match transformed {
                    Ok(value) => value,
                    Err(e @ GradeError::Timeout { .. }) => return Err(e),
                    Err(e) => {
                        // TODO: surface post-processing fallbacks on the result card once the UI can show warnings
                        scope.log(transform_note(TransformStage::PostProcess, &e));
                        raw
                    }
                }
            }
            Some(_) => raw,
            None if raw.is_null() => scope.from_json(&serde_json::Value::Array(Vec::new()))?,
            None => raw,
        };

        let actual = scope.to_json(&result)?;
        if self.config.trace_harness {
            scope.log(format!("Function returned: {}", actual.as_deref().unwrap_or("undefined")));
        }
        Ok(actual)
    }
}

/// Grade with the default configuration.
///
/// `pre_process` / `post_process` are optional transform sources.
pub fn run_test_cases(
    source: &str,
    test_cases: &[TestCase],
    pre_process: Option<&str>,
    post_process: Option<&str>,
) -> Vec<TestResult> {
    let submission = Submission {
        source: source.to_string(),
        pre_process: pre_process.map(str::to_string),
        post_process: post_process.map(str::to_string),
    };
    Grader::default().run_test_cases(&submission, test_cases)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_ms() {
        assert_eq!(round_ms(Duration::from_micros(400)), 0);
        assert_eq!(round_ms(Duration::from_micros(1500)), 2);
        assert_eq!(round_ms(Duration::from_millis(12)), 12);
    }

    #[test]
    fn test_program_exports_include_pre_process() {
        let engine = ScriptEngine::new(&GraderConfig::default()).unwrap();
        let submission = Submission::new("function f(list) { return list; }")
            .with_pre_process("function toList(a) { return a; }");
        let program = Program::prepare(&engine, &submission).unwrap();

        assert_eq!(program.exports(), vec!["f", "toList"]);
        assert!(program.notes.is_empty());
        assert!(program.body.starts_with("function toList"));
    }

    #[test]
    fn test_unresolvable_hooks_become_notes() {
        let engine = ScriptEngine::new(&GraderConfig::default()).unwrap();
        let submission = Submission::new("function f(x) { return x; }")
            .with_pre_process("class Node {}")
            .with_post_process("42");
        let program = Program::prepare(&engine, &submission).unwrap();

        assert_eq!(program.exports(), vec!["f"]);
        assert!(program.post_process.is_none());
        assert_eq!(program.notes.len(), 2);
        assert!(program.notes[0].starts_with("[error] Error in pre-processing"));
        assert!(program.notes[1].starts_with("[error] Error in post-processing"));
    }

    #[test]
    fn test_prepare_rejects_missing_entry_point() {
        let engine = ScriptEngine::new(&GraderConfig::default()).unwrap();
        let err = Program::prepare(&engine, &Submission::new("return 42;")).err().unwrap();
        assert!(matches!(err, GradeError::NameResolution { .. }));
    }

    #[test]
    fn test_prepare_rejects_syntax_errors() {
        let engine = ScriptEngine::new(&GraderConfig::default()).unwrap();
        let err = Program::prepare(&engine, &Submission::new("function f( { return 1 }"))
            .err()
            .unwrap();
        assert!(matches!(err, GradeError::Compilation(_)));
    }
}
