/// Script Engine - Sandboxed JavaScript Execution
///
/// **Core Responsibility:**
/// Own the embedded interpreter that learner code runs in.
///
/// **Isolation Rules:**
/// 1. One QuickJS `Runtime` per grading run, never shared between runs
/// 2. A fresh `Context` per test case, so top-level state cannot leak across cases
/// 3. Memory and stack limits come from `GraderConfig`
/// 4. A wall-clock deadline is enforced through the interpreter's interrupt hook
/// 5. `console.*` writes into a buffer owned by the instance, nothing global is swapped
///
/// The engine does not know about test cases or scoring; it exposes a small
/// `Scope` API the executor drives.

use crate::error::{GradeError, GradeResult};
use rquickjs::{Context, Ctx, Function, Object, Runtime, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use tutor_common::config::GraderConfig;
use tutor_common::types::SyntaxCheck;

/// Installed into every context before learner code runs. Defines `console`
/// on top of the Rust-side `emit` sink plus the `__harness` helpers.
const BOOTSTRAP: &str = r#"
(function (emit) {
  'use strict';
  const render = (arg) => {
    if (typeof arg === 'object') {
      try {
        return JSON.stringify(arg);
      } catch (e) {
        return String(arg);
      }
    }
    return String(arg);
  };
  const line = (prefix) => (...args) => emit(prefix + args.map(render).join(' '));
  const console = {
    log: line(''),
    info: line(''),
    debug: line(''),
    warn: line('[warn] '),
    error: line('[error] '),
  };
  const harness = {
    pending: undefined,
    compile: (body) => { new Function(body); },
    load: (body) => new Function(body)(),
    parse: (text) => JSON.parse(text),
    stringify: (value) => JSON.stringify(value),
    spread: (fn, args) => fn(...args),
    settle: (value) => {
      const slot = { state: 'pending' };
      Promise.resolve(value).then(
        (v) => { slot.state = 'fulfilled'; slot.value = v; },
        (e) => { slot.state = 'rejected'; slot.reason = e; },
      );
      harness.pending = slot;
    },
    describe: (error) => {
      if (error instanceof Error) return error.message || error.name || 'Execution error';
      if (typeof error === 'string') return error;
      try {
        const text = JSON.stringify(error);
        if (text !== undefined) return text;
      } catch (e) {}
      return String(error);
    },
  };
  Object.defineProperty(globalThis, 'console', { value: console, writable: true, configurable: true });
  Object.defineProperty(globalThis, '__harness', { value: harness });
})
"#;

/// Build a function body that evaluates `source` and returns the named
/// bindings as an array, in order.
///
/// Names must come from the analyzer, which only yields plain identifiers.
pub fn program_body(source: &str, exports: &[&str]) -> String {
    format!("{}\n;return [{}];", source, exports.join(", "))
}

/// Jobs run while tearing down a context; past this the rest are left to runtime teardown
const MAX_DISCARDED_JOBS: usize = 100_000;

/// Shared wall-clock deadline polled by the interrupt handler
#[derive(Clone, Default)]
struct Deadline(Arc<Mutex<Option<Instant>>>);

impl Deadline {
    fn set(&self, at: Option<Instant>) {
        self.replace(at);
    }

    fn replace(&self, at: Option<Instant>) -> Option<Instant> {
        match self.0.lock() {
            Ok(mut slot) => std::mem::replace(&mut *slot, at),
            Err(_) => None,
        }
    }

    fn expired(&self) -> bool {
        self.0
            .lock()
            .ok()
            .and_then(|slot| *slot)
            .is_some_and(|at| Instant::now() >= at)
    }
}

/// Deadline guard - clears the budget when dropped, on every exit path
pub struct DeadlineGuard<'a> {
    deadline: &'a Deadline,
}

impl Drop for DeadlineGuard<'_> {
    fn drop(&mut self) {
        self.deadline.set(None);
    }
}

/// QuickJS runtime with the resource limits of one grading run
pub struct ScriptEngine {
    runtime: Runtime,
    deadline: Deadline,
    timeout_ms: u64,
    max_source_bytes: usize,
}

impl ScriptEngine {
    pub fn new(config: &GraderConfig) -> GradeResult<Self> {
        let runtime = Runtime::new()?;
        runtime.set_memory_limit(config.memory_limit_bytes());
        runtime.set_max_stack_size(config.max_stack_bytes());

        let deadline = Deadline::default();
        let watch = deadline.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || watch.expired())));

        debug!(
            memory_mb = config.memory_limit_mb,
            stack_kb = config.max_stack_kb,
            timeout_ms = config.timeout_ms,
            "Script engine ready"
        );

        Ok(Self {
            runtime,
            deadline,
            timeout_ms: config.timeout_ms,
            max_source_bytes: config.max_source_bytes,
        })
    }

    /// Start the per-case wall-clock budget. The budget ends when the guard drops.
    pub fn arm(&self) -> DeadlineGuard<'_> {
        self.deadline
            .set(Some(Instant::now() + Duration::from_millis(self.timeout_ms)));
        DeadlineGuard {
            deadline: &self.deadline,
        }
    }

    /// Reject pathological inputs before they reach the interpreter
    pub fn check_size(&self, source: &str) -> GradeResult<()> {
        if source.len() > self.max_source_bytes {
            return Err(GradeError::Compilation(format!(
                "Source code exceeds maximum size of {} bytes",
                self.max_source_bytes
            )));
        }
        Ok(())
    }

    /// Parse `body` as a function body without running it
    pub fn check_syntax(&self, body: &str) -> GradeResult<()> {
        self.check_size(body)?;
        let instance = self.instantiate()?;
        instance
            .with(|scope| scope.compile(body))
            .map_err(|e| match e {
                GradeError::Invocation(message) => GradeError::Compilation(message),
                other => other,
            })
    }

    /// Fresh context with `console` bound to a new, empty output buffer
    pub fn instantiate(&self) -> GradeResult<Instance<'_>> {
        let context = Context::full(&self.runtime)?;
        let logs = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&logs);
        context.with(|ctx| -> rquickjs::Result<()> {
            let emit = Function::new(ctx.clone(), move |line: String| {
                sink.borrow_mut().push(line);
            })?;
            let boot: Function = ctx.eval(BOOTSTRAP)?;
            boot.call::<_, ()>((emit,))
        })?;

        Ok(Instance {
            engine: self,
            context,
            logs,
        })
    }

    fn drain_jobs(&self) -> GradeResult<()> {
        while self.runtime.is_job_pending() {
            if self.deadline.expired() {
                return Err(GradeError::Timeout {
                    limit_ms: self.timeout_ms,
                });
            }
            match self.runtime.execute_pending_job() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(failed) => {
                    // the exception stays pending on the job's context until taken
                    failed.0.with(|ctx| drop(ctx.catch()));
                    if self.deadline.expired() {
                        return Err(GradeError::Timeout {
                            limit_ms: self.timeout_ms,
                        });
                    }
                    return Err(GradeError::Invocation(
                        "Unhandled error in asynchronous job".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Run whatever is still queued under an already expired deadline, so
    /// every leftover job is interrupted at its next poll and its exception
    /// cleared before the owning context goes away.
    fn discard_jobs(&self) {
        if !self.runtime.is_job_pending() {
            return;
        }

        let previous = self.deadline.replace(Some(Instant::now()));
        let mut discarded = 0;
        while discarded < MAX_DISCARDED_JOBS && self.runtime.is_job_pending() {
            match self.runtime.execute_pending_job() {
                Ok(true) => discarded += 1,
                Ok(false) => break,
                Err(failed) => {
                    failed.0.with(|ctx| drop(ctx.catch()));
                    discarded += 1;
                }
            }
        }
        self.deadline.set(previous);

        debug!(discarded, "Discarded pending jobs");
    }
}


/// One interpreter context plus its private output buffer
pub struct Instance<'e> {
    engine: &'e ScriptEngine,
    context: Context,
    logs: Rc<RefCell<Vec<String>>>,
}

impl Drop for Instance<'_> {
    fn drop(&mut self) {
        self.engine.discard_jobs();
    }
}

impl Instance<'_> {
    /// Run `f` with access to the context's values.
    pub fn with<F, R>(&self, f: F) -> GradeResult<R>
    where
        F: for<'js> FnOnce(&Scope<'js>) -> GradeResult<R>,
    {
        self.context.with(|ctx| {
            let harness: Object = ctx.globals().get("__harness")?;
            let scope = Scope {
                ctx,
                harness,
                logs: Rc::clone(&self.logs),
                deadline: self.engine.deadline.clone(),
                timeout_ms: self.engine.timeout_ms,
            };
            f(&scope)
        })
    }

    /// Run queued promise jobs until the queue is empty or the budget runs out
    pub fn drain_jobs(&self) -> GradeResult<()> {
        self.engine.drain_jobs()
    }

    pub fn log(&self, line: impl Into<String>) {
        self.logs.borrow_mut().push(line.into());
    }

    /// Lines captured so far, in emission order
    pub fn logs(&self) -> Vec<String> {
        self.logs.borrow().clone()
    }
}

/// Borrowed view of a context for the duration of one `Instance::with` call
pub struct Scope<'js> {
    ctx: Ctx<'js>,
    harness: Object<'js>,
    logs: Rc<RefCell<Vec<String>>>,
    deadline: Deadline,
    timeout_ms: u64,
}

impl<'js> Scope<'js> {
    pub fn log(&self, line: impl Into<String>) {
        self.logs.borrow_mut().push(line.into());
    }

    fn helper(&self, name: &str) -> GradeResult<Function<'js>> {
        Ok(self.harness.get(name)?)
    }

    /// Convert an interpreter failure into a grading error, reading the
    /// pending exception when there is one.
    pub fn caught(&self, err: rquickjs::Error) -> GradeError {
        let thrown = err.is_exception().then(|| self.ctx.catch());
        if self.deadline.expired() {
            return GradeError::Timeout {
                limit_ms: self.timeout_ms,
            };
        }
        match thrown {
            Some(thrown) => GradeError::Invocation(self.describe(thrown)),
            None => GradeError::Invocation(err.to_string()),
        }
    }

    fn describe(&self, thrown: Value<'js>) -> String {
        self.helper("describe")
            .ok()
            .and_then(|describe| describe.call::<_, String>((thrown,)).ok())
            .unwrap_or_else(|| "Execution error".to_string())
    }

    pub fn compile(&self, body: &str) -> GradeResult<()> {
        self.helper("compile")?
            .call::<_, ()>((body,))
            .map_err(|e| self.caught(e))
    }

    /// Execute a program body built by [`program_body`] and return its exports.
    ///
    /// A body that returns early (a top-level `return` in the submission)
    /// never reaches the export list and fails here.
    pub fn load(&self, body: &str, exports: &[&str]) -> GradeResult<Vec<Function<'js>>> {
        let returned: Value<'js> = self
            .helper("load")?
            .call((body,))
            .map_err(|e| self.caught(e))?;

        let values: Vec<Value<'js>> = match returned.into_array() {
            Some(array) => array.iter::<Value<'js>>().collect::<rquickjs::Result<_>>()?,
            None => Vec::new(),
        };
        if values.len() != exports.len() {
            return Err(GradeError::Invocation(format!(
                "Could not load {}: the code returned before its declarations",
                exports.join(", ")
            )));
        }

        exports
            .iter()
            .zip(values)
            .map(|(name, value)| {
                value
                    .into_function()
                    .ok_or_else(|| GradeError::Invocation(format!("{} is not a function", name)))
            })
            .collect()
    }

    pub fn from_json(&self, value: &serde_json::Value) -> GradeResult<Value<'js>> {
        let text =
            serde_json::to_string(value).map_err(|e| GradeError::Engine(e.to_string()))?;
        self.helper("parse")?
            .call((text,))
            .map_err(|e| self.caught(e))
    }

    /// `JSON.stringify` the value; `None` when there is nothing to serialize (`undefined`)
    pub fn to_json(&self, value: &Value<'js>) -> GradeResult<Option<String>> {
        self.helper("stringify")?
            .call((value.clone(),))
            .map_err(|e| self.caught(e))
    }

    pub fn call(&self, function: &Function<'js>, args: Vec<Value<'js>>) -> GradeResult<Value<'js>> {
        self.helper("spread")?
            .call((function.clone(), args))
            .map_err(|e| self.caught(e))
    }

    /// Resolve a call result the way `await` would, plain values included.
    /// Read the outcome with [`Scope::settled`] after the job queue has been drained.
    pub fn settle(&self, value: Value<'js>) -> GradeResult<()> {
        self.helper("settle")?
            .call::<_, ()>((value,))
            .map_err(|e| self.caught(e))
    }

    pub fn settled(&self) -> GradeResult<Value<'js>> {
        let slot: Object<'js> = self.harness.get("pending")?;
        let state: String = slot.get("state")?;
        match state.as_str() {
            "fulfilled" => Ok(slot.get("value")?),
            "rejected" => {
                let reason: Value<'js> = slot.get("reason")?;
                Err(GradeError::Invocation(self.describe(reason)))
            }
            _ if self.deadline.expired() => Err(GradeError::Timeout {
                limit_ms: self.timeout_ms,
            }),
            _ => Err(GradeError::Invocation(
                "Returned promise never settled".to_string(),
            )),
        }
    }
}

/// Cheap syntax gate: parses the submission as a function body without
/// executing it. Advisory only; passing does not rule out runtime errors.
pub fn validate_syntax(source: &str) -> SyntaxCheck {
    let engine = match ScriptEngine::new(&GraderConfig::default()) {
        Ok(engine) => engine,
        Err(e) => {
            warn!(error = %e, "Could not start script engine for syntax check");
            return SyntaxCheck::invalid(e.to_string());
        }
    };

    match engine.check_syntax(source) {
        Ok(()) => SyntaxCheck::ok(),
        Err(e) => SyntaxCheck::invalid(e.to_string()),
    }
}
