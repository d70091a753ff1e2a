//! Isolation boundary
//!
//! Owns one fresh engine context with the capability whitelist installed.
//! Every fault raised inside it is converted into an [`ErrorRecord`] here
//! and never unwinds into the host.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use boa_engine::{
    native_function::NativeFunction, Context, JsArgs, JsError, JsNativeErrorKind, JsObject,
    JsString, JsValue, Source,
};

use super::capabilities::{CapabilitySet, Revocation};
use super::chart::ImageOptions;
use super::executor::ErrorRecord;
use super::timers::TimerQueue;
use crate::error::{Error, Result};

/// Runs `chart.toImage` on a JSON clone of the figure and reports the
/// settled value, whether `toImage` returns a string or a promise.
const RENDER_GLUE: &str = r#"
(function (chart, figure, options, settle) {
    Promise.resolve()
        .then(function () {
            return chart.toImage(JSON.parse(JSON.stringify(figure)), options);
        })
        .then(
            function (uri) { settle(true, uri); },
            function (err) { settle(false, err); }
        );
})
"#;

type Settlement = std::result::Result<JsValue, JsValue>;

/// A single-use sandbox
pub struct IsolationBoundary {
    context: Context,
    timers: TimerQueue,
    revocation: Revocation,
    deadline: Instant,
    budget: Duration,
}

impl IsolationBoundary {
    /// Build a fresh context holding exactly `capabilities`.
    ///
    /// `deadline` is when the run started plus `budget`.
    pub fn new(capabilities: CapabilitySet, deadline: Instant, budget: Duration) -> Result<Self> {
        let mut context = Context::default();

        let timers = capabilities.schedule_timer.clone();
        let revocation = capabilities.revocation().clone();
        capabilities
            .install(&mut context)
            .map_err(|e| Error::Sandbox(format!("Failed to install capabilities: {}", e)))?;

        Ok(IsolationBoundary {
            context,
            timers,
            revocation,
            deadline,
            budget,
        })
    }

    /// Abort any single loop that runs more than `max` iterations.
    ///
    /// The host cannot interrupt the engine, so this is what eventually ends
    /// a worker whose script outlived its deadline.
    pub fn limit_loop_iterations(&mut self, max: u64) {
        self.context
            .runtime_limits_mut()
            .set_loop_iteration_limit(max);
    }

    /// Run `source` to completion, including every timer it schedules.
    pub fn evaluate(&mut self, source: &str) -> std::result::Result<(), ErrorRecord> {
        self.check_deadline()?;
        tracing::debug!(source_len = source.len(), "evaluating script");

        let result = self.context.eval(Source::from_bytes(source));
        if let Err(error) = result {
            self.check_deadline()?;
            return Err(self.classify(error));
        }
        self.check_deadline()?;

        self.run_event_loop()
    }

    /// Value bound to `name` in the global scope, lexical bindings
    /// included; `None` when unbound or `undefined`.
    pub fn binding(&mut self, name: &str) -> std::result::Result<Option<JsValue>, ErrorRecord> {
        self.check_deadline()?;
        if !is_identifier(name) {
            return Err(ErrorRecord::runtime(format!("'{}' is not an identifier", name)));
        }

        let query = format!("typeof {0} === \"undefined\" ? undefined : {0}", name);
        let value = self
            .context
            .eval(Source::from_bytes(&query))
            .map_err(|e| self.classify(e))?;
        Ok((!value.is_undefined()).then_some(value))
    }

    /// Ask `chart` to render `figure`; returns the data URI it produced.
    pub fn render_chart(
        &mut self,
        chart: &JsValue,
        figure: &JsValue,
        options: &ImageOptions,
    ) -> std::result::Result<String, ErrorRecord> {
        self.check_deadline()?;

        let settlement: Rc<RefCell<Option<Settlement>>> = Rc::default();
        let slot = settlement.clone();
        // SAFETY: the slot only ever holds values created by this context and
        // is dropped before the context.
        let settle = unsafe {
            NativeFunction::from_closure(move |_this, args, _context| {
                let value = args.get_or_undefined(1).clone();
                let outcome = if args.get_or_undefined(0).to_boolean() {
                    Ok(value)
                } else {
                    Err(value)
                };
                slot.borrow_mut().get_or_insert(outcome);
                Ok(JsValue::undefined())
            })
        };
        let realm = self.context.realm().clone();
        let settle = settle.to_js_function(&realm);

        let options = serde_json::to_value(options)
            .map_err(|e| ErrorRecord::visualization(e.to_string()))?;
        let options = JsValue::from_json(&options, &mut self.context)
            .map_err(|e| self.classify(e))?;

        let glue = self
            .context
            .eval(Source::from_bytes(RENDER_GLUE))
            .map_err(|e| self.classify(e))?;
        let glue = glue
            .as_callable()
            .ok_or_else(|| ErrorRecord::visualization("render glue is not callable"))?
            .clone();
        glue.call(
            &JsValue::undefined(),
            &[chart.clone(), figure.clone(), options, JsValue::from(settle)],
            &mut self.context,
        )
        .map_err(|e| self.classify(e))?;

        self.context.run_jobs();
        self.check_deadline()?;

        let outcome = settlement.borrow_mut().take();
        match outcome {
            Some(Ok(uri)) => match uri.as_string() {
                Some(uri) => Ok(uri.to_std_string_escaped()),
                None => Err(ErrorRecord::visualization(format!(
                    "chart renderer returned {} instead of a data URI",
                    uri.type_of()
                ))),
            },
            Some(Err(reason)) => {
                let cause = self.describe_thrown(&reason);
                Err(ErrorRecord {
                    trace: cause.trace.clone(),
                    ..ErrorRecord::visualization(cause.to_string())
                })
            }
            None => Err(ErrorRecord::visualization("chart rendering never settled")),
        }
    }

    /// Drive promise jobs and timers until both are exhausted.
    fn run_event_loop(&mut self) -> std::result::Result<(), ErrorRecord> {
        loop {
            self.context.run_jobs();
            if self.revocation.is_revoked() {
                return Err(ErrorRecord::timeout(self.budget));
            }

            let Some(timer) = self.timers.pop_next() else {
                return Ok(());
            };
            if timer.due > self.deadline {
                tracing::debug!(timer_id = timer.id, "next timer falls after the deadline");
                self.timers.clear();
                return Err(ErrorRecord::timeout(self.budget));
            }

            let now = Instant::now();
            if timer.due > now {
                std::thread::sleep(timer.due - now);
            }
            self.check_deadline()?;

            tracing::trace!(timer_id = timer.id, "firing timer");
            if let Err(error) = timer
                .callback
                .call(&JsValue::undefined(), &timer.args, &mut self.context)
            {
                self.timers.clear();
                return Err(self.classify(error));
            }
        }
    }

    fn check_deadline(&self) -> std::result::Result<(), ErrorRecord> {
        if self.revocation.is_revoked() || Instant::now() >= self.deadline {
            return Err(ErrorRecord::timeout(self.budget));
        }
        Ok(())
    }

    /// Convert an engine error into a record.
    fn classify(&mut self, error: JsError) -> ErrorRecord {
        if let Some(native) = error.as_native() {
            return ErrorRecord::script(native_name(&native.kind), native.message(), None);
        }
        match error.as_opaque() {
            Some(value) => {
                let value = value.clone();
                self.describe_thrown(&value)
            }
            None => ErrorRecord::runtime(error.to_string()),
        }
    }

    /// Describe a thrown JavaScript value the way `{name, message, stack}`
    /// would read it.
    fn describe_thrown(&mut self, value: &JsValue) -> ErrorRecord {
        if let Some(object) = value.as_object() {
            let object = object.clone();
            let name = self
                .string_property(&object, "name")
                .unwrap_or_else(|| "Error".to_string());
            let message = self.string_property(&object, "message").unwrap_or_default();
            let trace = self.string_property(&object, "stack");
            return ErrorRecord::script(name, message, trace);
        }

        let message = match value.to_string(&mut self.context) {
            Ok(text) => text.to_std_string_escaped(),
            Err(_) => value.display().to_string(),
        };
        ErrorRecord::runtime(message)
    }

    fn string_property(&mut self, object: &JsObject, key: &str) -> Option<String> {
        let value = object.get(JsString::from(key), &mut self.context).ok()?;
        if value.is_null_or_undefined() {
            return None;
        }
        value
            .to_string(&mut self.context)
            .ok()
            .map(|text| text.to_std_string_escaped())
    }
}

fn native_name(kind: &JsNativeErrorKind) -> &'static str {
    match kind {
        JsNativeErrorKind::Aggregate(_) => "AggregateError",
        JsNativeErrorKind::Error => "Error",
        JsNativeErrorKind::Eval => "EvalError",
        JsNativeErrorKind::Range => "RangeError",
        JsNativeErrorKind::Reference => "ReferenceError",
        JsNativeErrorKind::Syntax => "SyntaxError",
        JsNativeErrorKind::Type => "TypeError",
        JsNativeErrorKind::Uri => "URIError",
        JsNativeErrorKind::RuntimeLimit => "RangeError",
        #[allow(unreachable_patterns)]
        _ => "Error",
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
