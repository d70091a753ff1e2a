//! Capability whitelist
//!
//! The complete set of host objects a script can reach. Installing a
//! [`CapabilitySet`] binds exactly the names in [`WHITELIST`]; everything
//! else the script sees is an ECMAScript intrinsic.

use std::cell::Cell;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use boa_engine::{
    js_string, native_function::NativeFunction, object::ObjectInitializer, property::Attribute,
    Context, JsArgs, JsNativeError, JsObject, JsResult, JsString, JsValue, Source,
};
use tokio::sync::mpsc::UnboundedSender;

use super::chart::{ChartRenderer, ImageOptions};
use super::timers::TimerQueue;

/// Global names bound into every sandbox
pub const WHITELIST: [&str; 5] = ["console", "setTimeout", "Plotly", "process", "require"];

/// The one built-in module `require` resolves
pub const ALLOWED_MODULE: &str = "readline";

/// Identifier the chart handle is bound to
pub const CHART_GLOBAL: &str = "Plotly";

/// Shared kill switch; once set, capability calls are ignored.
#[derive(Debug, Clone, Default)]
pub struct Revocation(Arc<AtomicBool>);

impl Revocation {
    /// Stop honouring capability calls
    pub fn revoke(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`Revocation::revoke`] was called
    pub fn is_revoked(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Records `console.log` lines into the run's output buffer
pub struct OutputInterceptor {
    sink: UnboundedSender<String>,
    revocation: Revocation,
    max_lines: Option<usize>,
    recorded: Cell<usize>,
}

impl OutputInterceptor {
    /// Lines go to `sink` in call order, at most `max_lines` of them
    pub fn new(sink: UnboundedSender<String>, revocation: Revocation, max_lines: Option<usize>) -> Self {
        OutputInterceptor {
            sink,
            revocation,
            max_lines,
            recorded: Cell::new(0),
        }
    }

    /// Append one line. Never fails.
    pub fn record(&self, line: String) {
        if self.revocation.is_revoked() {
            return;
        }
        let recorded = self.recorded.get();
        if let Some(max) = self.max_lines {
            if recorded >= max {
                if recorded == max {
                    tracing::warn!(max_lines = max, "output limit reached, dropping further lines");
                    self.recorded.set(recorded + 1);
                }
                return;
            }
        }
        self.recorded.set(recorded + 1);
        // The receiver only goes away once the host stopped listening.
        let _ = self.sink.send(line);
    }
}

/// Render `console.log` arguments: each value as `Array.prototype.join`
/// would, separated by single spaces.
pub fn render_values(args: &[JsValue], context: &mut Context) -> String {
    args.iter()
        .map(|value| {
            if value.is_null_or_undefined() {
                return String::new();
            }
            match value.to_string(context) {
                Ok(text) => text.to_std_string_escaped(),
                Err(_) => value.display().to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Write-only handle onto the host's real standard output.
///
/// This is the one uncaptured channel: bytes written here bypass the
/// output buffer and reach the caller's stdout directly.
#[derive(Debug, Clone)]
pub struct StdoutHandle {
    revocation: Revocation,
}

impl StdoutHandle {
    /// Write `text` to the real stdout; returns whether it was written
    pub fn write(&self, text: &str) -> bool {
        if self.revocation.is_revoked() {
            return false;
        }
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(text.as_bytes())
            .and_then(|()| stdout.flush())
            .is_ok()
    }
}

/// Stand-in for the `process` global: no stdin, a write-only stdout
#[derive(Debug, Clone)]
pub struct ProcessStub {
    /// Destination of `process.stdout.write`
    pub stdout: StdoutHandle,
}

/// Everything one sandbox is allowed to touch
pub struct CapabilitySet {
    /// `console.log`
    pub record: OutputInterceptor,
    /// `setTimeout`
    pub schedule_timer: TimerQueue,
    /// `Plotly`, unbound when `None`
    pub chart: Option<Arc<dyn ChartRenderer>>,
    /// `process`
    pub process_stub: ProcessStub,
    revocation: Revocation,
}

impl CapabilitySet {
    /// Assemble the whitelist for one run
    pub fn new(
        record: OutputInterceptor,
        chart: Option<Arc<dyn ChartRenderer>>,
        revocation: Revocation,
    ) -> Self {
        CapabilitySet {
            record,
            schedule_timer: TimerQueue::new(),
            chart,
            process_stub: ProcessStub {
                stdout: StdoutHandle {
                    revocation: revocation.clone(),
                },
            },
            revocation,
        }
    }

    /// Kill switch shared by every capability in this set
    pub fn revocation(&self) -> &Revocation {
        &self.revocation
    }

    /// Bind the whitelist into `context`'s global scope
    pub fn install(self, context: &mut Context) -> JsResult<()> {
        let CapabilitySet {
            record,
            schedule_timer,
            chart,
            process_stub,
            revocation,
        } = self;

        let console = console_object(record, context);
        context.register_global_property(js_string!("console"), console, Attribute::all())?;

        let realm = context.realm().clone();
        let set_timeout = schedule_timer
            .set_timeout_function(revocation.clone())
            .to_js_function(&realm);
        context.register_global_property(js_string!("setTimeout"), set_timeout, Attribute::all())?;

        let chart = match chart {
            Some(renderer) => JsValue::from(chart_object(renderer, revocation, context)),
            None => JsValue::undefined(),
        };
        context.register_global_property(js_string!("Plotly"), chart, Attribute::all())?;

        let stdout = stdout_object(process_stub.stdout, context);
        let process = ObjectInitializer::new(context)
            .property(js_string!("stdin"), JsValue::null(), Attribute::READONLY)
            .property(js_string!("stdout"), stdout.clone(), Attribute::READONLY)
            .build();
        context.register_global_property(js_string!("process"), process, Attribute::all())?;

        let readline = readline_module(&stdout, context)?;
        let require = require_function(readline).to_js_function(&realm);
        context.register_global_property(js_string!("require"), require, Attribute::all())?;

        Ok(())
    }
}

fn console_object(record: OutputInterceptor, context: &mut Context) -> JsObject {
    // SAFETY: captures only the interceptor, which holds no GC values.
    let log = unsafe {
        NativeFunction::from_closure(move |_this, args, context| {
            record.record(render_values(args, context));
            Ok(JsValue::undefined())
        })
    };
    ObjectInitializer::new(context)
        .function(log, js_string!("log"), 0)
        .build()
}

fn stdout_object(stdout: StdoutHandle, context: &mut Context) -> JsObject {
    // SAFETY: captures only the stdout handle, which holds no GC values.
    let write = unsafe {
        NativeFunction::from_closure(move |_this, args, context| {
            let chunk = args.get_or_undefined(0);
            let text = if chunk.is_null_or_undefined() {
                String::new()
            } else {
                chunk.to_string(context)?.to_std_string_escaped()
            };
            Ok(JsValue::from(stdout.write(&text)))
        })
    };
    ObjectInitializer::new(context)
        .function(write, js_string!("write"), 1)
        .build()
}

fn chart_object(
    renderer: Arc<dyn ChartRenderer>,
    revocation: Revocation,
    context: &mut Context,
) -> JsObject {
    // SAFETY: captures an Arc to the host renderer and the kill switch only.
    let to_image = unsafe {
        NativeFunction::from_closure(move |_this, args, context| {
            if revocation.is_revoked() {
                return Ok(JsValue::undefined());
            }
            let figure = args.get_or_undefined(0).to_json(context)?;
            let options = image_options(args.get_or_undefined(1), context)?;
            let uri = renderer
                .to_image(&figure, &options)
                .map_err(|e| JsNativeError::error().with_message(e.to_string()))?;
            Ok(JsValue::from(JsString::from(uri.as_str())))
        })
    };
    ObjectInitializer::new(context)
        .function(to_image, js_string!("toImage"), 2)
        .build()
}

fn image_options(value: &JsValue, context: &mut Context) -> JsResult<ImageOptions> {
    let mut options = ImageOptions::default();
    let Some(object) = value.as_object() else {
        return Ok(options);
    };

    let format = object.get(js_string!("format"), context)?;
    if !format.is_undefined() {
        options.format = format.to_string(context)?.to_std_string_escaped();
    }
    let width = object.get(js_string!("width"), context)?;
    if !width.is_undefined() {
        options.width = width.to_u32(context)?;
    }
    let height = object.get(js_string!("height"), context)?;
    if !height.is_undefined() {
        options.height = height.to_u32(context)?;
    }
    Ok(options)
}

const READLINE_MODULE: &str = r#"
(function (stdout) {
    "use strict";
    function createInterface(options) {
        var listeners = Object.create(null);
        var closed = false;
        var prompt = options && typeof options.prompt === "string" ? options.prompt : "> ";
        var rl = {
            terminal: false,
            line: "",
            question: function (query) {
                if (!closed) stdout.write(String(query));
            },
            write: function (data) {
                if (!closed && data != null) stdout.write(String(data));
            },
            setPrompt: function (value) {
                prompt = String(value);
            },
            getPrompt: function () {
                return prompt;
            },
            prompt: function () {
                if (!closed) stdout.write(prompt);
            },
            on: function (event, listener) {
                if (typeof listener === "function") {
                    (listeners[event] = listeners[event] || []).push(listener);
                }
                return rl;
            },
            pause: function () {
                return rl;
            },
            resume: function () {
                return rl;
            },
            close: function () {
                if (closed) return;
                closed = true;
                (listeners.close || []).forEach(function (listener) {
                    listener.call(rl);
                });
            }
        };
        rl.once = rl.on;
        rl.addListener = rl.on;
        return rl;
    }
    return Object.freeze({ createInterface: createInterface });
})
"#;

/// `readline` with stdin permanently closed: prompts and writes reach the
/// process stub's stdout, answers never arrive.
fn readline_module(stdout: &JsObject, context: &mut Context) -> JsResult<JsObject> {
    let factory = context.eval(Source::from_bytes(READLINE_MODULE))?;
    let factory = factory
        .as_callable()
        .ok_or_else(|| JsNativeError::typ().with_message("readline factory is not callable"))?
        .clone();
    let module = factory.call(&JsValue::undefined(), &[JsValue::from(stdout.clone())], context)?;
    module
        .as_object()
        .map(|module| module.clone())
        .ok_or_else(|| JsNativeError::typ().with_message("readline factory returned no module").into())
}

fn require_function(readline: JsObject) -> NativeFunction {
    // SAFETY: the captured module object is owned by this context and lives
    // exactly as long as the function that references it.
    unsafe {
        NativeFunction::from_closure(move |_this, args, context| {
            let name = args.get_or_undefined(0).to_string(context)?.to_std_string_escaped();
            let name = name.strip_prefix("node:").unwrap_or(&name);
            if name == ALLOWED_MODULE {
                return Ok(JsValue::from(readline.clone()));
            }
            Err(JsNativeError::error()
                .with_message(format!("Cannot find module '{}'", name))
                .into())
        })
    }
}
