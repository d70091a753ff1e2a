//! `setTimeout`, the one scheduling primitive scripts get
//!
//! Callbacks are queued here and driven by the isolation boundary after the
//! main script returns, earliest due first and FIFO among equal due times.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use boa_engine::{
    native_function::NativeFunction, Context, JsArgs, JsNativeError, JsObject, JsResult, JsValue,
};

use super::capabilities::Revocation;

/// A queued callback
pub struct Timer {
    /// Id returned to the script
    pub id: u32,
    /// When the callback becomes runnable
    pub due: Instant,
    /// Function to invoke
    pub callback: JsObject,
    /// Extra arguments passed after the delay
    pub args: Vec<JsValue>,
}

#[derive(Default)]
struct TimerState {
    next_id: u32,
    pending: Vec<Timer>,
}

/// Pending timers of one sandbox.
///
/// Cloning shares the queue; it never leaves the worker thread.
#[derive(Clone, Default)]
pub struct TimerQueue {
    inner: Rc<RefCell<TimerState>>,
}

impl TimerQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `callback` to run after `delay`
    pub fn schedule(&self, callback: JsObject, delay: Duration, args: Vec<JsValue>) -> u32 {
        let mut state = self.inner.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        state.pending.push(Timer {
            id,
            due: Instant::now() + delay,
            callback,
            args,
        });
        id
    }

    /// Remove and return the timer that should run next
    pub fn pop_next(&self) -> Option<Timer> {
        let mut state = self.inner.borrow_mut();
        let index = state
            .pending
            .iter()
            .enumerate()
            .min_by_key(|(_, timer)| (timer.due, timer.id))
            .map(|(index, _)| index)?;
        Some(state.pending.swap_remove(index))
    }

    /// Number of queued timers
    pub fn len(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every queued callback
    pub fn clear(&self) {
        self.inner.borrow_mut().pending.clear();
    }

    /// Build the `setTimeout(callback, delay, ...args)` function
    pub fn set_timeout_function(&self, revocation: Revocation) -> NativeFunction {
        let queue = self.clone();
        // SAFETY: the closure captures no garbage-collected values directly;
        // timers queued through it are dropped together with the context.
        unsafe {
            NativeFunction::from_closure(move |_this, args, context| {
                if revocation.is_revoked() {
                    return Ok(JsValue::undefined());
                }
                let callback = match args.get_or_undefined(0).as_callable() {
                    Some(callback) => callback.clone(),
                    None => {
                        return Err(JsNativeError::typ()
                            .with_message("The \"callback\" argument must be of type function")
                            .into())
                    }
                };
                let delay = delay_from(args.get_or_undefined(1), context)?;
                let extra = args.get(2..).map(<[JsValue]>::to_vec).unwrap_or_default();
                let id = queue.schedule(callback, delay, extra);
                Ok(JsValue::from(id))
            })
        }
    }
}

/// Largest delay honoured as given; anything above runs after 1ms.
const MAX_DELAY_MS: f64 = 2_147_483_647.0;

/// Negative, NaN and non-numeric delays run as soon as possible.
fn delay_from(value: &JsValue, context: &mut Context) -> JsResult<Duration> {
    if value.is_undefined() {
        return Ok(Duration::ZERO);
    }
    let millis = value.to_number(context)?;
    if !millis.is_finite() || millis <= 0.0 {
        return Ok(Duration::ZERO);
    }
    if millis > MAX_DELAY_MS {
        return Ok(Duration::from_millis(1));
    }
    Ok(Duration::from_secs_f64(millis / 1000.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use boa_engine::Source;

    fn function(context: &mut Context, body: &str) -> JsObject {
        let value = context.eval(Source::from_bytes(body)).unwrap();
        value.as_callable().unwrap().clone()
    }

    #[test]
    fn test_pop_order_is_due_then_insertion() {
        let mut context = Context::default();
        let f = function(&mut context, "(function () {})");
        let queue = TimerQueue::new();

        let late = queue.schedule(f.clone(), Duration::from_millis(50), Vec::new());
        let first = queue.schedule(f.clone(), Duration::ZERO, Vec::new());
        let second = queue.schedule(f, Duration::ZERO, Vec::new());
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.pop_next().unwrap().id, first);
        assert_eq!(queue.pop_next().unwrap().id, second);
        assert_eq!(queue.pop_next().unwrap().id, late);
        assert!(queue.pop_next().is_none());
    }

    #[test]
    fn test_delay_coercion() {
        let mut context = Context::default();
        assert_eq!(delay_from(&JsValue::undefined(), &mut context).unwrap(), Duration::ZERO);
        assert_eq!(delay_from(&JsValue::from(-5), &mut context).unwrap(), Duration::ZERO);
        assert_eq!(
            delay_from(&JsValue::from(250), &mut context).unwrap(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_clear() {
        let mut context = Context::default();
        let f = function(&mut context, "(function () {})");
        let queue = TimerQueue::new();
        queue.schedule(f, Duration::ZERO, Vec::new());
        queue.clear();
        assert!(queue.is_empty());
    }
}
