//! Host-side bridge for the two asynchronous native callbacks.
//!
//! The wrapper ABI's callbacks carry no user-data pointer, so a plain
//! `extern "C" fn` cannot find its way back to the owning instance. Each
//! instance therefore owns two runtime-constructed trampolines
//! (`libffi::middle::Closure`) whose code pointers are what the native
//! library retains. The trampolines stay alive for the whole lifetime of the
//! native handle, and the handle is released first; [`crate::FmuInstance`]
//! enforces that disposal order.
//!
//! Dispatch must tolerate delivery from a thread the binding does not
//! control, concurrently with host calls into the same instance: subscriber
//! lists are snapshotted under a mutex and invoked with the lock released,
//! and a fault inside a subscriber is caught at the boundary instead of
//! unwinding into native frames.

use std::os::raw::{c_char, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use libffi::low::ffi_cif;
use libffi::middle::{Cif, Closure, Type};

use crate::api::{LogCallbackFn, StepFinishedCallbackFn};
use crate::marshal;
use crate::types::{Fmi2Status, Fmi2StatusRaw};

/// Subscriber for the native log callback:
/// `(instance_name, status, category, message)`.
pub type LogSubscriber = Arc<dyn Fn(&str, Fmi2Status, &str, &str) + Send + Sync>;

/// Subscriber for the step-finished callback.
pub type StepFinishedSubscriber = Arc<dyn Fn(Fmi2Status) + Send + Sync>;

/// Subscriber lists shared between an instance and its trampolines.
///
/// Created with the instance so callers can register subscribers before
/// instantiation; the trampolines only come into existence at `instantiate`.
pub(crate) struct EventHub {
    log: Mutex<Vec<LogSubscriber>>,
    step_finished: Mutex<Vec<StepFinishedSubscriber>>,
}

impl EventHub {
    pub(crate) fn new() -> Self {
        EventHub {
            log: Mutex::new(Vec::new()),
            step_finished: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe_log(&self, subscriber: LogSubscriber) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
    }

    pub(crate) fn subscribe_step_finished(&self, subscriber: StepFinishedSubscriber) {
        self.step_finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
    }

    pub(crate) fn dispatch_log(
        &self,
        instance_name: &str,
        status: Fmi2Status,
        category: &str,
        message: &str,
    ) {
        let subscribers: Vec<LogSubscriber> = self
            .log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for subscriber in subscribers {
            let call = AssertUnwindSafe(|| subscriber(instance_name, status, category, message));
            if catch_unwind(call).is_err() {
                log::warn!("log subscriber panicked; event for `{instance_name}` discarded");
            }
        }
    }

    pub(crate) fn dispatch_step_finished(&self, status: Fmi2Status) {
        let subscribers: Vec<StepFinishedSubscriber> = self
            .step_finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for subscriber in subscribers {
            if catch_unwind(AssertUnwindSafe(|| subscriber(status))).is_err() {
                log::warn!("step-finished subscriber panicked; event discarded");
            }
        }
    }
}

/// Decode the log callback's raw argument frame and re-dispatch.
///
/// Strings are copied out before dispatch; the native pointers are only valid
/// for the duration of this call.
unsafe extern "C" fn log_trampoline(
    _cif: &ffi_cif,
    _result: &mut (),
    args: *const *const c_void,
    hub: &Arc<EventHub>,
) {
    let instance_name = marshal::copy_native_string(*(*args.add(0) as *const *const c_char));
    let status_raw = *(*args.add(1) as *const Fmi2StatusRaw);
    let category = marshal::copy_native_string(*(*args.add(2) as *const *const c_char));
    let message = marshal::copy_native_string(*(*args.add(3) as *const *const c_char));
    match Fmi2Status::from_raw(status_raw) {
        Some(status) => hub.dispatch_log(&instance_name, status, &category, &message),
        None => log::warn!("log callback carried unknown status code {status_raw}; dropped"),
    }
}

unsafe extern "C" fn step_finished_trampoline(
    _cif: &ffi_cif,
    _result: &mut (),
    args: *const *const c_void,
    hub: &Arc<EventHub>,
) {
    let status_raw = *(*args.add(0) as *const Fmi2StatusRaw);
    match Fmi2Status::from_raw(status_raw) {
        Some(status) => hub.dispatch_step_finished(status),
        None => {
            log::warn!("step-finished callback carried unknown status code {status_raw}; dropped")
        }
    }
}

/// The two live trampolines handed to the native `instantiate` call.
///
/// Field order matters: the closures borrow the boxed hub reference and must
/// drop before it.
pub(crate) struct CallbackBridge {
    log_closure: Closure<'static>,
    step_closure: Closure<'static>,
    _hub: Box<Arc<EventHub>>,
}

impl CallbackBridge {
    pub(crate) fn new(hub: Arc<EventHub>) -> Self {
        let hub = Box::new(hub);
        // SAFETY: the box gives the Arc a stable address and is stored next
        // to the closures, which drop first; the 'static extension never
        // outlives the allocation it points at.
        let hub_ref: &'static Arc<EventHub> =
            unsafe { &*(hub.as_ref() as *const Arc<EventHub>) };

        // fmi2Status is a C enum, i.e. a c_int, which is i32 on every
        // platform the wrapper ships for.
        let log_cif = Cif::new(
            vec![
                Type::pointer(),
                Type::i32(),
                Type::pointer(),
                Type::pointer(),
            ],
            Type::void(),
        );
        let log_closure = Closure::new(log_cif, log_trampoline, hub_ref);

        let step_cif = Cif::new(vec![Type::i32()], Type::void());
        let step_closure = Closure::new(step_cif, step_finished_trampoline, hub_ref);

        CallbackBridge {
            log_closure,
            step_closure,
            _hub: hub,
        }
    }

    /// Code pointer the native library will call for log messages.
    pub(crate) fn log_ptr(&self) -> LogCallbackFn {
        // SAFETY: the closure was built over a cif matching this signature.
        let f: &LogCallbackFn = unsafe { self.log_closure.instantiate_code_ptr() };
        *f
    }

    /// Code pointer the native library will call when an asynchronous step
    /// finishes.
    pub(crate) fn step_finished_ptr(&self) -> StepFinishedCallbackFn {
        // SAFETY: the closure was built over a cif matching this signature.
        let f: &StepFinishedCallbackFn = unsafe { self.step_closure.instantiate_code_ptr() };
        *f
    }
}
