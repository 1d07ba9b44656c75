//! Mock native surface for unit tests.
//!
//! A complete [`Fmi2Api`] built from Rust `extern "C"` functions over one
//! shared state block: per-entry call counters, an echoing variable store,
//! and the callback pointers captured at `instantiate` so tests can fire
//! log / step-finished events the way the native library would.
//!
//! The state is global, so tests that use the mock must serialize through
//! [`setup`], which also resets the state.

use std::collections::HashMap;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::{c_char, c_int};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use crate::api::{Fmi2Api, LogCallbackFn, StepFinishedCallbackFn};
use crate::types::{
    Fmi2Boolean, Fmi2Byte, Fmi2FmuStateRaw, Fmi2Integer, Fmi2Real, Fmi2Status, Fmi2StatusRaw,
    Fmi2ValueReference, RawEventInfo, FMI2_FALSE, FMI2_TRUE,
};

#[derive(Default)]
struct MockState {
    calls: HashMap<&'static str, usize>,
    reals: HashMap<Fmi2ValueReference, Fmi2Real>,
    integers: HashMap<Fmi2ValueReference, Fmi2Integer>,
    booleans: HashMap<Fmi2ValueReference, Fmi2Boolean>,
    strings: HashMap<Fmi2ValueReference, CString>,
    log_callback: Option<LogCallbackFn>,
    step_finished_callback: Option<StepFinishedCallbackFn>,
    fail_instantiate: bool,
    /// Status returned by every status-returning entry point.
    status: Fmi2StatusRaw,
    real_status: Fmi2Real,
    integer_status: Fmi2Integer,
    boolean_status: Fmi2Boolean,
    string_status: CString,
    /// Address of the last FMU state handed to `set_fmu_state`.
    last_fmu_state: usize,
}

fn state() -> &'static Mutex<MockState> {
    static STATE: OnceLock<Mutex<MockState>> = OnceLock::new();
    STATE.get_or_init(|| Mutex::new(MockState::default()))
}

fn lock_state() -> MutexGuard<'static, MockState> {
    state().lock().unwrap_or_else(PoisonError::into_inner)
}

/// Take the serial-test lock and reset the mock state.
///
/// Hold the returned guard for the whole test; a panicking test (e.g. a
/// `should_panic` precondition check) leaves the lock poisoned, which the
/// accessors recover from.
pub(crate) fn setup() -> MutexGuard<'static, ()> {
    static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
    let guard = GUARD
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    *lock_state() = MockState::default();
    guard
}

/// Non-null sentinel standing in for a live native instance. Never
/// dereferenced by the mock.
pub(crate) fn mock_handle() -> *mut c_void {
    1usize as *mut c_void
}

/// Non-null sentinel standing in for an FMU state snapshot.
pub(crate) fn mock_fmu_state() -> Fmi2FmuStateRaw {
    0x10usize as *mut c_void
}

pub(crate) fn call_count(name: &str) -> usize {
    lock_state().calls.get(name).copied().unwrap_or(0)
}

pub(crate) fn total_calls() -> usize {
    lock_state().calls.values().sum()
}

pub(crate) fn set_fail_instantiate(fail: bool) {
    lock_state().fail_instantiate = fail;
}

pub(crate) fn set_status(status: Fmi2Status) {
    lock_state().status = status.as_raw();
}

pub(crate) fn set_real_status(value: Fmi2Real) {
    lock_state().real_status = value;
}

pub(crate) fn last_fmu_state() -> usize {
    lock_state().last_fmu_state
}

pub(crate) fn log_callback() -> Option<LogCallbackFn> {
    lock_state().log_callback
}

pub(crate) fn step_finished_callback() -> Option<StepFinishedCallbackFn> {
    lock_state().step_finished_callback
}

fn record(name: &'static str) -> Fmi2StatusRaw {
    let mut state = lock_state();
    *state.calls.entry(name).or_insert(0) += 1;
    state.status
}

// Entry points.

extern "C" fn instantiate(
    _file_name: *const c_char,
    log: LogCallbackFn,
    step_finished: StepFinishedCallbackFn,
    _instance_name: *const c_char,
    _fmu_type: c_int,
    _guid: *const c_char,
    _resource_location: *const c_char,
    _visible: Fmi2Boolean,
    _logging_on: Fmi2Boolean,
) -> *mut c_void {
    let mut state = lock_state();
    *state.calls.entry("instantiate").or_insert(0) += 1;
    state.log_callback = Some(log);
    state.step_finished_callback = Some(step_finished);
    if state.fail_instantiate {
        std::ptr::null_mut()
    } else {
        mock_handle()
    }
}

extern "C" fn free_instance(_handle: *mut c_void) {
    record("free_instance");
}

extern "C" fn set_debug_logging(
    _handle: *mut c_void,
    _logging_on: Fmi2Boolean,
    _n_categories: usize,
    _categories: *const *const c_char,
) -> Fmi2StatusRaw {
    record("set_debug_logging")
}

static TYPES_PLATFORM: &[u8] = b"default\0";
static FMI_VERSION: &[u8] = b"2.0\0";

extern "C" fn get_types_platform(_handle: *mut c_void) -> *const c_char {
    record("get_types_platform");
    TYPES_PLATFORM.as_ptr() as *const c_char
}

extern "C" fn get_version(_handle: *mut c_void) -> *const c_char {
    record("get_version");
    FMI_VERSION.as_ptr() as *const c_char
}

extern "C" fn setup_experiment(
    _handle: *mut c_void,
    _tolerance_defined: Fmi2Boolean,
    _tolerance: Fmi2Real,
    _start_time: Fmi2Real,
    _stop_time_defined: Fmi2Boolean,
    _stop_time: Fmi2Real,
) -> Fmi2StatusRaw {
    record("setup_experiment")
}

macro_rules! lifecycle_mock {
    ($name:ident) => {
        extern "C" fn $name(_handle: *mut c_void) -> Fmi2StatusRaw {
            record(stringify!($name))
        }
    };
}

lifecycle_mock!(enter_initialization_mode);
lifecycle_mock!(exit_initialization_mode);
lifecycle_mock!(terminate);
lifecycle_mock!(reset);
lifecycle_mock!(enter_event_mode);
lifecycle_mock!(enter_continuous_time_mode);
lifecycle_mock!(cancel_step);

extern "C" fn get_real(
    _handle: *mut c_void,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    values: *mut Fmi2Real,
) -> Fmi2StatusRaw {
    let mut state = lock_state();
    *state.calls.entry("get_real").or_insert(0) += 1;
    let refs = unsafe { std::slice::from_raw_parts(vr, nvr) };
    let out = unsafe { std::slice::from_raw_parts_mut(values, nvr) };
    for (slot, reference) in out.iter_mut().zip(refs) {
        *slot = state.reals.get(reference).copied().unwrap_or(0.0);
    }
    state.status
}

extern "C" fn get_integer(
    _handle: *mut c_void,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    values: *mut Fmi2Integer,
) -> Fmi2StatusRaw {
    let mut state = lock_state();
    *state.calls.entry("get_integer").or_insert(0) += 1;
    let refs = unsafe { std::slice::from_raw_parts(vr, nvr) };
    let out = unsafe { std::slice::from_raw_parts_mut(values, nvr) };
    for (slot, reference) in out.iter_mut().zip(refs) {
        *slot = state.integers.get(reference).copied().unwrap_or(0);
    }
    state.status
}

extern "C" fn get_boolean(
    _handle: *mut c_void,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    values: *mut Fmi2Boolean,
) -> Fmi2StatusRaw {
    let mut state = lock_state();
    *state.calls.entry("get_boolean").or_insert(0) += 1;
    let refs = unsafe { std::slice::from_raw_parts(vr, nvr) };
    let out = unsafe { std::slice::from_raw_parts_mut(values, nvr) };
    for (slot, reference) in out.iter_mut().zip(refs) {
        *slot = state.booleans.get(reference).copied().unwrap_or(FMI2_FALSE);
    }
    state.status
}

extern "C" fn get_string(
    _handle: *mut c_void,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    values: *mut *const c_char,
) -> Fmi2StatusRaw {
    let mut state = lock_state();
    *state.calls.entry("get_string").or_insert(0) += 1;
    let refs = unsafe { std::slice::from_raw_parts(vr, nvr) };
    let out = unsafe { std::slice::from_raw_parts_mut(values, nvr) };
    for (slot, reference) in out.iter_mut().zip(refs) {
        *slot = state
            .strings
            .entry(*reference)
            .or_insert_with(CString::default)
            .as_ptr();
    }
    state.status
}

extern "C" fn set_real(
    _handle: *mut c_void,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    values: *const Fmi2Real,
) -> Fmi2StatusRaw {
    let mut state = lock_state();
    *state.calls.entry("set_real").or_insert(0) += 1;
    let refs = unsafe { std::slice::from_raw_parts(vr, nvr) };
    let input = unsafe { std::slice::from_raw_parts(values, nvr) };
    for (reference, value) in refs.iter().zip(input) {
        state.reals.insert(*reference, *value);
    }
    state.status
}

extern "C" fn set_integer(
    _handle: *mut c_void,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    values: *const Fmi2Integer,
) -> Fmi2StatusRaw {
    let mut state = lock_state();
    *state.calls.entry("set_integer").or_insert(0) += 1;
    let refs = unsafe { std::slice::from_raw_parts(vr, nvr) };
    let input = unsafe { std::slice::from_raw_parts(values, nvr) };
    for (reference, value) in refs.iter().zip(input) {
        state.integers.insert(*reference, *value);
    }
    state.status
}

extern "C" fn set_boolean(
    _handle: *mut c_void,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    values: *const Fmi2Boolean,
) -> Fmi2StatusRaw {
    let mut state = lock_state();
    *state.calls.entry("set_boolean").or_insert(0) += 1;
    let refs = unsafe { std::slice::from_raw_parts(vr, nvr) };
    let input = unsafe { std::slice::from_raw_parts(values, nvr) };
    for (reference, value) in refs.iter().zip(input) {
        state.booleans.insert(*reference, *value);
    }
    state.status
}

extern "C" fn set_string(
    _handle: *mut c_void,
    vr: *const Fmi2ValueReference,
    nvr: usize,
    values: *const *const c_char,
) -> Fmi2StatusRaw {
    let mut state = lock_state();
    *state.calls.entry("set_string").or_insert(0) += 1;
    let refs = unsafe { std::slice::from_raw_parts(vr, nvr) };
    let input = unsafe { std::slice::from_raw_parts(values, nvr) };
    for (reference, &ptr) in refs.iter().zip(input) {
        let value = if ptr.is_null() {
            CString::default()
        } else {
            unsafe { CStr::from_ptr(ptr) }.to_owned()
        };
        state.strings.insert(*reference, value);
    }
    state.status
}

extern "C" fn get_fmu_state(_handle: *mut c_void, out: *mut Fmi2FmuStateRaw) -> Fmi2StatusRaw {
    let status = record("get_fmu_state");
    unsafe { *out = mock_fmu_state() };
    status
}

extern "C" fn set_fmu_state(_handle: *mut c_void, fmu_state: Fmi2FmuStateRaw) -> Fmi2StatusRaw {
    let mut state = lock_state();
    *state.calls.entry("set_fmu_state").or_insert(0) += 1;
    state.last_fmu_state = fmu_state as usize;
    state.status
}

extern "C" fn free_fmu_state(_handle: *mut c_void, out: *mut Fmi2FmuStateRaw) -> Fmi2StatusRaw {
    let status = record("free_fmu_state");
    unsafe { *out = std::ptr::null_mut() };
    status
}

extern "C" fn serialized_fmu_state_size(
    _handle: *mut c_void,
    _fmu_state: Fmi2FmuStateRaw,
    size: *mut usize,
) -> Fmi2StatusRaw {
    let status = record("serialized_fmu_state_size");
    unsafe { *size = 8 };
    status
}

extern "C" fn serialize_fmu_state(
    _handle: *mut c_void,
    _fmu_state: Fmi2FmuStateRaw,
    serialized: *mut Fmi2Byte,
    size: usize,
) -> Fmi2StatusRaw {
    let status = record("serialize_fmu_state");
    let out = unsafe { std::slice::from_raw_parts_mut(serialized, size) };
    out.fill(0x5A);
    status
}

extern "C" fn deserialize_fmu_state(
    _handle: *mut c_void,
    _serialized: *const Fmi2Byte,
    _size: usize,
    out: *mut Fmi2FmuStateRaw,
) -> Fmi2StatusRaw {
    let status = record("deserialize_fmu_state");
    unsafe { *out = mock_fmu_state() };
    status
}

extern "C" fn get_directional_derivative(
    _handle: *mut c_void,
    _vr_unknown: *const Fmi2ValueReference,
    n_unknown: usize,
    _vr_known: *const Fmi2ValueReference,
    _n_known: usize,
    _dv_known: *const Fmi2Real,
    dv_unknown: *mut Fmi2Real,
) -> Fmi2StatusRaw {
    let status = record("get_directional_derivative");
    let out = unsafe { std::slice::from_raw_parts_mut(dv_unknown, n_unknown) };
    out.fill(0.25);
    status
}

extern "C" fn new_discrete_states(
    _handle: *mut c_void,
    event_info: *mut RawEventInfo,
) -> Fmi2StatusRaw {
    let status = record("new_discrete_states");
    unsafe {
        *event_info = RawEventInfo {
            new_discrete_states_needed: FMI2_TRUE,
            terminate_simulation: FMI2_FALSE,
            nominals_of_continuous_states_changed: FMI2_FALSE,
            values_of_continuous_states_changed: FMI2_TRUE,
            next_event_time_defined: FMI2_TRUE,
            next_event_time: 1.5,
        };
    }
    status
}

extern "C" fn completed_integrator_step(
    _handle: *mut c_void,
    _no_set_fmu_state_prior_to_current_point: Fmi2Boolean,
    enter_event_mode: *mut Fmi2Boolean,
    terminate_simulation: *mut Fmi2Boolean,
) -> Fmi2StatusRaw {
    let status = record("completed_integrator_step");
    unsafe {
        *enter_event_mode = FMI2_FALSE;
        *terminate_simulation = FMI2_FALSE;
    }
    status
}

extern "C" fn set_time(_handle: *mut c_void, _time: Fmi2Real) -> Fmi2StatusRaw {
    record("set_time")
}

extern "C" fn set_continuous_states(
    _handle: *mut c_void,
    _states: *const Fmi2Real,
    _nx: usize,
) -> Fmi2StatusRaw {
    record("set_continuous_states")
}

macro_rules! real_buffer_mock {
    ($name:ident) => {
        extern "C" fn $name(
            _handle: *mut c_void,
            buffer: *mut Fmi2Real,
            count: usize,
        ) -> Fmi2StatusRaw {
            let status = record(stringify!($name));
            let out = unsafe { std::slice::from_raw_parts_mut(buffer, count) };
            out.fill(1.0);
            status
        }
    };
}

real_buffer_mock!(get_derivatives);
real_buffer_mock!(get_event_indicators);
real_buffer_mock!(get_continuous_states);
real_buffer_mock!(get_nominals_of_continuous_states);

extern "C" fn set_real_input_derivatives(
    _handle: *mut c_void,
    _vr: *const Fmi2ValueReference,
    _nvr: usize,
    _order: *const Fmi2Integer,
    _values: *const Fmi2Real,
) -> Fmi2StatusRaw {
    record("set_real_input_derivatives")
}

extern "C" fn get_real_output_derivatives(
    _handle: *mut c_void,
    _vr: *const Fmi2ValueReference,
    nvr: usize,
    _order: *const Fmi2Integer,
    values: *mut Fmi2Real,
) -> Fmi2StatusRaw {
    let status = record("get_real_output_derivatives");
    let out = unsafe { std::slice::from_raw_parts_mut(values, nvr) };
    out.fill(0.5);
    status
}

extern "C" fn do_step(
    _handle: *mut c_void,
    _current_communication_point: Fmi2Real,
    _communication_step_size: Fmi2Real,
    _no_set_fmu_state_prior_to_current_point: Fmi2Boolean,
) -> Fmi2StatusRaw {
    record("do_step")
}

extern "C" fn get_status(
    _handle: *mut c_void,
    _kind: c_int,
    value: *mut Fmi2StatusRaw,
) -> Fmi2StatusRaw {
    let status = record("get_status");
    unsafe { *value = status };
    status
}

extern "C" fn get_real_status(
    _handle: *mut c_void,
    _kind: c_int,
    value: *mut Fmi2Real,
) -> Fmi2StatusRaw {
    let mut state = lock_state();
    *state.calls.entry("get_real_status").or_insert(0) += 1;
    unsafe { *value = state.real_status };
    state.status
}

extern "C" fn get_integer_status(
    _handle: *mut c_void,
    _kind: c_int,
    value: *mut Fmi2Integer,
) -> Fmi2StatusRaw {
    let mut state = lock_state();
    *state.calls.entry("get_integer_status").or_insert(0) += 1;
    unsafe { *value = state.integer_status };
    state.status
}

extern "C" fn get_boolean_status(
    _handle: *mut c_void,
    _kind: c_int,
    value: *mut Fmi2Boolean,
) -> Fmi2StatusRaw {
    let mut state = lock_state();
    *state.calls.entry("get_boolean_status").or_insert(0) += 1;
    unsafe { *value = state.boolean_status };
    state.status
}

extern "C" fn get_string_status(
    _handle: *mut c_void,
    _kind: c_int,
    value: *mut *const c_char,
) -> Fmi2StatusRaw {
    let mut state = lock_state();
    *state.calls.entry("get_string_status").or_insert(0) += 1;
    unsafe { *value = state.string_status.as_ptr() };
    state.status
}

/// The full mock entry-point table.
pub(crate) fn api() -> Fmi2Api {
    Fmi2Api {
        instantiate,
        free_instance,
        set_debug_logging,
        get_types_platform,
        get_version,
        setup_experiment,
        enter_initialization_mode,
        exit_initialization_mode,
        terminate,
        reset,
        get_real,
        get_integer,
        get_boolean,
        get_string,
        set_real,
        set_integer,
        set_boolean,
        set_string,
        get_fmu_state,
        set_fmu_state,
        free_fmu_state,
        serialized_fmu_state_size,
        serialize_fmu_state,
        deserialize_fmu_state,
        get_directional_derivative,
        enter_event_mode,
        new_discrete_states,
        enter_continuous_time_mode,
        completed_integrator_step,
        set_time,
        set_continuous_states,
        get_derivatives,
        get_event_indicators,
        get_continuous_states,
        get_nominals_of_continuous_states,
        set_real_input_derivatives,
        get_real_output_derivatives,
        do_step,
        cancel_step,
        get_status,
        get_real_status,
        get_integer_status,
        get_boolean_status,
        get_string_status,
    }
}
