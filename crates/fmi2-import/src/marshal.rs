//! Conversions between host arrays and the raw buffers the wrapper ABI
//! expects.
//!
//! Strings cross the boundary in two directions with different ownership:
//! outbound strings live in `CString` buffers that only need to survive the
//! native call, inbound strings point into native-owned memory and must be
//! copied out immediately.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use crate::error::FmuError;
use crate::types::{Fmi2Boolean, FMI2_FALSE, FMI2_TRUE};

/// Null-terminated buffer for one outbound string.
pub(crate) fn to_cstring(value: &str) -> Result<CString, FmuError> {
    CString::new(value).map_err(FmuError::from)
}

/// Null-terminated buffers plus a pointer array for an outbound string array.
///
/// The returned pointers index into the returned `CString` storage; keep the
/// storage alive for the duration of the native call.
pub(crate) fn to_cstring_array<S: AsRef<str>>(
    values: &[S],
) -> Result<(Vec<CString>, Vec<*const c_char>), FmuError> {
    let storage = values
        .iter()
        .map(|value| CString::new(value.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    let pointers = storage.iter().map(|value| value.as_ptr()).collect();
    Ok((storage, pointers))
}

/// Copy a transient native string out of native-owned memory.
///
/// A null pointer yields an empty string; invalid UTF-8 is replaced.
///
/// # Safety
///
/// `ptr`, when non-null, must point to a null-terminated string that stays
/// valid for the duration of this call.
pub(crate) unsafe fn copy_native_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

pub(crate) fn bool_to_native(value: bool) -> Fmi2Boolean {
    if value {
        FMI2_TRUE
    } else {
        FMI2_FALSE
    }
}

pub(crate) fn native_to_bool(value: Fmi2Boolean) -> bool {
    value != FMI2_FALSE
}

pub(crate) fn bools_to_native(values: &[bool]) -> Vec<Fmi2Boolean> {
    values.iter().map(|&value| bool_to_native(value)).collect()
}

pub(crate) fn native_to_bools(values: &[Fmi2Boolean]) -> Vec<bool> {
    values.iter().map(|&value| native_to_bool(value)).collect()
}

/// Precondition for every paired-array operation: both arrays must have the
/// same length. A mismatch is a caller bug and fails before any native call.
#[track_caller]
pub(crate) fn check_paired_lengths(references: usize, values: usize) {
    assert_eq!(
        references, values,
        "value reference count ({references}) does not match value count ({values})"
    );
}
