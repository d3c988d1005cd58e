use sluice_core::{
    Diagnostic, Failure, Result,
    native::{Handle, HandleKind, NativeApi, SqlReturn},
};

/// Diagnostics are capped, a misbehaving driver could otherwise report records forever.
const MAX_RECORDS: i16 = 64;

/// Read every diagnostic record currently attached to `handle`.
pub fn read_diagnostics(api: &dyn NativeApi, kind: HandleKind, handle: Handle) -> Vec<Diagnostic> {
    let mut result = Vec::new();
    if handle.is_null() {
        return result;
    }
    for record in 1..=MAX_RECORDS {
        match api.diag_record(kind, handle, record) {
            Some(diagnostic) => result.push(diagnostic),
            None => break,
        }
    }
    result
}

/// Turn a native return code into a result.
///
/// Success, success with info and no data pass through (warnings are logged). Any other code
/// reads the handle diagnostics immediately and becomes a [`Failure::NativeCall`].
pub fn check(
    api: &dyn NativeApi,
    ret: SqlReturn,
    kind: HandleKind,
    handle: Handle,
    operation: &'static str,
) -> Result<SqlReturn> {
    if ret == SqlReturn::SUCCESS || ret == SqlReturn::NO_DATA {
        return Ok(ret);
    }
    if ret == SqlReturn::SUCCESS_WITH_INFO {
        if log::log_enabled!(log::Level::Debug) {
            for diagnostic in read_diagnostics(api, kind, handle) {
                log::debug!("{operation}: {diagnostic}");
            }
        }
        return Ok(ret);
    }
    let mut diagnostics = read_diagnostics(api, kind, handle);
    if diagnostics.is_empty() {
        diagnostics.push(Diagnostic::new(
            "HY000",
            0,
            format!("{operation} returned {ret} without diagnostics"),
        ));
    }
    if diagnostics.iter().any(Diagnostic::is_cancel) {
        return Err(Failure::Cancelled.into());
    }
    Err(Failure::NativeCall {
        operation,
        diagnostics,
    }
    .into())
}
