//! Breakpoint resolution: mapping the location a client asked for onto a
//! line that actually carries code, driven by every code unit the runtime is
//! about to execute.

use super::{BreakpointKind, BreakpointStore, BrkInfo, Resolution};
use crate::dbg_trace;
use crate::eval::EvalRegistry;
use crate::host::{CodeUnit, LineSpan, UnitKind};

/// How far away from the requested line the resolver may land, in lines,
/// each direction.
pub const SCAN_RANGE: i64 = 5;

/// A unit span only overrides an earlier resolution when it is strictly
/// narrower on at least one side. The asymmetric boundaries (`>=`/`<` vs
/// `>`/`<=`) favor re-resolving toward spans that start later.
fn span_is_narrower(unit: &LineSpan, resolved: &LineSpan) -> bool {
    (unit.start >= resolved.start && unit.end < resolved.end)
        || (unit.start > resolved.start && unit.end <= resolved.end)
}

/// Match every pending breakpoint against a code unit that is about to
/// execute. Returns snapshots of the records whose resolution actually
/// changed - each one owes the client a `breakpoint_resolved` notification.
pub fn resolve_for_unit(
    store: &mut BreakpointStore,
    evals: &EvalRegistry,
    unit: &CodeUnit,
) -> Vec<BrkInfo> {
    let mut changed = vec![];

    let entries: Vec<_> = store
        .admin_entries()
        .map(|admin| (admin.id, admin.kind, admin.key.clone()))
        .collect();

    for (id, kind, key) in entries {
        dbg_trace!("breakpoint {id} (type: {kind})");

        let Some(info) = store.find_info_mut(kind, &key) else {
            continue;
        };

        let resolved_now = match kind {
            BreakpointKind::Line | BreakpointKind::Conditional => {
                resolve_line_breakpoint(info, evals, unit)
            }
            BreakpointKind::Call | BreakpointKind::Return => {
                resolve_function_breakpoint(info, unit)
            }
            // Exception breakpoints never look at code units.
            _ => false,
        };

        if resolved_now {
            changed.push(info.clone());
        }
    }

    changed
}

/// Resolve a line/conditional breakpoint against one code unit. Returns true
/// when the resolution changed.
pub(crate) fn resolve_line_breakpoint(
    info: &mut BrkInfo,
    evals: &EvalRegistry,
    unit: &CodeUnit,
) -> bool {
    if !unit.span.contains(info.original_lineno) {
        dbg_trace!(
            "line {} out of range {}-{}",
            info.original_lineno,
            unit.span.start,
            unit.span.end
        );
        return false;
    }

    // A prior resolution stands unless this unit's span is strictly
    // narrower; a nested scope may refine the match, an equally wide or
    // wider one may not.
    if info.resolved == Resolution::Resolved && !span_is_narrower(&unit.span, &info.resolved_span)
    {
        dbg_trace!(
            "unit span {}-{} is not narrower than resolved span {}-{}",
            unit.span.start,
            unit.span.end,
            info.resolved_span.start,
            info.resolved_span.end
        );
        return false;
    }

    // The unit must actually be the breakpoint's target.
    match &unit.kind {
        UnitKind::Eval { defining_line } => {
            let Some(pseudo) = evals.pseudo_filename_for(&unit.filename, *defining_line) else {
                dbg_trace!("eval id not found for {}:{}", unit.filename, defining_line);
                return false;
            };
            if info.file.as_deref() != Some(pseudo.as_str()) {
                dbg_trace!(
                    "breakpoint file {:?} does not match eval pseudo-file {pseudo}",
                    info.file
                );
                return false;
            }
        }
        _ => {
            if info.file.as_deref() != Some(unit.filename.as_str()) {
                dbg_trace!(
                    "breakpoint file {:?} does not match unit file {}",
                    info.file,
                    unit.filename
                );
                return false;
            }
        }
    }

    let Some(lineno) = nearest_executable_line(unit, info.original_lineno) else {
        dbg_trace!(
            "no executable line within {SCAN_RANGE} lines of {}",
            info.original_lineno
        );
        return false;
    };

    info.resolved_lineno = lineno;
    info.resolved_span = unit.span;
    info.resolved = Resolution::Resolved;
    dbg_trace!("resolved to line {lineno} (span {}-{})", unit.span.start, unit.span.end);
    true
}

/// The requested line itself when executable, otherwise the nearest
/// executable line within the scan window - forward first, then backward,
/// never outside the unit span.
fn nearest_executable_line(unit: &CodeUnit, requested: i64) -> Option<i64> {
    if unit.is_executable(requested) {
        return Some(requested);
    }

    let mut lineno = requested;
    while lineno < unit.span.end && lineno < requested + SCAN_RANGE {
        lineno += 1;
        if unit.is_executable(lineno) {
            return Some(lineno);
        }
    }

    let mut lineno = requested;
    while lineno > unit.span.start && lineno > requested - SCAN_RANGE {
        lineno -= 1;
        if unit.is_executable(lineno) {
            return Some(lineno);
        }
    }

    None
}

/// Call/return breakpoints resolve on the first unit whose qualified name
/// matches; the resolution is permanent.
fn resolve_function_breakpoint(info: &mut BrkInfo, unit: &CodeUnit) -> bool {
    if info.resolved == Resolution::Resolved {
        return false;
    }

    let Some(name) = unit.qualified_name() else {
        return false;
    };
    if info.function.as_deref() != Some(name.as_str()) {
        return false;
    }

    info.resolved = Resolution::Resolved;
    true
}

/// Exception breakpoints carry no location; resolution is bookkeeping that
/// happens at registration (for the wildcard) or on the first check.
pub fn resolve_exception_breakpoint(info: &mut BrkInfo) -> bool {
    if info.resolved == Resolution::Resolved {
        return false;
    }
    info.resolved = Resolution::Resolved;
    true
}
