use super::property::{property_node, ExportLimits};
use super::HandlerResult;
use crate::dbg_trace;
use crate::host::Host;
use crate::protocol::error::ErrorCode;
use crate::protocol::parser::Args;
use crate::protocol::xml::Node;
use crate::session::Session;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

pub(super) fn eval(
    session: &mut Session,
    host: &mut dyn Host,
    args: &Args,
    response: &mut Node,
) -> HandlerResult {
    let encoded = args.get('-').ok_or(ErrorCode::InvalidArguments)?;
    let raw = BASE64
        .decode(encoded)
        .map_err(|_| ErrorCode::InvalidArguments)?;
    let source = String::from_utf8_lossy(&raw).into_owned();

    // Evaluation runs with notifications held back; whatever happens inside
    // the host, both flags are restored before this handler returns.
    session.features.inhibit_notifications = true;
    let result = host.evaluate(&source);
    session.features.inhibit_notifications = false;

    match result {
        Ok(value) => {
            let limits = ExportLimits {
                max_data: session.features.max_data,
                max_children: session.features.max_children,
                max_depth: session.features.max_depth,
            };
            response.add_child(property_node(None, &value, &limits));
            Ok(())
        }
        Err(e) => {
            dbg_trace!("eval failed: {e:#}");
            Err(ErrorCode::EvaluatingCode)
        }
    }
}

pub(super) fn profiler_name_get(
    _session: &mut Session,
    host: &mut dyn Host,
    _args: &Args,
    response: &mut Node,
) -> HandlerResult {
    match host.profile_filename() {
        Some(filename) => {
            response.set_text(filename);
            Ok(())
        }
        None => Err(ErrorCode::ProfilerNotStarted),
    }
}

/// Vendor extension: the statement-carrying lines of the code unit at a
/// stack depth, so clients can grey out the rest.
pub(super) fn get_executable_lines(
    _session: &mut Session,
    host: &mut dyn Host,
    args: &Args,
    response: &mut Node,
) -> HandlerResult {
    let depth = args.get_int('d').ok_or(ErrorCode::InvalidArguments)?;
    if depth < 0 || depth >= host.stack_depth() {
        return Err(ErrorCode::StackDepthInvalid);
    }
    let frame = host.frame(depth).ok_or(ErrorCode::StackDepthInvalid)?;

    let mut lines = Node::new("xdebug:lines");
    for lineno in &frame.unit.executable_lines {
        let mut line = Node::new("xdebug:line");
        line.attr("lineno", lineno.to_string());
        lines.add_child(line);
    }
    response.add_child(lines);
    Ok(())
}
