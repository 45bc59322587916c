use super::HandlerResult;
use crate::host::{Host, UnitKind};
use crate::protocol::error::ErrorCode;
use crate::protocol::parser::Args;
use crate::protocol::path_to_url;
use crate::protocol::xml::Node;
use crate::session::{Session, Status};

pub(super) fn status(
    session: &mut Session,
    _host: &mut dyn Host,
    _args: &Args,
    response: &mut Node,
) -> HandlerResult {
    response.attr("status", session.status.to_string());
    response.attr("reason", session.reason.to_string());
    Ok(())
}

pub(super) fn run(
    session: &mut Session,
    _host: &mut dyn Host,
    _args: &Args,
    response: &mut Node,
) -> HandlerResult {
    session.control.clear();
    response.attr("filename", session.program_name().to_string());
    Ok(())
}

pub(super) fn step_into(
    session: &mut Session,
    _host: &mut dyn Host,
    _args: &Args,
    _response: &mut Node,
) -> HandlerResult {
    session.control.clear();
    session.control.step_into = true;
    Ok(())
}

pub(super) fn step_over(
    session: &mut Session,
    host: &mut dyn Host,
    _args: &Args,
    _response: &mut Node,
) -> HandlerResult {
    session.control.clear();
    session.control.step_over = true;
    session.control.step_over_depth = host.stack_depth();
    Ok(())
}

pub(super) fn step_out(
    session: &mut Session,
    host: &mut dyn Host,
    _args: &Args,
    _response: &mut Node,
) -> HandlerResult {
    session.control.clear();
    session.control.step_out = true;
    let depth = host.stack_depth();
    session.control.step_out_depth = if depth > 0 { depth } else { -1 };
    Ok(())
}

pub(super) fn stop(
    session: &mut Session,
    _host: &mut dyn Host,
    _args: &Args,
    response: &mut Node,
) -> HandlerResult {
    session.status = Status::Stopped;
    response.attr("status", session.status.to_string());
    response.attr("reason", session.reason.to_string());
    Ok(())
}

pub(super) fn detach(
    session: &mut Session,
    _host: &mut dyn Host,
    _args: &Args,
    response: &mut Node,
) -> HandlerResult {
    session.status = Status::Detached;
    // A detached session reports itself stopped; the real teardown happens
    // right after this response leaves.
    response.attr("status", Status::Stopped.to_string());
    response.attr("reason", session.reason.to_string());
    Ok(())
}

pub(super) fn stack_depth(
    _session: &mut Session,
    host: &mut dyn Host,
    _args: &Args,
    response: &mut Node,
) -> HandlerResult {
    response.attr("depth", host.stack_depth().to_string());
    Ok(())
}

pub(super) fn stack_get(
    session: &mut Session,
    host: &mut dyn Host,
    args: &Args,
    response: &mut Node,
) -> HandlerResult {
    let depth_count = host.stack_depth();

    if let Some(depth) = args.get_int('d') {
        if depth < 0 || depth >= depth_count {
            return Err(ErrorCode::StackDepthInvalid);
        }
        response.add_child(stackframe_node(session, host, depth));
        return Ok(());
    }

    for depth in 0..depth_count {
        response.add_child(stackframe_node(session, host, depth));
    }
    Ok(())
}

/// `<stack>` element of one frame. Eval frames are typed `eval` and
/// addressed by their pseudo-filename.
fn stackframe_node(session: &Session, host: &dyn Host, depth: i64) -> Node {
    let mut node = Node::new("stack");
    let Some(frame) = host.frame(depth) else {
        return node;
    };

    node.attr("where", frame.unit.display_name());
    node.attr("level", depth.to_string());

    match &frame.unit.kind {
        UnitKind::Eval { defining_line } => {
            let filename = session
                .evals
                .pseudo_filename_for(&frame.unit.filename, *defining_line)
                .unwrap_or_else(|| path_to_url(&frame.unit.filename));
            node.attr("type", "eval");
            node.attr("filename", filename);
        }
        _ => {
            node.attr("type", "file");
            node.attr("filename", path_to_url(&frame.unit.filename));
        }
    }
    node.attr("lineno", frame.lineno.to_string());
    node
}
