use super::HandlerResult;
use crate::breakpoint::store::line_key;
use crate::breakpoint::{resolve, BreakpointKind, BrkInfo, HitCondition, Resolution};
use crate::host::Host;
use crate::protocol::error::ErrorCode;
use crate::protocol::parser::Args;
use crate::protocol::path_from_url;
use crate::protocol::xml::Node;
use crate::session::Session;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::str::FromStr;

enum Action {
    Get,
    Remove,
    Update,
}

fn parse_state(value: &str) -> Result<bool, ErrorCode> {
    match value {
        "enabled" => Ok(false),
        "disabled" => Ok(true),
        _ => Err(ErrorCode::InvalidArguments),
    }
}

fn resolved_attribute(resolution: Resolution) -> &'static str {
    match resolution {
        Resolution::Resolved => "resolved",
        Resolution::Unresolved => "unresolved",
    }
}

pub(super) fn breakpoint_set(
    session: &mut Session,
    host: &mut dyn Host,
    args: &Args,
    response: &mut Node,
) -> HandlerResult {
    let type_name = args.get('t').ok_or(ErrorCode::InvalidArguments)?;
    let kind = BreakpointKind::from_str(type_name).map_err(|_| ErrorCode::InvalidArguments)?;

    let mut info = BrkInfo::new(kind);

    if let Some(state) = args.get('s') {
        info.disabled = parse_state(state)?;
        response.attr("state", state.to_string());
    }
    if let (Some(operator), true) = (args.get('o'), args.contains('h')) {
        info.hit_condition =
            HitCondition::from_str(operator).map_err(|_| ErrorCode::InvalidArguments)?;
        info.hit_value = args.get_int('h').unwrap_or(0);
    }
    if let Some(temporary) = args.get_int('r') {
        info.temporary = temporary != 0;
    }

    let id = match kind {
        BreakpointKind::Line | BreakpointKind::Conditional => {
            let lineno = args.get_int('n').ok_or(ErrorCode::InvalidArguments)?;
            info.set_lineno(lineno);

            // Without a filename the breakpoint lands in the file currently
            // executing.
            let file = match args.get('f') {
                Some(f) => path_from_url(f),
                None => {
                    let frame = host.frame(0).ok_or(ErrorCode::StackDepthInvalid)?;
                    frame.unit.filename
                }
            };
            info.file = Some(file.clone());

            if let Some(condition) = args.get('-') {
                let raw = BASE64
                    .decode(condition)
                    .map_err(|_| ErrorCode::InvalidArguments)?;
                info.condition = Some(String::from_utf8_lossy(&raw).into_owned());
            }

            let id = session.breakpoints.add(kind, &line_key(&file, lineno));
            info.id = id;

            // When the client asked for resolved-breakpoint reporting, try
            // to resolve right away against the code currently on top of
            // the stack.
            let mut notify_snapshot = None;
            if session.features.resolved_breakpoints {
                if let Some(frame) = host.frame(0) {
                    if resolve::resolve_line_breakpoint(&mut info, &session.evals, &frame.unit) {
                        notify_snapshot = Some(info.clone());
                    }
                }
            }

            if session.features.resolved_breakpoints {
                response.attr("resolved", resolved_attribute(info.resolved));
            }
            session.breakpoints.add_line_info(info);
            if let Some(snapshot) = notify_snapshot {
                session.notify_breakpoint_resolved(&snapshot);
            }
            id
        }

        BreakpointKind::Call | BreakpointKind::Return => {
            let function = args.get('m').ok_or(ErrorCode::InvalidArguments)?;
            let key = match args.get('a') {
                Some(class) => {
                    info.class = Some(class.to_string());
                    format!("{class}::{function}")
                }
                None => function.to_string(),
            };
            info.function = Some(key.clone());

            let id = session.breakpoints.add(kind, &key);
            info.id = id;
            if !session.breakpoints.add_function_info(key, info) {
                session.breakpoints.remove(id);
                return Err(ErrorCode::BreakpointNotSet);
            }
            id
        }

        BreakpointKind::Exception => {
            let exception = args.get('x').ok_or(ErrorCode::InvalidArguments)?;
            info.exception = Some(exception.to_string());

            // The wildcard matches everything there is, so it resolves at
            // registration already.
            let resolved_now =
                exception == "*" && resolve::resolve_exception_breakpoint(&mut info);

            let id = session.breakpoints.add(kind, exception);
            info.id = id;
            let snapshot = info.clone();
            if !session.breakpoints.add_exception_info(exception.to_string(), info) {
                session.breakpoints.remove(id);
                return Err(ErrorCode::BreakpointNotSet);
            }
            if resolved_now && session.features.resolved_breakpoints {
                session.notify_breakpoint_resolved(&snapshot);
            }
            id
        }

        BreakpointKind::Watch => return Err(ErrorCode::BreakpointTypeNotSupported),
    };

    response.attr("id", id.to_string());
    Ok(())
}

fn breakpoint_do_action(
    session: &mut Session,
    args: &Args,
    response: &mut Node,
    action: Action,
) -> HandlerResult {
    let id = args.get_int('d').ok_or(ErrorCode::InvalidArguments)?;
    let admin = session
        .breakpoints
        .fetch(id)
        .cloned()
        .ok_or(ErrorCode::NoSuchBreakpoint)?;
    let mut key = admin.key.clone();

    if let Action::Update = action {
        let new_state = args.get('s').map(parse_state).transpose()?;
        let new_operator = args
            .get('o')
            .map(|o| HitCondition::from_str(o).map_err(|_| ErrorCode::InvalidArguments))
            .transpose()?;

        let info = session
            .breakpoints
            .find_info_mut(admin.kind, &key)
            .ok_or(ErrorCode::NoSuchBreakpoint)?;

        if let Some(disabled) = new_state {
            info.disabled = disabled;
        }
        if let Some(lineno) = args.get_int('n') {
            info.set_lineno(lineno);
            // Line records are addressed by file+line, so a moved
            // breakpoint needs its admin key moved along.
            if let Some(file) = info.file.clone() {
                key = line_key(&file, lineno);
                session.breakpoints.rekey(id, key.clone());
            }
        }
        if let Some(hit_value) = args.get_int('h') {
            info_mut_hit_value(session, admin.kind, &key, hit_value);
        }
        if let Some(operator) = new_operator {
            if let Some(info) = session.breakpoints.find_info_mut(admin.kind, &key) {
                info.hit_condition = operator;
            }
        }
    }

    let info = session
        .breakpoints
        .find_info(admin.kind, &key)
        .ok_or(ErrorCode::NoSuchBreakpoint)?;
    response.add_child(info.as_xml(session.features.resolved_breakpoints));

    if let Action::Remove = action {
        session.breakpoints.delete_info(admin.kind, &key);
        session.breakpoints.remove(id);
    }
    Ok(())
}

fn info_mut_hit_value(session: &mut Session, kind: BreakpointKind, key: &str, hit_value: i64) {
    if let Some(info) = session.breakpoints.find_info_mut(kind, key) {
        info.hit_value = hit_value;
    }
}

pub(super) fn breakpoint_get(
    session: &mut Session,
    _host: &mut dyn Host,
    args: &Args,
    response: &mut Node,
) -> HandlerResult {
    breakpoint_do_action(session, args, response, Action::Get)
}

pub(super) fn breakpoint_remove(
    session: &mut Session,
    _host: &mut dyn Host,
    args: &Args,
    response: &mut Node,
) -> HandlerResult {
    breakpoint_do_action(session, args, response, Action::Remove)
}

pub(super) fn breakpoint_update(
    session: &mut Session,
    _host: &mut dyn Host,
    args: &Args,
    response: &mut Node,
) -> HandlerResult {
    breakpoint_do_action(session, args, response, Action::Update)
}

pub(super) fn breakpoint_list(
    session: &mut Session,
    _host: &mut dyn Host,
    _args: &Args,
    response: &mut Node,
) -> HandlerResult {
    let entries: Vec<_> = session
        .breakpoints
        .admin_entries()
        .map(|admin| (admin.kind, admin.key.clone()))
        .collect();

    for (kind, key) in entries {
        if let Some(info) = session.breakpoints.find_info(kind, &key) {
            response.add_child(info.as_xml(session.features.resolved_breakpoints));
        }
    }
    Ok(())
}
