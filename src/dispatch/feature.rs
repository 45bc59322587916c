use super::{lookup, HandlerResult};
use crate::host::Host;
use crate::protocol::error::ErrorCode;
use crate::protocol::parser::Args;
use crate::protocol::xml::Node;
use crate::session::Session;

fn bool_text(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

pub(super) fn feature_get(
    session: &mut Session,
    host: &mut dyn Host,
    args: &Args,
    response: &mut Node,
) -> HandlerResult {
    let name = args.get('n').ok_or(ErrorCode::InvalidArguments)?;
    response.attr("feature_name", name.to_string());

    let (language_name, language_version) = host.language();

    // (supported, optional text) per feature name.
    let (supported, text): (bool, Option<String>) = match name {
        "breakpoint_languages" => (false, None),
        "breakpoint_types" => (true, Some("line conditional call return exception".into())),
        "data_encoding" => (false, None),
        "encoding" => (true, Some("iso-8859-1".into())),
        "language_name" => (true, Some(language_name)),
        "language_supports_threads" => (true, Some("0".into())),
        "language_version" => (true, Some(language_version)),
        "max_children" => (true, Some(session.features.max_children.to_string())),
        "max_data" => (true, Some(session.features.max_data.to_string())),
        "max_depth" => (true, Some(session.features.max_depth.to_string())),
        "protocol_version" => (true, Some(crate::PROTOCOL_VERSION.into())),
        "supported_encodings" => (true, Some("iso-8859-1".into())),
        "supports_async" => (true, Some("0".into())),
        "supports_postmortem" => (true, Some("1".into())),
        "show_hidden" => (true, Some(bool_text(session.features.show_hidden).into())),
        "extended_properties" => (
            true,
            Some(bool_text(session.features.extended_properties).into()),
        ),
        "notify_ok" => (
            true,
            Some(bool_text(session.features.send_notifications).into()),
        ),
        "resolved_breakpoints" => (
            true,
            Some(bool_text(session.features.resolved_breakpoints).into()),
        ),
        // Anything else: "do you know this command?"
        other => {
            let known = lookup(other).is_some();
            (known, Some(bool_text(known).into()))
        }
    };

    if let Some(text) = text {
        response.set_text(text);
    }
    response.attr("supported", bool_text(supported));
    Ok(())
}

pub(super) fn feature_set(
    session: &mut Session,
    _host: &mut dyn Host,
    args: &Args,
    response: &mut Node,
) -> HandlerResult {
    let name = args.get('n').ok_or(ErrorCode::InvalidArguments)?;
    let value = args.get('v').ok_or(ErrorCode::InvalidArguments)?;

    let as_int = value.parse::<i64>().unwrap_or(0);
    let as_flag = as_int != 0;

    match name {
        "encoding" => {
            if value != "iso-8859-1" {
                return Err(ErrorCode::EncodingNotSupported);
            }
        }
        "max_children" => session.features.max_children = as_int,
        "max_data" => session.features.max_data = as_int,
        "max_depth" => session.features.max_depth = as_int,
        "show_hidden" => session.features.show_hidden = as_flag,
        "extended_properties" => session.features.extended_properties = as_flag,
        "multiple_sessions" => session.features.multiple_sessions = as_flag,
        "notify_ok" => session.features.send_notifications = as_flag,
        "resolved_breakpoints" => session.features.resolved_breakpoints = as_flag,
        _ => return Err(ErrorCode::InvalidArguments),
    }

    response.attr("feature", name.to_string());
    response.attr("success", "1");
    Ok(())
}
