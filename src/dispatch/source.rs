use super::HandlerResult;
use crate::eval::parse_pseudo_filename;
use crate::host::Host;
use crate::protocol::error::ErrorCode;
use crate::protocol::parser::Args;
use crate::protocol::path_from_url;
use crate::protocol::xml::Node;
use crate::session::{Session, StreamMode};

const SOURCE_END_DEFAULT: i64 = 999_999;

/// Joined lines `begin..=end` (zero-based) of a text blob.
fn clip_lines(contents: &str, begin: i64, end: i64) -> String {
    let begin = begin.max(0) as usize;
    let count = (end - begin as i64 + 1).max(0) as usize;
    contents
        .lines()
        .skip(begin)
        .take(count)
        .collect::<Vec<_>>()
        .join("\n")
}

pub(super) fn source(
    session: &mut Session,
    host: &mut dyn Host,
    args: &Args,
    response: &mut Node,
) -> HandlerResult {
    let filename = match args.get('f') {
        Some(f) => path_from_url(f),
        None => {
            let frame = host.frame(0).ok_or(ErrorCode::StackDepthInvalid)?;
            frame.unit.filename
        }
    };

    let begin = args.get_int('b').unwrap_or(0);
    let end = args.get_int('e').unwrap_or(SOURCE_END_DEFAULT);

    let source = match parse_pseudo_filename(&filename) {
        // A registered eval blob, addressed by id.
        Some(id) => session
            .evals
            .find_by_id(id)
            .map(|entry| clip_lines(&entry.contents, begin, end)),
        None => std::fs::read_to_string(&filename)
            .ok()
            .map(|contents| clip_lines(&contents, begin, end)),
    };

    match source {
        Some(text) => {
            response.set_text_base64(text.as_bytes());
            Ok(())
        }
        None => Err(ErrorCode::CantOpenFile),
    }
}

pub(super) fn stdout(
    session: &mut Session,
    _host: &mut dyn Host,
    args: &Args,
    response: &mut Node,
) -> HandlerResult {
    let mode = args.get_int('c').ok_or(ErrorCode::InvalidArguments)?;
    let mode = StreamMode::from_id(mode).ok_or(ErrorCode::InvalidArguments)?;

    session.stdout_mode = mode;
    response.attr("success", "1");
    Ok(())
}

/// stderr redirection is advertised for protocol completeness but never
/// granted.
pub(super) fn stderr(
    _session: &mut Session,
    _host: &mut dyn Host,
    _args: &Args,
    response: &mut Node,
) -> HandlerResult {
    response.attr("success", "0");
    Ok(())
}
