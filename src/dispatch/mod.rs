//! Command dispatcher: the static command table, the precondition checks
//! every command goes through, and the packaging of handler output and
//! errors into a response document.

mod breakpoint;
mod eval;
mod execution;
mod feature;
mod property;
mod source;

use crate::host::Host;
use crate::protocol::error::ErrorCode;
use crate::protocol::parser::{parse_command, Args};
use crate::protocol::xml::Node;
use crate::session::{Session, Status};

pub(crate) type HandlerResult = Result<(), ErrorCode>;
type Handler = fn(&mut Session, &mut dyn Host, &Args, &mut Node) -> HandlerResult;

pub struct CommandDef {
    pub name: &'static str,
    handler: Handler,
    /// Successful execution resumes the debuggee.
    pub continues: bool,
    /// Still allowed once the session is stopping (post-mortem).
    pub post_mortem: bool,
}

const fn entry(name: &'static str, handler: Handler, post_mortem: bool) -> CommandDef {
    CommandDef {
        name,
        handler,
        continues: false,
        post_mortem,
    }
}

const fn cont_entry(name: &'static str, handler: Handler) -> CommandDef {
    CommandDef {
        name,
        handler,
        continues: true,
        post_mortem: false,
    }
}

static COMMANDS: &[CommandDef] = &[
    entry("breakpoint_get", breakpoint::breakpoint_get, false),
    entry("breakpoint_list", breakpoint::breakpoint_list, true),
    entry("breakpoint_remove", breakpoint::breakpoint_remove, false),
    entry("breakpoint_set", breakpoint::breakpoint_set, false),
    entry("breakpoint_update", breakpoint::breakpoint_update, false),
    entry("context_get", property::context_get, false),
    entry("context_names", property::context_names, true),
    entry("eval", eval::eval, false),
    entry("feature_get", feature::feature_get, true),
    entry("feature_set", feature::feature_set, false),
    entry("typemap_get", property::typemap_get, true),
    entry("property_get", property::property_get, false),
    entry("property_set", property::property_set, false),
    entry("property_value", property::property_value, false),
    entry("source", source::source, false),
    entry("stack_depth", execution::stack_depth, false),
    entry("stack_get", execution::stack_get, false),
    entry("status", execution::status, true),
    entry("stderr", source::stderr, false),
    entry("stdout", source::stdout, false),
    cont_entry("run", execution::run),
    cont_entry("step_into", execution::step_into),
    cont_entry("step_out", execution::step_out),
    cont_entry("step_over", execution::step_over),
    entry("stop", execution::stop, true),
    entry("detach", execution::detach, false),
    entry("xcmd_profiler_name_get", eval::profiler_name_get, true),
    entry("xcmd_get_executable_lines", eval::get_executable_lines, false),
];

pub fn lookup(name: &str) -> Option<&'static CommandDef> {
    COMMANDS.iter().find(|def| def.name == name)
}

/// What the command loop should do after one dispatched line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Answer and keep reading commands.
    Stay,
    /// A continuation command succeeded: defer the response, resume the
    /// host.
    Resume,
    /// The client detached: answer, then tear the session down.
    Detach,
}

pub(crate) fn add_error(response: &mut Node, code: ErrorCode) {
    let mut error = Node::new("error");
    error.attr("code", code.code().to_string());
    let mut message = Node::new("message");
    message.set_text(code.to_string());
    error.add_child(message);
    response.add_child(error);
}

/// Run one protocol line through parse - validate - look up - invoke, and
/// package the result. Domain errors end up inside the response; nothing
/// here ever aborts the session.
pub fn dispatch_line(session: &mut Session, host: &mut dyn Host, line: &str) -> (Node, DispatchOutcome) {
    let mut response = Node::response();

    let (command, args) = match parse_command(line) {
        Ok(parts) => parts,
        Err(failure) => {
            if let Some(command) = &failure.command {
                response.attr("command", command.clone());
            }
            // The transaction id is wanted even for failed parses; without
            // one, the outcome degrades to an invalid-options error.
            let code = match failure.args.get('i') {
                Some(transaction) => {
                    response.attr("transaction_id", transaction.to_string());
                    failure.code
                }
                None => ErrorCode::InvalidArguments,
            };
            add_error(&mut response, code);
            return (response, DispatchOutcome::Stay);
        }
    };

    response.attr("command", command.clone());
    let Some(transaction) = args.get('i').map(str::to_string) else {
        add_error(&mut response, ErrorCode::InvalidArguments);
        return (response, DispatchOutcome::Stay);
    };
    response.attr("transaction_id", transaction.clone());

    let Some(def) = lookup(&command) else {
        add_error(&mut response, ErrorCode::Unimplemented);
        return (response, DispatchOutcome::Stay);
    };

    session.record_command(&command, &transaction);

    // Post-mortem gate: once the session is shutting down (or was stopped
    // by the client), only commands flagged safe may still run.
    if matches!(session.status, Status::Stopping | Status::Stopped) && !def.post_mortem {
        add_error(&mut response, ErrorCode::CommandUnavailable);
        return (response, DispatchOutcome::Stay);
    }

    if def.continues {
        session.status = Status::Running;
        session.reason = crate::session::Reason::Ok;
    }

    match (def.handler)(session, host, &args, &mut response) {
        Ok(()) => {
            if def.continues {
                (response, DispatchOutcome::Resume)
            } else if session.status == Status::Detached {
                (response, DispatchOutcome::Detach)
            } else {
                (response, DispatchOutcome::Stay)
            }
        }
        Err(code) => {
            add_error(&mut response, code);
            (response, DispatchOutcome::Stay)
        }
    }
}
