/// Numeric error codes of the DBGp protocol, sent to the client as the
/// `code` attribute of an `error` element together with the canonical
/// message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorCode {
    #[error("no error")]
    Ok,
    #[error("parse error in command")]
    Parse,
    #[error("duplicate arguments in command")]
    DuplicateArguments,
    #[error("invalid or missing options")]
    InvalidArguments,
    #[error("unimplemented command")]
    Unimplemented,
    #[error("command is not available")]
    CommandUnavailable,
    #[error("can not open file")]
    CantOpenFile,
    #[error("stream redirect failed")]
    StreamRedirectFailed,
    #[error("breakpoint could not be set")]
    BreakpointNotSet,
    #[error("breakpoint type is not supported")]
    BreakpointTypeNotSupported,
    #[error("invalid breakpoint line")]
    InvalidBreakpointLine,
    #[error("no code on breakpoint line")]
    NoCodeOnBreakpointLine,
    #[error("invalid breakpoint state")]
    InvalidBreakpointState,
    #[error("no such breakpoint")]
    NoSuchBreakpoint,
    #[error("error evaluating code")]
    EvaluatingCode,
    #[error("invalid expression")]
    InvalidExpression,
    #[error("can not get property")]
    PropertyNonExistent,
    #[error("stack depth invalid")]
    StackDepthInvalid,
    #[error("context invalid")]
    ContextInvalid,
    #[error("profiler not started")]
    ProfilerNotStarted,
    #[error("encoding not supported")]
    EncodingNotSupported,
    #[error("an internal exception in the debugger")]
    Internal,
    #[error("unknown error")]
    Unknown,
}

impl ErrorCode {
    pub fn code(self) -> u32 {
        match self {
            ErrorCode::Ok => 0,
            ErrorCode::Parse => 1,
            ErrorCode::DuplicateArguments => 2,
            ErrorCode::InvalidArguments => 3,
            ErrorCode::Unimplemented => 4,
            ErrorCode::CommandUnavailable => 5,
            ErrorCode::CantOpenFile => 100,
            ErrorCode::StreamRedirectFailed => 101,
            ErrorCode::BreakpointNotSet => 200,
            ErrorCode::BreakpointTypeNotSupported => 201,
            ErrorCode::InvalidBreakpointLine => 202,
            ErrorCode::NoCodeOnBreakpointLine => 203,
            ErrorCode::InvalidBreakpointState => 204,
            ErrorCode::NoSuchBreakpoint => 205,
            ErrorCode::EvaluatingCode => 206,
            ErrorCode::InvalidExpression => 207,
            ErrorCode::PropertyNonExistent => 300,
            ErrorCode::StackDepthInvalid => 301,
            ErrorCode::ContextInvalid => 302,
            ErrorCode::ProfilerNotStarted => 800,
            ErrorCode::EncodingNotSupported => 900,
            ErrorCode::Internal => 998,
            ErrorCode::Unknown => 999,
        }
    }
}
