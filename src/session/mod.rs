//! Connection/session lifecycle: the handshake, the blocking command loop,
//! the status/reason state machine and the per-process "is a debug session
//! active" bookkeeping that survives forks.

pub mod transport;

use crate::breakpoint::{resolve, BreakpointStore, BrkInfo};
use crate::config::Config;
use crate::dispatch::{self, DispatchOutcome};
use crate::error::Error;
use crate::eval::EvalRegistry;
use crate::host::{CodeUnit, Host, LineNo, Value};
use crate::protocol::xml::Node;
use crate::protocol::path_to_url;
use crate::{dbg_error, dbg_info, dbg_trace, dbg_warn};
use once_cell::sync::Lazy;
use std::sync::Mutex;
use std::time::Duration;
use strum_macros::Display;
use transport::{TcpTransport, Transport};

/// Server-authoritative session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Status {
    #[strum(serialize = "starting")]
    Starting,
    #[strum(serialize = "stopping")]
    Stopping,
    #[strum(serialize = "stopped")]
    Stopped,
    #[strum(serialize = "running")]
    Running,
    #[strum(serialize = "break")]
    Break,
    #[strum(serialize = "detached")]
    Detached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Reason {
    #[strum(serialize = "ok")]
    Ok,
    #[strum(serialize = "error")]
    Error,
    #[strum(serialize = "aborted")]
    Aborted,
    #[strum(serialize = "exception")]
    Exception,
}

/// What started the debug session. A just-in-time connection (triggered by
/// an error) opens directly in the break state - there is no handshake
/// round trip to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectTrigger {
    Request,
    JustInTime,
}

/// Redirection mode of one output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamMode {
    #[default]
    Disabled,
    /// Stream to the client and keep writing to the real channel.
    Copy,
    /// Stream to the client only.
    Redirect,
}

impl StreamMode {
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            0 => Some(StreamMode::Disabled),
            1 => Some(StreamMode::Copy),
            2 => Some(StreamMode::Redirect),
            _ => None,
        }
    }
}

/// Whether the host should keep writing redirected output to the original
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAction {
    Forward,
    Suppress,
}

/// Execution-control flags set by continuation commands and consumed by the
/// host execution loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepControl {
    /// Suspend on the next statement, wherever it is.
    pub step_into: bool,
    /// Suspend on the next statement at `step_over_depth` or shallower.
    pub step_over: bool,
    pub step_over_depth: i64,
    /// Suspend once the stack gets shallower than `step_out_depth`.
    pub step_out: bool,
    pub step_out_depth: i64,
}

impl StepControl {
    pub fn clear(&mut self) {
        *self = StepControl::default();
    }
}

/// Client-negotiable protocol options.
#[derive(Debug, Clone)]
pub struct Features {
    pub max_children: i64,
    pub max_data: i64,
    pub max_depth: i64,
    pub show_hidden: bool,
    pub extended_properties: bool,
    pub multiple_sessions: bool,
    /// `notify_ok`: the client accepts out-of-band error notifications.
    pub send_notifications: bool,
    /// Temporarily held back while the engine itself evaluates symbols.
    pub inhibit_notifications: bool,
    pub resolved_breakpoints: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            max_children: 32,
            max_data: 1024,
            max_depth: 1,
            show_hidden: false,
            extended_properties: false,
            multiple_sessions: false,
            send_notifications: false,
            inhibit_notifications: false,
            resolved_breakpoints: false,
        }
    }
}

/// Why the command loop handed control back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// A continuation command: the host resumes execution.
    Resume,
    /// The client went away (or detached); keep running without a debugger.
    Disconnected,
    /// The loop ran in must-terminate mode and the session is stopped: the
    /// host process must exit now.
    Terminate,
}

/// Loop mode: a loop entered from a suspension point terminates the process
/// when the client stopped the session; the final post-mortem loop of a
/// request does not (the request is over anyway).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    TerminateOnStop,
    RunOut,
}

// Process-wide connection record. Forked children inherit it, which is
// exactly how a pid mismatch gets detected.
struct ConnectionRecord {
    enabled: bool,
    pid: u32,
}

static CONNECTION: Lazy<Mutex<ConnectionRecord>> = Lazy::new(|| {
    Mutex::new(ConnectionRecord {
        enabled: false,
        pid: 0,
    })
});

pub fn is_session_active() -> bool {
    CONNECTION.lock().expect("poisoned").enabled
}

pub fn is_session_active_for_current_process() -> bool {
    let record = CONNECTION.lock().expect("poisoned");
    record.enabled && record.pid == std::process::id()
}

fn mark_session_active() {
    let mut record = CONNECTION.lock().expect("poisoned");
    record.enabled = true;
    record.pid = std::process::id();
}

fn mark_session_pending() {
    let mut record = CONNECTION.lock().expect("poisoned");
    record.enabled = false;
    record.pid = 0;
}

fn mark_session_not_active() {
    let mut record = CONNECTION.lock().expect("poisoned");
    record.enabled = false;
    record.pid = 0;
}

/// One debug session: owns the transport, the breakpoint collections and
/// the protocol state machine. Created on connect, destroyed on
/// detach/stop/request end, never reused across a fork.
pub struct Session {
    transport: Box<dyn Transport>,
    pub status: Status,
    pub reason: Reason,
    pub features: Features,
    pub breakpoints: BreakpointStore,
    pub evals: EvalRegistry,
    pub control: StepControl,
    pub stdout_mode: StreamMode,
    program_name: String,
    ide_key: Option<String>,
    session_cookie: Option<String>,
    last_command: Option<String>,
    last_transaction: Option<String>,
}

impl Session {
    pub fn new(transport: Box<dyn Transport>, config: &Config, program_name: &str) -> Self {
        Self {
            transport,
            status: Status::Starting,
            reason: Reason::Ok,
            features: Features {
                max_children: config.max_children,
                max_data: config.max_data,
                max_depth: config.max_depth,
                resolved_breakpoints: config.resolved_breakpoints,
                ..Features::default()
            },
            breakpoints: BreakpointStore::default(),
            evals: EvalRegistry::default(),
            control: StepControl::default(),
            stdout_mode: StreamMode::Disabled,
            program_name: program_name.to_string(),
            ide_key: config.ide_key.clone(),
            session_cookie: config.session_cookie.clone(),
            last_command: None,
            last_transaction: None,
        }
    }

    pub fn program_name(&self) -> &str {
        &self.program_name
    }

    pub(crate) fn record_command(&mut self, command: &str, transaction: &str) {
        self.last_command = Some(command.to_string());
        self.last_transaction = Some(transaction.to_string());
    }

    fn response_with_last_command(&self) -> Node {
        let mut response = Node::response();
        // Not always known: the client may never have sent a command.
        if let (Some(command), Some(transaction)) = (&self.last_command, &self.last_transaction) {
            response.attr("command", command.clone());
            response.attr("transaction_id", transaction.clone());
        }
        response.attr("status", self.status.to_string());
        response.attr("reason", self.reason.to_string());
        response
    }

    pub fn send_node(&mut self, node: &Node) -> Result<(), Error> {
        dbg_trace!("-> {}", node.render());
        let packet = node.into_packet();
        if let Err(e) = self.transport.send(&packet) {
            dbg_error!("there was a problem sending {} bytes: {e}", packet.len());
            return Err(e.into());
        }
        Ok(())
    }

    /// Handshake: send the `init` packet and run the first command loop.
    /// The session becomes the active one for this process.
    pub fn init(&mut self, host: &mut dyn Host, trigger: ConnectTrigger) -> Result<LoopExit, Error> {
        match trigger {
            ConnectTrigger::Request => {
                self.status = Status::Starting;
                self.reason = Reason::Ok;
            }
            ConnectTrigger::JustInTime => {
                self.status = Status::Break;
                self.reason = Reason::Error;
            }
        }

        let packet = self.init_packet(host);
        self.send_node(&packet)?;

        mark_session_active();
        self.command_loop(host, LoopMode::TerminateOnStop)
    }

    fn init_packet(&self, host: &mut dyn Host) -> Node {
        let (language, language_version) = host.language();

        let mut init = Node::init();

        let mut engine = Node::new("engine");
        engine.attr("version", crate::ENGINE_VERSION);
        engine.set_text(crate::ENGINE_NAME);
        init.add_child(engine);

        let mut author = Node::new("author");
        author.set_text("the dbgp-engine authors");
        init.add_child(author);

        if self.program_name == "-" {
            init.attr("fileuri", "dbgp://stdin");
        } else {
            init.attr("fileuri", path_to_url(&self.program_name));
        }
        init.attr("language", language);
        init.attr("xdebug:language_version", language_version);
        init.attr("protocol_version", crate::PROTOCOL_VERSION);
        init.attr("appid", std::process::id().to_string());

        if let Some(cookie) = &self.session_cookie {
            init.attr("session", cookie.clone());
        }
        if let Some(ide_key) = &self.ide_key {
            if !ide_key.is_empty() {
                init.attr("idekey", ide_key.clone());
            }
        }
        init
    }

    /// The blocking command loop. Runs while the host is suspended; every
    /// iteration reads one command, dispatches it and answers. Ends on a
    /// continuation command or when the client goes away.
    pub fn command_loop(&mut self, host: &mut dyn Host, mode: LoopMode) -> Result<LoopExit, Error> {
        loop {
            let line = match self.transport.read_message() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    dbg_error!("read from client failed: {e}");
                    break;
                }
            };

            let (response, outcome) = dispatch::dispatch_line(self, host, &line);
            match outcome {
                DispatchOutcome::Resume => {
                    // The response of a continuation command is deferred:
                    // it goes out when the host suspends again.
                    return Ok(LoopExit::Resume);
                }
                DispatchOutcome::Stay => {
                    // A send failure kills only this loop, never the host.
                    if self.send_node(&response).is_err() {
                        break;
                    }
                }
                DispatchOutcome::Detach => {
                    let _ = self.send_node(&response);
                    self.teardown();
                    return Ok(LoopExit::Disconnected);
                }
            }
        }

        if mode == LoopMode::TerminateOnStop && self.status == Status::Stopped {
            dbg_info!("session stopped and client gone, instructing host to terminate");
            self.teardown();
            return Ok(LoopExit::Terminate);
        }
        Ok(LoopExit::Disconnected)
    }

    /// Suspend at a breakpoint/step point: report the position (the
    /// deferred answer to the last continuation command) and hand control
    /// to the client until it lets the host run again.
    pub fn report_break(
        &mut self,
        host: &mut dyn Host,
        file: Option<&str>,
        line: Option<LineNo>,
        exception: Option<(&str, &str)>,
    ) -> Result<LoopExit, Error> {
        self.status = Status::Break;
        self.reason = Reason::Ok;
        self.control.clear();

        let mut response = self.response_with_last_command();

        let mut message = Node::new("xdebug:message");
        if let Some(file) = file {
            message.attr("filename", path_to_url(file));
        }
        if let Some(line) = line {
            message.attr("lineno", line.to_string());
        }
        if let Some((name, text)) = exception {
            message.attr("exception", name.to_string());
            message.set_text(text.to_string());
        }
        response.add_child(message);

        // Already logged on failure; the loop's read notices a dead peer.
        let _ = self.send_node(&response);
        self.last_command = None;
        self.last_transaction = None;

        self.command_loop(host, LoopMode::TerminateOnStop)
    }

    /// Broadcast a runtime error. Fatal errors put the session into
    /// post-mortem (stopping/aborted), exceptions and plain errors suspend
    /// in the break state; either way the command loop re-enters so the
    /// client can inspect the final state.
    pub fn report_error(
        &mut self,
        host: &mut dyn Host,
        report: &ErrorReport,
    ) -> Result<LoopExit, Error> {
        if report.exception.is_some() {
            self.status = Status::Break;
            self.reason = Reason::Exception;
        } else if report.fatal {
            self.status = Status::Stopping;
            self.reason = Reason::Aborted;
        } else {
            self.status = Status::Break;
            self.reason = Reason::Error;
        }

        let mut response = self.response_with_last_command();

        let mut error = Node::new("error");
        error.attr("code", report.code.to_string());
        if let Some(exception) = &report.exception {
            error.attr("exception", exception.clone());
        }
        error.set_text(report.message.clone());
        response.add_child(error);

        let _ = self.send_node(&response);
        self.command_loop(host, LoopMode::TerminateOnStop)
    }

    /// Out-of-band error notice: reported without suspending, only when the
    /// client asked for notifications and the engine is not busy evaluating
    /// on its own behalf.
    pub fn notify_error(
        &mut self,
        file: Option<&str>,
        line: Option<LineNo>,
        type_string: &str,
        message: &str,
    ) -> bool {
        if !self.features.send_notifications || self.features.inhibit_notifications {
            return false;
        }

        let mut notify = Node::notify("error");
        let mut container = Node::new("xdebug:message");
        if let Some(file) = file {
            container.attr("filename", path_to_url(file));
        }
        if let Some(line) = line {
            container.attr("lineno", line.to_string());
        }
        container.attr("type", type_string.to_string());
        container.set_text(message.to_string());
        notify.add_child(container);

        self.send_node(&notify).is_ok()
    }

    pub(crate) fn notify_breakpoint_resolved(&mut self, brk: &BrkInfo) {
        let mut notify = Node::notify("breakpoint_resolved");
        notify.add_child(brk.as_xml(true));
        if let Err(e) = self.send_node(&notify) {
            dbg_warn!("breakpoint_resolved notification lost: {e}");
        }
    }

    /// Match pending breakpoints against a code unit that is about to
    /// execute; notify the client about every resolution that improved.
    pub fn resolve_breakpoints_for(&mut self, unit: &CodeUnit) {
        if !self.features.resolved_breakpoints {
            return;
        }

        let changed = resolve::resolve_for_unit(&mut self.breakpoints, &self.evals, unit);
        for brk in changed {
            self.notify_breakpoint_resolved(&brk);
        }
    }

    /// Register an eval blob entered at `file`:`line` so the client can
    /// address it as a pseudo-file.
    pub fn register_eval_code(&mut self, file: &str, line: LineNo, contents: &str) -> i64 {
        self.evals.register(file, line, contents)
    }

    /// Decide whether execution must suspend at `file`:`line`. Walks the
    /// line breakpoints in insertion order; the first location match gets
    /// its condition evaluated and its hit policy applied.
    ///
    /// For statements inside an eval blob the host passes the blob's
    /// pseudo-filename (`dbgp://<id>`).
    pub fn should_break_here(&mut self, host: &mut dyn Host, file: &str, line: LineNo) -> bool {
        let mut matched: Option<(usize, Option<String>)> = None;
        for (idx, brk) in self.breakpoints.line_breakpoints().enumerate() {
            if brk.disabled {
                continue;
            }
            if brk.resolved_lineno != line {
                continue;
            }
            let Some(brk_file) = brk.file.as_deref() else {
                continue;
            };
            if !brk_file.eq_ignore_ascii_case(file) {
                continue;
            }
            matched = Some((idx, brk.condition.clone()));
            break;
        }

        let Some((idx, condition)) = matched else {
            return false;
        };

        if let Some(condition) = condition {
            if !self.evaluate_condition(host, &condition) {
                return false;
            }
        }

        let Some(brk) = self.breakpoints.line_breakpoints_mut().nth(idx) else {
            return false;
        };
        brk.should_break()
    }

    /// Whether a call breakpoint fires for the function being entered.
    pub fn should_break_on_call(&mut self, host: &mut dyn Host, qualified_name: &str) -> bool {
        self.should_break_on_function(host, qualified_name, crate::breakpoint::BreakpointKind::Call)
    }

    /// Whether a return breakpoint fires for the function being left.
    pub fn should_break_on_return(&mut self, host: &mut dyn Host, qualified_name: &str) -> bool {
        self.should_break_on_function(host, qualified_name, crate::breakpoint::BreakpointKind::Return)
    }

    fn should_break_on_function(
        &mut self,
        host: &mut dyn Host,
        qualified_name: &str,
        kind: crate::breakpoint::BreakpointKind,
    ) -> bool {
        let Some(brk) = self.breakpoints.function_info_mut(qualified_name) else {
            return false;
        };
        if brk.kind != kind || brk.disabled {
            return false;
        }
        let condition = brk.condition.clone();
        if let Some(condition) = condition {
            if !self.evaluate_condition(host, &condition) {
                return false;
            }
        }
        let Some(brk) = self.breakpoints.function_info_mut(qualified_name) else {
            return false;
        };
        brk.should_break()
    }

    /// Whether an exception breakpoint fires for `exception_name`. The
    /// wildcard `*` matches everything; a first check also resolves the
    /// breakpoint (advisory bookkeeping, reported to the client).
    pub fn should_break_on_exception(&mut self, exception_name: &str) -> bool {
        let mut resolved_snapshot = None;

        let key = if self.breakpoints.exception_info_mut(exception_name).is_some() {
            exception_name
        } else if self.breakpoints.exception_info_mut("*").is_some() {
            "*"
        } else {
            return false;
        };

        let Some(brk) = self.breakpoints.exception_info_mut(key) else {
            return false;
        };
        if brk.disabled {
            return false;
        }
        if resolve::resolve_exception_breakpoint(brk) {
            resolved_snapshot = Some(brk.clone());
        }
        let fire = brk.should_break();

        if let Some(brk) = resolved_snapshot {
            if self.features.resolved_breakpoints {
                self.notify_breakpoint_resolved(&brk);
            }
        }
        fire
    }

    fn evaluate_condition(&mut self, host: &mut dyn Host, condition: &str) -> bool {
        self.features.inhibit_notifications = true;
        let result = host.evaluate(condition);
        self.features.inhibit_notifications = false;

        match result {
            Ok(value) => value_is_truthy(&value),
            Err(e) => {
                dbg_trace!("breakpoint condition failed to evaluate: {e:#}");
                false
            }
        }
    }

    /// Redirected output. The return value tells the host whether the data
    /// should still reach the original channel.
    pub fn stream_output(&mut self, channel: StreamChannel, data: &[u8]) -> StreamAction {
        let mode = match channel {
            StreamChannel::Stdout => self.stdout_mode,
            // stderr redirection is advertised but never granted.
            StreamChannel::Stderr => StreamMode::Disabled,
        };

        if mode != StreamMode::Disabled && !data.is_empty() {
            let mut stream = Node::stream(channel.as_str());
            stream.set_text_base64(data);
            if let Err(e) = self.send_node(&stream) {
                dbg_warn!("stream chunk lost: {e}");
            }
        }

        match mode {
            StreamMode::Redirect => StreamAction::Suppress,
            StreamMode::Disabled | StreamMode::Copy => StreamAction::Forward,
        }
    }

    /// End-of-request teardown: tell the client the session is stopping,
    /// serve post-mortem commands until it hangs up, then drop everything.
    pub fn deinit(&mut self, host: &mut dyn Host) -> Result<(), Error> {
        if is_session_active_for_current_process() {
            self.status = Status::Stopping;
            self.reason = Reason::Ok;

            let response = self.response_with_last_command();
            let _ = self.send_node(&response);
            self.command_loop(host, LoopMode::RunOut)?;
        }
        self.teardown();
        Ok(())
    }

    /// Drop the connection and the per-process active mark. Collections die
    /// with the session object.
    pub(crate) fn teardown(&mut self) {
        self.stdout_mode = StreamMode::Disabled;
        mark_session_not_active();
    }
}

/// Output channels a client can ask to have streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamChannel {
    Stdout,
    Stderr,
}

impl StreamChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamChannel::Stdout => "stdout",
            StreamChannel::Stderr => "stderr",
        }
    }
}

/// A runtime error handed to [`Session::report_error`].
#[derive(Debug, Clone)]
pub struct ErrorReport {
    /// Exception class name, when the error is a thrown exception.
    pub exception: Option<String>,
    /// Host-specific numeric error code.
    pub code: i64,
    pub message: String,
    /// Fatal errors put the session into post-mortem.
    pub fatal: bool,
}

fn value_is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(v) => *v,
        Value::Int(v) => *v != 0,
        Value::Float(v) => *v != 0.0,
        Value::Str(v) => !v.is_empty() && v != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object { .. } => true,
        Value::Resource(_) => true,
    }
}

/// Owns the config and the (at most one) active session of this process.
/// Recreates the session - never reuses it - when the process forked since
/// the connection was made.
pub struct Manager {
    config: Config,
    session: Option<Session>,
}

impl Manager {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// Connect and run the handshake. A failed connect is logged and
    /// swallowed: the host program runs fine without a debugger.
    pub fn start_session(
        &mut self,
        host: &mut dyn Host,
        trigger: ConnectTrigger,
        connect_back_addr: Option<&str>,
    ) -> Option<LoopExit> {
        let (host_addr, port) = match connect_back_addr {
            Some(addr) => {
                dbg_info!("remote address found, connecting to {addr}:{}", self.config.port);
                (addr.to_string(), self.config.port)
            }
            None => {
                dbg_info!(
                    "connecting to configured address/port: {}:{}",
                    self.config.host,
                    self.config.port
                );
                (self.config.host.clone(), self.config.port)
            }
        };

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let transport = match TcpTransport::connect(&host_addr, port, timeout) {
            Ok(t) => t,
            Err(Error::ConnectTimeout(ms)) => {
                dbg_error!("time-out connecting to client (waited: {ms} ms)");
                return None;
            }
            Err(Error::ConnectPermission) => {
                dbg_error!("no permission connecting to client");
                return None;
            }
            Err(e) => {
                dbg_error!("could not connect to client: {e}");
                return None;
            }
        };

        dbg_info!("connected to client");
        mark_session_pending();

        let mut session = Session::new(
            Box::new(transport),
            &self.config,
            host.program_name(),
        );
        let exit = match session.init(host, trigger) {
            Ok(exit) => exit,
            Err(e) => {
                dbg_error!("the debug session could not be started: {e}");
                return None;
            }
        };

        self.session = Some(session);
        Some(exit)
    }

    /// Active-session check that honors forks: when the recorded owner pid
    /// is not this process, the inherited session is aborted and a fresh
    /// connection/handshake is made so this process gets its own session.
    pub fn ensure_session_for_current_process(
        &mut self,
        host: &mut dyn Host,
        trigger: ConnectTrigger,
    ) -> bool {
        if !is_session_active() {
            return false;
        }
        if !is_session_active_for_current_process() {
            dbg_info!("session owner pid mismatch after fork, restarting the debugger");
            self.abort();
            self.start_session(host, trigger, None);
        }
        is_session_active_for_current_process()
    }

    /// Tear the session down without a goodbye (the socket just closes).
    pub fn abort(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.teardown();
        } else {
            mark_session_not_active();
        }
    }
}
