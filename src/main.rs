//! Demo embedder: runs a tiny line-based script under the debugging engine
//! so a DBGp client can attach, set breakpoints, step and inspect.
//!
//! Script statements, one per line:
//!   `<name> = <expr>`  assignment
//!   `print <expr>`     write the value to stdout
//! where `<expr>` is an integer literal, a variable name, or `a + b`.

use anyhow::{anyhow, Context};
use clap::Parser;
use dbgp_engine::config::Config;
use dbgp_engine::host::{CodeUnit, Frame, Host, LineSpan, UnitKind, Value, VarContext};
use dbgp_engine::session::{ConnectTrigger, LoopExit, Manager, StreamAction, StreamChannel};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::process::exit;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine configuration file (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Client address, overriding the configuration.
    #[arg(long, env = "DBGP_CLIENT_HOST")]
    client_host: Option<String>,

    /// Client port, overriding the configuration.
    #[arg(long, env = "DBGP_CLIENT_PORT")]
    client_port: Option<u16>,

    script: PathBuf,
}

struct ScriptHost {
    path: String,
    lines: Vec<String>,
    variables: BTreeMap<String, Value>,
    current_line: i64,
}

impl ScriptHost {
    fn load(path: &PathBuf) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read script {}", path.display()))?;
        Ok(Self {
            path: path
                .canonicalize()
                .unwrap_or_else(|_| path.clone())
                .display()
                .to_string(),
            lines: text.lines().map(str::to_string).collect(),
            variables: BTreeMap::new(),
            current_line: 1,
        })
    }

    fn unit(&self) -> CodeUnit {
        let executable: BTreeSet<i64> = self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with('#')
            })
            .map(|(idx, _)| idx as i64 + 1)
            .collect();

        CodeUnit {
            kind: UnitKind::FileScope,
            filename: self.path.clone(),
            span: LineSpan::new(1, self.lines.len().max(1) as i64),
            executable_lines: executable,
        }
    }

    fn eval_expr(&self, expr: &str) -> anyhow::Result<Value> {
        let expr = expr.trim();
        if let Some((left, right)) = expr.split_once('+') {
            let (Value::Int(a), Value::Int(b)) = (self.eval_expr(left)?, self.eval_expr(right)?)
            else {
                return Err(anyhow!("only integers add"));
            };
            return Ok(Value::Int(a + b));
        }
        if let Ok(number) = expr.parse::<i64>() {
            return Ok(Value::Int(number));
        }
        if let Some(text) = expr.strip_prefix('"').and_then(|e| e.strip_suffix('"')) {
            return Ok(Value::Str(text.to_string()));
        }
        self.variables
            .get(expr)
            .cloned()
            .ok_or_else(|| anyhow!("unknown variable: {expr}"))
    }

    /// Execute one statement; returns its output, if any.
    fn execute(&mut self, line: &str) -> anyhow::Result<Option<String>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        if let Some(expr) = line.strip_prefix("print ") {
            let value = self.eval_expr(expr)?;
            return Ok(Some(
                value.display_fragment().unwrap_or_else(|| "null".into()),
            ));
        }
        if let Some((name, expr)) = line.split_once('=') {
            let value = self.eval_expr(expr)?;
            self.variables.insert(name.trim().to_string(), value);
            return Ok(None);
        }
        Err(anyhow!("cannot parse statement: {line}"))
    }
}

impl Host for ScriptHost {
    fn program_name(&self) -> &str {
        &self.path
    }

    fn language(&self) -> (String, String) {
        ("toyscript".to_string(), "1.0".to_string())
    }

    fn stack_depth(&self) -> i64 {
        1
    }

    fn frame(&self, depth: i64) -> Option<Frame> {
        (depth == 0).then(|| Frame {
            unit: self.unit(),
            lineno: self.current_line,
            declared_variables: self.variables.keys().cloned().collect(),
        })
    }

    fn evaluate(&mut self, source: &str) -> anyhow::Result<Value> {
        self.eval_expr(source)
    }

    fn read_variable(&self, name: &str, _context: VarContext) -> Option<Value> {
        self.variables.get(name).cloned()
    }

    fn write_variable(
        &mut self,
        name: &str,
        _context: VarContext,
        value_source: &str,
        _type_hint: Option<&str>,
    ) -> bool {
        match self.eval_expr(value_source) {
            Ok(value) => {
                self.variables.insert(name.to_string(), value);
                true
            }
            Err(_) => false,
        }
    }

    fn global_names(&self) -> Vec<String> {
        vec![]
    }

    fn constants(&self) -> Vec<(String, Value)> {
        vec![]
    }

    fn constant(&self, _name: &str) -> Option<Value> {
        None
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(host) = args.client_host {
        config.host = host;
    }
    if let Some(port) = args.client_port {
        config.port = port;
    }

    let mut host = ScriptHost::load(&args.script)?;
    let mut manager = Manager::new(config);

    let exit_state = manager.start_session(&mut host, ConnectTrigger::Request, None);
    if exit_state == Some(LoopExit::Terminate) {
        exit(0);
    }

    let unit = host.unit();
    if let Some(session) = manager.session() {
        session.resolve_breakpoints_for(&unit);
    }

    for line_nr in 1..=host.lines.len() as i64 {
        host.current_line = line_nr;
        let statement = host.lines[line_nr as usize - 1].clone();

        if manager.ensure_session_for_current_process(&mut host, ConnectTrigger::Request) {
            if let Some(session) = manager.session() {
                let file = host.path.clone();
                let executable = host.unit().is_executable(line_nr);
                // A flat script has one frame, so every step flavor lands on
                // the next statement.
                let stepping = session.control.step_into
                    || session.control.step_over
                    || session.control.step_out;
                let suspend = executable
                    && (stepping || session.should_break_here(&mut host, &file, line_nr));
                if suspend {
                    match session.report_break(&mut host, Some(&file), Some(line_nr), None)? {
                        LoopExit::Terminate => exit(1),
                        LoopExit::Resume | LoopExit::Disconnected => {}
                    }
                }
            }
        }

        match host.execute(&statement) {
            Ok(Some(output)) => {
                let action = match manager.session() {
                    Some(session) => {
                        session.stream_output(StreamChannel::Stdout, output.as_bytes())
                    }
                    None => StreamAction::Forward,
                };
                if action == StreamAction::Forward {
                    println!("{output}");
                }
            }
            Ok(None) => {}
            Err(e) => {
                if let Some(session) = manager.session() {
                    let report = dbgp_engine::session::ErrorReport {
                        exception: None,
                        code: 1,
                        message: format!("{e:#}"),
                        fatal: true,
                    };
                    let _ = session.report_error(&mut host, &report);
                }
                return Err(e);
            }
        }
    }

    if let Some(session) = manager.session() {
        dbgp_engine::weak_error!(session.deinit(&mut host));
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {e:#}");
        exit(1);
    }
}
