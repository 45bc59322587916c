use dbgp_engine::config::Config;
use dbgp_engine::host::{CodeUnit, Frame, Host, LineSpan, UnitKind, Value, VarContext};
use dbgp_engine::session::transport::Transport;
use dbgp_engine::session::Session;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

/// Transport fed from a fixed command script, capturing everything sent.
pub struct ScriptedTransport {
    incoming: VecDeque<String>,
    sent: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl ScriptedTransport {
    pub fn new(commands: &[&str]) -> (Self, Rc<RefCell<Vec<Vec<u8>>>>) {
        let sent = Rc::new(RefCell::new(vec![]));
        (
            Self {
                incoming: commands.iter().map(|c| c.to_string()).collect(),
                sent: Rc::clone(&sent),
            },
            sent,
        )
    }
}

impl Transport for ScriptedTransport {
    fn read_message(&mut self) -> std::io::Result<Option<String>> {
        Ok(self.incoming.pop_front())
    }

    fn send(&mut self, packet: &[u8]) -> std::io::Result<()> {
        self.sent.borrow_mut().push(packet.to_vec());
        Ok(())
    }
}

/// Unwrap the wire envelope of one captured packet and hand back the XML
/// payload. Panics on a malformed envelope - that is the point.
pub fn unwrap_packet(packet: &[u8]) -> String {
    let nul = packet
        .iter()
        .position(|&b| b == 0)
        .expect("length prefix terminator");
    let len: usize = std::str::from_utf8(&packet[..nul])
        .expect("ascii length")
        .parse()
        .expect("decimal length");
    assert_eq!(
        packet.len(),
        nul + 1 + len + 1,
        "envelope length must match the payload"
    );
    assert_eq!(packet[packet.len() - 1], 0, "payload must be NUL terminated");

    let payload = std::str::from_utf8(&packet[nul + 1..packet.len() - 1]).expect("utf-8 payload");
    assert!(payload.starts_with("<?xml version=\"1.0\" encoding=\"iso-8859-1\"?>\n"));
    payload.to_string()
}

/// Scripted host runtime: one file-scope unit, a variable table, integer
/// expressions.
pub struct TestHost {
    pub filename: String,
    pub span: LineSpan,
    pub executable_lines: BTreeSet<i64>,
    pub variables: BTreeMap<String, Value>,
    pub current_line: i64,
    pub depth: i64,
}

impl Default for TestHost {
    fn default() -> Self {
        Self {
            filename: "/work/test_app.rs".to_string(),
            span: LineSpan::new(1, 40),
            executable_lines: BTreeSet::from([2, 3, 5, 10, 12, 20, 30]),
            variables: BTreeMap::from([
                ("counter".to_string(), Value::Int(7)),
                ("name".to_string(), Value::Str("session".to_string())),
            ]),
            current_line: 2,
            depth: 1,
        }
    }
}

impl TestHost {
    pub fn unit(&self) -> CodeUnit {
        CodeUnit {
            kind: UnitKind::FileScope,
            filename: self.filename.clone(),
            span: self.span,
            executable_lines: self.executable_lines.clone(),
        }
    }
}

impl Host for TestHost {
    fn program_name(&self) -> &str {
        &self.filename
    }

    fn language(&self) -> (String, String) {
        ("toyscript".to_string(), "1.0".to_string())
    }

    fn stack_depth(&self) -> i64 {
        self.depth
    }

    fn frame(&self, depth: i64) -> Option<Frame> {
        (depth >= 0 && depth < self.depth).then(|| Frame {
            unit: self.unit(),
            lineno: self.current_line,
            declared_variables: self.variables.keys().cloned().collect(),
        })
    }

    fn evaluate(&mut self, source: &str) -> anyhow::Result<Value> {
        let source = source.trim();
        if let Some((left, right)) = source.split_once('+') {
            if let (Ok(a), Ok(b)) = (left.trim().parse::<i64>(), right.trim().parse::<i64>()) {
                return Ok(Value::Int(a + b));
            }
        }
        if let Ok(number) = source.parse::<i64>() {
            return Ok(Value::Int(number));
        }
        self.variables
            .get(source)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown expression: {source}"))
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
        match value_source.parse::<i64>() {
            Ok(number) => {
                self.variables.insert(name.to_string(), Value::Int(number));
                true
            }
            Err(_) => false,
        }
    }

    fn global_names(&self) -> Vec<String> {
        vec!["GLOBAL_MODE".to_string()]
    }

    fn constants(&self) -> Vec<(String, Value)> {
        vec![("VERSION".to_string(), Value::Str("1.0".to_string()))]
    }

    fn constant(&self, name: &str) -> Option<Value> {
        (name == "VERSION").then(|| Value::Str("1.0".to_string()))
    }
}

/// A session over a scripted transport, plus the captured outgoing packets.
pub fn scripted_session(commands: &[&str]) -> (Session, Rc<RefCell<Vec<Vec<u8>>>>) {
    let (transport, sent) = ScriptedTransport::new(commands);
    let session = Session::new(
        Box::new(transport),
        &Config::default(),
        "/work/test_app.rs",
    );
    (session, sent)
}

/// Payloads sent so far, envelopes stripped.
pub fn sent_payloads(sent: &Rc<RefCell<Vec<Vec<u8>>>>) -> Vec<String> {
    sent.borrow().iter().map(|p| unwrap_packet(p)).collect()
}
