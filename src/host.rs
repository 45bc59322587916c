//! Interfaces the embedding language runtime implements for the engine.
//!
//! The engine never looks inside the interpreter: stack frames, symbol
//! tables and expression evaluation are reached exclusively through the
//! [`Host`] trait, and everything the engine needs to know about a piece of
//! executable code travels in a [`CodeUnit`].

use std::collections::BTreeSet;

/// Single signed representation for every line number and hit counter in the
/// engine (range: full `i64`, negative values only as sentinels).
pub type LineNo = i64;

/// First/last source line of a code unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    pub start: LineNo,
    pub end: LineNo,
}

impl LineSpan {
    pub fn new(start: LineNo, end: LineNo) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, line: LineNo) -> bool {
        line >= self.start && line <= self.end
    }
}

/// What kind of callable a code unit is. The engine treats these
/// differently during breakpoint resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitKind {
    /// A plain named function.
    Function { name: String },
    /// A method; matched by its `Class::method` qualified name.
    Method { class: String, name: String },
    /// The top-level body of a script or include.
    FileScope,
    /// Dynamically evaluated code; `defining_line` is where the eval call
    /// sits in `CodeUnit::filename`.
    Eval { defining_line: LineNo },
}

/// A function, method, file-scope body or eval blob about to execute.
#[derive(Debug, Clone)]
pub struct CodeUnit {
    pub kind: UnitKind,
    /// Real path of the file defining this unit (for eval: the file
    /// containing the eval call).
    pub filename: String,
    pub span: LineSpan,
    /// Lines carrying a statement boundary; the resolver only ever lands
    /// breakpoints on these.
    pub executable_lines: BTreeSet<LineNo>,
}

impl CodeUnit {
    /// `Class::method` for methods, the bare name for functions, nothing
    /// for file scope and eval bodies.
    pub fn qualified_name(&self) -> Option<String> {
        match &self.kind {
            UnitKind::Function { name } => Some(name.clone()),
            UnitKind::Method { class, name } => Some(format!("{class}::{name}")),
            UnitKind::FileScope | UnitKind::Eval { .. } => None,
        }
    }

    /// Display name for the `where` attribute of a stack frame.
    pub fn display_name(&self) -> String {
        self.qualified_name().unwrap_or_else(|| "{main}".to_string())
    }

    pub fn is_executable(&self, line: LineNo) -> bool {
        self.executable_lines.contains(&line)
    }
}

/// One frame of the host call stack.
#[derive(Debug, Clone)]
pub struct Frame {
    pub unit: CodeUnit,
    /// Line currently executing inside the unit.
    pub lineno: LineNo,
    /// Variables declared in the frame scope, for `context_get`.
    pub declared_variables: Vec<String>,
}

/// Variable tables a property command can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarContext {
    /// Context id 0: locals of a stack frame.
    Locals { depth: LineNo },
    /// Context id 1: globals.
    Globals,
    /// Context id 2: user defined constants.
    Constants,
}

impl VarContext {
    pub fn from_id(id: i64, depth: i64) -> Option<Self> {
        match id {
            0 => Some(VarContext::Locals { depth }),
            1 => Some(VarContext::Globals),
            2 => Some(VarContext::Constants),
            _ => None,
        }
    }
}

/// A runtime value, as much of it as the protocol needs: enough for a flat
/// `property` node with a type name and a printable payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<(String, Value)>),
    Object { class: String, fields: Vec<(String, Value)> },
    Resource(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object { .. } => "object",
            Value::Resource(_) => "resource",
        }
    }

    /// Scalar payload for the property text; containers render their
    /// children separately.
    pub fn display_fragment(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(v) => Some(if *v { "1".into() } else { "0".into() }),
            Value::Int(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            Value::Str(v) => Some(v.clone()),
            Value::Resource(v) => Some(v.clone()),
            Value::Array(_) | Value::Object { .. } => None,
        }
    }

    pub fn children(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Array(items) => Some(items),
            Value::Object { fields, .. } => Some(fields),
            _ => None,
        }
    }
}

/// The embedding runtime, seen through the narrow keyhole the engine needs.
///
/// Contract notes:
/// - `evaluate` runs with the host's own diagnostics suppressed; a failed
///   evaluation comes back as `Err`, never as a host-side error report.
/// - depths count from the top of the stack: depth 0 is the innermost
///   frame.
pub trait Host {
    /// Path of the program being debugged, for the `init` packet and `run`.
    fn program_name(&self) -> &str;

    /// Language name/version pair reported during the handshake.
    fn language(&self) -> (String, String);

    fn stack_depth(&self) -> i64;

    fn frame(&self, depth: i64) -> Option<Frame>;

    /// Evaluate an expression in the current scope, diagnostics suppressed.
    fn evaluate(&mut self, source: &str) -> anyhow::Result<Value>;

    fn read_variable(&self, name: &str, context: VarContext) -> Option<Value>;

    /// Assign `value_source` (raw text, optionally already cast by
    /// `type_hint`) to a variable. Returns false when the assignment failed.
    fn write_variable(
        &mut self,
        name: &str,
        context: VarContext,
        value_source: &str,
        type_hint: Option<&str>,
    ) -> bool;

    /// Names of the global variables, for context id 1.
    fn global_names(&self) -> Vec<String>;

    /// User defined constants, for context id 2.
    fn constants(&self) -> Vec<(String, Value)>;

    fn constant(&self, name: &str) -> Option<Value>;

    /// Cachegrind output path when the profiler is running.
    fn profile_filename(&self) -> Option<String> {
        None
    }
}
