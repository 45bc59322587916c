//! Registry of dynamically evaluated code blobs.
//!
//! Every eval'd unit gets a sequence id so the client can address it as the
//! pseudo-file `dbgp://<id>` for source retrieval and line breakpoints. One
//! payload is reachable through two keys (the defining file+line, known
//! before the code first runs, and the id itself), so entries are held by
//! `Rc` from two independent index maps - removing one key never dangles
//! the other, the payload dies with its last key.

use crate::host::LineNo;
use std::collections::HashMap;
use std::rc::Rc;

const PSEUDO_FILE_SCHEME: &str = "dbgp://";

#[derive(Debug)]
pub struct EvalCode {
    pub id: i64,
    pub contents: String,
}

impl EvalCode {
    /// Pseudo-filename the entry is addressed by on the wire.
    pub fn pseudo_filename(&self) -> String {
        format!("{PSEUDO_FILE_SCHEME}{}", self.id)
    }
}

/// Split a `dbgp://<id>` pseudo-filename into its id.
pub fn parse_pseudo_filename(filename: &str) -> Option<i64> {
    filename.strip_prefix(PSEUDO_FILE_SCHEME)?.parse().ok()
}

pub fn is_pseudo_filename(filename: &str) -> bool {
    filename.starts_with(PSEUDO_FILE_SCHEME)
}

#[derive(Debug, Default)]
pub struct EvalRegistry {
    sequence: i64,
    by_location: HashMap<(String, LineNo), Rc<EvalCode>>,
    by_id: HashMap<i64, Rc<EvalCode>>,
}

impl EvalRegistry {
    /// Register an eval blob entered at `file`:`line`. Returns the assigned
    /// id.
    pub fn register(&mut self, file: &str, line: LineNo, contents: &str) -> i64 {
        self.sequence += 1;
        let entry = Rc::new(EvalCode {
            id: self.sequence,
            contents: contents.to_string(),
        });

        self.by_location
            .insert((file.to_string(), line), Rc::clone(&entry));
        self.by_id.insert(entry.id, entry);

        self.sequence
    }

    pub fn find_by_id(&self, id: i64) -> Option<&Rc<EvalCode>> {
        self.by_id.get(&id)
    }

    pub fn find_by_location(&self, file: &str, line: LineNo) -> Option<&Rc<EvalCode>> {
        self.by_location.get(&(file.to_string(), line))
    }

    /// Pseudo-filename for the eval registered at a defining location, if
    /// any.
    pub fn pseudo_filename_for(&self, file: &str, line: LineNo) -> Option<String> {
        self.find_by_location(file, line)
            .map(|e| e.pseudo_filename())
    }

    pub fn remove_by_id(&mut self, id: i64) {
        self.by_id.remove(&id);
    }

    pub fn remove_by_location(&mut self, file: &str, line: LineNo) {
        self.by_location.remove(&(file.to_string(), line));
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
