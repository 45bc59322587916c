use super::{BreakpointId, BreakpointKind, BrkInfo};
use crate::host::LineNo;
use indexmap::IndexMap;
use std::collections::HashMap;

/// Separator of the composite `file$line` key of line breakpoints. A key is
/// split from the right, the line number can never contain the separator.
const LINE_KEY_SEPARATOR: char = '$';

pub fn line_key(file: &str, line: LineNo) -> String {
    format!("{file}{LINE_KEY_SEPARATOR}{line}")
}

fn split_line_key(key: &str) -> Option<(&str, LineNo)> {
    let (file, line) = key.rsplit_once(LINE_KEY_SEPARATOR)?;
    Some((file, line.parse().ok()?))
}

/// Maps a client-visible id to the kind and lookup key of the record it
/// administers.
#[derive(Debug, Clone)]
pub struct AdminEntry {
    pub id: BreakpointId,
    pub kind: BreakpointKind,
    pub key: String,
}

/// The durable breakpoint set of one session.
///
/// Line and conditional breakpoints live in an ordered sequence - the
/// first-inserted-first-matched scan order is observable through resolution
/// and matching, so it is not a hash map. Call/return and exception
/// breakpoints are looked up by name.
#[derive(Debug, Default)]
pub struct BreakpointStore {
    admin: IndexMap<BreakpointId, AdminEntry>,
    line: Vec<BrkInfo>,
    function: HashMap<String, BrkInfo>,
    exception: HashMap<String, BrkInfo>,
    sequence: i64,
}

impl BreakpointStore {
    /// Register an admin entry, synthesizing the id as
    /// `(pid & 0x1ffff) * 10000 + sequence` - unique within the process
    /// without cross-process coordination.
    pub fn add(&mut self, kind: BreakpointKind, key: &str) -> BreakpointId {
        self.sequence += 1;
        let id = ((std::process::id() as i64) & 0x1ffff) * 10000 + self.sequence;
        self.admin.insert(
            id,
            AdminEntry {
                id,
                kind,
                key: key.to_string(),
            },
        );
        id
    }

    pub fn fetch(&self, id: BreakpointId) -> Option<&AdminEntry> {
        self.admin.get(&id)
    }

    /// Drop an admin entry. The record it points at is removed separately
    /// via [`BreakpointStore::delete_info`].
    pub fn remove(&mut self, id: BreakpointId) -> Option<AdminEntry> {
        self.admin.shift_remove(&id)
    }

    /// Admin entries in registration order.
    pub fn admin_entries(&self) -> impl Iterator<Item = &AdminEntry> {
        self.admin.values()
    }

    /// Point an admin entry at a new lookup key (a re-targeted line
    /// breakpoint changes its composite key).
    pub fn rekey(&mut self, id: BreakpointId, key: String) {
        if let Some(admin) = self.admin.get_mut(&id) {
            admin.key = key;
        }
    }

    pub fn add_line_info(&mut self, info: BrkInfo) {
        self.line.push(info);
    }

    /// Insert a call/return record; refuses to shadow an existing name.
    pub fn add_function_info(&mut self, key: String, info: BrkInfo) -> bool {
        if self.function.contains_key(&key) {
            return false;
        }
        self.function.insert(key, info);
        true
    }

    /// Insert an exception record; refuses to shadow an existing name.
    pub fn add_exception_info(&mut self, key: String, info: BrkInfo) -> bool {
        if self.exception.contains_key(&key) {
            return false;
        }
        self.exception.insert(key, info);
        true
    }

    pub fn find_info(&self, kind: BreakpointKind, key: &str) -> Option<&BrkInfo> {
        match kind {
            BreakpointKind::Line | BreakpointKind::Conditional => {
                let (file, line) = split_line_key(key)?;
                self.line
                    .iter()
                    .find(|brk| brk.original_lineno == line && brk.file.as_deref() == Some(file))
            }
            BreakpointKind::Call | BreakpointKind::Return => self.function.get(key),
            BreakpointKind::Exception => self.exception.get(key),
            BreakpointKind::Watch => None,
        }
    }

    pub fn find_info_mut(&mut self, kind: BreakpointKind, key: &str) -> Option<&mut BrkInfo> {
        match kind {
            BreakpointKind::Line | BreakpointKind::Conditional => {
                let (file, line) = split_line_key(key)?;
                self.line
                    .iter_mut()
                    .find(|brk| brk.original_lineno == line && brk.file.as_deref() == Some(file))
            }
            BreakpointKind::Call | BreakpointKind::Return => self.function.get_mut(key),
            BreakpointKind::Exception => self.exception.get_mut(key),
            BreakpointKind::Watch => None,
        }
    }

    pub fn delete_info(&mut self, kind: BreakpointKind, key: &str) -> bool {
        match kind {
            BreakpointKind::Line | BreakpointKind::Conditional => {
                let Some((file, line)) = split_line_key(key) else {
                    return false;
                };
                let found = self.line.iter().position(|brk| {
                    brk.original_lineno == line && brk.file.as_deref() == Some(file)
                });
                match found {
                    Some(idx) => {
                        self.line.remove(idx);
                        true
                    }
                    None => false,
                }
            }
            BreakpointKind::Call | BreakpointKind::Return => self.function.remove(key).is_some(),
            BreakpointKind::Exception => self.exception.remove(key).is_some(),
            BreakpointKind::Watch => false,
        }
    }

    /// Line/conditional records in insertion order.
    pub fn line_breakpoints(&self) -> impl Iterator<Item = &BrkInfo> {
        self.line.iter()
    }

    pub fn line_breakpoints_mut(&mut self) -> impl Iterator<Item = &mut BrkInfo> {
        self.line.iter_mut()
    }

    pub fn function_info_mut(&mut self, key: &str) -> Option<&mut BrkInfo> {
        self.function.get_mut(key)
    }

    pub fn exception_info_mut(&mut self, key: &str) -> Option<&mut BrkInfo> {
        self.exception.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.admin.len()
    }

    pub fn is_empty(&self) -> bool {
        self.admin.is_empty()
    }
}
