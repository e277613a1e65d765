//! Breakpoint bookkeeping for the JSON handler.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::event::{BreakpointEvent, HookKind};

/// A client breakpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Breakpoint {
    /// Stop when a line of a file is about to run.
    Line { filename: String, linenum: i32 },
    /// Stop when a named function is called.
    Function { funcname: String },
}

impl Breakpoint {
    pub fn line(filename: impl Into<String>, linenum: i32) -> Self {
        Breakpoint::Line {
            filename: filename.into(),
            linenum,
        }
    }

    pub fn function(funcname: impl Into<String>) -> Self {
        Breakpoint::Function {
            funcname: funcname.into(),
        }
    }
}

/// All breakpoints of a session.
#[derive(Debug, Clone, Default)]
pub struct BreakpointTable {
    lines: BTreeMap<String, BTreeSet<i32>>,
    functions: BTreeSet<String>,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a breakpoint. Returns `false` if it was already set.
    pub fn add(&mut self, bp: Breakpoint) -> bool {
        match bp {
            Breakpoint::Line { filename, linenum } => {
                self.lines.entry(filename).or_default().insert(linenum)
            }
            Breakpoint::Function { funcname } => self.functions.insert(funcname),
        }
    }

    /// Remove a breakpoint. Returns `true` if it existed.
    pub fn remove(&mut self, bp: &Breakpoint) -> bool {
        match bp {
            Breakpoint::Line { filename, linenum } => {
                let Some(lines) = self.lines.get_mut(filename) else {
                    return false;
                };
                let removed = lines.remove(linenum);
                if lines.is_empty() {
                    self.lines.remove(filename);
                }
                removed
            }
            Breakpoint::Function { funcname } => self.functions.remove(funcname),
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.functions.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.functions.is_empty()
    }

    /// Every breakpoint: line breakpoints by file and line, then functions.
    pub fn all(&self) -> Vec<Breakpoint> {
        let lines = self.lines.iter().flat_map(|(file, lines)| {
            lines.iter().map(move |&line| Breakpoint::line(file.clone(), line))
        });
        let functions = self.functions.iter().cloned().map(Breakpoint::function);
        lines.chain(functions).collect()
    }

    /// The breakpoint `event` hits, if any.
    ///
    /// Line events match a file breakpoint whose name equals the running
    /// file or is a trailing path of it (`game.lua` matches
    /// `scripts/game.lua`). Call events match function breakpoints by name.
    pub fn matching(&self, event: &BreakpointEvent) -> Option<Breakpoint> {
        match event.kind {
            HookKind::Line => {
                let file = event.source_file()?;
                let line = event.current_line;
                if self.lines.get(file).is_some_and(|set| set.contains(&line)) {
                    return Some(Breakpoint::line(file, line));
                }
                self.lines
                    .iter()
                    .find(|(name, set)| set.contains(&line) && Path::new(file).ends_with(name))
                    .map(|(name, _)| Breakpoint::line(name.clone(), line))
            }
            HookKind::Call => {
                let name = event.function_name.as_deref()?;
                self.functions
                    .contains(name)
                    .then(|| Breakpoint::function(name))
            }
            _ => None,
        }
    }
}
