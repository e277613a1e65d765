//! A small in-memory scripting runtime.
//!
//! Programs are lists of functions whose bodies are straight-line statements
//! (local and global assignments, calls). Executing a program on a thread
//! raises the same Call/Line/Return hook events a real interpreter would, so
//! the debugger can be driven end to end without embedding one.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{HostError, ScriptError};
use crate::event::{HookKind, RawHookEvent};
use crate::handle::ExecutionHandle;
use crate::host::HostRuntime;
use crate::registry::Debugger;
use crate::value::{HostValue, TypeTag, ValueClass};

/// Runtime error while running code.
pub const ERR_RUN: i32 = 2;
/// The code could not be parsed.
pub const ERR_SYNTAX: i32 = 3;
/// A script file could not be read.
pub const ERR_FILE: i32 = 6;

/// Calls nested deeper than this are skipped.
const MAX_CALL_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A script value.
#[derive(Debug, Clone)]
pub enum ScriptValue {
    Nil,
    Boolean(bool),
    Number(f64),
    Str(String),
    Function(Arc<FunctionDef>),
    Table(Arc<Table>),
}

/// An immutable table, kept in insertion order.
#[derive(Debug, Default)]
pub struct Table {
    entries: Vec<(ScriptValue, ScriptValue)>,
}

impl Table {
    /// Look up a string key.
    pub fn field(&self, key: &str) -> Option<&ScriptValue> {
        self.entries
            .iter()
            .find(|(k, _)| matches!(k, ScriptValue::Str(s) if s == key))
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ScriptValue {
    pub fn str(s: impl Into<String>) -> Self {
        ScriptValue::Str(s.into())
    }

    /// A table from key/value pairs, in the given order.
    pub fn table(entries: impl IntoIterator<Item = (ScriptValue, ScriptValue)>) -> Self {
        ScriptValue::Table(Arc::new(Table {
            entries: entries.into_iter().collect(),
        }))
    }

    /// A table with string keys.
    pub fn record<'a>(fields: impl IntoIterator<Item = (&'a str, ScriptValue)>) -> Self {
        Self::table(fields.into_iter().map(|(k, v)| (Self::str(k), v)))
    }

    /// A sequence indexed from 1.
    pub fn list(items: impl IntoIterator<Item = ScriptValue>) -> Self {
        Self::table(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (ScriptValue::Number((i + 1) as f64), v)),
        )
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            ScriptValue::Nil => TypeTag::Nil,
            ScriptValue::Boolean(_) => TypeTag::Boolean,
            ScriptValue::Number(_) => TypeTag::Number,
            ScriptValue::Str(_) => TypeTag::String,
            ScriptValue::Function(_) => TypeTag::Function,
            ScriptValue::Table(_) => TypeTag::Table,
        }
    }
}

impl HostValue for ScriptValue {
    fn class(&self) -> ValueClass<'_> {
        match self {
            ScriptValue::Nil => ValueClass::Nil,
            ScriptValue::Boolean(b) => ValueClass::Boolean(*b),
            ScriptValue::Number(n) => ValueClass::Number(*n),
            ScriptValue::Str(s) => ValueClass::Text(Cow::Borrowed(s.as_str())),
            ScriptValue::Function(f) => ValueClass::Reference {
                tag: TypeTag::Function,
                identity: Arc::as_ptr(f) as usize,
            },
            ScriptValue::Table(t) => ValueClass::Container {
                identity: Arc::as_ptr(t) as usize,
            },
        }
    }

    fn for_each_entry(&self, visit: &mut dyn FnMut(&dyn HostValue, &dyn HostValue)) {
        if let ScriptValue::Table(table) = self {
            for (key, value) in &table.entries {
                visit(key, value);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Programs
// ---------------------------------------------------------------------------

/// One statement of a function body.
#[derive(Debug, Clone)]
pub enum Statement {
    /// Declare a local.
    Local {
        line: i32,
        name: String,
        value: ScriptValue,
    },
    /// Assign a global.
    Global {
        line: i32,
        name: String,
        value: ScriptValue,
    },
    /// Call a function by name. Names the program does not define are
    /// treated as native functions.
    Call { line: i32, target: String },
}

impl Statement {
    pub fn line(&self) -> i32 {
        match self {
            Statement::Local { line, .. }
            | Statement::Global { line, .. }
            | Statement::Call { line, .. } => *line,
        }
    }
}

/// A script function. An empty name makes it anonymous.
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub line_defined: i32,
    pub last_line_defined: i32,
    pub upvalues: Vec<(String, ScriptValue)>,
    pub body: Vec<Statement>,
}

impl FunctionDef {
    pub fn new(name: impl Into<String>, line_defined: i32, last_line_defined: i32) -> Self {
        Self {
            name: name.into(),
            line_defined,
            last_line_defined,
            upvalues: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn upvalue(mut self, name: impl Into<String>, value: ScriptValue) -> Self {
        self.upvalues.push((name.into(), value));
        self
    }

    pub fn local(mut self, line: i32, name: impl Into<String>, value: ScriptValue) -> Self {
        self.body.push(Statement::Local {
            line,
            name: name.into(),
            value,
        });
        self
    }

    pub fn global(mut self, line: i32, name: impl Into<String>, value: ScriptValue) -> Self {
        self.body.push(Statement::Global {
            line,
            name: name.into(),
            value,
        });
        self
    }

    pub fn call(mut self, line: i32, target: impl Into<String>) -> Self {
        self.body.push(Statement::Call {
            line,
            target: target.into(),
        });
        self
    }
}

/// A chunk: a main function plus the named functions it can call.
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    main: Arc<FunctionDef>,
    functions: HashMap<String, Arc<FunctionDef>>,
}

impl Program {
    /// `source` is the chunk name; prefix it with `@` for a file-backed chunk.
    pub fn new(source: impl Into<String>, main: FunctionDef) -> Self {
        Self {
            source: source.into(),
            main: Arc::new(main),
            functions: HashMap::new(),
        }
    }

    pub fn function(mut self, def: FunctionDef) -> Self {
        self.functions.insert(def.name.clone(), Arc::new(def));
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn lookup(&self, name: &str) -> Option<&Arc<FunctionDef>> {
        self.functions.get(name)
    }

    /// The demo program run by the server: a game-loop style `update` that
    /// calls a helper and a native `print`.
    pub fn demo(script_name: &str) -> Self {
        let sprites = ScriptValue::record([
            ("name", ScriptValue::str("sprites")),
            ("visible", ScriptValue::Boolean(true)),
        ]);
        let config = ScriptValue::record([
            ("title", ScriptValue::str("demo")),
            ("speed", ScriptValue::Number(2.5)),
            (
                "layers",
                ScriptValue::list([ScriptValue::str("background"), sprites]),
            ),
        ]);

        let main = FunctionDef::new("", 1, 40)
            .global(1, "frame", ScriptValue::Number(0.0))
            .local(2, "config", config.clone())
            .call(3, "update")
            .call(4, "print");
        let update = FunctionDef::new("update", 10, 20)
            .upvalue("config", config)
            .local(11, "dt", ScriptValue::Number(0.016))
            .local(12, "label", ScriptValue::str("tick"))
            .call(13, "step")
            .local(14, "done", ScriptValue::Boolean(false));
        let step = FunctionDef::new("step", 22, 30)
            .upvalue("gravity", ScriptValue::Number(-9.8))
            .local(23, "x", ScriptValue::Number(1.0))
            .local(24, "y", ScriptValue::Number(2.0))
            .call(25, "print");

        Program::new(format!("@{script_name}"), main)
            .function(update)
            .function(step)
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Frame {
    function: Arc<FunctionDef>,
    locals: Vec<(String, ScriptValue)>,
    line: i32,
}

#[derive(Debug)]
struct ThreadState {
    name: String,
    /// Innermost frame last.
    frames: Vec<Frame>,
}

/// Runs [`Program`]s on caller-provided threads and implements
/// [`HostRuntime`] over their state.
#[derive(Debug)]
pub struct ScriptHost {
    program: Program,
    threads: Mutex<HashMap<ExecutionHandle, ThreadState>>,
    hooked: Mutex<HashSet<ExecutionHandle>>,
    globals: Mutex<BTreeMap<String, ScriptValue>>,
    next_handle: AtomicU64,
    step_delay: Duration,
}

impl ScriptHost {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            threads: Mutex::new(HashMap::new()),
            hooked: Mutex::new(HashSet::new()),
            globals: Mutex::new(BTreeMap::new()),
            next_handle: AtomicU64::new(0x1000),
            step_delay: Duration::ZERO,
        }
    }

    /// Sleep this long after every statement.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Create an execution thread and return its handle.
    pub fn create_thread(&self, name: impl Into<String>) -> ExecutionHandle {
        let handle = ExecutionHandle::new(self.next_handle.fetch_add(0x10, Ordering::Relaxed));
        self.threads.lock().insert(
            handle,
            ThreadState {
                name: name.into(),
                frames: Vec::new(),
            },
        );
        handle
    }

    /// Name given to a thread at creation.
    pub fn thread_name(&self, handle: ExecutionHandle) -> Option<String> {
        self.threads.lock().get(&handle).map(|t| t.name.clone())
    }

    /// Run the program's main function once on the calling thread, raising
    /// hook events into `debugger` while the hook is installed.
    pub fn run(&self, debugger: &Debugger, handle: ExecutionHandle) -> Result<(), HostError> {
        if !self.threads.lock().contains_key(&handle) {
            return Err(HostError::UnknownExecution(handle));
        }
        let main = Arc::clone(&self.program.main);
        self.invoke(debugger, handle, &main, true, 0);
        Ok(())
    }

    pub fn global(&self, name: &str) -> Option<ScriptValue> {
        self.globals.lock().get(name).cloned()
    }

    pub fn set_global(&self, name: impl Into<String>, value: ScriptValue) {
        self.globals.lock().insert(name.into(), value);
    }

    fn invoke(
        &self,
        debugger: &Debugger,
        handle: ExecutionHandle,
        function: &Arc<FunctionDef>,
        is_main: bool,
        depth: usize,
    ) {
        self.with_thread(handle, |thread| {
            thread.frames.push(Frame {
                function: Arc::clone(function),
                locals: Vec::new(),
                line: function.line_defined,
            })
        });
        let what = if is_main { "main" } else { "Lua" };
        self.hook(debugger, handle, HookKind::Call, function, what, function.line_defined);

        for statement in &function.body {
            let line = statement.line();
            self.with_thread(handle, |thread| {
                if let Some(frame) = thread.frames.last_mut() {
                    frame.line = line;
                }
            });
            self.hook(debugger, handle, HookKind::Line, function, what, line);

            match statement {
                Statement::Local { name, value, .. } => self.with_thread(handle, |thread| {
                    if let Some(frame) = thread.frames.last_mut() {
                        frame.locals.push((name.clone(), value.clone()));
                    }
                }),
                Statement::Global { name, value, .. } => self.set_global(name.clone(), value.clone()),
                Statement::Call { target, .. } => match self.program.lookup(target) {
                    Some(callee) if depth < MAX_CALL_DEPTH => {
                        let callee = Arc::clone(callee);
                        self.invoke(debugger, handle, &callee, false, depth + 1);
                    }
                    Some(_) => tracing::warn!(%handle, callee = %target, "call depth exceeded"),
                    None => self.native_call(debugger, handle, target),
                },
            }
            if !self.step_delay.is_zero() {
                std::thread::sleep(self.step_delay);
            }
        }

        self.hook(debugger, handle, HookKind::Return, function, what, function.last_line_defined);
        self.with_thread(handle, |thread| {
            thread.frames.pop();
        });
    }

    fn native_call(&self, debugger: &Debugger, handle: ExecutionHandle, target: &str) {
        for kind in [HookKind::Call, HookKind::Return] {
            if !self.is_hooked(handle) {
                return;
            }
            let raw = RawHookEvent {
                event: kind.raw(),
                name: Some(target),
                name_what: Some("global"),
                what: "C",
                source: "=[C]",
                current_line: -1,
                upvalue_count: 0,
                line_defined: -1,
                last_line_defined: -1,
            };
            debugger.on_hook_event(handle, &raw);
        }
    }

    fn hook(
        &self,
        debugger: &Debugger,
        handle: ExecutionHandle,
        kind: HookKind,
        function: &FunctionDef,
        what: &str,
        line: i32,
    ) {
        if !self.is_hooked(handle) {
            return;
        }
        let named = !function.name.is_empty();
        let raw = RawHookEvent {
            event: kind.raw(),
            name: named.then_some(function.name.as_str()),
            name_what: named.then_some("global"),
            what,
            source: &self.program.source,
            current_line: line,
            upvalue_count: function.upvalues.len() as u32,
            line_defined: function.line_defined,
            last_line_defined: function.last_line_defined,
        };
        debugger.on_hook_event(handle, &raw);
    }

    fn is_hooked(&self, handle: ExecutionHandle) -> bool {
        self.hooked.lock().contains(&handle)
    }

    fn with_thread(&self, handle: ExecutionHandle, f: impl FnOnce(&mut ThreadState)) {
        if let Some(thread) = self.threads.lock().get_mut(&handle) {
            f(thread);
        }
    }

    fn visit_frame(
        &self,
        handle: ExecutionHandle,
        frame: usize,
        f: impl FnOnce(&Frame) -> bool,
    ) -> bool {
        let threads = self.threads.lock();
        threads
            .get(&handle)
            .and_then(|thread| thread.frames.iter().rev().nth(frame))
            .is_some_and(f)
    }

    /// Resolve a name the way the running code would: innermost local first
    /// (latest declaration wins), then upvalues, then globals.
    fn resolve(&self, handle: ExecutionHandle, name: &str) -> ScriptValue {
        let found = {
            let threads = self.threads.lock();
            threads
                .get(&handle)
                .and_then(|thread| thread.frames.last())
                .and_then(|frame| {
                    frame
                        .locals
                        .iter()
                        .rev()
                        .chain(frame.function.upvalues.iter())
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| v.clone())
                })
        };
        found
            .or_else(|| self.global(name))
            .unwrap_or(ScriptValue::Nil)
    }

    fn eval_expr(&self, handle: ExecutionHandle, expr: &str) -> Result<ScriptValue, ScriptError> {
        let expr = expr.trim();
        let expr = expr.strip_prefix("return ").map(str::trim).unwrap_or(expr);
        if let Some(value) = parse_literal(expr) {
            return Ok(value);
        }
        let mut segments = expr.split('.');
        let root = segments.next().unwrap_or_default();
        if !is_identifier(root) {
            return Err(syntax_error(expr));
        }
        let mut value = self.resolve(handle, root);
        for segment in segments {
            if !is_identifier(segment) {
                return Err(syntax_error(expr));
            }
            value = match &value {
                ScriptValue::Table(table) => table.field(segment).cloned().unwrap_or(ScriptValue::Nil),
                other => {
                    return Err(ScriptError::new(
                        ERR_RUN,
                        format!("attempt to index a {} value", other.type_tag().as_str()),
                    ))
                }
            };
        }
        Ok(value)
    }
}

impl HostRuntime for ScriptHost {
    fn install_hook(&self, handle: ExecutionHandle) -> Result<(), HostError> {
        if !self.threads.lock().contains_key(&handle) {
            return Err(HostError::UnknownExecution(handle));
        }
        self.hooked.lock().insert(handle);
        Ok(())
    }

    fn remove_hook(&self, handle: ExecutionHandle) -> Result<(), HostError> {
        if self.hooked.lock().remove(&handle) {
            Ok(())
        } else {
            Err(HostError::Hook(format!("no hook installed for {handle}")))
        }
    }

    fn visit_local(
        &self,
        handle: ExecutionHandle,
        frame: usize,
        index: u32,
        visit: &mut dyn FnMut(&str, &dyn HostValue),
    ) -> bool {
        self.visit_frame(handle, frame, |frame| {
            let slot = (index as usize).checked_sub(1).and_then(|i| frame.locals.get(i));
            match slot {
                Some((name, value)) => {
                    visit(name.as_str(), value);
                    true
                }
                None => false,
            }
        })
    }

    fn visit_upvalue(
        &self,
        handle: ExecutionHandle,
        frame: usize,
        index: u32,
        visit: &mut dyn FnMut(&str, &dyn HostValue),
    ) -> bool {
        self.visit_frame(handle, frame, |frame| {
            let slot = (index as usize)
                .checked_sub(1)
                .and_then(|i| frame.function.upvalues.get(i));
            match slot {
                Some((name, value)) => {
                    visit(name.as_str(), value);
                    true
                }
                None => false,
            }
        })
    }

    fn evaluate(
        &self,
        handle: ExecutionHandle,
        expr: &str,
        visit: &mut dyn FnMut(&dyn HostValue),
    ) -> Result<(), ScriptError> {
        let value = self.eval_expr(handle, expr)?;
        visit(&value);
        Ok(())
    }

    fn load_file(&self, handle: ExecutionHandle, path: &Path) -> Result<(), ScriptError> {
        if !self.threads.lock().contains_key(&handle) {
            return Err(ScriptError::new(ERR_RUN, format!("no execution {handle}")));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            ScriptError::new(ERR_FILE, format!("cannot open {}: {}", path.display(), e))
        })?;

        // `name = literal` per line; `--` starts a comment.
        let mut assignments = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.split("--").next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let parsed = line.split_once('=').and_then(|(name, value)| {
                let name = name.trim();
                is_identifier(name).then_some(())?;
                Some((name.to_string(), parse_literal(value.trim())?))
            });
            match parsed {
                Some(assignment) => assignments.push(assignment),
                None => {
                    return Err(ScriptError::new(
                        ERR_SYNTAX,
                        format!("{}:{}: unexpected symbol near '{}'", path.display(), number + 1, line),
                    ))
                }
            }
        }

        let mut globals = self.globals.lock();
        for (name, value) in assignments {
            globals.insert(name, value);
        }
        tracing::debug!(%handle, path = %path.display(), "script file loaded");
        Ok(())
    }
}

fn parse_literal(text: &str) -> Option<ScriptValue> {
    match text {
        "nil" => return Some(ScriptValue::Nil),
        "true" => return Some(ScriptValue::Boolean(true)),
        "false" => return Some(ScriptValue::Boolean(false)),
        _ => {}
    }
    for quote in ['"', '\''] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return Some(ScriptValue::str(inner));
        }
    }
    let starts_numeric = text
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '.');
    if starts_numeric {
        return text.parse::<f64>().ok().map(ScriptValue::Number);
    }
    None
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn syntax_error(expr: &str) -> ScriptError {
    ScriptError::new(ERR_SYNTAX, format!("unexpected symbol near '{expr}'"))
}
