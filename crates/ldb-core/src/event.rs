//! Hook events raised by the host runtime.

use serde::Serialize;

/// The checkpoint a hook event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    /// A function is being entered.
    Call,
    /// A function is returning.
    Return,
    /// Execution reached a new source line.
    Line,
    /// Periodic instruction-count checkpoint.
    Count,
    /// A tail call returned.
    TailReturn,
    /// Any code the runtime sends that this debugger does not know.
    Unknown(i32),
}

impl HookKind {
    /// Map the runtime's integer event code.
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => HookKind::Call,
            1 => HookKind::Return,
            2 => HookKind::Line,
            3 => HookKind::Count,
            4 => HookKind::TailReturn,
            other => HookKind::Unknown(other),
        }
    }

    /// The runtime's integer event code.
    pub fn raw(self) -> i32 {
        match self {
            HookKind::Call => 0,
            HookKind::Return => 1,
            HookKind::Line => 2,
            HookKind::Count => 3,
            HookKind::TailReturn => 4,
            HookKind::Unknown(code) => code,
        }
    }
}

/// What kind of code the current frame is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// A script function.
    Script,
    /// The main chunk.
    Main,
    /// A frame left behind by a tail call.
    Tail,
    /// A native (host) function.
    Native,
}

impl FrameKind {
    /// Classify the runtime's frame tag (`"Lua"`, `"main"`, `"tail"`, `"C"`).
    pub fn from_tag(tag: &str) -> Self {
        if tag.eq_ignore_ascii_case("lua") {
            FrameKind::Script
        } else if tag.eq_ignore_ascii_case("main") {
            FrameKind::Main
        } else if tag.eq_ignore_ascii_case("tail") {
            FrameKind::Tail
        } else {
            FrameKind::Native
        }
    }
}

/// A hook payload as handed over by the runtime. The strings borrow
/// runtime-owned memory and are only valid for the duration of the hook call.
#[derive(Debug, Clone, Copy)]
pub struct RawHookEvent<'a> {
    /// Raw event code.
    pub event: i32,
    /// Name of the function, when the runtime could resolve one.
    pub name: Option<&'a str>,
    /// How the name was resolved (`global`, `local`, `method`, `field`, ...).
    pub name_what: Option<&'a str>,
    /// Frame tag (`Lua`, `main`, `tail`, `C`).
    pub what: &'a str,
    /// Chunk name; file-backed chunks start with `@`.
    pub source: &'a str,
    /// Current line, or -1 when unavailable.
    pub current_line: i32,
    /// Number of upvalues of the running function.
    pub upvalue_count: u32,
    /// Line where the function definition starts.
    pub line_defined: i32,
    /// Line where the function definition ends.
    pub last_line_defined: i32,
}

/// An owned snapshot of a hook event, safe to keep after the hook returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakpointEvent {
    /// Checkpoint kind.
    pub kind: HookKind,
    /// Function name, if known.
    pub function_name: Option<String>,
    /// How the function name was resolved.
    pub name_kind: Option<String>,
    /// What kind of code is running.
    pub frame_kind: FrameKind,
    /// Chunk name.
    pub source: String,
    /// Current line, or -1.
    pub current_line: i32,
    /// Upvalue count of the running function.
    pub upvalue_count: u32,
    /// First line of the function definition.
    pub line_defined: i32,
    /// Last line of the function definition.
    pub last_line_defined: i32,
}

impl BreakpointEvent {
    /// Copy everything out of a raw hook payload.
    pub fn snapshot(raw: &RawHookEvent<'_>) -> Self {
        Self {
            kind: HookKind::from_raw(raw.event),
            function_name: raw.name.filter(|n| !n.is_empty()).map(str::to_owned),
            name_kind: raw.name_what.filter(|n| !n.is_empty()).map(str::to_owned),
            frame_kind: FrameKind::from_tag(raw.what),
            source: raw.source.to_owned(),
            current_line: raw.current_line,
            upvalue_count: raw.upvalue_count,
            line_defined: raw.line_defined,
            last_line_defined: raw.last_line_defined,
        }
    }

    /// Whether the running chunk was loaded from a file (as opposed to a string).
    pub fn is_file_backed(&self) -> bool {
        self.source.starts_with('@')
    }

    /// The file path of a file-backed chunk.
    pub fn source_file(&self) -> Option<&str> {
        self.source.strip_prefix('@')
    }

    /// `file:line` (or `chunk:line`) for display.
    pub fn location(&self) -> String {
        let source = self.source_file().unwrap_or(&self.source);
        format!("{}:{}", source, self.current_line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_line(source: &str, line: i32) -> RawHookEvent<'_> {
        RawHookEvent {
            event: 2,
            name: None,
            name_what: None,
            what: "Lua",
            source,
            current_line: line,
            upvalue_count: 0,
            line_defined: 1,
            last_line_defined: 20,
        }
    }

    #[test]
    fn hook_kind_from_raw_codes() {
        assert_eq!(HookKind::from_raw(0), HookKind::Call);
        assert_eq!(HookKind::from_raw(1), HookKind::Return);
        assert_eq!(HookKind::from_raw(2), HookKind::Line);
        assert_eq!(HookKind::from_raw(3), HookKind::Count);
        assert_eq!(HookKind::from_raw(4), HookKind::TailReturn);
        assert_eq!(HookKind::from_raw(99), HookKind::Unknown(99));
        assert_eq!(HookKind::Unknown(99).raw(), 99);
        assert_eq!(HookKind::Line.raw(), 2);
    }

    #[test]
    fn frame_kind_from_tag_is_case_insensitive() {
        assert_eq!(FrameKind::from_tag("Lua"), FrameKind::Script);
        assert_eq!(FrameKind::from_tag("LUA"), FrameKind::Script);
        assert_eq!(FrameKind::from_tag("main"), FrameKind::Main);
        assert_eq!(FrameKind::from_tag("tail"), FrameKind::Tail);
        assert_eq!(FrameKind::from_tag("C"), FrameKind::Native);
        assert_eq!(FrameKind::from_tag(""), FrameKind::Native);
    }

    #[test]
    fn snapshot_owns_its_strings() {
        let source = String::from("@scripts/game.lua");
        let event = {
            let raw = raw_line(&source, 12);
            BreakpointEvent::snapshot(&raw)
        };
        drop(source);
        assert_eq!(event.source, "@scripts/game.lua");
        assert_eq!(event.kind, HookKind::Line);
        assert_eq!(event.current_line, 12);
    }

    #[test]
    fn snapshot_treats_empty_names_as_absent() {
        let mut raw = raw_line("@a.lua", 1);
        raw.event = 0;
        raw.name = Some("");
        raw.name_what = Some("");
        let event = BreakpointEvent::snapshot(&raw);
        assert!(event.function_name.is_none());
        assert!(event.name_kind.is_none());
    }

    #[test]
    fn file_backed_sources() {
        let file = BreakpointEvent::snapshot(&raw_line("@main.lua", 3));
        assert!(file.is_file_backed());
        assert_eq!(file.source_file(), Some("main.lua"));
        assert_eq!(file.location(), "main.lua:3");

        let chunk = BreakpointEvent::snapshot(&raw_line("return 1 + 1", 1));
        assert!(!chunk.is_file_backed());
        assert_eq!(chunk.source_file(), None);
        assert_eq!(chunk.location(), "return 1 + 1:1");
    }

    #[test]
    fn serializes_kind_in_snake_case() {
        let json = serde_json::to_value(BreakpointEvent::snapshot(&raw_line("@x.lua", 7))).unwrap();
        assert_eq!(json["kind"], "line");
        assert_eq!(json["frame_kind"], "script");
        assert_eq!(json["current_line"], 7);
    }
}
