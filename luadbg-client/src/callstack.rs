//! Call stack model
//!
//! The runtime pushes frame 0 with every stop. Deeper frames arrive in the
//! same `CallStack` stream but their variables are only fetched when the
//! user selects them, via `CallStackLookupPerform`.

use luadbg_protocol::CallStackFrame;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub file: String,
    pub current_line: i32,
    pub line_defined: i32,
    pub last_line_defined: i32,
    pub function_name: String,
    pub level: u16,
    /// Locals/upvalues/env vars still need to be requested
    pub needs_lookup: bool,
    pub can_be_looked_up: bool,
}

impl Frame {
    fn from_wire(frame: &CallStackFrame) -> Self {
        let deeper = frame.level != 0;
        Self {
            file: frame.rel_script_path.clone(),
            current_line: frame.current_line,
            line_defined: frame.line_defined,
            last_line_defined: frame.last_line_defined,
            function_name: frame.function_name.clone(),
            level: frame.level,
            needs_lookup: deeper,
            can_be_looked_up: deeper,
        }
    }

    fn refresh(&mut self, frame: &CallStackFrame) {
        self.file = frame.rel_script_path.clone();
        self.current_line = frame.current_line;
        self.line_defined = frame.line_defined;
        self.last_line_defined = frame.last_line_defined;
        self.function_name = frame.function_name.clone();
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallStack {
    frames: Vec<Frame>,
    current_level: u16,
    previous_level: u16,
    lookup_in_flight: Option<u16>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every frame. The selected level survives so the next stop can
    /// restore it.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.lookup_in_flight = None;
    }

    /// Forget everything, including the selection
    pub fn reset(&mut self) {
        self.clear();
        self.current_level = 0;
        self.previous_level = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Add or refresh the frame at `frame.level`. Returns `true` for a new
    /// level.
    pub fn add_frame(&mut self, frame: &CallStackFrame) -> bool {
        match self.frames.binary_search_by_key(&frame.level, |f| f.level) {
            Ok(pos) => {
                self.frames[pos].refresh(frame);
                false
            }
            Err(pos) => {
                debug!(level = frame.level, function = %frame.function_name, "call stack level added");
                self.frames.insert(pos, Frame::from_wire(frame));
                true
            }
        }
    }

    pub fn frame(&self, level: u16) -> Option<&Frame> {
        self.frames
            .binary_search_by_key(&level, |f| f.level)
            .ok()
            .map(|pos| &self.frames[pos])
    }

    fn frame_mut(&mut self, level: u16) -> Option<&mut Frame> {
        let pos = self.frames.binary_search_by_key(&level, |f| f.level).ok()?;
        self.frames.get_mut(pos)
    }

    /// Frames ordered by level, innermost first
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn current_level(&self) -> u16 {
        self.current_level
    }

    pub fn previous_level(&self) -> u16 {
        self.previous_level
    }

    /// Change the selected level. Returns the old level when the selection
    /// actually moved.
    pub fn select(&mut self, level: u16) -> Option<u16> {
        if level == self.current_level {
            return None;
        }
        self.previous_level = self.current_level;
        self.current_level = level;
        Some(self.previous_level)
    }

    /// Whether selecting `level` must first ask the runtime for its
    /// variables
    pub fn needs_lookup(&self, level: u16) -> bool {
        self.frame(level)
            .is_some_and(|f| f.needs_lookup && f.can_be_looked_up)
    }

    pub fn lookup_in_flight(&self) -> Option<u16> {
        self.lookup_in_flight
    }

    /// Mark a `CallStackLookupPerform` as sent for `level`
    pub fn begin_lookup(&mut self, level: u16) -> bool {
        if let Some(pending) = self.lookup_in_flight {
            debug!(pending, level, "call stack lookup deferred until the pending one ends");
            return false;
        }
        self.lookup_in_flight = Some(level);
        true
    }

    /// Close the in-flight lookup. Returns the level that finished.
    pub fn end_lookup(&mut self) -> Option<u16> {
        let level = self.lookup_in_flight.take()?;
        if let Some(frame) = self.frame_mut(level) {
            frame.needs_lookup = false;
        }
        Some(level)
    }
}
