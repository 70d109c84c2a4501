//! SCMP message definitions and payload encoding

use bytes::BytesMut;

use crate::codec::CodecError;
use crate::codes::TypeCode;
use crate::types::*;
use crate::wire::{names_len, str_len, Reader, Writer, U16, U32, U8};

/// A decoded SCMP message for the Lua plugin
///
/// Streams of data are delimited by `*Begin` / item / `*End` triples; the
/// `*Begin`/`*End` markers carry no payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    // === Memory trace and profiling ===
    MemoryTraceBegin,
    MemoryTrace(MemoryTraceRecord),
    MemoryTraceEnd,
    MemoryTraceStreamBegin,
    MemoryTraceStream(MemoryTraceRecord),
    MemoryTraceStreamEnd,
    ProfileInfoBegin,
    ProfileInfo(ProfileRecord),
    ProfileInfoEnd,
    ProfileInfoLookupPerform(ProfileLookup),
    ProfileInfoLookupBegin,
    ProfileInfoLookup(ProfileRecord),
    ProfileInfoLookupEnd,

    // === Filter state ===
    VarFilterStateTypeBegin,
    VarFilterStateType(VarFilterType),
    VarFilterStateTypeEnd,
    VarFilterStateNameBegin,
    VarFilterStateName(VarFilterName),
    VarFilterStateNameEnd,

    // === Variables ===
    GlobalVarBegin,
    GlobalVar(LuaVar),
    GlobalVarEnd,
    GlobalVarLookupBegin,
    GlobalVarLookupEnd,
    LocalVarBegin,
    LocalVar(StackVar),
    LocalVarEnd,
    LocalVarLookupBegin,
    LocalVarLookupEnd,
    UpvalueVarBegin,
    UpvalueVar(StackVar),
    UpvalueVarEnd,
    UpvalueVarLookupBegin,
    UpvalueVarLookupEnd,
    EnvVarBegin,
    EnvVar(EnvVar),
    EnvVarEnd,
    EnvVarLookupBegin,
    EnvVarLookupEnd,

    // === Call stack ===
    CallStackBegin,
    CallStack(CallStackFrame),
    CallStackEnd,
    CallStackLookupPerform { level: u16 },
    CallStackLookupBegin,
    CallStackLookup(CallStackFrame),
    CallStackLookupEnd,

    // === Variable requests ===
    VarLookUp(VarLookUp),
    VarUpdate(VarUpdate),

    // === Watch lookup batches ===
    WatchLookupBegin,
    WatchLookupEnd,
    WatchLookupGlobalBegin,
    WatchLookupGlobalEnd,
    WatchLookupLocalBegin,
    WatchLookupLocalEnd,
    WatchLookupUpvalueBegin,
    WatchLookupUpvalueEnd,
    WatchLookupEnvVarBegin,
    WatchLookupEnvVarEnd,

    // === Runtime state and toggles ===
    LuaStateBegin,
    LuaStateAdd(LuaStateInfo),
    LuaStateRemove { address: String },
    LuaStateEnd,
    LuaStateToggle { address: String },
    MemoryTraceToggle,
    ProfilerToggle,

    // === Limits ===
    Limits(Limits),
}

impl Message {
    pub fn type_code(&self) -> TypeCode {
        use Message as M;
        use TypeCode as T;
        match self {
            M::MemoryTraceBegin => T::MemoryTraceBegin,
            M::MemoryTrace(_) => T::MemoryTrace,
            M::MemoryTraceEnd => T::MemoryTraceEnd,
            M::MemoryTraceStreamBegin => T::MemoryTraceStreamBegin,
            M::MemoryTraceStream(_) => T::MemoryTraceStream,
            M::MemoryTraceStreamEnd => T::MemoryTraceStreamEnd,
            M::ProfileInfoBegin => T::ProfileInfoBegin,
            M::ProfileInfo(_) => T::ProfileInfo,
            M::ProfileInfoEnd => T::ProfileInfoEnd,
            M::ProfileInfoLookupPerform(_) => T::ProfileInfoLookupPerform,
            M::ProfileInfoLookupBegin => T::ProfileInfoLookupBegin,
            M::ProfileInfoLookup(_) => T::ProfileInfoLookup,
            M::ProfileInfoLookupEnd => T::ProfileInfoLookupEnd,
            M::VarFilterStateTypeBegin => T::VarFilterStateTypeBegin,
            M::VarFilterStateType(_) => T::VarFilterStateType,
            M::VarFilterStateTypeEnd => T::VarFilterStateTypeEnd,
            M::VarFilterStateNameBegin => T::VarFilterStateNameBegin,
            M::VarFilterStateName(_) => T::VarFilterStateName,
            M::VarFilterStateNameEnd => T::VarFilterStateNameEnd,
            M::GlobalVarBegin => T::GlobalVarBegin,
            M::GlobalVar(_) => T::GlobalVar,
            M::GlobalVarEnd => T::GlobalVarEnd,
            M::GlobalVarLookupBegin => T::GlobalVarLookupBegin,
            M::GlobalVarLookupEnd => T::GlobalVarLookupEnd,
            M::LocalVarBegin => T::LocalVarBegin,
            M::LocalVar(_) => T::LocalVar,
            M::LocalVarEnd => T::LocalVarEnd,
            M::LocalVarLookupBegin => T::LocalVarLookupBegin,
            M::LocalVarLookupEnd => T::LocalVarLookupEnd,
            M::UpvalueVarBegin => T::UpvalueVarBegin,
            M::UpvalueVar(_) => T::UpvalueVar,
            M::UpvalueVarEnd => T::UpvalueVarEnd,
            M::UpvalueVarLookupBegin => T::UpvalueVarLookupBegin,
            M::UpvalueVarLookupEnd => T::UpvalueVarLookupEnd,
            M::EnvVarBegin => T::EnvVarBegin,
            M::EnvVar(_) => T::EnvVar,
            M::EnvVarEnd => T::EnvVarEnd,
            M::EnvVarLookupBegin => T::EnvVarLookupBegin,
            M::EnvVarLookupEnd => T::EnvVarLookupEnd,
            M::CallStackBegin => T::CallStackBegin,
            M::CallStack(_) => T::CallStack,
            M::CallStackEnd => T::CallStackEnd,
            M::CallStackLookupPerform { .. } => T::CallStackLookupPerform,
            M::CallStackLookupBegin => T::CallStackLookupBegin,
            M::CallStackLookup(_) => T::CallStackLookup,
            M::CallStackLookupEnd => T::CallStackLookupEnd,
            M::VarLookUp(_) => T::VarLookUp,
            M::VarUpdate(_) => T::VarUpdate,
            M::WatchLookupBegin => T::WatchLookupBegin,
            M::WatchLookupEnd => T::WatchLookupEnd,
            M::WatchLookupGlobalBegin => T::WatchLookupGlobalBegin,
            M::WatchLookupGlobalEnd => T::WatchLookupGlobalEnd,
            M::WatchLookupLocalBegin => T::WatchLookupLocalBegin,
            M::WatchLookupLocalEnd => T::WatchLookupLocalEnd,
            M::WatchLookupUpvalueBegin => T::WatchLookupUpvalueBegin,
            M::WatchLookupUpvalueEnd => T::WatchLookupUpvalueEnd,
            M::WatchLookupEnvVarBegin => T::WatchLookupEnvVarBegin,
            M::WatchLookupEnvVarEnd => T::WatchLookupEnvVarEnd,
            M::LuaStateBegin => T::LuaStateBegin,
            M::LuaStateAdd(_) => T::LuaStateAdd,
            M::LuaStateRemove { .. } => T::LuaStateRemove,
            M::LuaStateEnd => T::LuaStateEnd,
            M::LuaStateToggle { .. } => T::LuaStateToggle,
            M::MemoryTraceToggle => T::MemoryTraceToggle,
            M::ProfilerToggle => T::ProfilerToggle,
            M::Limits(_) => T::Limits,
        }
    }

    /// Marker that opens a scope group inside a watch lookup batch
    pub fn watch_scope_begin(scope: Scope) -> Self {
        match scope {
            Scope::Global => Self::WatchLookupGlobalBegin,
            Scope::Local => Self::WatchLookupLocalBegin,
            Scope::Upvalue => Self::WatchLookupUpvalueBegin,
            Scope::Environment => Self::WatchLookupEnvVarBegin,
        }
    }

    /// Marker that closes a scope group inside a watch lookup batch
    pub fn watch_scope_end(scope: Scope) -> Self {
        match scope {
            Scope::Global => Self::WatchLookupGlobalEnd,
            Scope::Local => Self::WatchLookupLocalEnd,
            Scope::Upvalue => Self::WatchLookupUpvalueEnd,
            Scope::Environment => Self::WatchLookupEnvVarEnd,
        }
    }

    /// Exact number of payload bytes this message encodes to
    pub fn payload_len(&self) -> usize {
        match self {
            Message::MemoryTrace(r) | Message::MemoryTraceStream(r) => r.encoded_len(),
            Message::ProfileInfo(r) | Message::ProfileInfoLookup(r) => r.encoded_len(),
            Message::ProfileInfoLookupPerform(l) => l.encoded_len(),
            Message::VarFilterStateType(_) => U8 + FILTER_SLOTS,
            Message::VarFilterStateName(f) => U8 + str_len(&f.pattern),
            Message::GlobalVar(v) => v.encoded_len(),
            Message::LocalVar(v) | Message::UpvalueVar(v) => v.var.encoded_len() + U16 + U32,
            Message::EnvVar(v) => v.var.encoded_len() + U16,
            Message::CallStack(f) | Message::CallStackLookup(f) => f.encoded_len(),
            Message::CallStackLookupPerform { .. } => U16,
            Message::VarLookUp(l) => l.encoded_len(),
            Message::VarUpdate(u) => u.lookup.encoded_len() + str_len(&u.value) + U16,
            Message::LuaStateAdd(s) => str_len(&s.address) + str_len(&s.name) + U8,
            Message::LuaStateRemove { address } | Message::LuaStateToggle { address } => {
                str_len(address)
            }
            Message::Limits(_) => U16 + U16 + U8 + U8,
            _ => 0,
        }
    }

    pub(crate) fn write_payload(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        let mut w = Writer::new(dst);
        match self {
            Message::MemoryTrace(r) | Message::MemoryTraceStream(r) => r.write(&mut w),
            Message::ProfileInfo(r) | Message::ProfileInfoLookup(r) => r.write(&mut w)?,
            Message::ProfileInfoLookupPerform(l) => {
                w.string(&l.function_name)?;
                w.string(&l.rel_script_path)?;
                w.i32(l.line_defined);
            }
            Message::VarFilterStateType(f) => {
                w.scope(f.scope);
                w.filter(&f.filter);
            }
            Message::VarFilterStateName(f) => {
                w.scope(f.scope);
                w.string(&f.pattern)?;
            }
            Message::GlobalVar(v) => v.write(&mut w)?,
            Message::LocalVar(v) | Message::UpvalueVar(v) => {
                v.var.write(&mut w)?;
                w.u16(v.level);
                w.i32(v.index);
            }
            Message::EnvVar(v) => {
                v.var.write(&mut w)?;
                w.u16(v.level);
            }
            Message::CallStack(f) | Message::CallStackLookup(f) => f.write(&mut w)?,
            Message::CallStackLookupPerform { level } => w.u16(*level),
            Message::VarLookUp(l) => l.write(&mut w)?,
            Message::VarUpdate(u) => {
                u.lookup.write(&mut w)?;
                w.string(&u.value)?;
                w.lua_type(u.value_type);
            }
            Message::LuaStateAdd(s) => {
                w.string(&s.address)?;
                w.string(&s.name)?;
                w.bool(s.debugging);
            }
            Message::LuaStateRemove { address } | Message::LuaStateToggle { address } => {
                w.string(address)?;
            }
            Message::Limits(l) => {
                w.u16(l.max_breakpoints);
                w.u16(l.max_var_filters);
                w.bool(l.profiler_enabled);
                w.bool(l.memory_tracer_enabled);
            }
            _ => {}
        }
        Ok(())
    }

    /// Decode a payload whose type code is already known.
    ///
    /// The payload must be consumed exactly; leftover bytes mean the peer
    /// and this build disagree on the layout.
    pub(crate) fn read_payload(code: TypeCode, payload: &[u8]) -> Result<Self, CodecError> {
        use Message as M;
        use TypeCode as T;

        let mut r = Reader::new(payload);
        let message = match code {
            T::MemoryTraceBegin => M::MemoryTraceBegin,
            T::MemoryTrace => M::MemoryTrace(MemoryTraceRecord::read(&mut r)?),
            T::MemoryTraceEnd => M::MemoryTraceEnd,
            T::MemoryTraceStreamBegin => M::MemoryTraceStreamBegin,
            T::MemoryTraceStream => M::MemoryTraceStream(MemoryTraceRecord::read(&mut r)?),
            T::MemoryTraceStreamEnd => M::MemoryTraceStreamEnd,
            T::ProfileInfoBegin => M::ProfileInfoBegin,
            T::ProfileInfo => M::ProfileInfo(ProfileRecord::read(&mut r)?),
            T::ProfileInfoEnd => M::ProfileInfoEnd,
            T::ProfileInfoLookupPerform => M::ProfileInfoLookupPerform(ProfileLookup {
                function_name: r.string()?,
                rel_script_path: r.string()?,
                line_defined: r.i32()?,
            }),
            T::ProfileInfoLookupBegin => M::ProfileInfoLookupBegin,
            T::ProfileInfoLookup => M::ProfileInfoLookup(ProfileRecord::read(&mut r)?),
            T::ProfileInfoLookupEnd => M::ProfileInfoLookupEnd,
            T::VarFilterStateTypeBegin => M::VarFilterStateTypeBegin,
            T::VarFilterStateType => M::VarFilterStateType(VarFilterType {
                scope: r.scope()?,
                filter: r.filter()?,
            }),
            T::VarFilterStateTypeEnd => M::VarFilterStateTypeEnd,
            T::VarFilterStateNameBegin => M::VarFilterStateNameBegin,
            T::VarFilterStateName => M::VarFilterStateName(VarFilterName {
                scope: r.scope()?,
                pattern: r.string()?,
            }),
            T::VarFilterStateNameEnd => M::VarFilterStateNameEnd,
            T::GlobalVarBegin => M::GlobalVarBegin,
            T::GlobalVar => M::GlobalVar(LuaVar::read(&mut r)?),
            T::GlobalVarEnd => M::GlobalVarEnd,
            T::GlobalVarLookupBegin => M::GlobalVarLookupBegin,
            T::GlobalVarLookupEnd => M::GlobalVarLookupEnd,
            T::LocalVarBegin => M::LocalVarBegin,
            T::LocalVar => M::LocalVar(StackVar::read(&mut r)?),
            T::LocalVarEnd => M::LocalVarEnd,
            T::LocalVarLookupBegin => M::LocalVarLookupBegin,
            T::LocalVarLookupEnd => M::LocalVarLookupEnd,
            T::UpvalueVarBegin => M::UpvalueVarBegin,
            T::UpvalueVar => M::UpvalueVar(StackVar::read(&mut r)?),
            T::UpvalueVarEnd => M::UpvalueVarEnd,
            T::UpvalueVarLookupBegin => M::UpvalueVarLookupBegin,
            T::UpvalueVarLookupEnd => M::UpvalueVarLookupEnd,
            T::EnvVarBegin => M::EnvVarBegin,
            T::EnvVar => M::EnvVar(EnvVar {
                var: LuaVar::read(&mut r)?,
                level: r.u16()?,
            }),
            T::EnvVarEnd => M::EnvVarEnd,
            T::EnvVarLookupBegin => M::EnvVarLookupBegin,
            T::EnvVarLookupEnd => M::EnvVarLookupEnd,
            T::CallStackBegin => M::CallStackBegin,
            T::CallStack => M::CallStack(CallStackFrame::read(&mut r)?),
            T::CallStackEnd => M::CallStackEnd,
            T::CallStackLookupPerform => M::CallStackLookupPerform { level: r.u16()? },
            T::CallStackLookupBegin => M::CallStackLookupBegin,
            T::CallStackLookup => M::CallStackLookup(CallStackFrame::read(&mut r)?),
            T::CallStackLookupEnd => M::CallStackLookupEnd,
            T::VarLookUp => M::VarLookUp(VarLookUp::read(&mut r)?),
            T::VarUpdate => M::VarUpdate(VarUpdate {
                lookup: VarLookUp::read(&mut r)?,
                value: r.string()?,
                value_type: r.lua_type()?,
            }),
            T::WatchLookupBegin => M::WatchLookupBegin,
            T::WatchLookupEnd => M::WatchLookupEnd,
            T::WatchLookupGlobalBegin => M::WatchLookupGlobalBegin,
            T::WatchLookupGlobalEnd => M::WatchLookupGlobalEnd,
            T::WatchLookupLocalBegin => M::WatchLookupLocalBegin,
            T::WatchLookupLocalEnd => M::WatchLookupLocalEnd,
            T::WatchLookupUpvalueBegin => M::WatchLookupUpvalueBegin,
            T::WatchLookupUpvalueEnd => M::WatchLookupUpvalueEnd,
            T::WatchLookupEnvVarBegin => M::WatchLookupEnvVarBegin,
            T::WatchLookupEnvVarEnd => M::WatchLookupEnvVarEnd,
            T::LuaStateBegin => M::LuaStateBegin,
            T::LuaStateAdd => M::LuaStateAdd(LuaStateInfo {
                address: r.string()?,
                name: r.string()?,
                debugging: r.bool()?,
            }),
            T::LuaStateRemove => M::LuaStateRemove { address: r.string()? },
            T::LuaStateEnd => M::LuaStateEnd,
            T::LuaStateToggle => M::LuaStateToggle { address: r.string()? },
            T::MemoryTraceToggle => M::MemoryTraceToggle,
            T::ProfilerToggle => M::ProfilerToggle,
            T::Limits => M::Limits(Limits {
                max_breakpoints: r.u16()?,
                max_var_filters: r.u16()?,
                profiler_enabled: r.bool()?,
                memory_tracer_enabled: r.bool()?,
            }),
        };

        if r.remaining() != 0 {
            return Err(CodecError::TrailingBytes {
                type_code: code.as_u16(),
                extra: r.remaining(),
            });
        }
        Ok(message)
    }
}

// ==================== Payload layouts ====================

impl LuaVar {
    fn encoded_len(&self) -> usize {
        str_len(&self.name) + U16 + str_len(&self.value) + U16 + names_len(&self.hierarchy)
    }

    fn write(&self, w: &mut Writer<'_>) -> Result<(), CodecError> {
        w.string(&self.name)?;
        w.lua_type(self.key_type);
        w.string(&self.value)?;
        w.lua_type(self.what);
        w.names(&self.hierarchy)
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            name: r.string()?,
            key_type: r.lua_type()?,
            value: r.string()?,
            what: r.lua_type()?,
            hierarchy: r.names()?,
        })
    }
}

impl StackVar {
    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            var: LuaVar::read(r)?,
            level: r.u16()?,
            index: r.i32()?,
        })
    }
}

impl CallStackFrame {
    fn encoded_len(&self) -> usize {
        str_len(&self.rel_script_path) + U32 * 3 + str_len(&self.function_name) + U16
    }

    fn write(&self, w: &mut Writer<'_>) -> Result<(), CodecError> {
        w.string(&self.rel_script_path)?;
        w.i32(self.current_line);
        w.i32(self.line_defined);
        w.i32(self.last_line_defined);
        w.string(&self.function_name)?;
        w.u16(self.level);
        Ok(())
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            rel_script_path: r.string()?,
            current_line: r.i32()?,
            line_defined: r.i32()?,
            last_line_defined: r.i32()?,
            function_name: r.string()?,
            level: r.u16()?,
        })
    }
}

impl VarLookUp {
    fn encoded_len(&self) -> usize {
        U8 + U8 + U16 + U32 + U8 + names_len(&self.names_and_types)
    }

    fn write(&self, w: &mut Writer<'_>) -> Result<(), CodecError> {
        w.scope(self.scope);
        w.u8(self.context.to_wire());
        w.u16(self.level);
        w.i32(self.index);
        w.bool(self.extra);
        w.names(&self.names_and_types)
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let scope = r.scope()?;
        let context_code = r.u8()?;
        let context = VarContext::from_wire(context_code).ok_or(CodecError::InvalidEnum {
            field: "context",
            value: context_code as i32,
        })?;
        Ok(Self {
            scope,
            context,
            level: r.u16()?,
            index: r.i32()?,
            extra: r.bool()?,
            names_and_types: r.names()?,
        })
    }
}

impl ProfileRecord {
    fn encoded_len(&self) -> usize {
        str_len(&self.function_name) + str_len(&self.rel_script_path) + U32 * 12
    }

    fn write(&self, w: &mut Writer<'_>) -> Result<(), CodecError> {
        w.string(&self.function_name)?;
        w.string(&self.rel_script_path)?;
        w.f32(self.time_total);
        w.f32(self.time_avg);
        w.f32(self.time_shortest);
        w.f32(self.time_longest);
        w.f32(self.time_total_inner);
        w.f32(self.time_avg_inner);
        w.f32(self.time_shortest_inner);
        w.f32(self.time_longest_inner);
        w.u32(self.num_calls);
        w.i32(self.line_defined);
        w.i32(self.last_line_defined);
        w.u32(self.num_funcs_called);
        Ok(())
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            function_name: r.string()?,
            rel_script_path: r.string()?,
            time_total: r.f32()?,
            time_avg: r.f32()?,
            time_shortest: r.f32()?,
            time_longest: r.f32()?,
            time_total_inner: r.f32()?,
            time_avg_inner: r.f32()?,
            time_shortest_inner: r.f32()?,
            time_longest_inner: r.f32()?,
            num_calls: r.u32()?,
            line_defined: r.i32()?,
            last_line_defined: r.i32()?,
            num_funcs_called: r.u32()?,
        })
    }
}

impl ProfileLookup {
    fn encoded_len(&self) -> usize {
        str_len(&self.function_name) + str_len(&self.rel_script_path) + U32
    }
}

impl MemoryTraceRecord {
    fn encoded_len(&self) -> usize {
        U8 + U32 * 4
    }

    fn write(&self, w: &mut Writer<'_>) {
        w.u8(self.kind.to_wire());
        w.u32(self.old_ptr);
        w.u32(self.new_ptr);
        w.i32(self.old_size);
        w.i32(self.new_size);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let kind_code = r.u8()?;
        let kind = MemoryTraceKind::from_wire(kind_code).ok_or(CodecError::InvalidEnum {
            field: "memory trace kind",
            value: kind_code as i32,
        })?;
        Ok(Self {
            kind,
            old_ptr: r.u32()?,
            new_ptr: r.u32()?,
            old_size: r.i32()?,
            new_size: r.i32()?,
        })
    }
}
