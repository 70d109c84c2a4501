//! Frame codec for SCMP
//!
//! Frames are `[type_code:u16][plugin_id:u16][length:u32][payload]`, where
//! `length` counts the header too. The peer is trusted: there is no checksum
//! and no resync, so every error here is fatal to the connection.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codes::TypeCode;
use crate::messages::Message;
use crate::{DEFAULT_LUA_PLUGIN_ID, HEADER_SIZE};

/// Maximum frame size (16 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Declared frame length {length} is shorter than the 8-byte header")]
    LengthTooShort { length: usize },

    #[error("Unknown type code {0}")]
    UnknownTypeCode(u16),

    #[error("Invalid Lua type tag {0}")]
    InvalidLuaType(i16),

    #[error("Invalid {field} value {value}")]
    InvalidEnum { field: &'static str, value: i32 },

    #[error("Payload truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("Type {type_code} payload has {extra} trailing bytes")]
    TrailingBytes { type_code: u16, extra: usize },

    #[error("String of {len} bytes exceeds the 16-bit length prefix")]
    StringTooLong { len: usize },

    #[error("List of {count} entries exceeds the 16-bit count prefix")]
    TooManyEntries { count: usize },

    #[error("String field is not valid UTF-8")]
    InvalidUtf8,
}

/// Fixed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub type_code: u16,
    pub plugin_id: u16,
    /// Total frame length including the header
    pub length: u32,
}

impl Header {
    fn parse(src: &[u8]) -> Self {
        Self {
            type_code: u16::from_be_bytes([src[0], src[1]]),
            plugin_id: u16::from_be_bytes([src[2], src[3]]),
            length: u32::from_be_bytes([src[4], src[5], src[6], src[7]]),
        }
    }
}

/// One decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum ScmpFrame {
    /// A message addressed to the Lua plugin
    Lua(Message),
    /// A frame for another plugin sharing the transport, passed through opaque
    Foreign { header: Header, payload: Bytes },
}

/// Codec for SCMP frames addressed to one plugin id
#[derive(Debug, Clone)]
pub struct ScmpCodec {
    plugin_id: u16,
    max_frame_size: usize,
}

impl ScmpCodec {
    pub fn new(plugin_id: u16) -> Self {
        Self {
            plugin_id,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn plugin_id(&self) -> u16 {
        self.plugin_id
    }
}

impl Default for ScmpCodec {
    fn default() -> Self {
        Self::new(DEFAULT_LUA_PLUGIN_ID)
    }
}

impl Decoder for ScmpCodec {
    type Item = ScmpFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        // Peek at the header without consuming
        let header = Header::parse(&src[..HEADER_SIZE]);
        let len = header.length as usize;

        if len < HEADER_SIZE {
            return Err(CodecError::LengthTooShort { length: len });
        }
        if len > self.max_frame_size {
            return Err(CodecError::MessageTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }

        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(len);
        frame.advance(HEADER_SIZE);

        if header.plugin_id != self.plugin_id {
            return Ok(Some(ScmpFrame::Foreign {
                header,
                payload: frame.freeze(),
            }));
        }

        let code = TypeCode::try_from(header.type_code).map_err(CodecError::UnknownTypeCode)?;
        Message::read_payload(code, &frame).map(|m| Some(ScmpFrame::Lua(m)))
    }
}

impl Encoder<Message> for ScmpCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_into(&item, self.plugin_id, self.max_frame_size, dst)
    }
}

/// Encode one message into a buffer sized exactly to the frame
pub fn encode(message: &Message, plugin_id: u16) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + message.payload_len());
    encode_into(message, plugin_id, DEFAULT_MAX_FRAME_SIZE, &mut buf)?;
    Ok(buf.freeze())
}

/// Decode exactly one complete frame
pub fn decode(frame: &[u8]) -> Result<(Header, Message), CodecError> {
    if frame.len() < HEADER_SIZE {
        return Err(CodecError::Truncated {
            needed: HEADER_SIZE,
            available: frame.len(),
        });
    }
    let header = Header::parse(&frame[..HEADER_SIZE]);
    let len = header.length as usize;
    if len < HEADER_SIZE {
        return Err(CodecError::LengthTooShort { length: len });
    }
    if len > frame.len() {
        return Err(CodecError::Truncated {
            needed: len,
            available: frame.len(),
        });
    }
    if len < frame.len() {
        return Err(CodecError::TrailingBytes {
            type_code: header.type_code,
            extra: frame.len() - len,
        });
    }
    let code = TypeCode::try_from(header.type_code).map_err(CodecError::UnknownTypeCode)?;
    let message = Message::read_payload(code, &frame[HEADER_SIZE..])?;
    Ok((header, message))
}

fn encode_into(
    message: &Message,
    plugin_id: u16,
    max_frame_size: usize,
    dst: &mut BytesMut,
) -> Result<(), CodecError> {
    let len = HEADER_SIZE + message.payload_len();
    if len > max_frame_size {
        return Err(CodecError::MessageTooLarge {
            size: len,
            max: max_frame_size,
        });
    }

    let start = dst.len();
    dst.reserve(len);
    dst.put_u16(message.type_code().as_u16());
    dst.put_u16(plugin_id);
    dst.put_u32(len as u32);

    if let Err(e) = message.write_payload(dst) {
        dst.truncate(start);
        return Err(e);
    }

    debug_assert_eq!(dst.len() - start, len, "payload_len disagrees with encoding");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;

    fn lua_var(name: &str, hierarchy: Vec<NameAndType>) -> LuaVar {
        LuaVar {
            name: name.to_string(),
            key_type: LuaType::String,
            value: "42".to_string(),
            what: LuaType::Number,
            hierarchy,
        }
    }

    fn lookup(names: Vec<NameAndType>) -> VarLookUp {
        VarLookUp {
            scope: Scope::Local,
            context: VarContext::WatchCustom,
            level: 3,
            index: 7,
            extra: true,
            names_and_types: names,
        }
    }

    fn profile_record() -> ProfileRecord {
        ProfileRecord {
            function_name: "update".into(),
            rel_script_path: "scripts/game.lua".into(),
            time_total: 12.5,
            time_avg: 0.25,
            time_shortest: 0.125,
            time_longest: 1.5,
            time_total_inner: 3.0,
            time_avg_inner: 0.0625,
            time_shortest_inner: 0.0,
            time_longest_inner: 0.5,
            num_calls: 50,
            line_defined: 10,
            last_line_defined: 42,
            num_funcs_called: 3,
        }
    }

    /// One sample of every message type
    fn all_messages() -> Vec<Message> {
        let trace = MemoryTraceRecord {
            kind: MemoryTraceKind::Reallocation,
            old_ptr: 0xdead_beef,
            new_ptr: 0x1000,
            old_size: 16,
            new_size: 32,
        };
        let frame = CallStackFrame {
            rel_script_path: "main.lua".into(),
            current_line: 12,
            line_defined: 3,
            last_line_defined: 20,
            function_name: "tick".into(),
            level: 1,
        };
        let nested = vec![
            NameAndType::new("t", LuaType::String),
            NameAndType::new("5", LuaType::Number),
        ];

        vec![
            Message::MemoryTraceBegin,
            Message::MemoryTrace(trace.clone()),
            Message::MemoryTraceEnd,
            Message::MemoryTraceStreamBegin,
            Message::MemoryTraceStream(trace),
            Message::MemoryTraceStreamEnd,
            Message::ProfileInfoBegin,
            Message::ProfileInfo(profile_record()),
            Message::ProfileInfoEnd,
            Message::ProfileInfoLookupPerform(ProfileLookup {
                function_name: "update".into(),
                rel_script_path: "".into(),
                line_defined: -1,
            }),
            Message::ProfileInfoLookupBegin,
            Message::ProfileInfoLookup(profile_record()),
            Message::ProfileInfoLookupEnd,
            Message::VarFilterStateTypeBegin,
            Message::VarFilterStateType(VarFilterType {
                scope: Scope::Upvalue,
                filter: [true, false, true, false, false, true, false, false, true],
            }),
            Message::VarFilterStateTypeEnd,
            Message::VarFilterStateNameBegin,
            Message::VarFilterStateName(VarFilterName {
                scope: Scope::Global,
                pattern: "_G*".into(),
            }),
            Message::VarFilterStateNameEnd,
            Message::GlobalVarBegin,
            Message::GlobalVar(lua_var("x", vec![])),
            Message::GlobalVarEnd,
            Message::GlobalVarLookupBegin,
            Message::GlobalVarLookupEnd,
            Message::LocalVarBegin,
            Message::LocalVar(StackVar {
                var: lua_var("k", nested.clone()),
                level: 2,
                index: 4,
            }),
            Message::LocalVarEnd,
            Message::LocalVarLookupBegin,
            Message::LocalVarLookupEnd,
            Message::UpvalueVarBegin,
            Message::UpvalueVar(StackVar {
                var: lua_var("", vec![]),
                level: 0,
                index: -1,
            }),
            Message::UpvalueVarEnd,
            Message::UpvalueVarLookupBegin,
            Message::UpvalueVarLookupEnd,
            Message::EnvVarBegin,
            Message::EnvVar(EnvVar {
                var: lua_var("print", vec![]),
                level: 5,
            }),
            Message::EnvVarEnd,
            Message::EnvVarLookupBegin,
            Message::EnvVarLookupEnd,
            Message::CallStackBegin,
            Message::CallStack(frame.clone()),
            Message::CallStackEnd,
            Message::CallStackLookupPerform { level: 2 },
            Message::CallStackLookupBegin,
            Message::CallStackLookup(frame),
            Message::CallStackLookupEnd,
            Message::VarLookUp(lookup(nested.clone())),
            Message::VarUpdate(VarUpdate {
                lookup: lookup(nested),
                value: "true".into(),
                value_type: LuaType::Boolean,
            }),
            Message::WatchLookupBegin,
            Message::WatchLookupEnd,
            Message::WatchLookupGlobalBegin,
            Message::WatchLookupGlobalEnd,
            Message::WatchLookupLocalBegin,
            Message::WatchLookupLocalEnd,
            Message::WatchLookupUpvalueBegin,
            Message::WatchLookupUpvalueEnd,
            Message::WatchLookupEnvVarBegin,
            Message::WatchLookupEnvVarEnd,
            Message::LuaStateBegin,
            Message::LuaStateAdd(LuaStateInfo {
                address: "0x7f001234".into(),
                name: "main".into(),
                debugging: true,
            }),
            Message::LuaStateRemove {
                address: "0x7f001234".into(),
            },
            Message::LuaStateEnd,
            Message::LuaStateToggle {
                address: "0x7f001234".into(),
            },
            Message::MemoryTraceToggle,
            Message::ProfilerToggle,
            Message::Limits(Limits {
                max_breakpoints: 64,
                max_var_filters: 16,
                profiler_enabled: false,
                memory_tracer_enabled: true,
            }),
        ]
    }

    #[test]
    fn test_every_type_code_has_a_sample() {
        let mut codes: Vec<TypeCode> = all_messages().iter().map(|m| m.type_code()).collect();
        codes.dedup();
        assert_eq!(codes, TypeCode::ALL.to_vec());
    }

    #[test]
    fn test_roundtrip_all_messages() {
        let mut codec = ScmpCodec::new(9);
        for msg in all_messages() {
            let mut buf = BytesMut::new();
            codec.encode(msg.clone(), &mut buf).unwrap();
            let decoded = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(decoded, ScmpFrame::Lua(msg));
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_encode_allocates_exact_size() {
        for msg in all_messages() {
            let bytes = encode(&msg, 1).unwrap();
            assert_eq!(bytes.len(), HEADER_SIZE + msg.payload_len());
            let header = Header::parse(&bytes);
            assert_eq!(header.length as usize, bytes.len());
            assert_eq!(header.type_code, msg.type_code().as_u16());
        }
    }

    #[test]
    fn test_free_decode_roundtrip() {
        let msg = Message::GlobalVar(lua_var("x", vec![]));
        let bytes = encode(&msg, 1).unwrap();
        let (header, decoded) = decode(&bytes).unwrap();
        assert_eq!(header.plugin_id, 1);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode(&Message::CallStackLookupPerform { level: 0x0102 }, 0x0304).unwrap();
        assert_eq!(&bytes[..], &[0, 243, 0x03, 0x04, 0, 0, 0, 10, 0x01, 0x02]);
    }

    #[test]
    fn test_partial_message() {
        let mut codec = ScmpCodec::default();
        let mut buf = BytesMut::new();
        codec
            .encode(Message::GlobalVar(lua_var("x", vec![])), &mut buf)
            .unwrap();

        let mut partial = buf.split_to(HEADER_SIZE + 2);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.unsplit(buf);
        assert!(codec.decode(&mut partial).unwrap().is_some());
    }

    #[test]
    fn test_multiple_messages_in_buffer() {
        let mut codec = ScmpCodec::default();
        let messages = vec![
            Message::GlobalVarLookupBegin,
            Message::GlobalVar(lua_var("k", vec![NameAndType::new("t", LuaType::String)])),
            Message::GlobalVarLookupEnd,
        ];

        let mut buf = BytesMut::new();
        for msg in &messages {
            codec.encode(msg.clone(), &mut buf).unwrap();
        }
        for msg in messages {
            assert_eq!(codec.decode(&mut buf).unwrap(), Some(ScmpFrame::Lua(msg)));
        }
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_foreign_plugin_passthrough() {
        let mut lua = ScmpCodec::new(1);
        let mut buf = BytesMut::new();
        buf.put_u16(5000);
        buf.put_u16(2);
        buf.put_u32(HEADER_SIZE as u32 + 3);
        buf.put_slice(&[1, 2, 3]);

        match lua.decode(&mut buf).unwrap() {
            Some(ScmpFrame::Foreign { header, payload }) => {
                assert_eq!(header.type_code, 5000);
                assert_eq!(header.plugin_id, 2);
                assert_eq!(&payload[..], &[1, 2, 3]);
            }
            other => panic!("expected foreign frame, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_code_is_fatal() {
        let mut codec = ScmpCodec::new(1);
        let mut buf = BytesMut::new();
        buf.put_u16(213);
        buf.put_u16(1);
        buf.put_u32(HEADER_SIZE as u32);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::UnknownTypeCode(213))
        ));
    }

    #[test]
    fn test_length_shorter_than_header() {
        let mut codec = ScmpCodec::new(1);
        let mut buf = BytesMut::new();
        buf.put_u16(220);
        buf.put_u16(1);
        buf.put_u32(4);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::LengthTooShort { length: 4 })
        ));
    }

    #[test]
    fn test_message_too_large_on_decode() {
        let mut codec = ScmpCodec::new(1).with_max_frame_size(64);
        let mut buf = BytesMut::new();
        buf.put_u16(221);
        buf.put_u16(1);
        buf.put_u32(65);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::MessageTooLarge { size: 65, max: 64 })
        ));
    }

    #[test]
    fn test_payload_layout_mismatch_is_fatal() {
        // A header-only type with a payload byte attached
        let mut codec = ScmpCodec::new(1);
        let mut buf = BytesMut::new();
        buf.put_u16(TypeCode::GlobalVarBegin.as_u16());
        buf.put_u16(1);
        buf.put_u32(HEADER_SIZE as u32 + 1);
        buf.put_u8(0);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::TrailingBytes { extra: 1, .. })
        ));

        // A variable whose declared length cuts the value string short
        let bytes = encode(&Message::GlobalVar(lua_var("x", vec![])), 1).unwrap();
        let mut short = BytesMut::from(&bytes[..bytes.len() - 3]);
        let new_len = short.len() as u32;
        short[4..8].copy_from_slice(&new_len.to_be_bytes());
        assert!(matches!(
            codec.decode(&mut short),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_invalid_lua_type_rejected() {
        let mut bytes = BytesMut::from(&encode(&Message::GlobalVar(lua_var("x", vec![])), 1).unwrap()[..]);
        // key_type directly follows the 1-byte name: header(8) + len(2) + "x"(1)
        bytes[11..13].copy_from_slice(&42i16.to_be_bytes());
        assert!(matches!(
            decode(&bytes),
            Err(CodecError::InvalidLuaType(42))
        ));
    }

    #[test]
    fn test_encode_failure_leaves_buffer_untouched() {
        let mut codec = ScmpCodec::new(1);
        let mut buf = BytesMut::new();
        codec.encode(Message::GlobalVarBegin, &mut buf).unwrap();
        let before = buf.len();

        let msg = Message::GlobalVar(LuaVar {
            value: "v".repeat(70_000),
            ..lua_var("x", vec![])
        });
        assert!(matches!(
            codec.encode(msg, &mut buf),
            Err(CodecError::StringTooLong { len: 70_000 })
        ));
        assert_eq!(buf.len(), before);
    }
}
