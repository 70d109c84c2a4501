//! SCMP type codes
//!
//! Codes are grouped into contiguous ranges per feature. New features claim
//! a fresh range instead of reusing codes:
//!
//! | range   | feature                              |
//! |---------|--------------------------------------|
//! | 200-213 | memory trace and profiling           |
//! | 214-219 | variable filter state                |
//! | 220-266 | variable scopes and call stack       |
//! | 270-283 | watch lookups                        |
//! | 290-301 | runtime state and toggles            |
//! | 310     | limits                               |

/// Which side of the connection originates a message type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent by the IDE, consumed by the runtime
    ToRuntime,
    /// Sent by the runtime, consumed by the IDE
    FromRuntime,
    /// Control messages either side may send
    Both,
}

macro_rules! type_codes {
    ($($name:ident = $code:literal => $dir:ident,)*) => {
        /// Message type code (first field of every frame header)
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum TypeCode {
            $($name = $code,)*
        }

        impl TypeCode {
            /// Every known type code in ascending order
            pub const ALL: &'static [TypeCode] = &[$(TypeCode::$name,)*];

            pub fn direction(self) -> Direction {
                match self {
                    $(TypeCode::$name => Direction::$dir,)*
                }
            }
        }

        impl TryFrom<u16> for TypeCode {
            type Error = u16;

            fn try_from(code: u16) -> Result<Self, Self::Error> {
                match code {
                    $($code => Ok(TypeCode::$name),)*
                    other => Err(other),
                }
            }
        }
    };
}

type_codes! {
    MemoryTraceBegin = 200 => FromRuntime,
    MemoryTrace = 201 => FromRuntime,
    MemoryTraceEnd = 202 => FromRuntime,
    MemoryTraceStreamBegin = 203 => FromRuntime,
    MemoryTraceStream = 204 => FromRuntime,
    MemoryTraceStreamEnd = 205 => FromRuntime,
    ProfileInfoBegin = 206 => FromRuntime,
    ProfileInfo = 207 => FromRuntime,
    ProfileInfoEnd = 208 => FromRuntime,
    ProfileInfoLookupPerform = 209 => ToRuntime,
    ProfileInfoLookupBegin = 210 => FromRuntime,
    ProfileInfoLookup = 211 => FromRuntime,
    ProfileInfoLookupEnd = 212 => FromRuntime,

    VarFilterStateTypeBegin = 214 => ToRuntime,
    VarFilterStateType = 215 => ToRuntime,
    VarFilterStateTypeEnd = 216 => ToRuntime,
    VarFilterStateNameBegin = 217 => ToRuntime,
    VarFilterStateName = 218 => ToRuntime,
    VarFilterStateNameEnd = 219 => ToRuntime,

    GlobalVarBegin = 220 => FromRuntime,
    GlobalVar = 221 => FromRuntime,
    GlobalVarEnd = 222 => FromRuntime,
    GlobalVarLookupBegin = 223 => FromRuntime,
    GlobalVarLookupEnd = 224 => FromRuntime,
    LocalVarBegin = 225 => FromRuntime,
    LocalVar = 226 => FromRuntime,
    LocalVarEnd = 227 => FromRuntime,
    LocalVarLookupBegin = 228 => FromRuntime,
    LocalVarLookupEnd = 229 => FromRuntime,
    UpvalueVarBegin = 230 => FromRuntime,
    UpvalueVar = 231 => FromRuntime,
    UpvalueVarEnd = 232 => FromRuntime,
    UpvalueVarLookupBegin = 233 => FromRuntime,
    UpvalueVarLookupEnd = 234 => FromRuntime,
    EnvVarBegin = 235 => FromRuntime,
    EnvVar = 236 => FromRuntime,
    EnvVarEnd = 237 => FromRuntime,
    EnvVarLookupBegin = 238 => FromRuntime,
    EnvVarLookupEnd = 239 => FromRuntime,
    CallStackBegin = 240 => FromRuntime,
    CallStack = 241 => FromRuntime,
    CallStackEnd = 242 => FromRuntime,
    CallStackLookupPerform = 243 => ToRuntime,
    CallStackLookupBegin = 244 => FromRuntime,
    CallStackLookup = 245 => FromRuntime,
    CallStackLookupEnd = 246 => FromRuntime,
    VarLookUp = 247 => ToRuntime,
    VarUpdate = 248 => ToRuntime,

    WatchLookupBegin = 270 => ToRuntime,
    WatchLookupEnd = 271 => ToRuntime,
    WatchLookupGlobalBegin = 272 => ToRuntime,
    WatchLookupGlobalEnd = 273 => ToRuntime,
    WatchLookupLocalBegin = 274 => ToRuntime,
    WatchLookupLocalEnd = 275 => ToRuntime,
    WatchLookupUpvalueBegin = 276 => ToRuntime,
    WatchLookupUpvalueEnd = 277 => ToRuntime,
    WatchLookupEnvVarBegin = 278 => ToRuntime,
    WatchLookupEnvVarEnd = 279 => ToRuntime,

    LuaStateBegin = 290 => FromRuntime,
    LuaStateAdd = 291 => FromRuntime,
    LuaStateRemove = 292 => FromRuntime,
    LuaStateEnd = 293 => FromRuntime,
    LuaStateToggle = 294 => Both,
    MemoryTraceToggle = 295 => ToRuntime,
    ProfilerToggle = 296 => ToRuntime,

    Limits = 310 => FromRuntime,
}

impl TypeCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_roundtrip_through_u16() {
        for &code in TypeCode::ALL {
            assert_eq!(TypeCode::try_from(code.as_u16()), Ok(code));
        }
    }

    #[test]
    fn test_unknown_code_rejected() {
        assert_eq!(TypeCode::try_from(213), Err(213));
        assert_eq!(TypeCode::try_from(0), Err(0));
        assert_eq!(TypeCode::try_from(999), Err(999));
    }

    #[test]
    fn test_codes_ascending_and_in_ranges() {
        let codes: Vec<u16> = TypeCode::ALL.iter().map(|c| c.as_u16()).collect();
        assert!(codes.windows(2).all(|w| w[0] < w[1]));
        for code in codes {
            assert!(
                matches!(code, 200..=213 | 214..=219 | 220..=266 | 270..=283 | 290..=301 | 310),
                "code {} outside assigned ranges",
                code
            );
        }
    }

    #[test]
    fn test_directions() {
        assert_eq!(TypeCode::VarLookUp.direction(), Direction::ToRuntime);
        assert_eq!(TypeCode::GlobalVar.direction(), Direction::FromRuntime);
        assert_eq!(TypeCode::LuaStateToggle.direction(), Direction::Both);
    }
}
