//! Value edits
//!
//! The runtime only accepts new values for booleans and numbers. Input is
//! validated and normalized here before anything is sent.

use luadbg_protocol::LuaType;
use luadbg_utils::LuadbgError;

#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("not connected to a debug target")]
    NotConnected,

    #[error("the target is running; values can only be edited while stopped")]
    NotStopped,

    #[error("variable values cannot be edited while the target is refreshing")]
    UpdateInProgress,

    #[error("watch has no live value")]
    Placeholder,

    #[error("values of type {0} cannot be edited")]
    UnsupportedType(LuaType),

    #[error("'{0}' is not a boolean (expected true, false, 1 or 0)")]
    InvalidBoolean(String),

    #[error("'{0}' is not a number")]
    InvalidNumber(String),

    #[error("variable no longer exists")]
    UnknownVariable,

    #[error("failed to send edit: {0}")]
    Send(#[from] LuadbgError),
}

/// Validate `input` for a variable of type `what` and return the value to
/// send
pub fn coerce_value(what: LuaType, input: &str) -> Result<String, EditError> {
    let trimmed = input.trim();
    match what {
        LuaType::Boolean => {
            if trimmed.eq_ignore_ascii_case("true") || trimmed == "1" {
                Ok("true".into())
            } else if trimmed.eq_ignore_ascii_case("false") || trimmed == "0" {
                Ok("false".into())
            } else {
                Err(EditError::InvalidBoolean(input.to_string()))
            }
        }
        LuaType::Number => match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(trimmed.to_string()),
            _ => Err(EditError::InvalidNumber(input.to_string())),
        },
        LuaType::Invalid => Err(EditError::Placeholder),
        other => Err(EditError::UnsupportedType(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booleans() {
        assert_eq!(coerce_value(LuaType::Boolean, "TRUE").unwrap(), "true");
        assert_eq!(coerce_value(LuaType::Boolean, "1").unwrap(), "true");
        assert_eq!(coerce_value(LuaType::Boolean, " False ").unwrap(), "false");
        assert_eq!(coerce_value(LuaType::Boolean, "0").unwrap(), "false");
        assert!(matches!(
            coerce_value(LuaType::Boolean, "yes"),
            Err(EditError::InvalidBoolean(_))
        ));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(coerce_value(LuaType::Number, "3.5").unwrap(), "3.5");
        assert_eq!(coerce_value(LuaType::Number, "-1e3").unwrap(), "-1e3");
        assert!(matches!(
            coerce_value(LuaType::Number, "abc"),
            Err(EditError::InvalidNumber(_))
        ));
        assert!(matches!(
            coerce_value(LuaType::Number, "inf"),
            Err(EditError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_other_types_rejected() {
        for ty in [LuaType::String, LuaType::Table, LuaType::Nil, LuaType::Function] {
            assert!(matches!(
                coerce_value(ty, "x"),
                Err(EditError::UnsupportedType(_))
            ));
        }
        assert!(matches!(
            coerce_value(LuaType::Invalid, "1"),
            Err(EditError::Placeholder)
        ));
    }
}
