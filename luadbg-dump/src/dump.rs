//! Frame-by-frame stream decoding

use std::io::Write;

use futures::StreamExt;
use luadbg_protocol::{ScmpCodec, ScmpFrame};
use luadbg_utils::{LuadbgError, Result};
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::debug;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DumpSummary {
    pub lua_frames: usize,
    pub foreign_frames: usize,
}

/// Print every frame of `reader` to `out`. Stops at the first codec error,
/// which is returned after the frames before it were printed.
pub async fn dump<R, W>(reader: R, codec: ScmpCodec, brief: bool, out: &mut W) -> Result<DumpSummary>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    let mut frames = FramedRead::new(reader, codec);
    let mut summary = DumpSummary::default();
    let mut index = 0usize;

    while let Some(frame) = frames.next().await {
        let frame = frame.map_err(|e| LuadbgError::MalformedFrame(format!("frame {}: {}", index, e)))?;
        match frame {
            ScmpFrame::Lua(message) => {
                summary.lua_frames += 1;
                if brief {
                    writeln!(out, "{:>6}  {:?}", index, message.type_code())?;
                } else {
                    writeln!(out, "{:>6}  {:?}", index, message)?;
                }
            }
            ScmpFrame::Foreign { header, payload } => {
                summary.foreign_frames += 1;
                writeln!(
                    out,
                    "{:>6}  foreign plugin={} type={} bytes={}",
                    index,
                    header.plugin_id,
                    header.type_code,
                    payload.len()
                )?;
            }
        }
        index += 1;
    }

    debug!(?summary, "stream finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use luadbg_protocol::{encode, LuaType, LuaVar, Message};

    fn stream(messages: &[(Message, u16)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (message, plugin) in messages {
            out.extend_from_slice(&encode(message, *plugin).unwrap());
        }
        out
    }

    fn global(name: &str) -> Message {
        Message::GlobalVar(LuaVar {
            name: name.into(),
            key_type: LuaType::String,
            value: "1".into(),
            what: LuaType::Number,
            hierarchy: vec![],
        })
    }

    #[tokio::test]
    async fn test_prints_each_frame() {
        let bytes = stream(&[
            (Message::GlobalVarBegin, 1),
            (global("x"), 1),
            (Message::ProfilerToggle, 5),
            (Message::GlobalVarEnd, 1),
        ]);
        let mut out = Vec::new();
        let summary = dump(bytes.as_slice(), ScmpCodec::new(1), true, &mut out)
            .await
            .unwrap();

        assert_eq!(
            summary,
            DumpSummary {
                lua_frames: 3,
                foreign_frames: 1
            }
        );
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].ends_with("GlobalVar"));
        assert!(lines[2].contains("foreign plugin=5"));
    }

    #[tokio::test]
    async fn test_full_payload_printed() {
        let bytes = stream(&[(global("score"), 1)]);
        let mut out = Vec::new();
        dump(bytes.as_slice(), ScmpCodec::new(1), false, &mut out)
            .await
            .unwrap();
        assert!(String::from_utf8(out).unwrap().contains("score"));
    }

    #[tokio::test]
    async fn test_stops_on_corrupt_frame() {
        let mut bytes = stream(&[(Message::GlobalVarBegin, 1)]);
        // header claiming a 4-byte frame
        bytes.extend_from_slice(&[0, 220, 0, 1, 0, 0, 0, 4]);
        bytes.extend_from_slice(&stream(&[(Message::GlobalVarEnd, 1)]));

        let mut out = Vec::new();
        let err = dump(bytes.as_slice(), ScmpCodec::new(1), true, &mut out)
            .await
            .unwrap_err();
        assert!(matches!(err, LuadbgError::MalformedFrame(_)));
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    }

    #[tokio::test]
    async fn test_truncated_tail_is_an_error() {
        let bytes = stream(&[(global("x"), 1)]);
        let cut = &bytes[..bytes.len() - 2];
        let mut out = Vec::new();
        assert!(dump(cut, ScmpCodec::new(1), true, &mut out).await.is_err());
    }
}
