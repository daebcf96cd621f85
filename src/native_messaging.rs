use std::io::{ErrorKind, Read, Write};

use anyhow::{bail, Context};
use serde::Serialize;

use crate::{config, protocol::Request};

/// `Ok(None)` on a clean end of stream.
pub fn read_message(stdin: &mut dyn Read) -> anyhow::Result<Option<Request>> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match stdin.read(&mut len_buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("failed reading native message length"),
        }
    }
    if filled == 0 {
        return Ok(None);
    }
    if filled < 4 {
        bail!("incomplete length prefix (expected 4 bytes, got {filled})");
    }

    // 32-bit little-endian length.
    let msg_len = u32::from_le_bytes(len_buf);
    if msg_len > config::native_messaging::MAX_MESSAGE_SIZE_BYTES {
        bail!("message too large: {msg_len} bytes");
    }

    let mut payload = vec![0u8; msg_len as usize];
    stdin
        .read_exact(&mut payload)
        .with_context(|| format!("failed reading native message payload ({msg_len} bytes)"))?;

    let req: Request = serde_json::from_slice(&payload).context("invalid JSON request")?;
    Ok(Some(req))
}

pub fn write_json<T: Serialize + ?Sized>(stdout: &mut dyn Write, v: &T) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec(v).context("failed serializing JSON response")?;
    let len = bytes
        .len()
        .try_into()
        .context("response too large for u32 length")?;
    stdout.write_all(&u32::to_le_bytes(len))?;
    stdout.write_all(&bytes)?;
    stdout.flush().context("failed flushing stdout")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = (payload.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_reads_consecutive_frames_then_eof() {
        let mut bytes = frame(br#"{"id":"1","method":"hello"}"#);
        bytes.extend(frame(br#"{"id":"2","method":"ask","params":{"query":"total"}}"#));
        let mut input = Cursor::new(bytes);

        let first = read_message(&mut input).unwrap().unwrap();
        assert_eq!((first.id.as_str(), first.method.as_str()), ("1", "hello"));
        let second = read_message(&mut input).unwrap().unwrap();
        assert_eq!(second.params["query"], "total");
        assert!(read_message(&mut input).unwrap().is_none());
    }

    #[test]
    fn test_truncated_and_oversized_frames() {
        let mut short = Cursor::new(vec![1u8, 0]);
        assert!(read_message(&mut short).is_err());

        let too_big = (config::native_messaging::MAX_MESSAGE_SIZE_BYTES + 1).to_le_bytes().to_vec();
        let err = read_message(&mut Cursor::new(too_big)).unwrap_err();
        assert!(err.to_string().contains("too large"));

        let mut cut = frame(br#"{"id":"1","method":"hello"}"#);
        cut.truncate(10);
        assert!(read_message(&mut Cursor::new(cut)).is_err());
    }

    #[test]
    fn test_write_json_is_length_prefixed() {
        let mut out = Vec::new();
        write_json(&mut out, &serde_json::json!({ "id": "1", "result": { "ok": true } })).unwrap();
        let len = u32::from_le_bytes([out[0], out[1], out[2], out[3]]) as usize;
        assert_eq!(len, out.len() - 4);
        let v: serde_json::Value = serde_json::from_slice(&out[4..]).unwrap();
        assert_eq!(v["result"]["ok"], true);
    }
}
