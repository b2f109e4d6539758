use std::io::Cursor;

use anyhow::{bail, Result};
use byteorder::{BigEndian, ReadBytesExt};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

pub const FRAME_MAGIC: u16 = 0x4567;
/// Upper bound on a single frame body; anything larger is a corrupt stream.
pub const MAX_BODY_LEN: usize = 256 * 1024;

const HEADER_LEN: usize = 9;

/// One named packet: opaque head and body, identified by its mapped name.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub name: String,
    pub head: Bytes,
    pub body: Bytes,
}

impl Packet {
    pub fn new(name: impl Into<String>, head: Bytes, body: Bytes) -> Self {
        Self {
            name: name.into(),
            head,
            body,
        }
    }

    /// Frame layout:
    ///   [Magic u16]
    ///   [Name length u8]
    ///   [Head length u16]
    ///   [Body length u32]
    ///   [Name bytes][Head bytes][Body bytes]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(
            HEADER_LEN + self.name.len() + self.head.len() + self.body.len(),
        );
        buf.put_u16(FRAME_MAGIC);
        buf.put_u8(self.name.len() as u8);
        buf.put_u16(self.head.len() as u16);
        buf.put_u32(self.body.len() as u32);
        buf.put_slice(self.name.as_bytes());
        buf.extend_from_slice(&self.head);
        buf.extend_from_slice(&self.body);
        buf.freeze()
    }
}

/// Reads one frame from the stream. Returns `Ok(None)` on a clean EOF at a
/// frame boundary; a mid-frame EOF or a bad magic is an error.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Packet>> {
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let mut cursor = Cursor::new(&header[..]);
    let magic = ReadBytesExt::read_u16::<BigEndian>(&mut cursor)?;
    if magic != FRAME_MAGIC {
        bail!("bad frame magic 0x{:04X}", magic);
    }
    let name_len = ReadBytesExt::read_u8(&mut cursor)? as usize;
    let head_len = ReadBytesExt::read_u16::<BigEndian>(&mut cursor)? as usize;
    let body_len = ReadBytesExt::read_u32::<BigEndian>(&mut cursor)? as usize;
    if body_len > MAX_BODY_LEN {
        bail!("frame body of {} bytes exceeds limit", body_len);
    }

    let mut rest = vec![0u8; name_len + head_len + body_len];
    reader.read_exact(&mut rest).await?;
    let name = String::from_utf8(rest[..name_len].to_vec())
        .map_err(|e| anyhow::anyhow!("non-utf8 packet name: {}", e))?;
    let head = Bytes::copy_from_slice(&rest[name_len..name_len + head_len]);
    let body = Bytes::copy_from_slice(&rest[name_len + head_len..]);
    Ok(Some(Packet { name, head, body }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_round_trip() {
        let packet = Packet::new(
            "PrivateChatReq",
            Bytes::from_static(b"\x01\x02"),
            Bytes::from_static(br#"{"targetUid":1,"text":"hi"}"#),
        );
        let frame = packet.encode();
        let mut reader = &frame[..];
        let decoded = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(decoded, packet);
        // Stream is exhausted; the next read is a clean EOF.
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bad_magic_is_an_error() {
        let mut frame = Packet::new("MarkMapReq", Bytes::new(), Bytes::new())
            .encode()
            .to_vec();
        frame[0] = 0xFF;
        let mut reader = &frame[..];
        assert!(read_frame(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn truncated_frame_is_an_error() {
        let frame = Packet::new(
            "PullRecentChatReq",
            Bytes::new(),
            Bytes::from_static(b"{}"),
        )
        .encode();
        let mut reader = &frame[..frame.len() - 1];
        assert!(read_frame(&mut reader).await.is_err());
    }
}
