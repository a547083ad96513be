pub mod models;
pub mod packet;

use packet::{Packet, TAG_ACK, TAG_AUDIO, TAG_CONTENT_LIST, TAG_CONTENT_REQUEST, TAG_SETTINGS};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound for any length prefix on the wire. A compressed screen
/// image at full quality stays well below this.
pub const RECV_BUDGET: usize = 3 * 512 * 1024;

#[derive(Error, Debug)]
pub enum DecodeError {
    /// The packet was structurally readable but its content is invalid.
    /// The stream has advanced past the bad packet, so the caller may
    /// keep reading.
    #[error("malformed packet: {0}")]
    Malformed(String),
    /// A length prefix exceeded [`RECV_BUDGET`]. The oversized payload
    /// has been read and discarded; the caller decides whether the
    /// stream is still worth keeping.
    #[error("length prefix {len} exceeds receive budget")]
    Budget { len: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    /// Recoverable errors leave the stream aligned on a packet boundary.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DecodeError::Io(_))
    }
}

/// Read one server-to-client packet: an untagged video frame, an audio
/// packet (`0xFA`), or a windows/displays response (`0xFD`). Any first
/// byte outside the tag set is the high byte of a frame's `u32` length;
/// the framing minimum guarantees the two never collide.
pub async fn read_server_packet<R>(stream: &mut R) -> Result<Packet, DecodeError>
where
    R: AsyncRead + Unpin,
{
    let first = stream.read_u8().await?;
    match first {
        TAG_AUDIO => {
            let info_len = stream.read_u16().await? as usize;
            let audio_len = stream.read_u32().await? as usize;
            let info_buf = read_exact_vec(stream, info_len).await?;
            if audio_len > RECV_BUDGET {
                discard(stream, audio_len).await?;
                return Err(DecodeError::Budget { len: audio_len });
            }
            let samples = read_exact_vec(stream, audio_len).await?;
            let info = serde_json::from_slice(&info_buf)
                .map_err(|e| DecodeError::Malformed(format!("audio info: {e}")))?;
            Ok(Packet::Audio { info, samples })
        }
        TAG_CONTENT_LIST => Ok(Packet::ContentList(read_json_body(stream, "content list").await?)),
        _ => {
            let mut rest = [0u8; 3];
            stream.read_exact(&mut rest).await?;
            let image_len = u32::from_be_bytes([first, rest[0], rest[1], rest[2]]) as usize;
            let status_len = stream.read_u8().await? as usize;
            if image_len > RECV_BUDGET {
                discard(stream, status_len + image_len).await?;
                return Err(DecodeError::Budget { len: image_len });
            }
            let status_buf = read_exact_vec(stream, status_len).await?;
            let image = read_exact_vec(stream, image_len).await?;
            let status = serde_json::from_slice(&status_buf)
                .map_err(|e| DecodeError::Malformed(format!("frame status: {e}")))?;
            Ok(Packet::Frame { status, image })
        }
    }
}

/// Read one client-to-server packet: ack (`0x01`), windows/displays
/// request (`0xFE`) or settings update (`0xFF`). Anything else is
/// malformed; only the offending byte is consumed so the reader can
/// resynchronize. A bare ack is the only untagged-looking byte with
/// meaning in this direction.
pub async fn read_client_packet<R>(stream: &mut R) -> Result<Packet, DecodeError>
where
    R: AsyncRead + Unpin,
{
    let first = stream.read_u8().await?;
    match first {
        TAG_ACK => Ok(Packet::Ack),
        TAG_CONTENT_REQUEST => {
            Ok(Packet::ContentRequest(read_json_body(stream, "content request").await?))
        }
        TAG_SETTINGS => Ok(Packet::Settings(read_json_body(stream, "settings").await?)),
        other => Err(DecodeError::Malformed(format!(
            "unexpected tag byte {other:#04x}"
        ))),
    }
}

/// Encode and write a packet as one contiguous byte sequence.
pub async fn write_packet<W>(stream: &mut W, packet: &Packet) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(&packet.encode()).await
}

async fn read_json_body<R, T>(stream: &mut R, what: &str) -> Result<T, DecodeError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = stream.read_u32().await? as usize;
    if len > RECV_BUDGET {
        discard(stream, len).await?;
        return Err(DecodeError::Budget { len });
    }
    let buf = read_exact_vec(stream, len).await?;
    serde_json::from_slice(&buf).map_err(|e| DecodeError::Malformed(format!("{what}: {e}")))
}

async fn read_exact_vec<R>(stream: &mut R, len: usize) -> Result<Vec<u8>, std::io::Error>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0; len];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Consume and drop `len` payload bytes so the stream stays aligned
/// after an oversized length prefix.
async fn discard<R>(stream: &mut R, len: usize) -> Result<(), std::io::Error>
where
    R: AsyncRead + Unpin,
{
    let mut remaining = len as u64;
    let mut scratch = [0u8; 8192];
    while remaining > 0 {
        let want = remaining.min(scratch.len() as u64) as usize;
        let n = stream.read(&mut scratch[..want]).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        remaining -= n as u64;
    }
    Ok(())
}
