//! Length-prefixed JSON framing: `[u32 big-endian length][json bytes]`.
//!
//! The envelope is self-describing JSON so receivers can ignore fields and
//! tags they do not know. Frames above [`MAX_FRAME_SIZE`] are a fatal error
//! for the connection that produced them.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::errors::NetError;
use crate::protocol::NetMessage;

/// Hard cap on a single frame (10 MiB).
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Encode an envelope into a single write-ready frame.
pub fn encode_frame(msg: &NetMessage) -> Result<Vec<u8>, NetError> {
    let body = serde_json::to_vec(msg)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(NetError::FrameTooLarge {
            actual: body.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    // One buffer for prefix plus body so a frame is written in one chunk.
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Read one frame and decode the envelope.
pub async fn read_frame<R>(reader: &mut R) -> Result<NetMessage, NetError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_SIZE {
        return Err(NetError::FrameTooLarge {
            actual: len,
            max: MAX_FRAME_SIZE,
        });
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Encode and write one frame.
pub async fn write_frame<W>(writer: &mut W, msg: &NetMessage) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(msg)?;
    writer.write_all(&frame).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MsgType, NodeId, TableId};

    fn state_query() -> NetMessage {
        NetMessage {
            table: TableId::from("t-1"),
            from: NodeId::from("n-1"),
            kind: MsgType::StateQuery,
            epoch: 2,
            lamport: 5,
            seq: 0,
            action: None,
            state: None,
        }
    }

    #[tokio::test]
    async fn write_and_read() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let msg = state_query();
        write_frame(&mut server, &msg).await.unwrap();
        let received = read_frame(&mut client).await.unwrap();
        assert_eq!(received, msg);
    }

    #[tokio::test]
    async fn multiple_frames_in_order() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        for epoch in 0..5 {
            let mut msg = state_query();
            msg.epoch = epoch;
            write_frame(&mut server, &msg).await.unwrap();
        }
        for epoch in 0..5 {
            let received = read_frame(&mut client).await.unwrap();
            assert_eq!(received.epoch, epoch);
        }
    }

    #[tokio::test]
    async fn oversize_prefix_is_rejected_without_allocating() {
        let (mut client, mut server) = tokio::io::duplex(64);
        use tokio::io::AsyncWriteExt;
        // Claim a 2 GiB frame.
        server.write_all(&2_000_000_000u32.to_be_bytes()).await.unwrap();
        let err = read_frame(&mut client).await.unwrap_err();
        assert!(matches!(err, NetError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn truncated_frame_is_an_io_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        use tokio::io::AsyncWriteExt;
        server.write_all(&100u32.to_be_bytes()).await.unwrap();
        server.write_all(b"short").await.unwrap();
        drop(server);
        let err = read_frame(&mut client).await.unwrap_err();
        assert!(matches!(err, NetError::Io(_)));
    }

    #[tokio::test]
    async fn garbage_body_is_a_codec_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        use tokio::io::AsyncWriteExt;
        let body = b"not json";
        server
            .write_all(&(body.len() as u32).to_be_bytes())
            .await
            .unwrap();
        server.write_all(body).await.unwrap();
        let err = read_frame(&mut client).await.unwrap_err();
        assert!(matches!(err, NetError::Codec(_)));
    }

    #[test]
    fn frame_prefix_is_big_endian() {
        let frame = encode_frame(&state_query()).unwrap();
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - 4);
    }
}
