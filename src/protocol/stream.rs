//! Reading and writing messages on a byte stream.
//!
//! Every read is a "read exactly N bytes": `read_exact` keeps retrying
//! partial deliveries until N bytes arrived or the stream failed.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::message::Message;
use super::wire_format::{Header, HEADER_SIZE};
use crate::error::{EtherError, Result};

/// Read one header.
///
/// Returns `Ok(None)` if the stream ended before a full header arrived.
pub async fn read_header<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Header>> {
    let mut buf = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut buf).await {
        Ok(_) => Ok(Some(Header::from_bytes(&buf))),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(EtherError::Network(e)),
    }
}

/// Read exactly `len` payload bytes.
pub async fn read_payload<R: AsyncRead + Unpin>(reader: &mut R, len: usize) -> Result<Bytes> {
    if len == 0 {
        return Ok(Bytes::new());
    }

    let mut buf = BytesMut::zeroed(len);
    match reader.read_exact(&mut buf).await {
        Ok(_) => Ok(buf.freeze()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(EtherError::ConnectionClosed)
        }
        Err(e) => Err(EtherError::Network(e)),
    }
}

/// Read and validate one complete message.
///
/// Used where a bad header cannot be skipped, i.e. when waiting for a
/// response.
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_payload_size: u32,
) -> Result<Message> {
    let header = read_header(reader)
        .await?
        .ok_or(EtherError::ConnectionClosed)?;
    header.validate(max_payload_size)?;
    let payload = read_payload(reader, header.payload_len()).await?;
    Ok(Message::new(header, payload))
}

/// Write a message in full: header first, then payload.
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, message: &Message) -> Result<()> {
    writer.write_all(&message.header.encode()).await?;
    if !message.payload.is_empty() {
        writer.write_all(&message.payload).await?;
    }
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_frame, Command, MAX_PAYLOAD_SIZE};
    use std::io::Cursor;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_write_then_read_message() {
        let msg = Message::with_payload(Command::Write, 4, Bytes::from_static(b"payload")).unwrap();
        let mut buf = Cursor::new(Vec::new());
        write_message(&mut buf, &msg).await.unwrap();

        let bytes = buf.into_inner();
        assert_eq!(bytes, build_frame(&msg));

        let mut reader = Cursor::new(bytes);
        let decoded = read_message(&mut reader, MAX_PAYLOAD_SIZE).await.unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn test_read_header_eof() {
        let mut reader = Cursor::new(vec![0u8; HEADER_SIZE - 3]);
        assert!(read_header(&mut reader).await.unwrap().is_none());

        let mut empty = Cursor::new(Vec::new());
        assert!(read_header(&mut empty).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_payload_short() {
        let mut reader = Cursor::new(vec![1u8, 2, 3]);
        let result = read_payload(&mut reader, 5).await;
        assert!(matches!(result, Err(EtherError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_read_message_rejects_bad_header() {
        let mut msg = Message::request(Command::Ping, 0, 0);
        msg.header.magic = 0;
        let mut reader = Cursor::new(build_frame(&msg));
        let result = read_message(&mut reader, MAX_PAYLOAD_SIZE).await;
        assert!(matches!(result, Err(EtherError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_read_message_alloc_has_no_payload() {
        let alloc = Message::request(Command::Alloc, 0, 100);
        let ping = Message::request(Command::Ping, 0, 0);
        let mut bytes = build_frame(&alloc);
        bytes.extend(build_frame(&ping));

        let mut reader = Cursor::new(bytes);
        assert_eq!(read_message(&mut reader, MAX_PAYLOAD_SIZE).await.unwrap(), alloc);
        assert_eq!(read_message(&mut reader, MAX_PAYLOAD_SIZE).await.unwrap(), ping);
    }

    #[tokio::test]
    async fn test_read_exact_across_fragments() {
        let msg = Message::with_payload(Command::Ok, 9, Bytes::from(vec![0xAB; 300])).unwrap();
        let frame = build_frame(&msg);
        let (mut tx, mut rx) = duplex(16);

        let writer = tokio::spawn(async move {
            for chunk in frame.chunks(7) {
                tokio::io::AsyncWriteExt::write_all(&mut tx, chunk).await.unwrap();
            }
        });

        let decoded = read_message(&mut rx, MAX_PAYLOAD_SIZE).await.unwrap();
        writer.await.unwrap();
        assert_eq!(decoded, msg);
    }
}
