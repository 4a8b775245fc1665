//! Client for the external decryptor wrapper.
//!
//! The wrapper is a separate local process listening on two TCP ports:
//! a query port resolving an adam id to a device-sourced m3u8 URL, and a
//! decrypt port that fetches and decrypts a playlist (or single-file
//! asset) and streams the finished container back. The core never sees
//! raw key material.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Sentinel first line on the decrypt port meaning the wrapper cannot
/// serve the requested asset.
const UNAVAILABLE_REPLY: &[u8] = b"Unavailable\n";

#[derive(Debug, thiserror::Error)]
pub enum WrapperError {
    #[error("I/O error talking to wrapper: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Unavailable")]
    Unavailable,

    #[error("adam id `{id}` does not fit the length-prefixed frame")]
    IdTooLong { id: String },

    #[error("wrapper protocol error: {message}")]
    Protocol { message: String },
}

impl WrapperError {
    pub fn is_connection_refused(&self) -> bool {
        match self {
            Self::Io { source } => source.kind() == std::io::ErrorKind::ConnectionRefused,
            _ => false,
        }
    }

    /// Transient failures retried once after a readiness ping: refused
    /// connections, mid-stream EOF, and the wrapper's fragment-decrypt
    /// EOF report.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io { source } => matches!(
                source.kind(),
                std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::UnexpectedEof
            ),
            Self::Protocol { message } => {
                let lower = message.to_lowercase();
                lower.contains("decryptfragment") && lower.contains("eof")
            }
            _ => false,
        }
    }
}

/// Write the length-prefixed adam id frame shared by both ports.
async fn write_id_frame(stream: &mut TcpStream, adam_id: &str) -> Result<(), WrapperError> {
    let id_bytes = adam_id.as_bytes();
    let Ok(len) = u8::try_from(id_bytes.len()) else {
        return Err(WrapperError::IdTooLong {
            id: adam_id.to_string(),
        });
    };
    stream.write_all(&[len]).await?;
    stream.write_all(id_bytes).await?;
    Ok(())
}

/// Ask the wrapper's query port for a device-sourced m3u8 URL.
///
/// Request: one length byte followed by the ASCII adam id. Response: one
/// newline-terminated line holding the URL, or empty bytes when the
/// device has nothing better to offer.
pub async fn query_device_m3u8(
    addr: &str,
    adam_id: &str,
) -> Result<Option<String>, WrapperError> {
    let mut stream = TcpStream::connect(addr).await?;
    write_id_frame(&mut stream, adam_id).await?;

    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    tokio::io::AsyncBufReadExt::read_until(&mut reader, b'\n', &mut line).await?;
    let url = String::from_utf8_lossy(&line).trim().to_string();
    if url.is_empty() {
        debug!(adam_id, "device m3u8 unavailable");
        Ok(None)
    } else {
        debug!(adam_id, url = %url, "device m3u8 received");
        Ok(Some(url))
    }
}

/// Stream one decrypted asset from the wrapper's decrypt port into
/// `out_path`.
///
/// The frame mirrors the query port (length-prefixed adam id) followed by
/// one newline-terminated request line carrying the media playlist URL or
/// single-file asset URL; the wrapper streams the finished container
/// until EOF. A first line of `Unavailable` maps to
/// [`WrapperError::Unavailable`].
pub async fn decrypt_to_file(
    addr: &str,
    adam_id: &str,
    request_url: &str,
    out_path: &Path,
) -> Result<u64, WrapperError> {
    let mut stream = TcpStream::connect(addr).await?;
    write_id_frame(&mut stream, adam_id).await?;
    stream.write_all(request_url.as_bytes()).await?;
    stream.write_all(b"\n").await?;

    let mut head = vec![0u8; UNAVAILABLE_REPLY.len()];
    let mut filled = 0;
    while filled < head.len() {
        let n = stream.read(&mut head[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    head.truncate(filled);
    if head == UNAVAILABLE_REPLY {
        return Err(WrapperError::Unavailable);
    }
    if filled == 0 {
        return Err(WrapperError::Protocol {
            message: "wrapper closed the stream without data".to_string(),
        });
    }

    if let Some(parent) = out_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(out_path).await?;
    file.write_all(&head).await?;
    let copied = tokio::io::copy(&mut stream, &mut file).await?;
    file.flush().await?;
    let total = copied + head.len() as u64;
    debug!(adam_id, bytes = total, path = %out_path.display(), "decrypted asset written");
    Ok(total)
}

/// Bounded readiness probe: dial the wrapper with a one-second timeout,
/// `attempts` times, sleeping `delay` between failures.
pub async fn wait_ready(addr: &str, attempts: u32, delay: Duration) -> bool {
    for attempt in 0..attempts {
        match tokio::time::timeout(Duration::from_secs(1), TcpStream::connect(addr)).await {
            Ok(Ok(_)) => return true,
            Ok(Err(e)) => {
                debug!(addr, attempt, error = %e, "wrapper not ready");
            }
            Err(_) => {
                debug!(addr, attempt, "wrapper dial timed out");
            }
        }
        tokio::time::sleep(delay).await;
    }
    warn!(addr, attempts, "wrapper never became ready");
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpListener;

    async fn serve_once(
        reply: Vec<u8>,
    ) -> (String, tokio::task::JoinHandle<(u8, String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(stream);
            let mut len = [0u8; 1];
            reader.read_exact(&mut len).await.unwrap();
            let mut id = vec![0u8; len[0] as usize];
            reader.read_exact(&mut id).await.unwrap();
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let mut stream = reader.into_inner();
            stream.write_all(&reply).await.unwrap();
            stream.shutdown().await.unwrap();
            (len[0], String::from_utf8(id).unwrap(), line)
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn decrypt_streams_body_to_file() {
        let body = b"ftypM4A decrypted-bytes-longer-than-the-sentinel".to_vec();
        let (addr, server) = serve_once(body.clone()).await;
        let dir = std::env::temp_dir().join("wrapper-test-ok");
        let out = dir.join("track.m4a");
        let written = decrypt_to_file(&addr, "1234567890", "https://x/media.m3u8", &out)
            .await
            .unwrap();
        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read(&out).unwrap(), body);
        let (len, id, line) = server.await.unwrap();
        assert_eq!(len, 10);
        assert_eq!(id, "1234567890");
        assert_eq!(line.trim(), "https://x/media.m3u8");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn unavailable_reply_maps_to_error() {
        let (addr, _server) = serve_once(b"Unavailable\n".to_vec()).await;
        let out = std::env::temp_dir().join("wrapper-test-unavailable.m4a");
        let err = decrypt_to_file(&addr, "42", "https://x/m.m3u8", &out)
            .await
            .unwrap_err();
        assert!(matches!(err, WrapperError::Unavailable));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn query_maps_empty_line_to_none() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut frame = [0u8; 3];
            stream.read_exact(&mut frame[..1]).await.unwrap();
            let n = frame[0] as usize;
            let mut id = vec![0u8; n];
            stream.read_exact(&mut id).await.unwrap();
            stream.write_all(b"\n").await.unwrap();
        });
        let got = query_device_m3u8(&addr, "77").await.unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn transient_classification_matches_policy() {
        let refused = WrapperError::Io {
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        assert!(refused.is_transient());
        assert!(refused.is_connection_refused());

        let eof = WrapperError::Io {
            source: std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
        };
        assert!(eof.is_transient());
        assert!(!eof.is_connection_refused());

        let fragment = WrapperError::Protocol {
            message: "DecryptFragment: unexpected EOF mid segment".to_string(),
        };
        assert!(fragment.is_transient());

        assert!(!WrapperError::Unavailable.is_transient());
    }
}
