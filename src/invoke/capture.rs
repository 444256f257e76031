//! Bounded capture of subprocess output streams.

use tokio::io::{AsyncRead, AsyncReadExt};

const CHUNK: usize = 16 * 1024;

/// Bytes read from one stream.
#[derive(Debug, Default)]
pub struct Captured {
    pub bytes: Vec<u8>,
    /// More than the cap was produced; the excess was discarded.
    pub truncated: bool,
    /// Read error that ended capture early, if any.
    pub error: Option<String>,
}

/// Read `reader` to EOF, keeping at most `cap` bytes.
///
/// The stream keeps being drained past the cap so the child never blocks on
/// a full pipe.
pub async fn read_bounded<R>(reader: Option<R>, cap: usize) -> Captured
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let Some(mut reader) = reader else {
        return captured;
    };

    let mut buf = vec![0u8; CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let room = cap.saturating_sub(captured.bytes.len());
                if n > room {
                    captured.truncated = true;
                }
                captured.bytes.extend_from_slice(&buf[..n.min(room)]);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                captured.error = Some(e.to_string());
                break;
            }
        }
    }

    captured
}
