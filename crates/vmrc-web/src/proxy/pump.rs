//! Full-duplex byte pumping between an upgraded client connection and its
//! console backend.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::time::MissedTickBehavior;

const BUF_SIZE: usize = 32 * 1024;

/// Copies `reader` into `writer` until EOF, flushing buffered bytes at least
/// every `flush_interval`. A zero interval flushes after every read. On EOF
/// the writer is flushed and shut down.
pub async fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    flush_interval: Duration,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let immediate = flush_interval.is_zero();
    let mut writer = BufWriter::with_capacity(BUF_SIZE, writer);
    let mut buf = vec![0u8; BUF_SIZE];
    let mut ticker = tokio::time::interval(flush_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending = false;
    let mut total = 0u64;

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    writer.shutdown().await?;
                    return Ok(total);
                }
                writer.write_all(&buf[..n]).await?;
                total += n as u64;
                if immediate {
                    writer.flush().await?;
                } else {
                    pending = true;
                }
            }
            _ = ticker.tick(), if pending => {
                writer.flush().await?;
                pending = false;
            }
        }
    }
}

/// Pumps both directions until either side closes or fails, then drops both
/// connections.
pub async fn splice<C, B>(client: C, backend: B, flush_interval: Duration) -> io::Result<()>
where
    C: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_rx, mut client_tx) = tokio::io::split(client);
    let (mut backend_rx, mut backend_tx) = tokio::io::split(backend);

    tokio::select! {
        result = pump(&mut client_rx, &mut backend_tx, flush_interval) => {
            let sent = result?;
            tracing::debug!("Client closed console stream after {sent} bytes");
        }
        result = pump(&mut backend_rx, &mut client_tx, flush_interval) => {
            let received = result?;
            tracing::debug!("Backend closed console stream after {received} bytes");
        }
    }
    Ok(())
}
