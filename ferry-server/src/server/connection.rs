use super::Server;
use super::dispatch::{ClientContext, Dispatch, dispatch};
use crate::metrics;
use crate::protocol::{ProtocolError, ProtocolResult, RespReader, RespValue};
use std::io::SeekFrom;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tracing::{debug, info, warn};

/// Largest slice of log sent to a follower in one write
const STREAM_CHUNK_BYTES: usize = 64 * 1024;

/// Serve one client connection until it closes
pub async fn handle_connection(server: Arc<Server>, stream: TcpStream, remote_addr: SocketAddr) {
    server.followers().track(remote_addr);
    metrics::CONNECTIONS.inc();

    if let Err(e) = run_connection(&server, stream, remote_addr).await {
        match e {
            ProtocolError::ConnectionClosed => debug!("Client {} hung up", remote_addr),
            e => warn!("Client {} error: {}", remote_addr, e),
        }
    }

    metrics::CONNECTIONS.dec();
    server.followers().untrack(&remote_addr);
}

async fn run_connection(
    server: &Arc<Server>,
    stream: TcpStream,
    remote_addr: SocketAddr,
) -> ProtocolResult<()> {
    stream.set_nodelay(true)?;
    let (read_half, write_half) = stream.into_split();
    let mut reader = RespReader::new(read_half);
    let mut writer = BufWriter::new(write_half);
    let mut client = ClientContext::new(remote_addr);

    while let Some(frame) = reader.read_frame().await? {
        let args = match frame.into_args() {
            Ok(args) if !args.is_empty() => args,
            Ok(_) => continue,
            Err(e) => {
                write_value(&mut writer, &RespValue::error(format!("ERR {}", e))).await?;
                continue;
            }
        };

        match dispatch(server, &mut client, &args).await {
            Dispatch::Reply(reply) => write_value(&mut writer, &reply).await?,
            Dispatch::StreamLog(pos) => {
                write_value(&mut writer, &RespValue::ok()).await?;
                info!("Streaming log to {} from offset {}", remote_addr, pos);
                return stream_log(server, reader, &mut writer, pos).await;
            }
        }
    }

    Ok(())
}

async fn write_value<W: AsyncWrite + Unpin>(writer: &mut W, value: &RespValue) -> ProtocolResult<()> {
    writer.write_all(&value.to_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Send log bytes from `pos` on, then keep following the log as it
/// grows. Ends when the follower disconnects or the log is cut below what
/// was already sent.
async fn stream_log<W: AsyncWrite + Unpin>(
    server: &Arc<Server>,
    mut reader: RespReader<OwnedReadHalf>,
    writer: &mut W,
    pos: u64,
) -> ProtocolResult<()> {
    let (mut flushed, path) = {
        let state = server.state().read().await;
        (state.aof.subscribe(), state.aof.path().to_path_buf())
    };

    let mut file = File::open(&path).await?;
    file.seek(SeekFrom::Start(pos)).await?;
    let mut sent = pos;
    let mut buf = vec![0u8; STREAM_CHUNK_BYTES];

    loop {
        let available = *flushed.borrow_and_update();
        if available < sent {
            info!("Log truncated below streamed offset {}, closing stream", sent);
            return Ok(());
        }

        while sent < available {
            let want = ((available - sent) as usize).min(STREAM_CHUNK_BYTES);
            file.read_exact(&mut buf[..want]).await?;
            writer.write_all(&buf[..want]).await?;
            sent += want as u64;
            metrics::record_stream_bytes(want as u64);
        }
        writer.flush().await?;

        tokio::select! {
            changed = flushed.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
            frame = reader.read_frame() => {
                // Followers never talk after AOF; anything else is a hangup
                return match frame? {
                    None => Ok(()),
                    Some(_) => Err(ProtocolError::Invalid("unexpected command on log stream".to_string())),
                };
            }
        }
    }
}
