//! One follow session: handshake, resync, subscribe, then apply the
//! leader's command stream until something breaks.

use super::handshake::{expect_ok, handshake};
use super::types::{ReplicationError, ReplicationResult};
use crate::config::FollowTarget;
use crate::core::is_durable_record;
use crate::metrics;
use crate::protocol::{ProtocolError, RespConnection, StreamedRecord};
use crate::server::Server;
use tracing::{debug, info};

/// Run one session attempt against `target`.
///
/// Returns `Ok(())` when the leader closes the stream cleanly; every other
/// ending is an error. The state lock is never held across network I/O.
pub async fn run_session(
    server: &Server,
    target: &FollowTarget,
    generation: u64,
) -> ReplicationResult<()> {
    server.generation().ensure_current(generation)?;

    let (credential, own_id, announce_ip, announce_port) = {
        let mut state = server.state().write().await;
        server.generation().ensure_current(generation)?;
        state.progress.begin_session();
        let config = state.config.get();
        (
            config.leader_auth.clone(),
            config.server_id.clone(),
            config.announce_ip.clone(),
            config.announce_port,
        )
    };

    let addr = target.addr();
    let mut conn = RespConnection::dial(&addr, server.settings().dial_timeout())
        .await
        .map_err(ReplicationError::Dial)?;

    let identity = handshake(&mut conn, credential.as_deref(), &own_id).await?;
    let catch_up_target = identity.aof_size()?;

    let offset = server
        .negotiator()
        .negotiate(server, &addr, generation, credential.as_deref())
        .await?;

    let port = announce_port.unwrap_or_else(|| server.local_addr().port());
    let port_arg = port.to_string();
    let reply = conn
        .request(&["replconf", "listening-port", port_arg.as_str()])
        .await?;
    expect_ok(reply, "replconf")?;

    if let Some(ip) = announce_ip.as_deref() {
        let reply = conn.request(&["replconf", "ip-address", ip]).await?;
        expect_ok(reply, "replconf")?;
    }
    debug!("follow: {}: replconf", addr);

    let offset_arg = offset.to_string();
    let reply = conn.request(&["aof", offset_arg.as_str()]).await?;
    expect_ok(reply, "aof live")?;
    debug!("follow: {}: read aof from {}", addr, offset);

    {
        let mut state = server.state().write().await;
        server.generation().ensure_current(generation)?;
        state.progress.start_streaming(offset, catch_up_target);
        metrics::set_applied_offset(offset);
        if offset >= catch_up_target && state.progress.mark_caught_up() {
            metrics::set_caught_up(true);
            info!("caught up with {} at offset {}", addr, offset);
        }
    }

    loop {
        let record = match conn.read_streamed_record().await {
            Ok(record) => record,
            Err(ProtocolError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if record.control {
            return Err(ReplicationError::InvalidMultibulk);
        }
        apply_record(server, generation, &record).await?;
    }
}

/// Apply one replicated record under the state lock
pub async fn apply_record(
    server: &Server,
    generation: u64,
    record: &StreamedRecord,
) -> ReplicationResult<()> {
    let mut state = server.state().write().await;
    server.generation().ensure_current(generation)?;

    if let Err(e) = state.db.execute(&record.fields) {
        if e.is_fatal() {
            return Err(e.into());
        }
        debug!("Replicated command {:?} failed: {}", record.fields.first(), e);
    }

    let durable = is_durable_record(&record.fields);
    if durable {
        state.aof.append(&record.fields);
    }
    let applied = state.progress.advance(record.encoded_len);
    metrics::record_applied(durable, record.encoded_len);
    metrics::set_applied_offset(applied);

    if state.aof.needs_flush() {
        state.aof.flush(false).await?;
    }

    if !state.progress.is_caught_up() && applied >= state.progress.target_offset() {
        state.aof.flush(false).await?;
        if state.progress.mark_caught_up() {
            metrics::set_caught_up(true);
            info!("caught up at offset {}", applied);
        }
    }

    Ok(())
}
