use super::Server;
use crate::core::{CommandKind, FerryError, Result};
use crate::metrics;
use crate::persistence::PersistenceError;
use crate::protocol::RespValue;
use crate::replication::handle_follow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

const ADMIN_COMMANDS: &[&str] = &[
    "auth", "server", "follow", "replconf", "readonly", "aofsha", "aof",
];

/// Per-connection client state
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub remote_addr: SocketAddr,
    pub authenticated: bool,
}

impl ClientContext {
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            authenticated: false,
        }
    }
}

/// What the connection should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Reply(RespValue),
    /// Reply OK, then stream the log from this offset
    StreamLog(u64),
}

/// Execute one client command
pub async fn dispatch(server: &Arc<Server>, client: &mut ClientContext, args: &[String]) -> Dispatch {
    let Some(name) = args.first().map(|name| name.to_lowercase()) else {
        return Dispatch::Reply(FerryError::UnknownCommand(String::new()).to_reply());
    };

    let start = Instant::now();
    let result = route(server, client, &name, args).await;
    let elapsed = start.elapsed().as_secs_f64();
    let label = command_label(&name);

    match result {
        Ok(dispatch) => {
            metrics::record_command(label, "success", elapsed);
            dispatch
        }
        Err(e) => {
            metrics::record_command(label, "error", elapsed);
            debug!("{} from {} failed: {}", name, client.remote_addr, e);
            Dispatch::Reply(e.to_reply())
        }
    }
}

async fn route(
    server: &Arc<Server>,
    client: &mut ClientContext,
    name: &str,
    args: &[String],
) -> Result<Dispatch> {
    if name != "auth" && name != "ping" && !client.authenticated {
        let state = server.state().read().await;
        if state.config.get().requirepass.is_some() {
            return Err(FerryError::AuthRequired);
        }
        client.authenticated = true;
    }

    let reply = match name {
        "auth" => auth(server, client, args).await?,
        "server" => server_info(server, args).await?,
        "follow" => handle_follow(server, args).await?,
        "replconf" => server.followers().handle_replconf(&client.remote_addr, args)?,
        "readonly" => read_only(server, args).await?,
        "aofsha" => log_checksum(server, args).await?,
        "aof" => return log_stream_start(server, args).await.map(Dispatch::StreamLog),
        _ => data_command(server, name, args).await?,
    };
    Ok(Dispatch::Reply(reply))
}

async fn data_command(server: &Arc<Server>, name: &str, args: &[String]) -> Result<RespValue> {
    let kind =
        CommandKind::classify(name).ok_or_else(|| FerryError::UnknownCommand(name.to_string()))?;

    if !kind.is_mutating() {
        let state = server.state().read().await;
        return state.db.execute(args);
    }

    let mut state = server.state().write().await;
    let read_only = state.is_read_only();
    if read_only && kind.is_durable() {
        return Err(FerryError::ReadOnly);
    }

    let reply = state.db.execute(args)?;

    // Followers keep their log in the leader's shape: local publishes are
    // never recorded there
    if !read_only {
        state.aof.append(args);
        state.aof.flush(false).await?;
    }
    Ok(reply)
}

async fn auth(server: &Arc<Server>, client: &mut ClientContext, args: &[String]) -> Result<RespValue> {
    if args.len() != 2 {
        return Err(FerryError::WrongArity("auth".to_string()));
    }

    let state = server.state().read().await;
    match &state.config.get().requirepass {
        Some(password) if *password != args[1] => Err(FerryError::InvalidPassword),
        _ => {
            client.authenticated = true;
            Ok(RespValue::ok())
        }
    }
}

/// `SERVER`: identity and replication role as a flat key/value array
async fn server_info(server: &Arc<Server>, args: &[String]) -> Result<RespValue> {
    if args.len() != 1 {
        return Err(FerryError::WrongArity("server".to_string()));
    }

    let state = server.state().read().await;
    let config = state.config.get();
    let following = config
        .follow_target()
        .map(|target| target.to_string())
        .unwrap_or_default();

    Ok(RespValue::string_array([
        "id".to_string(),
        config.server_id.clone(),
        "following".to_string(),
        following,
        "aof_size".to_string(),
        state.aof.size().to_string(),
        "caught_up".to_string(),
        state.progress.is_caught_up().to_string(),
        "caught_up_once".to_string(),
        state.progress.caught_up_once().to_string(),
        "num_keys".to_string(),
        state.db.kv().len().to_string(),
        "read_only".to_string(),
        state.is_read_only().to_string(),
        "version".to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    ]))
}

/// `READONLY yes|no`
async fn read_only(server: &Arc<Server>, args: &[String]) -> Result<RespValue> {
    if args.len() != 2 {
        return Err(FerryError::WrongArity("readonly".to_string()));
    }
    let enabled = match args[1].to_lowercase().as_str() {
        "yes" => true,
        "no" => false,
        _ => return Err(FerryError::InvalidArgument(args[1].clone())),
    };

    let mut state = server.state().write().await;
    if state.config.get().read_only != enabled {
        state
            .config
            .update(false, |config| config.read_only = enabled)
            .await?;
    }
    Ok(RespValue::ok())
}

/// `AOFSHA <pos> <size>`: hex SHA-256 of a log range
async fn log_checksum(server: &Arc<Server>, args: &[String]) -> Result<RespValue> {
    if args.len() != 3 {
        return Err(FerryError::WrongArity("aofsha".to_string()));
    }
    let pos = parse_u64(&args[1])?;
    let len = parse_u64(&args[2])?;

    let mut state = server.state().write().await;
    state.aof.flush(false).await?;
    match state.aof.checksum(pos, len).await {
        Ok(digest) => Ok(RespValue::bulk(digest)),
        Err(PersistenceError::OutOfRange { .. }) => Err(FerryError::PositionOutOfRange),
        Err(e) => Err(e.into()),
    }
}

/// `AOF <pos>`: validate the start offset of a log stream
async fn log_stream_start(server: &Arc<Server>, args: &[String]) -> Result<u64> {
    if args.len() != 2 {
        return Err(FerryError::WrongArity("aof".to_string()));
    }
    let pos = parse_u64(&args[1])?;

    let mut state = server.state().write().await;
    state.aof.flush(false).await?;
    if pos > state.aof.size() {
        return Err(FerryError::PositionOutOfRange);
    }
    Ok(pos)
}

/// Metric label for a command name, bounded to known commands
fn command_label(name: &str) -> &str {
    if ADMIN_COMMANDS.contains(&name) || CommandKind::classify(name).is_some() {
        name
    } else {
        "unknown"
    }
}

fn parse_u64(value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| FerryError::InvalidArgument(value.to_string()))
}
