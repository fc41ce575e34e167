//! Wire-level tests for the replication commands a leader serves:
//! SERVER, AOF, AOFSHA, REPLCONF, plus the HTTP status endpoints.


use ferry_server::protocol::encode_command;
use ferry_server::{RespValue, create_router};
use sha2::{Digest, Sha256};
use std::time::Duration;
use test_helper::TestNode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

fn fields_of(reply: RespValue) -> Vec<(String, String)> {
    let RespValue::Array(Some(items)) = reply else {
        panic!("expected array reply, got {:?}", reply);
    };
    items
        .chunks_exact(2)
        .map(|pair| {
            (
                pair[0].as_string().unwrap().into_owned(),
                pair[1].as_string().unwrap().into_owned(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_server_command_fields() {
    let node = TestNode::start().await;
    node.cmd(&["set", "a", "1"]).await;

    let fields = fields_of(node.cmd(&["SERVER"]).await);
    let keys: Vec<&str> = fields.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "id",
            "following",
            "aof_size",
            "caught_up",
            "caught_up_once",
            "num_keys",
            "read_only",
            "version"
        ]
    );

    let value_of = |key: &str| {
        fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .unwrap()
    };
    assert_eq!(value_of("id"), node.status().await.server_id);
    assert_eq!(value_of("following"), "");
    assert_eq!(value_of("aof_size"), node.aof_size().await.to_string());
    assert_eq!(value_of("num_keys"), "1");
    assert_eq!(value_of("read_only"), "false");
}

#[tokio::test]
async fn test_unknown_command() {
    let node = TestNode::start().await;
    let reply = node.cmd(&["bogus"]).await;
    assert_eq!(reply.error_message(), Some("unknown command 'bogus'"));
}

#[tokio::test]
async fn test_aof_rejects_offset_past_end() {
    let node = TestNode::start().await;
    node.cmd(&["set", "a", "1"]).await;

    let reply = node.cmd(&["aof", "99999"]).await;
    assert_eq!(reply.error_message(), Some("pos is too big"));

    let reply = node.cmd(&["aof", "xyz"]).await;
    assert_eq!(reply.error_message(), Some("invalid argument 'xyz'"));
}

#[tokio::test]
async fn test_aof_streams_existing_and_live_records() {
    let node = TestNode::start().await;
    node.cmd(&["set", "a", "1"]).await;
    node.cmd(&["set", "b", "2"]).await;

    let skip = encode_command(&["set", "a", "1"]).len().to_string();
    let mut stream = node.client().await;
    assert!(stream.request(&["aof", skip.as_str()]).await.unwrap().is_ok());

    let record = stream.read_streamed_record().await.unwrap();
    assert_eq!(record.fields, vec!["set", "b", "2"]);
    assert!(!record.control);
    assert_eq!(
        record.encoded_len,
        encode_command(&["set", "b", "2"]).len() as u64
    );

    // Writes made after the stream started are forwarded as they land
    node.cmd(&["incr", "counter"]).await;
    let record = timeout(Duration::from_secs(5), stream.read_streamed_record())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.fields, vec!["incr", "counter"]);
}

#[tokio::test]
async fn test_aof_streams_publish_records() {
    let node = TestNode::start().await;

    let mut stream = node.client().await;
    assert!(stream.request(&["aof", "0"]).await.unwrap().is_ok());

    node.cmd(&["publish", "news", "hello"]).await;
    let record = timeout(Duration::from_secs(5), stream.read_streamed_record())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.fields, vec!["publish", "news", "hello"]);
}

#[tokio::test]
async fn test_aofsha_matches_log_bytes() {
    let node = TestNode::start().await;
    node.cmd(&["set", "a", "1"]).await;
    node.cmd(&["set", "b", "2"]).await;

    let first = encode_command(&["set", "a", "1"]);
    let len = first.len().to_string();
    let reply = node.cmd(&["aofsha", "0", len.as_str()]).await;
    assert_eq!(
        reply.as_string().unwrap(),
        hex::encode(Sha256::digest(&first).as_slice())
    );

    let mut both = first.clone();
    both.extend_from_slice(&encode_command(&["set", "b", "2"]));
    let len = both.len().to_string();
    let reply = node.cmd(&["aofsha", "0", len.as_str()]).await;
    assert_eq!(
        reply.as_string().unwrap(),
        hex::encode(Sha256::digest(&both).as_slice())
    );

    let past = (both.len() + 1).to_string();
    let reply = node.cmd(&["aofsha", "0", past.as_str()]).await;
    assert_eq!(reply.error_message(), Some("pos is too big"));
}

#[tokio::test]
async fn test_replconf_errors() {
    let node = TestNode::start().await;

    let reply = node.cmd(&["replconf", "listening-port", "abc"]).await;
    assert_eq!(reply.error_message(), Some("invalid argument 'abc'"));

    let reply = node.cmd(&["replconf", "listening-port"]).await;
    assert_eq!(
        reply.error_message(),
        Some("wrong number of arguments for 'replconf' command")
    );

    let reply = node.cmd(&["replconf", "capa", "eof"]).await;
    assert_eq!(reply.error_message(), Some("cannot find follower"));
}

#[tokio::test]
async fn test_replconf_registers_connection() {
    let node = TestNode::start().await;

    let mut conn = node.client().await;
    assert!(
        conn.request(&["replconf", "listening-port", "7777"])
            .await
            .unwrap()
            .is_ok()
    );
    assert!(
        conn.request(&["replconf", "ip-address", "10.0.0.5"])
            .await
            .unwrap()
            .is_ok()
    );

    let followers = node.status().await.followers;
    assert_eq!(followers.len(), 1);
    assert_eq!(followers[0].listening_port, Some(7777));
    assert_eq!(followers[0].ip_address.as_deref(), Some("10.0.0.5"));

    drop(conn);
    let node = &node;
    assert!(
        test_helper::wait_until(Duration::from_secs(5), move || async move {
            node.status().await.followers.is_empty()
        })
        .await
    );
}

#[tokio::test]
async fn test_readonly_toggle() {
    let node = TestNode::start().await;

    assert!(node.cmd(&["readonly", "yes"]).await.is_ok());
    let reply = node.cmd(&["set", "a", "1"]).await;
    assert_eq!(reply.error_message(), Some("read only"));

    // Non-durable commands still go through
    assert_eq!(
        node.cmd(&["publish", "ch", "m"]).await,
        RespValue::Integer(0)
    );

    assert!(node.cmd(&["readonly", "no"]).await.is_ok());
    assert!(node.cmd(&["set", "a", "1"]).await.is_ok());
}

#[tokio::test]
async fn test_requirepass_gates_commands() {
    let node = TestNode::start_with_config(ferry_server::PersistedConfig {
        requirepass: Some("secret".to_string()),
        ..Default::default()
    })
    .await;

    let mut conn = node.client().await;
    assert_eq!(
        conn.request(&["ping"]).await.unwrap(),
        RespValue::Simple("PONG".to_string())
    );
    let reply = conn.request(&["get", "a"]).await.unwrap();
    assert_eq!(reply.error_message(), Some("authentication required"));

    let reply = conn.request(&["auth", "wrong"]).await.unwrap();
    assert_eq!(reply.error_message(), Some("invalid password"));

    assert!(conn.request(&["auth", "secret"]).await.unwrap().is_ok());
    assert_eq!(conn.request(&["get", "a"]).await.unwrap(), RespValue::null());
}

/// Serve the status router on a loopback port
async fn serve_http(node: &TestNode) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http_addr = listener.local_addr().unwrap();
    let app = create_router(node.server.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    http_addr
}

/// Plain HTTP/1.1 GET returning the status line and the JSON body
async fn http_get_json(addr: std::net::SocketAddr, path: &str) -> (String, serde_json::Value) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        path
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    let (head, body) = response.split_once("\r\n\r\n").unwrap();
    let status_line = head.lines().next().unwrap().to_string();
    (status_line, serde_json::from_str(body).unwrap())
}

#[tokio::test]
async fn test_http_replication_status() {
    let node = TestNode::start().await;
    node.cmd(&["set", "a", "1"]).await;
    let http_addr = serve_http(&node).await;

    let (status_line, status) = http_get_json(http_addr, "/replication").await;
    assert!(status_line.starts_with("HTTP/1.1 200"));
    assert_eq!(status["server_id"], node.status().await.server_id);
    assert_eq!(status["aof_size"], node.aof_size().await);
    assert_eq!(status["status"], "idle");
    assert!(status["following"].is_null());
}

#[tokio::test]
async fn test_http_data_stats() {
    let node = TestNode::start().await;
    node.cmd(&["set", "a", "1"]).await;
    node.cmd(&["set", "b", "2"]).await;
    node.cmd(&["get", "a"]).await;
    node.cmd(&["del", "b"]).await;
    node.cmd(&["publish", "news", "hello"]).await;
    let http_addr = serve_http(&node).await;

    let (status_line, stats) = http_get_json(http_addr, "/stats").await;
    assert!(status_line.starts_with("HTTP/1.1 200"));
    assert_eq!(stats["kv"]["total_keys"], 1);
    assert_eq!(stats["kv"]["sets"], 2);
    assert_eq!(stats["kv"]["gets"], 1);
    assert_eq!(stats["kv"]["dels"], 1);
    assert_eq!(stats["pubsub"]["messages_published"], 1);
    assert_eq!(stats["pubsub"]["total_channels"], 0);
}
