//! Full-path test: a client and a scripted backend talk through the running
//! relay over real sockets, with console traffic spliced in between.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use viabridge_proxy::command::CommandExecutor;
use viabridge_proxy::config_loader::Config;
use viabridge_proxy::console::CONSOLE_UID;
use viabridge_proxy::mapper::PassthroughMapper;
use viabridge_proxy::packet::{read_frame, Packet};
use viabridge_proxy::relay::Relay;

struct MockConsole {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl CommandExecutor for MockConsole {
    async fn execute(&self, _channel: u32, _uid: u32, text: &str) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(text.to_string());
        Ok(format!("ran: {}", text))
    }
}

fn packet(name: &str, body: Value) -> Packet {
    Packet::new(
        name,
        Bytes::new(),
        Bytes::from(serde_json::to_vec(&body).unwrap()),
    )
}

async fn recv(stream: &mut TcpStream) -> Packet {
    timeout(Duration::from_secs(5), read_frame(stream))
        .await
        .expect("timed out waiting for a frame")
        .unwrap()
        .expect("unexpected EOF")
}

async fn send(stream: &mut TcpStream, p: Packet) {
    use tokio::io::AsyncWriteExt;
    stream.write_all(&p.encode()).await.unwrap();
}

/// Scripted backend: answers the handful of requests the test sends.
async fn run_backend(listener: TcpListener) {
    let (mut stream, _) = listener.accept().await.unwrap();
    while let Ok(Some(req)) = read_frame(&mut stream).await {
        let rsp = match req.name.as_str() {
            "GetPlayerTokenReq" => packet("GetPlayerTokenRsp", json!({ "uid": 654321 })),
            "GetPlayerFriendListReq" => packet(
                "GetPlayerFriendListRsp",
                json!({ "retcode": 0, "friendList": [{ "uid": 777, "nickname": "Real" }] }),
            ),
            // The console uid does not exist on the backend, so it rejects.
            "PrivateChatReq" => packet("PrivateChatRsp", json!({ "retcode": 5 })),
            _ => packet("UnknownRsp", json!({})),
        };
        send(&mut stream, rsp).await;
    }
}

#[tokio::test]
async fn relay_bridges_and_injects() {
    let backend_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_addr = backend_listener.local_addr().unwrap();
    tokio::spawn(run_backend(backend_listener));

    let front_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let front_addr = front_listener.local_addr().unwrap();

    let config: Config = serde_yaml::from_str(&format!(
        "bind-address: \"{}\"\nbackend-address: \"{}\"\n",
        front_addr, backend_addr
    ))
    .unwrap();
    let console = Arc::new(MockConsole {
        calls: Mutex::new(Vec::new()),
    });
    let relay = Arc::new(Relay::new(config, Arc::new(PassthroughMapper), console.clone()));
    tokio::spawn(relay.serve_on(front_listener));

    let mut client = TcpStream::connect(front_addr).await.unwrap();

    // Login-time uid capture: the token response passes through untouched.
    send(&mut client, packet("GetPlayerTokenReq", json!({}))).await;
    let token_rsp = recv(&mut client).await;
    assert_eq!(token_rsp.name, "GetPlayerTokenRsp");
    let v: Value = serde_json::from_slice(&token_rsp.body).unwrap();
    assert_eq!(v["uid"], 654321);

    // The friend list comes back with the console contact appended.
    send(&mut client, packet("GetPlayerFriendListReq", json!({}))).await;
    let friends = recv(&mut client).await;
    let v: Value = serde_json::from_slice(&friends.body).unwrap();
    let list = v["friendList"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["uid"], 777);
    assert_eq!(list[1]["uid"], CONSOLE_UID);

    // Chat to the console: echo notify, command reply, then the masked
    // response, in that order.
    send(
        &mut client,
        packet(
            "PrivateChatReq",
            json!({ "targetUid": CONSOLE_UID, "text": "status" }),
        ),
    )
    .await;
    let echo = recv(&mut client).await;
    assert_eq!(echo.name, "PrivateChatNotify");
    let v: Value = serde_json::from_slice(&echo.body).unwrap();
    assert_eq!(v["chatInfo"]["uid"], 654321);
    assert_eq!(v["chatInfo"]["text"], "status");

    let reply = recv(&mut client).await;
    assert_eq!(reply.name, "PrivateChatNotify");
    let v: Value = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(v["chatInfo"]["uid"], CONSOLE_UID);
    assert_eq!(v["chatInfo"]["text"], "ran: status");

    let chat_rsp = recv(&mut client).await;
    assert_eq!(chat_rsp.name, "PrivateChatRsp");
    let v: Value = serde_json::from_slice(&chat_rsp.body).unwrap();
    assert_eq!(v["retcode"], 0);

    assert_eq!(*console.calls.lock().unwrap(), vec!["status".to_string()]);
}
