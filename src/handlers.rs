//! Interception handlers: one request/response pair per interceptable packet
//! kind, all operating on one `Session`. Every handler decodes only the fields
//! it needs, leaves everything else in the body untouched, and fails open: a
//! body it cannot decode is reported to the relay, which forwards the original
//! bytes unchanged.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use log::{debug, warn};
use serde::Serialize;
use serde_json::{json, Value};

use crate::console::{self, CONSOLE_UID, CONSOLE_WELCOME_TEXT, GOTO_FALLBACK_HEIGHT, GOTO_SENTINEL};
use crate::mapper::Protocol;
use crate::packet::Packet;
use crate::session::Session;

/// Chat message as fabricated by the proxy. Real chat messages are never
/// round-tripped through this type; they pass through as opaque JSON.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInfo {
    pub time: u32,
    pub uid: u32,
    pub to_uid: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrivateChatNotify {
    chat_info: ChatInfo,
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as u32
}

fn decode(body: &[u8]) -> Result<Value> {
    let value: Value = serde_json::from_slice(body).context("undecodable packet body")?;
    if !value.is_object() {
        bail!("packet body is not a JSON object");
    }
    Ok(value)
}

/// Re-serializes a mutated body, falling back to the original bytes when
/// encoding fails so the packet is never dropped.
fn encode_or_original(value: &Value, original: &[u8]) -> Vec<u8> {
    match serde_json::to_vec(value) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("failed to re-encode mutated body, forwarding original: {}", e);
            original.to_vec()
        }
    }
}

fn force_retcode_ok(value: &mut Value) {
    value["retcode"] = json!(0);
}

/// Appends a chat entry to the named message list, creating the list if the
/// backend omitted it.
fn push_chat(value: &mut Value, key: &str, chat: &ChatInfo) {
    let Ok(entry) = serde_json::to_value(chat) else {
        return;
    };
    if let Some(list) = value[key].as_array_mut() {
        list.push(entry);
    } else {
        value[key] = json!([entry]);
    }
}

impl Session {
    fn greeting(&self) -> ChatInfo {
        ChatInfo {
            time: unix_now(),
            uid: CONSOLE_UID,
            to_uid: self.player_uid,
            text: CONSOLE_WELCOME_TEXT.to_string(),
            icon: None,
        }
    }

    /// Fabricates a PrivateChatNotify toward this session's own client. A send
    /// failure (endpoint already torn down) is logged, never propagated: the
    /// triggering packet's own forwarding decision must not depend on it.
    fn notify_private_chat(&self, head: &Bytes, chat_info: ChatInfo) {
        let notify = PrivateChatNotify { chat_info };
        let body = match serde_json::to_vec(&notify) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to encode PrivateChatNotify: {}", e);
                return;
            }
        };
        debug!("injecting PrivateChatNotify for uid {}", self.player_uid);
        if let Err(e) = self
            .endpoint
            .send(Packet::new("PrivateChatNotify", head.clone(), Bytes::from(body)))
        {
            warn!("failed to deliver synthetic chat notify: {}", e);
        }
    }

    /// Private chat addressed to the console uid: echo the message back to the
    /// sender, run the text as a command, and reply with the result. The
    /// request still goes to the backend unchanged; its rejection is masked by
    /// the response handler.
    pub async fn on_private_chat_req(
        &mut self,
        from: &Protocol,
        to: &Protocol,
        head: &Bytes,
        body: &[u8],
    ) -> Result<Vec<u8>> {
        let value = decode(body)?;
        let target_uid = value["targetUid"].as_u64().unwrap_or(0) as u32;
        self.inject_private_chat = target_uid == CONSOLE_UID;
        if !self.inject_private_chat {
            return Ok(body.to_vec());
        }
        debug!(
            "intercepting PrivateChatReq ({} -> {}) from uid {}",
            from, to, self.player_uid
        );
        let text = value["text"].as_str().unwrap_or("").to_string();
        let icon = value["icon"].as_u64().map(|i| i as u32);
        self.notify_private_chat(
            head,
            ChatInfo {
                time: unix_now(),
                uid: self.player_uid,
                to_uid: CONSOLE_UID,
                text: text.clone(),
                icon,
            },
        );
        if text.is_empty() {
            return Ok(body.to_vec());
        }
        let reply = match self
            .console
            .execute(self.command_channel, self.player_uid, &text)
            .await
        {
            Ok(msg) => msg,
            Err(e) => format!("Failed to execute command: {}", e),
        };
        self.notify_private_chat(
            head,
            ChatInfo {
                time: unix_now(),
                uid: CONSOLE_UID,
                to_uid: self.player_uid,
                text: reply,
                icon: None,
            },
        );
        Ok(body.to_vec())
    }

    /// Masks the backend's rejection of a chat to the nonexistent console uid.
    pub async fn on_private_chat_rsp(
        &mut self,
        _from: &Protocol,
        _to: &Protocol,
        body: &[u8],
    ) -> Result<Vec<u8>> {
        if !self.inject_private_chat {
            return Ok(body.to_vec());
        }
        self.inject_private_chat = false;
        let mut value = decode(body)?;
        force_retcode_ok(&mut value);
        debug!("rewriting PrivateChatRsp for uid {}", self.player_uid);
        Ok(encode_or_original(&value, body))
    }

    pub async fn on_pull_private_chat_req(
        &mut self,
        from: &Protocol,
        to: &Protocol,
        body: &[u8],
    ) -> Result<Vec<u8>> {
        let value = decode(body)?;
        let target_uid = value["targetUid"].as_u64().unwrap_or(0) as u32;
        self.inject_pull_private_chat = target_uid == CONSOLE_UID;
        if self.inject_pull_private_chat {
            debug!("intercepting PullPrivateChatReq ({} -> {})", from, to);
        }
        Ok(body.to_vec())
    }

    /// Appends the console greeting to the pulled history with the console.
    pub async fn on_pull_private_chat_rsp(
        &mut self,
        _from: &Protocol,
        _to: &Protocol,
        body: &[u8],
    ) -> Result<Vec<u8>> {
        if !self.inject_pull_private_chat {
            return Ok(body.to_vec());
        }
        self.inject_pull_private_chat = false;
        let mut value = decode(body)?;
        push_chat(&mut value, "chatInfo", &self.greeting());
        force_retcode_ok(&mut value);
        debug!("rewriting PullPrivateChatRsp for uid {}", self.player_uid);
        Ok(encode_or_original(&value, body))
    }

    /// Only the first page of the recent-chat list gets the console entry;
    /// later pages would duplicate it.
    pub async fn on_pull_recent_chat_req(
        &mut self,
        from: &Protocol,
        to: &Protocol,
        body: &[u8],
    ) -> Result<Vec<u8>> {
        let value = decode(body)?;
        self.inject_pull_recent_chat = value["beginSequence"].as_u64().unwrap_or(0) == 0;
        if self.inject_pull_recent_chat {
            debug!("intercepting PullRecentChatReq ({} -> {})", from, to);
        }
        Ok(body.to_vec())
    }

    pub async fn on_pull_recent_chat_rsp(
        &mut self,
        _from: &Protocol,
        _to: &Protocol,
        body: &[u8],
    ) -> Result<Vec<u8>> {
        if !self.inject_pull_recent_chat {
            return Ok(body.to_vec());
        }
        self.inject_pull_recent_chat = false;
        let mut value = decode(body)?;
        push_chat(&mut value, "chatInfo", &self.greeting());
        force_retcode_ok(&mut value);
        debug!("rewriting PullRecentChatRsp for uid {}", self.player_uid);
        Ok(encode_or_original(&value, body))
    }

    /// Splices the console contact into every friend list. No request hook and
    /// no flag: every response of this kind is rewritten.
    pub async fn on_get_player_friend_list_rsp(
        &mut self,
        _from: &Protocol,
        _to: &Protocol,
        body: &[u8],
    ) -> Result<Vec<u8>> {
        let mut value = decode(body)?;
        let Ok(entry) = serde_json::to_value(console::console_friend()) else {
            return Ok(body.to_vec());
        };
        if let Some(list) = value["friendList"].as_array_mut() {
            list.push(entry);
        } else {
            value["friendList"] = json!([entry]);
        }
        debug!("injecting console contact into GetPlayerFriendListRsp");
        Ok(encode_or_original(&value, body))
    }

    /// A mark named "goto" is a teleport command, not a marker: run the
    /// movement command and neutralize the request so the backend never
    /// persists the mark.
    pub async fn on_mark_map_req(
        &mut self,
        from: &Protocol,
        to: &Protocol,
        _head: &Bytes,
        body: &[u8],
    ) -> Result<Vec<u8>> {
        let mut value = decode(body)?;
        let is_goto = value["mark"]["name"].as_str() == Some(GOTO_SENTINEL)
            && value["mark"]["pos"].is_object();
        self.inject_mark_map_goto = is_goto;
        if !is_goto {
            return Ok(body.to_vec());
        }
        let pos = &value["mark"]["pos"];
        let x = pos["x"].as_f64().unwrap_or(0.0) as f32;
        let mut y = pos["y"].as_f64().unwrap_or(0.0) as f32;
        let z = pos["z"].as_f64().unwrap_or(0.0) as f32;
        if y == 0.0 {
            y = GOTO_FALLBACK_HEIGHT;
        }
        debug!(
            "intercepting MarkMapReq goto ({} -> {}) at ({}, {}, {})",
            from, to, x, y, z
        );
        if let Err(e) = self
            .console
            .execute(
                self.command_channel,
                self.player_uid,
                &format!("goto {} {} {}", x, y, z),
            )
            .await
        {
            warn!("goto command failed: {}", e);
        }
        // Invalidate the op and drop the payload so nothing is persisted.
        if let Value::Object(map) = &mut value {
            map.insert("op".to_string(), json!(-1));
            map.remove("old");
            map.remove("mark");
        }
        Ok(encode_or_original(&value, body))
    }

    /// Suppresses the goto mark from the acknowledged mark list.
    pub async fn on_mark_map_rsp(
        &mut self,
        _from: &Protocol,
        _to: &Protocol,
        body: &[u8],
    ) -> Result<Vec<u8>> {
        if !self.inject_mark_map_goto {
            return Ok(body.to_vec());
        }
        self.inject_mark_map_goto = false;
        let mut value = decode(body)?;
        force_retcode_ok(&mut value);
        value["markList"] = json!([]);
        debug!("rewriting MarkMapRsp for uid {}", self.player_uid);
        Ok(encode_or_original(&value, body))
    }

    /// Pure observation during login: the token response carries the player
    /// uid this session belongs to. The packet is forwarded untouched.
    pub fn observe_player_token_rsp(&mut self, body: &[u8]) {
        let Ok(value) = decode(body) else {
            return;
        };
        if let Some(uid) = value["uid"].as_u64() {
            self.player_uid = uid as u32;
            debug!("session bound to uid {}", self.player_uid);
        }
    }
}
