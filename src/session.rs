use std::sync::Arc;

use log::debug;

use crate::command::CommandExecutor;
use crate::transport::Endpoint;

/// Per-connection proxy state: the player's identity, the endpoint paired
/// with the player's own client (used for synthetic notifications), and one
/// pending-interception flag per interceptable request kind.
///
/// Each flag marks "the most recent outbound packet of this kind was
/// intercepted; the next matching inbound response must be rewritten". The
/// flags rely on the protocol never pipelining two outstanding requests of
/// the same kind before the first response returns. That is a property of the
/// proxied protocol, not something this type enforces.
///
/// All handler invocations for one session run on that session's single relay
/// task, so flag read-modify-clear needs no locking.
pub struct Session {
    /// Learned from the backend's token response during login; 0 until then.
    pub player_uid: u32,
    /// Endpoint toward this session's own client.
    pub endpoint: Endpoint,
    pub console: Arc<dyn CommandExecutor>,
    /// Command table the executor routes console text to.
    pub command_channel: u32,
    pub(crate) inject_private_chat: bool,
    pub(crate) inject_pull_private_chat: bool,
    pub(crate) inject_pull_recent_chat: bool,
    pub(crate) inject_mark_map_goto: bool,
}

impl Session {
    pub fn new(endpoint: Endpoint, console: Arc<dyn CommandExecutor>, command_channel: u32) -> Self {
        Self {
            player_uid: 0,
            endpoint,
            console,
            command_channel,
            inject_private_chat: false,
            inject_pull_private_chat: false,
            inject_pull_recent_chat: false,
            inject_mark_map_goto: false,
        }
    }

    /// Forced reset at teardown. A round trip that never completes (backend
    /// drop, connection loss) must not leave a flag armed.
    pub fn clear_pending(&mut self) {
        if self.inject_private_chat
            || self.inject_pull_private_chat
            || self.inject_pull_recent_chat
            || self.inject_mark_map_goto
        {
            debug!("clearing pending interception flags for uid {}", self.player_uid);
        }
        self.inject_private_chat = false;
        self.inject_pull_private_chat = false;
        self.inject_pull_recent_chat = false;
        self.inject_mark_map_goto = false;
    }
}
