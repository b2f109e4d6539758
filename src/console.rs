use lazy_static::lazy_static;
use serde::Serialize;

/// Uid of the virtual console contact. It exists only inside this proxy; the
/// backend has no player with this uid.
pub const CONSOLE_UID: u32 = 1;

/// Map marks with this exact name are treated as teleport commands instead of
/// markers. A player naming a real mark "goto" is indistinguishable from a
/// command, which is accepted as part of the convention.
pub const GOTO_SENTINEL: &str = "goto";

/// Height substituted when a goto mark leaves the vertical coordinate at zero,
/// so the teleport lands above terrain instead of inside it.
pub const GOTO_FALLBACK_HEIGHT: f32 = 500.0;

pub const CONSOLE_WELCOME_TEXT: &str =
    "Welcome! Send me a command here, or place a map mark named \"goto\" to teleport to it.";

/// The virtual admin contact. Never persisted anywhere; every response that
/// needs it re-synthesizes it from this record.
pub struct ConsoleIdentity {
    pub uid: u32,
    pub nickname: &'static str,
    pub level: u32,
    pub world_level: u32,
    pub signature: &'static str,
    pub name_card_id: u32,
    pub avatar_id: u32,
    pub costume_id: u32,
}

lazy_static! {
    pub static ref CONSOLE: ConsoleIdentity = ConsoleIdentity {
        uid: CONSOLE_UID,
        nickname: "Console",
        level: 60,
        world_level: 8,
        signature: "Send me a command!",
        name_card_id: 210001,
        avatar_id: 10000007,
        costume_id: 0,
    };
}

/// Friend-list entry as the client expects it. Only used for the injected
/// console contact; real entries pass through untyped.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendBrief {
    pub uid: u32,
    pub nickname: &'static str,
    pub level: u32,
    pub world_level: u32,
    pub signature: &'static str,
    pub name_card_id: u32,
    pub profile_picture: ProfilePicture,
    pub is_game_source: bool,
    pub online_state: u32,
    pub platform_type: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePicture {
    pub avatar_id: u32,
    pub costume_id: u32,
}

/// Builds the console's friend-list entry, marked online and game-sourced so
/// the client renders it like any other contact.
pub fn console_friend() -> FriendBrief {
    FriendBrief {
        uid: CONSOLE.uid,
        nickname: CONSOLE.nickname,
        level: CONSOLE.level,
        world_level: CONSOLE.world_level,
        signature: CONSOLE.signature,
        name_card_id: CONSOLE.name_card_id,
        profile_picture: ProfilePicture {
            avatar_id: CONSOLE.avatar_id,
            costume_id: CONSOLE.costume_id,
        },
        is_game_source: true,
        online_state: 1,
        platform_type: 3,
    }
}
