//! Who may run which command.

use crate::config::Settings;
use crate::error::BridgeError;
use crate::BridgeResult;

pub const NOT_ALLOWED_HERE: &str = "You can't use this here";
pub const NOT_AN_ADMIN: &str = "You don't have permission to use this command";

/// Reject chats that are not on the allow-list.
pub fn ensure_allowed_chat(settings: &Settings, chat_id: i64) -> BridgeResult<()> {
    if settings.allowed_chats.contains(&chat_id) {
        Ok(())
    } else {
        Err(BridgeError::Unauthorized(NOT_ALLOWED_HERE.to_string()))
    }
}

pub fn is_sudo(settings: &Settings, user_id: u64) -> bool {
    settings.sudo_users.contains(&user_id)
}

/// Require a sudo user or one of the chat's administrators.
pub fn ensure_admin(
    settings: &Settings,
    user_id: Option<u64>,
    chat_admins: &[u64],
) -> BridgeResult<()> {
    match user_id {
        Some(id) if is_sudo(settings, id) || chat_admins.contains(&id) => Ok(()),
        _ => Err(BridgeError::Unauthorized(NOT_AN_ADMIN.to_string())),
    }
}
