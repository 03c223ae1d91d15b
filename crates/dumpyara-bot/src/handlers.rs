//! Telegram command handlers.
//!
//! Every handler error is caught in [`handle_command`], logged, and turned
//! into a generic reply so a bad command never stops the dispatcher.

use std::sync::Arc;

use anyhow::Result;
use dumpyara_core::access;
use dumpyara_core::{
    parse_cancel_args, parse_dump_args, BridgeResult, JenkinsClient, Reconciler, Settings,
    CANCEL_USAGE, DUMP_USAGE,
};
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ReplyParameters};
use teloxide::utils::command::BotCommands;
use tokio::sync::Notify;
use tracing::{error, info, instrument, warn};

pub const CHECKING: &str = "Checking for existing builds...";
pub const GENERIC_FAILURE: &str = "An error occurred";
pub const MISSING_URL: &str = "Please pass in a URL";
pub const RESTARTING: &str = "Restarting bot...";

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "snake_case", description = "Dumpyara bot commands:")]
pub enum Command {
    #[command(description = "dump a firmware: /dump <URL> [a][f][b][p]")]
    Dump(String),
    #[command(description = "dump a firmware with the alternate dumper")]
    DumpAlt(String),
    #[command(description = "cancel a running or queued dump: /cancel <job_id> [p]")]
    Cancel(String),
    #[command(description = "restart the bot (admins only)")]
    Restart,
    #[command(description = "show this help")]
    Help,
}

/// Shared, read-only handler state.
pub struct BotState {
    settings: Settings,
    reconciler: Reconciler<JenkinsClient>,
    restart: Notify,
}

impl BotState {
    pub fn new(settings: Settings, reconciler: Reconciler<JenkinsClient>) -> Self {
        Self {
            settings,
            reconciler,
            restart: Notify::new(),
        }
    }

    fn request_restart(&self) {
        self.restart.notify_one();
    }

    /// Resolves once an administrator asked for a restart.
    pub async fn restart_requested(&self) {
        self.restart.notified().await;
    }
}

/// Entry point for every recognised command.
pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: Arc<BotState>,
) -> ResponseResult<()> {
    let chat_id = msg.chat.id;
    if let Err(e) = dispatch(&bot, &msg, cmd, &state).await {
        error!(chat = chat_id.0, "command failed: {:#}", e);
        if let Err(e) = bot.send_message(chat_id, GENERIC_FAILURE).await {
            warn!("could not report failure: {}", e);
        }
    }
    Ok(())
}

async fn dispatch(bot: &Bot, msg: &Message, cmd: Command, state: &BotState) -> Result<()> {
    match cmd {
        Command::Dump(args) => dump(bot, msg, state, &args, false).await,
        Command::DumpAlt(args) => dump(bot, msg, state, &args, true).await,
        Command::Cancel(args) => cancel(bot, msg, state, &args).await,
        Command::Restart => restart(bot, msg, state).await,
        Command::Help => {
            Replier::to(bot, msg)
                .send(Command::descriptions().to_string())
                .await?;
            Ok(())
        }
    }
}

/// Argument tokens for a dump; `/dump_alt` behaves as if `a` was given.
pub fn dump_tokens(args: &str, alt: bool) -> Vec<&str> {
    let mut tokens: Vec<&str> = args.split_whitespace().collect();
    if alt && !tokens.is_empty() {
        tokens.push("a");
    }
    tokens
}

#[instrument(skip_all, fields(chat = msg.chat.id.0, alt = alt))]
async fn dump(bot: &Bot, msg: &Message, state: &BotState, args: &str, alt: bool) -> Result<()> {
    let replier = Replier::to(bot, msg);

    if let Err(e) = access::ensure_allowed_chat(&state.settings, msg.chat.id.0) {
        replier.send(e.user_message()).await?;
        return Ok(());
    }

    let tokens = dump_tokens(args, alt);
    if tokens.is_empty() {
        replier
            .send(format!("{}\n\n{}", MISSING_URL, DUMP_USAGE))
            .await?;
        return Ok(());
    }

    let command = match parse_dump_args(&tokens) {
        Ok(command) => command,
        Err(e) => {
            info!("rejected dump arguments: {}", e);
            replier.send(e.user_message()).await?;
            return Ok(());
        }
    };

    // Private dumps leave no trace of the URL in the chat.
    let replier = if command.request.is_private() {
        if let Err(e) = bot.delete_message(msg.chat.id, msg.id).await {
            warn!("could not delete private dump request: {}", e);
        }
        replier.detached()
    } else {
        replier
    };

    let placeholder = replier.send(CHECKING).await?;
    let text = match state.reconciler.dump(&command).await {
        Ok(outcome) => outcome.reply().to_string(),
        Err(e) => {
            error!("dump failed: {}", e);
            e.user_message()
        }
    };
    replier.update(&placeholder, text).await?;
    Ok(())
}

#[instrument(skip_all, fields(chat = msg.chat.id.0))]
async fn cancel(bot: &Bot, msg: &Message, state: &BotState, args: &str) -> Result<()> {
    let replier = Replier::to(bot, msg);

    if let Err(e) = authorize_admin(bot, msg, state).await? {
        replier.send(e.user_message()).await?;
        return Ok(());
    }

    let tokens: Vec<&str> = args.split_whitespace().collect();
    let command = match parse_cancel_args(&tokens) {
        Ok(command) => command,
        Err(e) => {
            info!("rejected cancel arguments: {}", e);
            replier
                .send(format!("Invalid job ID\n\n{}", CANCEL_USAGE))
                .await?;
            return Ok(());
        }
    };

    let text = match state
        .reconciler
        .cancel(command.job_name(), command.job_id)
        .await
    {
        Ok(outcome) => outcome.to_string(),
        Err(e) => {
            error!("cancel failed: {}", e);
            e.user_message()
        }
    };
    replier.send(text).await?;
    Ok(())
}

async fn restart(bot: &Bot, msg: &Message, state: &BotState) -> Result<()> {
    let replier = Replier::to(bot, msg);

    if let Err(e) = authorize_admin(bot, msg, state).await? {
        replier.send(e.user_message()).await?;
        return Ok(());
    }

    info!(chat = msg.chat.id.0, "restart requested");
    replier.send(RESTARTING).await?;
    state.request_restart();
    Ok(())
}

/// Allowed chat, then sudo user or chat administrator.
///
/// The outer error is a Telegram failure, the inner one the verdict.
async fn authorize_admin(
    bot: &Bot,
    msg: &Message,
    state: &BotState,
) -> ResponseResult<BridgeResult<()>> {
    if let Err(e) = access::ensure_allowed_chat(&state.settings, msg.chat.id.0) {
        return Ok(Err(e));
    }

    let user_id = msg.from.as_ref().map(|user| user.id.0);
    let Some(id) = user_id else {
        warn!("admin command without a sender");
        return Ok(access::ensure_admin(&state.settings, None, &[]));
    };

    if access::is_sudo(&state.settings, id) {
        return Ok(Ok(()));
    }

    let admins: Vec<u64> = bot
        .get_chat_administrators(msg.chat.id)
        .await?
        .into_iter()
        .map(|member| member.user.id.0)
        .collect();
    Ok(access::ensure_admin(&state.settings, Some(id), &admins))
}

/// Sends replies to one chat, optionally quoting the command message.
struct Replier<'a> {
    bot: &'a Bot,
    chat_id: ChatId,
    reply_to: Option<MessageId>,
}

impl<'a> Replier<'a> {
    fn to(bot: &'a Bot, msg: &Message) -> Self {
        Self {
            bot,
            chat_id: msg.chat.id,
            reply_to: Some(msg.id),
        }
    }

    /// Stop quoting, for when the command message is gone.
    fn detached(self) -> Self {
        Self {
            reply_to: None,
            ..self
        }
    }

    async fn send(&self, text: impl Into<String>) -> ResponseResult<Message> {
        let mut request = self.bot.send_message(self.chat_id, text);
        if let Some(id) = self.reply_to {
            request = request.reply_parameters(ReplyParameters::new(id));
        }
        request.await
    }

    /// Replace the placeholder text, or send a new message if editing fails.
    async fn update(&self, placeholder: &Message, text: String) -> ResponseResult<()> {
        match self
            .bot
            .edit_message_text(self.chat_id, placeholder.id, text.clone())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("could not edit placeholder: {}", e);
                self.send(text).await.map(|_| ())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dump_command() {
        let cmd = Command::parse("/dump http://example.com/a.zip af", "dumpyara_bot").unwrap();
        assert_eq!(cmd, Command::Dump("http://example.com/a.zip af".to_string()));
    }

    #[test]
    fn test_parse_dump_alt_command() {
        let cmd = Command::parse("/dump_alt http://example.com/a.zip", "dumpyara_bot").unwrap();
        assert_eq!(cmd, Command::DumpAlt("http://example.com/a.zip".to_string()));
    }

    #[test]
    fn test_parse_unit_commands() {
        assert_eq!(
            Command::parse("/restart", "dumpyara_bot").unwrap(),
            Command::Restart
        );
        assert_eq!(Command::parse("/help", "dumpyara_bot").unwrap(), Command::Help);
        assert!(Command::parse("/build x", "dumpyara_bot").is_err());
    }

    #[test]
    fn test_dump_tokens() {
        assert_eq!(dump_tokens("  http://x/y  f ", false), vec!["http://x/y", "f"]);
        assert_eq!(dump_tokens("http://x/y", true), vec!["http://x/y", "a"]);
        assert!(dump_tokens("   ", true).is_empty());
    }

    #[test]
    fn test_dump_alt_sets_alternate_dumper() {
        let tokens = dump_tokens("http://example.com/a.zip p", true);
        let command = parse_dump_args(&tokens).unwrap();
        assert!(command.request.use_alt_dumper());
        assert!(command.request.is_private());
        assert!(!command.force);
    }

    #[test]
    fn test_help_lists_commands() {
        let help = Command::descriptions().to_string();
        for name in ["/dump", "/dump_alt", "/cancel", "/restart", "/help"] {
            assert!(help.contains(name), "missing {}", name);
        }
    }

    fn state() -> BotState {
        let settings = Settings::from_lookup(|key| {
            let value = match key {
                "TELEGRAM_BOT_TOKEN" => Some("t"),
                "JENKINS_URL" => Some("http://ci.local"),
                "JENKINS_USER_NAME" => Some("u"),
                "JENKINS_USER_TOKEN" => Some("p"),
                "ALLOWED_CHATS" => Some("-100"),
                "SUDO_USERS" => Some("7"),
                _ => None,
            };
            value.map(str::to_string)
        })
        .unwrap();
        let client = JenkinsClient::new(settings.jenkins.clone()).unwrap();
        BotState::new(settings, Reconciler::new(client))
    }

    #[tokio::test]
    async fn test_restart_before_watcher_is_not_lost() {
        let state = std::sync::Arc::new(state());
        state.request_restart();

        let watcher = tokio::spawn({
            let state = state.clone();
            async move { state.restart_requested().await }
        });

        tokio::time::timeout(std::time::Duration::from_secs(1), watcher)
            .await
            .expect("restart watcher woke up")
            .unwrap();
    }
}
