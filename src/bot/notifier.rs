//! Telegram delivery for listing notifications

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;

use crate::pipeline::Notifier;

/// Sends notifications through the Bot API
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .context("Failed to send notification")?;
        Ok(())
    }
}
