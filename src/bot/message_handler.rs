//! Message Handler module for processing incoming Telegram messages

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use tracing::{debug, warn};

use crate::dialogue::MenuDialogue;
use crate::store::Store;

use super::dialogue_manager::{handle_event, handle_unsupported_message};
use super::ui_builder::{create_menu_keyboard, decode_event, render_reply};

/// Entry point for every message update.
///
/// Updates from one chat arrive here one at a time, so the dialogue state read
/// at the top is still current when the new state is written back.
pub async fn message_handler(
    bot: Bot,
    msg: Message,
    dialogue: MenuDialogue,
    store: Arc<dyn Store>,
) -> Result<()> {
    let language_code = msg
        .from
        .as_ref()
        .and_then(|user| user.language_code.as_deref());

    let state = dialogue.get().await?.unwrap_or_default();

    let transition = match msg.text() {
        Some(text) => {
            let event = decode_event(text, &state);
            handle_event(store.as_ref(), msg.chat.id.0, state, event).await
        }
        None => {
            debug!(user_id = %msg.chat.id, "Non-text message, re-showing the menu");
            handle_unsupported_message(state)
        }
    };

    dialogue.update(transition.next).await?;

    for reply in &transition.replies {
        let text = render_reply(reply, language_code);
        let request = bot.send_message(msg.chat.id, text);
        let result = match reply.menu {
            Some(menu) => {
                request
                    .reply_markup(create_menu_keyboard(menu, language_code))
                    .await
            }
            None => request.await,
        };
        if let Err(e) = result {
            warn!(user_id = %msg.chat.id, error = %e, "Failed to send reply");
            return Err(e.into());
        }
    }

    Ok(())
}
