//! UI Builder module for creating keyboards and formatting messages

use teloxide::types::{KeyboardButton, KeyboardMarkup};

use crate::dialogue::{Event, Menu, MenuState};
use crate::listing_filter::format_price;
use crate::listing_model::RawListing;
use crate::localization::{get_localization_manager, t_args_lang, t_lang};

use super::dialogue_manager::{Reply, ReplyArg};

/// Command that restarts the conversation from the main menu
pub const START_COMMAND: &str = "/start";

/// Create the reply keyboard for a menu
pub fn create_menu_keyboard(menu: Menu, language_code: Option<&str>) -> KeyboardMarkup {
    let rows: Vec<Vec<KeyboardButton>> = menu
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .map(|action| KeyboardButton::new(t_lang(action.label_key(), language_code)))
                .collect()
        })
        .collect();

    KeyboardMarkup::new(rows).resize_keyboard()
}

/// Turn inbound text into an engine event.
///
/// Only labels of the keyboard shown in `state` are decoded, in any supported
/// language, so a metro station that happens to match another menu's label is
/// still taken as typed text.
pub fn decode_event(text: &str, state: &MenuState) -> Event {
    let text = text.trim();

    // "/start" and "/start@bot_name"
    if text
        .split_whitespace()
        .next()
        .is_some_and(|command| command.split('@').next() == Some(START_COMMAND))
    {
        return Event::Start;
    }

    let manager = get_localization_manager();
    state
        .menu()
        .actions()
        .find(|action| {
            manager
                .translations(action.label_key())
                .iter()
                .any(|label| label == text)
        })
        .map(Event::Action)
        .unwrap_or_else(|| Event::Text(text.to_string()))
}

/// Render an engine reply in the user's language
pub fn render_reply(reply: &Reply, language_code: Option<&str>) -> String {
    if reply.args.is_empty() {
        return t_lang(reply.key, language_code);
    }

    let values: Vec<(&str, String)> = reply
        .args
        .iter()
        .map(|(name, value)| {
            let value = match value {
                ReplyArg::Text(text) => text.clone(),
                ReplyArg::Key(key) => t_lang(key, language_code),
            };
            (*name, value)
        })
        .collect();
    let args: Vec<(&str, &str)> = values
        .iter()
        .map(|(name, value)| (*name, value.as_str()))
        .collect();

    t_args_lang(reply.key, &args, language_code)
}

/// Format a new-listing notification
pub fn format_listing_message(listing: &RawListing, language_code: Option<&str>) -> String {
    let price = format_price(&listing.price);
    let metro = match listing.metro_label.as_deref().map(str::trim) {
        Some(label) if !label.is_empty() => label.to_string(),
        _ => t_lang("metro-not-specified", language_code),
    };

    t_args_lang(
        "new-listing",
        &[
            ("title", listing.title.as_str()),
            ("price", price.as_str()),
            ("metro", metro.as_str()),
            ("link", listing.link.as_str()),
        ],
        language_code,
    )
}
