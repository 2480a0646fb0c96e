//! Bot module for handling Telegram interactions
//!
//! - `message_handler`: teloxide endpoint for text messages
//! - `dialogue_manager`: the menu conversation engine
//! - `ui_builder`: keyboards, label decoding and message rendering
//! - `notifier`: delivery of listing notifications

pub mod dialogue_manager;
pub mod message_handler;
pub mod notifier;
pub mod ui_builder;

pub use dialogue_manager::{handle_event, handle_unsupported_message, Reply, ReplyArg, Transition};
pub use message_handler::message_handler;
pub use notifier::TelegramNotifier;
pub use ui_builder::{create_menu_keyboard, decode_event, format_listing_message, render_reply};
