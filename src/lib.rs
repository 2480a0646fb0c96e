//! # Flat Alerts Telegram Bot
//!
//! A Telegram bot that lets users describe the rental flats they want through
//! reply-keyboard menus, polls a listing source on a fixed interval and sends
//! each subscriber the matching listings they have not been sent before.

pub mod bot;
pub mod config;
pub mod db;
pub mod dialogue;
pub mod errors;
pub mod kufar;
pub mod listing_filter;
pub mod listing_model;
pub mod localization;
pub mod pipeline;
pub mod scheduler;
pub mod store;
