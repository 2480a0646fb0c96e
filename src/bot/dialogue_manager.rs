//! Dialogue Manager module: the menu conversation engine
//!
//! Maps `(state, event)` to the next state and the replies to send. Replies are
//! localization keys plus arguments, so the engine never touches Telegram or a
//! particular language and can be driven directly from tests.

use tracing::{debug, error, info};

use crate::dialogue::{
    parse_price, parse_rooms, validate_metro, validate_price_range, Event, Menu, MenuAction,
    MenuState,
};
use crate::errors::InputError;
use crate::listing_model::{FilterCriteria, FilterField, FilterUpdate};
use crate::store::{FilterStore, Store, SubscriberStore};

/// Value substituted into a localized message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyArg {
    /// Shown as is
    Text(String),
    /// Another localization key, resolved in the reader's language
    Key(&'static str),
}

/// One outbound message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub key: &'static str,
    pub args: Vec<(&'static str, ReplyArg)>,
    /// Keyboard attached to the message, if it changes
    pub menu: Option<Menu>,
}

/// Result of handling one event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub next: MenuState,
    pub replies: Vec<Reply>,
}

impl Transition {
    fn to(next: MenuState) -> Self {
        Self {
            next,
            replies: Vec::new(),
        }
    }

    fn say(self, key: &'static str) -> Self {
        self.say_with(key, Vec::new())
    }

    fn say_with(mut self, key: &'static str, args: Vec<(&'static str, ReplyArg)>) -> Self {
        self.replies.push(Reply {
            key,
            args,
            menu: None,
        });
        self
    }

    /// Append the prompt and keyboard of the next state
    fn prompt(mut self) -> Self {
        self.replies.push(Reply {
            key: self.next.prompt_key(),
            args: Vec::new(),
            menu: Some(self.next.menu()),
        });
        self
    }

    /// Corrective message, then the same state again
    fn reject(state: MenuState, err: &InputError) -> Self {
        Self::to(state).say(err.message_key()).prompt()
    }

    /// Storage failure: report it and keep the current state
    fn storage_failure(state: MenuState) -> Self {
        Self::to(state).say("error-storage").prompt()
    }
}

/// Handle one inbound event for a chat.
///
/// Never fails: input problems become corrective replies and store failures
/// are logged and reported to the user while the state is kept.
pub async fn handle_event(
    store: &dyn Store,
    chat_id: i64,
    state: MenuState,
    event: Event,
) -> Transition {
    debug!(user_id = chat_id, ?state, ?event, "Handling dialogue event");

    if event == Event::Start {
        return Transition::to(MenuState::MainMenu).say("welcome").prompt();
    }

    match state {
        MenuState::MainMenu => handle_main_menu(store, chat_id, event).await,
        MenuState::FilterMenu => handle_filter_menu(event),
        MenuState::AwaitMinPrice => handle_min_price_input(event),
        MenuState::AwaitMaxPrice { min_price } => {
            handle_max_price_input(store, chat_id, min_price, event).await
        }
        MenuState::AwaitRooms => handle_rooms_input(store, chat_id, event).await,
        MenuState::AwaitMetro => handle_metro_input(store, chat_id, event).await,
        MenuState::AwaitNearMetro => handle_near_metro_choice(store, chat_id, event).await,
        MenuState::ResetMenu => handle_reset_menu(store, chat_id, event).await,
    }
}

/// Reply to a message that carries no text: ask for a menu choice and show the menu again
pub fn handle_unsupported_message(state: MenuState) -> Transition {
    Transition::to(state).say("error-choose-option").prompt()
}

async fn handle_main_menu(store: &dyn Store, chat_id: i64, event: Event) -> Transition {
    let here = MenuState::MainMenu;
    match event {
        Event::Action(MenuAction::Subscribe) => match store.add_subscriber(chat_id).await {
            Ok(inserted) => {
                info!(user_id = chat_id, inserted, "User subscribed");
                Transition::to(here).say("subscribed").prompt()
            }
            Err(e) => {
                error!(user_id = chat_id, error = %e, "Failed to subscribe user");
                Transition::storage_failure(here)
            }
        },
        Event::Action(MenuAction::Unsubscribe) => match store.remove_subscriber(chat_id).await {
            Ok(removed) => {
                info!(user_id = chat_id, removed, "User unsubscribed");
                Transition::to(here).say("unsubscribed").prompt()
            }
            Err(e) => {
                error!(user_id = chat_id, error = %e, "Failed to unsubscribe user");
                Transition::storage_failure(here)
            }
        },
        Event::Action(MenuAction::OpenFilters) => Transition::to(MenuState::FilterMenu).prompt(),
        Event::Action(MenuAction::OpenReset) => Transition::to(MenuState::ResetMenu).prompt(),
        Event::Action(MenuAction::ShowFilters) => match store.get_filter(chat_id).await {
            Ok(criteria) => Transition::to(here)
                .say_with("filters-summary", summary_args(criteria.as_ref()))
                .prompt(),
            Err(e) => {
                error!(user_id = chat_id, error = %e, "Failed to read filters");
                Transition::storage_failure(here)
            }
        },
        _ => Transition::to(here).prompt(),
    }
}

fn handle_filter_menu(event: Event) -> Transition {
    let next = match event {
        Event::Action(MenuAction::PriceFilter) => MenuState::AwaitMinPrice,
        Event::Action(MenuAction::RoomsFilter) => MenuState::AwaitRooms,
        Event::Action(MenuAction::MetroFilter) => MenuState::AwaitMetro,
        Event::Action(MenuAction::NearMetroFilter) => MenuState::AwaitNearMetro,
        Event::Action(MenuAction::Back) => MenuState::MainMenu,
        _ => MenuState::FilterMenu,
    };
    Transition::to(next).prompt()
}

/// Typed text for a value prompt, or `None` when the user went back
fn typed_text(event: Event) -> Option<String> {
    match event {
        Event::Action(MenuAction::Back) => None,
        Event::Text(text) => Some(text),
        // Other labels are not valid values; validation rejects them
        Event::Action(_) | Event::Start => Some(String::new()),
    }
}

fn handle_min_price_input(event: Event) -> Transition {
    let Some(text) = typed_text(event) else {
        return Transition::to(MenuState::FilterMenu).prompt();
    };

    match parse_price(&text) {
        Ok(min_price) => Transition::to(MenuState::AwaitMaxPrice { min_price }).prompt(),
        Err(e) => Transition::reject(MenuState::AwaitMinPrice, &e),
    }
}

async fn handle_max_price_input(
    store: &dyn Store,
    chat_id: i64,
    min_price: i64,
    event: Event,
) -> Transition {
    let here = MenuState::AwaitMaxPrice { min_price };
    let Some(text) = typed_text(event) else {
        return Transition::to(MenuState::FilterMenu).prompt();
    };

    let max_price = match parse_price(&text) {
        Ok(max_price) => max_price,
        Err(e) => return Transition::reject(here, &e),
    };

    if let Err(e) = validate_price_range(min_price, max_price) {
        // Start the range over from the minimum
        return Transition::reject(MenuState::AwaitMinPrice, &e);
    }

    let update = FilterUpdate::PriceRange {
        min_price,
        max_price,
    };
    match store.update_filter(chat_id, &update).await {
        Ok(()) => {
            info!(user_id = chat_id, min_price, max_price, "Price filter set");
            Transition::to(MenuState::FilterMenu)
                .say_with(
                    "price-filter-set",
                    vec![
                        ("min", ReplyArg::Text(min_price.to_string())),
                        ("max", ReplyArg::Text(max_price.to_string())),
                    ],
                )
                .prompt()
        }
        Err(e) => {
            error!(user_id = chat_id, error = %e, "Failed to save price filter");
            Transition::storage_failure(here)
        }
    }
}

async fn handle_rooms_input(store: &dyn Store, chat_id: i64, event: Event) -> Transition {
    let Some(text) = typed_text(event) else {
        return Transition::to(MenuState::FilterMenu).prompt();
    };

    let rooms = match parse_rooms(&text) {
        Ok(rooms) => rooms,
        Err(e) => return Transition::reject(MenuState::AwaitRooms, &e),
    };

    match store.update_filter(chat_id, &FilterUpdate::Rooms(rooms)).await {
        Ok(()) => Transition::to(MenuState::FilterMenu)
            .say_with(
                "rooms-filter-set",
                vec![("rooms", ReplyArg::Text(rooms.to_string()))],
            )
            .prompt(),
        Err(e) => {
            error!(user_id = chat_id, error = %e, "Failed to save rooms filter");
            Transition::storage_failure(MenuState::AwaitRooms)
        }
    }
}

async fn handle_metro_input(store: &dyn Store, chat_id: i64, event: Event) -> Transition {
    let Some(text) = typed_text(event) else {
        return Transition::to(MenuState::FilterMenu).prompt();
    };

    let metro = match validate_metro(&text) {
        Ok(metro) => metro,
        Err(e) => return Transition::reject(MenuState::AwaitMetro, &e),
    };

    match store
        .update_filter(chat_id, &FilterUpdate::Metro(metro.clone()))
        .await
    {
        Ok(()) => Transition::to(MenuState::FilterMenu)
            .say_with("metro-filter-set", vec![("metro", ReplyArg::Text(metro))])
            .prompt(),
        Err(e) => {
            error!(user_id = chat_id, error = %e, "Failed to save metro filter");
            Transition::storage_failure(MenuState::AwaitMetro)
        }
    }
}

async fn handle_near_metro_choice(store: &dyn Store, chat_id: i64, event: Event) -> Transition {
    let here = MenuState::AwaitNearMetro;
    let near_metro = match event {
        Event::Action(MenuAction::NearMetroRequired) => true,
        Event::Action(MenuAction::NearMetroAny) => false,
        Event::Action(MenuAction::Back) => return Transition::to(MenuState::FilterMenu).prompt(),
        _ => return Transition::to(here).say("error-choose-option").prompt(),
    };

    match store
        .update_filter(chat_id, &FilterUpdate::NearMetro(near_metro))
        .await
    {
        Ok(()) => Transition::to(MenuState::FilterMenu)
            .say_with(
                "near-metro-filter-set",
                vec![("choice", ReplyArg::Key(near_metro_key(Some(near_metro))))],
            )
            .prompt(),
        Err(e) => {
            error!(user_id = chat_id, error = %e, "Failed to save metro proximity filter");
            Transition::storage_failure(here)
        }
    }
}

async fn handle_reset_menu(store: &dyn Store, chat_id: i64, event: Event) -> Transition {
    let here = MenuState::ResetMenu;
    let (field, done_key) = match event {
        Event::Action(MenuAction::ResetPrice) => (FilterField::Price, "reset-price-done"),
        Event::Action(MenuAction::ResetRooms) => (FilterField::Rooms, "reset-rooms-done"),
        Event::Action(MenuAction::ResetMetro) => (FilterField::Metro, "reset-metro-done"),
        Event::Action(MenuAction::ResetNearMetro) => {
            (FilterField::NearMetro, "reset-near-metro-done")
        }
        Event::Action(MenuAction::ResetAll) => {
            return match store.delete_filter(chat_id).await {
                Ok(_) => Transition::to(MenuState::MainMenu)
                    .say("reset-all-done")
                    .prompt(),
                Err(e) => {
                    error!(user_id = chat_id, error = %e, "Failed to delete filters");
                    Transition::storage_failure(here)
                }
            };
        }
        Event::Action(MenuAction::Back) => return Transition::to(MenuState::MainMenu).prompt(),
        _ => return Transition::to(here).say("error-choose-option").prompt(),
    };

    match store.reset_filter_field(chat_id, field).await {
        Ok(()) => Transition::to(here).say(done_key).prompt(),
        Err(e) => {
            error!(user_id = chat_id, ?field, error = %e, "Failed to reset filter field");
            Transition::storage_failure(here)
        }
    }
}

fn near_metro_key(near_metro: Option<bool>) -> &'static str {
    match near_metro {
        Some(true) => "near-metro-required",
        Some(false) => "near-metro-any",
        None => "filters-not-set",
    }
}

/// Arguments for the filters summary; absent fields render as "not set"
fn summary_args(criteria: Option<&FilterCriteria>) -> Vec<(&'static str, ReplyArg)> {
    let empty = FilterCriteria::default();
    let criteria = criteria.unwrap_or(&empty);
    let or_not_set = |value: Option<String>| match value {
        Some(value) => ReplyArg::Text(value),
        None => ReplyArg::Key("filters-not-set"),
    };

    vec![
        ("min_price", or_not_set(criteria.min_price.map(|v| v.to_string()))),
        ("max_price", or_not_set(criteria.max_price.map(|v| v.to_string()))),
        ("rooms", or_not_set(criteria.rooms.map(|v| v.to_string()))),
        ("metro", or_not_set(criteria.metro.clone())),
        ("near_metro", ReplyArg::Key(near_metro_key(criteria.near_metro))),
    ]
}
