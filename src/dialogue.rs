//! Filter menu dialogue module: conversation states, symbolic menu actions and input validation.

use serde::{Deserialize, Serialize};
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};

use crate::errors::InputError;

/// Longest metro station name accepted from a user
pub const MAX_METRO_LENGTH: usize = 100;

/// Represents the conversation state of one chat
///
/// The minimum price collected before the maximum is kept inside `AwaitMaxPrice`,
/// so it never outlives the dialogue and is lost on restart.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MenuState {
    #[default]
    MainMenu,
    FilterMenu,
    AwaitMinPrice,
    AwaitMaxPrice {
        min_price: i64,
    },
    AwaitRooms,
    AwaitMetro,
    AwaitNearMetro,
    ResetMenu,
}

/// Type alias for the menu dialogue
pub type MenuDialogue = Dialogue<MenuState, InMemStorage<MenuState>>;

/// Symbolic menu choices, decoded from button labels by the transport layer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MenuAction {
    Subscribe,
    Unsubscribe,
    OpenFilters,
    OpenReset,
    ShowFilters,
    PriceFilter,
    RoomsFilter,
    MetroFilter,
    NearMetroFilter,
    NearMetroRequired,
    NearMetroAny,
    ResetPrice,
    ResetRooms,
    ResetMetro,
    ResetNearMetro,
    ResetAll,
    Back,
}

impl MenuAction {
    /// Localization key of the button label for this action
    pub fn label_key(self) -> &'static str {
        match self {
            MenuAction::Subscribe => "button-subscribe",
            MenuAction::Unsubscribe => "button-unsubscribe",
            MenuAction::OpenFilters => "button-set-filter",
            MenuAction::OpenReset => "button-reset-filter",
            MenuAction::ShowFilters => "button-show-filters",
            MenuAction::PriceFilter => "button-price",
            MenuAction::RoomsFilter => "button-rooms",
            MenuAction::MetroFilter => "button-metro",
            MenuAction::NearMetroFilter => "button-near-metro",
            MenuAction::NearMetroRequired => "button-near-metro-required",
            MenuAction::NearMetroAny => "button-near-metro-any",
            MenuAction::ResetPrice => "button-reset-price",
            MenuAction::ResetRooms => "button-reset-rooms",
            MenuAction::ResetMetro => "button-reset-metro",
            MenuAction::ResetNearMetro => "button-reset-near-metro",
            MenuAction::ResetAll => "button-reset-all",
            MenuAction::Back => "button-back",
        }
    }
}

/// Keyboards the bot can show, described by the actions on each row
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Menu {
    Main,
    Filters,
    NearMetroChoice,
    Reset,
    /// Shown while waiting for typed input
    BackOnly,
}

impl Menu {
    pub fn rows(self) -> &'static [&'static [MenuAction]] {
        use MenuAction::*;
        match self {
            Menu::Main => &[&[Subscribe, Unsubscribe], &[OpenFilters, OpenReset], &[ShowFilters]],
            Menu::Filters => &[&[PriceFilter, RoomsFilter], &[MetroFilter, NearMetroFilter], &[Back]],
            Menu::NearMetroChoice => &[&[NearMetroRequired, NearMetroAny], &[Back]],
            Menu::Reset => &[
                &[ResetPrice, ResetRooms],
                &[ResetMetro, ResetNearMetro],
                &[ResetAll],
                &[Back],
            ],
            Menu::BackOnly => &[&[Back]],
        }
    }

    pub fn actions(self) -> impl Iterator<Item = MenuAction> {
        self.rows().iter().flat_map(|row| row.iter().copied())
    }
}

impl MenuState {
    /// The keyboard shown while the chat is in this state
    pub fn menu(&self) -> Menu {
        match self {
            MenuState::MainMenu => Menu::Main,
            MenuState::FilterMenu => Menu::Filters,
            MenuState::AwaitNearMetro => Menu::NearMetroChoice,
            MenuState::ResetMenu => Menu::Reset,
            MenuState::AwaitMinPrice
            | MenuState::AwaitMaxPrice { .. }
            | MenuState::AwaitRooms
            | MenuState::AwaitMetro => Menu::BackOnly,
        }
    }

    /// Localization key of the prompt shown on entering this state
    pub fn prompt_key(&self) -> &'static str {
        match self {
            MenuState::MainMenu => "main-menu-prompt",
            MenuState::FilterMenu => "filter-menu-prompt",
            MenuState::AwaitMinPrice => "prompt-min-price",
            MenuState::AwaitMaxPrice { .. } => "prompt-max-price",
            MenuState::AwaitRooms => "prompt-rooms",
            MenuState::AwaitMetro => "prompt-metro",
            MenuState::AwaitNearMetro => "near-metro-prompt",
            MenuState::ResetMenu => "reset-menu-prompt",
        }
    }
}

/// One inbound event as seen by the conversation engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// The explicit start command, accepted in every state
    Start,
    Action(MenuAction),
    /// Free text that is not a label of the current menu
    Text(String),
}

/// Parses a price typed by the user; spaces between digit groups are allowed
pub fn parse_price(input: &str) -> Result<i64, InputError> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(InputError::Empty);
    }
    let value: i64 = compact.parse().map_err(|_| InputError::NotANumber)?;
    if value < 0 {
        return Err(InputError::Negative);
    }
    Ok(value)
}

/// Checks that a held minimum does not exceed the entered maximum
pub fn validate_price_range(min_price: i64, max_price: i64) -> Result<(), InputError> {
    if min_price > max_price {
        return Err(InputError::MinAboveMax {
            min: min_price,
            max: max_price,
        });
    }
    Ok(())
}

/// Parses a room count typed by the user
pub fn parse_rooms(input: &str) -> Result<i32, InputError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(InputError::Empty);
    }
    let rooms: i32 = trimmed.parse().map_err(|_| InputError::NotANumber)?;
    if rooms <= 0 {
        return Err(InputError::NotPositive);
    }
    Ok(rooms)
}

/// Validates a metro station name
pub fn validate_metro(input: &str) -> Result<String, InputError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(InputError::Empty);
    }

    if trimmed.chars().count() > MAX_METRO_LENGTH {
        return Err(InputError::TooLong);
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("500"), Ok(500));
        assert_eq!(parse_price("  1 200 "), Ok(1200));
        assert_eq!(parse_price("0"), Ok(0));
        assert_eq!(parse_price("five hundred"), Err(InputError::NotANumber));
        assert_eq!(parse_price("12.5"), Err(InputError::NotANumber));
        assert_eq!(parse_price("-1"), Err(InputError::Negative));
        assert_eq!(parse_price("   "), Err(InputError::Empty));
    }

    #[test]
    fn test_validate_price_range() {
        assert!(validate_price_range(300, 800).is_ok());
        assert!(validate_price_range(500, 500).is_ok());
        assert_eq!(
            validate_price_range(500, 400),
            Err(InputError::MinAboveMax { min: 500, max: 400 })
        );
    }

    #[test]
    fn test_parse_rooms() {
        assert_eq!(parse_rooms("2"), Ok(2));
        assert_eq!(parse_rooms("0"), Err(InputError::NotPositive));
        assert_eq!(parse_rooms("two"), Err(InputError::NotANumber));
    }

    #[test]
    fn test_metro_validation_and_trimming() {
        assert_eq!(validate_metro("  Немига  "), Ok("Немига".to_string()));
        assert_eq!(validate_metro(""), Err(InputError::Empty));
        assert_eq!(validate_metro(&"м".repeat(101)), Err(InputError::TooLong));
    }

    #[test]
    fn test_input_states_only_offer_back() {
        for state in [MenuState::AwaitMinPrice, MenuState::AwaitMaxPrice { min_price: 1 }, MenuState::AwaitMetro] {
            assert_eq!(state.menu().actions().collect::<Vec<_>>(), vec![MenuAction::Back]);
        }
        assert!(MenuState::MainMenu.menu().actions().all(|a| a != MenuAction::Back));
    }

    #[test]
    fn test_default_state_is_main_menu() {
        assert_eq!(MenuState::default(), MenuState::MainMenu);
    }
}
