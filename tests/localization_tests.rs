//! # Localization Tests
//!
//! Message retrieval, fallback and label translations across the embedded locales.

use flat_alerts::dialogue::{Menu, MenuAction};
use flat_alerts::localization::{t_lang, LocalizationManager};
use std::collections::HashMap;

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_localization() -> LocalizationManager {
        LocalizationManager::new()
    }

    #[test]
    fn test_get_message_existing_key() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("subscribed", "en", None);
        assert_eq!(message, "You have subscribed to notifications!");
    }

    #[test]
    fn test_get_message_nonexistent_key() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("nonexistent-key", "en", None);
        assert!(message.starts_with("Missing translation:"));
    }

    #[test]
    fn test_get_message_unsupported_language() {
        let manager = setup_localization();

        // Falls back to English
        let message = manager.get_message_in_language("subscribed", "unsupported", None);
        assert_eq!(message, "You have subscribed to notifications!");
    }

    #[test]
    fn test_get_message_with_args() {
        let manager = setup_localization();

        let mut args = HashMap::new();
        args.insert("title", "2-комнатная квартира");
        args.insert("price", "1 250,00 BYN");
        args.insert("metro", "Немига");
        args.insert("link", "https://re.kufar.by/vi/1");

        let message = manager.get_message_in_language("new-listing", "ru", Some(&args));
        assert!(message.contains("2-комнатная квартира"));
        assert!(message.contains("1 250,00 BYN"));
        assert!(message.contains("https://re.kufar.by/vi/1"));
    }

    #[test]
    fn test_every_menu_label_is_translated() {
        let manager = setup_localization();
        let menus = [
            Menu::Main,
            Menu::Filters,
            Menu::NearMetroChoice,
            Menu::Reset,
            Menu::BackOnly,
        ];

        for menu in menus {
            for action in menu.actions() {
                let translations = manager.translations(action.label_key());
                assert_eq!(translations.len(), 2);
                assert!(translations.iter().all(|t| !t.starts_with("Missing")));
            }
        }
    }

    #[test]
    fn test_labels_within_a_menu_are_distinct() {
        // Decoding relies on each label mapping to one action of the shown menu
        for menu in [Menu::Main, Menu::Filters, Menu::NearMetroChoice, Menu::Reset] {
            for language in ["en", "ru"] {
                let mut labels: Vec<String> = menu
                    .actions()
                    .map(|action| t_lang(action.label_key(), Some(language)))
                    .collect();
                let total = labels.len();
                labels.sort();
                labels.dedup();
                assert_eq!(labels.len(), total, "duplicate label in {menu:?} ({language})");
            }
        }
    }

    #[test]
    fn test_back_label() {
        assert_eq!(t_lang(MenuAction::Back.label_key(), Some("en")), "Back");
        assert_eq!(t_lang(MenuAction::Back.label_key(), Some("ru")), "Назад");
    }
}
