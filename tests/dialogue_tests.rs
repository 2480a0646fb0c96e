use anyhow::{Context, Result};

use flat_alerts::bot::{decode_event, handle_event, render_reply, Transition};
use flat_alerts::dialogue::{Event, Menu, MenuAction, MenuState};
use flat_alerts::listing_model::FilterCriteria;
use flat_alerts::store::{FilterStore, MemoryStore, SubscriberStore};

const CHAT: i64 = 4242;

/// Feed one typed message through decoding and the engine, the way the handler does
async fn send(store: &MemoryStore, state: MenuState, text: &str) -> Transition {
    let event = decode_event(text, &state);
    handle_event(store, CHAT, state, event).await
}

fn rendered(transition: &Transition, language: &str) -> Vec<String> {
    transition
        .replies
        .iter()
        .map(|reply| render_reply(reply, Some(language)))
        .collect()
}

/// Walk the price entry flow, including a rejected inverted range
#[tokio::test]
async fn test_price_filter_conversation() -> Result<()> {
    let store = MemoryStore::new();

    let t = send(&store, MenuState::MainMenu, "/start").await;
    assert_eq!(t.next, MenuState::MainMenu);

    let t = send(&store, t.next, "Set filter").await;
    assert_eq!(t.next, MenuState::FilterMenu);

    let t = send(&store, t.next, "Price").await;
    assert_eq!(t.next, MenuState::AwaitMinPrice);

    let t = send(&store, t.next, "500").await;
    assert_eq!(t.next, MenuState::AwaitMaxPrice { min_price: 500 });

    // Maximum below minimum: corrective message, back to the minimum prompt
    let t = send(&store, t.next, "400").await;
    assert_eq!(t.next, MenuState::AwaitMinPrice);
    assert_eq!(t.replies[0].key, "error-min-above-max");
    assert_eq!(store.get_filter(CHAT).await?, None);

    let t = send(&store, t.next, "300").await;
    let t = send(&store, t.next, "800").await;
    assert_eq!(t.next, MenuState::FilterMenu);
    assert_eq!(
        rendered(&t, "en"),
        vec![
            "Price filter set: 300-800 BYN.".to_string(),
            "Choose a filter to set:".to_string(),
        ]
    );
    assert_eq!(t.replies[1].menu, Some(Menu::Filters));

    let criteria = store.get_filter(CHAT).await?.context("filter should exist")?;
    assert_eq!(criteria.min_price, Some(300));
    assert_eq!(criteria.max_price, Some(800));

    Ok(())
}

#[tokio::test]
async fn test_subscribe_in_russian() -> Result<()> {
    let store = MemoryStore::new();

    let t = send(&store, MenuState::MainMenu, "Подписаться").await;
    assert_eq!(t.next, MenuState::MainMenu);
    assert_eq!(t.replies[0].key, "subscribed");
    assert_eq!(store.list_subscribers().await?, vec![CHAT]);

    // A second subscription does not duplicate the row
    send(&store, MenuState::MainMenu, "Subscribe").await;
    assert_eq!(store.list_subscribers().await?, vec![CHAT]);

    let t = send(&store, MenuState::MainMenu, "Отписаться").await;
    assert_eq!(t.replies[0].key, "unsubscribed");
    assert!(store.list_subscribers().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_rooms_metro_and_proximity_filters() -> Result<()> {
    let store = MemoryStore::new();

    let t = send(&store, MenuState::AwaitRooms, "0").await;
    assert_eq!(t.next, MenuState::AwaitRooms);
    assert_eq!(t.replies[0].key, "error-not-positive");

    let t = send(&store, MenuState::AwaitRooms, "2").await;
    assert_eq!(t.next, MenuState::FilterMenu);

    // An empty metro name re-prompts
    let t = send(&store, MenuState::AwaitMetro, "   ").await;
    assert_eq!(t.next, MenuState::AwaitMetro);
    assert_eq!(t.replies[0].key, "error-empty-input");

    let t = send(&store, MenuState::AwaitMetro, "  Немига ").await;
    assert_eq!(rendered(&t, "en")[0], "Metro station filter set: Немига");

    let t = send(&store, MenuState::AwaitNearMetro, "Near metro").await;
    assert_eq!(t.next, MenuState::FilterMenu);
    assert_eq!(rendered(&t, "en")[0], "Metro proximity filter set: Near metro");

    assert_eq!(
        store.get_filter(CHAT).await?,
        Some(FilterCriteria {
            rooms: Some(2),
            metro: Some("Немига".to_string()),
            near_metro: Some(true),
            ..Default::default()
        })
    );

    Ok(())
}

#[tokio::test]
async fn test_show_and_reset_filters() -> Result<()> {
    let store = MemoryStore::new();

    let t = send(&store, MenuState::MainMenu, "Show current filters").await;
    let summary = &rendered(&t, "en")[0];
    assert!(summary.contains("Minimum price: not set"));
    assert!(summary.contains("Metro proximity: not set"));

    send(&store, MenuState::AwaitRooms, "3").await;
    send(&store, MenuState::AwaitMetro, "Восток").await;

    let t = send(&store, MenuState::ResetMenu, "Reset rooms").await;
    assert_eq!(t.next, MenuState::ResetMenu);
    assert_eq!(t.replies[0].key, "reset-rooms-done");

    let t = send(&store, MenuState::MainMenu, "Show current filters").await;
    let summary = &rendered(&t, "en")[0];
    assert!(summary.contains("Rooms: not set"));
    assert!(summary.contains("Metro station: Восток"));

    let t = send(&store, MenuState::ResetMenu, "Reset all filters").await;
    assert_eq!(t.next, MenuState::MainMenu);
    assert_eq!(store.get_filter(CHAT).await?, None);

    Ok(())
}

#[tokio::test]
async fn test_navigation_and_unknown_input() {
    let store = MemoryStore::new();

    let t = send(&store, MenuState::FilterMenu, "Back").await;
    assert_eq!(t.next, MenuState::MainMenu);

    let t = send(&store, MenuState::MainMenu, "hello").await;
    assert_eq!(t.next, MenuState::MainMenu);
    assert_eq!(t.replies.len(), 1);
    assert_eq!(t.replies[0].key, "main-menu-prompt");

    let t = send(&store, MenuState::AwaitNearMetro, "maybe").await;
    assert_eq!(t.next, MenuState::AwaitNearMetro);
    assert_eq!(t.replies[0].key, "error-choose-option");

    let t = handle_event(&store, CHAT, MenuState::FilterMenu, Event::Action(MenuAction::Back)).await;
    assert_eq!(t.next, MenuState::MainMenu);
}
