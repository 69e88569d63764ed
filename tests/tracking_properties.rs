//! Property tests for change coalescing and template rendering.

mod common;

use activity_streams::{render, Context, Engine, EngineConfig, Observed, TrackingProfile};
use common::Ticket;
use proptest::prelude::*;

fn tracked(ticket: Ticket) -> Observed<Ticket> {
    let engine = Engine::in_memory(EngineConfig::default());
    engine
        .tracking()
        .enable(TrackingProfile::new("ticket").exclude("title"));
    engine.attach(ticket).unwrap()
}

fn status() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("open".to_string()),
        Just("closed".to_string()),
        Just("waiting".to_string()),
        "[a-z]{1,6}",
    ]
}

proptest! {
    #[test]
    fn writes_coalesce_to_first_before_and_last_after(writes in prop::collection::vec(status(), 1..12)) {
        let mut ticket = tracked(Ticket::new(1, "T"));
        for value in &writes {
            ticket.set("status", |t| &mut t.status, value.clone());
        }

        let last = writes.last().unwrap();
        let changes = ticket.flush();
        if last == "open" {
            prop_assert!(changes.is_empty());
        } else {
            prop_assert_eq!(changes.len(), 1);
            let change = changes.get("status").unwrap();
            prop_assert_eq!(change.old.as_str(), "open");
            prop_assert_eq!(&change.new, last);
        }
        prop_assert!(!ticket.is_dirty());
    }

    #[test]
    fn unsaved_entities_never_record(writes in prop::collection::vec(0u8..10, 1..8)) {
        let mut fresh = Ticket::new(1, "T");
        fresh.id = None;
        let mut ticket = tracked(fresh);
        for value in writes {
            ticket.set("priority", |t| &mut t.priority, value);
        }
        prop_assert!(ticket.flush().is_empty());
    }

    #[test]
    fn excluded_fields_never_record(title in "[A-Za-z ]{0,20}") {
        let mut ticket = tracked(Ticket::new(1, "T"));
        ticket.set("title", |t| &mut t.title, title.clone());
        prop_assert!(ticket.flush().is_empty());
        prop_assert_eq!(&ticket.title, &title);
    }

    #[test]
    fn brace_free_text_renders_unchanged(text in "[^{}]{0,40}") {
        let context = Context::new().with("name", "x");
        prop_assert_eq!(render(&text, &context), text);
    }

    #[test]
    fn placeholders_take_context_values(name in "[a-z]{1,8}", value in "[^{}]{0,12}") {
        let context = Context::new().with(name.clone(), value.clone());
        let template = format!("<{{{}}}>", name);
        prop_assert_eq!(render(&template, &context), format!("<{}>", value));
    }
}
