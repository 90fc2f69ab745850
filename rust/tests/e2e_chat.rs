use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tempfile::tempdir;
use toshi_core::*;

fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

const TIMEOUT: Duration = Duration::from_secs(10);

struct Collector {
    updates: Arc<Mutex<Vec<ChatUpdate>>>,
}

impl ChatReconciler for Collector {
    fn reconcile(&self, update: ChatUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

fn open_chat(store: &Arc<ChatStore>, thread_id: &str) -> (Arc<FfiChat>, Arc<Mutex<Vec<ChatUpdate>>>) {
    let chat = FfiChat::new(store.clone(), thread_id.to_string()).unwrap();
    let updates = Arc::new(Mutex::new(Vec::<ChatUpdate>::new()));
    chat.listen_for_updates(Box::new(Collector {
        updates: updates.clone(),
    }));
    (chat, updates)
}

fn write_config(data_dir: &str, json: &str) {
    std::fs::write(std::path::Path::new(data_dir).join("chat_config.json"), json).unwrap();
}

fn record(id: &str, ts: i64, body: &str, direction: MessageDirection) -> RawRecord {
    RawRecord {
        unique_id: id.into(),
        thread_id: "thread-1".into(),
        timestamp: ts,
        author: match direction {
            MessageDirection::Incoming => "0xpeer".into(),
            MessageDirection::Outgoing => "0xme".into(),
        },
        body: body.into(),
        has_attachments: false,
        direction,
        delivery: match direction {
            MessageDirection::Incoming => MessageDeliveryState::Delivered,
            MessageDirection::Outgoing => MessageDeliveryState::Pending,
        },
        was_read: direction == MessageDirection::Outgoing,
    }
}

fn position(updates: &[ChatUpdate], f: impl Fn(&ChatUpdate) -> bool) -> Option<usize> {
    updates.iter().position(f)
}

#[test]
fn plain_text_insert_reloads_then_signals_last_message() {
    let dir = tempdir().unwrap();
    let store = ChatStore::open(dir.path().to_string_lossy().to_string()).unwrap();
    for i in 0..3 {
        store
            .upsert_record(record(&format!("old-{i}"), 100 + i, "earlier", MessageDirection::Outgoing))
            .unwrap();
    }
    let (chat, updates) = open_chat(&store, "thread-1");
    wait_until("initial load", TIMEOUT, || chat.state().messages.len() == 3);

    updates.lock().unwrap().clear();
    store
        .upsert_record(record("new", 500, "hello there", MessageDirection::Incoming))
        .unwrap();

    wait_until("reload then last message", TIMEOUT, || {
        let u = updates.lock().unwrap();
        let Some(reload) = position(&u, |x| {
            matches!(x, ChatUpdate::Reloaded(s) if s.messages.len() == 4)
        }) else {
            return false;
        };
        position(&u[reload..], |x| matches!(x, ChatUpdate::LastMessageReceived { .. })).is_some()
    });

    let state = chat.state();
    assert_eq!(state.messages[0].id, "new");
    assert_eq!(state.messages[0].kind, ChatMessageKind::Text);
    assert_eq!(state.messages[3].id, "old-0");

    let u = updates.lock().unwrap().clone();
    assert!(!u
        .iter()
        .any(|x| matches!(x, ChatUpdate::KeyboardVisibilityRequired { .. })));
    assert!(u.iter().any(|x| matches!(
        x,
        ChatUpdate::SoundRequested {
            sound: MessageSound::Received,
            ..
        }
    )));

    wait_until("incoming marked read", TIMEOUT, || {
        store
            .visible_messages("thread-1".into())
            .unwrap()
            .iter()
            .any(|m| m.id == "new" && m.was_read)
    });
}

#[test]
fn outgoing_delivery_update_keeps_payment_values() {
    let dir = tempdir().unwrap();
    let store = ChatStore::open(dir.path().to_string_lossy().to_string()).unwrap();
    let (chat, _updates) = open_chat(&store, "thread-1");
    chat.set_exchange_rate_provider(Box::new(FixedExchangeRate(300.0)));

    store
        .upsert_record(record(
            "pay-1",
            1_000,
            r#"SOFA::Payment:{"value":"0xde0b6b3a7640000","status":"unconfirmed"}"#,
            MessageDirection::Outgoing,
        ))
        .unwrap();

    wait_until("payment priced", TIMEOUT, || {
        chat.state()
            .messages
            .first()
            .is_some_and(|m| m.fiat_value.as_deref() == Some("$300.00 USD"))
    });
    let before = chat.state().messages[0].clone();
    assert_eq!(before.ether_value.as_deref(), Some("1.0000 ETH"));
    assert_eq!(before.delivery, MessageDeliveryState::Pending);

    store
        .set_delivery_state(
            "thread-1".into(),
            "pay-1".into(),
            MessageDeliveryState::Delivered,
        )
        .unwrap();

    wait_until("delivery updated", TIMEOUT, || {
        chat.state()
            .messages
            .first()
            .is_some_and(|m| m.delivery == MessageDeliveryState::Delivered)
    });
    let after = chat.state();
    assert_eq!(after.messages.len(), 1);
    assert_eq!(after.messages[0].kind, ChatMessageKind::Payment);
    assert_eq!(after.messages[0].fiat_value, before.fiat_value);
    assert_eq!(after.messages[0].ether_value, before.ether_value);
}

#[test]
fn control_message_requests_keyboard_update() {
    let dir = tempdir().unwrap();
    let store = ChatStore::open(dir.path().to_string_lossy().to_string()).unwrap();
    let (chat, updates) = open_chat(&store, "thread-1");

    let body = r#"SOFA::Message:{"body":"What next?","showKeyboard":false,"controls":[
        {"type":"button","label":"Balance","value":"balance"},
        {"type":"group","label":"More","controls":[{"type":"button","label":"Help","value":"help"}]}
    ]}"#;
    store
        .upsert_record(record("ctl", 10, body, MessageDirection::Incoming))
        .unwrap();

    wait_until("keyboard update", TIMEOUT, || {
        updates.lock().unwrap().iter().any(|u| {
            matches!(
                u,
                ChatUpdate::KeyboardVisibilityRequired { message_id, show_keyboard: Some(false), controls, .. }
                    if message_id == "ctl" && controls.len() == 2
            )
        })
    });
    wait_until("controls in state", TIMEOUT, || chat.state().controls.len() == 2);
    assert_eq!(chat.state().controls[1].subcontrols[0].label, "Help");
}

#[test]
fn control_taps_open_menus_and_send_commands() {
    let dir = tempdir().unwrap();
    let store = ChatStore::open(dir.path().to_string_lossy().to_string()).unwrap();
    let (chat, updates) = open_chat(&store, "thread-1");

    let group = ControlButton {
        kind: ControlKind::Group,
        label: "More".into(),
        value: None,
        action: None,
        subcontrols: vec![Subcontrol {
            label: "Help".into(),
            value: Some("help".into()),
            action: None,
        }],
    };
    chat.dispatch(ChatAction::TapControl {
        control: group.clone(),
    });
    wait_until("menu shown", TIMEOUT, || {
        updates.lock().unwrap().iter().any(|u| {
            matches!(
                u,
                ChatUpdate::ControlMenuChanged {
                    display_state: DisplayState::Show,
                    ..
                }
            )
        })
    });
    assert_eq!(chat.state().selected_control, Some(group));

    chat.dispatch(ChatAction::TapControl {
        control: ControlButton {
            kind: ControlKind::Button,
            label: "Help".into(),
            value: Some("help".into()),
            action: None,
            subcontrols: vec![],
        },
    });
    wait_until("command sent and menu hidden", TIMEOUT, || {
        let state = chat.state();
        state.selected_control.is_none()
            && state
                .messages
                .iter()
                .any(|m| m.is_mine && m.kind == ChatMessageKind::Command && m.text == "Help")
    });
}

#[test]
fn send_message_appears_as_pending_outgoing() {
    let dir = tempdir().unwrap();
    let store = ChatStore::open(dir.path().to_string_lossy().to_string()).unwrap();
    let (chat, updates) = open_chat(&store, "thread-1");

    chat.dispatch(ChatAction::SendMessage {
        text: "  on my way  ".into(),
    });
    wait_until("sent message visible", TIMEOUT, || {
        chat.state().messages.iter().any(|m| {
            m.is_mine && m.text == "on my way" && m.delivery == MessageDeliveryState::Pending
        })
    });
    assert!(updates.lock().unwrap().iter().any(|u| matches!(
        u,
        ChatUpdate::SoundRequested {
            sound: MessageSound::Sent,
            ..
        }
    )));
}

#[test]
fn drafts_round_trip_through_the_editor() {
    let dir = tempdir().unwrap();
    let store = ChatStore::open(dir.path().to_string_lossy().to_string()).unwrap();
    let (chat, updates) = open_chat(&store, "thread-1");

    chat.dispatch(ChatAction::SaveDraft {
        text: Some("half a thought".into()),
    });
    wait_until("draft reloaded", TIMEOUT, || {
        chat.dispatch(ChatAction::ReloadDraft);
        updates.lock().unwrap().iter().any(|u| {
            matches!(u, ChatUpdate::DraftLoaded { draft: Some(d), .. } if d == "half a thought")
        })
    });

    // Reopening the thread sees the same draft.
    drop(chat);
    let (chat, updates) = open_chat(&store, "thread-1");
    chat.dispatch(ChatAction::ReloadDraft);
    wait_until("draft survives reopen", TIMEOUT, || {
        updates.lock().unwrap().iter().any(|u| {
            matches!(u, ChatUpdate::DraftLoaded { draft: Some(d), .. } if d == "half a thought")
        })
    });
}

#[test]
fn bulk_load_puts_attachment_first_on_timestamp_tie() {
    let dir = tempdir().unwrap();
    let store = ChatStore::open(dir.path().to_string_lossy().to_string()).unwrap();
    store
        .upsert_record(record("caption", 100, "look at this", MessageDirection::Incoming))
        .unwrap();
    let mut media = record("media", 100, "", MessageDirection::Incoming);
    media.has_attachments = true;
    store.upsert_record(media).unwrap();
    store
        .upsert_record(record("before", 50, "hi", MessageDirection::Incoming))
        .unwrap();

    let (chat, _updates) = open_chat(&store, "thread-1");
    wait_until("loaded", TIMEOUT, || chat.state().messages.len() == 3);

    // Newest first: the attachment sorts before its caption, so it shows below it.
    let ids: Vec<String> = chat.state().messages.into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec!["caption", "media", "before"]);
    assert_eq!(chat.visible_message(1).map(|m| m.id).as_deref(), Some("media"));
}

#[test]
fn incoming_payment_request_is_surfaced() {
    let dir = tempdir().unwrap();
    let store = ChatStore::open(dir.path().to_string_lossy().to_string()).unwrap();
    let (chat, updates) = open_chat(&store, "thread-1");

    store
        .upsert_record(record(
            "req",
            10,
            r#"SOFA::PaymentRequest:{"body":"lunch","value":"0x6f05b59d3b20000","destinationAddress":"0xpeer"}"#,
            MessageDirection::Incoming,
        ))
        .unwrap();

    wait_until("payment request", TIMEOUT, || {
        updates.lock().unwrap().iter().any(|u| {
            matches!(
                u,
                ChatUpdate::PaymentRequested { message_id, value_wei, destination_address, .. }
                    if message_id == "req" && value_wei == "0x6f05b59d3b20000" && destination_address == "0xpeer"
            )
        })
    });
    wait_until("request visible", TIMEOUT, || {
        chat.state()
            .messages
            .first()
            .is_some_and(|m| m.kind == ChatMessageKind::PaymentRequest && m.text == "lunch")
    });
}

#[test]
fn init_request_is_answered_from_config() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_string_lossy().to_string();
    write_config(&data_dir, r#"{"payment_address":"0xme","language":"en"}"#);
    let store = ChatStore::open(data_dir).unwrap();
    let (_chat, _updates) = open_chat(&store, "thread-1");

    let before = store.latest_commit().unwrap();
    store
        .upsert_record(record(
            "init-req",
            10,
            r#"SOFA::InitRequest:{"values":["paymentAddress","language"]}"#,
            MessageDirection::Incoming,
        ))
        .unwrap();

    let db = dir.path().join("chat_store.sqlite3");
    wait_until("init reply written", TIMEOUT, || {
        let conn = rusqlite::Connection::open(&db).unwrap();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM messages WHERE direction = 'outgoing' AND body LIKE 'SOFA::Init:%'",
                [],
                |row| row.get(0),
            )
            .ok();
        body.is_some_and(|b| b.contains("\"paymentAddress\":\"0xme\"") && b.contains("\"language\":\"en\""))
    });
    assert!(store.latest_commit().unwrap() > before + 1);
}

#[test]
fn other_threads_do_not_disturb_the_open_one() {
    let dir = tempdir().unwrap();
    let store = ChatStore::open(dir.path().to_string_lossy().to_string()).unwrap();
    let (chat, updates) = open_chat(&store, "thread-1");
    wait_until("initial reload", TIMEOUT, || {
        updates
            .lock()
            .unwrap()
            .iter()
            .any(|u| matches!(u, ChatUpdate::Reloaded(_)))
    });
    let reloads_before = updates
        .lock()
        .unwrap()
        .iter()
        .filter(|u| matches!(u, ChatUpdate::Reloaded(_)))
        .count();

    let mut elsewhere = record("x", 10, "elsewhere", MessageDirection::Incoming);
    elsewhere.thread_id = "thread-2".into();
    store.upsert_record(elsewhere).unwrap();
    store
        .upsert_record(record("here", 20, "here", MessageDirection::Incoming))
        .unwrap();

    wait_until("own message arrives", TIMEOUT, || {
        chat.state().messages.iter().any(|m| m.id == "here")
    });
    assert_eq!(chat.state().messages.len(), 1);
    assert!(
        updates
            .lock()
            .unwrap()
            .iter()
            .filter(|u| matches!(u, ChatUpdate::Reloaded(_)))
            .count()
            > reloads_before
    );
}
