//! Tests for the server dispatch core

use super::*;
use crate::drivers::KeyInjector;
use crate::ir::Packet;
use crate::keymap::Keymap;
use std::sync::{Arc, Mutex};

/// Injector that records every key it is asked to press.
struct RecordingInjector {
    keys: Arc<Mutex<Vec<String>>>,
}

impl KeyInjector for RecordingInjector {
    fn key_press(&mut self, key: &str) -> bool {
        self.keys.lock().unwrap().push(key.to_string());
        true
    }
}

fn make_server() -> (Server, Arc<Mutex<Vec<String>>>) {
    let mut server = Server::new(AppConfig::default()).unwrap();
    let keys = Arc::new(Mutex::new(Vec::new()));
    server.set_injector(Box::new(RecordingInjector { keys: keys.clone() }));
    (server, keys)
}

fn register_play_button(server: &mut Server) {
    server
        .dict
        .insert("play", Packet::from_widths(&[100, 50, 100]));
    let mut km = Keymap::new("tv");
    km.bind("play", vec![Action::Keypress("p".into())]);
    server.keymaps.register(km);
}

/// Encode widths as the receiver would send them, with an end marker.
fn receiver_bytes(widths: &[u16]) -> Vec<u8> {
    let mut bytes: Vec<u8> = widths.iter().flat_map(|w| w.to_be_bytes()).collect();
    bytes.extend_from_slice(&[0xFF, 0xFF]);
    bytes
}

#[tokio::test]
async fn received_packet_dispatches_through_keymap() {
    let (mut server, keys) = make_server();
    register_play_button(&mut server);

    server
        .on_ir_bytes(&receiver_bytes(&[100, 50, 100]))
        .await
        .unwrap();

    assert_eq!(*keys.lock().unwrap(), vec!["p"]);
}

#[tokio::test]
async fn jittered_shape_still_matches() {
    let (mut server, keys) = make_server();
    register_play_button(&mut server);

    server
        .on_ir_bytes(&receiver_bytes(&[101, 49, 100]))
        .await
        .unwrap();

    assert_eq!(*keys.lock().unwrap(), vec!["p"]);
}

#[tokio::test]
async fn rapid_duplicate_press_is_debounced() {
    let (mut server, keys) = make_server();
    register_play_button(&mut server);

    let bytes = receiver_bytes(&[100, 50, 100]);
    server.on_ir_bytes(&bytes).await.unwrap();
    server.on_ir_bytes(&bytes).await.unwrap();

    assert_eq!(*keys.lock().unwrap(), vec!["p"]);
}

#[tokio::test]
async fn unknown_packet_is_soft_ignored() {
    let (mut server, keys) = make_server();
    register_play_button(&mut server);

    server
        .on_ir_bytes(&receiver_bytes(&[9, 9, 9, 9]))
        .await
        .unwrap();

    assert!(keys.lock().unwrap().is_empty());
}

#[tokio::test]
async fn fallback_digit_prefers_multitap_over_raw_key() {
    let (mut server, keys) = make_server();

    // No keymap binds dvd_5 and no frontend peer is connected, so the
    // chain reaches multi-tap, which types the first letter of the 5 cycle.
    let handled = server.handle_symbol("dvd_5").await.unwrap();

    assert!(handled);
    assert_eq!(*keys.lock().unwrap(), vec!["j"]);
}

#[tokio::test]
async fn fallback_navigation_injects_arrow_key() {
    let (mut server, keys) = make_server();

    let handled = server.handle_symbol("dvdrw_left").await.unwrap();

    assert!(handled);
    assert_eq!(*keys.lock().unwrap(), vec!["left"]);
}

#[tokio::test]
async fn unknown_symbol_is_unhandled() {
    let (mut server, keys) = make_server();
    assert!(!server.handle_symbol("teleport").await.unwrap());
    assert!(keys.lock().unwrap().is_empty());
}

#[tokio::test]
async fn keymap_actions_run_in_order() {
    let (mut server, keys) = make_server();
    let mut km = Keymap::new("macros");
    km.bind(
        "combo",
        vec![
            Action::Keypress("a".into()),
            Action::Keypress("b".into()),
        ],
    );
    server.keymaps.register(km);

    server.handle_symbol("combo").await.unwrap();

    assert_eq!(*keys.lock().unwrap(), vec!["a", "b"]);
}

#[tokio::test]
async fn set_keymap_action_switches_current() {
    let (mut server, keys) = make_server();
    let mut tv = Keymap::new("tv");
    tv.bind("ok", vec![Action::Keypress("enter".into())]);
    server.keymaps.register(tv);
    let mut dvd = Keymap::new("dvd");
    dvd.bind("watch_tv", vec![Action::SetKeymap("tv".into())]);
    server.keymaps.register(dvd);

    assert_eq!(server.keymaps.current_name(), Some("dvd"));
    server.handle_symbol("watch_tv").await.unwrap();
    assert_eq!(server.keymaps.current_name(), Some("tv"));

    // The new keymap handles the next press.
    server.handle_symbol("ok").await.unwrap();
    assert_eq!(*keys.lock().unwrap(), vec!["enter"]);
}

#[tokio::test]
async fn switching_to_unregistered_keymap_is_fatal() {
    let (mut server, _keys) = make_server();
    let mut km = Keymap::new("tv");
    km.bind("broken", vec![Action::SetKeymap("ghost".into())]);
    server.keymaps.register(km);

    assert!(server.handle_symbol("broken").await.is_err());
}

#[tokio::test]
async fn inheritance_loop_is_fatal_at_dispatch() {
    let (mut server, _keys) = make_server();
    let mut a = Keymap::new("a");
    a.inherit = Some("b".into());
    let mut b = Keymap::new("b");
    b.inherit = Some("a".into());
    server.keymaps.register(b);
    server.keymaps.register(a);

    assert!(server.handle_symbol("anything").await.is_err());
}

#[tokio::test]
async fn transmit_without_device_still_resolves_packet() {
    let (mut server, _keys) = make_server();
    let packet = Packet::from_widths(&[10, 20, 30]);
    server.dict.insert("power", packet.clone());

    assert_eq!(server.transmit_symbol("power").unwrap(), Some(packet));
    assert_eq!(server.transmit_symbol("ghost").unwrap(), None);
}

#[tokio::test]
async fn command_line_updates_unknown_label() {
    let (mut server, _keys) = make_server();
    server.handle_command_line(999, "=MYSTERY").await.unwrap();
    assert_eq!(server.unknown_label, "MYSTERY");
}

#[tokio::test]
async fn command_line_dispatches_bare_symbol() {
    let (mut server, keys) = make_server();
    register_play_button(&mut server);

    // Reply write fails silently (no such connection in this test), but the
    // dispatch itself must happen.
    server.handle_command_line(999, "play").await.unwrap();
    assert_eq!(*keys.lock().unwrap(), vec!["p"]);
}

#[tokio::test]
async fn command_line_transmit_of_unknown_button_is_soft() {
    let (mut server, _keys) = make_server();
    server.handle_command_line(999, ">nothing").await.unwrap();
}

#[tokio::test]
async fn capture_log_records_named_unknown_and_timeout_packets() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("captures.log");
    let config = AppConfig {
        capture_log: Some(log_path.clone()),
        ..AppConfig::default()
    };
    let mut server = Server::new(config).unwrap();
    server.dict.insert("play", Packet::from_widths(&[1, 2]));

    let known = Packet::from_widths(&[1, 2]);
    let unknown = Packet::from_widths(&[7, 8]);
    server.log_packet(Some("play"), &known, false);
    server.log_packet(None, &unknown, true);

    let contents = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(
        contents,
        "key \"play\" { 1 2 }\nkey UNKNOWN { 7 8 } # on timeout\n"
    );
}

#[test]
fn collect_lines_splits_and_skips_blank_lines() {
    let mut buf = Vec::new();
    let lines = collect_lines(&mut buf, b">play\r\n\n=UNKNOWN\npartial").unwrap();
    assert_eq!(lines, vec![">play", "=UNKNOWN"]);
    assert_eq!(buf, b"partial");

    let rest = collect_lines(&mut buf, b" line\n").unwrap();
    assert_eq!(rest, vec!["partial line"]);
    assert!(buf.is_empty());
}

#[test]
fn collect_lines_reports_overrun() {
    let mut buf = Vec::new();
    let long = vec![b'x'; COMMAND_LINE_MAX + 1];
    assert!(collect_lines(&mut buf, &long).is_none());
}
