//! # ramses-core
//!
//! Codec, entity graph, and transmit scheduler for the RAMSES-II RF heating
//! protocol (Honeywell/Resideo evohome and compatible Itho/Orcon/Nuaire
//! HVAC traffic).
//!
//! This crate models the wire protocol and the state it implies; it does
//! not open a config file, parse CLI arguments, install a `tracing`
//! subscriber, or own the serial driver's byte-level plumbing — those are
//! the outer application's job. What it does own:
//!
//! - [`address`] / [`catalogue`] — device-id parsing and the static
//!   per-code payload catalogue;
//! - [`packet`] — the ASCII wire line ↔ typed [`packet::Packet`] codec;
//! - [`payload`] — per-code payload parsers producing a typed
//!   [`payload::Message`];
//! - [`transport`] — the byte-stream ↔ line contract, live (`tokio-serial`)
//!   and replay (file) implementations;
//! - [`entity`] — the device/zone/system graph built up from observed
//!   traffic;
//! - [`qos`] — the priority send queue with retry, backoff, and
//!   duty-cycle deprecation;
//! - [`binding`] — the `1FC9` bind handshake state machine;
//! - [`discovery`] — the periodic schema/params/status poll scheduler;
//! - [`dispatch`] — wire line → routed [`payload::Message`], with
//!   array-fragment joining;
//! - [`gateway`] — the top-level [`gateway::Gateway`] wiring all of the
//!   above into a running control-plane.

pub mod address;
pub mod binding;
pub mod catalogue;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod gateway;
pub mod packet;
pub mod payload;
pub mod qos;
pub mod transport;

pub use address::DeviceId;
pub use config::Config;
pub use error::{Error, Result};
pub use gateway::Gateway;
