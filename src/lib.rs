//! `auroraops` renders the status of remote "things" on light panel hardware.
//!
//! # Structure
//!
//! A [status::Poller] periodically fetches a status document and hands it to an
//! [status::Updater], which validates it against the configuration and forwards each
//! known `(thing, status)` pair to the [registry::Registry]. The registry owns one panel
//! group per thing and swaps the [actions::Action] rendering on that group whenever its
//! status changes. Actions write panel colors to a [transport::PanelWriter], which in
//! production is the [transport::CommandTransport] streaming UDP datagrams to the device.
//!
//! Every long-running loop is a [task::Task], and the [daemon::Daemon] ties them together
//! with an ordered shutdown sequence.

#[macro_use]
extern crate tracing;

pub mod actions;
pub mod color;
pub mod daemon;
pub mod device;
pub mod models;
pub mod registry;
pub mod status;
pub mod task;
pub mod transport;

/// Identifier of one physical panel on the device
pub type PanelId = u8;
