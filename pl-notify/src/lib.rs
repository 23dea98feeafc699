//! ParcelLive Notify - connection health presentation.
//!
//! Thin presentation layer over the status broadcaster: a service lifecycle
//! trait and a desktop-notification presenter that surfaces degraded
//! connectivity and its recovery.

pub mod presenter;
pub mod service;

pub use presenter::ConnectionPresenter;
pub use service::{Service, ServiceState};
