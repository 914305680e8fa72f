//! ==============================================================================
//! grainscan-host - grain moisture monitoring host
//! ==============================================================================
//!
//! modules:
//!     calibration    raw adc value -> moisture percent
//!     thresholds     per-grain good / caution / bad bands
//!     store          last reading per device + push channel
//!     acquisition    measurement windows over a simulated, polled or pushed source
//!     advisor        harvest advice from a local generative model, with fallback
//!     weather        field conditions for a coordinate
//!     forecast       simulated 7-day outlooks
//!     firestore      mirror of the firmware's cloud document into the store
//!     server         http api and status page
//!
//! ==============================================================================

pub mod acquisition;
pub mod advisor;
pub mod calibration;
pub mod config;
pub mod dashboard;
pub mod domain;
pub mod firestore;
pub mod forecast;
pub mod server;
pub mod store;
pub mod thresholds;
pub mod weather;

pub use server::{create_router, AppState};
