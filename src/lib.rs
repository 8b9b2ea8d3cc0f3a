//! Traffic Link Library
//!
//! A client-side façade that reads and steers a live traffic-simulation
//! session while tolerating an unreliable, eventually-settling remote state.

pub mod facade;
