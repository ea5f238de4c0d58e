//! Core messaging logic for coachline.
//!
//! Everything here is transport-agnostic: the API crate maps socket events
//! onto these services and the pubsub crate provides a cross-instance
//! [`RoomPublisher`].

pub mod services;

pub use services::*;
