//! Redis pub/sub transport for coachline.
//!
//! Lets several relay instances share rooms: every room event is published
//! on one Redis channel and each instance delivers it to its own sockets.

pub mod room_bridge;

pub use room_bridge::{RedisRoomBridge, RoomEnvelope, forward_room_events, rooms_channel};
