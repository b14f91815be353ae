//! WebSocket relay that runs face and palm detection on submitted frames.

pub mod config;
pub mod session;
pub mod web;
pub mod ws;
