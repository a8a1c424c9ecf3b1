//! Chat-platform interface for the support desk.
//!
//! - **Events** (`events`) - inbound event model, dispatcher and handlers
//! - **Commands** (`commands`) - slash/text commands and component ids
//! - **Blocks** (`blocks`) - message, modal and reply templates
//! - **Socket** (`socket`) - event loop with reconnection logic
//! - **Transport** (`transport`) - websocket gateway session
//! - **REST** (`rest`) - HTTP client implementing the desk collaborators
//!
//! ```text
//! Gateway → SocketRunner → EventDispatcher → Handlers → SupportDesk
//!                ↓
//!          InteractionResponder ← Reply
//! ```

pub mod blocks;
pub mod commands;
pub mod events;
pub mod rest;
pub mod socket;
pub mod transport;
