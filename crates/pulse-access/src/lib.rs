//! Authorization core for Pulse chat-ops commands.
//!
//! Combines a static, id-keyed override table with a reloadable, email-keyed
//! permission table. Identity lookups go through an [`IdentityDirectory`]
//! collaborator so transports can plug in their own user directory.

pub mod access_controller;
pub mod identity;
pub mod permission_store;
pub mod static_override;

pub use access_controller::*;
pub use identity::*;
pub use permission_store::*;
pub use static_override::*;
