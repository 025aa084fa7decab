//! Slash-command dispatch: closed argument parsing, access checks, script
//! execution and reply formatting for the Pulse database operations bot.

mod capability;
mod command_dispatcher;
mod reply_render;
mod target_names;

pub use capability::*;
pub use command_dispatcher::*;
pub use reply_render::*;
pub use target_names::*;
