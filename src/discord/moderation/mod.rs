// Discord-facing moderation: event handlers and admin commands.

pub mod commands;
pub mod member_handler;
pub mod message_handler;
