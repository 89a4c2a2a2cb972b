//! `@github` chat commands: parsing and dispatch.

mod dispatch;
mod parse;

pub use dispatch::Dispatcher;
pub use parse::{extract_trigger, Request, TRIGGER};
