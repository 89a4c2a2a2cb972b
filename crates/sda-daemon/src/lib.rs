//! SDA daemon: project rooms over a Unix socket, with `@github` chat commands
//! dispatched to GitHub and the sync engine.

pub mod command;
pub mod config;
pub mod handler;
pub mod rooms;
pub mod server;

#[cfg(test)]
mod testing;
