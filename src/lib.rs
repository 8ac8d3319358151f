//! Background coordinator for a browser feed reader.
//!
//! Keeps at most one application tab alive, remembers which feeds each tab
//! advertised, and runs the OAuth handshake with the cloud-storage provider
//! through a detached authorization tab. All working state goes through a
//! durable key-value store so an unloaded background process can pick up
//! where it left off.

pub mod background;
pub mod bridge;
pub mod config;
pub mod host;
pub mod messages;
pub mod oauth;
pub mod storage;
pub mod tabs;
pub mod util;

#[cfg(test)]
mod testing;
