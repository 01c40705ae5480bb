//! Line protocol for the chat relay
//!
//! Every logical message is one UTF-8 line terminated by `\n`, in both
//! directions. This module provides:
//! - Parsing of inbound lines into commands
//! - Every line the server ever writes to a client

pub mod command;
pub mod text;

pub use command::{Command, RoomArgError};
pub use text::{clean_line, encode_line, encode_lines};
