//! Server-to-client lines and inbound line cleaning

use bytes::{BufMut, Bytes, BytesMut};

use super::command::{QUIT_PREFIX, ROOM_PREFIX};
use crate::server::room_manager::RoomRegistry;

/// Strip the leading and trailing characters `<= ' '` from a raw line. This
/// covers whitespace, `\r` and the NUL heartbeat bytes clients send.
/// Invalid UTF-8 is replaced rather than rejected.
pub fn clean_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_matches(|c: char| c <= ' ')
        .to_string()
}

/// Encode one line for the wire
pub fn encode_line(line: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(line.len() + 1);
    buf.put_slice(line.as_bytes());
    buf.put_u8(b'\n');
    buf.freeze()
}

/// Encode several lines into one buffer so they are written together
pub fn encode_lines<S: AsRef<str>>(lines: &[S]) -> Bytes {
    let len = lines.iter().map(|l| l.as_ref().len() + 1).sum();
    let mut buf = BytesMut::with_capacity(len);
    for line in lines {
        buf.put_slice(line.as_ref().as_bytes());
        buf.put_u8(b'\n');
    }
    buf.freeze()
}

/// Greeting, room, roster count and the command menu
pub fn welcome_block(name: &str, rooms: &RoomRegistry, room_name: &str, roster: usize) -> Vec<String> {
    let mut lines = vec![
        format!("Hi {}", name),
        format!("Welcome to the '{}' chatroom!", room_name),
        format!(
            "Currently there are {} user(s) on the platform including you.",
            roster
        ),
        String::new(),
        format!("To change the chatroom, enter {} followed by:", ROOM_PREFIX),
    ];
    lines.extend(
        rooms
            .iter()
            .map(|room| format!("   - {} for '{}'", room.id, room.name)),
    );
    lines.push(format!("To exit the chat, enter {}", QUIT_PREFIX));
    lines.push(String::new());
    lines
}

pub fn joined_chat(name: &str) -> String {
    format!("{} joined the chat.", name)
}

pub fn left_chat(name: &str) -> String {
    format!("{} left the chat.", name)
}

pub fn roster_count(count: usize) -> String {
    format!("Currently there are {} user(s) on the platform.", count)
}

pub fn disconnect_notice() -> String {
    "You're being disconnected...".to_string()
}

pub fn room_changed(room_name: &str) -> String {
    format!("You successfully changed rooms. Welcome to '{}'", room_name)
}

pub fn joined_room(name: &str, room_name: &str) -> String {
    format!("{} joined '{}' chatroom", name, room_name)
}

pub fn incorrect_room(current_room: &str) -> String {
    format!("Incorrect option. You are still in '{}'", current_room)
}

pub fn room_usage(current_room: &str) -> String {
    format!(
        "Usage: {} <room number>. You are still in '{}'",
        ROOM_PREFIX, current_room
    )
}

pub fn chat_line(name: &str, message: &str) -> String {
    format!("{}: {}", name, message)
}

pub fn server_full() -> String {
    "Server is full. Please try again later.".to_string()
}

pub fn server_shutdown() -> String {
    "Server is shutting down. Goodbye.".to_string()
}
