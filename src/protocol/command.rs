//! Inbound command parsing

use crate::server::room_manager::RoomId;

/// Prefix that ends the session
pub const QUIT_PREFIX: &str = "/q";

/// Prefix that switches the session's room
pub const ROOM_PREFIX: &str = "/r";

/// Why a `/r` argument could not be turned into a room id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomArgError {
    /// No token after the prefix
    Missing,
    /// Token is not a sequence of ASCII digits
    NotANumber(String),
    /// Digits, but too large for any room id
    OutOfRange(String),
}

/// A cleaned inbound line, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Nothing left after cleaning; ignored
    Empty,
    /// `/q...`
    Quit,
    /// `/r <n>`
    ChangeRoom(Result<RoomId, RoomArgError>),
    /// Anything else, broadcast verbatim to the room
    Chat(String),
}

impl Command {
    /// Classify an already cleaned line. Prefixes are case-sensitive and only
    /// need to match the start of the line, so `/quit` quits and `/room 2`
    /// changes rooms.
    pub fn parse(line: &str) -> Self {
        if line.is_empty() {
            Command::Empty
        } else if line.starts_with(QUIT_PREFIX) {
            Command::Quit
        } else if line.starts_with(ROOM_PREFIX) {
            Command::ChangeRoom(parse_room_arg(line))
        } else {
            Command::Chat(line.to_string())
        }
    }
}

fn parse_room_arg(line: &str) -> Result<RoomId, RoomArgError> {
    let token = line
        .split_whitespace()
        .nth(1)
        .ok_or(RoomArgError::Missing)?;

    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RoomArgError::NotANumber(token.to_string()));
    }

    token
        .parse::<RoomId>()
        .map_err(|_| RoomArgError::OutOfRange(token.to_string()))
}

impl From<&str> for Command {
    fn from(line: &str) -> Self {
        Command::parse(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_prefix() {
        assert_eq!(Command::parse("/q"), Command::Quit);
        assert_eq!(Command::parse("/quit now"), Command::Quit);
        assert_eq!(
            Command::parse("/Q"),
            Command::Chat("/Q".to_string()),
            "prefixes are case-sensitive"
        );
    }

    #[test]
    fn test_room_change() {
        assert_eq!(Command::parse("/r 2"), Command::ChangeRoom(Ok(2)));
        assert_eq!(Command::parse("/room 3"), Command::ChangeRoom(Ok(3)));
        assert_eq!(Command::parse("/r   1"), Command::ChangeRoom(Ok(1)));
        assert_eq!(Command::parse("/r 9"), Command::ChangeRoom(Ok(9)));
    }

    #[test]
    fn test_room_change_errors() {
        assert_eq!(
            Command::parse("/r"),
            Command::ChangeRoom(Err(RoomArgError::Missing))
        );
        assert_eq!(
            Command::parse("/r two"),
            Command::ChangeRoom(Err(RoomArgError::NotANumber("two".to_string())))
        );
        assert_eq!(
            Command::parse("/r -1"),
            Command::ChangeRoom(Err(RoomArgError::NotANumber("-1".to_string())))
        );
        assert_eq!(
            Command::parse("/r 99999999999999999999"),
            Command::ChangeRoom(Err(RoomArgError::OutOfRange(
                "99999999999999999999".to_string()
            )))
        );
    }

    #[test]
    fn test_chat_and_empty() {
        assert_eq!(Command::parse(""), Command::Empty);
        assert_eq!(
            Command::parse("hello there"),
            Command::Chat("hello there".to_string())
        );
        assert_eq!(Command::from("q"), Command::Chat("q".to_string()));
    }
}
