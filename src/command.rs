use thiserror::Error;

use crate::model::Ms;

/// One parsed protocol line.
///
/// Booking arguments stay optional: a short line is not a parse error, it is
/// handed to the booking system, which rejects it with its own message.
#[derive(Debug, PartialEq)]
pub enum Command {
    CreateRoom {
        id: String,
        name: String,
    },
    ListRooms,
    Book {
        room_id: Option<String>,
        start: Option<Ms>,
        end: Option<Ms>,
    },
    Available {
        start: Option<Ms>,
        end: Option<Ms>,
    },
    Cancel {
        booking_id: Option<String>,
    },
    Listen {
        channel: String,
    },
    Unlisten,
    Ping,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("{0}: expected a millisecond timestamp, got {1:?}")]
    BadTimestamp(&'static str, String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("{0}: too many arguments")]
    TooManyArguments(&'static str),
}

pub fn parse(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    if verb.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut args = rest.split_whitespace();

    let cmd = match verb.to_ascii_uppercase().as_str() {
        "ROOM" => {
            let id = args.next().ok_or(ParseError::MissingArgument("room id"))?;
            let name = rest[id.len()..].trim();
            if name.is_empty() {
                return Err(ParseError::MissingArgument("room name"));
            }
            return Ok(Command::CreateRoom {
                id: id.to_string(),
                name: name.to_string(),
            });
        }
        "ROOMS" => Command::ListRooms,
        "BOOK" => Command::Book {
            room_id: args.next().map(str::to_string),
            start: timestamp("start", args.next())?,
            end: timestamp("end", args.next())?,
        },
        "AVAILABLE" => Command::Available {
            start: timestamp("start", args.next())?,
            end: timestamp("end", args.next())?,
        },
        "CANCEL" => Command::Cancel {
            booking_id: args.next().map(str::to_string),
        },
        "LISTEN" => Command::Listen {
            channel: args
                .next()
                .ok_or(ParseError::MissingArgument("room id or *"))?
                .to_string(),
        },
        "UNLISTEN" => Command::Unlisten,
        "PING" => Command::Ping,
        _ => return Err(ParseError::Unknown(verb.to_string())),
    };

    if args.next().is_some() {
        return Err(ParseError::TooManyArguments(verb_name(&cmd)));
    }
    Ok(cmd)
}

fn timestamp(name: &'static str, token: Option<&str>) -> Result<Option<Ms>, ParseError> {
    token
        .map(|t| {
            t.parse::<Ms>()
                .map_err(|_| ParseError::BadTimestamp(name, t.to_string()))
        })
        .transpose()
}

fn verb_name(cmd: &Command) -> &'static str {
    match cmd {
        Command::CreateRoom { .. } => "ROOM",
        Command::ListRooms => "ROOMS",
        Command::Book { .. } => "BOOK",
        Command::Available { .. } => "AVAILABLE",
        Command::Cancel { .. } => "CANCEL",
        Command::Listen { .. } => "LISTEN",
        Command::Unlisten => "UNLISTEN",
        Command::Ping => "PING",
    }
}
