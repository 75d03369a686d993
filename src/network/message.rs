use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::common::{
    time::{format_timestamp, parse_timestamp},
    SyncError,
};

/*
    Every connection carries exactly one newline-terminated line, optionally
    followed by a single reply line. The first token of the line selects the
    message:

        TIME_REQUEST                  Cristian client -> server
        GET_TIME                      Berkeley coordinator -> participant
        ADJUST_TIME:<seconds>         Berkeley coordinator -> participant
        SETCLOCK:<timestamp>          any -> node
        LAMPORT:<counter>:<content>   any -> node

    Replies to TIME_REQUEST and GET_TIME are a bare timestamp line.
*/

const TIME_REQUEST: &str = "TIME_REQUEST";
const GET_TIME: &str = "GET_TIME";
const ADJUST_TIME: &str = "ADJUST_TIME:";
const SET_CLOCK: &str = "SETCLOCK:";
const LAMPORT: &str = "LAMPORT:";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    TimeRequest,
    GetTime,
    AdjustTime(i64),
    SetClock(DateTime<Utc>),
    Lamport { counter: u64, content: String },
    Unknown(String),
}

impl Message {
    pub fn lamport(counter: u64, content: impl Into<String>) -> Self {
        Message::Lamport {
            counter,
            content: content.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::TimeRequest => "time-request",
            Message::GetTime => "get-time",
            Message::AdjustTime(_) => "adjust-time",
            Message::SetClock(_) => "set-clock",
            Message::Lamport { .. } => "lamport",
            Message::Unknown(_) => "unknown",
        }
    }
}

/// Parses one trimmed line. An unrecognized prefix is `Ok(Unknown)`; a
/// recognized prefix with a malformed argument is an error.
impl FromStr for Message {
    type Err = SyncError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();

        if line == TIME_REQUEST {
            return Ok(Message::TimeRequest);
        }
        if line == GET_TIME {
            return Ok(Message::GetTime);
        }
        if let Some(raw) = line.strip_prefix(ADJUST_TIME) {
            return raw
                .parse::<i64>()
                .map(Message::AdjustTime)
                .map_err(|_| SyncError::InvalidAdjustment(raw.to_string()));
        }
        if let Some(raw) = line.strip_prefix(SET_CLOCK) {
            return parse_timestamp(raw).map(Message::SetClock);
        }
        if line.starts_with(LAMPORT) {
            return parse_lamport(line);
        }

        Ok(Message::Unknown(line.to_string()))
    }
}

fn parse_lamport(line: &str) -> Result<Message, SyncError> {
    let parts: Vec<&str> = line.splitn(3, ':').collect();
    if parts.len() != 3 {
        return Err(SyncError::InvalidLamport(line.to_string()));
    }

    let counter = parts[1]
        .parse::<u64>()
        .map_err(|_| SyncError::InvalidLamport(line.to_string()))?;

    Ok(Message::lamport(counter, parts[2]))
}

/// Wire encoding, without the trailing newline.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::TimeRequest => f.write_str(TIME_REQUEST),
            Message::GetTime => f.write_str(GET_TIME),
            Message::AdjustTime(seconds) => write!(f, "{}{}", ADJUST_TIME, seconds),
            Message::SetClock(time) => write!(f, "{}{}", SET_CLOCK, format_timestamp(time)),
            Message::Lamport { counter, content } => write!(f, "{}{}:{}", LAMPORT, counter, content),
            Message::Unknown(raw) => f.write_str(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_literals() {
        assert_eq!("TIME_REQUEST".parse::<Message>().unwrap(), Message::TimeRequest);
        assert_eq!("  GET_TIME \r\n".parse::<Message>().unwrap(), Message::GetTime);
    }

    #[test]
    fn test_parse_adjust_time() {
        assert_eq!("ADJUST_TIME:-4".parse::<Message>().unwrap(), Message::AdjustTime(-4));
        assert_eq!("ADJUST_TIME:12".parse::<Message>().unwrap(), Message::AdjustTime(12));
        for raw in ["ADJUST_TIME:abc", "ADJUST_TIME:", "ADJUST_TIME:1:2", "ADJUST_TIME:1.5"] {
            assert!(
                matches!(raw.parse::<Message>(), Err(SyncError::InvalidAdjustment(_))),
                "accepted {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_parse_set_clock() {
        let expected = Utc.with_ymd_and_hms(2030, 5, 17, 10, 0, 0).unwrap();
        assert_eq!(
            "SETCLOCK:2030-05-17 10:00:00".parse::<Message>().unwrap(),
            Message::SetClock(expected)
        );
        assert!(matches!(
            "SETCLOCK:17/05/2030".parse::<Message>(),
            Err(SyncError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_parse_lamport_keeps_colons_in_content() {
        assert_eq!(
            "LAMPORT:7:hello: world".parse::<Message>().unwrap(),
            Message::lamport(7, "hello: world")
        );
        assert_eq!("LAMPORT:0:".parse::<Message>().unwrap(), Message::lamport(0, ""));
    }

    #[test]
    fn test_parse_lamport_rejects_malformed() {
        for raw in ["LAMPORT:5", "LAMPORT:x:hi", "LAMPORT:-1:hi", "LAMPORT:"] {
            assert!(
                matches!(raw.parse::<Message>(), Err(SyncError::InvalidLamport(_))),
                "accepted {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_unknown_prefix() {
        assert_eq!(
            "HELLO there".parse::<Message>().unwrap(),
            Message::Unknown("HELLO there".to_string())
        );
        // Literal messages must match exactly.
        assert!(matches!("GET_TIME_NOW".parse::<Message>().unwrap(), Message::Unknown(_)));
        assert!(matches!("".parse::<Message>().unwrap(), Message::Unknown(_)));
    }

    #[test]
    fn test_encode() {
        let time = Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap();
        assert_eq!(Message::SetClock(time).to_string(), "SETCLOCK:2006-01-02 15:04:05");
        assert_eq!(Message::AdjustTime(-2).to_string(), "ADJUST_TIME:-2");
        assert_eq!(Message::lamport(3, "a:b").to_string(), "LAMPORT:3:a:b");
        assert_eq!(Message::TimeRequest.to_string(), "TIME_REQUEST");
    }
}
