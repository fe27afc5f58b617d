//! Incremental parser for the slice of RESP a subscriber connection receives.
//!
//! Everything Redis pushes at a subscriber is either an array (`message`
//! deliveries and subscribe/unsubscribe acks) or a simple line reply.  A
//! delivery looks like this on the wire (line breaks added between fields):
//!
//! ```text
//! *3\r\n
//! $7\r\n
//! message\r\n
//! $15\r\n
//! timeline:public\r\n
//! $1386\r\n
//! {"event":"update","payload":...,"queued_at":1569623342825}\r\n
//! ```
//!
//! The buffer may end mid-reply at any point; that surfaces as
//! `RedisParseErr::Incomplete`, which just means "read more input and retry".
use std::fmt;

type Parsed<'a, T> = Result<T, RedisParseErr>;

/// One reply, borrowed from the input buffer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RedisReply<'a> {
    /// A `message` push: the channel it was published to and the raw body.
    Message { channel: &'a str, body: &'a str },
    /// An `-ERR ...` line.
    Failure(&'a str),
    /// Anything else we recognize but do not care about (subscribe and
    /// unsubscribe acks, `+OK`, pong lines).
    Ack,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RedisParseErr {
    /// Not a true error: the buffer holds only part of a reply.
    Incomplete,
    InvalidNumber,
    InvalidLineStart(char),
    InvalidLineEnd,
}

impl std::error::Error for RedisParseErr {}

impl fmt::Display for RedisParseErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use RedisParseErr::*;
        match self {
            Incomplete => write!(f, "input ends mid-reply; read more and try again"),
            InvalidNumber => write!(f, "expected a length, found something non-numeric"),
            InvalidLineStart(c) => write!(f, "unsupported RESP type tag `{}`", c),
            InvalidLineEnd => write!(f, "a RESP field did not end with CRLF"),
        }
    }
}

/// Parse one reply off the front of `input`, returning it together with the
/// number of bytes consumed.
pub(crate) fn parse_redis_reply(input: &str) -> Parsed<(RedisReply, usize)> {
    let mut cursor = Cursor { input, pos: 0 };
    let reply = cursor.reply()?;
    Ok((reply, cursor.pos))
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn reply(&mut self) -> Parsed<'a, RedisReply<'a>> {
        match self.peek()? {
            b'*' => self.array(),
            b'-' => {
                self.pos += 1;
                self.line().map(RedisReply::Failure)
            }
            b'+' | b':' => {
                self.pos += 1;
                self.line()?;
                Ok(RedisReply::Ack)
            }
            other => Err(RedisParseErr::InvalidLineStart(char::from(other))),
        }
    }

    fn array(&mut self) -> Parsed<'a, RedisReply<'a>> {
        let len = self.length_line(b'*')?;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(self.element()?);
        }
        // The only array a subscriber must act on is a three-element
        // `message`; acks have an integer where the body would be.
        match items.as_slice() {
            [Some("message"), Some(channel), Some(body)] => Ok(RedisReply::Message { channel, body }),
            _ => Ok(RedisReply::Ack),
        }
    }

    /// An array element: bulk strings carry text, integers carry `None`.
    fn element(&mut self) -> Parsed<'a, Option<&'a str>> {
        match self.peek()? {
            b'$' => self.bulk_string().map(Some),
            b':' => {
                self.pos += 1;
                self.line()?;
                Ok(None)
            }
            other => Err(RedisParseErr::InvalidLineStart(char::from(other))),
        }
    }

    fn bulk_string(&mut self) -> Parsed<'a, &'a str> {
        let len = self.length_line(b'$')?;
        let end = self.pos + len;
        let body = self
            .input
            .get(self.pos..end)
            .ok_or(RedisParseErr::Incomplete)?;
        self.pos = end;
        self.crlf()?;
        Ok(body)
    }

    fn length_line(&mut self, tag: u8) -> Parsed<'a, usize> {
        match self.peek()? {
            t if t == tag => self.pos += 1,
            other => return Err(RedisParseErr::InvalidLineStart(char::from(other))),
        }
        self.line()?.parse().map_err(|_| RedisParseErr::InvalidNumber)
    }

    fn line(&mut self) -> Parsed<'a, &'a str> {
        let rest = &self.input[self.pos..];
        let end = rest.find("\r\n").ok_or(RedisParseErr::Incomplete)?;
        self.pos += end + 2;
        Ok(&rest[..end])
    }

    fn crlf(&mut self) -> Parsed<'a, ()> {
        let rest = &self.input[self.pos..];
        if rest.len() < 2 {
            Err(RedisParseErr::Incomplete)
        } else if &rest[..2] == "\r\n" {
            self.pos += 2;
            Ok(())
        } else {
            Err(RedisParseErr::InvalidLineEnd)
        }
    }

    fn peek(&self) -> Parsed<'a, u8> {
        self.input
            .as_bytes()
            .get(self.pos)
            .copied()
            .ok_or(RedisParseErr::Incomplete)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const MSG: &str = "*3\r\n$7\r\nmessage\r\n$15\r\ntimeline:public\r\n$20\r\n{\"event\":\"update\",2}\r\n";

    #[test]
    fn parses_a_message() {
        let (reply, consumed) = parse_redis_reply(MSG).expect("in test");
        assert_eq!(
            reply,
            RedisReply::Message {
                channel: "timeline:public",
                body: "{\"event\":\"update\",2}",
            }
        );
        assert_eq!(consumed, MSG.len());
    }

    #[test]
    fn partial_input_asks_for_more() {
        for cut in 1..MSG.len() {
            match parse_redis_reply(&MSG[..cut]) {
                Err(RedisParseErr::Incomplete) => (),
                other => panic!("cut at {}: expected Incomplete, got {:?}", cut, other),
            }
        }
    }

    #[test]
    fn leftover_input_is_not_consumed() {
        let two = format!("{}{}", MSG, MSG);
        let (_, consumed) = parse_redis_reply(&two).expect("in test");
        assert_eq!(consumed, MSG.len());
        assert!(parse_redis_reply(&two[consumed..]).is_ok());
    }

    #[test]
    fn subscribe_acks_are_recognized() {
        let ack = "*3\r\n$9\r\nsubscribe\r\n$15\r\ntimeline:public\r\n:1\r\n";
        let (reply, consumed) = parse_redis_reply(ack).expect("in test");
        assert_eq!(reply, RedisReply::Ack);
        assert_eq!(consumed, ack.len());
    }

    #[test]
    fn simple_and_error_lines() {
        assert_eq!(parse_redis_reply("+OK\r\n").expect("in test").0, RedisReply::Ack);
        assert_eq!(
            parse_redis_reply("-ERR wrongpass\r\n").expect("in test").0,
            RedisReply::Failure("ERR wrongpass"),
        );
    }

    #[test]
    fn multibyte_payloads_count_bytes_not_chars() {
        let msg = "*3\r\n$7\r\nmessage\r\n$10\r\ntimeline:4\r\n$6\r\nça va\r\n";
        let (reply, _) = parse_redis_reply(msg).expect("in test");
        assert_eq!(
            reply,
            RedisReply::Message {
                channel: "timeline:4",
                body: "ça va",
            }
        );
    }

    #[test]
    fn garbage_is_an_error_not_a_hang() {
        assert_eq!(
            parse_redis_reply("!nonsense\r\n"),
            Err(RedisParseErr::InvalidLineStart('!')),
        );
        assert_eq!(
            parse_redis_reply("*1\r\n$3\r\nabcXX"),
            Err(RedisParseErr::InvalidLineEnd),
        );
    }
}
