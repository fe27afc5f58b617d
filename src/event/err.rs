use std::{fmt, num::ParseIntError};

#[derive(Debug)]
pub enum EventErr {
    SerdeParse(serde_json::Error),
    NonNumericId(ParseIntError),
    DynParse,
}

impl std::error::Error for EventErr {}

impl fmt::Display for EventErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use EventErr::*;
        match self {
            SerdeParse(inner) => write!(f, "{}", inner),
            NonNumericId(inner) => write!(f, "expected a numeric id, but: {}", inner),
            DynParse => write!(f, "the event's payload is missing a required field"),
        }
    }
}

impl From<ParseIntError> for EventErr {
    fn from(error: ParseIntError) -> Self {
        Self::NonNumericId(error)
    }
}

impl From<serde_json::Error> for EventErr {
    fn from(error: serde_json::Error) -> Self {
        Self::SerdeParse(error)
    }
}
