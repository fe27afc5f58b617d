//! Events as they arrive from the upstream bus and leave for clients.
//!
//! Payloads stay dynamic (`serde_json::Value`): the gateway forwards what the
//! publisher sent and only digests the handful of `update` fields the
//! visibility filter inspects.  Tightly typing the whole payload would couple
//! this server to one version of the publisher's API for no benefit.
mod err;
mod id;

pub use err::EventErr;
pub use id::Id;

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::TryFrom;

/// One message off the bus: `{event, payload, queued_at}`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Event {
    #[serde(skip)]
    pub(crate) kind: EventKind,
    pub(crate) event: String,
    pub(crate) payload: Value,
    pub(crate) queued_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EventKind {
    Update(StatusDigest),
    Other,
}

impl Default for EventKind {
    fn default() -> Self {
        Self::Other
    }
}

impl Event {
    pub(crate) fn name(&self) -> &str {
        &self.event
    }

    pub(crate) fn update(&self) -> Option<&StatusDigest> {
        match &self.kind {
            EventKind::Update(digest) => Some(digest),
            EventKind::Other => None,
        }
    }

    /// The payload as a client should see it: objects are serialized, strings
    /// (e.g., the status id of a `delete`) pass through untouched.
    pub(crate) fn payload_txt(&self) -> String {
        match &self.payload {
            Value::String(s) => s.clone(),
            json => json.to_string(),
        }
    }
}

impl TryFrom<&str> for Event {
    type Error = EventErr;

    fn try_from(event_txt: &str) -> Result<Self, Self::Error> {
        let event: Event = serde_json::from_str(event_txt)?;
        if event.event == "update" {
            let digest = StatusDigest::try_from(&event.payload)?;
            Ok(Self {
                kind: EventKind::Update(digest),
                ..event
            })
        } else {
            Ok(event)
        }
    }
}

/// The slice of an `update` payload the visibility filter needs, extracted
/// once when the event is parsed and shared by every listener.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StatusDigest {
    pub(crate) author: Id,
    pub(crate) acct: String,
    pub(crate) language: Option<String>,
    pub(crate) mentions: Vec<Id>,
}

impl StatusDigest {
    /// Accounts a block or mute could be held against: the author plus
    /// everyone mentioned.
    pub(crate) fn targets(&self) -> Vec<i64> {
        let mut targets = Vec::with_capacity(self.mentions.len() + 1);
        targets.push(*self.author);
        targets.extend(self.mentions.iter().map(|id| id.0));
        targets
    }

    /// Domain of origin; `None` for statuses from the local instance.
    pub(crate) fn domain(&self) -> Option<&str> {
        self.acct.split('@').nth(1).filter(|d| !d.is_empty())
    }

    /// `true` if the viewer's language preferences reject this status.
    pub(crate) fn language_not(&self, allowed_langs: &HashSet<String>) -> bool {
        if allowed_langs.is_empty() {
            return false; // no preference set allows all languages
        }
        match self.language.as_deref() {
            None | Some("") => false, // unknown language is always allowed
            Some(lang) => !allowed_langs.contains(lang),
        }
    }
}

impl TryFrom<&Value> for StatusDigest {
    type Error = EventErr;

    fn try_from(payload: &Value) -> Result<Self, Self::Error> {
        Ok(Self {
            author: Id::try_from(&payload["account"]["id"])?,
            acct: payload["account"]["acct"]
                .as_str()
                .ok_or(EventErr::DynParse)?
                .to_string(),
            language: payload["language"].as_str().map(String::from),
            mentions: payload["mentions"]
                .as_array()
                .map(|mentions| {
                    mentions
                        .iter()
                        .filter_map(|m| Id::try_from(&m["id"]).ok())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

/// Outbound WebSocket framing: `{stream, event, payload}`.
#[derive(Serialize, Debug)]
pub(crate) struct WsFrame<'a> {
    stream: &'a [String],
    event: &'a str,
    payload: String,
}

impl<'a> WsFrame<'a> {
    pub(crate) fn json(stream: &'a [String], event: &'a Event) -> String {
        let frame = Self {
            stream,
            event: event.name(),
            payload: event.payload_txt(),
        };
        serde_json::to_string(&frame).expect("Guaranteed: WsFrame is Serialize")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const UPDATE: &str = r#"{
        "event": "update",
        "payload": {
            "id": "1",
            "language": "en",
            "account": {"id": "7", "acct": "alice@remote.example"},
            "mentions": [{"id": "8"}, {"id": "9"}]
        },
        "queued_at": 1569623342825
    }"#;

    #[test]
    fn update_is_digested_at_parse_time() {
        let event = Event::try_from(UPDATE).expect("in test");
        assert_eq!(event.name(), "update");
        assert_eq!(event.queued_at, Some(1_569_623_342_825));

        let digest = event.update().expect("update event has a digest");
        assert_eq!(digest.author, Id(7));
        assert_eq!(digest.acct, "alice@remote.example");
        assert_eq!(digest.language.as_deref(), Some("en"));
        assert_eq!(digest.targets(), vec![7, 8, 9]);
        assert_eq!(digest.domain(), Some("remote.example"));
    }

    #[test]
    fn local_accounts_have_no_domain() {
        let digest = StatusDigest {
            author: Id(1),
            acct: "bob".to_string(),
            language: None,
            mentions: Vec::new(),
        };
        assert_eq!(digest.domain(), None);
    }

    #[test]
    fn object_payloads_are_serialized_for_clients() {
        let event = Event::try_from(UPDATE).expect("in test");
        let txt = event.payload_txt();
        let round_trip: Value = serde_json::from_str(&txt).expect("in test");
        assert_eq!(round_trip["account"]["acct"], "alice@remote.example");
    }

    #[test]
    fn string_payloads_pass_through_untouched() {
        let event =
            Event::try_from(r#"{"event": "delete", "payload": "90", "queued_at": 0}"#).expect("in test");
        assert!(event.update().is_none());
        assert_eq!(event.payload_txt(), "90");
    }

    #[test]
    fn malformed_updates_are_rejected() {
        assert!(Event::try_from(r#"{"event": "update", "payload": {"id": "1"}}"#).is_err());
        assert!(Event::try_from("not json").is_err());
    }

    #[test]
    fn language_preferences() {
        let mut digest = StatusDigest {
            author: Id(1),
            acct: "bob".to_string(),
            language: Some("en".to_string()),
            mentions: Vec::new(),
        };
        let none: HashSet<String> = HashSet::new();
        let french: HashSet<String> = ["fr".to_string()].into_iter().collect();

        assert!(!digest.language_not(&none));
        assert!(digest.language_not(&french));

        digest.language = None;
        assert!(!digest.language_not(&french));
        digest.language = Some(String::new());
        assert!(!digest.language_not(&french));
    }

    #[test]
    fn ws_frame_shape() {
        let event = Event::try_from(r#"{"event": "delete", "payload": "90", "queued_at": 0}"#)
            .expect("in test");
        let stream = vec!["hashtag".to_string(), "art".to_string()];
        let frame: Value = serde_json::from_str(&WsFrame::json(&stream, &event)).expect("in test");
        assert_eq!(frame["stream"], serde_json::json!(["hashtag", "art"]));
        assert_eq!(frame["event"], "delete");
        assert_eq!(frame["payload"], "90");
    }

    #[test]
    fn numeric_ids_are_tolerated() {
        let event = Event::try_from(
            r#"{"event": "update",
                "payload": {"id": 1, "account": {"id": 7, "acct": "a"}, "mentions": []}}"#,
        )
        .expect("in test");
        assert_eq!(event.update().expect("digest").author, Id(7));
    }
}
