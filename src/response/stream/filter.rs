//! Per-viewer visibility decisions.
//!
//! The cheap checks (event class, scope, language, anonymity) run inline on
//! the pump; only a status on a filtered stream costs a policy lookup, and a
//! lookup that fails drops the event rather than deliver something the
//! tables could have barred.
use crate::event::{Event, StatusDigest};
use crate::request::{PgPool, Subscription, UserData};

/// The full filter: the pure screen plus the policy tables.
#[derive(Clone)]
pub(crate) struct Filter {
    pool: PgPool,
    screener: Screener,
}

/// The database-free part of the decision, separated so it can be tested
/// without a running Postgres.
#[derive(Clone, Debug)]
pub(crate) struct Screener {
    viewer: UserData,
    needs_filtering: bool,
    notification_only: bool,
}

#[derive(Debug, PartialEq)]
enum Screen<'a> {
    Deliver,
    Drop,
    /// A status on a filtered stream: the policy tables have the last word.
    Consult(&'a StatusDigest),
}

impl Filter {
    pub(crate) fn new(pool: PgPool, subscription: &Subscription) -> Self {
        Self {
            pool,
            screener: Screener::new(subscription),
        }
    }

    /// Whether this event reaches the viewer.
    pub(crate) async fn admits(&self, event: &Event) -> bool {
        let digest = match self.screener.screen(event) {
            Screen::Deliver => return true,
            Screen::Drop => return false,
            Screen::Consult(digest) => digest.clone(),
        };

        let (pool, viewer) = (self.pool.clone(), self.screener.viewer.id);
        let barred = tokio::task::spawn_blocking(move || {
            pool.status_barred(
                viewer,
                digest.author,
                digest.targets(),
                digest.domain().map(String::from),
            )
        })
        .await;

        match barred {
            Ok(Ok(barred)) => !barred,
            Ok(Err(e)) => {
                log::error!("visibility check failed; dropping the event: {}", e);
                false
            }
            Err(e) => {
                log::error!("visibility worker vanished; dropping the event: {}", e);
                false
            }
        }
    }
}

impl Screener {
    fn new(subscription: &Subscription) -> Self {
        Self {
            viewer: subscription.user.clone(),
            needs_filtering: subscription.timeline.needs_filtering(),
            notification_only: subscription.timeline.notification_only(),
        }
    }

    fn screen<'a>(&self, event: &'a Event) -> Screen<'a> {
        if self.notification_only && event.name() != "notification" {
            return Screen::Drop;
        }
        if event.name() == "notification" && !self.viewer.allow_notifications() {
            return Screen::Drop;
        }
        if !self.needs_filtering || event.name() != "update" {
            return Screen::Deliver;
        }

        let digest = match event.update() {
            Some(digest) => digest,
            None => return Screen::Drop, // an update we could not digest
        };
        if digest.language_not(&self.viewer.allowed_langs) {
            return Screen::Drop;
        }
        if self.viewer.is_anonymous() {
            return Screen::Deliver;
        }
        Screen::Consult(digest)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::Id;
    use crate::request::Scope;
    use hashbrown::HashSet;
    use std::convert::TryFrom;

    fn update(language: &str) -> Event {
        Event::try_from(
            format!(
                r#"{{"event": "update",
                     "payload": {{"id": "1", "language": "{}",
                                  "account": {{"id": "7", "acct": "a@x.test"}},
                                  "mentions": []}},
                     "queued_at": 0}}"#,
                language
            )
            .as_str(),
        )
        .expect("in test")
    }

    fn notification() -> Event {
        Event::try_from(r#"{"event": "notification", "payload": {"id": "5"}, "queued_at": 0}"#)
            .expect("in test")
    }

    fn screener(viewer: UserData, needs_filtering: bool, notification_only: bool) -> Screener {
        Screener {
            viewer,
            needs_filtering,
            notification_only,
        }
    }

    fn signed_in() -> UserData {
        UserData {
            id: Id(42),
            allowed_langs: HashSet::new(),
            scopes: [Scope::Read].into_iter().collect(),
            device_id: None,
        }
    }

    #[test]
    fn notification_only_passes_nothing_else() {
        let s = screener(signed_in(), false, true);
        assert_eq!(s.screen(&update("en")), Screen::Drop);
        assert!(matches!(s.screen(&notification()), Screen::Deliver));
    }

    #[test]
    fn notifications_need_a_notification_grant() {
        let mut viewer = signed_in();
        viewer.scopes = [Scope::Statuses].into_iter().collect();
        let s = screener(viewer, false, false);
        assert_eq!(s.screen(&notification()), Screen::Drop);

        let s = screener(signed_in(), false, false);
        assert!(matches!(s.screen(&notification()), Screen::Deliver));
    }

    #[test]
    fn unfiltered_streams_deliver_updates_without_queries() {
        let s = screener(signed_in(), false, false);
        assert!(matches!(s.screen(&update("en")), Screen::Deliver));
    }

    #[test]
    fn filtered_streams_consult_policy_for_signed_in_viewers() {
        let s = screener(signed_in(), true, false);
        assert!(matches!(s.screen(&update("en")), Screen::Consult(_)));
    }

    #[test]
    fn anonymous_viewers_skip_the_policy_tables() {
        let s = screener(UserData::public(), true, false);
        assert!(matches!(s.screen(&update("en")), Screen::Deliver));
    }

    #[test]
    fn language_preference_drops_before_any_query() {
        let mut viewer = signed_in();
        viewer.allowed_langs = ["fr".to_string()].into_iter().collect();
        let s = screener(viewer, true, false);
        assert_eq!(s.screen(&update("en")), Screen::Drop);
        assert!(matches!(s.screen(&update("fr")), Screen::Consult(_)));
    }

    #[test]
    fn non_update_events_on_filtered_streams_deliver() {
        let s = screener(signed_in(), true, false);
        let delete = Event::try_from(r#"{"event": "delete", "payload": "9", "queued_at": 0}"#)
            .expect("in test");
        assert!(matches!(s.screen(&delete), Screen::Deliver));
    }
}
