//! Event delivery to session observers.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures_util::Stream;
use parking_lot::RwLock;
use proto::{AgentEvent, SessionId};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

/// Receives every event a session produces.
///
/// Delivery is fire-and-forget: implementations must not block and never
/// report failure back to the caller.
pub trait EventSink: Send + Sync {
    fn emit(&self, session_id: &SessionId, event: AgentEvent);
}

type Observer = (u64, mpsc::UnboundedSender<AgentEvent>);
type ObserverTable = RwLock<HashMap<SessionId, Vec<Observer>>>;

/// Observer table keyed by session id.
///
/// Sessions only ever see their own events; emits from different sessions
/// share the table under a read lock.
#[derive(Default)]
pub struct SessionEventHub {
    observers: Arc<ObserverTable>,
    next_id: AtomicU64,
}

/// One observer registration. Dropping it removes the observer from the hub.
pub struct Subscription {
    pub id: u64,
    session_id: SessionId,
    events: UnboundedReceiverStream<AgentEvent>,
    table: Weak<ObserverTable>,
}

impl Stream for Subscription {
    type Item = AgentEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<AgentEvent>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            remove_observer(&table, &self.session_id, self.id);
        }
    }
}

fn remove_observer(table: &ObserverTable, session_id: &SessionId, id: u64) {
    let mut observers = table.write();
    if let Some(list) = observers.get_mut(session_id) {
        list.retain(|(observer, _)| *observer != id);
        if list.is_empty() {
            observers.remove(session_id);
        }
    }
}

impl SessionEventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer for `session_id`.
    pub fn subscribe(&self, session_id: &SessionId) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers
            .write()
            .entry(session_id.clone())
            .or_default()
            .push((id, tx));
        debug!(session = %session_id, observer = id, "observer subscribed");
        Subscription {
            id,
            session_id: session_id.clone(),
            events: UnboundedReceiverStream::new(rx),
            table: Arc::downgrade(&self.observers),
        }
    }

    /// Removes one observer; the session entry goes away with its last observer.
    pub fn unsubscribe(&self, session_id: &SessionId, id: u64) {
        remove_observer(&self.observers, session_id, id);
    }

    /// Number of live observers for a session.
    pub fn observer_count(&self, session_id: &SessionId) -> usize {
        self.observers
            .read()
            .get(session_id)
            .map_or(0, |list| list.iter().filter(|(_, tx)| !tx.is_closed()).count())
    }

    /// Number of sessions with at least one registered observer.
    pub fn session_count(&self) -> usize {
        self.observers.read().len()
    }
}

impl EventSink for SessionEventHub {
    fn emit(&self, session_id: &SessionId, event: AgentEvent) {
        let mut stale = false;
        {
            let observers = self.observers.read();
            let Some(list) = observers.get(session_id) else {
                return;
            };
            for (_, tx) in list {
                if tx.send(event.clone()).is_err() {
                    stale = true;
                }
            }
        }

        if stale {
            let mut observers = self.observers.write();
            if let Some(list) = observers.get_mut(session_id) {
                list.retain(|(_, tx)| !tx.is_closed());
                if list.is_empty() {
                    observers.remove(session_id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures_util::{FutureExt, StreamExt};

    use super::*;

    fn url(u: &str) -> AgentEvent {
        AgentEvent::UrlChanged { url: u.to_string() }
    }

    #[tokio::test]
    async fn events_reach_only_their_session() {
        let hub = SessionEventHub::new();
        let a = SessionId::from("a");
        let b = SessionId::from("b");
        let mut sub_a = hub.subscribe(&a);
        let mut sub_b = hub.subscribe(&b);

        hub.emit(&a, url("https://a.example"));
        hub.emit(&b, AgentEvent::Finished);

        assert_eq!(sub_a.next().await, Some(url("https://a.example")));
        assert_eq!(sub_b.next().await, Some(AgentEvent::Finished));
        assert!(sub_a.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn every_observer_of_a_session_gets_a_copy() {
        let hub = SessionEventHub::new();
        let s = SessionId::from("s");
        let mut first = hub.subscribe(&s);
        let mut second = hub.subscribe(&s);

        hub.emit(&s, AgentEvent::Finished);
        assert_eq!(first.next().await, Some(AgentEvent::Finished));
        assert_eq!(second.next().await, Some(AgentEvent::Finished));
    }

    #[test]
    fn emit_without_observers_is_a_no_op() {
        let hub = SessionEventHub::new();
        hub.emit(&SessionId::from("nobody"), AgentEvent::Finished);
    }

    #[test]
    fn dropping_a_subscription_removes_its_observer() {
        let hub = SessionEventHub::new();
        let s = SessionId::from("s");
        let kept = hub.subscribe(&s);
        drop(hub.subscribe(&s));
        assert_eq!(hub.observer_count(&s), 1);

        hub.unsubscribe(&s, kept.id);
        assert_eq!(hub.observer_count(&s), 0);
        assert_eq!(hub.session_count(), 0);
        drop(kept);
    }

    #[test]
    fn finished_sessions_leave_no_table_entries() {
        let hub = SessionEventHub::new();
        for i in 0..100 {
            let id = SessionId::from(format!("s{i}"));
            let sub = hub.subscribe(&id);
            hub.emit(&id, AgentEvent::Finished);
            drop(sub);
        }
        assert_eq!(hub.session_count(), 0);
    }

    #[test]
    fn subscription_outliving_the_hub_drops_cleanly() {
        let hub = SessionEventHub::new();
        let sub = hub.subscribe(&SessionId::from("s"));
        drop(hub);
        drop(sub);
    }

    #[tokio::test]
    async fn concurrent_sessions_emit_without_interference() {
        let hub = Arc::new(SessionEventHub::new());
        let mut subs = Vec::new();
        for i in 0..8 {
            let id = SessionId::from(format!("s{i}"));
            subs.push((id.clone(), hub.subscribe(&id)));
        }

        let mut tasks = Vec::new();
        for (id, _) in &subs {
            let hub = hub.clone();
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                for n in 0..50 {
                    hub.emit(&id, url(&format!("{id}/{n}")));
                }
            }));
        }
        for task in tasks {
            task.await.expect("emit task");
        }

        for (id, mut sub) in subs {
            let mut count = 0;
            while let Some(Some(event)) = sub.next().now_or_never() {
                let AgentEvent::UrlChanged { url } = event else {
                    panic!("unexpected event");
                };
                assert!(url.starts_with(&format!("{id}/")));
                count += 1;
            }
            assert_eq!(count, 50);
        }
    }
}
