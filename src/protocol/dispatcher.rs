//! # Event Dispatcher
//!
//! Ordered multimap from [`EventKey`] to handlers.
//!
//! Handlers run in registration order. A packet event runs the handlers bound
//! to its packet type first, then the handlers bound to [`EventKey::All`].
//! Binding the same handler twice makes it run twice; there is no
//! deduplication.
//!
//! The dispatcher holds no locks. It belongs to exactly one connection and is
//! only touched by the task driving that connection.

use crate::core::packet::{Packet, PacketType};
use crate::core::telemetry::{OutGauge, OutSim};
use crate::error::{ProtocolError, Result};
use crate::service::connection::Connection;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Callback invoked with the connection that raised the event.
pub type Handler = Arc<dyn Fn(&mut Connection, &Event<'_>) -> Result<()> + Send + Sync + 'static>;

/// Dispatch key: a lifecycle event, a telemetry format or a packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKey {
    Init,
    Close,
    Error,
    Timeout,
    /// Every typed packet, after the type-specific handlers.
    All,
    OutSim,
    OutGauge,
    Packet(PacketType),
}

impl From<PacketType> for EventKey {
    fn from(packet_type: PacketType) -> Self {
        EventKey::Packet(packet_type)
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKey::Packet(ptype) => write!(f, "{ptype}"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Something a connection reports to its handlers.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// The TCP channel finished connecting.
    Init,
    /// Orderly shutdown by the peer or by `close`.
    Close,
    /// A fatal protocol or I/O error; the connection is already closed.
    Error(&'a ProtocolError),
    /// The UDP channel saw no datagram within its idle timeout.
    Timeout,
    Packet(&'a Packet),
    OutSim(&'a OutSim),
    OutGauge(&'a OutGauge),
}

impl Event<'_> {
    pub fn key(&self) -> EventKey {
        match self {
            Event::Init => EventKey::Init,
            Event::Close => EventKey::Close,
            Event::Error(_) => EventKey::Error,
            Event::Timeout => EventKey::Timeout,
            Event::Packet(packet) => EventKey::Packet(packet.packet_type()),
            Event::OutSim(_) => EventKey::OutSim,
            Event::OutGauge(_) => EventKey::OutGauge,
        }
    }

    pub fn packet(&self) -> Option<&Packet> {
        match self {
            Event::Packet(packet) => Some(*packet),
            _ => None,
        }
    }
}

fn same_handler(a: &Handler, b: &Handler) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Handler table of one connection.
#[derive(Default, Clone)]
pub struct Dispatcher {
    handlers: HashMap<EventKey, Vec<Handler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `key` and return it, for later `unbind`.
    pub fn bind<F>(&mut self, key: impl Into<EventKey>, handler: F) -> Handler
    where
        F: Fn(&mut Connection, &Event<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        self.bind_handler(key, handler.clone());
        handler
    }

    pub fn bind_handler(&mut self, key: impl Into<EventKey>, handler: Handler) {
        self.handlers.entry(key.into()).or_default().push(handler);
    }

    /// Remove the first registration of `handler` under `key`.
    pub fn unbind(&mut self, key: impl Into<EventKey>, handler: &Handler) -> bool {
        let key = key.into();
        let Some(list) = self.handlers.get_mut(&key) else {
            return false;
        };
        let Some(index) = list.iter().position(|h| same_handler(h, handler)) else {
            return false;
        };
        list.remove(index);
        if list.is_empty() {
            self.handlers.remove(&key);
        }
        true
    }

    pub fn is_bound(&self, key: impl Into<EventKey>, handler: &Handler) -> bool {
        self.handlers
            .get(&key.into())
            .is_some_and(|list| list.iter().any(|h| same_handler(h, handler)))
    }

    pub fn handler_count(&self, key: impl Into<EventKey>) -> usize {
        self.handlers.get(&key.into()).map_or(0, Vec::len)
    }

    /// Handlers to run for `event`, in dispatch order.
    ///
    /// Returned as a snapshot so handlers may bind or unbind while running;
    /// changes take effect from the next event.
    pub fn route(&self, event: &Event<'_>) -> Vec<Handler> {
        let key = event.key();
        let mut route: Vec<Handler> = self.handlers.get(&key).cloned().unwrap_or_default();
        if let EventKey::Packet(_) = key {
            if let Some(all) = self.handlers.get(&EventKey::All) {
                route.extend(all.iter().cloned());
            }
        }
        route
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, list) in &self.handlers {
            map.entry(key, &list.len());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::Tiny;

    fn noop() -> impl Fn(&mut Connection, &Event<'_>) -> Result<()> + Send + Sync + 'static {
        |_, _| Ok(())
    }

    #[test]
    fn bind_appends_without_dedup() {
        let mut dispatcher = Dispatcher::new();
        let h = dispatcher.bind(PacketType::Tiny, noop());
        dispatcher.bind_handler(PacketType::Tiny, h.clone());
        assert_eq!(dispatcher.handler_count(PacketType::Tiny), 2);
        assert!(dispatcher.is_bound(PacketType::Tiny, &h));
        assert!(!dispatcher.is_bound(EventKey::All, &h));
    }

    #[test]
    fn unbind_removes_first_match_only() {
        let mut dispatcher = Dispatcher::new();
        let h = dispatcher.bind(EventKey::Close, noop());
        dispatcher.bind_handler(EventKey::Close, h.clone());

        assert!(dispatcher.unbind(EventKey::Close, &h));
        assert!(dispatcher.is_bound(EventKey::Close, &h));
        assert!(dispatcher.unbind(EventKey::Close, &h));
        assert!(!dispatcher.is_bound(EventKey::Close, &h));
        assert!(!dispatcher.unbind(EventKey::Close, &h));
    }

    #[test]
    fn distinct_closures_are_distinct_handlers() {
        let mut dispatcher = Dispatcher::new();
        let a = dispatcher.bind(EventKey::Init, |_, _| Ok(()));
        let b: Handler = Arc::new(|_: &mut Connection, _: &Event<'_>| Ok::<(), ProtocolError>(()));
        assert!(dispatcher.is_bound(EventKey::Init, &a));
        assert!(!dispatcher.is_bound(EventKey::Init, &b));
        assert!(!dispatcher.unbind(EventKey::Init, &b));
    }

    #[test]
    fn packet_route_runs_specific_then_all() {
        let mut dispatcher = Dispatcher::new();
        let all = dispatcher.bind(EventKey::All, noop());
        let first = dispatcher.bind(PacketType::Tiny, noop());
        let second = dispatcher.bind(PacketType::Tiny, noop());
        dispatcher.bind(PacketType::Small, noop());

        let packet = Packet::from(Tiny::default());
        let route = dispatcher.route(&Event::Packet(&packet));
        assert_eq!(route.len(), 3);
        assert!(same_handler(&route[0], &first));
        assert!(same_handler(&route[1], &second));
        assert!(same_handler(&route[2], &all));
    }

    #[test]
    fn lifecycle_events_skip_all() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.bind(EventKey::All, noop());
        let init = dispatcher.bind(EventKey::Init, noop());
        let route = dispatcher.route(&Event::Init);
        assert_eq!(route.len(), 1);
        assert!(same_handler(&route[0], &init));
        assert!(dispatcher.route(&Event::Timeout).is_empty());
    }
}
