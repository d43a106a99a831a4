//! Message flow view-state: history, connections, in-flight animations.

use relay_env::EventId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use crate::config::StoreConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sending,
    Delivered,
    Acked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: EventId,
    pub from: String,
    pub to: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
    pub timestamp: Duration,
    pub status: DeliveryStatus,
}

/// Directed link between two agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// `from->to`
    pub id: String,
    pub from: String,
    pub to: String,
    pub message_count: u64,
    pub last_activity: Duration,
    pub active: bool,
}

pub fn connection_id(from: &str, to: &str) -> String {
    format!("{}->{}", from, to)
}

/// Bounded message history plus per-connection animation state.
#[derive(Debug, Clone)]
pub struct MessageStore {
    config: StoreConfig,
    /// Oldest first
    messages: VecDeque<Message>,
    connections: BTreeMap<String, Connection>,
    /// Connection id -> when its in-flight display ends
    in_flight: BTreeMap<String, Duration>,
    /// (due, message id), due times non-decreasing
    deliveries: VecDeque<(Duration, EventId)>,
}

impl MessageStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            messages: VecDeque::new(),
            connections: BTreeMap::new(),
            in_flight: BTreeMap::new(),
            deliveries: VecDeque::new(),
        }
    }

    /// Records a sent message, bumps its connection and marks it in flight.
    pub fn send(&mut self, mut message: Message, now: Duration) {
        message.timestamp = now;
        message.status = DeliveryStatus::Sending;

        let conn_id = connection_id(&message.from, &message.to);
        let conn = self
            .connections
            .entry(conn_id.clone())
            .or_insert_with(|| Connection {
                id: conn_id.clone(),
                from: message.from.clone(),
                to: message.to.clone(),
                message_count: 0,
                last_activity: now,
                active: true,
            });
        conn.message_count += 1;
        conn.last_activity = now;
        conn.active = true;

        let until = now + Duration::from_millis(self.config.in_flight_ms);
        self.in_flight.insert(conn_id, until);
        self.deliveries.push_back((until, message.id));

        self.messages.push_back(message);
        while self.messages.len() > self.config.message_cap {
            self.messages.pop_front();
        }
    }

    /// Ends in-flight displays whose timeout passed and marks their messages
    /// delivered.
    pub fn tick(&mut self, now: Duration) {
        self.in_flight.retain(|_, until| *until > now);

        while let Some(&(due, id)) = self.deliveries.front() {
            if due > now {
                break;
            }
            self.deliveries.pop_front();
            if let Some(msg) = self.messages.iter_mut().find(|m| m.id == id) {
                if msg.status == DeliveryStatus::Sending {
                    msg.status = DeliveryStatus::Delivered;
                }
            }
        }
    }

    pub fn ack(&mut self, id: EventId) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(msg) => {
                msg.status = DeliveryStatus::Acked;
                true
            }
            None => false,
        }
    }

    /// Deactivates connections idle for longer than the configured age;
    /// returns how many changed.
    pub fn deactivate_stale(&mut self, now: Duration) -> usize {
        let max_age = Duration::from_millis(self.config.stale_after_ms);
        let mut changed = 0;
        for conn in self.connections.values_mut() {
            if conn.active && now.saturating_sub(conn.last_activity) > max_age {
                conn.active = false;
                changed += 1;
            }
        }
        changed
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.connections.clear();
        self.in_flight.clear();
        self.deliveries.clear();
    }

    /// Oldest first.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The configured window of newest messages, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &Message> {
        let skip = self.messages.len().saturating_sub(self.config.recent_window);
        self.messages.iter().skip(skip)
    }

    /// Messages grouped by channel; direct messages under `direct`.
    pub fn by_channel(&self) -> BTreeMap<String, Vec<&Message>> {
        let mut grouped: BTreeMap<String, Vec<&Message>> = BTreeMap::new();
        for msg in &self.messages {
            let channel = msg.channel.clone().unwrap_or_else(|| "direct".to_string());
            grouped.entry(channel).or_default().push(msg);
        }
        grouped
    }

    pub fn connection(&self, from: &str, to: &str) -> Option<&Connection> {
        self.connections.get(&connection_id(from, to))
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn is_in_flight(&self, from: &str, to: &str) -> bool {
        self.in_flight.contains_key(&connection_id(from, to))
    }

    /// Connection ids currently animating.
    pub fn in_flight(&self) -> impl Iterator<Item = &str> {
        self.in_flight.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(n: u8, from: &str, to: &str, channel: Option<&str>) -> Message {
        Message {
            id: EventId::from_random_bytes([n; 16]),
            from: from.into(),
            to: to.into(),
            content: format!("m{}", n),
            channel: channel.map(str::to_string),
            thread: None,
            timestamp: Duration::ZERO,
            status: DeliveryStatus::Sending,
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_send_tracks_connection() {
        let mut store = MessageStore::new(StoreConfig::default());
        store.send(message(1, "Lead", "Worker-1", None), ms(10));
        store.send(message(2, "Lead", "Worker-1", None), ms(20));

        let conn = store.connection("Lead", "Worker-1").unwrap();
        assert_eq!(conn.id, "Lead->Worker-1");
        assert_eq!(conn.message_count, 2);
        assert_eq!(conn.last_activity, ms(20));
        assert!(conn.active);
        assert!(store.connection("Worker-1", "Lead").is_none());
    }

    #[test]
    fn test_in_flight_clears_after_display_timeout() {
        let mut store = MessageStore::new(StoreConfig::default());
        store.send(message(1, "a", "b", None), ms(0));
        assert!(store.is_in_flight("a", "b"));

        store.tick(ms(799));
        assert!(store.is_in_flight("a", "b"));
        assert_eq!(store.messages().next().map(|m| m.status), Some(DeliveryStatus::Sending));

        store.tick(ms(800));
        assert!(!store.is_in_flight("a", "b"));
        assert_eq!(store.messages().next().map(|m| m.status), Some(DeliveryStatus::Delivered));
    }

    #[test]
    fn test_later_message_extends_in_flight() {
        let mut store = MessageStore::new(StoreConfig::default());
        store.send(message(1, "a", "b", None), ms(0));
        store.send(message(2, "a", "b", None), ms(500));

        store.tick(ms(900));
        assert!(store.is_in_flight("a", "b"));
        let statuses: Vec<_> = store.messages().map(|m| m.status).collect();
        assert_eq!(statuses, vec![DeliveryStatus::Delivered, DeliveryStatus::Sending]);

        store.tick(ms(1300));
        assert_eq!(store.in_flight().count(), 0);
    }

    #[test]
    fn test_ack_is_not_downgraded_by_delivery() {
        let mut store = MessageStore::new(StoreConfig::default());
        let msg = message(1, "a", "b", None);
        let id = msg.id;
        store.send(msg, ms(0));
        assert!(store.ack(id));
        store.tick(ms(1000));
        assert_eq!(store.messages().next().map(|m| m.status), Some(DeliveryStatus::Acked));
        assert!(!store.ack(EventId::from_random_bytes([99; 16])));
    }

    #[test]
    fn test_history_is_bounded() {
        let config = StoreConfig {
            message_cap: 3,
            recent_window: 2,
            ..StoreConfig::default()
        };
        let mut store = MessageStore::new(config);
        for n in 0..5 {
            store.send(message(n, "a", "b", None), ms(n as u64));
        }
        let contents: Vec<_> = store.messages().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);

        let recent: Vec<_> = store.recent().map(|m| m.content.as_str()).collect();
        assert_eq!(recent, vec!["m3", "m4"]);
    }

    #[test]
    fn test_deactivate_stale_connections() {
        let mut store = MessageStore::new(StoreConfig::default());
        store.send(message(1, "a", "b", None), ms(0));
        store.send(message(2, "c", "d", None), ms(4000));

        assert_eq!(store.deactivate_stale(ms(5000)), 0);
        assert_eq!(store.deactivate_stale(ms(5001)), 1);
        assert!(!store.connection("a", "b").unwrap().active);
        assert!(store.connection("c", "d").unwrap().active);

        // Activity revives a connection
        store.send(message(3, "a", "b", None), ms(6000));
        assert!(store.connection("a", "b").unwrap().active);
    }

    #[test]
    fn test_by_channel_groups_direct() {
        let mut store = MessageStore::new(StoreConfig::default());
        store.send(message(1, "a", "b", Some("general")), ms(0));
        store.send(message(2, "a", "b", None), ms(0));
        store.send(message(3, "b", "a", Some("general")), ms(0));

        let grouped = store.by_channel();
        assert_eq!(grouped.get("general").map(Vec::len), Some(2));
        assert_eq!(grouped.get("direct").map(Vec::len), Some(1));
    }

    #[test]
    fn test_clear() {
        let mut store = MessageStore::new(StoreConfig::default());
        store.send(message(1, "a", "b", None), ms(0));
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.connections().count(), 0);
        assert_eq!(store.in_flight().count(), 0);
    }
}
