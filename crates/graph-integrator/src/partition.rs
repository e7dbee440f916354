//! Per-context debounce lanes.
//!
//! Items are grouped by lane key. The first item reaching an idle lane opens a fixed window;
//! later items replace the pending one and only the last is emitted when the window elapses.
//! A lane whose pending item completes it takes no replacements: items arriving after the
//! terminal open a fresh lane once the terminal has been emitted.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use cdp_adapter::GraphObjectId;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

use crate::metrics;
use crate::model::ContextUpdate;

pub trait LaneItem {
    type Key: Eq + Hash + Clone + std::fmt::Debug;

    fn lane_key(&self) -> Self::Key;

    /// Whether emitting this item tears the lane down.
    fn completes_lane(&self) -> bool;
}

impl LaneItem for ContextUpdate {
    type Key = GraphObjectId;

    fn lane_key(&self) -> GraphObjectId {
        self.id().clone()
    }

    fn completes_lane(&self) -> bool {
        self.is_terminal()
    }
}

struct Lane<T> {
    deadline: Instant,
    pending: T,
    successor: Option<Box<Lane<T>>>,
}

impl<T: LaneItem> Lane<T> {
    fn open(item: T, now: Instant, window: Duration) -> Self {
        Self {
            deadline: now + window,
            pending: item,
            successor: None,
        }
    }

    fn push(&mut self, item: T, now: Instant, window: Duration) {
        if !self.pending.completes_lane() {
            self.pending = item;
            return;
        }
        match &mut self.successor {
            Some(next) => next.push(item, now, window),
            None => self.successor = Some(Box::new(Lane::open(item, now, window))),
        }
    }
}

pub struct PartitionDebounce<T: LaneItem> {
    window: Duration,
    lanes: HashMap<T::Key, Lane<T>>,
}

impl<T: LaneItem> PartitionDebounce<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            lanes: HashMap::new(),
        }
    }

    pub fn push(&mut self, item: T, now: Instant) {
        let key = item.lane_key();
        match self.lanes.get_mut(&key) {
            Some(lane) => lane.push(item, now, self.window),
            None => {
                trace!(target: "audion-lanes", lane = ?key, "lane opened");
                self.lanes.insert(key, Lane::open(item, now, self.window));
            }
        }
    }

    /// Earliest instant at which a lane is due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.lanes.values().map(|lane| lane.deadline).min()
    }

    /// Emit every lane whose window has elapsed by `now`, earliest deadline first.
    pub fn drain_due(&mut self, now: Instant) -> Vec<T> {
        let mut emitted = Vec::new();
        loop {
            let mut due: Vec<(Instant, T::Key)> = self
                .lanes
                .iter()
                .filter(|(_, lane)| lane.deadline <= now)
                .map(|(key, lane)| (lane.deadline, key.clone()))
                .collect();
            if due.is_empty() {
                break;
            }
            due.sort_by_key(|(deadline, _)| *deadline);
            for (_, key) in due {
                if let Some(lane) = self.lanes.remove(&key) {
                    emitted.push(self.emit(key, lane));
                }
            }
        }
        emitted
    }

    /// Emit everything still pending regardless of deadlines.
    pub fn drain_all(&mut self) -> Vec<T> {
        let mut emitted = Vec::new();
        while let Some(deadline) = self.next_deadline() {
            emitted.extend(self.drain_due(deadline));
        }
        emitted
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    fn emit(&mut self, key: T::Key, lane: Lane<T>) -> T {
        metrics::record_lane_emission();
        if lane.pending.completes_lane() {
            metrics::record_lane_completed();
            debug!(target: "audion-lanes", lane = ?key, "lane completed");
        }
        if let Some(successor) = lane.successor {
            self.lanes.insert(key, *successor);
        }
        lane.pending
    }
}

/// Debounce `input` into `output` until the input closes; lanes still pending at that point
/// are emitted when their windows elapse.
pub async fn run_lanes<T>(window: Duration, mut input: mpsc::Receiver<T>, output: mpsc::Sender<T>)
where
    T: LaneItem + Send,
    T::Key: Send,
{
    let mut lanes = PartitionDebounce::new(window);
    loop {
        let deadline = lanes.next_deadline();
        tokio::select! {
            biased;
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                for item in lanes.drain_due(Instant::now()) {
                    if output.send(item).await.is_err() {
                        debug!(target: "audion-lanes", "lane output dropped");
                        return;
                    }
                }
            }
            item = input.recv() => match item {
                Some(item) => lanes.push(item, Instant::now()),
                None => break,
            },
        }
    }

    while let Some(deadline) = lanes.next_deadline() {
        sleep_until(deadline).await;
        for item in lanes.drain_due(Instant::now()) {
            if output.send(item).await.is_err() {
                return;
            }
        }
    }
    debug!(target: "audion-lanes", "lane driver exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(16);

    #[derive(Clone, Debug, PartialEq)]
    struct Tick {
        key: &'static str,
        value: u32,
        last: bool,
    }

    impl LaneItem for Tick {
        type Key = &'static str;

        fn lane_key(&self) -> &'static str {
            self.key
        }

        fn completes_lane(&self) -> bool {
            self.last
        }
    }

    fn tick(key: &'static str, value: u32) -> Tick {
        Tick {
            key,
            value,
            last: false,
        }
    }

    fn terminal(key: &'static str) -> Tick {
        Tick {
            key,
            value: 0,
            last: true,
        }
    }

    #[test]
    fn burst_within_window_emits_last_only() {
        let start = Instant::now();
        let mut lanes = PartitionDebounce::new(WINDOW);
        for value in 0..10 {
            lanes.push(tick("a", value), start + Duration::from_millis(value as u64));
        }
        assert!(lanes.drain_due(start + Duration::from_millis(15)).is_empty());
        assert_eq!(lanes.next_deadline(), Some(start + WINDOW));

        let emitted = lanes.drain_due(start + WINDOW);
        assert_eq!(emitted, vec![tick("a", 9)]);
        assert!(lanes.is_empty());
    }

    #[test]
    fn lanes_are_independent() {
        let start = Instant::now();
        let mut lanes = PartitionDebounce::new(WINDOW);
        lanes.push(tick("a", 1), start);
        for value in 0..50 {
            lanes.push(tick("b", value), start + Duration::from_millis(4));
        }
        lanes.push(tick("a", 2), start + Duration::from_millis(8));

        let emitted = lanes.drain_due(start + Duration::from_millis(40));
        assert_eq!(emitted, vec![tick("a", 2), tick("b", 49)]);
    }

    #[test]
    fn window_restarts_after_emission() {
        let start = Instant::now();
        let mut lanes = PartitionDebounce::new(WINDOW);
        lanes.push(tick("a", 1), start);
        assert_eq!(lanes.drain_due(start + WINDOW).len(), 1);

        let later = start + Duration::from_millis(100);
        lanes.push(tick("a", 2), later);
        assert_eq!(lanes.next_deadline(), Some(later + WINDOW));
    }

    #[test]
    fn terminal_is_never_replaced() {
        let start = Instant::now();
        let mut lanes = PartitionDebounce::new(WINDOW);
        lanes.push(tick("a", 1), start);
        lanes.push(terminal("a"), start + Duration::from_millis(2));
        lanes.push(tick("a", 7), start + Duration::from_millis(4));
        lanes.push(tick("a", 8), start + Duration::from_millis(5));

        let emitted = lanes.drain_due(start + Duration::from_millis(30));
        assert_eq!(emitted, vec![terminal("a"), tick("a", 8)]);
        assert!(lanes.is_empty());
    }

    #[test]
    fn successor_waits_for_its_own_window() {
        let start = Instant::now();
        let mut lanes = PartitionDebounce::new(WINDOW);
        lanes.push(terminal("a"), start);
        lanes.push(tick("a", 3), start + Duration::from_millis(10));

        assert_eq!(lanes.drain_due(start + WINDOW), vec![terminal("a")]);
        assert_eq!(
            lanes.next_deadline(),
            Some(start + Duration::from_millis(10) + WINDOW)
        );
        assert_eq!(lanes.drain_all(), vec![tick("a", 3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn driver_coalesces_and_flushes_on_close() {
        let (in_tx, in_rx) = mpsc::channel(64);
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let driver = tokio::spawn(run_lanes(WINDOW, in_rx, out_tx));

        for value in 0..5 {
            in_tx.send(tick("a", value)).await.unwrap();
        }
        in_tx.send(tick("b", 1)).await.unwrap();
        let first = out_rx.recv().await.unwrap();
        let second = out_rx.recv().await.unwrap();
        let mut got = vec![first, second];
        got.sort_by_key(|item| item.key);
        assert_eq!(got, vec![tick("a", 4), tick("b", 1)]);

        in_tx.send(tick("a", 9)).await.unwrap();
        drop(in_tx);
        assert_eq!(out_rx.recv().await, Some(tick("a", 9)));
        assert_eq!(out_rx.recv().await, None);
        driver.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_window_passes_items_through() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        tokio::spawn(run_lanes(Duration::ZERO, in_rx, out_tx));

        in_tx.send(tick("a", 1)).await.unwrap();
        assert_eq!(out_rx.recv().await, Some(tick("a", 1)));
        in_tx.send(tick("a", 2)).await.unwrap();
        assert_eq!(out_rx.recv().await, Some(tick("a", 2)));
    }
}
