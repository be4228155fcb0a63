//! Per-key debouncing of change events.

use std::collections::HashMap;
use std::fmt;
use std::future::poll_fn;
use std::task::{Context, Poll};
use std::time::Duration;

use tickboard_model::{CoalescedChangeEvent, DebounceKey};
use tokio_util::time::{DelayQueue, delay_queue};

/// Holds at most one pending event per [`DebounceKey`].
///
/// Pushing an event whose key is already pending replaces the stored event
/// and restarts that key's timer. A key is released once its timer runs out
/// with no further pushes. Keys never share timers.
pub struct Debouncer {
    window: Duration,
    timers: DelayQueue<DebounceKey>,
    pending: HashMap<DebounceKey, Pending>,
}

struct Pending {
    event: CoalescedChangeEvent,
    timer: delay_queue::Key,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            timers: DelayQueue::new(),
            pending: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record `event`, superseding any pending event with the same key.
    pub fn push(&mut self, event: CoalescedChangeEvent) {
        let key = event.key();
        if let Some(pending) = self.pending.get_mut(&key) {
            self.timers.reset(&pending.timer, self.window);
            pending.event = event;
            return;
        }

        let timer = self.timers.insert(key.clone(), self.window);
        self.pending.insert(key, Pending { event, timer });
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every pending event without emitting it.
    pub fn clear(&mut self) {
        self.timers.clear();
        self.pending.clear();
    }

    pub fn poll_expired(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Option<CoalescedChangeEvent>> {
        loop {
            match self.timers.poll_expired(cx) {
                Poll::Ready(Some(expired)) => {
                    let key = expired.into_inner();
                    if let Some(pending) = self.pending.remove(&key) {
                        return Poll::Ready(Some(pending.event));
                    }
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    /// Wait for the next key whose window has closed.
    ///
    /// Resolves to `None` immediately when nothing is pending.
    pub async fn next_expired(&mut self) -> Option<CoalescedChangeEvent> {
        poll_fn(|cx| self.poll_expired(cx)).await
    }
}

impl fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("window", &self.window)
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tickboard_model::ChangeKind;
    use tokio::time::{Instant, sleep, timeout};

    const WINDOW: Duration = Duration::from_millis(100);

    fn change(
        kind: ChangeKind,
        filename: &str,
        project: &str,
        ts: i64,
    ) -> CoalescedChangeEvent {
        CoalescedChangeEvent {
            event_type: kind,
            filename: filename.to_string(),
            project_id: project.to_string(),
            timestamp: ts,
            path: PathBuf::from("/board").join(filename),
        }
    }

    async fn drain(debouncer: &mut Debouncer) -> Vec<CoalescedChangeEvent> {
        let mut out = Vec::new();
        while let Some(event) = debouncer.next_expired().await {
            out.push(event);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_writes_emits_once_with_latest_timestamp() {
        let mut debouncer = Debouncer::new(WINDOW);
        for ts in 0..10 {
            debouncer.push(change(ChangeKind::Change, "MDT-001.md", "MDT", ts));
            sleep(Duration::from_millis(5)).await;
        }

        let events = drain(&mut debouncer).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, ChangeKind::Change);
        assert_eq!(events[0].timestamp, 9);
        assert!(debouncer.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_emitted_before_the_window_closes() {
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.push(change(ChangeKind::Add, "MDT-002.md", "MDT", 1));

        let early = timeout(Duration::from_millis(99), debouncer.next_expired()).await;
        assert!(early.is_err());

        let event = debouncer.next_expired().await.unwrap();
        assert_eq!(event.filename, "MDT-002.md");
    }

    #[tokio::test(start_paused = true)]
    async fn push_refreshes_the_window_for_its_key() {
        let mut debouncer = Debouncer::new(WINDOW);
        let start = Instant::now();
        debouncer.push(change(ChangeKind::Change, "a.md", "P", 1));
        sleep(Duration::from_millis(90)).await;
        debouncer.push(change(ChangeKind::Change, "a.md", "P", 2));

        let event = debouncer.next_expired().await.unwrap();
        assert_eq!(event.timestamp, 2);
        assert!(start.elapsed() >= Duration::from_millis(190));
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_do_not_interfere() {
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.push(change(ChangeKind::Change, "a.md", "P", 1));
        debouncer.push(change(ChangeKind::Change, "b.md", "P", 2));
        debouncer.push(change(ChangeKind::Change, "a.md", "Q", 3));
        debouncer.push(change(ChangeKind::Unlink, "a.md", "P", 4));
        assert_eq!(debouncer.len(), 4);

        sleep(Duration::from_millis(60)).await;
        // Refreshing one key leaves the others on their original schedule.
        debouncer.push(change(ChangeKind::Change, "a.md", "P", 5));

        let first_three = timeout(Duration::from_millis(50), async {
            let mut out = Vec::new();
            for _ in 0..3 {
                out.push(debouncer.next_expired().await.unwrap());
            }
            out
        })
        .await
        .unwrap();
        let mut keys: Vec<String> =
            first_three.iter().map(|e| e.key().to_string()).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["change:a.md:Q", "change:b.md:P", "unlink:a.md:P"]
        );

        let last = debouncer.next_expired().await.unwrap();
        assert_eq!(last.key().to_string(), "change:a.md:P");
        assert_eq!(last.timestamp, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_drops_pending_events() {
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.push(change(ChangeKind::Add, "a.md", "P", 1));
        debouncer.clear();
        assert!(debouncer.is_empty());
        assert!(debouncer.next_expired().await.is_none());
    }
}
