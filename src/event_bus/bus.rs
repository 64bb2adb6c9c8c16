use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::BoxStream;
use tokio::{sync::oneshot, task};

use super::event::{Event, STREAM_END_SCOPE};
use super::sink::{EventSink, StdOutSink};

/// Receives events from workflow nodes and broadcasts them to sinks and
/// subscriber streams.
///
/// Producers hold a cheap [`flume::Sender`] obtained from
/// [`get_sender`](EventBus::get_sender); a background listener task drains
/// the channel, hands each event to every sink, and fans it out to every
/// live subscriber. Emission order is preserved end to end.
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    event_channel: (flume::Sender<Event>, flume::Receiver<Event>),
    subscribers: Arc<Mutex<Vec<flume::Sender<Event>>>>,
    listener: Arc<Mutex<Option<ListenerState>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink::default())
    }
}

impl EventBus {
    /// Create an EventBus with a single sink.
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self::with_sinks(vec![Box::new(sink)])
    }

    /// Create an EventBus with multiple sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
            event_channel: flume::unbounded(),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Dynamically add a sink (useful for per-request streaming).
    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.add_boxed_sink(Box::new(sink));
    }

    pub fn add_boxed_sink(&self, sink: Box<dyn EventSink>) {
        self.sinks.lock().expect("sinks poisoned").push(sink);
    }

    /// Clone of the sender side so producers can emit events.
    pub fn get_sender(&self) -> flume::Sender<Event> {
        self.event_channel.0.clone()
    }

    /// Subscribe to the live event feed.
    ///
    /// Each subscriber receives every event emitted after subscription, in
    /// emission order. Dropping the stream only detaches that consumer;
    /// the run is unaffected.
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = flume::unbounded();
        self.subscribers
            .lock()
            .expect("subscribers poisoned")
            .push(tx);
        EventStream { receiver: rx }
    }

    /// Detach all subscriber streams, ending them after any queued events.
    pub fn close_subscribers(&self) {
        self.subscribers
            .lock()
            .expect("subscribers poisoned")
            .clear();
    }

    /// Spawn the background listener task. Idempotent.
    pub fn listen_for_events(&self) {
        let mut guard = self.listener.lock().expect("listener poisoned");
        if guard.is_some() {
            return;
        }

        let receiver = self.event_channel.1.clone();
        let sinks = self.sinks.clone();
        let subscribers = self.subscribers.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    recv = receiver.recv_async() => match recv {
                        Err(_) => break,
                        Ok(event) => {
                            {
                                let mut sinks = sinks.lock().expect("sinks poisoned");
                                for sink in sinks.iter_mut() {
                                    if let Err(e) = sink.handle(&event) {
                                        tracing::debug!(error = %e, "event sink failed");
                                    }
                                }
                            }
                            let mut subs = subscribers.lock().expect("subscribers poisoned");
                            subs.retain(|tx| tx.send(event.clone()).is_ok());
                        }
                    }
                }
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the background listener task.
    pub async fn stop_listener(&self) {
        let state = {
            let mut guard = self.listener.lock().expect("listener poisoned");
            guard.take()
        };
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.listener.lock()
            && let Some(state) = guard.take()
        {
            let _ = state.shutdown_tx.send(());
            state.handle.abort();
        }
    }
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}

/// One consumer's ordered view of the event feed.
pub struct EventStream {
    receiver: flume::Receiver<Event>,
}

impl EventStream {
    /// Await the next event; `None` once the feed is closed and drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv_async().await.ok()
    }

    /// Non-blocking poll for a queued event.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }

    /// Await the next event with a timeout.
    pub async fn next_timeout(&mut self, duration: Duration) -> Option<Event> {
        tokio::time::timeout(duration, self.recv()).await.ok()?
    }

    /// Convert into an async [`Stream`](futures_util::Stream) of events.
    pub fn into_async_stream(self) -> BoxStream<'static, Event> {
        Box::pin(self.receiver.into_stream())
    }

    /// Drain events until (and including) the stream-end diagnostic, with a
    /// per-event timeout. Primarily a test helper.
    pub async fn drain_until_end(mut self, per_event: Duration) -> Vec<Event> {
        let mut collected = Vec::new();
        while let Some(event) = self.next_timeout(per_event).await {
            let is_end = event.scope_label() == Some(STREAM_END_SCOPE);
            collected.push(event);
            if is_end {
                break;
            }
        }
        collected
    }
}
