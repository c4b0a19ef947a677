use std::sync::Arc;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

use crate::error::SchedulerError;

/// Create a weighted two-queue priority channel.
///
/// `high_priority_weight` is the target percentage of dequeues served from
/// the high-priority queue while both queues hold items. Producers enqueue
/// through the clone-able [`PrioritySender`]; any number of workers share the
/// [`PriorityConsumer`] and pull with [`PriorityConsumer::next`].
///
/// Delivery guarantees: every enqueued item is dequeued exactly once, the
/// consumer never blocks on an empty queue while the other has items, and
/// with both queues under sustained contention the empirical high-priority
/// fraction converges on `weight / 100`.
pub fn priority_channel<T>(
    high_priority_weight: u8,
) -> Result<(PrioritySender<T>, PriorityConsumer<T>), SchedulerError> {
    if high_priority_weight > 100 {
        return Err(SchedulerError::InvalidWeight(high_priority_weight));
    }

    let (high_tx, high_rx) = mpsc::unbounded_channel();
    let (background_tx, background_rx) = mpsc::unbounded_channel();

    let sender = PrioritySender {
        high: high_tx,
        background: background_tx,
    };
    let consumer = PriorityConsumer {
        inner: Arc::new(Inner {
            weight: high_priority_weight,
            queues: Mutex::new(Queues {
                high: high_rx,
                high_closed: false,
                background: background_rx,
                background_closed: false,
            }),
        }),
    };

    Ok((sender, consumer))
}

/// Producer half of a priority channel.
pub struct PrioritySender<T> {
    high: UnboundedSender<T>,
    background: UnboundedSender<T>,
}

impl<T> PrioritySender<T> {
    /// Enqueue onto the interactive queue.
    pub fn send_high(&self, item: T) -> Result<(), SchedulerError> {
        self.high
            .send(item)
            .map_err(|_| SchedulerError::Disconnected)
    }

    /// Enqueue onto the background queue.
    pub fn send_background(&self, item: T) -> Result<(), SchedulerError> {
        self.background
            .send(item)
            .map_err(|_| SchedulerError::Disconnected)
    }
}

impl<T> Clone for PrioritySender<T> {
    fn clone(&self) -> Self {
        Self {
            high: self.high.clone(),
            background: self.background.clone(),
        }
    }
}

struct Queues<T> {
    high: UnboundedReceiver<T>,
    high_closed: bool,
    background: UnboundedReceiver<T>,
    background_closed: bool,
}

struct Inner<T> {
    weight: u8,
    queues: Mutex<Queues<T>>,
}

/// Consumer half of a priority channel, shareable across workers.
pub struct PriorityConsumer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for PriorityConsumer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> PriorityConsumer<T> {
    /// Dequeue the next item.
    ///
    /// Takes from the only non-empty queue, draws by weight when both are
    /// ready, and suspends cooperatively when both are empty. Returns
    /// [`SchedulerError::Disconnected`] once all senders are dropped and
    /// both queues are drained.
    pub async fn next(&self) -> Result<T, SchedulerError> {
        let mut queues = self.inner.queues.lock().await;

        loop {
            let high_ready = !queues.high.is_empty();
            let background_ready = !queues.background.is_empty();

            match (high_ready, background_ready) {
                (true, true) => {
                    let take_high = rand::rng().random_range(0..100u8) < self.inner.weight;
                    let taken = if take_high {
                        queues.high.try_recv()
                    } else {
                        queues.background.try_recv()
                    };
                    if let Ok(item) = taken {
                        return Ok(item);
                    }
                }
                (true, false) => match queues.high.try_recv() {
                    Ok(item) => return Ok(item),
                    Err(TryRecvError::Disconnected) => queues.high_closed = true,
                    Err(TryRecvError::Empty) => {}
                },
                (false, true) => match queues.background.try_recv() {
                    Ok(item) => return Ok(item),
                    Err(TryRecvError::Disconnected) => queues.background_closed = true,
                    Err(TryRecvError::Empty) => {}
                },
                (false, false) => {
                    if queues.high_closed && queues.background_closed {
                        return Err(SchedulerError::Disconnected);
                    }
                    if queues.high_closed {
                        match queues.background.recv().await {
                            Some(item) => return Ok(item),
                            None => queues.background_closed = true,
                        }
                    } else if queues.background_closed {
                        match queues.high.recv().await {
                            Some(item) => return Ok(item),
                            None => queues.high_closed = true,
                        }
                    } else {
                        let queues = &mut *queues;
                        tokio::select! {
                            item = queues.high.recv() => match item {
                                Some(item) => return Ok(item),
                                None => queues.high_closed = true,
                            },
                            item = queues.background.recv() => match item {
                                Some(item) => return Ok(item),
                                None => queues.background_closed = true,
                            },
                        }
                    }
                }
            }
        }
    }
}
