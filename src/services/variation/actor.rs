use super::events::{EvalResults, Message, VariationEvent};
use super::{Error, Service};
use crate::models::PolicyKey;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use uuid::Uuid;

/// Sending side of a running operator.
#[derive(Debug, Clone)]
pub struct Handle {
    id: Uuid,
    inbox: mpsc::UnboundedSender<Message>,
    events: broadcast::Sender<VariationEvent>,
}

impl Handle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn report(&self, results: EvalResults) -> Result<(), Error> {
        self.send(Message::EvalResults(results))
    }

    pub fn release(&self, keys: Vec<PolicyKey>) -> Result<(), Error> {
        self.send(Message::Release(keys))
    }

    pub fn stop(&self) -> Result<(), Error> {
        self.send(Message::Stop)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VariationEvent> {
        self.events.subscribe()
    }

    fn send(&self, message: Message) -> Result<(), Error> {
        self.inbox
            .send(message)
            .map_err(|_| Error::Disconnected("operator inbox"))
    }
}

/// Runs `service` on its own task, ticking every `period`.
///
/// The task ends after a `Stop` message or once every [`Handle`] is dropped, handing the
/// service back. A fatal round error stops the operator and is returned instead.
pub fn spawn(service: Service, period: Duration) -> (Handle, JoinHandle<Result<Service, Error>>) {
    let (inbox, messages) = mpsc::unbounded_channel();
    let handle = Handle {
        id: service.id(),
        inbox,
        events: service.events.clone(),
    };

    (handle, tokio::spawn(run(service, messages, period)))
}

#[tracing::instrument(level = "info", skip(service, messages), fields(operator_id = %service.id()))]
async fn run(
    mut service: Service,
    mut messages: mpsc::UnboundedReceiver<Message>,
    period: Duration,
) -> Result<Service, Error> {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // Inbox first: queued results, releases and stops are applied before the next round
        // reads the free set and the in-flight counter. Message handlers never block, and a
        // due tick stays pending until the inbox is drained.
        tokio::select! {
            biased;

            message = messages.recv() => match message {
                Some(Message::EvalResults(results)) => {
                    service.on_eval_results(&results);
                }
                Some(Message::Release(keys)) => {
                    service.on_release(&keys);
                }
                Some(Message::Stop) | None => {
                    service.on_stop();
                    return Ok(service);
                }
            },
            _ = timer.tick() => {
                if let Err(err) = service.on_timer_tick() {
                    tracing::error!(error = %err, "Variation round failed, stopping operator");
                    service.on_stop();
                    return Err(err);
                }
            }
        }
    }
}
