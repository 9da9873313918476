//! Event loop tying a channel to the dispatcher.
//!
//! Each user gets a lane: a queue drained by one worker task. The worker
//! takes the user's session lock in arrival order and only then hands the
//! event to a dispatch task, so a user's events are processed in order while
//! other users proceed concurrently. Because handlers give the lock up during
//! backend calls, a `/cancel` queued behind a slow scan still runs promptly.
//!
//! A lane with nothing to do for the session idle timeout shuts down; the
//! user's next message starts a new one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::channels::{Channel, IncomingMessage, StatusUpdate};
use crate::dispatcher::{Dispatcher, Event, Notifier, OutgoingContent};
use crate::error::Error;
use crate::gateway::ApiGateway;
use crate::session::{SessionGuard, UserId, spawn_prune_task};

type Lane = mpsc::UnboundedSender<(IncomingMessage, Event)>;

/// How often closed lanes are dropped from the lane map.
const LANE_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Sends interim notices through the channel the event came from.
struct ChannelNotifier<'a> {
    channel: &'a dyn Channel,
    metadata: &'a serde_json::Value,
}

#[async_trait]
impl Notifier for ChannelNotifier<'_> {
    async fn notify(&self, content: OutgoingContent) {
        if let Err(e) = self
            .channel
            .send_status(StatusUpdate::Notice(content), self.metadata)
            .await
        {
            warn!(channel = self.channel.name(), error = %e, "Failed to send notice");
        }
    }
}

pub struct Runtime {
    channel: Arc<dyn Channel>,
    dispatcher: Arc<Dispatcher>,
    gateway: Arc<ApiGateway>,
    session_idle_timeout: Duration,
}

impl Runtime {
    pub fn new(
        channel: Arc<dyn Channel>,
        dispatcher: Arc<Dispatcher>,
        gateway: Arc<ApiGateway>,
        session_idle_timeout: Duration,
    ) -> Self {
        Self {
            channel,
            dispatcher,
            gateway,
            session_idle_timeout,
        }
    }

    /// Run until Ctrl+C or until the channel's stream ends.
    pub async fn run(self) -> Result<(), Error> {
        self.channel.health_check().await?;
        let mut message_stream = self.channel.start().await?;

        let pruning_handle = spawn_prune_task(
            Arc::clone(self.dispatcher.sessions()),
            self.session_idle_timeout,
        );
        let mut lanes: HashMap<UserId, Lane> = HashMap::new();
        let mut sweep = tokio::time::interval(LANE_SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(channel = self.channel.name(), "SPL Shield bot ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C received, shutting down...");
                    break;
                }
                _ = sweep.tick() => {
                    lanes.retain(|_, lane| !lane.is_closed());
                    debug!(lanes = lanes.len(), "Swept idle lanes");
                    continue;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            info!("Channel stream ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            let Some(event) = message.to_event() else {
                debug!(user = %message.user_id, input = ?message.input, "Ignoring unknown action");
                continue;
            };

            self.send_typing(&message);

            let user = message.user_id.clone();
            let lane = lanes
                .entry(user.clone())
                .or_insert_with(|| self.spawn_lane());
            if let Err(mpsc::error::SendError(item)) = lane.send((message, event)) {
                debug!(%user, "Lane closed; starting a new one");
                let lane = self.spawn_lane();
                let _ = lane.send(item);
                lanes.insert(user, lane);
            }
        }

        // Cleanup
        info!("Bot shutting down...");
        pruning_handle.abort();
        drop(lanes);
        self.channel.shutdown().await?;
        self.gateway.close().await;

        Ok(())
    }

    fn send_typing(&self, message: &IncomingMessage) {
        let channel = Arc::clone(&self.channel);
        let metadata = message.metadata.clone();
        tokio::spawn(async move {
            let _ = channel.send_status(StatusUpdate::Typing, &metadata).await;
        });
    }

    fn spawn_lane(&self) -> Lane {
        let (tx, mut rx) = mpsc::unbounded_channel::<(IncomingMessage, Event)>();
        let channel = Arc::clone(&self.channel);
        let dispatcher = Arc::clone(&self.dispatcher);
        let idle = self.session_idle_timeout;

        tokio::spawn(async move {
            loop {
                match tokio::time::timeout(idle, rx.recv()).await {
                    Ok(Some(item)) => forward(&channel, &dispatcher, item).await,
                    Ok(None) => break,
                    Err(_) => {
                        // Refuse new sends, then finish what already arrived.
                        rx.close();
                        while let Some(item) = rx.recv().await {
                            forward(&channel, &dispatcher, item).await;
                        }
                        break;
                    }
                }
            }
        });
        tx
    }
}

/// Take the user's session lock in lane order, then dispatch off the lane.
async fn forward(
    channel: &Arc<dyn Channel>,
    dispatcher: &Arc<Dispatcher>,
    (message, event): (IncomingMessage, Event),
) {
    let guard = dispatcher.sessions().lock(&message.user_id).await;
    tokio::spawn(handle(
        Arc::clone(channel),
        Arc::clone(dispatcher),
        guard,
        message,
        event,
    ));
}

async fn handle(
    channel: Arc<dyn Channel>,
    dispatcher: Arc<Dispatcher>,
    guard: SessionGuard,
    message: IncomingMessage,
    event: Event,
) {
    let notifier = ChannelNotifier {
        channel: channel.as_ref(),
        metadata: &message.metadata,
    };
    let Some(reply) = dispatcher.dispatch_locked(guard, event, &notifier).await else {
        debug!(user = %message.user_id, "No reply for superseded request");
        if let Err(e) = channel.discard_notice(&message.metadata).await {
            warn!(user = %message.user_id, channel = channel.name(), error = %e, "Failed to withdraw notice");
        }
        return;
    };
    if let Err(e) = channel.respond(&message, reply).await {
        error!(user = %message.user_id, channel = channel.name(), error = %e, "Failed to send reply");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::channels::MessageStream;
    use crate::dispatcher::NoopNotifier;
    use crate::error::ChannelError;
    use crate::session::{ConversationState, SessionStore, Tier};

    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    /// Channel fed from a fixed list of messages, recording what it sends.
    #[derive(Default)]
    struct ScriptedChannel {
        script: Mutex<Vec<IncomingMessage>>,
        replies: Mutex<Vec<String>>,
        notices: Mutex<usize>,
        discarded: Mutex<usize>,
        shut_down: Mutex<bool>,
    }

    impl ScriptedChannel {
        fn replies(&self) -> usize {
            self.replies.lock().unwrap().len()
        }
    }

    fn runtime(channel: Arc<ScriptedChannel>, backend_url: &str, idle: Duration) -> Runtime {
        let gateway = Arc::new(ApiGateway::new(backend_url, Duration::from_secs(1)));
        let dispatcher = Arc::new(Dispatcher::new(
            gateway.clone(),
            SessionStore::new(),
            HashSet::new(),
        ));
        Runtime::new(channel, dispatcher, gateway, idle)
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..400 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            let script = std::mem::take(&mut *self.script.lock().unwrap());
            Ok(Box::pin(futures::stream::iter(script)))
        }

        async fn respond(
            &self,
            _msg: &IncomingMessage,
            response: OutgoingContent,
        ) -> Result<(), ChannelError> {
            self.replies.lock().unwrap().push(response.text);
            Ok(())
        }

        async fn send_status(
            &self,
            status: StatusUpdate,
            _metadata: &serde_json::Value,
        ) -> Result<(), ChannelError> {
            if let StatusUpdate::Notice(_) = status {
                *self.notices.lock().unwrap() += 1;
            }
            Ok(())
        }

        async fn discard_notice(&self, _metadata: &serde_json::Value) -> Result<(), ChannelError> {
            *self.discarded.lock().unwrap() += 1;
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), ChannelError> {
            *self.shut_down.lock().unwrap() = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn processes_each_users_messages_in_order() {
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");
        let script = vec![
            IncomingMessage::new("scripted", alice.clone(), "/register"),
            IncomingMessage::new("scripted", bob.clone(), "/login"),
            IncomingMessage::new("scripted", alice.clone(), "alice@example.com"),
            IncomingMessage::action("scripted", bob.clone(), "bogus"),
            IncomingMessage::new("scripted", alice.clone(), "secret1"),
            IncomingMessage::new("scripted", bob.clone(), "bob@example.com"),
        ];
        let channel = Arc::new(ScriptedChannel {
            script: Mutex::new(script),
            ..Default::default()
        });

        let gateway = Arc::new(ApiGateway::new("http://127.0.0.1:9", Duration::from_secs(1)));
        let sessions = SessionStore::new();
        let dispatcher = Arc::new(Dispatcher::new(
            gateway.clone(),
            Arc::clone(&sessions),
            HashSet::new(),
        ));

        Runtime::new(channel.clone(), dispatcher, gateway, Duration::from_secs(3600))
            .run()
            .await
            .unwrap();

        // Dispatch tasks outlive the loop; wait for the five replies.
        for _ in 0..200 {
            if channel.replies.lock().unwrap().len() == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(channel.replies.lock().unwrap().len(), 5);
        assert!(*channel.shut_down.lock().unwrap());
        assert_eq!(
            sessions.get(&alice).await.state,
            ConversationState::AwaitingConfirmPassword
        );
        assert_eq!(
            sessions.get(&bob).await.state,
            ConversationState::AwaitingPasswordLogin
        );
    }

    #[tokio::test]
    async fn idle_lane_shuts_down() {
        let channel = Arc::new(ScriptedChannel::default());
        let runtime = runtime(channel.clone(), "http://127.0.0.1:9", Duration::from_millis(50));
        let alice = UserId::from("alice");

        let lane = runtime.spawn_lane();
        let message = IncomingMessage::new("scripted", alice.clone(), "/help");
        let event = message.to_event().unwrap();
        lane.send((message, event)).unwrap();

        tokio::time::timeout(Duration::from_secs(2), lane.closed())
            .await
            .expect("lane closes once idle");
        wait_until(|| channel.replies() == 1).await;
        assert_eq!(channel.replies(), 1);

        let message = IncomingMessage::new("scripted", alice, "/help");
        let event = message.to_event().unwrap();
        assert!(lane.send((message, event)).is_err());
    }

    #[tokio::test]
    async fn cancelled_scan_withdraws_its_notice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/scan"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "risk_score": 0.1 }))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let channel = Arc::new(ScriptedChannel::default());
        let runtime = runtime(channel.clone(), &server.uri(), Duration::from_secs(3600));
        let dispatcher = Arc::clone(&runtime.dispatcher);
        let user = UserId::from(9i64);
        dispatcher
            .dispatch(&user, Event::from_text(&format!("/scan {USDC}")), &NoopNotifier)
            .await
            .unwrap();

        let guard = dispatcher.sessions().lock(&user).await;
        let message = IncomingMessage::action("scripted", user.clone(), "scan_tier:free");
        let scan = tokio::spawn(handle(
            runtime.channel.clone(),
            Arc::clone(&dispatcher),
            guard,
            message,
            Event::TierSelected(Tier::Free),
        ));
        wait_until(|| *channel.notices.lock().unwrap() == 1).await;

        let reply = dispatcher.dispatch(&user, Event::Cancel, &NoopNotifier).await;
        assert!(reply.unwrap().text.contains("cancelled"));
        scan.await.unwrap();

        assert_eq!(*channel.discarded.lock().unwrap(), 1);
        assert_eq!(channel.replies(), 0);
        assert_eq!(dispatcher.sessions().get(&user).await.state, ConversationState::Idle);
    }
}
