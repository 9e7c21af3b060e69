//! Connection lifecycle towards the control server.
//!
//! The link runs as its own task. It owns the transport, forwards decoded
//! commands to the coordinator and delivers the coordinator's notifications.
//! After a disconnect it reopens the transport right away and then every
//! `reconnect_interval` until the transport reports a connection again.
//! Notifications produced while offline are held in a bounded buffer and
//! flushed, oldest first, right after the device re-joins its room.

use crate::codec::{decode_command, encode_notification, join_room};
use crate::error::{RemoteError, Result};
use bridge_traits::network::{RemoteTransport, TransportEvent, TransportEventReceiver};
use core_playback::{CoordinatorHandle, LinkStatus, Notification, NotificationReceiver};
use core_runtime::config::ClientConfig;
use core_runtime::events::{CoreEvent, EventBus, LinkEvent};
use core_runtime::tasks::ScheduledTask;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Default number of notifications kept while disconnected.
pub const DEFAULT_OFFLINE_BUFFER: usize = 32;

#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub device_id: String,
    pub reconnect_interval: Duration,
    /// Oldest entries are dropped beyond this many pending notifications.
    pub offline_buffer: usize,
}

impl LinkSettings {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            reconnect_interval: Duration::from_secs(5),
            offline_buffer: DEFAULT_OFFLINE_BUFFER,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            device_id: config.device_id.clone(),
            reconnect_interval: config.remote.reconnect_interval,
            offline_buffer: DEFAULT_OFFLINE_BUFFER,
        }
    }
}

#[derive(Debug)]
enum LinkInput {
    ReconnectDue,
}

pub struct RemoteLink {
    settings: LinkSettings,
    transport: Arc<dyn RemoteTransport>,
    transport_events: TransportEventReceiver,
    notifications: NotificationReceiver,
    coordinator: CoordinatorHandle,
    events: EventBus,

    connected: bool,
    attempts: u32,
    pending: VecDeque<Notification>,
    reconnect: ScheduledTask,
    inbox_tx: mpsc::UnboundedSender<LinkInput>,
    inbox_rx: mpsc::UnboundedReceiver<LinkInput>,
}

impl RemoteLink {
    pub fn new(
        settings: LinkSettings,
        transport: Arc<dyn RemoteTransport>,
        transport_events: TransportEventReceiver,
        notifications: NotificationReceiver,
        coordinator: CoordinatorHandle,
        events: EventBus,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            settings,
            transport,
            transport_events,
            notifications,
            coordinator,
            events,
            connected: false,
            attempts: 0,
            pending: VecDeque::new(),
            reconnect: ScheduledTask::new("reconnect"),
            inbox_tx,
            inbox_rx,
        }
    }

    /// Connect and serve until the coordinator goes away.
    #[instrument(name = "remote_link", skip_all, fields(device = %self.settings.device_id))]
    pub async fn run(mut self) -> Result<()> {
        info!("Connecting to control server");
        if let Err(e) = self.transport.open().await {
            warn!(error = %e, "Initial connection failed");
            self.start_reconnecting();
        }

        let outcome = loop {
            tokio::select! {
                Some(event) = self.transport_events.recv() => {
                    if let Err(e) = self.handle_transport_event(event).await {
                        break Err(e);
                    }
                }
                notification = self.notifications.recv() => match notification {
                    Some(notification) => self.deliver(notification).await,
                    None => {
                        debug!("Notification channel closed");
                        break Ok(());
                    }
                },
                Some(LinkInput::ReconnectDue) = self.inbox_rx.recv() => self.reconnect_tick().await,
            }
        };

        self.reconnect.cancel();
        if let Err(e) = self.transport.close().await {
            debug!(error = %e, "Transport close failed");
        }
        info!("Remote link stopped");
        outcome
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) -> Result<()> {
        match event {
            TransportEvent::Connected => self.on_connected().await,
            TransportEvent::Disconnected { reason } => self.on_disconnected(reason).await,
            TransportEvent::Message { event, args } => self.on_message(&event, &args),
        }
    }

    async fn on_connected(&mut self) -> Result<()> {
        info!("Connected to main server");
        self.connected = true;
        self.attempts = 0;
        if self.reconnect.cancel() {
            debug!("Reconnect loop cancelled");
        }

        let (event, args) = join_room(&self.settings.device_id);
        if let Err(e) = self.transport.emit(event, args).await {
            warn!(error = %e, "Failed to join device room");
        }
        self.flush_pending().await;

        self.events.publish(CoreEvent::Link(LinkEvent::Connected));
        self.coordinator
            .link_status(LinkStatus::Connected)
            .map_err(|_| RemoteError::CoordinatorStopped)
    }

    async fn on_disconnected(&mut self, reason: String) -> Result<()> {
        if !self.connected && self.reconnect.is_active() {
            debug!(%reason, "Already reconnecting");
            return Ok(());
        }

        warn!(%reason, "Disconnected from server. Trying to reconnect...");
        self.connected = false;
        self.events
            .publish(CoreEvent::Link(LinkEvent::Disconnected {
                reason: reason.clone(),
            }));
        self.coordinator
            .link_status(LinkStatus::Disconnected { reason })
            .map_err(|_| RemoteError::CoordinatorStopped)?;

        if let Err(e) = self.transport.open().await {
            warn!(error = %e, "Immediate reconnect failed");
        }
        self.start_reconnecting();
        Ok(())
    }

    fn on_message(&mut self, event: &str, args: &[Value]) -> Result<()> {
        match decode_command(event, args) {
            Ok(Some(command)) => {
                info!(command = command.name(), "Received command from server");
                self.coordinator
                    .command(command)
                    .map_err(|_| RemoteError::CoordinatorStopped)
            }
            Ok(None) => {
                debug!(event, "Ignoring unknown event");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed event");
                Ok(())
            }
        }
    }

    fn start_reconnecting(&mut self) {
        let inbox = self.inbox_tx.clone();
        self.reconnect
            .start_repeating(self.settings.reconnect_interval, move || {
                let inbox = inbox.clone();
                async move { inbox.send(LinkInput::ReconnectDue).is_ok() }
            });
    }

    async fn reconnect_tick(&mut self) {
        if self.connected || self.transport.is_connected() {
            return;
        }
        self.attempts += 1;
        debug!(attempt = self.attempts, "Reconnect attempt");
        self.events
            .publish(CoreEvent::Link(LinkEvent::ReconnectAttempt {
                attempt: self.attempts,
            }));
        if let Err(e) = self.transport.open().await {
            debug!(attempt = self.attempts, error = %e, "Reconnect attempt failed");
        }
    }

    async fn deliver(&mut self, notification: Notification) {
        if self.connected {
            let (event, args) = encode_notification(&self.settings.device_id, &notification);
            match self.transport.emit(event, args).await {
                Ok(()) => {
                    debug!(event, "Notification sent");
                    return;
                }
                Err(e) => warn!(event, error = %e, "Notification not sent, keeping it for later"),
            }
        }
        self.buffer(notification);
    }

    fn buffer(&mut self, notification: Notification) {
        if self.settings.offline_buffer == 0 {
            debug!(event = notification.event_name(), "Offline, dropping notification");
            return;
        }
        if self.pending.len() >= self.settings.offline_buffer {
            if let Some(dropped) = self.pending.pop_front() {
                warn!(event = dropped.event_name(), "Offline buffer full, dropping oldest notification");
            }
        }
        self.pending.push_back(notification);
    }

    async fn flush_pending(&mut self) {
        if !self.pending.is_empty() {
            info!(count = self.pending.len(), "Sending notifications held while offline");
        }
        while let Some(notification) = self.pending.pop_front() {
            let (event, args) = encode_notification(&self.settings.device_id, &notification);
            if let Err(e) = self.transport.emit(event, args).await {
                warn!(event, error = %e, "Flush interrupted");
                self.pending.push_front(notification);
                break;
            }
        }
    }
}
