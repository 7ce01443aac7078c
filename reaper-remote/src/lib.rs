use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::anyhow;
use log::{info, warn};
use thiserror::Error;
use tokio::sync::mpsc;

mod display;
pub mod fullscreen;
pub mod message;
pub mod notification;
mod proto;
mod tasks;
pub mod transport;

use tasks::poll::{PollHandle, PollTask};

pub use display::{
    pad_tempo, set_fill_color, DisplayConfig, DisplayMode, DisplaySlots, Slot, SlotBoard,
    SlotState, TempoDisplay,
};
pub use message::Message;
pub use proto::{
    Command, ExtStateKey, Request, Response, StatusToken, TempoSnapshot, NAMESPACE,
    TEMPO_SENTINEL,
};
pub use transport::{HttpTransport, Transport};

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("terminating")]
    Terminating,

    #[error("malformed payload {payload:?}: {reason}")]
    MalformedPayload { payload: String, reason: String },

    #[error("no display slot named {0}")]
    MissingSlot(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    MessageSendError(#[from] mpsc::error::SendError<Message>),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

#[derive(Debug, Clone)]
pub struct Config {
    /// Extended-state section shared with the host side script.
    pub namespace: String,
    pub refresh_hz: u32,
    /// Action or script id triggered once after attaching.
    pub startup_action: Option<String>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            namespace: NAMESPACE.to_string(),
            refresh_hz: 20,
            startup_action: Some("_RSc99929bd32300e82b11053618eb27000e0bdbefa".to_string()),
        }
    }
}

impl Config {
    /// Never shorter than 1 ms, rates above 2 kHz all poll at that floor.
    pub fn refresh_interval(&self) -> Duration {
        let hz = self.refresh_hz.max(1) as f64;
        Duration::from_millis((1000.0 / hz).round() as u64).max(Duration::from_millis(1))
    }
}

/// Request sequence numbers, shared by one-shot requests and the poll task.
#[derive(Clone, Debug, Default)]
pub(crate) struct Sequence(Arc<AtomicU64>);

impl Sequence {
    pub(crate) fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// One attached remote. Dropping it without `detach` stops polling but
/// leaves the host's client count incremented.
pub struct Remote<T: Transport> {
    config: Config,
    transport: Arc<T>,
    seq: Sequence,
    poll: PollHandle,
    msg_rx: mpsc::Receiver<Message>,
}

impl<T: Transport> Remote<T> {
    pub async fn attach(config: Config, transport: T) -> Result<Remote<T>> {
        if config.refresh_hz == 0 {
            return Err(anyhow!("refresh rate must be at least 1 Hz").into());
        }

        let transport = Arc::new(transport);
        let seq = Sequence::default();
        let ns = &config.namespace;

        // Presence has to be announced before the first poll goes out.
        transport
            .send(Request::new(
                seq.next(),
                vec![
                    Command::set(ns, ExtStateKey::HzRefresh, config.refresh_hz),
                    Command::set(ns, ExtStateKey::ClientDelta, 1),
                    Command::set(ns, ExtStateKey::TempoString, TEMPO_SENTINEL),
                ],
            ))
            .await?;

        let (msg_tx, msg_rx) = mpsc::channel(256);
        let poll = PollTask::new(
            transport.clone(),
            seq.clone(),
            vec![Command::get(ns, ExtStateKey::TempoString)],
            config.refresh_interval(),
            msg_tx,
        );
        let poll = PollHandle::spawn(poll);
        info!(
            "attached to {}, polling every {:?}",
            config.namespace,
            config.refresh_interval()
        );

        let remote = Remote {
            config,
            transport,
            seq,
            poll,
            msg_rx,
        };

        let started = match remote.config.startup_action.clone() {
            Some(action) => remote.request(vec![Command::Action(action)]).await.map(|_| ()),
            None => Ok(()),
        };
        if let Err(e) = started {
            warn!("startup action failed: {}", e);
            remote.detach().await?;
            return Err(e);
        }

        Ok(remote)
    }

    /// One-shot request outside the recurring poll.
    pub async fn request(&self, commands: Vec<Command>) -> Result<Vec<StatusToken>> {
        let response = self
            .transport
            .send(Request::new(self.seq.next(), commands))
            .await?;
        Ok(response.tokens)
    }

    pub async fn next(&mut self) -> Result<Message> {
        // The poll task only goes away when it is cancelled or fails.
        self.msg_rx.recv().await.ok_or(RemoteError::Terminating)
    }

    pub async fn detach(self) -> Result<()> {
        let Remote {
            config,
            transport,
            seq,
            poll,
            msg_rx,
        } = self;

        poll.cancel().await;
        drop(msg_rx);

        transport
            .send(Request::new(
                seq.next(),
                vec![Command::set(&config.namespace, ExtStateKey::ClientDelta, -1)],
            ))
            .await?;
        info!("detached from {}", config.namespace);
        Ok(())
    }
}
