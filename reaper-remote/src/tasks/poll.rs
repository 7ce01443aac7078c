use std::{sync::Arc, time::Duration};

use log::{debug, error, warn};
use tokio::{
    sync::mpsc,
    task::{JoinHandle, JoinSet},
    time::{self, MissedTickBehavior},
};

use crate::{
    proto::{Command, Request, Response, TempoSnapshot},
    transport::Transport,
    Message, Result, Sequence,
};

/// Requests allowed to be outstanding before ticks are skipped.
const MAX_IN_FLIGHT: usize = 4;

/// Recurring `GET` of the tempo string.
///
/// Each tick issues its own request without waiting for the previous one,
/// so responses can arrive out of order. Every request carries a sequence
/// number and anything older than the last applied response is dropped.
pub(crate) struct PollTask<T: Transport> {
    transport: Arc<T>,
    seq: Sequence,
    commands: Vec<Command>,
    period: Duration,
    msg_tx: mpsc::Sender<Message>,
    in_flight: JoinSet<(u64, Result<Response>)>,
    last_applied: u64,
    reachable: bool,
}

impl<T: Transport> PollTask<T> {
    pub(crate) fn new(
        transport: Arc<T>,
        seq: Sequence,
        commands: Vec<Command>,
        period: Duration,
        msg_tx: mpsc::Sender<Message>,
    ) -> PollTask<T> {
        PollTask {
            transport,
            seq,
            commands,
            period,
            msg_tx,
            in_flight: JoinSet::new(),
            last_applied: 0,
            reachable: true,
        }
    }

    pub(crate) async fn run(mut self) -> Result<()> {
        let mut ticker = time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.msg_tx.closed() => {
                    return Ok(())
                }
                _ = ticker.tick() => self.fire(),
                Some(res) = self.in_flight.join_next() => {
                    match res {
                        Ok((seq, res)) => self.handle_response(seq, res).await?,
                        Err(e) => debug!(target: "reaper_remote", "poll request did not finish: {}", e),
                    }
                }
            }
        }
    }

    fn fire(&mut self) {
        if self.in_flight.len() >= MAX_IN_FLIGHT {
            debug!(
                target: "reaper_remote",
                "{} polls outstanding, skipping tick",
                self.in_flight.len()
            );
            return;
        }

        let request = Request::new(self.seq.next(), self.commands.clone());
        let transport = self.transport.clone();
        self.in_flight.spawn(async move {
            let seq = request.seq;
            (seq, transport.send(request).await)
        });
    }

    async fn handle_response(&mut self, seq: u64, res: Result<Response>) -> Result<()> {
        let response = match res {
            Ok(response) => response,
            Err(e) => {
                warn!("poll {} failed: {}", seq, e);
                if self.reachable {
                    self.reachable = false;
                    self.msg_tx
                        .send(Message::HostUnreachable(e.to_string()))
                        .await?;
                }
                return Ok(());
            }
        };

        if !self.reachable {
            self.reachable = true;
            self.msg_tx.send(Message::HostReachable).await?;
        }

        if seq <= self.last_applied {
            debug!(
                "dropping stale response {} (already applied {})",
                seq, self.last_applied
            );
            return Ok(());
        }
        self.last_applied = seq;

        for token in &response.tokens {
            match TempoSnapshot::decode(token) {
                Some(Ok(snapshot)) => self.msg_tx.send(Message::Tempo(snapshot)).await?,
                Some(Err(e)) => {
                    warn!("{}", e);
                    self.msg_tx
                        .send(Message::MalformedTempo(e.to_string()))
                        .await?;
                }
                // Some other consumer's key.
                None => (),
            }
        }
        Ok(())
    }
}

/// Owns the spawned poll task. Dropping the handle stops the task along
/// with any requests it still has in flight.
pub(crate) struct PollHandle {
    handle: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub(crate) fn spawn<T: Transport>(task: PollTask<T>) -> PollHandle {
        let handle = tokio::spawn(async move {
            if let Err(e) = task.run().await {
                error!(target: "reaper_remote", "poll task error: {}", e);
            }
        });
        PollHandle {
            handle: Some(handle),
        }
    }

    pub(crate) async fn cancel(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}
