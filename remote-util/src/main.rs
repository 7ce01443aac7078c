use std::{path::Path, str::FromStr, time::Duration};

use anyhow::Result;
use http_types::StatusCode;
use log::{debug, error, info, warn};
use reaper_remote::{
    fullscreen::{Capability, Fullscreen, FullscreenHost},
    notification::{NotificationOptions, NotificationOverlay, Overlay},
    Config, DisplayConfig, HttpTransport, Message, Remote, SlotBoard, TempoDisplay, Transport,
};
use serde::{Deserialize, Serialize};
use structopt::StructOpt;
use tide::{prelude::*, sse, Request};
use tokio::sync::{mpsc, watch};

#[derive(StructOpt, Debug)]
#[structopt(about = "REAPER tempo remote")]
struct Opt {
    /// REAPER web interface address.
    #[structopt(long, default_value = "http://127.0.0.1:8080")]
    reaper: String,

    /// Where browsers connect to this remote.
    #[structopt(long, default_value = "127.0.0.1:8090")]
    listen: String,

    #[structopt(long, default_value = "20")]
    hz: u32,

    /// Action id run once after attaching. Empty to skip.
    #[structopt(long, default_value = "_RSc99929bd32300e82b11053618eb27000e0bdbefa")]
    action: String,

    #[structopt(long, default_value = "CustomWebInterfaceWithTempo")]
    namespace: String,

    #[structopt(long, default_value = "2000")]
    timeout_ms: u64,

    #[structopt(long, default_value = "#DDDDDD")]
    neutral_color: String,

    #[structopt(long, default_value = "#FF5050")]
    edit_cursor_color: String,

    #[structopt(long, default_value = "#50E070")]
    playhead_color: String,

    #[structopt(long, default_value = "./www")]
    www: String,
}

impl Opt {
    fn config(&self) -> Config {
        Config {
            namespace: self.namespace.clone(),
            refresh_hz: self.hz,
            startup_action: Some(self.action.clone()).filter(|a| !a.is_empty()),
        }
    }

    fn display_config(&self) -> DisplayConfig {
        DisplayConfig {
            tempo_neutral: self.neutral_color.clone(),
            edit_cursor_accent: self.edit_cursor_color.clone(),
            playhead_accent: self.playhead_color.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotifyBody {
    text: String,
    top: Option<String>,
    left: Option<String>,
    font_size: Option<String>,
    /// Milliseconds.
    display_duration: Option<u64>,
}

impl NotifyBody {
    fn options(&self) -> NotificationOptions {
        let defaults = NotificationOptions::default();
        NotificationOptions {
            top: self.top.clone().unwrap_or(defaults.top),
            left: self.left.clone().unwrap_or(defaults.left),
            font_size: self.font_size.clone().unwrap_or(defaults.font_size),
            display_duration: self
                .display_duration
                .map(Duration::from_millis)
                .unwrap_or(defaults.display_duration),
        }
    }
}

/// Sent by the page on every vendor flavour of `fullscreenchange`.
#[derive(Debug, Deserialize)]
struct FullscreenBody {
    active: bool,
    /// Variant that reports the fullscreen element, e.g. `"Webkit"`.
    #[serde(default)]
    capability: Option<String>,
    /// Variants the browser can request, in the page's probing order.
    #[serde(default)]
    supported: Vec<String>,
}

#[derive(Debug)]
enum UiEvent {
    Notify(NotifyBody),
    FullscreenChanged(FullscreenBody),
}

/// Fullscreen state as last reported by the page. The page does the actual
/// switching through whichever vendor API its browser has.
#[derive(Debug, Default)]
struct ReportedFullscreen {
    supported: Vec<Capability>,
    active: Option<Capability>,
}

impl ReportedFullscreen {
    fn report(&mut self, body: &FullscreenBody) {
        self.supported = body
            .supported
            .iter()
            .filter_map(|name| match Capability::from_str(name) {
                Ok(cap) => Some(cap),
                Err(_) => {
                    warn!("unknown fullscreen variant {:?}", name);
                    None
                }
            })
            .collect();

        self.active = if body.active {
            let reported = body
                .capability
                .as_deref()
                .and_then(|name| Capability::from_str(name).ok());
            // Older pages only send the flag.
            Some(
                reported
                    .or_else(|| self.supported.first().copied())
                    .unwrap_or(Capability::Standard),
            )
        } else {
            None
        };
    }
}

impl FullscreenHost for ReportedFullscreen {
    fn can_request(&self, cap: Capability) -> bool {
        self.supported.contains(&cap)
    }
    fn can_exit(&self, cap: Capability) -> bool {
        self.supported.contains(&cap)
    }
    fn request(&mut self, cap: Capability) {
        self.active = Some(cap);
    }
    fn exit(&mut self, _cap: Capability) {
        self.active = None;
    }
    fn has_element(&self, cap: Capability) -> bool {
        self.active == Some(cap)
    }
}

#[derive(Clone)]
struct WebState {
    board: watch::Receiver<SlotBoard>,
    overlay: watch::Receiver<Option<Overlay>>,
    ui_tx: mpsc::Sender<UiEvent>,
}

struct RemoteTask<T: Transport> {
    remote: Remote<T>,
    display: TempoDisplay,
    board: SlotBoard,
    board_tx: watch::Sender<SlotBoard>,
    overlay: NotificationOverlay,
    fullscreen: Fullscreen<ReportedFullscreen>,
    ui_rx: mpsc::Receiver<UiEvent>,
}

impl<T: Transport> RemoteTask<T> {
    /// Detaches however serving ends, then reports the serving error if any.
    async fn run(mut self) -> Result<()> {
        let res = self.serve().await;
        println!("terminating");
        self.remote.detach().await?;
        res
    }

    async fn serve(&mut self) -> Result<()> {
        self.fullscreen.on_change(&mut self.board)?;
        self.publish();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    return Ok(());
                }
                res = self.remote.next() => self.handle_message(res?)?,
                Some(event) = self.ui_rx.recv() => self.handle_ui_event(event)?,
            }
        }
    }

    fn handle_message(&mut self, msg: Message) -> Result<()> {
        match msg {
            Message::Tempo(snapshot) => {
                self.display.apply(&snapshot, &mut self.board)?;
                self.publish();
            }
            Message::MalformedTempo(e) => debug!("ignoring tempo update: {}", e),
            Message::HostUnreachable(e) => {
                warn!("REAPER stopped responding: {}", e);
                self.overlay
                    .show("REAPER not responding", &NotificationOptions::default());
            }
            Message::HostReachable => {
                info!("REAPER is back");
                self.overlay
                    .show("REAPER reconnected", &NotificationOptions::default());
            }
        }
        Ok(())
    }

    fn handle_ui_event(&mut self, event: UiEvent) -> Result<()> {
        match event {
            UiEvent::Notify(body) => self.overlay.show(&body.text, &body.options()),
            UiEvent::FullscreenChanged(body) => {
                self.fullscreen.host_mut().report(&body);
                self.fullscreen.on_change(&mut self.board)?;
                self.publish();
            }
        }
        Ok(())
    }

    fn publish(&self) {
        let board = &self.board;
        self.board_tx.send_if_modified(|published| {
            if published == board {
                return false;
            }
            *published = board.clone();
            true
        });
    }
}

async fn forward(state: &WebState, event: UiEvent) -> tide::Result<tide::Response> {
    state
        .ui_tx
        .send(event)
        .await
        .map_err(|e| tide::Error::from_str(StatusCode::ServiceUnavailable, e.to_string()))?;
    Ok(tide::Response::new(StatusCode::Accepted))
}

fn current_json<V: Serialize>(rx: &watch::Receiver<V>) -> String {
    json!(*rx.borrow()).to_string()
}

async fn web(listen: String, www: String, state: WebState) -> Result<()> {
    let mut app = tide::with_state(state);
    app.at("/slots")
        .get(sse::endpoint(|req: Request<WebState>, sender| async move {
            let mut board = req.state().board.clone();
            loop {
                sender.send("slots", current_json(&board), None).await?;
                if board.changed().await.is_err() {
                    break;
                }
            }

            Ok(())
        }));
    app.at("/overlay")
        .get(sse::endpoint(|req: Request<WebState>, sender| async move {
            let mut overlay = req.state().overlay.clone();
            // Late subscribers still see a message that is on screen.
            loop {
                sender.send("overlay", current_json(&overlay), None).await?;
                if overlay.changed().await.is_err() {
                    break;
                }
            }

            Ok(())
        }));
    app.at("/notify")
        .post(|mut req: Request<WebState>| async move {
            let body: NotifyBody = req.body_json().await?;
            forward(req.state(), UiEvent::Notify(body)).await
        });
    app.at("/fullscreen")
        .post(|mut req: Request<WebState>| async move {
            let body: FullscreenBody = req.body_json().await?;
            forward(req.state(), UiEvent::FullscreenChanged(body)).await
        });
    app.at("/").serve_file(Path::new(&www).join("index.html"))?;
    app.at("/www").serve_dir(&www)?;
    app.listen(listen).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let transport = HttpTransport::new(&opt.reaper, Duration::from_millis(opt.timeout_ms))?;
    let remote = Remote::attach(opt.config(), transport).await?;
    println!("connected to {}", opt.reaper);

    let overlay = NotificationOverlay::new();
    let (board_tx, board_rx) = watch::channel(SlotBoard::new());
    let (ui_tx, ui_rx) = mpsc::channel(16);
    let state = WebState {
        board: board_rx,
        overlay: overlay.subscribe(),
        ui_tx,
    };

    let (listen, www) = (opt.listen.clone(), opt.www.clone());
    let _ = tokio::spawn(async move {
        if let Err(e) = web(listen, www, state).await {
            error!("web task error: {}", e);
        }
    });

    let task = RemoteTask {
        remote,
        display: TempoDisplay::new(opt.display_config()),
        board: SlotBoard::new(),
        board_tx,
        overlay,
        fullscreen: Fullscreen::new(ReportedFullscreen::default()),
        ui_rx,
    };
    task.run().await
}
