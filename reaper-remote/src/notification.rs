use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle, time};

#[derive(Clone, Debug, PartialEq)]
pub struct NotificationOptions {
    pub top: String,
    pub left: String,
    pub font_size: String,
    pub display_duration: Duration,
}

impl Default for NotificationOptions {
    fn default() -> NotificationOptions {
        NotificationOptions {
            top: "10%".to_string(),
            left: "50%".to_string(),
            font_size: "1.2em".to_string(),
            display_duration: Duration::from_millis(3000),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayStyle {
    pub position: String,
    pub background_color: String,
    pub color: String,
    pub padding: String,
    pub border_radius: String,
    pub z_index: String,
    pub display: String,
    pub top: String,
    pub left: String,
    pub font_size: String,
    pub transform: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Overlay {
    pub text: String,
    pub style: OverlayStyle,
    #[serde(skip)]
    generation: u64,
}

impl Overlay {
    fn new() -> Overlay {
        Overlay {
            text: String::new(),
            style: OverlayStyle {
                position: "fixed".to_string(),
                background_color: "rgba(0, 0, 0, 0.7)".to_string(),
                color: "white".to_string(),
                padding: "1em".to_string(),
                border_radius: "5px".to_string(),
                z_index: "1000".to_string(),
                display: "none".to_string(),
                top: String::new(),
                left: String::new(),
                font_size: String::new(),
                transform: String::new(),
            },
            generation: 0,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.style.display != "none"
    }
}

/// A single reusable message box that hides itself after a while.
///
/// The overlay does not exist until the first `show`. Each `show` restyles
/// it and restarts the hide timer, so the most recent message always gets
/// its full duration.
pub struct NotificationOverlay {
    overlay_tx: Arc<watch::Sender<Option<Overlay>>>,
    pending_hide: Option<JoinHandle<()>>,
}

impl NotificationOverlay {
    pub fn new() -> NotificationOverlay {
        let (overlay_tx, _) = watch::channel(None);
        NotificationOverlay {
            overlay_tx: Arc::new(overlay_tx),
            pending_hide: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Overlay>> {
        self.overlay_tx.subscribe()
    }

    pub fn current(&self) -> Option<Overlay> {
        self.overlay_tx.borrow().clone()
    }

    /// Must be called from within a tokio runtime.
    pub fn show(&mut self, text: &str, options: &NotificationOptions) {
        if let Some(pending) = self.pending_hide.take() {
            pending.abort();
        }

        let mut generation = 0;
        self.overlay_tx.send_modify(|overlay| {
            let overlay = overlay.get_or_insert_with(Overlay::new);
            overlay.style.top = options.top.clone();
            overlay.style.left = options.left.clone();
            overlay.style.font_size = options.font_size.clone();
            overlay.style.transform = "translateX(-50%)".to_string();
            overlay.text = text.to_string();
            overlay.style.display = "block".to_string();
            overlay.generation += 1;
            generation = overlay.generation;
        });

        let overlay_tx = self.overlay_tx.clone();
        let duration = options.display_duration;
        self.pending_hide = Some(tokio::spawn(async move {
            time::sleep(duration).await;
            // An abort can race with the timer; only hide our own message.
            overlay_tx.send_if_modified(|overlay| match overlay {
                Some(overlay) if overlay.generation == generation => {
                    overlay.style.display = "none".to_string();
                    true
                }
                _ => false,
            });
        }));
    }
}

impl Default for NotificationOverlay {
    fn default() -> NotificationOverlay {
        NotificationOverlay::new()
    }
}

impl Drop for NotificationOverlay {
    fn drop(&mut self) {
        if let Some(pending) = &self.pending_hide {
            pending.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_created_lazily() {
        let mut overlay = NotificationOverlay::new();
        assert!(overlay.current().is_none());

        overlay.show("hello", &NotificationOptions::default());
        let current = overlay.current().unwrap();
        assert!(current.is_visible());
        assert_eq!(current.text, "hello");
        assert_eq!(current.style.top, "10%");
        assert_eq!(current.style.left, "50%");
        assert_eq!(current.style.font_size, "1.2em");
        assert_eq!(current.style.transform, "translateX(-50%)");
        assert_eq!(current.style.background_color, "rgba(0, 0, 0, 0.7)");
        assert_eq!(current.style.z_index, "1000");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hides_after_duration() {
        let mut overlay = NotificationOverlay::new();
        overlay.show("hello", &NotificationOptions::default());

        time::sleep(Duration::from_millis(2900)).await;
        assert!(overlay.current().unwrap().is_visible());

        time::sleep(Duration::from_millis(200)).await;
        let current = overlay.current().unwrap();
        assert!(!current.is_visible());
        assert_eq!(current.text, "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_call_wins() {
        let mut overlay = NotificationOverlay::new();
        overlay.show("first", &NotificationOptions::default());

        time::sleep(Duration::from_millis(2000)).await;
        let options = NotificationOptions {
            top: "20%".to_string(),
            ..NotificationOptions::default()
        };
        overlay.show("second", &options);

        // The first message's timer would have fired at 3000ms.
        time::sleep(Duration::from_millis(1500)).await;
        let current = overlay.current().unwrap();
        assert!(current.is_visible());
        assert_eq!(current.text, "second");
        assert_eq!(current.style.top, "20%");
        assert_eq!(current.style.left, "50%");

        time::sleep(Duration::from_millis(1600)).await;
        assert!(!overlay.current().unwrap().is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_hide() {
        let mut overlay = NotificationOverlay::new();
        let mut rx = overlay.subscribe();

        overlay.show(
            "saved",
            &NotificationOptions {
                display_duration: Duration::from_millis(500),
                ..NotificationOptions::default()
            },
        );
        rx.changed().await.unwrap();
        assert!(rx.borrow().as_ref().unwrap().is_visible());

        rx.changed().await.unwrap();
        assert!(!rx.borrow().as_ref().unwrap().is_visible());
    }
}
