use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::{
    proto::{StatusToken, TempoSnapshot},
    RemoteError, Result,
};

const NBSP: char = '\u{a0}';

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, AsRefStr, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum Slot {
    TempoCurrent,
    ProjectBpm,
    TempoEditCursor,
    Playrate,
    #[strum(serialize = "fullscreenIcon")]
    FullscreenIcon,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DisplayMode {
    /// No tempo envelope, the project tempo is authoritative.
    ProjectOnly,
    /// Envelope present, transport stopped.
    EnvelopeIdle,
    EnvelopePlaying,
}

impl DisplayMode {
    pub fn of(snapshot: &TempoSnapshot) -> DisplayMode {
        match (&snapshot.edit_cursor_tempo, &snapshot.playhead_tempo) {
            (None, _) => DisplayMode::ProjectOnly,
            (Some(_), None) => DisplayMode::EnvelopeIdle,
            (Some(_), Some(_)) => DisplayMode::EnvelopePlaying,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DisplayConfig {
    pub tempo_neutral: String,
    pub edit_cursor_accent: String,
    pub playhead_accent: String,
}

impl Default for DisplayConfig {
    fn default() -> DisplayConfig {
        DisplayConfig {
            tempo_neutral: "#DDDDDD".to_string(),
            edit_cursor_accent: "#FF5050".to_string(),
            playhead_accent: "#50E070".to_string(),
        }
    }
}

/// Named text and fill targets the tempo display writes into.
pub trait DisplaySlots {
    fn has_slot(&self, slot: Slot) -> bool;

    /// Fails with `MissingSlot` if the slot does not exist.
    fn set_text(&mut self, slot: Slot, text: &str) -> Result<()>;

    fn fill(&self, slot: Slot) -> Option<&str>;

    fn set_fill(&mut self, slot: Slot, color: &str);
}

/// Returns true if the fill was written. Missing slots and fills that
/// already match are left alone.
pub fn set_fill_color<S: DisplaySlots + ?Sized>(slots: &mut S, slot: Slot, color: &str) -> bool {
    if !slots.has_slot(slot) || slots.fill(slot) == Some(color) {
        return false;
    }
    slots.set_fill(slot, color);
    true
}

/// Gives short tempos one leading non-breaking space so that two and three
/// digit values line up. Already padded values and values of four or more
/// characters come back unchanged.
pub fn pad_tempo(value: &str) -> String {
    if value.starts_with(NBSP) || value.chars().count() >= 4 {
        value.to_string()
    } else {
        format!("{}{}", NBSP, value)
    }
}

pub struct TempoDisplay {
    config: DisplayConfig,
}

impl TempoDisplay {
    pub fn new(config: DisplayConfig) -> TempoDisplay {
        TempoDisplay { config }
    }

    /// Decodes and applies a status token. Tokens for other keys are
    /// ignored and leave the slots untouched.
    pub fn update<S: DisplaySlots + ?Sized>(
        &self,
        token: &StatusToken,
        slots: &mut S,
    ) -> Result<Option<DisplayMode>> {
        match TempoSnapshot::decode(token) {
            Some(snapshot) => self.apply(&snapshot?, slots).map(Some),
            None => Ok(None),
        }
    }

    pub fn apply<S: DisplaySlots + ?Sized>(
        &self,
        snapshot: &TempoSnapshot,
        slots: &mut S,
    ) -> Result<DisplayMode> {
        match (&snapshot.edit_cursor_tempo, &snapshot.playhead_tempo) {
            (None, _) => {
                slots.set_text(Slot::TempoCurrent, &pad_tempo(&snapshot.project_bpm))?;
                slots.set_text(Slot::ProjectBpm, "")?;
                slots.set_text(Slot::TempoEditCursor, "")?;
                set_fill_color(slots, Slot::TempoCurrent, &self.config.tempo_neutral);
            }
            (Some(edit_cursor), None) => {
                slots.set_text(Slot::ProjectBpm, &format!("[{}]", snapshot.project_bpm))?;
                slots.set_text(Slot::TempoCurrent, &pad_tempo(edit_cursor))?;
                slots.set_text(Slot::TempoEditCursor, "")?;
                set_fill_color(slots, Slot::TempoCurrent, &self.config.edit_cursor_accent);
            }
            (Some(edit_cursor), Some(playhead)) => {
                slots.set_text(Slot::ProjectBpm, &format!("[{}]", snapshot.project_bpm))?;
                slots.set_text(Slot::TempoCurrent, &pad_tempo(playhead))?;
                slots.set_text(Slot::TempoEditCursor, &format!("| {}", edit_cursor))?;
                set_fill_color(slots, Slot::TempoCurrent, &self.config.playhead_accent);
            }
        }

        if snapshot.rate_is_unity() {
            slots.set_text(Slot::Playrate, "")?;
        } else {
            slots.set_text(Slot::Playrate, &format!("({})", snapshot.playback_rate))?;
        }

        let mode = DisplayMode::of(snapshot);
        debug!("tempo display {:?}", mode);
        Ok(mode)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SlotState {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
}

/// In-memory `DisplaySlots`, serialized as `{"<slot>": {"text", "fill"}}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SlotBoard {
    slots: BTreeMap<String, SlotState>,
}

impl SlotBoard {
    /// A board with every known slot.
    pub fn new() -> SlotBoard {
        SlotBoard::with_slots(Slot::iter())
    }

    pub fn with_slots(slots: impl IntoIterator<Item = Slot>) -> SlotBoard {
        SlotBoard {
            slots: slots
                .into_iter()
                .map(|slot| (slot.to_string(), SlotState::default()))
                .collect(),
        }
    }

    pub fn get(&self, slot: Slot) -> Option<&SlotState> {
        self.slots.get(slot.as_ref())
    }

    pub fn text(&self, slot: Slot) -> Option<&str> {
        self.get(slot).map(|s| s.text.as_str())
    }
}

impl Default for SlotBoard {
    fn default() -> SlotBoard {
        SlotBoard::new()
    }
}

impl DisplaySlots for SlotBoard {
    fn has_slot(&self, slot: Slot) -> bool {
        self.slots.contains_key(slot.as_ref())
    }

    fn set_text(&mut self, slot: Slot, text: &str) -> Result<()> {
        let state = self
            .slots
            .get_mut(slot.as_ref())
            .ok_or_else(|| RemoteError::MissingSlot(slot.to_string()))?;
        state.text = text.to_string();
        Ok(())
    }

    fn fill(&self, slot: Slot) -> Option<&str> {
        self.slots.get(slot.as_ref())?.fill.as_deref()
    }

    fn set_fill(&mut self, slot: Slot, color: &str) {
        if let Some(state) = self.slots.get_mut(slot.as_ref()) {
            state.fill = Some(color.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::NAMESPACE;

    /// Counts fill mutations on top of a plain board.
    struct CountingSlots {
        board: SlotBoard,
        fill_writes: usize,
    }

    impl DisplaySlots for CountingSlots {
        fn has_slot(&self, slot: Slot) -> bool {
            self.board.has_slot(slot)
        }
        fn set_text(&mut self, slot: Slot, text: &str) -> Result<()> {
            self.board.set_text(slot, text)
        }
        fn fill(&self, slot: Slot) -> Option<&str> {
            self.board.fill(slot)
        }
        fn set_fill(&mut self, slot: Slot, color: &str) {
            self.fill_writes += 1;
            self.board.set_fill(slot, color)
        }
    }

    fn token(key: &str, payload: &str) -> StatusToken {
        StatusToken::new(vec!["EXTSTATE", NAMESPACE, key, payload])
    }

    fn show(payload: &str) -> (SlotBoard, DisplayMode) {
        let display = TempoDisplay::new(DisplayConfig::default());
        let mut board = SlotBoard::new();
        let mode = display
            .update(&token("TEMPOSSTRING", payload), &mut board)
            .unwrap()
            .unwrap();
        (board, mode)
    }

    #[test]
    fn test_slot_names() {
        let names: Vec<String> = Slot::iter().map(|s| s.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "tempo_current",
                "project_bpm",
                "tempo_edit_cursor",
                "playrate",
                "fullscreenIcon"
            ]
        );
        assert_eq!("playrate".parse::<Slot>().unwrap(), Slot::Playrate);
    }

    #[test]
    fn test_pad_tempo() {
        assert_eq!(pad_tempo("120"), "\u{a0}120");
        assert_eq!(pad_tempo("90"), "\u{a0}90");
        assert_eq!(pad_tempo("5"), "\u{a0}5");
        assert_eq!(pad_tempo("120.5"), "120.5");
        assert_eq!(pad_tempo("1000"), "1000");

        for value in ["7", "90", "120", "120.25"] {
            let once = pad_tempo(value);
            assert_eq!(pad_tempo(&once), once);
        }
    }

    #[test]
    fn test_project_only() {
        let (board, mode) = show("120_x_x_1");
        assert_eq!(mode, DisplayMode::ProjectOnly);
        assert_eq!(board.text(Slot::TempoCurrent), Some("\u{a0}120"));
        assert_eq!(board.text(Slot::ProjectBpm), Some(""));
        assert_eq!(board.text(Slot::TempoEditCursor), Some(""));
        assert_eq!(board.text(Slot::Playrate), Some(""));
        assert_eq!(board.fill(Slot::TempoCurrent), Some("#DDDDDD"));
    }

    #[test]
    fn test_envelope_idle() {
        let (board, mode) = show("120_90_x_1");
        assert_eq!(mode, DisplayMode::EnvelopeIdle);
        assert_eq!(board.text(Slot::ProjectBpm), Some("[120]"));
        assert_eq!(board.text(Slot::TempoCurrent), Some("\u{a0}90"));
        assert_eq!(board.text(Slot::TempoEditCursor), Some(""));
        assert_eq!(board.text(Slot::Playrate), Some(""));
        assert_eq!(board.fill(Slot::TempoCurrent), Some("#FF5050"));
    }

    #[test]
    fn test_envelope_playing() {
        let (board, mode) = show("120_90_95_1.5");
        assert_eq!(mode, DisplayMode::EnvelopePlaying);
        assert_eq!(board.text(Slot::ProjectBpm), Some("[120]"));
        assert_eq!(board.text(Slot::TempoCurrent), Some("\u{a0}95"));
        assert_eq!(board.text(Slot::TempoEditCursor), Some("| 90"));
        assert_eq!(board.text(Slot::Playrate), Some("(1.5)"));
        assert_eq!(board.fill(Slot::TempoCurrent), Some("#50E070"));
    }

    #[test]
    fn test_mode_transitions_clear_slots() {
        let display = TempoDisplay::new(DisplayConfig::default());
        let mut board = SlotBoard::new();

        display
            .update(&token("TEMPOSSTRING", "120_90_95_0.5"), &mut board)
            .unwrap();
        display
            .update(&token("TEMPOSSTRING", "128_x_x_1.0"), &mut board)
            .unwrap();

        assert_eq!(board.text(Slot::TempoCurrent), Some("\u{a0}128"));
        assert_eq!(board.text(Slot::ProjectBpm), Some(""));
        assert_eq!(board.text(Slot::TempoEditCursor), Some(""));
        assert_eq!(board.text(Slot::Playrate), Some(""));
        assert_eq!(board.fill(Slot::TempoCurrent), Some("#DDDDDD"));
    }

    #[test]
    fn test_other_keys_leave_display_unchanged() {
        let display = TempoDisplay::new(DisplayConfig::default());
        let (mut board, _) = show("120_90_95_1.5");
        let before = board.clone();

        for token in [
            token("HZ_REFRESH", "20"),
            token("CLIENTDELTA", "1"),
            StatusToken::new(vec!["TRANSPORT", "1", "12.0"]),
        ] {
            assert_eq!(display.update(&token, &mut board).unwrap(), None);
        }
        assert_eq!(board, before);
    }

    #[test]
    fn test_malformed_payload_leaves_display_unchanged() {
        let display = TempoDisplay::new(DisplayConfig::default());
        let (mut board, _) = show("120_90_x_1");
        let before = board.clone();

        let res = display.update(&token("TEMPOSSTRING", "120_90"), &mut board);
        assert!(matches!(res, Err(RemoteError::MalformedPayload { .. })));
        assert_eq!(board, before);
    }

    #[test]
    fn test_fill_written_once() {
        let mut slots = CountingSlots {
            board: SlotBoard::new(),
            fill_writes: 0,
        };
        assert!(set_fill_color(&mut slots, Slot::TempoCurrent, "#FF5050"));
        assert!(!set_fill_color(&mut slots, Slot::TempoCurrent, "#FF5050"));
        assert_eq!(slots.fill_writes, 1);

        let display = TempoDisplay::new(DisplayConfig::default());
        for _ in 0..5 {
            display
                .apply(&TempoSnapshot::parse("120_x_x_1").unwrap(), &mut slots)
                .unwrap();
        }
        assert_eq!(slots.fill_writes, 2);
    }

    #[test]
    fn test_missing_slots() {
        let mut board = SlotBoard::with_slots(vec![Slot::Playrate]);
        assert!(!set_fill_color(&mut board, Slot::TempoCurrent, "#FFFFFF"));
        assert_eq!(board.fill(Slot::TempoCurrent), None);

        let display = TempoDisplay::new(DisplayConfig::default());
        let res = display.apply(&TempoSnapshot::parse("120_x_x_1").unwrap(), &mut board);
        assert!(matches!(res, Err(RemoteError::MissingSlot(ref s)) if s == "tempo_current"));
    }
}
