use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::{DisplaySlots, Result, Slot};

pub const ENTER_ICON: &str = "⛶";
pub const EXIT_ICON: &str = "❎";

/// Vendor variants of the fullscreen API, tried in this order.
/// Names match what the page reports, e.g. `"Webkit"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumIter, EnumString)]
pub enum Capability {
    Standard,
    Moz,
    Webkit,
    Ms,
}

/// Whatever owns the fullscreen state, usually a browser document.
pub trait FullscreenHost {
    fn can_request(&self, cap: Capability) -> bool;
    fn can_exit(&self, cap: Capability) -> bool;
    fn request(&mut self, cap: Capability);
    fn exit(&mut self, cap: Capability);
    /// True if this variant reports a fullscreen element.
    fn has_element(&self, cap: Capability) -> bool;
}

pub struct Fullscreen<H: FullscreenHost> {
    host: H,
}

impl<H: FullscreenHost> Fullscreen<H> {
    pub fn new(host: H) -> Fullscreen<H> {
        Fullscreen { host }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn is_active(&self) -> bool {
        Capability::iter().any(|cap| self.host.has_element(cap))
    }

    /// Returns the variant used, or `None` if the host supports none.
    pub fn open(&mut self) -> Option<Capability> {
        let cap = Capability::iter().find(|cap| self.host.can_request(*cap))?;
        self.host.request(cap);
        Some(cap)
    }

    pub fn close(&mut self) -> Option<Capability> {
        let cap = Capability::iter().find(|cap| self.host.can_exit(*cap))?;
        self.host.exit(cap);
        Some(cap)
    }

    pub fn toggle<S: DisplaySlots + ?Sized>(&mut self, slots: &mut S) -> Result<()> {
        if self.is_active() {
            self.close();
        } else {
            self.open();
        }
        self.on_change(slots)
    }

    pub fn icon(&self) -> &'static str {
        if self.is_active() {
            EXIT_ICON
        } else {
            ENTER_ICON
        }
    }

    /// Fullscreen change handler, keeps the icon in sync.
    pub fn on_change<S: DisplaySlots + ?Sized>(&self, slots: &mut S) -> Result<()> {
        slots.set_text(Slot::FullscreenIcon, self.icon())
    }
}
