//! Click, double-click, and keyboard handling for the item list.
//!
//! A single click only takes effect after the click delay so that a
//! double-click can cancel it. Arrow keys move the active item at once but
//! delay the preview, and a new key press restarts that delay. Effects are
//! sent over a channel and applied by the session.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::timer::DelaySlot;
use crate::types::ItemId;

pub const DEFAULT_CLICK_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_PREVIEW_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEffect {
    Activate(Option<ItemId>),
    Preview(Option<ItemId>),
    /// Preview the item, or close the preview if it is already shown.
    TogglePreview(ItemId),
    Open(ItemId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKey {
    Up,
    Down,
    Escape,
}

#[derive(Debug)]
pub struct ListInteraction {
    click: DelaySlot,
    preview: DelaySlot,
    click_delay: Duration,
    preview_delay: Duration,
    effects: mpsc::UnboundedSender<ListEffect>,
}

impl ListInteraction {
    pub fn new(
        click_delay: Duration,
        preview_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<ListEffect>) {
        let (effects, rx) = mpsc::unbounded_channel();
        let interaction = Self {
            click: DelaySlot::new(),
            preview: DelaySlot::new(),
            click_delay,
            preview_delay,
            effects,
        };
        (interaction, rx)
    }

    pub fn on_click(&mut self, id: &str) {
        self.preview.cancel();
        let effects = self.effects.clone();
        let id = id.to_string();
        self.click.schedule(self.click_delay, move || async move {
            let _ = effects.send(ListEffect::Activate(Some(id.clone())));
            let _ = effects.send(ListEffect::TogglePreview(id));
        });
    }

    pub fn on_double_click(&mut self, id: &str) {
        self.click.cancel();
        self.emit(ListEffect::Activate(Some(id.to_string())));
        self.emit(ListEffect::Open(id.to_string()));
    }

    /// Handle a navigation key over the visible `ids`.
    ///
    /// Returns the newly active id, if any.
    pub fn on_key(&mut self, key: NavKey, ids: &[ItemId], active: Option<&str>) -> Option<ItemId> {
        let diff: isize = match key {
            NavKey::Down => 1,
            NavKey::Up => -1,
            NavKey::Escape => {
                self.preview.cancel();
                self.emit(ListEffect::Activate(None));
                self.emit(ListEffect::Preview(None));
                return None;
            }
        };
        if ids.is_empty() {
            return None;
        }

        let current = active
            .and_then(|a| ids.iter().position(|id| id == a))
            .map_or(-1, |pos| pos as isize);
        let next = (current + diff).clamp(0, ids.len() as isize - 1) as usize;
        let next_id = ids[next].clone();

        self.emit(ListEffect::Activate(Some(next_id.clone())));

        let effects = self.effects.clone();
        let preview_id = next_id.clone();
        self.preview.schedule(self.preview_delay, move || async move {
            let _ = effects.send(ListEffect::Preview(Some(preview_id)));
        });

        Some(next_id)
    }

    pub fn cancel_pending(&mut self) {
        self.click.cancel();
        self.preview.cancel();
    }

    fn emit(&self, effect: ListEffect) {
        if self.effects.send(effect).is_err() {
            log::debug!("List effect dropped, receiver closed");
        }
    }
}
