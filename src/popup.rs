use std::time::{Duration, Instant};

use crate::annotate::AnnotationId;
use crate::config::PopupConfig;
use crate::document::ScreenRect;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PopupPhase {
    Idle,
    Shown,
    /// The pointer left; the popup hides at `hide_at` unless it comes back.
    HidePending { hide_at: Instant },
    /// Opened by a click. Only a choice or a dismissal closes it.
    Pinned,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    Above,
    Below,
}

/// Popup attached to one annotation and positioned against its leaf.
#[derive(Clone, Debug)]
pub struct PopupState {
    hide_grace: Duration,
    phase: PopupPhase,
    active: Option<AnnotationId>,
    anchor: ScreenRect,
    placement: Placement,
}

impl PopupState {
    pub fn new(config: &PopupConfig) -> Self {
        Self {
            hide_grace: config.hide_grace(),
            phase: PopupPhase::Idle,
            active: None,
            anchor: ScreenRect::default(),
            placement: Placement::Above,
        }
    }

    pub fn phase(&self) -> PopupPhase {
        self.phase
    }

    /// The annotation shown, if the popup is visible.
    pub fn active(&self) -> Option<AnnotationId> {
        match self.phase {
            PopupPhase::Idle => None,
            _ => self.active,
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.phase == PopupPhase::Pinned
    }

    pub fn anchor(&self) -> ScreenRect {
        self.anchor
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Pointer entered a decorated leaf. Switches immediately, cancelling
    /// any pending hide. Ignored while pinned.
    pub fn pointer_enter(&mut self, annotation: AnnotationId, anchor: ScreenRect) {
        if self.is_pinned() {
            return;
        }
        self.active = Some(annotation);
        self.anchor = anchor;
        self.placement = Placement::Above;
        self.phase = PopupPhase::Shown;
    }

    pub fn pointer_leave(&mut self, now: Instant) {
        if self.phase == PopupPhase::Shown {
            self.phase = PopupPhase::HidePending {
                hide_at: now + self.hide_grace,
            };
        }
    }

    pub fn popup_enter(&mut self) {
        if let PopupPhase::HidePending { .. } = self.phase {
            self.phase = PopupPhase::Shown;
        }
    }

    pub fn popup_leave(&mut self, now: Instant) {
        self.pointer_leave(now);
    }

    /// A click on a decorated leaf pins its popup below the leaf. A click
    /// anywhere else closes the popup.
    pub fn click(&mut self, target: Option<(AnnotationId, ScreenRect)>) {
        match target {
            Some((annotation, anchor)) => {
                self.active = Some(annotation);
                self.anchor = anchor;
                self.placement = Placement::Below;
                self.phase = PopupPhase::Pinned;
            }
            None => self.dismiss(),
        }
    }

    pub fn dismiss(&mut self) {
        self.phase = PopupPhase::Idle;
        self.active = None;
    }

    pub fn tick(&mut self, now: Instant) {
        if let PopupPhase::HidePending { hide_at } = self.phase {
            if now >= hide_at {
                self.dismiss();
            }
        }
    }

    /// Close the popup when its annotation is gone.
    pub fn retain<F>(&mut self, exists: F)
    where
        F: Fn(AnnotationId) -> bool,
    {
        if let Some(active) = self.active {
            if !exists(active) {
                self.dismiss();
            }
        }
    }

    /// Move the anchor after a relayout.
    pub fn reanchor(&mut self, anchor: ScreenRect) {
        self.anchor = anchor;
    }

    /// Screen rect for a `width`x`height` popup inside `bounds`. Prefers the
    /// configured side of the anchor and flips when that side has no room.
    pub fn position(&self, width: u16, height: u16, bounds: ScreenRect) -> Option<ScreenRect> {
        self.active()?;
        let width = width.min(bounds.width);
        let height = height.min(bounds.height);
        let room_above = self.anchor.y.saturating_sub(bounds.y);
        let room_below = bounds.bottom().saturating_sub(self.anchor.bottom());
        let above = match self.placement {
            Placement::Above => room_above >= height || room_above > room_below,
            Placement::Below => room_below < height && room_above > room_below,
        };
        let y = if above {
            self.anchor.y.saturating_sub(height).max(bounds.y)
        } else {
            self.anchor
                .bottom()
                .min(bounds.bottom().saturating_sub(height))
        };
        let max_x = bounds.x.saturating_add(bounds.width).saturating_sub(width);
        let x = self.anchor.x.clamp(bounds.x, max_x.max(bounds.x));
        Some(ScreenRect::new(x, y, width, height))
    }
}
