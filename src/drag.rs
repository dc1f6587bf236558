//! Grab / drag / release of the tracked object by a hand touching its frame.

use log::info;
use serde::Serialize;

use crate::geometry::Point2;

/// One frame's hand-vs-frame collision result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub touching: bool,
    pub hand: Option<Point2>,
    pub object_center: Option<Point2>,
}

impl Contact {
    pub fn none() -> Self {
        Self {
            touching: false,
            hand: None,
            object_center: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DragState {
    pub offset: (f32, f32),
    pub grabbed: bool,
    #[serde(skip)]
    pub last_hand: Option<Point2>,
    pub pushed_off_screen: bool,
}

#[derive(Debug, Clone)]
pub struct DragController {
    smoothing: f32,
    state: DragState,
}

impl DragController {
    pub fn new(smoothing: f32) -> Self {
        Self {
            smoothing,
            state: DragState::default(),
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn offset(&self) -> (f32, f32) {
        self.state.offset
    }

    pub fn reset(&mut self) {
        self.state = DragState::default();
    }

    /// Advance one frame. `screen` is the frame size used for the off-screen latch.
    pub fn update(&mut self, contact: &Contact, screen: (u32, u32)) -> &DragState {
        let hand = contact
            .hand
            .filter(|_| contact.touching && contact.object_center.is_some());
        match hand {
            Some(h) if !self.state.grabbed => {
                self.state.grabbed = true;
                self.state.last_hand = Some(h);
                info!("drag: grabbed at ({:.0}, {:.0})", h.x, h.y);
            }
            Some(h) => {
                if let Some(last) = self.state.last_hand {
                    self.state.offset.0 += (h.x - last.x) * self.smoothing;
                    self.state.offset.1 += (h.y - last.y) * self.smoothing;
                }
                self.state.last_hand = Some(h);
            }
            None => {
                if self.state.grabbed {
                    self.state.grabbed = false;
                    self.state.last_hand = None;
                    info!(
                        "drag: released, offset ({:.1}, {:.1})",
                        self.state.offset.0, self.state.offset.1
                    );
                }
            }
        }

        if !self.state.pushed_off_screen
            && (self.state.offset.0.abs() > screen.0 as f32
                || self.state.offset.1.abs() > screen.1 as f32)
        {
            self.state.pushed_off_screen = true;
            info!("drag: object pushed off screen");
        }
        &self.state
    }
}
