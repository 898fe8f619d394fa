//! Local controller input
//!
//! The platform delivers raw button/axis/touch events; a fixed lookup table
//! maps them onto the logical [`ControllerState`] snapshot that the session
//! feedback loop reads. Latest-value semantics: the sampler overwrites the
//! single shared snapshot, nothing is queued.

use serde::{Deserialize, Serialize};

/// Logical pad buttons as a bitmask.
pub mod buttons {
    pub const DPAD_UP: u32 = 1 << 0;
    pub const DPAD_DOWN: u32 = 1 << 1;
    pub const DPAD_LEFT: u32 = 1 << 2;
    pub const DPAD_RIGHT: u32 = 1 << 3;
    pub const SOUTH: u32 = 1 << 4;
    pub const EAST: u32 = 1 << 5;
    pub const WEST: u32 = 1 << 6;
    pub const NORTH: u32 = 1 << 7;
    pub const L1: u32 = 1 << 8;
    pub const R1: u32 = 1 << 9;
    pub const L3: u32 = 1 << 10;
    pub const R3: u32 = 1 << 11;
    pub const OPTIONS: u32 = 1 << 12;
    pub const SHARE: u32 = 1 << 13;
    pub const HOME: u32 = 1 << 14;
    pub const TOUCHPAD: u32 = 1 << 15;
}

/// Snapshot of the local controller, rebuilt in place each tick.
///
/// Exactly one writer (the sampler, presentation thread); the session
/// feedback loop reads it on the same thread right after sampling, so no
/// locking is involved. This is also the feedback message payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerState {
    pub buttons: u32,
    pub left_x: i16,
    pub left_y: i16,
    pub right_x: i16,
    pub right_y: i16,
    /// Analog trigger positions, 0 = released
    pub l2: u8,
    pub r2: u8,
}

/// One raw event from the platform input layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    ButtonDown(u8),
    ButtonUp(u8),
    AxisMotion { axis: u8, value: i16 },
    TouchDown,
    TouchUp,
    Quit,
}

/// Polled platform event stream (the windowing/pad layer implements this).
pub trait InputSource {
    fn poll(&mut self) -> Option<InputEvent>;
}

/// Raw button code → logical button bit. Codes follow the platform pad
/// layout: face buttons, sticks, shoulders, then dpad.
const BUTTON_MAP: &[(u8, u32)] = &[
    (0, buttons::EAST),
    (1, buttons::SOUTH),
    (2, buttons::NORTH),
    (3, buttons::WEST),
    (4, buttons::L3),
    (5, buttons::R3),
    (6, buttons::L1),
    (7, buttons::R1),
    (10, buttons::OPTIONS),
    (11, buttons::HOME),
    (12, buttons::DPAD_LEFT),
    (13, buttons::DPAD_UP),
    (14, buttons::DPAD_RIGHT),
    (15, buttons::DPAD_DOWN),
];

/// Raw codes of the analog triggers, reported as digital events by the pad.
const TRIGGER_LEFT: u8 = 8;
const TRIGGER_RIGHT: u8 = 9;

/// Stick axes: left x/y, right x/y.
const AXIS_LEFT_X: u8 = 0;
const AXIS_LEFT_Y: u8 = 1;
const AXIS_RIGHT_X: u8 = 2;
const AXIS_RIGHT_Y: u8 = 3;

/// Folds raw events into the shared [`ControllerState`].
#[derive(Debug, Default)]
pub struct InputSampler;

impl InputSampler {
    pub fn new() -> Self {
        Self
    }

    /// Drain all pending events into `state`.
    ///
    /// Returns `false` when a platform quit event was seen, the only
    /// condition that stops the presentation loop.
    pub fn pump(&mut self, source: &mut dyn InputSource, state: &mut ControllerState) -> bool {
        while let Some(event) = source.poll() {
            if !self.apply(event, state) {
                return false;
            }
        }
        true
    }

    fn apply(&mut self, event: InputEvent, state: &mut ControllerState) -> bool {
        match event {
            InputEvent::ButtonDown(code) => match code {
                TRIGGER_LEFT => state.l2 = u8::MAX,
                TRIGGER_RIGHT => state.r2 = u8::MAX,
                _ => {
                    if let Some(bit) = lookup_button(code) {
                        state.buttons |= bit;
                    }
                }
            },
            InputEvent::ButtonUp(code) => match code {
                TRIGGER_LEFT => state.l2 = 0,
                TRIGGER_RIGHT => state.r2 = 0,
                _ => {
                    if let Some(bit) = lookup_button(code) {
                        state.buttons &= !bit;
                    }
                }
            },
            InputEvent::AxisMotion { axis, value } => match axis {
                AXIS_LEFT_X => state.left_x = value,
                AXIS_LEFT_Y => state.left_y = value,
                AXIS_RIGHT_X => state.right_x = value,
                AXIS_RIGHT_Y => state.right_y = value,
                _ => {}
            },
            InputEvent::TouchDown => state.buttons |= buttons::TOUCHPAD,
            InputEvent::TouchUp => state.buttons &= !buttons::TOUCHPAD,
            InputEvent::Quit => return false,
        }
        true
    }
}

fn lookup_button(code: u8) -> Option<u32> {
    BUTTON_MAP
        .iter()
        .find(|(raw, _)| *raw == code)
        .map(|(_, bit)| *bit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct QueuedSource(VecDeque<InputEvent>);

    impl InputSource for QueuedSource {
        fn poll(&mut self) -> Option<InputEvent> {
            self.0.pop_front()
        }
    }

    fn pump(events: Vec<InputEvent>, state: &mut ControllerState) -> bool {
        InputSampler::new().pump(&mut QueuedSource(events.into()), state)
    }

    #[test]
    fn button_down_up_sets_and_clears_bits() {
        let mut state = ControllerState::default();
        assert!(pump(
            vec![InputEvent::ButtonDown(1), InputEvent::ButtonDown(6)],
            &mut state
        ));
        assert_eq!(state.buttons, buttons::SOUTH | buttons::L1);

        assert!(pump(vec![InputEvent::ButtonUp(1)], &mut state));
        assert_eq!(state.buttons, buttons::L1);

        // A repeated release must not toggle the bit back on
        assert!(pump(vec![InputEvent::ButtonUp(1)], &mut state));
        assert_eq!(state.buttons, buttons::L1);
    }

    #[test]
    fn triggers_are_analog_endpoints() {
        let mut state = ControllerState::default();
        pump(vec![InputEvent::ButtonDown(8)], &mut state);
        assert_eq!(state.l2, u8::MAX);
        assert_eq!(state.r2, 0);

        pump(vec![InputEvent::ButtonUp(8)], &mut state);
        assert_eq!(state.l2, 0);
    }

    #[test]
    fn axes_overwrite_with_latest_value() {
        let mut state = ControllerState::default();
        pump(
            vec![
                InputEvent::AxisMotion { axis: 0, value: 100 },
                InputEvent::AxisMotion { axis: 0, value: -700 },
                InputEvent::AxisMotion { axis: 3, value: 42 },
            ],
            &mut state,
        );
        assert_eq!(state.left_x, -700);
        assert_eq!(state.right_y, 42);
    }

    #[test]
    fn touch_maps_to_the_touchpad_bit() {
        let mut state = ControllerState::default();
        pump(vec![InputEvent::TouchDown], &mut state);
        assert_eq!(state.buttons, buttons::TOUCHPAD);
        pump(vec![InputEvent::TouchUp], &mut state);
        assert_eq!(state.buttons, 0);
    }

    #[test]
    fn quit_stops_the_pump_immediately() {
        let mut state = ControllerState::default();
        let more = pump(
            vec![InputEvent::Quit, InputEvent::ButtonDown(1)],
            &mut state,
        );
        assert!(!more);
        assert_eq!(state.buttons, 0);
    }

    #[test]
    fn unknown_codes_are_ignored() {
        let mut state = ControllerState::default();
        assert!(pump(
            vec![
                InputEvent::ButtonDown(200),
                InputEvent::AxisMotion { axis: 9, value: 1 }
            ],
            &mut state
        ));
        assert_eq!(state, ControllerState::default());
    }
}
