//! Device buttons and the host-side key map.

/// Physical device buttons, plus an offscreen variant of each that fires
/// when the trigger is pulled while the barrel points away from the
/// display. Discriminants are the wire ids used by `AssignButton`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Trigger = 0,
    PumpAction = 1,
    FrontLeft = 2,
    RearLeft = 3,
    FrontRight = 4,
    RearRight = 5,
    DpadUp = 6,
    DpadDown = 7,
    DpadLeft = 8,
    DpadRight = 9,
    OffscreenTrigger = 10,
    OffscreenPumpAction = 11,
    OffscreenFrontLeft = 12,
    OffscreenRearLeft = 13,
    OffscreenFrontRight = 14,
    OffscreenRearRight = 15,
    OffscreenDpadUp = 16,
    OffscreenDpadDown = 17,
    OffscreenDpadLeft = 18,
    OffscreenDpadRight = 19,
}

impl Button {
    pub const COUNT: usize = 20;

    /// All buttons in wire-id order.
    pub const ALL: [Button; Button::COUNT] = [
        Button::Trigger,
        Button::PumpAction,
        Button::FrontLeft,
        Button::RearLeft,
        Button::FrontRight,
        Button::RearRight,
        Button::DpadUp,
        Button::DpadDown,
        Button::DpadLeft,
        Button::DpadRight,
        Button::OffscreenTrigger,
        Button::OffscreenPumpAction,
        Button::OffscreenFrontLeft,
        Button::OffscreenRearLeft,
        Button::OffscreenFrontRight,
        Button::OffscreenRearRight,
        Button::OffscreenDpadUp,
        Button::OffscreenDpadDown,
        Button::OffscreenDpadLeft,
        Button::OffscreenDpadRight,
    ];

    pub fn wire_id(self) -> u8 {
        self as u8
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let id = match name.to_ascii_lowercase().as_str() {
            "trigger" => Button::Trigger,
            "pump-action" | "pump" => Button::PumpAction,
            "front-left" => Button::FrontLeft,
            "rear-left" => Button::RearLeft,
            "front-right" => Button::FrontRight,
            "rear-right" => Button::RearRight,
            "dpad-up" => Button::DpadUp,
            "dpad-down" => Button::DpadDown,
            "dpad-left" => Button::DpadLeft,
            "dpad-right" => Button::DpadRight,
            "offscreen-trigger" => Button::OffscreenTrigger,
            "offscreen-pump-action" | "offscreen-pump" => Button::OffscreenPumpAction,
            "offscreen-front-left" => Button::OffscreenFrontLeft,
            "offscreen-rear-left" => Button::OffscreenRearLeft,
            "offscreen-front-right" => Button::OffscreenFrontRight,
            "offscreen-rear-right" => Button::OffscreenRearRight,
            "offscreen-dpad-up" => Button::OffscreenDpadUp,
            "offscreen-dpad-down" => Button::OffscreenDpadDown,
            "offscreen-dpad-left" => Button::OffscreenDpadLeft,
            "offscreen-dpad-right" => Button::OffscreenDpadRight,
            _ => return None,
        };
        Some(id)
    }
}

/// Host key codes the device can emit. ASCII-range values plus a `None`
/// sentinel for unassigned buttons.
#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyCode {
    #[default]
    None = 0,
    Backspace = 8,
    Tab = 9,
    Enter = 13,
    Escape = 27,
    Space = 32,
    Digit1 = 49,
    Digit2 = 50,
    Digit3 = 51,
    Digit4 = 52,
    A = 97,
    B = 98,
    D = 100,
    R = 114,
    S = 115,
    W = 119,
}

impl KeyCode {
    pub fn wire_id(self) -> u8 {
        self as u8
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let key = match name.to_ascii_lowercase().as_str() {
            "none" => KeyCode::None,
            "backspace" => KeyCode::Backspace,
            "tab" => KeyCode::Tab,
            "enter" => KeyCode::Enter,
            "escape" => KeyCode::Escape,
            "space" => KeyCode::Space,
            "1" => KeyCode::Digit1,
            "2" => KeyCode::Digit2,
            "3" => KeyCode::Digit3,
            "4" => KeyCode::Digit4,
            "a" => KeyCode::A,
            "b" => KeyCode::B,
            "d" => KeyCode::D,
            "r" => KeyCode::R,
            "s" => KeyCode::S,
            "w" => KeyCode::W,
            _ => return None,
        };
        Some(key)
    }
}

/// Button-to-key map.
///
/// The key set is the full [`Button`] enumeration, fixed at construction;
/// only the assigned values ever change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonMap {
    keys: [KeyCode; Button::COUNT],
}

impl Default for ButtonMap {
    /// The stock mapping the device ships with.
    fn default() -> Self {
        let mut map = Self {
            keys: [KeyCode::None; Button::COUNT],
        };
        map.assign(Button::Trigger, KeyCode::Space);
        map.assign(Button::PumpAction, KeyCode::R);
        map.assign(Button::FrontLeft, KeyCode::Digit1);
        map.assign(Button::RearLeft, KeyCode::Digit2);
        map.assign(Button::FrontRight, KeyCode::Digit3);
        map.assign(Button::RearRight, KeyCode::Digit4);
        map.assign(Button::DpadUp, KeyCode::W);
        map.assign(Button::DpadDown, KeyCode::S);
        map.assign(Button::DpadLeft, KeyCode::A);
        map.assign(Button::DpadRight, KeyCode::D);
        map.assign(Button::OffscreenTrigger, KeyCode::B);
        map.assign(Button::OffscreenPumpAction, KeyCode::R);
        map.assign(Button::OffscreenDpadUp, KeyCode::W);
        map.assign(Button::OffscreenDpadDown, KeyCode::S);
        map.assign(Button::OffscreenDpadLeft, KeyCode::A);
        map.assign(Button::OffscreenDpadRight, KeyCode::D);
        map
    }
}

impl ButtonMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, button: Button) -> KeyCode {
        self.keys[button as usize]
    }

    pub fn assign(&mut self, button: Button, key: KeyCode) {
        self.keys[button as usize] = key;
    }

    pub fn unassign(&mut self, button: Button) {
        self.keys[button as usize] = KeyCode::None;
    }

    /// All `(button, key)` pairs in wire-id order.
    pub fn iter(&self) -> impl Iterator<Item = (Button, KeyCode)> + '_ {
        Button::ALL.iter().map(|b| (*b, self.get(*b)))
    }
}
