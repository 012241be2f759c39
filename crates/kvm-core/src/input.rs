//! Keyboard and mouse input
//!
//! The host samples physical input into an [`InputSnapshot`]; the VM copies
//! it into memory when a ROM requests an input refresh. Every key owns one
//! byte at $7C00 + its index holding a four-state [`KeyState`].

use crate::memory::{Memory, KEYBOARD_SNAPSHOT, MOUSE_SNAPSHOT};

/// Number of keys in the keyboard snapshot
pub const KEY_COUNT: usize = 80;

/// Key state as seen by ROM code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyState {
    #[default]
    Idle = 0,
    /// Released since the previous refresh
    Released = 1,
    /// Pressed since the previous refresh
    Pressed = 2,
    Held = 3,
}

impl KeyState {
    pub fn from_byte(value: u8) -> Self {
        match value & 0b11 {
            0 => KeyState::Idle,
            1 => KeyState::Released,
            2 => KeyState::Pressed,
            _ => KeyState::Held,
        }
    }

    /// Next state given whether the key is physically down now
    pub fn next(self, down: bool) -> Self {
        let was_up = matches!(self, KeyState::Idle | KeyState::Released);
        match (down, was_up) {
            (true, true) => KeyState::Pressed,
            (true, false) => KeyState::Held,
            (false, true) => KeyState::Idle,
            (false, false) => KeyState::Released,
        }
    }

    pub fn is_down(self) -> bool {
        matches!(self, KeyState::Pressed | KeyState::Held)
    }
}

/// Keys in snapshot order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Key {
    Num0, Num1, Num2, Num3, Num4, Num5, Num6, Num7, Num8, Num9,
    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    Up, Down, Left, Right,
    Space, Comma, Period, Slash, Backslash, Semicolon, Apostrophe, Grave,
    Minus, Equals, LeftBracket, RightBracket,
    Escape, Home, End, Delete, PageUp, PageDown,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
    LeftShift, RightShift, LeftControl, RightControl, LeftAlt, RightAlt,
    Return, Backspace, Tab, CapsLock,
}

impl Key {
    /// Offset of this key's byte in the keyboard snapshot
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Mouse snapshot in logical screen coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MouseState {
    pub x: u8,
    pub y: u8,
    pub buttons: u8,
}

impl MouseState {
    pub const LEFT: u8 = 0b001;
    pub const MIDDLE: u8 = 0b010;
    pub const RIGHT: u8 = 0b100;

    pub fn new(x: u8, y: u8, left: bool, middle: bool, right: bool) -> Self {
        let mut buttons = 0;
        if left {
            buttons |= Self::LEFT;
        }
        if middle {
            buttons |= Self::MIDDLE;
        }
        if right {
            buttons |= Self::RIGHT;
        }
        Self { x, y, buttons }
    }

    /// Map window coordinates onto the 256x256 screen, clamping outside
    pub fn from_window(x: f32, y: f32, width: f32, height: f32) -> (u8, u8) {
        let scale = |v: f32, extent: f32| {
            if extent <= 0.0 {
                0
            } else {
                (v / extent * 256.0).clamp(0.0, 255.0) as u8
            }
        };
        (scale(x, width), scale(y, height))
    }
}

/// Physical input sampled by the host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSnapshot {
    /// Keys currently held down
    pub keys_down: Vec<Key>,
    pub mouse: MouseState,
}

impl InputSnapshot {
    pub fn is_down(&self, key: Key) -> bool {
        self.keys_down.contains(&key)
    }

    /// Advance the keyboard snapshot in memory by one refresh
    pub fn write_keyboard(&self, memory: &mut Memory) {
        let mut down = [false; KEY_COUNT];
        for key in &self.keys_down {
            down[key.index()] = true;
        }
        for (index, &is_down) in down.iter().enumerate() {
            let address = KEYBOARD_SNAPSHOT + index as u16;
            let next = KeyState::from_byte(memory.read(address)).next(is_down);
            memory.write(address, next as u8);
        }
    }

    /// Copy the mouse triple into memory
    pub fn write_mouse(&self, memory: &mut Memory) {
        memory.write(MOUSE_SNAPSHOT, self.mouse.x);
        memory.write(MOUSE_SNAPSHOT + 1, self.mouse.y);
        memory.write(MOUSE_SNAPSHOT + 2, self.mouse.buttons);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(Key::Num0.index(), 0);
        assert_eq!(Key::A.index(), 10);
        assert_eq!(Key::Up.index(), 36);
        assert_eq!(Key::Space.index(), 40);
        assert_eq!(Key::Escape.index(), 52);
        assert_eq!(Key::F1.index(), 58);
        assert_eq!(Key::LeftShift.index(), 70);
        assert_eq!(Key::CapsLock.index(), KEY_COUNT - 1);
    }

    #[test]
    fn test_key_transitions() {
        assert_eq!(KeyState::Idle.next(true), KeyState::Pressed);
        assert_eq!(KeyState::Released.next(true), KeyState::Pressed);
        assert_eq!(KeyState::Pressed.next(true), KeyState::Held);
        assert_eq!(KeyState::Held.next(true), KeyState::Held);
        assert_eq!(KeyState::Held.next(false), KeyState::Released);
        assert_eq!(KeyState::Pressed.next(false), KeyState::Released);
        assert_eq!(KeyState::Released.next(false), KeyState::Idle);
        assert_eq!(KeyState::Idle.next(false), KeyState::Idle);
    }

    #[test]
    fn test_write_keyboard_sequence() {
        let mut mem = Memory::new(0x10000).unwrap();
        let address = KEYBOARD_SNAPSHOT + Key::Z.index() as u16;
        let held = InputSnapshot {
            keys_down: vec![Key::Z],
            ..Default::default()
        };
        let none = InputSnapshot::default();

        held.write_keyboard(&mut mem);
        assert_eq!(mem.read(address), KeyState::Pressed as u8);
        held.write_keyboard(&mut mem);
        assert_eq!(mem.read(address), KeyState::Held as u8);
        none.write_keyboard(&mut mem);
        assert_eq!(mem.read(address), KeyState::Released as u8);
        none.write_keyboard(&mut mem);
        assert_eq!(mem.read(address), KeyState::Idle as u8);
    }

    #[test]
    fn test_write_mouse() {
        let mut mem = Memory::new(0x10000).unwrap();
        let snapshot = InputSnapshot {
            keys_down: Vec::new(),
            mouse: MouseState::new(12, 34, true, false, true),
        };
        snapshot.write_mouse(&mut mem);
        assert_eq!(mem.read(0x7D00), 12);
        assert_eq!(mem.read(0x7D01), 34);
        assert_eq!(mem.read(0x7D02), 0b101);
    }

    #[test]
    fn test_mouse_from_window() {
        assert_eq!(MouseState::from_window(512.0, 256.0, 1024.0, 1024.0), (128, 64));
        assert_eq!(MouseState::from_window(-5.0, 2000.0, 1024.0, 1024.0), (0, 255));
    }
}
