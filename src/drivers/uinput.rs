//! uinput key injection (Linux)
//!
//! Registers a virtual keyboard and synthesizes press/release pairs for
//! keymap `keypress` actions and the multi-tap engine.

use anyhow::{Context, Result};
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key};
use tracing::{debug, info, warn};

use crate::drivers::KeyInjector;

pub struct UinputInjector {
    device: VirtualDevice,
}

impl UinputInjector {
    pub fn open(configured_path: &str) -> Result<Self> {
        info!("Opening uinput device '{}'", configured_path);
        let mut keys = AttributeSet::<Key>::new();
        for code in 0..=255u16 {
            keys.insert(Key::new(code));
        }
        let device = VirtualDeviceBuilder::new()
            .context("Couldn't open uinput")?
            .name("IR Controller")
            .with_keys(&keys)
            .context("Couldn't register key events")?
            .build()
            .context("Couldn't create uinput device")?;
        Ok(Self { device })
    }
}

impl KeyInjector for UinputInjector {
    fn key_press(&mut self, key: &str) -> bool {
        let Some(code) = decode_key(key) else {
            warn!("Unknown key name '{}'", key);
            return false;
        };
        debug!("Injecting key '{}'", key);
        let events = [
            InputEvent::new(EventType::KEY, code.code(), 1),
            InputEvent::new(EventType::KEY, code.code(), 0),
        ];
        if let Err(e) = self.device.emit(&events) {
            warn!("Couldn't inject key '{}': {}", key, e);
            return false;
        }
        true
    }
}

/// Map a key name from a keymap or the fallback table to an input key code.
fn decode_key(name: &str) -> Option<Key> {
    let key = match name.to_ascii_lowercase().as_str() {
        "a" => Key::KEY_A,
        "b" => Key::KEY_B,
        "c" => Key::KEY_C,
        "d" => Key::KEY_D,
        "e" => Key::KEY_E,
        "f" => Key::KEY_F,
        "g" => Key::KEY_G,
        "h" => Key::KEY_H,
        "i" => Key::KEY_I,
        "j" => Key::KEY_J,
        "k" => Key::KEY_K,
        "l" => Key::KEY_L,
        "m" => Key::KEY_M,
        "n" => Key::KEY_N,
        "o" => Key::KEY_O,
        "p" => Key::KEY_P,
        "q" => Key::KEY_Q,
        "r" => Key::KEY_R,
        "s" => Key::KEY_S,
        "t" => Key::KEY_T,
        "u" => Key::KEY_U,
        "v" => Key::KEY_V,
        "w" => Key::KEY_W,
        "x" => Key::KEY_X,
        "y" => Key::KEY_Y,
        "z" => Key::KEY_Z,
        "0" => Key::KEY_0,
        "1" => Key::KEY_1,
        "2" => Key::KEY_2,
        "3" => Key::KEY_3,
        "4" => Key::KEY_4,
        "5" => Key::KEY_5,
        "6" => Key::KEY_6,
        "7" => Key::KEY_7,
        "8" => Key::KEY_8,
        "9" => Key::KEY_9,
        "up" => Key::KEY_UP,
        "down" => Key::KEY_DOWN,
        "left" => Key::KEY_LEFT,
        "right" => Key::KEY_RIGHT,
        "enter" | "return" => Key::KEY_ENTER,
        "space" => Key::KEY_SPACE,
        "esc" | "escape" => Key::KEY_ESC,
        "tab" => Key::KEY_TAB,
        "backspace" => Key::KEY_BACKSPACE,
        "comma" => Key::KEY_COMMA,
        "dot" | "period" => Key::KEY_DOT,
        "minus" => Key::KEY_MINUS,
        "home" => Key::KEY_HOME,
        "end" => Key::KEY_END,
        "pageup" => Key::KEY_PAGEUP,
        "pagedown" => Key::KEY_PAGEDOWN,
        "volumeup" => Key::KEY_VOLUMEUP,
        "volumedown" => Key::KEY_VOLUMEDOWN,
        "mute" => Key::KEY_MUTE,
        _ => return None,
    };
    Some(key)
}
