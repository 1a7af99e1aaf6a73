//! Actuator collaborators (key injection, multi-tap, scripts)
//!
//! The dispatch core only needs narrow call interfaces into the things that
//! produce real-world effects; the concrete backends live here.

pub mod multitap;
pub mod script;
#[cfg(target_os = "linux")]
pub mod uinput;

use crate::config::AppConfig;
use tracing::warn;

/// Synthetic keypress injection.
///
/// Implementations return false when they could not produce the key (no
/// device, unknown key name); the caller's fallback chain then tries the
/// next actuator.
pub trait KeyInjector: Send {
    fn key_press(&mut self, key: &str) -> bool;
}

/// Injector used when no key-injection backend is configured.
pub struct NullInjector;

impl KeyInjector for NullInjector {
    fn key_press(&mut self, _key: &str) -> bool {
        false
    }
}

/// Open the configured key-injection backend, if any.
pub fn open_injector(config: &AppConfig) -> Box<dyn KeyInjector> {
    let Some(device) = &config.uinput_device else {
        return Box::new(NullInjector);
    };
    #[cfg(target_os = "linux")]
    {
        match uinput::UinputInjector::open(device) {
            Ok(injector) => Box::new(injector),
            Err(e) => {
                warn!("Couldn't open uinput device '{}': {}", device, e);
                Box::new(NullInjector)
            }
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        warn!(
            "uinput device '{}' configured but unsupported on this platform",
            device
        );
        Box::new(NullInjector)
    }
}
