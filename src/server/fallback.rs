//! Built-in fallback table
//!
//! When no keymap binds a symbol, well-known button names from the stock
//! DVD and DVD-RW remotes still do something sensible: each maps to a
//! prioritized chain of actuator attempts, tried in order until one
//! succeeds.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// One actuator attempt in a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackStep {
    /// Text command to a named remote peer.
    Remote {
        target: &'static str,
        command: String,
    },
    /// Multi-tap text entry for a phone-pad digit.
    Multitap(char),
    /// Synthetic keypress.
    Key(String),
    /// Keypress through the configured script template.
    ScriptKey(String),
}

fn remote(target: &'static str, command: &str) -> FallbackStep {
    FallbackStep::Remote {
        target,
        command: command.to_string(),
    }
}

fn key(name: &str) -> FallbackStep {
    FallbackStep::Key(name.to_string())
}

fn script_key(name: &str) -> FallbackStep {
    FallbackStep::ScriptKey(name.to_string())
}

static TABLE: Lazy<HashMap<String, Vec<FallbackStep>>> = Lazy::new(|| {
    let mut table = HashMap::new();
    let mut both = |suffix: &str, steps: Vec<FallbackStep>| {
        table.insert(format!("dvd_{}", suffix), steps.clone());
        table.insert(format!("dvdrw_{}", suffix), steps);
    };

    // Numbers: same everywhere.
    for d in 0..=9u32 {
        let digit = char::from_digit(d, 10).unwrap();
        let name = digit.to_string();
        both(
            &name,
            vec![
                remote("frontend", &format!("key {}", digit)),
                FallbackStep::Multitap(digit),
                key(&name),
                script_key(&name),
            ],
        );
    }

    // Navigation is more or less universal.
    both(
        "left",
        vec![
            remote("frontend", "key left"),
            remote("vlc", "rewind"),
            key("left"),
            script_key("left"),
        ],
    );
    both(
        "right",
        vec![
            remote("frontend", "key right"),
            remote("vlc", "fastforward"),
            key("right"),
            script_key("right"),
        ],
    );
    both(
        "up",
        vec![remote("frontend", "key up"), key("up"), script_key("up")],
    );
    both(
        "down",
        vec![remote("frontend", "key down"), key("down"), script_key("down")],
    );
    both(
        "ok",
        vec![
            remote("frontend", "key enter"),
            key("enter"),
            script_key("return"),
        ],
    );

    // Old DVD remote for the media frontend.
    table.insert(
        "dvd_next".into(),
        vec![remote("frontend", "key end"), key("comma")],
    );
    table.insert(
        "dvd_prev".into(),
        vec![remote("frontend", "key home"), key("dot")],
    );
    table.insert("dvd_stop".into(), vec![key("x")]);
    table.insert("dvd_power".into(), vec![key("s")]);
    table.insert(
        "dvd_title".into(),
        vec![remote("frontend", "key escape"), key("esc")],
    );
    table.insert(
        "dvd_pause".into(),
        vec![
            remote("frontend", "key p"),
            remote("vlc", "play"),
            key("space"),
        ],
    );
    table.insert(
        "dvd_menu".into(),
        vec![remote("frontend", "key m"), key("tab")],
    );
    table.insert(
        "dvd_display".into(),
        vec![remote("frontend", "key i"), key("m")],
    );
    table.insert("dvd_subtitle".into(), vec![key("t")]);

    // DVD-RW remote driving the on-screen player controls.
    table.insert("dvdrw_last".into(), vec![key("comma")]);
    table.insert("dvdrw_first".into(), vec![key("dot")]);
    table.insert(
        "dvdrw_disc".into(),
        vec![key("backspace"), script_key("escape")],
    );
    table.insert("dvdrw_system".into(), vec![key("tab")]);
    for suffix in ["top_menu", "edit", "select"] {
        table.insert(
            format!("dvdrw_{}", suffix),
            vec![key("m"), script_key("m")],
        );
    }
    table.insert("dvdrw_stop".into(), vec![key("x")]);
    table.insert(
        "dvdrw_pause".into(),
        vec![key("space"), script_key("space")],
    );
    table.insert("dvdrw_play".into(), vec![key("p"), script_key("p")]);
    table.insert("dvdrw_subtitle".into(), vec![key("t"), script_key("s")]);
    table.insert("dvdrw_audio".into(), vec![script_key("a")]);

    table
});

/// Prioritized actuator attempts for a well-known symbol.
pub fn lookup(symbol: &str) -> Option<&'static [FallbackStep]> {
    TABLE.get(symbol).map(Vec::as_slice)
}
