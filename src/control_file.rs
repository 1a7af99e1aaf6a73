//! Control-file reader
//!
//! Parses the daemon's native text format: `button` entries binding names to
//! raw packet shapes, and `keymap` blocks binding symbols to action
//! sequences. Tokens are whitespace separated, `#` comments run to end of
//! line, and single or double quotes group a token with spaces.
//!
//! ```text
//! # shapes captured from the living-room remote
//! button play { 920 430 920 ... }
//!
//! keymap vlc inherit base
//!   key up keypress up
//!   key ok begin keypress enter remote vlc "pause" end
//! end
//! ```

use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;

use thiserror::Error;

use crate::ir::Packet;
use crate::keymap::{Action, Keymap};

#[derive(Debug, Error)]
pub enum ControlFileError {
    #[error("unexpected end of file, expected {0}")]
    UnexpectedEof(&'static str),
    #[error("expected {expected}, got '{got}'")]
    Unexpected { expected: &'static str, got: String },
    #[error("unknown control file entry '{0}'")]
    UnknownEntry(String),
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("unknown keyword '{0}' in keymap '{1}'")]
    UnknownKeymapKeyword(String, String),
    #[error("duplicate inherit statement in keymap '{0}'")]
    DuplicateInherit(String),
    #[error("pulse width '{0}' out of range")]
    WidthOutOfRange(String),
    #[error("multitap operand '{0}' must be a single character")]
    BadMultitapOperand(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Parsed contents of one control file.
#[derive(Debug, Default)]
pub struct ControlFile {
    /// Button shapes in file order. Names may repeat (alternate shapes).
    pub buttons: Vec<(String, Packet)>,
    /// Keymaps in file order; the last one becomes current on registration.
    pub keymaps: Vec<Keymap>,
}

pub fn load(path: impl AsRef<Path>) -> Result<ControlFile, ControlFileError> {
    let text = std::fs::read_to_string(path)?;
    parse(&text)
}

pub fn parse(text: &str) -> Result<ControlFile, ControlFileError> {
    let mut tokens = Tokenizer::new(text);
    let mut file = ControlFile::default();
    while let Some(entry) = tokens.next_token() {
        match entry.as_str() {
            "button" => {
                let name = tokens.require("button name")?;
                let packet = parse_packet(&mut tokens)?;
                file.buttons.push((name, packet));
            }
            "keymap" => file.keymaps.push(parse_keymap(&mut tokens)?),
            other => return Err(ControlFileError::UnknownEntry(other.to_string())),
        }
    }
    Ok(file)
}

fn parse_packet(tokens: &mut Tokenizer) -> Result<Packet, ControlFileError> {
    let open = tokens.require("'{'")?;
    if open != "{" {
        return Err(ControlFileError::Unexpected {
            expected: "'{'",
            got: open,
        });
    }
    let mut widths = Vec::new();
    loop {
        let token = tokens.require("pulse width or '}'")?;
        if token == "}" {
            return Ok(Packet::from_widths(&widths));
        }
        let width: u16 = token
            .parse()
            .map_err(|_| ControlFileError::WidthOutOfRange(token.clone()))?;
        widths.push(width);
    }
}

fn parse_keymap(tokens: &mut Tokenizer) -> Result<Keymap, ControlFileError> {
    let name = tokens.require("keymap name")?;
    let mut keymap = Keymap::new(name);
    loop {
        let keyword = tokens.require("'key', 'inherit' or 'end'")?;
        match keyword.as_str() {
            "key" => {
                let symbol = tokens.require("key symbol")?;
                let actions = parse_actions(tokens)?;
                keymap.bind(symbol, actions);
            }
            "inherit" => {
                if keymap.inherit.is_some() {
                    return Err(ControlFileError::DuplicateInherit(keymap.name));
                }
                keymap.inherit = Some(tokens.require("inherit name")?);
            }
            "end" => return Ok(keymap),
            other => {
                return Err(ControlFileError::UnknownKeymapKeyword(
                    other.to_string(),
                    keymap.name,
                ))
            }
        }
    }
}

/// Parse one action, or a `begin ... end` sequence of them.
fn parse_actions(tokens: &mut Tokenizer) -> Result<Vec<Action>, ControlFileError> {
    let id = tokens.require("action")?;
    if id != "begin" {
        return Ok(vec![parse_one_action(&id, tokens)?]);
    }
    let mut actions = Vec::new();
    loop {
        let id = tokens.require("action or 'end'")?;
        if id == "end" {
            return Ok(actions);
        }
        actions.push(parse_one_action(&id, tokens)?);
    }
}

fn parse_one_action(id: &str, tokens: &mut Tokenizer) -> Result<Action, ControlFileError> {
    match id {
        "keypress" => Ok(Action::Keypress(tokens.require("key name")?)),
        "multitap" => {
            let operand = tokens.require("multitap character")?;
            let mut chars = operand.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Action::Multitap(c)),
                _ => Err(ControlFileError::BadMultitapOperand(operand)),
            }
        }
        "remote" => Ok(Action::Remote {
            target: tokens.require("remote target")?,
            command: tokens.require("remote command")?,
        }),
        "transmit" => Ok(Action::Transmit(tokens.require("button name")?)),
        "set_keymap" => Ok(Action::SetKeymap(tokens.require("keymap name")?)),
        "script" => Ok(Action::Script(tokens.require("script command")?)),
        other => Err(ControlFileError::UnknownAction(other.to_string())),
    }
}

struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Tokenizer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
        }
    }

    fn require(&mut self, expected: &'static str) -> Result<String, ControlFileError> {
        self.next_token()
            .ok_or(ControlFileError::UnexpectedEof(expected))
    }

    fn next_token(&mut self) -> Option<String> {
        loop {
            while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
                self.chars.next();
            }
            match self.chars.peek() {
                None => return None,
                Some('#') => {
                    // Comment to end of line.
                    for c in self.chars.by_ref() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some(&quote) if quote == '"' || quote == '\'' => {
                    self.chars.next();
                    let mut token = String::new();
                    for c in self.chars.by_ref() {
                        if c == quote {
                            break;
                        }
                        token.push(c);
                    }
                    return Some(token);
                }
                Some(_) => {
                    let mut token = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if c.is_whitespace() {
                            break;
                        }
                        token.push(c);
                        self.chars.next();
                    }
                    return Some(token);
                }
            }
        }
    }
}
