//! Server module - dispatch core of the gateway
//!
//! Owns every piece of shared state (dictionary, decoder, keymaps, debounce
//! timers, actuator handles) and drives it from reactor events on a single
//! task: bytes from the receiver decode into packets, packets match into
//! symbols, symbols pass the debounce filter, resolve through the keymaps,
//! and fan out to the actuators.

pub mod debounce;
pub mod fallback;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fs::File;
use std::io::Write as _;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::{debug, info, trace, warn};

use crate::config::AppConfig;
use crate::control_file;
use crate::drivers::multitap::MultiTap;
use crate::drivers::script::ScriptRunner;
use crate::drivers::{self, KeyInjector};
use crate::ir::decoder::PulseDecoder;
use crate::ir::device::IrDevice;
use crate::ir::dict::SymbolDictionary;
use crate::ir::Packet;
use crate::keymap::{Action, KeymapSet};
use crate::reactor::{ConnKind, ConnectionId, Event, Polled, Reactor};
use debounce::DebounceRepeat;
use fallback::FallbackStep;

/// Command clients may not accumulate more than this much partial line.
const COMMAND_LINE_MAX: usize = 1024;

pub struct Server {
    pub(crate) config: AppConfig,
    pub(crate) reactor: Reactor,
    pub(crate) decoder: PulseDecoder,
    pub(crate) dict: SymbolDictionary,
    pub(crate) keymaps: KeymapSet,
    pub(crate) debounce: DebounceRepeat,
    pub(crate) multitap: MultiTap,
    pub(crate) injector: Box<dyn KeyInjector>,
    pub(crate) scripts: ScriptRunner,
    pub(crate) device: Option<IrDevice>,
    pub(crate) capture_log: Option<File>,
    /// Label written to the capture log for unrecognized packets; runtime
    /// adjustable through the `=` command (used while recording captures).
    pub(crate) unknown_label: String,
    pub(crate) ir_conn: Option<ConnectionId>,
    /// Live outbound peers by configured name.
    pub(crate) peers: HashMap<String, ConnectionId>,
    last_peer_check: Instant,
}

impl Server {
    pub fn new(config: AppConfig) -> Result<Self> {
        let tuning = &config.tuning;
        let capture_log = match &config.capture_log {
            Some(path) => Some(
                File::create(path)
                    .with_context(|| format!("Couldn't open output file '{}'", path.display()))?,
            ),
            None => None,
        };
        Ok(Self {
            reactor: Reactor::new(tuning.packet_timeout()),
            decoder: PulseDecoder::new(tuning),
            dict: SymbolDictionary::new(tuning.jitter),
            keymaps: KeymapSet::new(),
            debounce: DebounceRepeat::new(tuning.debounce()),
            multitap: MultiTap::new(),
            injector: drivers::open_injector(&config),
            scripts: ScriptRunner::new(config.key_script_template.clone()),
            device: None,
            capture_log,
            unknown_label: config.unknown_label.clone(),
            ir_conn: None,
            peers: HashMap::new(),
            last_peer_check: Instant::now(),
            config,
        })
    }

    /// Replace the key-injection backend (tests use a recording stub).
    pub fn set_injector(&mut self, injector: Box<dyn KeyInjector>) {
        self.injector = injector;
    }

    /// Read every configured control file into the dictionary and keymap
    /// registry. Malformed files are fatal configuration errors.
    pub fn load_controls(&mut self) -> Result<()> {
        for path in self.config.controls.clone() {
            info!("Reading control file '{}'", path.display());
            let file = control_file::load(&path)
                .with_context(|| format!("Couldn't read control file '{}'", path.display()))?;
            for (name, packet) in file.buttons {
                self.dict.insert(name, packet);
            }
            for keymap in file.keymaps {
                info!("Registered keymap '{}'", keymap.name);
                self.keymaps.register(keymap);
            }
        }
        info!("IR symbol dictionary has {} entries", self.dict.len());
        for entry in self.dict.entries() {
            debug!("button {} {}", entry.name, entry.packet);
        }
        if let Some(current) = self.keymaps.current_name() {
            info!("Current keymap is '{}'", current);
        }
        Ok(())
    }

    /// Open the configured endpoints: IR device, command listener, and the
    /// first dial of every remote peer.
    pub async fn start(&mut self) -> Result<()> {
        if let Some(path) = self.config.device.clone() {
            let (device, bytes_rx) = IrDevice::open(&path)?;
            self.device = Some(device);
            self.ir_conn = Some(self.reactor.add_ir_channel("irdev", bytes_rx));
        }
        if let Some(port) = self.config.command_port {
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            let (_, local) = self.reactor.listen(addr).await?;
            info!("Command server listening on {}", local);
        }
        self.dial_absent_peers().await;
        Ok(())
    }

    /// Main loop: poll, dispatch, and keep optional peers dialed.
    pub async fn run(&mut self) -> Result<()> {
        info!("Ready to process IR events");
        loop {
            self.redial_peers().await;
            match self.reactor.poll_once().await? {
                Polled::Idle(idle) => self.on_idle(idle).await?,
                Polled::Ready(id, event) => self.on_event(id, event).await?,
            }
        }
    }

    /// Once per wall-clock second, re-dial any configured peer that is
    /// currently absent.
    async fn redial_peers(&mut self) {
        if self.last_peer_check.elapsed() < Duration::from_secs(1) {
            return;
        }
        self.last_peer_check = Instant::now();
        self.dial_absent_peers().await;
    }

    async fn dial_absent_peers(&mut self) {
        for remote in self.config.remotes.clone() {
            if self.peers.contains_key(&remote.name) {
                continue;
            }
            debug!("Trying to connect to '{}'...", remote.name);
            if let Some(id) = self
                .reactor
                .connect_peer(remote.name.clone(), &remote.host, remote.port)
                .await
            {
                info!(
                    "Connected to '{}' at {}:{}",
                    remote.name, remote.host, remote.port
                );
                self.peers.insert(remote.name, id);
            }
        }
    }

    async fn on_idle(&mut self, idle: Vec<ConnectionId>) -> Result<()> {
        for id in idle {
            if Some(id) == self.ir_conn {
                if let Some(packet) = self.decoder.timeout() {
                    self.on_packet(packet, true).await?;
                }
                // Silence also releases the held button.
                self.debounce.reset();
            }
        }
        Ok(())
    }

    async fn on_event(&mut self, id: ConnectionId, event: Event) -> Result<()> {
        match event {
            Event::IrData(bytes) => self.on_ir_bytes(&bytes).await,
            Event::IrClosed => bail!("Lost connection to the IR device"),
            Event::Incoming(result) => {
                let (stream, peer) = result.context("Couldn't accept command connection")?;
                self.reactor.add_command(format!("cmd {}", peer), stream);
                Ok(())
            }
            Event::Readable | Event::Exception => self.on_socket_readable(id).await,
        }
    }

    pub(crate) async fn on_ir_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let packets = self
            .decoder
            .feed(bytes)
            .context("IR stream protocol violation")?;
        for packet in packets {
            self.on_packet(packet, false).await?;
        }
        Ok(())
    }

    async fn on_packet(&mut self, packet: Packet, on_timeout: bool) -> Result<()> {
        debug!("Received IR packet: {}", packet);
        trace!("{}", packet.render(78));
        let name = self.dict.lookup_by_shape(&packet).map(str::to_string);
        self.log_packet(name.as_deref(), &packet, on_timeout);
        match name {
            Some(name) => {
                if let Some(symbol) = self.debounce.filter(&name, Instant::now()) {
                    self.handle_symbol(&symbol).await?;
                }
            }
            None => debug!("Unknown packet"),
        }
        Ok(())
    }

    /// Append one `key ... { widths }` line to the capture log.
    fn log_packet(&mut self, name: Option<&str>, packet: &Packet, on_timeout: bool) {
        let Some(file) = &mut self.capture_log else {
            return;
        };
        let label = match name {
            Some(name) => format!("key \"{}\" {}", name, packet),
            None => format!("key {} {}", self.unknown_label, packet),
        };
        let suffix = if on_timeout { " # on timeout" } else { "" };
        if writeln!(file, "{}{}", label, suffix).and_then(|_| file.flush()).is_err() {
            warn!("Couldn't write capture log");
        }
    }

    /// Map a symbol to actions and execute them. Returns whether anything
    /// handled the symbol.
    pub(crate) async fn handle_symbol(&mut self, symbol: &str) -> Result<bool> {
        debug!("Got button press '{}'", symbol);
        match self.keymaps.resolve(symbol)? {
            Some(actions) => {
                self.run_actions(&actions).await?;
                Ok(true)
            }
            None => {
                trace!("No keymap binds '{}', trying the fallback table", symbol);
                self.run_fallback(symbol).await
            }
        }
    }

    async fn run_actions(&mut self, actions: &[Action]) -> Result<()> {
        for action in actions {
            match action {
                Action::Keypress(name) => {
                    if !self.injector.key_press(name) {
                        debug!("Keypress '{}' not delivered", name);
                    }
                }
                Action::Multitap(digit) => {
                    self.tap(*digit);
                }
                Action::Remote { target, command } => {
                    if !self.remote_command(target, command).await {
                        debug!("Remote '{}' is not connected", target);
                    }
                }
                Action::Transmit(name) => {
                    if self.transmit_symbol(name)?.is_none() {
                        warn!("Unknown button '{}' in transmit action", name);
                    }
                }
                Action::SetKeymap(name) => {
                    self.keymaps
                        .set_current(name)
                        .with_context(|| format!("Cannot switch to keymap '{}'", name))?;
                    info!("Setting keymap to '{}'", name);
                }
                Action::Script(command) => {
                    self.scripts.run(command).await;
                }
            }
        }
        Ok(())
    }

    /// Try the built-in chain for a well-known symbol, stopping at the
    /// first actuator that reports success.
    async fn run_fallback(&mut self, symbol: &str) -> Result<bool> {
        let Some(steps) = fallback::lookup(symbol) else {
            debug!("Cannot find button '{}' in any keymap or the fallback table", symbol);
            return Ok(false);
        };
        for step in steps {
            let handled = match step {
                FallbackStep::Remote { target, command } => {
                    self.remote_command(target, command).await
                }
                FallbackStep::Multitap(digit) => self.tap(*digit),
                FallbackStep::Key(name) => self.injector.key_press(name),
                FallbackStep::ScriptKey(name) => self.scripts.key(name).await,
            };
            if handled {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn tap(&mut self, digit: char) -> bool {
        let Some(tap) = self.multitap.tap(digit, Instant::now()) else {
            return false;
        };
        if tap.erase {
            self.injector.key_press("backspace");
        }
        self.injector.key_press(tap.key)
    }

    /// Send a newline-terminated command to a named remote peer.
    async fn remote_command(&mut self, target: &str, command: &str) -> bool {
        let Some(&id) = self.peers.get(target) else {
            return false;
        };
        let line = format!("{}\n", command);
        match self.reactor.write(id, line.as_bytes()).await {
            Ok(()) => {
                debug!("Sent command '{}' to '{}'", command, target);
                true
            }
            Err(e) => {
                warn!("Couldn't write to '{}': {}", target, e);
                self.close_connection(id);
                false
            }
        }
    }

    /// Look up a stored packet and queue it for transmission. Returns the
    /// packet so callers can report or display it.
    pub(crate) fn transmit_symbol(&mut self, name: &str) -> Result<Option<Packet>> {
        let Some(packet) = self.dict.lookup_by_name(name) else {
            return Ok(None);
        };
        let packet = packet.clone();
        match &self.device {
            Some(device) => device.transmit(packet.clone())?,
            None => debug!("(No IR connection to transmit on)"),
        }
        Ok(Some(packet))
    }

    async fn on_socket_readable(&mut self, id: ConnectionId) -> Result<()> {
        enum Outcome {
            Closed,
            Lines(Vec<String>),
            Overflow,
            PeerData(String, Vec<u8>),
            Nothing,
        }

        let outcome = {
            let Some(conn) = self.reactor.get_mut(id) else {
                return Ok(());
            };
            let mut buf = [0u8; 1024];
            match &mut conn.kind {
                ConnKind::Command { stream, line } => match stream.try_read(&mut buf) {
                    Ok(0) => Outcome::Closed,
                    Ok(n) => match collect_lines(line, &buf[..n]) {
                        Some(lines) => Outcome::Lines(lines),
                        None => Outcome::Overflow,
                    },
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Outcome::Nothing,
                    Err(_) => Outcome::Closed,
                },
                ConnKind::Peer { stream } => match stream.try_read(&mut buf) {
                    Ok(0) => Outcome::Closed,
                    Ok(n) => Outcome::PeerData(conn.label.clone(), buf[..n].to_vec()),
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Outcome::Nothing,
                    Err(_) => Outcome::Closed,
                },
                _ => Outcome::Nothing,
            }
        };

        match outcome {
            Outcome::Closed => self.close_connection(id),
            Outcome::Overflow => {
                let _ = self
                    .reactor
                    .write(id, b"Error: command buffer overrun\n\n")
                    .await;
                self.close_connection(id);
            }
            Outcome::Lines(lines) => {
                for line in lines {
                    self.handle_command_line(id, &line).await?;
                }
            }
            Outcome::PeerData(label, data) => {
                debug!(
                    "Response from '{}': {}",
                    label,
                    String::from_utf8_lossy(&data).trim_end()
                );
            }
            Outcome::Nothing => {}
        }
        Ok(())
    }

    /// One line of the runtime command protocol: `>name` transmits a stored
    /// packet, `=name` relabels unknown packets, anything else is a symbol.
    pub(crate) async fn handle_command_line(&mut self, id: ConnectionId, line: &str) -> Result<()> {
        if let Some(name) = line.strip_prefix('>') {
            match self.transmit_symbol(name)? {
                Some(packet) => {
                    debug!("Command '>{}' gets packet: {}", name, packet);
                    let _ = self.reactor.write(id, b"ok\n").await;
                }
                None => {
                    let reply = format!("Unknown button '{}'\n", name);
                    let _ = self.reactor.write(id, reply.as_bytes()).await;
                }
            }
        } else if let Some(label) = line.strip_prefix('=') {
            debug!("Setting unknown-packet label to '{}'", label);
            self.unknown_label = label.to_string();
        } else {
            debug!("Command port gets '{}'", line);
            if self.handle_symbol(line).await? {
                let _ = self.reactor.write(id, b"ok\n").await;
            }
        }
        Ok(())
    }

    fn close_connection(&mut self, id: ConnectionId) {
        if let Some(conn) = self.reactor.remove(id) {
            debug!("Closed connection '{}'", conn.label);
        }
        self.peers.retain(|_, &mut peer_id| peer_id != id);
    }
}

/// Accumulate bytes into `line`, returning every completed line, or `None`
/// when the partial line outgrows the cap (the client is then disconnected).
/// Carriage returns are dropped; empty lines are skipped.
fn collect_lines(line: &mut Vec<u8>, bytes: &[u8]) -> Option<Vec<String>> {
    let mut lines = Vec::new();
    for &byte in bytes {
        match byte {
            b'\n' | b'\r' => {
                if !line.is_empty() {
                    lines.push(String::from_utf8_lossy(line).into_owned());
                    line.clear();
                }
            }
            _ => {
                if line.len() >= COMMAND_LINE_MAX {
                    return None;
                }
                line.push(byte);
            }
        }
    }
    Some(lines)
}
