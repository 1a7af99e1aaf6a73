//! IR Toy serial device
//!
//! Opens the transceiver, negotiates sampling mode, and bridges the blocking
//! serial port onto the reactor: a dedicated reader thread forwards received
//! bytes over a channel and services transmit requests inline, so transmit
//! status replies never leak into the pulse decoder.

use std::io::{Read, Write};
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serialport::SerialPort;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ir::Packet;

const BAUD_RATE: u32 = 921_600;
const HANDSHAKE_TRIES: u32 = 5;
/// Transmit opcode in sampling mode.
const OP_TRANSMIT: u8 = 0x03;

/// Handle to the IR Toy owned by its reader thread.
pub struct IrDevice {
    tx: std_mpsc::Sender<Packet>,
}

impl IrDevice {
    /// Open the device, perform the sampling-mode handshake, and spawn the
    /// reader thread. Returns the handle and the byte channel to register
    /// with the reactor.
    pub fn open(path: &str) -> Result<(Self, mpsc::Receiver<Vec<u8>>)> {
        let mut port = open_port(path)?;
        handshake(&mut port)?;

        // Short read timeout so the thread keeps servicing transmit requests.
        port.set_timeout(Duration::from_millis(50))
            .context("Couldn't set serial timeout")?;

        let (bytes_tx, bytes_rx) = mpsc::channel(256);
        let (tx, tx_rx) = std_mpsc::channel();
        thread::Builder::new()
            .name("irtoy-reader".into())
            .spawn(move || reader_loop(port, bytes_tx, tx_rx))
            .context("Couldn't spawn IR reader thread")?;

        Ok((Self { tx }, bytes_rx))
    }

    /// Queue a packet for transmission.
    pub fn transmit(&self, packet: Packet) -> Result<()> {
        self.tx
            .send(packet)
            .map_err(|_| anyhow::anyhow!("IR reader thread is gone"))
    }
}

fn builder(path: &str) -> serialport::SerialPortBuilder {
    serialport::new(path, BAUD_RATE)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_secs(1))
}

/// Open the serial device. A `*` in the path tries the digits 0-9 in its
/// place, so `/dev/ttyACM*` finds the device wherever it enumerated.
fn open_port(path: &str) -> Result<Box<dyn SerialPort>> {
    if let Some(star) = path.find('*') {
        for digit in b'0'..=b'9' {
            let mut candidate = path.to_string();
            candidate.replace_range(star..=star, &char::from(digit).to_string());
            if let Ok(port) = builder(&candidate).open() {
                info!("Opened IR device '{}'", candidate);
                return Ok(port);
            }
        }
        bail!("Cannot open device '{}' (tried 0-9 for '*')", path);
    }
    let port = builder(path)
        .open()
        .with_context(|| format!("Cannot open device '{}'", path))?;
    info!("Opened IR device '{}'", path);
    Ok(port)
}

/// Put the IR Toy into sampling mode.
///
/// Resets the device, sends `S`, and expects the three-byte protocol
/// version `S<digit><digit>`. A bogus response is retried with an
/// escalating settle delay; repeated failure is fatal.
fn handshake(port: &mut Box<dyn SerialPort>) -> Result<()> {
    info!("Initialising IRToy...");
    for attempt in 0..HANDSHAKE_TRIES {
        for _ in 0..5 {
            port.write_all(&[0x00]).context("Couldn't reset IR device")?;
        }
        thread::sleep(Duration::from_secs(u64::from(1 + attempt)));

        debug!("Setting sampling mode");
        port.write_all(b"S").context("Couldn't write to IR device")?;
        let mut reply = [0u8; 3];
        port.read_exact(&mut reply)
            .context("Couldn't read protocol version")?;
        let version = String::from_utf8_lossy(&reply).into_owned();
        if reply[0] == b'S' && reply[1].is_ascii_digit() && reply[2].is_ascii_digit() {
            info!("Protocol version '{}'", version);
            return Ok(());
        }
        warn!("Read bogus response '{}', retrying...", version.escape_debug());
    }
    bail!("Couldn't set sampling mode")
}

fn reader_loop(
    mut port: Box<dyn SerialPort>,
    bytes_tx: mpsc::Sender<Vec<u8>>,
    tx_rx: std_mpsc::Receiver<Packet>,
) {
    let mut buf = [0u8; 512];
    loop {
        while let Ok(packet) = tx_rx.try_recv() {
            transmit(&mut port, &packet);
        }
        match port.read(&mut buf) {
            Ok(0) => {
                warn!("IR device closed");
                break;
            }
            Ok(n) => {
                if bytes_tx.blocking_send(buf[..n].to_vec()).is_err() {
                    // Reactor side is gone; nothing left to feed.
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => {
                warn!("IR device read failed: {}", e);
                break;
            }
        }
    }
    // Dropping bytes_tx closes the channel; the reactor reports the loss
    // of its mandatory input and the server shuts down.
}

/// Frame a packet for the wire: transmit opcode, big-endian width pairs,
/// and the end-of-transmission marker.
fn encode_transmission(packet: &Packet) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(3 + 2 * packet.len());
    buffer.push(OP_TRANSMIT);
    for width in packet.widths() {
        buffer.extend_from_slice(&width.to_be_bytes());
    }
    buffer.extend_from_slice(&[0xFF, 0xFF]);
    buffer
}

fn transmit(port: &mut Box<dyn SerialPort>, packet: &Packet) {
    let buffer = encode_transmission(packet);
    debug!("Transmitting {} bytes: {}", buffer.len(), packet);
    if let Err(e) = port.write_all(&buffer) {
        warn!("Couldn't transmit packet: {}", e);
        return;
    }
    // The status reply is read here, on the owning thread, so its bytes
    // never reach the pulse decoder.
    let mut reply = [0u8; 3];
    match port.read_exact(&mut reply) {
        Ok(()) => debug!(
            "Transmit reply {} ('{}') {} {}",
            reply[0],
            char::from(reply[0]).escape_debug(),
            reply[1],
            reply[2]
        ),
        Err(e) => warn!("No transmit reply: {}", e),
    }
}
