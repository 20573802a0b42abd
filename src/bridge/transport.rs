//! Socket transport to an external engine process
//!
//! Wire format: `[u32 length (big-endian)][JSON payload]` in both directions.
//! The client sends a `Hello` on connect; the engine then streams state,
//! gaze and eye-position messages until either side closes the socket.

use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::engine::{
    Engine, EngineError, EngineHandlers, EngineSession, EngineState, EyePositionEvent, GazeEvent,
};

/// Protocol version announced in `Hello`
pub const PROTOCOL_VERSION: u32 = 1;

/// Frames above this size are treated as a broken stream
const MAX_FRAME_LEN: usize = 1 << 20;

const MIN_CONNECT_TIMEOUT: Duration = Duration::from_millis(1);

/// Messages sent by the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Hello {
        client_name: String,
        protocol_version: u32,
    },
}

/// Messages sent by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineMessage {
    State { state: EngineState },
    Gaze(GazeEvent),
    EyePosition(EyePositionEvent),
}

/// Write one length-prefixed JSON frame
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> io::Result<()> {
    let payload =
        serde_json::to_vec(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame too large"))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()
}

/// Read one raw frame payload
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {} bytes", len),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Engine reached over a local TCP socket
pub struct SocketEngine {
    addr: String,
    client_name: String,
    connect_timeout: Duration,
}

impl SocketEngine {
    pub fn new(addr: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            client_name: client_name.into(),
            connect_timeout: Duration::from_secs(2),
        }
    }

    /// `TcpStream::connect_timeout` rejects a zero duration, so the
    /// timeout is at least 1 ms.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout.max(MIN_CONNECT_TIMEOUT);
        self
    }

    fn dial(&self) -> Result<TcpStream, EngineError> {
        let not_running = |e: io::Error| EngineError::NotRunning(format!("{}: {}", self.addr, e));

        let addrs: Vec<_> = self.addr.to_socket_addrs().map_err(not_running)?.collect();
        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no address resolved");
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = e,
            }
        }
        Err(not_running(last_err))
    }
}

impl Engine for SocketEngine {
    fn open(&mut self, handlers: EngineHandlers) -> Result<Box<dyn EngineSession>, EngineError> {
        let stream = self.dial()?;
        stream.set_nodelay(true)?;

        let mut writer = BufWriter::new(&stream);
        write_frame(
            &mut writer,
            &ClientMessage::Hello {
                client_name: self.client_name.clone(),
                protocol_version: PROTOCOL_VERSION,
            },
        )?;
        drop(writer);

        let closing = Arc::new(AtomicBool::new(false));
        let reader = {
            let stream = stream.try_clone()?;
            let closing = Arc::clone(&closing);
            thread::Builder::new()
                .name("gaze-engine-reader".to_string())
                .spawn(move || read_loop(stream, handlers, &closing))?
        };

        log::info!("Engine socket open: {}", self.addr);
        Ok(Box::new(SocketSession {
            stream,
            closing,
            reader: Some(reader),
        }))
    }

    fn name(&self) -> &str {
        &self.addr
    }
}

/// Engine callback thread: decode frames and hand them to the bridge
fn read_loop(stream: TcpStream, handlers: EngineHandlers, closing: &AtomicBool) {
    let mut reader = BufReader::new(stream);
    loop {
        let payload = match read_frame(&mut reader) {
            Ok(p) => p,
            Err(e) => {
                if !closing.load(Ordering::Acquire) {
                    if e.kind() == io::ErrorKind::UnexpectedEof {
                        log::warn!("Engine closed the connection");
                    } else {
                        log::error!("Engine read error: {}", e);
                    }
                    (handlers.on_state)(EngineState::Disconnected);
                }
                return;
            }
        };

        match serde_json::from_slice::<EngineMessage>(&payload) {
            Ok(EngineMessage::State { state }) => (handlers.on_state)(state),
            Ok(EngineMessage::Gaze(event)) => (handlers.on_gaze)(event),
            Ok(EngineMessage::EyePosition(event)) => (handlers.on_eye_position)(event),
            Err(e) => {
                log::debug!("Skipping undecodable engine frame: {}", e);
                (handlers.on_malformed)("engine frame");
            }
        }
    }
}

struct SocketSession {
    stream: TcpStream,
    closing: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl EngineSession for SocketSession {
    fn close(mut self: Box<Self>) {
        self.closing.store(true, Ordering::Release);
        // Unblocks the reader thread
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            log::debug!("Engine socket shutdown: {}", e);
        }
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                log::error!("Engine reader thread panicked");
            }
        }
        log::info!("Engine socket closed");
    }
}
