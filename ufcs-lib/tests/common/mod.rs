//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use hex;
#[allow(unused_imports)]
pub use ufcs_lib::error::UfcsError;
#[allow(unused_imports)]
pub use ufcs_lib::message::*;
#[allow(unused_imports)]
pub use ufcs_lib::packet::{ControlMsg, DataMsg, MsgType, Package, decode_header, encode_header};
#[allow(unused_imports)]
pub use ufcs_lib::retry::NoDelay;
#[allow(unused_imports)]
pub use ufcs_lib::transport::{DetectOutcome, Transport, TransportError, WaitFlags};
#[allow(unused_imports)]
pub use ufcs_lib::{Mode, ProtocolConfig, Session};

use std::collections::VecDeque;

/// Decode hex string to bytes for testing
#[allow(dead_code)]
pub fn hex_to_bytes(hex_data: &str) -> Bytes {
    Bytes::from(hex::decode(hex_data).expect("Failed to decode hex"))
}

/// One capability record: 500-3000 mA, 5000-11000 mV, mode 1
#[allow(dead_code)]
pub const CAPABILITY_RECORD: &str = "10044c01f4012c32";

/// Refuse of a Request (data, num 5) with reason 2
#[allow(dead_code)]
pub const REFUSE_NOT_SUPPORT: &str = "05010202";

/// What the adapter does when the host waits for a message.
#[derive(Debug, Clone)]
pub enum Reply {
    Frame { header: [u8; 4], body: Vec<u8> },
    Silence,
}

#[allow(dead_code)]
pub fn ctrl(num: u8, cmd: ControlMsg) -> Reply {
    Reply::Frame {
        header: encode_header(&Package::control(num, cmd)),
        body: Vec::new(),
    }
}

#[allow(dead_code)]
pub fn data(num: u8, cmd: DataMsg, body: &[u8]) -> Reply {
    Reply::Frame {
        header: encode_header(&Package::data(num, cmd, body.len() as u8)),
        body: body.to_vec(),
    }
}

/// Vendor-defined frame; the engine never expects one
#[allow(dead_code)]
pub fn vendor(num: u8, body: &[u8]) -> Reply {
    let pkg = Package {
        msg_type: MsgType::VendorDefined,
        ..Package::data(num, DataMsg::SourceInfo, body.len() as u8)
    };
    Reply::Frame {
        header: encode_header(&pkg),
        body: body.to_vec(),
    }
}

#[allow(dead_code)]
pub fn data_hex(num: u8, cmd: DataMsg, body: &str) -> Reply {
    data(num, cmd, &hex_to_bytes(body))
}

/// A message the host put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub header: Package,
    pub body: Vec<u8>,
}

/// Transport that plays back a fixed list of replies, one per wait.
pub struct MockTransport {
    pub chip: String,
    pub detect: DetectOutcome,
    pub replies: VecDeque<Reply>,
    pub sent: Vec<Sent>,
    pub waits: usize,
    pub master_resets: usize,
    /// Bytes the host read out of received bodies
    pub body_bytes_read: usize,
    current: Option<(Vec<u8>, Vec<u8>)>,
    pending_header: Option<[u8; 4]>,
    pending_body: Vec<u8>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            chip: "stm32g031".to_string(),
            detect: DetectOutcome::Succeeded,
            replies: replies.into(),
            sent: Vec::new(),
            waits: 0,
            master_resets: 0,
            body_bytes_read: 0,
            current: None,
            pending_header: None,
            pending_body: Vec::new(),
        }
    }

    pub fn with_chip(mut self, chip: &str) -> Self {
        self.chip = chip.to_string();
        self
    }

    pub fn with_detect(mut self, detect: DetectOutcome) -> Self {
        self.detect = detect;
        self
    }

    /// Message numbers of every sent header, in order
    pub fn sent_numbers(&self) -> Vec<u8> {
        self.sent.iter().map(|s| s.header.msg_number).collect()
    }

    pub fn sent_cmds(&self) -> Vec<u8> {
        self.sent.iter().map(|s| s.header.cmd).collect()
    }
}

impl Transport for MockTransport {
    fn chip_name(&self) -> &str {
        &self.chip
    }

    fn detect_adapter(&mut self) -> Result<DetectOutcome, TransportError> {
        Ok(self.detect)
    }

    fn send_header(&mut self, header: &[u8; 4]) -> Result<(), TransportError> {
        self.pending_header = Some(*header);
        self.pending_body.clear();
        Ok(())
    }

    fn send_body(&mut self, body: &[u8]) -> Result<(), TransportError> {
        self.pending_body.extend_from_slice(body);
        Ok(())
    }

    fn end_send(&mut self, _flags: WaitFlags) -> Result<(), TransportError> {
        let header = self.pending_header.take().ok_or(TransportError::NotReady)?;
        let header = decode_header(&header).map_err(|e| TransportError::Bus(e.to_string()))?;
        self.sent.push(Sent {
            header,
            body: std::mem::take(&mut self.pending_body),
        });
        Ok(())
    }

    fn wait_ready(&mut self, flags: WaitFlags) -> Result<(), TransportError> {
        self.waits += 1;
        if self.current.is_some() {
            return Ok(());
        }
        match self.replies.pop_front() {
            Some(Reply::Frame { header, body }) => {
                self.current = Some((header.to_vec(), body));
                Ok(())
            }
            Some(Reply::Silence) | None => Err(TransportError::Timeout(flags)),
        }
    }

    fn receive_header(&mut self, header: &mut [u8; 4]) -> Result<(), TransportError> {
        let (raw, _) = self.current.as_ref().ok_or(TransportError::NotReady)?;
        header.copy_from_slice(raw);
        Ok(())
    }

    fn receive_body(&mut self, body: &mut [u8]) -> Result<(), TransportError> {
        let (_, raw) = self.current.as_ref().ok_or(TransportError::NotReady)?;
        if raw.len() != body.len() {
            return Err(TransportError::Bus(format!("body {} != {}", raw.len(), body.len())));
        }
        body.copy_from_slice(raw);
        self.body_bytes_read += body.len();
        Ok(())
    }

    fn end_receive(&mut self) -> Result<(), TransportError> {
        self.current.take().map(|_| ()).ok_or(TransportError::NotReady)
    }

    fn soft_reset_master(&mut self) -> Result<(), TransportError> {
        self.master_resets += 1;
        self.current = None;
        Ok(())
    }
}

/// Session over a scripted transport with instant delays
#[allow(dead_code)]
pub fn scripted(replies: Vec<Reply>) -> Session<MockTransport, NoDelay> {
    Session::with_delay(MockTransport::new(replies), ProtocolConfig::default(), NoDelay::default())
}

/// Replies that take a fresh session through detection and capability discovery
#[allow(dead_code)]
pub fn handshake_replies() -> Vec<Reply> {
    vec![
        ctrl(0, ControlMsg::Ack),
        ctrl(1, ControlMsg::Ack),
        data_hex(0, DataMsg::OutputCapabilities, CAPABILITY_RECORD),
    ]
}

/// Route library logs to the test harness when RUST_LOG is set
#[allow(dead_code)]
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(EnvFilter::from_default_env())
        .try_init();
}
