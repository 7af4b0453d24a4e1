//! Per-adapter session and the acknowledged send/receive engine.
//!
//! A [`Session`] owns the transport, the sequence counter and every cached
//! value learned from the adapter. All exchanges go through four primitives:
//! [`Session::send_control`], [`Session::send_data`],
//! [`Session::receive_control`] and [`Session::receive_data`].

use crate::config::ProtocolConfig;
use crate::constants::MAX_RX_BUFFER_SIZE;
use crate::error::{Result, UfcsError};
use crate::message::{Capability, DeviceInfo, Payload, Refuse};
use crate::packet::{ControlMsg, DataMsg, MsgType, Package, decode_header, encode_header};
use crate::retry::{Delay, ThreadDelay, retry};
use crate::sequence::SequenceCounter;
use crate::transport::{Transport, WaitFlags};
use bytes::Bytes;
use std::fmt;
use tracing::{debug, warn};

const RX_WAIT: WaitFlags = WaitFlags::CRC_ERROR.union(WaitFlags::DATA_READY);

/// Charging mode reported by detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Undefined,
    /// Direct-charge capable
    Sc,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Undefined => write!(f, "undefined"),
            Mode::Sc => write!(f, "sc"),
        }
    }
}

/// Everything a session remembers about the adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub detect_finished: bool,
    pub support_mode: Mode,
    pub capabilities: Vec<Capability>,
    pub capabilities_read: bool,
    pub device_info: Option<DeviceInfo>,
    /// Selected capability mode, 1-based
    pub output_mode: u8,
    /// Last requested voltage (mV)
    pub output_volt: u32,
    /// Last requested current (mA)
    pub output_curr: u32,
}

pub struct Session<T: Transport, D: Delay = ThreadDelay> {
    pub(crate) transport: T,
    pub(crate) delay: D,
    pub(crate) sequence: SequenceCounter,
    pub(crate) config: ProtocolConfig,
    pub(crate) info: SessionInfo,
    /// Header read but not yet finished after a type mismatch
    pending: Option<Package>,
}

impl<T: Transport> Session<T, ThreadDelay> {
    pub fn new(transport: T, config: ProtocolConfig) -> Self {
        Self::with_delay(transport, config, ThreadDelay)
    }
}

impl<T: Transport, D: Delay> Session<T, D> {
    pub fn with_delay(transport: T, config: ProtocolConfig, delay: D) -> Self {
        Self {
            transport,
            delay,
            sequence: SequenceCounter::new(),
            config,
            info: SessionInfo::default(),
            pending: None,
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn sequence(&self) -> &SequenceCounter {
        &self.sequence
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn delay_mut(&mut self) -> &mut D {
        &mut self.delay
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Forget everything learned from the adapter and restart numbering.
    pub fn set_default_param(&mut self) {
        self.info = SessionInfo::default();
        self.pending = None;
        self.sequence.reset();
    }

    /// Send a control message, optionally waiting for its Ack.
    pub fn send_control(&mut self, cmd: ControlMsg, expect_ack: bool) -> Result<()> {
        let number = self.sequence.get_number();
        let pkg = Package::control(number, cmd);
        self.send_package(&pkg, &[], expect_ack)
    }

    /// Send a data message with `body`, optionally waiting for its Ack.
    pub fn send_data(&mut self, cmd: DataMsg, body: &[u8], expect_ack: bool) -> Result<()> {
        let length = u8::try_from(body.len())
            .ok()
            .filter(|_| body.len() <= MAX_RX_BUFFER_SIZE)
            .ok_or(UfcsError::PayloadTooLong {
                len: body.len(),
                max: MAX_RX_BUFFER_SIZE,
            })?;
        let number = self.sequence.get_number();
        let pkg = Package::data(number, cmd, length);
        self.send_package(&pkg, body, expect_ack)
    }

    pub fn send_payload<P: Payload>(&mut self, payload: &P, expect_ack: bool) -> Result<()> {
        let body = payload.encode()?;
        self.send_data(P::CMD, &body, expect_ack)
    }

    fn send_package(&mut self, pkg: &Package, body: &[u8], expect_ack: bool) -> Result<()> {
        self.discard_pending()?;
        let header = encode_header(pkg);
        let number = pkg.msg_number;
        let label = pkg.message_name();

        if !expect_ack {
            Self::transmit(&mut self.transport, pkg, &header, body)?;
            self.sequence.advance(number.wrapping_add(1));
            return Ok(());
        }

        let policy = self.config.retry_policy();
        let transport = &mut self.transport;
        retry(&policy, &mut self.delay, &label, |attempt| {
            if attempt > 1 {
                debug!("resend {} num={} attempt={}", label, number, attempt);
            }
            Self::transmit(transport, pkg, &header, body)?;
            Self::await_ack(transport, number)
        })?;

        self.sequence.advance(number.wrapping_add(1));
        Ok(())
    }

    fn transmit(transport: &mut T, pkg: &Package, header: &[u8; 4], body: &[u8]) -> Result<()> {
        debug!("tx {}", pkg);
        transport.send_header(header)?;
        if !body.is_empty() {
            transport.send_body(body)?;
        }
        transport.end_send(WaitFlags::PACKET_COMPLETE)?;
        Ok(())
    }

    fn await_ack(transport: &mut T, number: u8) -> Result<()> {
        if let Err(e) = transport.wait_ready(RX_WAIT) {
            debug!("wait for ack failed: {}", e);
            return Err(UfcsError::Timeout);
        }
        let mut raw = [0u8; 4];
        transport.receive_header(&mut raw)?;
        transport.end_receive()?;
        let reply = decode_header(&raw)?;
        debug!("rx {}", reply);

        if reply.msg_type == MsgType::Control && reply.cmd == u8::from(ControlMsg::Nack) {
            return Err(UfcsError::Nack);
        }
        if reply.msg_type != MsgType::Control {
            return Err(UfcsError::ProtocolMismatch {
                field: "msg_type",
                expected: MsgType::Control.into(),
                actual: reply.msg_type.into(),
            });
        }
        if reply.msg_number != number {
            return Err(UfcsError::ProtocolMismatch {
                field: "msg_number",
                expected: number,
                actual: reply.msg_number,
            });
        }
        if reply.cmd != u8::from(ControlMsg::Ack) {
            return Err(UfcsError::ProtocolMismatch {
                field: "cmd",
                expected: ControlMsg::Ack.into(),
                actual: reply.cmd,
            });
        }
        Ok(())
    }

    fn next_header(&mut self) -> Result<Package> {
        if let Some(pkg) = self.pending.take() {
            return Ok(pkg);
        }
        if let Err(e) = self.transport.wait_ready(RX_WAIT) {
            debug!("wait for message failed: {}", e);
            return Err(UfcsError::Timeout);
        }
        let mut raw = [0u8; 4];
        self.transport.receive_header(&mut raw)?;
        let pkg = match decode_header(&raw) {
            Ok(pkg) => pkg,
            Err(e) => {
                self.transport.end_receive()?;
                return Err(e);
            }
        };
        debug!("rx {}", pkg);
        Ok(pkg)
    }

    /// Read and drop the body of `pkg`, then release the receive buffer.
    fn skip_body(&mut self, pkg: &Package) -> Result<()> {
        let mut body = vec![0u8; pkg.length as usize];
        if !body.is_empty() {
            self.transport.receive_body(&mut body)?;
        }
        self.transport.end_receive()?;
        Ok(())
    }

    /// Finish a header left open by an earlier mismatch nobody consumed.
    pub(crate) fn discard_pending(&mut self) -> Result<()> {
        if let Some(pkg) = self.pending.take() {
            debug!("discard unread {}", pkg);
            self.skip_body(&pkg)?;
        }
        Ok(())
    }

    /// Receive a control message and check it is `expected`.
    ///
    /// A data message in its place yields [`UfcsError::NotMatch`] and stays
    /// unread, so the caller can follow up with [`Session::receive_refuse`].
    pub fn receive_control(&mut self, expected: ControlMsg) -> Result<()> {
        self.discard_pending()?;
        let pkg = self.next_header()?;
        if pkg.msg_type != MsgType::Control {
            warn!("expected {} but received {}", expected, pkg.message_name());
            let actual = pkg.msg_type.into();
            self.pending = Some(pkg);
            return Err(UfcsError::NotMatch {
                expected: MsgType::Control.into(),
                actual,
            });
        }
        self.transport.end_receive()?;
        if pkg.cmd != u8::from(expected) {
            return Err(UfcsError::ProtocolMismatch {
                field: "cmd",
                expected: expected.into(),
                actual: pkg.cmd,
            });
        }
        Ok(())
    }

    /// Receive a data message of kind `expected` and return its body.
    pub fn receive_data(&mut self, expected: DataMsg, max_len: usize) -> Result<Bytes> {
        let pkg = self.next_header()?;
        if pkg.msg_type != MsgType::Data {
            warn!("expected {} but received {}", expected, pkg.message_name());
            self.skip_body(&pkg)?;
            return Err(UfcsError::NotMatch {
                expected: MsgType::Data.into(),
                actual: pkg.msg_type.into(),
            });
        }
        if pkg.cmd != u8::from(expected) || pkg.length as usize > max_len {
            self.skip_body(&pkg)?;
            if pkg.cmd != u8::from(expected) {
                return Err(UfcsError::ProtocolMismatch {
                    field: "cmd",
                    expected: expected.into(),
                    actual: pkg.cmd,
                });
            }
            return Err(UfcsError::PayloadTooLong {
                len: pkg.length as usize,
                max: max_len,
            });
        }

        let mut body = vec![0u8; pkg.length as usize];
        if !body.is_empty() {
            self.transport.receive_body(&mut body)?;
        }
        self.transport.end_receive()?;
        Ok(Bytes::from(body))
    }

    pub fn receive_payload<P: Payload>(&mut self) -> Result<P> {
        let body = self.receive_data(P::CMD, P::MAX_LEN)?;
        P::decode(&body)
    }

    /// Read the Refuse that replaced an expected reply and surface it as
    /// [`UfcsError::Refused`].
    pub fn receive_refuse(&mut self) -> UfcsError {
        match self.receive_payload::<Refuse>() {
            Ok(refuse) => {
                warn!("adapter refused: {}", refuse);
                UfcsError::Refused(refuse)
            }
            Err(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::NoDelay;
    use crate::transport::{DetectOutcome, TransportError};
    use std::collections::VecDeque;

    /// Replies with a fixed script of headers, one per wait.
    #[derive(Default)]
    struct Script {
        replies: VecDeque<Option<[u8; 4]>>,
        current: Option<[u8; 4]>,
        sent: Vec<[u8; 4]>,
    }

    impl Transport for Script {
        fn chip_name(&self) -> &str {
            "stm32g031"
        }
        fn detect_adapter(&mut self) -> std::result::Result<DetectOutcome, TransportError> {
            Ok(DetectOutcome::Succeeded)
        }
        fn send_header(&mut self, header: &[u8; 4]) -> std::result::Result<(), TransportError> {
            self.sent.push(*header);
            Ok(())
        }
        fn send_body(&mut self, _body: &[u8]) -> std::result::Result<(), TransportError> {
            Ok(())
        }
        fn end_send(&mut self, _flags: WaitFlags) -> std::result::Result<(), TransportError> {
            Ok(())
        }
        fn wait_ready(&mut self, flags: WaitFlags) -> std::result::Result<(), TransportError> {
            match self.replies.pop_front().flatten() {
                Some(header) => {
                    self.current = Some(header);
                    Ok(())
                }
                None => Err(TransportError::Timeout(flags)),
            }
        }
        fn receive_header(&mut self, header: &mut [u8; 4]) -> std::result::Result<(), TransportError> {
            *header = self.current.ok_or(TransportError::NotReady)?;
            Ok(())
        }
        fn receive_body(&mut self, _body: &mut [u8]) -> std::result::Result<(), TransportError> {
            Ok(())
        }
        fn end_receive(&mut self) -> std::result::Result<(), TransportError> {
            self.current = None;
            Ok(())
        }
        fn soft_reset_master(&mut self) -> std::result::Result<(), TransportError> {
            Ok(())
        }
    }

    fn ctrl(num: u8, cmd: ControlMsg) -> Option<[u8; 4]> {
        let mut pkg = Package::control(num, cmd);
        pkg.dev_address = crate::packet::DevAddress::Sink;
        Some(encode_header(&pkg))
    }

    fn session(replies: Vec<Option<[u8; 4]>>) -> Session<Script, NoDelay> {
        let script = Script {
            replies: replies.into(),
            ..Default::default()
        };
        Session::with_delay(script, ProtocolConfig::default(), NoDelay::default())
    }

    #[test]
    fn test_ack_advances_number() {
        let mut s = session(vec![ctrl(0, ControlMsg::Ack)]);
        s.send_control(ControlMsg::Ping, true).unwrap();
        assert_eq!(s.sequence().get_number(), 1);
    }

    #[test]
    fn test_no_ack_still_advances() {
        let mut s = session(vec![]);
        s.send_control(ControlMsg::Ack, false).unwrap();
        assert_eq!(s.sequence().get_number(), 1);
    }

    #[test]
    fn test_nack_resends_same_number() {
        let mut s = session(vec![ctrl(0, ControlMsg::Nack), None, ctrl(0, ControlMsg::Ack)]);
        s.send_control(ControlMsg::Ping, true).unwrap();
        let numbers: Vec<u8> = s.transport().sent.iter().map(|h| decode_header(h).unwrap().msg_number).collect();
        assert_eq!(numbers, vec![0, 0, 0]);
        assert_eq!(s.sequence().get_number(), 1);
    }

    #[test]
    fn test_wrong_number_is_fatal() {
        let mut s = session(vec![ctrl(3, ControlMsg::Ack)]);
        let err = s.send_control(ControlMsg::Ping, true).unwrap_err();
        assert!(matches!(err, UfcsError::ProtocolMismatch { field: "msg_number", .. }));
        assert_eq!(s.sequence().get_number(), 0);
        assert_eq!(s.transport().sent.len(), 1);
    }

    #[test]
    fn test_receive_control_wrong_cmd() {
        let mut s = session(vec![ctrl(0, ControlMsg::Ping)]);
        let err = s.receive_control(ControlMsg::Accept).unwrap_err();
        assert!(matches!(err, UfcsError::ProtocolMismatch { field: "cmd", .. }));
    }

    #[test]
    fn test_set_default_param_resets() {
        let mut s = session(vec![ctrl(0, ControlMsg::Ack)]);
        s.send_control(ControlMsg::Ping, true).unwrap();
        s.info.output_mode = 1;
        s.set_default_param();
        assert_eq!(s.sequence().get_number(), 0);
        assert_eq!(s.info(), &SessionInfo::default());
    }
}
