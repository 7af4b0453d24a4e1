//! Message header framing.
//!
//! Every UFCS message starts with a 4-byte header: a 16-bit big-endian word
//! carrying message type, protocol version, message number and device
//! address, followed by the command byte and the payload length byte.
//!
//! ```text
//! bit 0..=2   message type
//! bit 3..=8   protocol version
//! bit 9..=12  message number
//! bit 13..=15 device address
//! ```

use crate::constants::{
    HEADER_CMD_OFFSET, HEADER_H_OFFSET, HEADER_L_OFFSET, HEADER_LENGTH_OFFSET, HEADER_SIZE, PROT_VERSION,
};
use crate::error::{Result, UfcsError};
use modular_bitfield::prelude::*;
use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};
use std::fmt;
use strum_macros::Display;

#[bitfield(bytes = 2)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeaderWord {
    pub msg_type: B3,
    pub prot_version: B6,
    pub msg_number: B4,
    pub dev_address: B3,
}

impl HeaderWord {
    /// Build from the two header bytes as they appear on the wire (high byte first)
    pub fn from_wire(high: u8, low: u8) -> Self {
        HeaderWord::from_bytes([low, high])
    }

    /// The two header bytes in wire order (high byte first)
    pub fn to_wire(self) -> [u8; 2] {
        let [low, high] = self.into_bytes();
        [high, low]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, TryFromPrimitive, IntoPrimitive)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum MsgType {
    Control = 0,
    Data = 1,
    VendorDefined = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum DevAddress {
    Source = 0x01,
    Sink = 0x02,
    CableElectronicLabel = 0x03,

    #[num_enum(catch_all)]
    Unknown(u8),
}

/// Control messages, 0x00..=0x0F
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, TryFromPrimitive, IntoPrimitive)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum ControlMsg {
    Ping = 0x00,
    Ack = 0x01,
    Nack = 0x02,
    Accept = 0x03,
    SoftReset = 0x04,
    PowerReady = 0x05,
    GetOutputCapabilities = 0x06,
    GetSourceInfo = 0x07,
    GetSinkInfo = 0x08,
    GetCableInfo = 0x09,
    GetDeviceInfo = 0x0A,
    GetErrorInfo = 0x0B,
    DetectCableInfo = 0x0C,
    StartCableDetect = 0x0D,
    EndCableDetect = 0x0E,
    ExitUfcsMode = 0x0F,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, TryFromPrimitive, IntoPrimitive)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum DataMsg {
    OutputCapabilities = 0x01,
    Request = 0x02,
    SourceInfo = 0x03,
    SinkInfo = 0x04,
    CableInfo = 0x05,
    DeviceInfo = 0x06,
    ErrorInfo = 0x07,
    ConfigWatchdog = 0x08,
    Refuse = 0x09,
    VerifyRequest = 0x0A,
    VerifyResponse = 0x0B,
    TestRequest = 0xFF,
}

/// Unpacked form of a message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Package {
    pub msg_type: MsgType,
    pub prot_version: u8,
    pub msg_number: u8,
    pub dev_address: DevAddress,
    pub cmd: u8,
    pub length: u8,
}

impl Package {
    /// Header for a control message sent by the host
    pub fn control(msg_number: u8, cmd: ControlMsg) -> Self {
        Self {
            msg_type: MsgType::Control,
            prot_version: PROT_VERSION,
            msg_number,
            dev_address: DevAddress::Source,
            cmd: cmd.into(),
            length: 0,
        }
    }

    /// Header for a data message sent by the host
    pub fn data(msg_number: u8, cmd: DataMsg, length: u8) -> Self {
        Self {
            msg_type: MsgType::Data,
            prot_version: PROT_VERSION,
            msg_number,
            dev_address: DevAddress::Source,
            cmd: cmd.into(),
            length,
        }
    }

    /// Interpret `cmd` as a control message
    pub fn control_msg(&self) -> Result<ControlMsg> {
        ControlMsg::try_from(self.cmd).map_err(|_| UfcsError::UnknownCommand {
            msg_type: self.msg_type.into(),
            cmd: self.cmd,
        })
    }

    /// Interpret `cmd` as a data message
    pub fn data_msg(&self) -> Result<DataMsg> {
        DataMsg::try_from(self.cmd).map_err(|_| UfcsError::UnknownCommand {
            msg_type: self.msg_type.into(),
            cmd: self.cmd,
        })
    }

    /// Human readable command name, used in logs
    pub fn message_name(&self) -> String {
        match self.msg_type {
            MsgType::Control => self
                .control_msg()
                .map(|m| m.to_string())
                .unwrap_or_else(|_| "illegal ctl_msg".to_string()),
            MsgType::Data => self
                .data_msg()
                .map(|m| m.to_string())
                .unwrap_or_else(|_| "illegal data_msg".to_string()),
            MsgType::VendorDefined => "vendor_defined".to_string(),
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr: u8 = self.dev_address.into();
        write!(
            f,
            "{} type={} ver={} num={} addr={} cmd={} len={}",
            self.message_name(),
            self.msg_type,
            self.prot_version,
            self.msg_number,
            addr,
            self.cmd,
            self.length
        )
    }
}

/// Pack a header into its 4 wire bytes.
///
/// Fields wider than their slot are truncated to the slot width, so a
/// message number is always sent modulo 16.
pub fn encode_header(pkg: &Package) -> [u8; HEADER_SIZE] {
    let msg_type: u8 = pkg.msg_type.into();
    let dev_address: u8 = pkg.dev_address.into();
    let word = HeaderWord::new()
        .with_msg_type(msg_type & 0x07)
        .with_prot_version(pkg.prot_version & 0x3F)
        .with_msg_number(pkg.msg_number & 0x0F)
        .with_dev_address(dev_address & 0x07);
    let [high, low] = word.to_wire();

    let mut bytes = [0u8; HEADER_SIZE];
    bytes[HEADER_H_OFFSET] = high;
    bytes[HEADER_L_OFFSET] = low;
    bytes[HEADER_CMD_OFFSET] = pkg.cmd;
    bytes[HEADER_LENGTH_OFFSET] = pkg.length;
    bytes
}

/// Unpack a header from the first 4 bytes of `bytes`.
pub fn decode_header(bytes: &[u8]) -> Result<Package> {
    if bytes.len() < HEADER_SIZE {
        return Err(UfcsError::InvalidPacket(format!(
            "header too short: {} bytes, need {HEADER_SIZE}",
            bytes.len()
        )));
    }
    let word = HeaderWord::from_wire(bytes[HEADER_H_OFFSET], bytes[HEADER_L_OFFSET]);
    let msg_type = MsgType::try_from(word.msg_type()).map_err(|_| UfcsError::UnknownMessageType(word.msg_type()))?;

    Ok(Package {
        msg_type,
        prot_version: word.prot_version(),
        msg_number: word.msg_number(),
        dev_address: DevAddress::from_primitive(word.dev_address()),
        cmd: bytes[HEADER_CMD_OFFSET],
        length: bytes[HEADER_LENGTH_OFFSET],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_header_bytes() {
        // type=0, ver=1, num=0, addr=1 -> 0b001_0000_000001_000 = 0x2008
        let bytes = encode_header(&Package::control(0, ControlMsg::Ping));
        assert_eq!(bytes, [0x20, 0x08, 0x00, 0x00]);
    }

    #[test]
    fn test_request_header_bytes() {
        // type=1, ver=1, num=5, addr=1 -> 0x2000 | 0x0A00 | 0x0008 | 0x0001 = 0x2A09
        let bytes = encode_header(&Package::data(5, DataMsg::Request, 8));
        assert_eq!(bytes, [0x2A, 0x09, 0x02, 0x08]);
    }

    #[test]
    fn test_decode_header_fields() {
        let pkg = decode_header(&[0x2A, 0x09, 0x02, 0x08]).unwrap();
        assert_eq!(pkg.msg_type, MsgType::Data);
        assert_eq!(pkg.prot_version, PROT_VERSION);
        assert_eq!(pkg.msg_number, 5);
        assert_eq!(pkg.dev_address, DevAddress::Source);
        assert_eq!(pkg.data_msg().unwrap(), DataMsg::Request);
        assert_eq!(pkg.length, 8);
    }

    #[test]
    fn test_msg_number_wraps_into_slot() {
        let bytes = encode_header(&Package::control(17, ControlMsg::Ack));
        assert_eq!(decode_header(&bytes).unwrap().msg_number, 1);
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        // msg_type bits = 0b111
        let err = decode_header(&[0x20, 0x0F, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, UfcsError::UnknownMessageType(7)));
    }

    #[test]
    fn test_unknown_control_cmd() {
        let pkg = decode_header(&[0x20, 0x08, 0x10, 0x00]).unwrap();
        assert!(matches!(pkg.control_msg(), Err(UfcsError::UnknownCommand { cmd: 0x10, .. })));
        assert_eq!(pkg.message_name(), "illegal ctl_msg");
    }

    #[test]
    fn test_message_names() {
        assert_eq!(ControlMsg::GetOutputCapabilities.to_string(), "get_output_capabilities");
        assert_eq!(DataMsg::ConfigWatchdog.to_string(), "config_watchdog");
        assert_eq!(ControlMsg::ExitUfcsMode.to_string(), "exit_ufcs_mode");
    }
}
