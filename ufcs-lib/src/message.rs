//! Data message payloads.
//!
//! Each payload is a fixed-width big-endian integer whose bits are laid out
//! LSB first. The raw layouts live in `*Bits` structs; the public types carry
//! values in mA, mV, mΩ and °C with units applied.

use crate::constants::{
    CABLE_UNIT_CURRENT_MA, CABLE_UNIT_RESISTANCE_MOHM, CABLE_UNIT_VOLTAGE_MV, CAPABILITY_RECORD_SIZE,
    MAX_CAPABILITIES, TEMP_BIAS_C, UNIT_CURRENT_MA, UNIT_VOLTAGE_MV, VERIFY_REQUEST_RANDOM_SIZE,
    VERIFY_RESPONSE_ENCRYPT_SIZE, VERIFY_RESPONSE_RANDOM_SIZE,
};
use crate::error::{Result, UfcsError};
use crate::packet::DataMsg;
use bytes::Bytes;
use modular_bitfield::prelude::*;
use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// A data message body with a fixed command and codec.
pub trait Payload: Sized {
    const CMD: DataMsg;
    /// Largest body the message may carry
    const MAX_LEN: usize;

    fn encode(&self) -> Result<Bytes>;
    fn decode(bytes: &[u8]) -> Result<Self>;
}

fn expect_len(bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() != expected {
        return Err(UfcsError::LengthMismatch {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

// Big-endian wire order is the reverse of the bitfield's little-endian storage.
fn wire_to_bits<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    expect_len(bytes, N)?;
    let mut raw: [u8; N] = bytes.try_into()?;
    raw.reverse();
    Ok(raw)
}

fn bits_to_wire<const N: usize>(mut raw: [u8; N]) -> Bytes {
    raw.reverse();
    Bytes::copy_from_slice(&raw)
}

// Values must be whole multiples of the wire unit.
fn scale_down(field: &'static str, value: u32, unit: u32, max: u32) -> Result<u32> {
    let raw = value / unit;
    if raw > max || value % unit != 0 {
        return Err(UfcsError::ValueOutOfRange {
            field,
            value: value as i64,
        });
    }
    Ok(raw)
}

fn temp_to_raw(field: &'static str, temp_c: i16) -> Result<u8> {
    temp_c
        .checked_add(TEMP_BIAS_C)
        .and_then(|raw| u8::try_from(raw).ok())
        .ok_or(UfcsError::ValueOutOfRange {
            field,
            value: temp_c as i64,
        })
}

fn temp_from_raw(raw: u8) -> i16 {
    raw as i16 - TEMP_BIAS_C
}

// --- Output capabilities (0x01) ---

#[bitfield(bytes = 8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapabilityBits {
    pub min_curr: B8,
    pub max_curr: B16,
    pub min_volt: B16,
    pub max_volt: B16,
    pub volt_step: B1,
    pub curr_step: B3,
    pub output_mode: B4,
}

/// One output mode advertised by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capability {
    pub min_curr_ma: u32,
    pub max_curr_ma: u32,
    pub min_volt_mv: u32,
    pub max_volt_mv: u32,
    pub volt_step_mv: u32,
    pub curr_step_ma: u32,
    pub output_mode: u8,
}

impl Capability {
    pub fn decode_record(bytes: &[u8]) -> Result<Self> {
        let bits = CapabilityBits::from_bytes(wire_to_bits::<CAPABILITY_RECORD_SIZE>(bytes)?);
        Ok(Self {
            min_curr_ma: bits.min_curr() as u32 * UNIT_CURRENT_MA,
            max_curr_ma: bits.max_curr() as u32 * UNIT_CURRENT_MA,
            min_volt_mv: bits.min_volt() as u32 * UNIT_VOLTAGE_MV,
            max_volt_mv: bits.max_volt() as u32 * UNIT_VOLTAGE_MV,
            volt_step_mv: (bits.volt_step() as u32 + 1) * UNIT_VOLTAGE_MV,
            curr_step_ma: (bits.curr_step() as u32 + 1) * UNIT_CURRENT_MA,
            output_mode: bits.output_mode(),
        })
    }

    pub fn encode_record(&self) -> Result<[u8; CAPABILITY_RECORD_SIZE]> {
        let volt_step = scale_down("volt_step", self.volt_step_mv, UNIT_VOLTAGE_MV, 2)?;
        let curr_step = scale_down("curr_step", self.curr_step_ma, UNIT_CURRENT_MA, 8)?;
        if volt_step == 0 || curr_step == 0 {
            return Err(UfcsError::ValueOutOfRange {
                field: "step",
                value: 0,
            });
        }
        if self.output_mode > 0x0F {
            return Err(UfcsError::ValueOutOfRange {
                field: "output_mode",
                value: self.output_mode as i64,
            });
        }
        let bits = CapabilityBits::new()
            .with_min_curr(scale_down("min_curr", self.min_curr_ma, UNIT_CURRENT_MA, 0xFF)? as u8)
            .with_max_curr(scale_down("max_curr", self.max_curr_ma, UNIT_CURRENT_MA, 0xFFFF)? as u16)
            .with_min_volt(scale_down("min_volt", self.min_volt_mv, UNIT_VOLTAGE_MV, 0xFFFF)? as u16)
            .with_max_volt(scale_down("max_volt", self.max_volt_mv, UNIT_VOLTAGE_MV, 0xFFFF)? as u16)
            .with_volt_step((volt_step - 1) as u8)
            .with_curr_step((curr_step - 1) as u8)
            .with_output_mode(self.output_mode);
        let mut raw = bits.into_bytes();
        raw.reverse();
        Ok(raw)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mode {}: {}-{} mA, {}-{} mV, step {} mV / {} mA",
            self.output_mode,
            self.min_curr_ma,
            self.max_curr_ma,
            self.min_volt_mv,
            self.max_volt_mv,
            self.volt_step_mv,
            self.curr_step_ma
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputCapabilities(pub Vec<Capability>);

impl Payload for OutputCapabilities {
    const CMD: DataMsg = DataMsg::OutputCapabilities;
    const MAX_LEN: usize = MAX_CAPABILITIES * CAPABILITY_RECORD_SIZE;

    fn encode(&self) -> Result<Bytes> {
        if self.0.is_empty() || self.0.len() > MAX_CAPABILITIES {
            return Err(UfcsError::ValueOutOfRange {
                field: "capability_count",
                value: self.0.len() as i64,
            });
        }
        let mut out = Vec::with_capacity(self.0.len() * CAPABILITY_RECORD_SIZE);
        for cap in &self.0 {
            out.extend_from_slice(&cap.encode_record()?);
        }
        Ok(Bytes::from(out))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() || bytes.len() % CAPABILITY_RECORD_SIZE != 0 || bytes.len() > Self::MAX_LEN {
            return Err(UfcsError::LengthMismatch {
                expected: (bytes.len() / CAPABILITY_RECORD_SIZE).clamp(1, MAX_CAPABILITIES) * CAPABILITY_RECORD_SIZE,
                actual: bytes.len(),
            });
        }
        bytes
            .chunks_exact(CAPABILITY_RECORD_SIZE)
            .map(Capability::decode_record)
            .collect::<Result<Vec<_>>>()
            .map(OutputCapabilities)
    }
}

// --- Request (0x02) ---

#[bitfield(bytes = 8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestBits {
    pub output_curr: B16,
    pub output_volt: B16,
    #[skip]
    reserved: B28,
    pub output_mode: B4,
}

/// Voltage/current set-point request for one output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestData {
    pub output_mode: u8,
    pub output_curr_ma: u32,
    pub output_volt_mv: u32,
}

impl Payload for RequestData {
    const CMD: DataMsg = DataMsg::Request;
    const MAX_LEN: usize = 8;

    fn encode(&self) -> Result<Bytes> {
        if self.output_mode > 0x0F {
            return Err(UfcsError::ValueOutOfRange {
                field: "output_mode",
                value: self.output_mode as i64,
            });
        }
        let bits = RequestBits::new()
            .with_output_curr(scale_down("output_curr", self.output_curr_ma, UNIT_CURRENT_MA, 0xFFFF)? as u16)
            .with_output_volt(scale_down("output_volt", self.output_volt_mv, UNIT_VOLTAGE_MV, 0xFFFF)? as u16)
            .with_output_mode(self.output_mode);
        Ok(bits_to_wire(bits.into_bytes()))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let bits = RequestBits::from_bytes(wire_to_bits::<8>(bytes)?);
        Ok(Self {
            output_mode: bits.output_mode(),
            output_curr_ma: bits.output_curr() as u32 * UNIT_CURRENT_MA,
            output_volt_mv: bits.output_volt() as u32 * UNIT_VOLTAGE_MV,
        })
    }
}

// --- Source information (0x03) ---

#[bitfield(bytes = 8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInfoBits {
    pub output_curr: B16,
    pub output_volt: B16,
    pub port_temp: B8,
    pub dev_temp: B8,
    #[skip]
    reserved: B16,
}

/// Live output readings reported by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceInfo {
    pub output_curr_ma: u32,
    pub output_volt_mv: u32,
    pub port_temp_c: i16,
    pub dev_temp_c: i16,
}

impl Payload for SourceInfo {
    const CMD: DataMsg = DataMsg::SourceInfo;
    const MAX_LEN: usize = 8;

    fn encode(&self) -> Result<Bytes> {
        let bits = SourceInfoBits::new()
            .with_output_curr(scale_down("output_curr", self.output_curr_ma, UNIT_CURRENT_MA, 0xFFFF)? as u16)
            .with_output_volt(scale_down("output_volt", self.output_volt_mv, UNIT_VOLTAGE_MV, 0xFFFF)? as u16)
            .with_port_temp(temp_to_raw("port_temp", self.port_temp_c)?)
            .with_dev_temp(temp_to_raw("dev_temp", self.dev_temp_c)?);
        Ok(bits_to_wire(bits.into_bytes()))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let bits = SourceInfoBits::from_bytes(wire_to_bits::<8>(bytes)?);
        Ok(Self {
            output_curr_ma: bits.output_curr() as u32 * UNIT_CURRENT_MA,
            output_volt_mv: bits.output_volt() as u32 * UNIT_VOLTAGE_MV,
            port_temp_c: temp_from_raw(bits.port_temp()),
            dev_temp_c: temp_from_raw(bits.dev_temp()),
        })
    }
}

// --- Sink information (0x04) ---

#[bitfield(bytes = 8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinkInfoBits {
    pub bat_curr: B16,
    pub bat_volt: B16,
    pub usb_temp: B8,
    pub bat_temp: B8,
    #[skip]
    reserved: B16,
}

/// Battery-side readings the host reports to the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkInfo {
    pub bat_curr_ma: u32,
    pub bat_volt_mv: u32,
    pub usb_temp_c: i16,
    pub bat_temp_c: i16,
}

impl Payload for SinkInfo {
    const CMD: DataMsg = DataMsg::SinkInfo;
    const MAX_LEN: usize = 8;

    fn encode(&self) -> Result<Bytes> {
        let bits = SinkInfoBits::new()
            .with_bat_curr(scale_down("bat_curr", self.bat_curr_ma, UNIT_CURRENT_MA, 0xFFFF)? as u16)
            .with_bat_volt(scale_down("bat_volt", self.bat_volt_mv, UNIT_VOLTAGE_MV, 0xFFFF)? as u16)
            .with_usb_temp(temp_to_raw("usb_temp", self.usb_temp_c)?)
            .with_bat_temp(temp_to_raw("bat_temp", self.bat_temp_c)?);
        Ok(bits_to_wire(bits.into_bytes()))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let bits = SinkInfoBits::from_bytes(wire_to_bits::<8>(bytes)?);
        Ok(Self {
            bat_curr_ma: bits.bat_curr() as u32 * UNIT_CURRENT_MA,
            bat_volt_mv: bits.bat_volt() as u32 * UNIT_VOLTAGE_MV,
            usb_temp_c: temp_from_raw(bits.usb_temp()),
            bat_temp_c: temp_from_raw(bits.bat_temp()),
        })
    }
}

// --- Cable information (0x05) ---

#[bitfield(bytes = 8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CableInfoBits {
    pub max_curr: B8,
    pub max_volt: B8,
    pub resistance: B16,
    pub elabel_vid: B16,
    pub vid: B16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CableInfo {
    pub max_curr_ma: u32,
    pub max_volt_mv: u32,
    pub resistance_mohm: u32,
    pub elabel_vid: u16,
    pub vid: u16,
}

impl Payload for CableInfo {
    const CMD: DataMsg = DataMsg::CableInfo;
    const MAX_LEN: usize = 8;

    fn encode(&self) -> Result<Bytes> {
        let bits = CableInfoBits::new()
            .with_max_curr(scale_down("max_curr", self.max_curr_ma, CABLE_UNIT_CURRENT_MA, 0xFF)? as u8)
            .with_max_volt(scale_down("max_volt", self.max_volt_mv, CABLE_UNIT_VOLTAGE_MV, 0xFF)? as u8)
            .with_resistance(
                scale_down("resistance", self.resistance_mohm, CABLE_UNIT_RESISTANCE_MOHM, 0xFFFF)? as u16,
            )
            .with_elabel_vid(self.elabel_vid)
            .with_vid(self.vid);
        Ok(bits_to_wire(bits.into_bytes()))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let bits = CableInfoBits::from_bytes(wire_to_bits::<8>(bytes)?);
        Ok(Self {
            max_curr_ma: bits.max_curr() as u32 * CABLE_UNIT_CURRENT_MA,
            max_volt_mv: bits.max_volt() as u32 * CABLE_UNIT_VOLTAGE_MV,
            resistance_mohm: bits.resistance() as u32 * CABLE_UNIT_RESISTANCE_MOHM,
            elabel_vid: bits.elabel_vid(),
            vid: bits.vid(),
        })
    }
}

// --- Device information (0x06) ---

#[bitfield(bytes = 8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceInfoBits {
    pub sw_ver: B16,
    pub hw_ver: B16,
    pub chip_vid: B16,
    pub manu_vid: B16,
}

/// Adapter identity: firmware/hardware versions and vendor ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub sw_ver: u16,
    pub hw_ver: u16,
    pub chip_vid: u16,
    pub manu_vid: u16,
}

impl Payload for DeviceInfo {
    const CMD: DataMsg = DataMsg::DeviceInfo;
    const MAX_LEN: usize = 8;

    fn encode(&self) -> Result<Bytes> {
        let bits = DeviceInfoBits::new()
            .with_sw_ver(self.sw_ver)
            .with_hw_ver(self.hw_ver)
            .with_chip_vid(self.chip_vid)
            .with_manu_vid(self.manu_vid);
        Ok(bits_to_wire(bits.into_bytes()))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let bits = DeviceInfoBits::from_bytes(wire_to_bits::<8>(bytes)?);
        Ok(Self {
            sw_ver: bits.sw_ver(),
            hw_ver: bits.hw_ver(),
            chip_vid: bits.chip_vid(),
            manu_vid: bits.manu_vid(),
        })
    }
}

// --- Error information (0x07) ---

/// Fault flags reported by the adapter.
#[bitfield(bytes = 4)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorInfo {
    pub output_ovp: bool,
    pub output_uvp: bool,
    pub output_ocp: bool,
    pub output_scp: bool,
    pub usb_otp: bool,
    pub device_otp: bool,
    pub cc_ovp: bool,
    pub dminus_ovp: bool,
    pub dplus_ovp: bool,
    pub input_ovp: bool,
    pub input_uvp: bool,
    pub over_leakage: bool,
    pub input_drop: bool,
    pub crc_error: bool,
    pub wtg_overflow: bool,
    #[skip]
    reserved: B17,
}

impl ErrorInfo {
    /// True when no fault flag is set
    pub fn is_normal(&self) -> bool {
        u32::from_le_bytes(self.into_bytes()) == 0
    }
}

impl Payload for ErrorInfo {
    const CMD: DataMsg = DataMsg::ErrorInfo;
    const MAX_LEN: usize = 4;

    fn encode(&self) -> Result<Bytes> {
        Ok(bits_to_wire(self.into_bytes()))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(ErrorInfo::from_bytes(wire_to_bits::<4>(bytes)?))
    }
}

// --- Config watchdog (0x08) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    pub time_ms: u16,
}

impl WatchdogConfig {
    pub fn from_seconds(seconds: u32) -> Result<Self> {
        let time_ms = seconds
            .checked_mul(1000)
            .and_then(|ms| u16::try_from(ms).ok())
            .ok_or(UfcsError::ValueOutOfRange {
                field: "watchdog_time",
                value: seconds as i64,
            })?;
        Ok(Self { time_ms })
    }
}

impl Payload for WatchdogConfig {
    const CMD: DataMsg = DataMsg::ConfigWatchdog;
    const MAX_LEN: usize = 2;

    fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(&self.time_ms.to_be_bytes()))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        expect_len(bytes, Self::MAX_LEN)?;
        Ok(Self {
            time_ms: u16::from_be_bytes(bytes.try_into()?),
        })
    }
}

// --- Refuse (0x09) ---

#[bitfield(bytes = 4)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefuseBits {
    pub reason: B8,
    pub cmd_number: B8,
    pub msg_type: B3,
    #[skip]
    reserved_a: B5,
    pub msg_number: B4,
    #[skip]
    reserved_b: B4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum RefuseReason {
    NotIdentify = 0x01,
    NotSupport = 0x02,
    DeviceBusy = 0x03,
    OverRange = 0x04,
    Other = 0x05,

    #[num_enum(catch_all)]
    Unknown(u8),
}

/// The adapter's structured rejection of the message it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Refuse {
    pub reason: u8,
    pub cmd_number: u8,
    pub msg_type: u8,
    pub msg_number: u8,
}

impl Refuse {
    pub fn reason_kind(&self) -> RefuseReason {
        RefuseReason::from_primitive(self.reason)
    }
}

impl fmt::Display for Refuse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "reason={:?} cmd={} type={} num={}",
            self.reason_kind(),
            self.cmd_number,
            self.msg_type,
            self.msg_number
        )
    }
}

impl Payload for Refuse {
    const CMD: DataMsg = DataMsg::Refuse;
    const MAX_LEN: usize = 4;

    fn encode(&self) -> Result<Bytes> {
        if self.msg_type > 0x07 || self.msg_number > 0x0F {
            return Err(UfcsError::ValueOutOfRange {
                field: "refuse_header",
                value: ((self.msg_type as i64) << 8) | self.msg_number as i64,
            });
        }
        let bits = RefuseBits::new()
            .with_reason(self.reason)
            .with_cmd_number(self.cmd_number)
            .with_msg_type(self.msg_type)
            .with_msg_number(self.msg_number);
        Ok(bits_to_wire(bits.into_bytes()))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let bits = RefuseBits::from_bytes(wire_to_bits::<4>(bytes)?);
        Ok(Self {
            reason: bits.reason(),
            cmd_number: bits.cmd_number(),
            msg_type: bits.msg_type(),
            msg_number: bits.msg_number(),
        })
    }
}

// --- Verify request / response (0x0A, 0x0B) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct VerifyRequest {
    pub encrypt_index: u8,
    pub random: [u8; VERIFY_REQUEST_RANDOM_SIZE],
}

impl Payload for VerifyRequest {
    const CMD: DataMsg = DataMsg::VerifyRequest;
    const MAX_LEN: usize = 1 + VERIFY_REQUEST_RANDOM_SIZE;

    fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(self.as_bytes()))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        expect_len(bytes, Self::MAX_LEN)?;
        VerifyRequest::read_from_bytes(bytes)
            .map_err(|_| UfcsError::InvalidPacket("Failed to parse verify request".to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct VerifyResponse {
    pub encrypt: [u8; VERIFY_RESPONSE_ENCRYPT_SIZE],
    pub random: [u8; VERIFY_RESPONSE_RANDOM_SIZE],
}

impl Payload for VerifyResponse {
    const CMD: DataMsg = DataMsg::VerifyResponse;
    const MAX_LEN: usize = VERIFY_RESPONSE_ENCRYPT_SIZE + VERIFY_RESPONSE_RANDOM_SIZE;

    fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(self.as_bytes()))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        expect_len(bytes, Self::MAX_LEN)?;
        VerifyResponse::read_from_bytes(bytes)
            .map_err(|_| UfcsError::InvalidPacket("Failed to parse verify response".to_string()))
    }
}

// --- Test request (0xFF) ---

#[bitfield(bytes = 2)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestRequest {
    pub msg_number: B8,
    pub msg_type: B3,
    pub dev_address: B3,
    pub volt_test_mode: bool,
    #[skip]
    reserved: bool,
}

impl Payload for TestRequest {
    const CMD: DataMsg = DataMsg::TestRequest;
    const MAX_LEN: usize = 2;

    fn encode(&self) -> Result<Bytes> {
        Ok(bits_to_wire(self.into_bytes()))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(TestRequest::from_bytes(wire_to_bits::<2>(bytes)?))
    }
}
