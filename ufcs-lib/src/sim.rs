//! An in-memory UFCS source.
//!
//! [`SimulatedAdapter`] answers host messages the way a compliant adapter
//! does: Ack every message, reply to queries, Accept and PowerReady a valid
//! request and Refuse one outside the advertised range. Faults can be
//! injected to exercise the retry paths.

use crate::constants::BASE_OUTPUT_MODE;
use crate::error::UfcsError;
use crate::message::{
    CableInfo, Capability, DeviceInfo, ErrorInfo, OutputCapabilities, Payload, Refuse, RefuseReason, RequestData,
    SinkInfo, SourceInfo, WatchdogConfig,
};
use crate::packet::{ControlMsg, DataMsg, MsgType, Package, decode_header, encode_header};
use crate::transport::{DetectOutcome, Transport, TransportError, WaitFlags};
use std::collections::VecDeque;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
struct Frame {
    header: [u8; 4],
    body: Vec<u8>,
}

/// Measured output of the simulated source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimOutput {
    pub volt_mv: u32,
    pub curr_ma: u32,
    pub port_temp_c: i16,
    pub dev_temp_c: i16,
}

impl Default for SimOutput {
    fn default() -> Self {
        Self {
            volt_mv: 5000,
            curr_ma: 0,
            port_temp_c: 30,
            dev_temp_c: 35,
        }
    }
}

pub struct SimulatedAdapter {
    chip_name: String,
    presence: DetectOutcome,
    capabilities: Vec<Capability>,
    device_info: DeviceInfo,
    cable_info: CableInfo,
    error_info: ErrorInfo,
    output: SimOutput,
    watchdog_ms: u16,
    sink_info: Option<SinkInfo>,
    /// Next number for messages the adapter originates
    tx_number: u8,
    outgoing: Option<Frame>,
    incoming: VecDeque<Frame>,
    received: Vec<Package>,
    drop_next: usize,
    nack_next: usize,
    refuse_next: Option<RefuseReason>,
}

impl Default for SimulatedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedAdapter {
    pub fn new() -> Self {
        Self {
            chip_name: "stm32g031".to_string(),
            presence: DetectOutcome::Succeeded,
            capabilities: vec![
                Capability {
                    min_curr_ma: 500,
                    max_curr_ma: 3000,
                    min_volt_mv: 5000,
                    max_volt_mv: 11000,
                    volt_step_mv: 10,
                    curr_step_ma: 50,
                    output_mode: 1,
                },
                Capability {
                    min_curr_ma: 1000,
                    max_curr_ma: 5000,
                    min_volt_mv: 3400,
                    max_volt_mv: 20000,
                    volt_step_mv: 20,
                    curr_step_ma: 50,
                    output_mode: 2,
                },
            ],
            device_info: DeviceInfo {
                sw_ver: 0x0102,
                hw_ver: 0x0001,
                chip_vid: 0x12D1,
                manu_vid: 0x0483,
            },
            cable_info: CableInfo {
                max_curr_ma: 6000,
                max_volt_mv: 21000,
                resistance_mohm: 0,
                elabel_vid: 0,
                vid: 0x12D1,
            },
            error_info: ErrorInfo::new(),
            output: SimOutput::default(),
            watchdog_ms: 0,
            sink_info: None,
            tx_number: 0,
            outgoing: None,
            incoming: VecDeque::new(),
            received: Vec::new(),
            drop_next: 0,
            nack_next: 0,
            refuse_next: None,
        }
    }

    pub fn with_chip_name(mut self, name: &str) -> Self {
        self.chip_name = name.to_string();
        self
    }

    pub fn with_presence(mut self, presence: DetectOutcome) -> Self {
        self.presence = presence;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_device_info(mut self, device_info: DeviceInfo) -> Self {
        self.device_info = device_info;
        self
    }

    pub fn with_error_info(mut self, error_info: ErrorInfo) -> Self {
        self.error_info = error_info;
        self
    }

    /// Ignore the next `count` host messages, so the host times out.
    pub fn drop_next(&mut self, count: usize) {
        self.drop_next = count;
    }

    /// Answer the next `count` host messages with Nack.
    pub fn nack_next(&mut self, count: usize) {
        self.nack_next = count;
    }

    /// Refuse the next request or watchdog configuration with `reason`.
    pub fn refuse_next(&mut self, reason: RefuseReason) {
        self.refuse_next = Some(reason);
    }

    pub fn output(&self) -> SimOutput {
        self.output
    }

    pub fn watchdog_ms(&self) -> u16 {
        self.watchdog_ms
    }

    pub fn sink_info(&self) -> Option<SinkInfo> {
        self.sink_info
    }

    /// Headers of every message the host sent, in order
    pub fn received(&self) -> &[Package] {
        &self.received
    }

    fn push(&mut self, pkg: Package, body: Vec<u8>) {
        trace!("sim queue {}", pkg);
        self.incoming.push_back(Frame {
            header: encode_header(&pkg),
            body,
        });
    }

    fn next_number(&mut self) -> u8 {
        let number = self.tx_number;
        self.tx_number = (self.tx_number + 1) & 0x0F;
        number
    }

    fn push_control(&mut self, cmd: ControlMsg) {
        let number = self.next_number();
        self.push(Package::control(number, cmd), Vec::new());
    }

    fn push_payload<P: Payload>(&mut self, payload: &P) -> Result<(), TransportError> {
        let body = payload.encode().map_err(bus)?;
        let number = self.next_number();
        self.push(Package::data(number, P::CMD, body.len() as u8), body.to_vec());
        Ok(())
    }

    fn push_refuse(&mut self, reason: RefuseReason, host: &Package) -> Result<(), TransportError> {
        let refuse = Refuse {
            reason: reason.into(),
            cmd_number: host.cmd,
            msg_type: host.msg_type.into(),
            msg_number: host.msg_number,
        };
        self.push_payload(&refuse)
    }

    fn accepts(&self, req: &RequestData) -> bool {
        let index = req.output_mode.wrapping_sub(BASE_OUTPUT_MODE) as usize;
        self.capabilities.get(index).is_some_and(|cap| {
            (cap.min_volt_mv..=cap.max_volt_mv).contains(&req.output_volt_mv)
                && req.output_curr_ma <= cap.max_curr_ma
        })
    }

    fn handle(&mut self, frame: Frame) -> Result<(), TransportError> {
        let pkg = decode_header(&frame.header).map_err(bus)?;
        debug!("sim rx {}", pkg);
        self.received.push(pkg);

        if pkg.msg_type == MsgType::Control
            && matches!(pkg.control_msg(), Ok(ControlMsg::Ack) | Ok(ControlMsg::Nack))
        {
            return Ok(());
        }
        if self.drop_next > 0 {
            self.drop_next -= 1;
            return Ok(());
        }
        if self.nack_next > 0 {
            self.nack_next -= 1;
            self.push(Package::control(pkg.msg_number, ControlMsg::Nack), Vec::new());
            return Ok(());
        }
        self.push(Package::control(pkg.msg_number, ControlMsg::Ack), Vec::new());

        match pkg.msg_type {
            MsgType::Control => self.handle_control(pkg.control_msg().map_err(bus)?),
            MsgType::Data => self.handle_data(&pkg, &frame.body),
            MsgType::VendorDefined => Ok(()),
        }
    }

    fn handle_control(&mut self, cmd: ControlMsg) -> Result<(), TransportError> {
        match cmd {
            ControlMsg::GetOutputCapabilities => {
                let caps = OutputCapabilities(self.capabilities.clone());
                self.push_payload(&caps)
            }
            ControlMsg::GetSourceInfo => {
                let source = SourceInfo {
                    output_curr_ma: self.output.curr_ma,
                    output_volt_mv: self.output.volt_mv,
                    port_temp_c: self.output.port_temp_c,
                    dev_temp_c: self.output.dev_temp_c,
                };
                self.push_payload(&source)
            }
            ControlMsg::GetDeviceInfo => {
                let dev = self.device_info;
                self.push_payload(&dev)
            }
            ControlMsg::GetCableInfo => {
                let cable = self.cable_info;
                self.push_payload(&cable)
            }
            ControlMsg::GetErrorInfo => {
                let errors = self.error_info;
                self.push_payload(&errors)
            }
            ControlMsg::SoftReset | ControlMsg::ExitUfcsMode => {
                self.tx_number = 0;
                self.output = SimOutput::default();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn handle_data(&mut self, pkg: &Package, body: &[u8]) -> Result<(), TransportError> {
        match pkg.data_msg().map_err(bus)? {
            DataMsg::Request => {
                let req = RequestData::decode(body).map_err(bus)?;
                let refusal = self.refuse_next.take().or_else(|| {
                    if self.accepts(&req) { None } else { Some(RefuseReason::OverRange) }
                });
                if let Some(reason) = refusal {
                    return self.push_refuse(reason, pkg);
                }
                self.output.volt_mv = req.output_volt_mv;
                self.output.curr_ma = req.output_curr_ma;
                self.push_control(ControlMsg::Accept);
                self.push_control(ControlMsg::PowerReady);
                Ok(())
            }
            DataMsg::ConfigWatchdog => {
                if let Some(reason) = self.refuse_next.take() {
                    return self.push_refuse(reason, pkg);
                }
                self.watchdog_ms = WatchdogConfig::decode(body).map_err(bus)?.time_ms;
                self.push_control(ControlMsg::Accept);
                Ok(())
            }
            DataMsg::SinkInfo => {
                self.sink_info = Some(SinkInfo::decode(body).map_err(bus)?);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn bus(e: UfcsError) -> TransportError {
    TransportError::Bus(e.to_string())
}

impl Transport for SimulatedAdapter {
    fn chip_name(&self) -> &str {
        &self.chip_name
    }

    fn detect_adapter(&mut self) -> Result<DetectOutcome, TransportError> {
        Ok(self.presence)
    }

    fn send_header(&mut self, header: &[u8; 4]) -> Result<(), TransportError> {
        self.outgoing = Some(Frame {
            header: *header,
            body: Vec::new(),
        });
        Ok(())
    }

    fn send_body(&mut self, body: &[u8]) -> Result<(), TransportError> {
        let frame = self.outgoing.as_mut().ok_or(TransportError::NotReady)?;
        frame.body.extend_from_slice(body);
        Ok(())
    }

    fn end_send(&mut self, _flags: WaitFlags) -> Result<(), TransportError> {
        let frame = self.outgoing.take().ok_or(TransportError::NotReady)?;
        self.handle(frame)
    }

    fn wait_ready(&mut self, flags: WaitFlags) -> Result<(), TransportError> {
        if self.incoming.is_empty() {
            return Err(TransportError::Timeout(flags));
        }
        Ok(())
    }

    fn receive_header(&mut self, header: &mut [u8; 4]) -> Result<(), TransportError> {
        let frame = self.incoming.front().ok_or(TransportError::NotReady)?;
        *header = frame.header;
        Ok(())
    }

    fn receive_body(&mut self, body: &mut [u8]) -> Result<(), TransportError> {
        let frame = self.incoming.front().ok_or(TransportError::NotReady)?;
        if frame.body.len() != body.len() {
            return Err(TransportError::Bus(format!(
                "body is {} bytes, read of {} requested",
                frame.body.len(),
                body.len()
            )));
        }
        body.copy_from_slice(&frame.body);
        Ok(())
    }

    fn end_receive(&mut self) -> Result<(), TransportError> {
        self.incoming.pop_front().map(|_| ()).ok_or(TransportError::NotReady)
    }

    fn soft_reset_master(&mut self) -> Result<(), TransportError> {
        self.outgoing = None;
        self.incoming.clear();
        Ok(())
    }
}
