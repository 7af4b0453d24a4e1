//! Adapter-level operations built on the session engine: detection,
//! capability discovery, set-point requests and watchdog setup.

use crate::constants::{BASE_OUTPUT_MODE, MAX_OUTPUT_MODE, MIN_OUTPUT_MODE};
use crate::error::{Result, UfcsError};
use crate::message::{
    CableInfo, Capability, DeviceInfo, ErrorInfo, OutputCapabilities, RequestData, SinkInfo, SourceInfo,
    WatchdogConfig,
};
use crate::packet::ControlMsg;
use crate::retry::Delay;
use crate::session::{Mode, Session};
use crate::transport::{DetectOutcome, Transport};
use strum_macros::Display;
use tracing::{debug, info, warn};

/// Adapter family as seen by the charging framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AdapterType {
    Unknown,
}

/// Identity and limits of the attached adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterInfo {
    pub chip_id: u16,
    pub hw_version: u16,
    pub sw_version: u16,
    pub min_volt_mv: u32,
    pub max_volt_mv: u32,
    pub min_curr_ma: u32,
    pub max_curr_ma: u32,
    pub volt_step_mv: u32,
    pub curr_step_ma: u32,
    pub output_mode: u8,
}

fn check_output_mode(mode: u8) -> Result<()> {
    if !(MIN_OUTPUT_MODE..=MAX_OUTPUT_MODE).contains(&mode) {
        warn!("output_mode={} invalid", mode);
        return Err(UfcsError::InvalidOutputMode(mode));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum SetPoint {
    Voltage(u32),
    Current(u32),
}

impl<T: Transport, D: Delay> Session<T, D> {
    /// Reset the session, run the chip handshake and ping the adapter.
    pub fn detect_adapter_support_mode(&mut self) -> Result<Mode> {
        self.set_default_param();
        self.info.detect_finished = true;
        self.info.support_mode = Mode::Undefined;

        match self.transport.detect_adapter() {
            Ok(DetectOutcome::Succeeded) => {}
            Ok(DetectOutcome::Failed) => {
                warn!("ufcs adapter detect fail");
                return Err(UfcsError::DetectFail("handshake failed".to_string()));
            }
            Ok(DetectOutcome::NotPresent) => {
                info!("no ufcs adapter present");
                return Err(UfcsError::NoAdapter);
            }
            Err(e) => return Err(UfcsError::DetectFail(e.to_string())),
        }

        if let Err(e) = self.send_control(ControlMsg::Ping, true) {
            warn!("ping failed: {}", e);
            return Err(UfcsError::DetectFail(e.to_string()));
        }

        info!("ufcs adapter ping succ");
        self.info.support_mode = Mode::Sc;
        Ok(Mode::Sc)
    }

    /// Detection result, running detection on first use.
    pub fn get_support_mode(&mut self) -> Result<Mode> {
        let mode = if self.info.detect_finished {
            self.info.support_mode
        } else {
            self.detect_adapter_support_mode()?
        };
        debug!("support_mode: {}", mode);
        Ok(mode)
    }

    /// Capability table, fetched once per session.
    ///
    /// The first read selects mode 1 and sets the cached set-points to that
    /// mode's maximum voltage and current.
    pub fn get_output_capabilities(&mut self) -> Result<&[Capability]> {
        if !self.info.capabilities_read {
            self.send_control(ControlMsg::GetOutputCapabilities, true)?;
            let OutputCapabilities(caps) = self.receive_payload()?;
            for cap in &caps {
                info!("{}", cap);
            }
            let first = caps.first().copied().ok_or(UfcsError::CapabilityIndex {
                mode: BASE_OUTPUT_MODE,
                available: 0,
            })?;
            self.info.capabilities = caps;
            self.info.capabilities_read = true;
            self.info.output_mode = BASE_OUTPUT_MODE;
            self.info.output_volt = first.max_volt_mv;
            self.info.output_curr = first.max_curr_ma;
        }
        Ok(&self.info.capabilities)
    }

    /// Live readings; always polled.
    pub fn get_source_info(&mut self) -> Result<SourceInfo> {
        let pause = self.config.request_delay();
        self.delay.delay(pause);
        self.send_control(ControlMsg::GetSourceInfo, true)?;
        let source: SourceInfo = self.receive_payload()?;
        debug!(
            "source_info: {} mA {} mV port {}C dev {}C",
            source.output_curr_ma, source.output_volt_mv, source.port_temp_c, source.dev_temp_c
        );
        Ok(source)
    }

    /// Device identity, fetched once per session.
    pub fn get_device_info(&mut self) -> Result<DeviceInfo> {
        if let Some(dev) = self.info.device_info {
            return Ok(dev);
        }
        self.send_control(ControlMsg::GetDeviceInfo, true)?;
        let dev: DeviceInfo = self.receive_payload()?;
        self.info.device_info = Some(dev);
        Ok(dev)
    }

    pub fn set_output_voltage(&mut self, volt_mv: u32) -> Result<()> {
        self.request(SetPoint::Voltage(volt_mv))
    }

    pub fn set_output_current(&mut self, curr_ma: u32) -> Result<()> {
        self.request(SetPoint::Current(curr_ma))
    }

    fn request(&mut self, point: SetPoint) -> Result<()> {
        let mode = self.info.output_mode;
        check_output_mode(mode)?;

        let req = match point {
            SetPoint::Voltage(mv) => RequestData {
                output_mode: mode,
                output_curr_ma: self.info.output_curr,
                output_volt_mv: mv,
            },
            SetPoint::Current(ma) => RequestData {
                output_mode: mode,
                output_curr_ma: ma,
                output_volt_mv: self.info.output_volt,
            },
        };

        let pause = self.config.request_delay();
        self.delay.delay(pause);
        self.send_payload(&req, true)?;

        match point {
            SetPoint::Voltage(mv) => self.info.output_volt = mv,
            SetPoint::Current(ma) => self.info.output_curr = ma,
        }

        self.expect_accept()?;
        self.wait_power_ready()?;
        match point {
            SetPoint::Voltage(mv) => info!("set_output_voltage: {}", mv),
            SetPoint::Current(ma) => info!("set_output_current: {}", ma),
        }
        Ok(())
    }

    /// Accept, or the adapter's Refuse in its place.
    fn expect_accept(&mut self) -> Result<()> {
        match self.receive_control(ControlMsg::Accept) {
            Ok(()) => Ok(()),
            Err(UfcsError::NotMatch { .. }) => Err(self.receive_refuse()),
            Err(e) => Err(e),
        }
    }

    fn wait_power_ready(&mut self) -> Result<()> {
        let attempts = self.config.power_ready_attempts;
        let mut last = UfcsError::Timeout;
        for attempt in 1..=attempts {
            match self.receive_control(ControlMsg::PowerReady) {
                Ok(()) => return Ok(()),
                Err(e @ (UfcsError::Timeout | UfcsError::NotMatch { .. })) => {
                    debug!("power_ready attempt {} failed: {}", attempt, e);
                    last = e;
                }
                Err(e) => return Err(e),
            }
        }
        self.discard_pending()?;
        Err(UfcsError::ExchangeFailed {
            message: ControlMsg::PowerReady.to_string(),
            attempts,
            last: Box::new(last),
        })
    }

    /// Arm the adapter watchdog; `time_ms` of 0 disables it.
    pub fn config_watchdog(&mut self, time_ms: u16) -> Result<()> {
        self.send_payload(&WatchdogConfig { time_ms }, true)?;
        self.expect_accept()
    }

    pub fn set_init_data(&mut self, watchdog_seconds: u32) -> Result<()> {
        let wtg = WatchdogConfig::from_seconds(watchdog_seconds)?;
        self.config_watchdog(wtg.time_ms)?;
        info!("set_init_data");
        Ok(())
    }

    /// Select the capability mode used by later requests.
    pub fn set_output_mode(&mut self, mode: u8) -> Result<()> {
        check_output_mode(mode)?;
        self.info.output_mode = mode;
        Ok(())
    }

    fn selected_capability(&mut self) -> Result<Capability> {
        self.get_output_capabilities()?;
        let mode = self.info.output_mode;
        check_output_mode(mode)?;
        let index = (mode - BASE_OUTPUT_MODE) as usize;
        self.info
            .capabilities
            .get(index)
            .copied()
            .ok_or(UfcsError::CapabilityIndex {
                mode,
                available: self.info.capabilities.len(),
            })
    }

    pub fn get_min_voltage(&mut self) -> Result<u32> {
        Ok(self.selected_capability()?.min_volt_mv)
    }

    pub fn get_max_voltage(&mut self) -> Result<u32> {
        Ok(self.selected_capability()?.max_volt_mv)
    }

    pub fn get_min_current(&mut self) -> Result<u32> {
        Ok(self.selected_capability()?.min_curr_ma)
    }

    pub fn get_max_current(&mut self) -> Result<u32> {
        Ok(self.selected_capability()?.max_curr_ma)
    }

    /// Measured output voltage (mV)
    pub fn get_output_voltage(&mut self) -> Result<u32> {
        Ok(self.get_source_info()?.output_volt_mv)
    }

    /// Measured output current (mA)
    pub fn get_output_current(&mut self) -> Result<u32> {
        Ok(self.get_source_info()?.output_curr_ma)
    }

    /// Last requested current (mA), no exchange
    pub fn get_output_current_set(&self) -> u32 {
        self.info.output_curr
    }

    pub fn get_inside_temp(&mut self) -> Result<i16> {
        Ok(self.get_source_info()?.dev_temp_c)
    }

    pub fn get_port_temp(&mut self) -> Result<i16> {
        Ok(self.get_source_info()?.port_temp_c)
    }

    pub fn get_chip_vendor_id(&mut self) -> Result<u16> {
        Ok(self.get_device_info()?.chip_vid)
    }

    /// Manufacturer vendor id
    pub fn get_chip_id(&mut self) -> Result<u16> {
        Ok(self.get_device_info()?.manu_vid)
    }

    pub fn get_hw_version_id(&mut self) -> Result<u16> {
        Ok(self.get_device_info()?.hw_ver)
    }

    pub fn get_sw_version_id(&mut self) -> Result<u16> {
        Ok(self.get_device_info()?.sw_ver)
    }

    pub fn get_adapter_type(&self) -> AdapterType {
        AdapterType::Unknown
    }

    pub fn get_adapter_info(&mut self) -> Result<AdapterInfo> {
        let dev = self.get_device_info()?;
        let selected = self.selected_capability()?;
        let first = self.info.capabilities.first().copied().unwrap_or(selected);
        Ok(AdapterInfo {
            chip_id: dev.manu_vid,
            hw_version: dev.hw_ver,
            sw_version: dev.sw_ver,
            min_volt_mv: selected.min_volt_mv,
            max_volt_mv: selected.max_volt_mv,
            min_curr_ma: selected.min_curr_ma,
            max_curr_ma: selected.max_curr_ma,
            volt_step_mv: first.volt_step_mv,
            curr_step_ma: first.curr_step_ma,
            output_mode: first.output_mode,
        })
    }

    pub fn get_cable_info(&mut self) -> Result<CableInfo> {
        self.send_control(ControlMsg::GetCableInfo, true)?;
        self.receive_payload()
    }

    pub fn get_error_info(&mut self) -> Result<ErrorInfo> {
        self.send_control(ControlMsg::GetErrorInfo, true)?;
        let errors: ErrorInfo = self.receive_payload()?;
        if !errors.is_normal() {
            warn!("adapter reports faults: {:?}", errors);
        }
        Ok(errors)
    }

    pub fn send_sink_info(&mut self, sink: &SinkInfo) -> Result<()> {
        self.send_payload(sink, true)
    }

    /// Ask the adapter to restart its protocol layer; numbering restarts at 0.
    pub fn soft_reset_adapter(&mut self) -> Result<()> {
        self.send_control(ControlMsg::SoftReset, true)?;
        self.sequence.reset();
        Ok(())
    }

    /// Leave UFCS mode; the session must be detected again afterwards.
    pub fn exit_ufcs_mode(&mut self) -> Result<()> {
        self.send_control(ControlMsg::ExitUfcsMode, true)?;
        self.set_default_param();
        Ok(())
    }

    pub fn soft_reset_master(&mut self) -> Result<()> {
        self.transport.soft_reset_master()?;
        Ok(())
    }

    pub fn soft_reset_slave(&mut self) -> Result<()> {
        info!("soft_reset_slave");
        Ok(())
    }
}
