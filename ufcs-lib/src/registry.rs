use crate::config::ProtocolConfig;
use crate::error::{Result, UfcsError};
use crate::retry::{Delay, ThreadDelay};
use crate::session::Session;
use crate::transport::Transport;
use tracing::info;

/// Binds at most one chip transport to the protocol for its lifetime.
pub struct DeviceRegistry<T: Transport, D: Delay + Clone = ThreadDelay> {
    config: ProtocolConfig,
    delay: D,
    session: Option<Session<T, D>>,
}

impl<T: Transport> DeviceRegistry<T, ThreadDelay> {
    pub fn new(config: ProtocolConfig) -> Self {
        Self::with_delay(config, ThreadDelay)
    }
}

impl<T: Transport, D: Delay + Clone> DeviceRegistry<T, D> {
    pub fn with_delay(config: ProtocolConfig, delay: D) -> Self {
        Self {
            config,
            delay,
            session: None,
        }
    }

    /// Bind `transport` if its chip is on the allow-list.
    pub fn register(&mut self, transport: T) -> Result<()> {
        if let Some(bound) = &self.session {
            return Err(UfcsError::AlreadyRegistered(bound.transport().chip_name().to_string()));
        }
        let chip = transport.chip_name().to_string();
        if !self.config.supports_chip(&chip) {
            return Err(UfcsError::UnsupportedChip(chip));
        }
        info!("ufcs ops registered for {}", chip);
        self.session = Some(Session::with_delay(transport, self.config.clone(), self.delay.clone()));
        Ok(())
    }

    /// Release the bound transport.
    pub fn unregister(&mut self) -> Option<T> {
        let session = self.session.take()?;
        info!("ufcs ops unregistered for {}", session.transport().chip_name());
        Some(session.into_transport())
    }

    pub fn is_registered(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Result<&Session<T, D>> {
        self.session.as_ref().ok_or(UfcsError::NotRegistered)
    }

    pub fn session_mut(&mut self) -> Result<&mut Session<T, D>> {
        self.session.as_mut().ok_or(UfcsError::NotRegistered)
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }
}
