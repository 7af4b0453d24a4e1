pub mod config;
pub mod constants;
pub mod error;
pub mod message;
pub mod negotiation;
pub mod packet;
pub mod registry;
pub mod retry;
pub mod sequence;
pub mod session;
pub mod sim;
pub mod transport;

pub use config::ProtocolConfig;
pub use error::{Result, UfcsError};
pub use negotiation::{AdapterInfo, AdapterType};
pub use registry::DeviceRegistry;
pub use session::{Mode, Session, SessionInfo};
pub use sim::SimulatedAdapter;
pub use transport::{DetectOutcome, Transport, TransportError, WaitFlags};
