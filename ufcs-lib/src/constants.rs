// Protocol constants for UFCS

/// Size of the message header on the wire (4 bytes)
pub const HEADER_SIZE: usize = 4;

/// Offset of the high byte of the packed 16-bit header field
pub const HEADER_H_OFFSET: usize = 0;

/// Offset of the low byte of the packed 16-bit header field
pub const HEADER_L_OFFSET: usize = 1;

/// Offset of the command byte
pub const HEADER_CMD_OFFSET: usize = 2;

/// Offset of the payload length byte
pub const HEADER_LENGTH_OFFSET: usize = 3;

/// Protocol version carried in every header
pub const PROT_VERSION: u8 = 0x1;

/// Message numbers roll over at this value
pub const MAX_COUNTER: u8 = 16;

/// Largest message body the host will accept
pub const MAX_RX_BUFFER_SIZE: usize = 128;

/// Size of one output capability record (8 bytes)
pub const CAPABILITY_RECORD_SIZE: usize = 8;

/// Maximum number of output capability records in one message
pub const MAX_CAPABILITIES: usize = 7;

/// Output mode that maps to capability index 0
pub const BASE_OUTPUT_MODE: u8 = 1;

/// Lowest output mode a request may carry
pub const MIN_OUTPUT_MODE: u8 = 1;

/// Highest output mode a request may carry
pub const MAX_OUTPUT_MODE: u8 = 15;

/// Current unit for capabilities, requests and source/sink info (mA)
pub const UNIT_CURRENT_MA: u32 = 10;

/// Voltage unit for capabilities, requests and source/sink info (mV)
pub const UNIT_VOLTAGE_MV: u32 = 10;

/// Bias added to temperatures before they go on the wire (°C)
pub const TEMP_BIAS_C: i16 = 50;

/// Cable info current unit (mA)
pub const CABLE_UNIT_CURRENT_MA: u32 = 1000;

/// Cable info voltage unit (mV)
pub const CABLE_UNIT_VOLTAGE_MV: u32 = 1000;

/// Cable info resistance unit (mΩ)
pub const CABLE_UNIT_RESISTANCE_MOHM: u32 = 1000;

/// Size of the random challenge in a verify request
pub const VERIFY_REQUEST_RANDOM_SIZE: usize = 16;

/// Size of the encrypted block in a verify response
pub const VERIFY_RESPONSE_ENCRYPT_SIZE: usize = 32;

/// Size of the random block in a verify response
pub const VERIFY_RESPONSE_RANDOM_SIZE: usize = 16;

/// Default number of send attempts for one acknowledged exchange
pub const DEFAULT_MAX_SEND_ATTEMPTS: u8 = 4;

/// Default number of PowerReady polls after an accepted request
pub const DEFAULT_POWER_READY_ATTEMPTS: u8 = 14;

/// Default pause before source info polls and set-point requests (ms)
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 20;

/// Chip names a transport may declare
pub const DEFAULT_SUPPORTED_CHIPS: &[&str] = &["stm32g031"];
