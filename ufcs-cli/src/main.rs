use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::error::Error;
use std::path::PathBuf;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use ufcs_lib::{DeviceRegistry, ProtocolConfig, Session, SimulatedAdapter};

/// Drive a UFCS fast-charge negotiation against the simulated adapter.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON file with protocol timing and the chip allow-list
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Chip name the simulated transport reports
    #[arg(long, default_value = "stm32g031")]
    chip: String,
    #[command(subcommand)]
    command: Command,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect the adapter and report its support mode
    Detect,
    /// List the advertised output capabilities
    Caps,
    /// Request an output voltage in mV
    SetVoltage { millivolts: u32 },
    /// Request an output current in mA
    SetCurrent { milliamps: u32 },
    /// Poll live output readings
    SourceInfo,
    /// Show adapter identity and limits
    DeviceInfo,
    /// Arm the adapter watchdog
    Watchdog { seconds: u32 },
    /// Run every step in order
    Demo,
}

type Adapter = Session<SimulatedAdapter>;

fn setup_logging(verbosity: &Verbosity<InfoLevel>) {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry().with(filter).with(console_layer).init();
}

fn load_config(path: Option<&PathBuf>) -> Result<ProtocolConfig, Box<dyn Error>> {
    let config = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            info!("Loaded config from {:?}", path);
            ProtocolConfig::from_json(&json)?
        }
        None => ProtocolConfig::default(),
    };
    debug!("config: {}", serde_json::to_string(&config)?);
    Ok(config)
}

fn detect(session: &mut Adapter) -> Result<(), Box<dyn Error>> {
    let mode = session.detect_adapter_support_mode()?;
    println!("Adapter detected, support mode: {}", mode);
    Ok(())
}

fn caps(session: &mut Adapter) -> Result<(), Box<dyn Error>> {
    let caps = session.get_output_capabilities()?;
    println!("Output capabilities:");
    for cap in caps {
        println!("  {}", cap);
    }
    Ok(())
}

fn source_info(session: &mut Adapter) -> Result<(), Box<dyn Error>> {
    let source = session.get_source_info()?;
    println!("Source info:");
    println!("  Voltage: {} mV", source.output_volt_mv);
    println!("  Current: {} mA", source.output_curr_ma);
    println!("  Port temperature: {} °C", source.port_temp_c);
    println!("  Device temperature: {} °C", source.dev_temp_c);
    Ok(())
}

fn device_info(session: &mut Adapter) -> Result<(), Box<dyn Error>> {
    let info = session.get_adapter_info()?;
    println!("Adapter info ({}):", session.get_adapter_type());
    println!("  Chip id: {:#06x}", info.chip_id);
    println!("  HW version: {:#06x}", info.hw_version);
    println!("  SW version: {:#06x}", info.sw_version);
    println!("  Voltage: {}-{} mV (step {} mV)", info.min_volt_mv, info.max_volt_mv, info.volt_step_mv);
    println!("  Current: {}-{} mA (step {} mA)", info.min_curr_ma, info.max_curr_ma, info.curr_step_ma);
    Ok(())
}

fn set_voltage(session: &mut Adapter, millivolts: u32) -> Result<(), Box<dyn Error>> {
    session.get_output_capabilities()?;
    session.set_output_voltage(millivolts)?;
    println!("Output voltage set to {} mV", millivolts);
    Ok(())
}

fn set_current(session: &mut Adapter, milliamps: u32) -> Result<(), Box<dyn Error>> {
    session.get_output_capabilities()?;
    session.set_output_current(milliamps)?;
    println!("Output current set to {} mA", milliamps);
    Ok(())
}

fn watchdog(session: &mut Adapter, seconds: u32) -> Result<(), Box<dyn Error>> {
    session.set_init_data(seconds)?;
    println!("Watchdog armed for {} s", seconds);
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = load_config(cli.config.as_ref())?;
    let mut registry = DeviceRegistry::new(config);
    registry.register(SimulatedAdapter::new().with_chip_name(&cli.chip))?;
    let session = registry.session_mut()?;

    detect(session)?;
    match cli.command {
        Command::Detect => Ok(()),
        Command::Caps => caps(session),
        Command::SetVoltage { millivolts } => set_voltage(session, millivolts),
        Command::SetCurrent { milliamps } => set_current(session, milliamps),
        Command::SourceInfo => source_info(session),
        Command::DeviceInfo => device_info(session),
        Command::Watchdog { seconds } => watchdog(session, seconds),
        Command::Demo => {
            caps(session)?;
            device_info(session)?;
            watchdog(session, 5)?;
            set_voltage(session, 9000)?;
            set_current(session, 2000)?;
            source_info(session)?;
            let errors = session.get_error_info()?;
            println!("Adapter faults: {}", if errors.is_normal() { "none" } else { "present" });
            session.exit_ufcs_mode()?;
            println!("Left UFCS mode");
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    setup_logging(&cli.verbose);

    if let Err(e) = run(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}
