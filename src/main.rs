use std::fs::OpenOptions;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use sml_gateway::config::PublisherSettings;
use sml_gateway::decoder::CollectingDecoder;
use sml_gateway::logging::{log_error, log_warn};
use sml_gateway::publish::MemoryPublisher;
use sml_gateway::transport::{replay, SerialTransport};
use sml_gateway::util::hex::{decode_hex, pretty_hex};
use sml_gateway::{
    init_logger, init_logger_with_level, log_info, Channel, ChannelConfig, Config, Gateway,
    JsonLinesPublisher, LogPublisher, PollScheduler, Publisher, RawFrameDecoder, SerialBus,
    SharedChannel, SystemClock,
};

#[derive(Parser)]
#[command(name = "sml-gateway")]
#[command(about = "Serial meter gateway for SML push meters and Modbus energy meters")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum FramingArg {
    Sml,
    Line,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway until interrupted.
    Run {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Load and validate a configuration file.
    CheckConfig {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Push a captured byte stream through a channel and print the frames.
    Replay {
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long, value_enum, default_value = "sml")]
        framing: FramingArg,
        /// Line terminator byte for line framing.
        #[arg(long, default_value = "10")]
        terminator: u8,
        /// Burst size in bytes.
        #[arg(long, default_value = "64")]
        chunk: usize,
        #[arg(long, default_value = "1000")]
        capacity: usize,
        /// The capture is hex text rather than raw bytes.
        #[arg(long)]
        hex: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let config = Config::load(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            init_logger_with_level(&config.loglevel);
            run(config).await?;
        }
        Commands::CheckConfig { config } => {
            init_logger();
            let config = Config::load(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            print_summary(&config);
        }
        Commands::Replay {
            file,
            framing,
            terminator,
            chunk,
            capacity,
            hex,
        } => {
            init_logger();
            let raw = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let data = if hex {
                decode_hex(&String::from_utf8_lossy(&raw)).context("decoding hex capture")?
            } else {
                raw
            };
            let config = match framing {
                FramingArg::Sml => ChannelConfig::sml("replay"),
                FramingArg::Line => ChannelConfig::line("replay", terminator),
            }
            .with_capacity(capacity);

            let mut channel = Channel::new(0, config);
            let mut decoder = CollectingDecoder::default();
            let mut publisher = MemoryPublisher::default();
            let delivered = replay(&mut channel, &data, chunk, &mut decoder, &mut publisher);

            for (i, (_, frame)) in decoder.frames.iter().enumerate() {
                println!("frame {} ({} bytes)", i + 1, frame.len());
                println!("{}", pretty_hex(frame, 16));
            }
            println!(
                "{} bytes, {} frame(s) delivered, {} discarded",
                data.len(),
                delivered,
                channel.stats().frames_discarded
            );
        }
    }

    Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
    let mut channels = Vec::new();
    let mut readers = Vec::new();
    for (index, (channel_config, transport_config)) in config.channel_configs().into_iter().enumerate() {
        let port = transport_config.port.clone();
        let shared = SharedChannel::new(Channel::new(index, channel_config));
        let handle = SerialTransport::new(transport_config, shared.clone())
            .spawn()
            .with_context(|| format!("opening {port}"))?;
        channels.push(shared);
        readers.push((port, handle));
    }

    let publisher: Box<dyn Publisher> = match &config.publisher {
        PublisherSettings::Log => Box::new(LogPublisher),
        PublisherSettings::JsonLines { path } => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening {path}"))?;
            Box::new(JsonLinesPublisher::new(file))
        }
    };

    let mut gateway = Gateway::new(channels, Box::new(RawFrameDecoder::new()), publisher)
        .with_status_interval(config.status_interval_secs.saturating_mul(1000));

    if let Some(bus_config) = config.bus_config() {
        let port = bus_config.port.clone();
        let bus = SerialBus::open(bus_config).with_context(|| format!("opening bus {port}"))?;
        let scheduler = PollScheduler::new(config.poll_config(), config.slave_configs());
        gateway = gateway.with_poller(scheduler, Box::new(bus));
    }

    let clock = SystemClock::new();
    gateway
        .run(&clock, Duration::from_millis(config.tick_ms), async {
            if tokio::signal::ctrl_c().await.is_err() {
                log_warn("Cannot listen for Ctrl-C, stopping");
            }
        })
        .await;

    for (port, reader) in readers {
        if !reader.is_finished() {
            reader.abort();
            continue;
        }
        match reader.await {
            Ok(Err(e)) => log_error(&format!("Reader for {port} failed: {e}")),
            Err(e) => log_error(&format!("Reader for {port} panicked: {e}")),
            Ok(Ok(())) => {}
        }
    }
    log_info("Shut down");
    Ok(())
}

fn print_summary(config: &Config) {
    println!("Configuration OK");
    println!("  tick: {} ms, log level: {}", config.tick_ms, config.loglevel);
    for ch in &config.channels {
        println!(
            "  channel {}: {} @ {} baud, {:?}, {} bytes{}",
            ch.name,
            ch.port,
            ch.baudrate,
            ch.framing,
            ch.buffer_capacity,
            if ch.enabled { "" } else { " (disabled)" }
        );
    }
    if let Some(bus) = &config.bus {
        println!("  bus: {} @ {} baud", bus.port, bus.baudrate);
    }
    for slave in config.slave_configs() {
        println!(
            "  slave {}: address {}, every {} s, {} registers in {} blocks",
            slave.name,
            slave.address,
            slave.interval_ms / 1000,
            slave.layout.registers.len(),
            slave.layout.blocks.len()
        );
    }
}
