//! camlink client command-line entry point.
//!
//! Every subcommand opens one connection, runs one or a few typed commands,
//! prints the result, and exits.
//!
//! # Usage
//!
//! ```bash
//! camlink-client --host bench-7 version
//! camlink-client acquire
//! camlink-client ring-size 50
//! camlink-client frame 0 --out slot0.raw
//! camlink-client burst --timeout-secs 15
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use camlink_client::infrastructure::storage::config::load_config;
use camlink_client::CameraClient;
use camlink_core::protocol::verify_double_byte_order;

#[derive(Parser)]
#[command(name = "camlink-client")]
#[command(about = "Remote camera control client", long_about = None)]
struct Cli {
    /// Configuration file (TOML).  Defaults to the platform config directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera server host (overrides the configuration)
    #[arg(long)]
    host: Option<String>,

    /// Camera server control port (overrides the configuration)
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

impl From<Switch> for bool {
    fn from(s: Switch) -> bool {
        matches!(s, Switch::On)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the server's protocol version
    Version,
    /// Print the camera description
    Info,
    /// Capture one frame into the server's ring
    Acquire,
    /// Print metadata of the displayed frame, optionally saving its pixels
    Image {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the exposure settings
    Exposure,
    /// Change exposure settings; unset fields keep their current value
    SetExposure {
        #[arg(long)]
        exposure_ms: Option<f64>,
        #[arg(long)]
        fps: Option<f64>,
        #[arg(long)]
        gain: Option<f64>,
    },
    /// Print ring size, valid frames, and indices
    Ring,
    /// Resize the ring (discards its frames)
    RingSize { size: u32 },
    /// Fetch the frame in a ring slot
    Frame {
        index: u32,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Arm a burst and wait for it to finish
    Burst {
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Abort an armed or running burst
    Abort,
    /// Print the burst state
    Status,
    /// Switch the camera LED
    Led { state: Switch },
    /// Switch live video
    Video { state: Switch },
    /// Ask the server to close this connection
    End,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("loading configuration")?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.client.log_level)),
        )
        .init();

    verify_double_byte_order().context("double encoding self-check")?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let client = CameraClient::connect(&addr, config.engine_options()).await?;
    debug!("connected to {addr}");

    run(&client, cli.command).await
}

async fn run(client: &CameraClient, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Version => println!("{}", client.query_version().await?),
        Command::Info => {
            let info = client.camera_info().await?;
            println!("model:          {}", info.model);
            println!("serial:         {}", info.serial);
            println!("sensor:         {} x {}", info.sensor_width, info.sensor_height);
            println!("bits per pixel: {}", info.bits_per_pixel);
            println!("pixel pitch:    {} um", info.pixel_pitch_um);
        }
        Command::Acquire => {
            client.acquire_image().await?;
            let info = client.image_info().await?;
            println!("captured frame {}", info.sequence);
        }
        Command::Image { out } => {
            let info = client.image_info().await?;
            println!("{info:?}");
            if let Some(path) = out {
                let pixels = client.image_data().await?;
                write_pixels(&path, &pixels).await?;
            }
        }
        Command::Exposure => println!("{:?}", client.exposure().await?),
        Command::SetExposure {
            exposure_ms,
            fps,
            gain,
        } => {
            let mut parms = client.exposure().await?;
            if let Some(v) = exposure_ms {
                parms.exposure_ms = v;
            }
            if let Some(v) = fps {
                parms.fps = v;
            }
            if let Some(v) = gain {
                parms.master_gain = v;
            }
            println!("{:?}", client.set_exposure(&parms).await?);
        }
        Command::Ring => println!("{:?}", client.ring_info().await?),
        Command::RingSize { size } => {
            let applied = client.set_ring_size(size).await?;
            if applied != size {
                info!("ring size {size} clamped to {applied}");
            }
            println!("{applied}");
        }
        Command::Frame { index, out } => {
            let frame = client.ring_frame(index).await?;
            println!("{:?}", frame.info);
            if let Some(path) = out {
                write_pixels(&path, &frame.pixels).await?;
            }
        }
        Command::Burst { timeout_secs } => {
            client.burst_arm().await?;
            println!("armed; waiting for trigger");
            let state = client
                .wait_for_burst_end(Duration::from_secs(timeout_secs))
                .await?;
            let frames = client.ring_frame_count().await?;
            println!("burst {state}: {frames} frames in ring");
        }
        Command::Abort => client.burst_abort().await?,
        Command::Status => println!("{}", client.burst_status().await?),
        Command::Led { state } => client.set_led(state.into()).await?,
        Command::Video { state } => client.enable_video(state.into()).await?,
        Command::End => client.end_session().await?,
    }
    Ok(())
}

async fn write_pixels(path: &Path, pixels: &[u8]) -> anyhow::Result<()> {
    tokio::fs::write(path, pixels)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    println!("wrote {} bytes to {}", pixels.len(), path.display());
    Ok(())
}
