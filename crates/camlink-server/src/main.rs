//! camlink camera server entry point.
//!
//! Loads the configuration, wires the camera, trigger source, and frame ring
//! into a [`ServerContext`], and serves the control port until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()              -- TOML file or defaults
//!  └─ verify_double_byte_order() -- once, before any client is served
//!  └─ trigger source             -- UDP listener thread (or disabled)
//!  └─ serve()                    -- accept loop, one task per connection
//! ```
//!
//! # Usage
//!
//! ```bash
//! camlink-server --config /etc/camlink/server.toml --port 9985
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use camlink_core::protocol::verify_double_byte_order;
use camlink_core::FrameRing;
use camlink_server::infrastructure::camera::simulated::SimulatedCamera;
use camlink_server::infrastructure::storage::config::{load_config, TriggerKind};
use camlink_server::infrastructure::trigger::udp::UdpTrigger;
use camlink_server::infrastructure::trigger::{DisabledTrigger, TriggerSource};
use camlink_server::{bind_listener, serve, Hardware, ServerContext, ServerSettings};

#[derive(Parser)]
#[command(name = "camlink-server")]
#[command(about = "Remote camera control server", long_about = None)]
struct Cli {
    /// Configuration file (TOML).  Defaults to the platform config directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the control port from the configuration
    #[arg(long)]
    port: Option<u16>,

    /// Run without a trigger source; BURST_ARM always fails
    #[arg(long)]
    no_trigger: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("loading configuration")?;
    if let Some(port) = cli.port {
        config.network.control_port = port;
    }

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    info!("camlink server starting");
    verify_double_byte_order().context("double encoding self-check")?;

    // ── Trigger source ────────────────────────────────────────────────────────
    let trigger: Arc<dyn TriggerSource> = if cli.no_trigger {
        Arc::new(DisabledTrigger)
    } else {
        match config.trigger.kind {
            TriggerKind::Disabled => Arc::new(DisabledTrigger),
            TriggerKind::Udp => {
                let addr = config.trigger.trigger_addr()?;
                match UdpTrigger::bind(addr) {
                    Ok(trigger) => Arc::new(trigger),
                    Err(e) => {
                        warn!("burst trigger disabled: {e}");
                        Arc::new(DisabledTrigger)
                    }
                }
            }
        }
    };

    // ── Hardware and context ──────────────────────────────────────────────────
    let camera = SimulatedCamera::new(config.camera.clone());
    let hardware = Hardware::new(Box::new(camera), FrameRing::new(config.ring.size))
        .with_acquire_margin(config.server.acquire_margin());
    let ctx = ServerContext::new(hardware, trigger, ServerSettings::from(&config));

    let listener = bind_listener(config.network.control_addr()?).await?;

    info!("camlink server ready.  Press Ctrl-C to exit.");

    tokio::select! {
        _ = serve(listener, Arc::clone(&ctx)) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for Ctrl-C")?;
            info!("shutdown signal received");
        }
    }

    if ctx.burst().is_active() {
        ctx.burst().request_abort();
    }
    info!("camlink server stopped");
    Ok(())
}
