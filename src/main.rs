//! The Alpaca hub binary: parses the command line, wires up logging,
//! registers the configured devices and runs the HTTP + discovery servers
//! until interrupted.

use alpaca_hub::api::ServerInfo;
use alpaca_hub::drivers::{
    CameraFilterWheel, ControlPresentation, FalconRotator, FocusCubeFocuser, PowerBoxSwitch,
    SdkCamera, SerialFilterWheel, SerialMount, SimulatedCamera,
};
use alpaca_hub::{Devices, Server, TypedDevice};
use clap::Parser;
use std::net::Ipv6Addr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "ASCOM Alpaca hub for serial and SDK-backed astronomy devices")]
struct Cli {
    /// Log level: 1 = info, 2 = debug, 3 = trace.
    #[arg(short = 'l', default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=3))]
    log_level: u8,

    /// Worker thread count for the server runtime.
    #[arg(short = 't', default_value_t = 1)]
    threads: usize,

    /// Port for the HTTP server.
    #[arg(short = 'p', long, default_value_t = 11111)]
    port: u16,

    /// Serial device path of an equatorial mount to register.
    #[arg(long, value_name = "PATH")]
    mount: Vec<String>,

    /// Serial device path of a focuser to register.
    #[arg(long, value_name = "PATH")]
    focuser: Vec<String>,

    /// Serial device path of a rotator to register.
    #[arg(long, value_name = "PATH")]
    rotator: Vec<String>,

    /// Serial device path of a filter wheel to register.
    #[arg(long, value_name = "PATH")]
    filterwheel: Vec<String>,

    /// Serial device path of a power/dew controller to register.
    #[arg(long, value_name = "PATH")]
    switch: Vec<String>,

    /// Register the built-in simulated camera (with its filter wheel).
    #[arg(long)]
    simulated_camera: bool,
}

/// Default filter complement for wheels that don't carry their own naming.
fn default_filters() -> (Vec<String>, Vec<i32>) {
    (
        ["Luminance", "Red", "Green", "Blue", "Ha"]
            .map(str::to_owned)
            .to_vec(),
        vec![0, 10, 10, 12, 40],
    )
}

fn build_devices(cli: &Cli) -> eyre::Result<Devices> {
    let mut devices = Devices::default();

    if cli.simulated_camera {
        let camera = SdkCamera::new(
            "Simulated camera",
            Arc::new(SimulatedCamera::default()),
            false,
            ControlPresentation::Index,
            ControlPresentation::Value,
        );
        let (names, offsets) = default_filters();
        let wheel =
            CameraFilterWheel::new("Simulated camera wheel", camera.sdk_handle(), names, offsets)?;
        devices.register(TypedDevice::Camera(Arc::new(camera)));
        devices.register(TypedDevice::FilterWheel(Arc::new(wheel)));
    }

    for (index, path) in cli.mount.iter().enumerate() {
        devices.register(TypedDevice::Telescope(Arc::new(SerialMount::new(
            format!("Mount {index}"),
            path,
        ))));
    }
    for (index, path) in cli.focuser.iter().enumerate() {
        devices.register(TypedDevice::Focuser(Arc::new(FocusCubeFocuser::new(
            format!("Focuser {index}"),
            path,
        ))));
    }
    for (index, path) in cli.rotator.iter().enumerate() {
        devices.register(TypedDevice::Rotator(Arc::new(FalconRotator::new(
            format!("Rotator {index}"),
            path,
        ))));
    }
    for (index, path) in cli.filterwheel.iter().enumerate() {
        let (names, offsets) = default_filters();
        devices.register(TypedDevice::FilterWheel(Arc::new(SerialFilterWheel::new(
            format!("Filter wheel {index}"),
            path,
            names,
            offsets,
        )?)));
    }
    for (index, path) in cli.switch.iter().enumerate() {
        devices.register(TypedDevice::Switch(Arc::new(PowerBoxSwitch::new(
            format!("Power box {index}"),
            path,
        ))));
    }

    Ok(devices)
}

async fn run(cli: Cli) -> eyre::Result<()> {
    let server = Server {
        devices: build_devices(&cli)?,
        info: ServerInfo::default(),
        listen_addr: (Ipv6Addr::UNSPECIFIED, cli.port).into(),
    };

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        let _ = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, shutting down");
                shutdown.cancel();
            }
        });
    }

    let (bound_addr, serve) = server.start(shutdown).await?;
    tracing::info!(%bound_addr, "Alpaca hub is up");
    serve.await
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.log_level {
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cli.threads.max(1))
        .enable_all()
        .build()?
        .block_on(run(cli))
}
