#[macro_use]
extern crate tracing;

use std::{path::PathBuf, sync::Arc, time::Duration};

use auroraops::{
    actions::Breath,
    color::Color,
    daemon::{clear_panels, Daemon},
    device::DeviceClient,
    models::{Config, PanelSettings},
    status::HttpStatusSource,
    transport::{CommandTransport, PanelWriter},
    PanelId,
};
use color_eyre::eyre::{self, WrapErr};
use serde_derive::Serialize;
use structopt::StructOpt;
use tokio::{io::AsyncBufReadExt, runtime::Builder, signal};

/// Deadline of each step of the shutdown sequence
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

/// How long `info` keeps the test colors on
const INFO_DISPLAY_TIME: Duration = Duration::from_secs(2);

const TEST_COLORS: &[(&str, &str)] = &[
    ("white", "#ffffff"),
    ("grey", "#808080"),
    ("red", "#ff0000"),
    ("maroon", "#800000"),
    ("yellow", "#ffff00"),
    ("lime", "#00ff00"),
    ("green", "#008000"),
    ("aqua", "#00ffff"),
    ("teal", "#008080"),
    ("blue", "#0000ff"),
    ("fuchsia", "#ff00ff"),
    ("purple", "#800080"),
    ("olive", "#808000"),
];

#[derive(Debug, StructOpt)]
struct Opts {
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u32,
    #[structopt(short, long = "config", default_value = "auroraops.toml")]
    config_path: PathBuf,
    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Render the polled statuses until interrupted
    Server,
    /// Print hardware information and light every panel with a test color
    Info,
    /// Pair with a device and write its access token to a configuration file
    Authorize {
        /// Base URL of the device, e.g. http://192.168.1.20:16021
        #[structopt(long)]
        url: String,
        #[structopt(short, long, default_value = "auroraops.toml")]
        output: PathBuf,
    },
    /// Run a breathing animation on some panels
    Pulse {
        #[structopt(long)]
        from: String,
        #[structopt(long)]
        to: String,
        /// Duration of one breath cycle, in seconds
        #[structopt(long, default_value = "2")]
        seconds: u32,
        /// Total running time, in seconds
        #[structopt(long, default_value = "10")]
        run_for: u64,
        #[structopt(required = true)]
        panels: Vec<PanelId>,
    },
}

async fn load_config(opts: &Opts) -> eyre::Result<Config> {
    Config::load_file(&opts.config_path)
        .await
        .wrap_err_with(|| format!("failed to load {}", opts.config_path.display()))
}

async fn connect(panel: &PanelSettings) -> eyre::Result<(DeviceClient, Arc<CommandTransport>)> {
    let device = DeviceClient::new(&panel.url, &panel.key)?;
    let addr = device
        .start_external_control()
        .await
        .wrap_err("cannot initiate external control")?;

    let transport = Arc::new(CommandTransport::start(addr).await?);
    Ok((device, transport))
}

async fn server(config: Config) -> eyre::Result<()> {
    let (device, transport) = connect(&config.panel).await?;
    let writer: Arc<dyn PanelWriter> = transport;

    let daemon = async {
        if let Some(color) = config.on_start() {
            let info = device.info().await?;
            clear_panels(
                writer.clone(),
                info.panels.iter().map(|panel| panel.id).collect(),
                color,
            )?;
        }

        let source = HttpStatusSource::new(&config.poll.location, config.poll.timeout())?;
        eyre::Result::<_>::Ok(Daemon::start(&config, writer.clone(), source).await?)
    }
    .await;

    let daemon = match daemon {
        Ok(daemon) => daemon,
        Err(error) => {
            if let Err(error) = writer.close().await {
                warn!(error = %error, "failed to close panel writer");
            }
            return Err(error);
        }
    };

    signal::ctrl_c().await?;
    info!("got SIGINT, terminating");

    daemon.shutdown(SHUTDOWN_DEADLINE).await?;
    Ok(())
}

async fn info(config: Config) -> eyre::Result<()> {
    let (device, transport) = connect(&config.panel).await?;
    let info = device.info().await?;

    println!("Name:      {}", info.name);
    println!("Model:     {}", info.model);
    println!("Serial:    {}", info.serial_no);
    println!("Firmware:  {}", info.firmware_version);
    println!("Panels:    {}", info.panels.len());

    for (panel, (name, hex)) in info.panels.iter().zip(TEST_COLORS.iter().cycle()) {
        println!(
            "Setting panel {} ({}, {}) to {}",
            panel.id, panel.x, panel.y, name
        );
        transport.submit(panel.id, Color::from_hex(hex)?.to_rgb8());
    }

    tokio::time::sleep(INFO_DISPLAY_TIME).await;
    transport.stop(SHUTDOWN_DEADLINE).await?;
    Ok(())
}

#[derive(Serialize)]
struct PanelSection {
    panel: PanelSettings,
}

async fn authorize(url: String, output: PathBuf) -> eyre::Result<()> {
    let mut device = DeviceClient::new(&url, "")?;

    println!("Hold the power button of the device for 5-7 seconds to enter pairing mode.");
    println!("Press Enter when ready.");
    tokio::io::BufReader::new(tokio::io::stdin())
        .read_line(&mut String::new())
        .await?;

    let key = device.authorize().await.wrap_err("unable to authorize")?;

    let section = toml::to_string(&PanelSection {
        panel: PanelSettings {
            url: device.url().to_owned(),
            key,
        },
    })?;

    tokio::fs::write(&output, section)
        .await
        .wrap_err_with(|| format!("failed to write {}", output.display()))?;

    info!(file = %output.display(), "configuration file initialized");
    Ok(())
}

async fn pulse(
    config: Config,
    from: &str,
    to: &str,
    seconds: u32,
    run_for: Duration,
    panels: Vec<PanelId>,
) -> eyre::Result<()> {
    let from = Color::from_hex(from)?;
    let to = Color::from_hex(to)?;

    let (_device, transport) = connect(&config.panel).await?;
    let breath = Breath::new(transport.clone(), panels, from, to, seconds)?;

    breath.start().await;

    tokio::select! {
        _ = tokio::time::sleep(run_for) => {},
        result = signal::ctrl_c() => {
            result?;
            info!("got SIGINT, terminating");
        }
    }

    let result = breath.stop(SHUTDOWN_DEADLINE).await;
    transport.stop(SHUTDOWN_DEADLINE).await?;
    Ok(result?)
}

async fn run(opts: Opts) -> eyre::Result<()> {
    match &opts.command {
        Command::Server => server(load_config(&opts).await?).await,
        Command::Info => info(load_config(&opts).await?).await,
        Command::Authorize { url, output } => authorize(url.clone(), output.clone()).await,
        Command::Pulse {
            from,
            to,
            seconds,
            run_for,
            panels,
        } => {
            pulse(
                load_config(&opts).await?,
                from,
                to,
                *seconds,
                Duration::from_secs(*run_for),
                panels.clone(),
            )
            .await
        }
    }
}

fn install_tracing(opts: &Opts) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let fmt_layer = fmt::layer();

    let filter_layer = EnvFilter::try_from_env("AURORAOPS_LOG").unwrap_or_else(|_| {
        EnvFilter::new(match opts.verbose {
            0 => "auroraops=warn,auroraopsd=warn",
            1 => "auroraops=info,auroraopsd=info",
            2 => "auroraops=debug,auroraopsd=debug",
            _ => "auroraops=trace,auroraopsd=trace",
        })
    });

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .try_init()
}

#[paw::main]
fn main(opts: Opts) -> eyre::Result<()> {
    color_eyre::install()?;
    install_tracing(&opts)?;

    // Create tokio runtime
    let thd_count = match num_cpus::get() {
        1 => 2,
        other => other.min(4),
    };

    let rt = Builder::new_multi_thread()
        .worker_threads(thd_count)
        .enable_all()
        .build()?;
    rt.block_on(run(opts))
}
