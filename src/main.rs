//! CLI Entry Point for daq-dashboard
//!
//! Provides command-line access to the dashboard core:
//! - Watching every panel of a running DAQ (all pollers, periodic summary)
//! - Downloading a file frame or module-map overlay with progress
//! - Writer and simulator control
//! - Showing the effective configuration
//!
//! # Usage
//!
//! ```bash
//! daq-dashboard --base-url http://daq-host:5000 watch --ticks 10
//! daq-dashboard frame 1684930336 0 --module-map --output overlay.png
//! daq-dashboard writer start --n-images 100 --output-folder /tmp/
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use daq_dashboard::assets::DownloadProgress;
use daq_dashboard::classifier::StatusBadge;
use daq_dashboard::config::{DashboardConfig, DEFAULT_CONFIG_PATH};
use daq_dashboard::endpoints::{Endpoints, FrameRequest};
use daq_dashboard::{logging, Dashboard, DashboardError};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "daq-dashboard")]
#[command(about = "Operator dashboard for the detector DAQ backend", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the backend base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll every resource and print a panel summary each second
    Watch {
        /// Stop after this many summaries (runs until Ctrl+C otherwise)
        #[arg(long)]
        ticks: Option<u64>,
    },

    /// Download a frame (or its module-map overlay) of a stored file
    Frame {
        /// Acquisition log id of the file
        log_id: String,

        /// Frame index
        i_image: u64,

        /// Fetch the module-map overlay instead of the raw frame
        #[arg(long)]
        module_map: bool,

        /// Where to write the image
        #[arg(long)]
        output: PathBuf,
    },

    /// Writer control
    Writer {
        #[command(subcommand)]
        action: WriterAction,
    },

    /// UDP simulator control
    Simulator {
        #[command(subcommand)]
        action: SimulatorAction,
    },

    /// Configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum WriterAction {
    /// Start writing images
    Start {
        /// Number of images to write
        #[arg(long)]
        n_images: Option<u64>,

        /// Output folder (the file is named after the run id)
        #[arg(long)]
        output_folder: Option<String>,

        /// Run id (defaults to the request time in nanoseconds)
        #[arg(long)]
        run_id: Option<u64>,
    },
    /// Stop the current acquisition
    Stop,
}

#[derive(Subcommand)]
enum SimulatorAction {
    /// Start emitting UDP traffic
    Start,
    /// Stop emitting UDP traffic
    Stop,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = DashboardConfig::load_from(&cli.config).map_err(DashboardError::from)?;
    if let Some(base_url) = cli.base_url {
        config.backend.base_url = base_url;
    }
    config.validate().map_err(DashboardError::Configuration)?;
    logging::init_from_config(&config).map_err(DashboardError::Configuration)?;

    if let Commands::Config {
        action: ConfigAction::Show,
    } = cli.command
    {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let endpoints = Endpoints::http(&config.backend.base_url)?;
    let dashboard = Dashboard::new(endpoints, &config);

    match cli.command {
        Commands::Watch { ticks } => watch(&dashboard, ticks).await,
        Commands::Frame {
            log_id,
            i_image,
            module_map,
            output,
        } => {
            let request = if module_map {
                FrameRequest::module_map(log_id, i_image)
            } else {
                FrameRequest::frame(log_id, i_image)
            };
            download_frame(&dashboard, request, output).await
        }
        Commands::Writer { action } => match action {
            WriterAction::Start {
                n_images,
                output_folder,
                run_id,
            } => {
                let context = dashboard.context();
                let n_images = n_images.unwrap_or(context.n_images());
                let folder =
                    output_folder.unwrap_or_else(|| context.last_output_folder().to_string());
                let status = dashboard.start_writing(n_images, &folder, run_id).await?;
                println!("✅ Writer {}", status.state);
                println!("   Output file: {}", status.acquisition.info.output_file);
                Ok(())
            }
            WriterAction::Stop => {
                let status = dashboard.stop_writing().await?;
                println!("⏹️  Writer {}", status.state);
                Ok(())
            }
        },
        Commands::Simulator { action } => {
            let record = match action {
                SimulatorAction::Start => dashboard.start_simulator().await?,
                SimulatorAction::Stop => dashboard.stop_simulator().await?,
            };
            println!("🛰️  Simulator {}", record.status);
            Ok(())
        }
        Commands::Config { .. } => Ok(()),
    }
}

async fn watch(dashboard: &Dashboard, ticks: Option<u64>) -> Result<()> {
    println!("📡 Watching DAQ backend - Press Ctrl+C to stop");
    dashboard.start();

    let period = Duration::from_secs(1);
    let mut summary = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    let mut printed = 0u64;
    loop {
        tokio::select! {
            _ = summary.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }
        print_summary(dashboard);
        printed += 1;
        if ticks.is_some_and(|limit| printed >= limit) {
            break;
        }
    }

    dashboard.shutdown();
    println!("\n👋 Dashboard shutting down...");
    Ok(())
}

fn badge(badge: &StatusBadge) -> String {
    format!("{} [{}]", badge.label, badge.severity)
}

fn alert(error: &Option<String>) -> String {
    error
        .as_ref()
        .map(|e| format!("  ⚠️  {}", e))
        .unwrap_or_default()
}

fn print_summary(dashboard: &Dashboard) {
    let writer = dashboard.writer_view();
    let acquisition = dashboard.acquisition_view();
    let deployment = dashboard.deployment_view();
    let simulator = dashboard.simulator_view();
    let stats = dashboard.stats_view();

    println!();
    println!("Writer:      {}{}", badge(&writer.badge), alert(&writer.error));
    println!(
        "Acquisition: {} {:.0}% ({}/{}) {}s {}",
        badge(&acquisition.badge),
        acquisition.progress_percent,
        acquisition.n_write_completed,
        acquisition.n_write_requested,
        acquisition.elapsed_seconds,
        acquisition.message,
    );
    println!(
        "Deployment:  {} {} {}s{}",
        badge(&deployment.badge),
        deployment.message,
        deployment.elapsed_seconds,
        alert(&deployment.error)
    );
    println!(
        "Simulator:   {} {} MB/s {} Hz{}",
        badge(&simulator.badge),
        simulator.bandwidth_mbps,
        simulator.frequency_hz,
        alert(&simulator.error)
    );
    println!(
        "Stats:       {} detector {} MB/s {} Hz, writer {} MB/s {} Hz{}",
        badge(&stats.activity),
        stats.detector_bandwidth_mbps,
        stats.detector_frequency_hz,
        stats.writer_bandwidth_mbps,
        stats.writer_frequency_hz,
        alert(&stats.error)
    );
    match dashboard.config_view() {
        Some(config) => println!(
            "Config:      {} ({}) {}-bit {}x{}, {} modules{}",
            config.detector_name,
            config.detector_type,
            config.bit_depth,
            config.image_pixel_width,
            config.image_pixel_height,
            config.n_modules,
            alert(&config.error)
        ),
        None => println!("Config:      not received yet"),
    }

    let log = dashboard.log_view();
    println!("Log:{}", alert(&log.error));
    for entry in log.entries {
        println!(
            "  {}  {:>6} images  {:>8}s  {}  {}",
            entry.stop_time, entry.n_images, entry.duration, entry.message, entry.output_file
        );
    }
}

async fn download_frame(
    dashboard: &Dashboard,
    request: FrameRequest,
    output: PathBuf,
) -> Result<()> {
    println!("🖼️  Downloading {}", request.path());
    let mut dialog = dashboard.asset_dialog();
    let mut progress = dialog.open(request);

    let printer = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            match *progress.borrow_and_update() {
                DownloadProgress::Percent(p) => println!("   {:.0}%", p),
                DownloadProgress::Indeterminate { loaded } => println!("   {} bytes", loaded),
            }
        }
    });

    let result = dialog.wait_ready().await;
    printer.abort();
    let handle = result.inspect_err(|e| {
        if e.is_recoverable() {
            println!("   Download failed, retrying may succeed");
        }
    })?;

    handle.save_to(&output).await?;
    println!(
        "✅ Saved {} bytes ({}) to {}",
        handle.len(),
        handle.content_type().unwrap_or_else(|| "unknown type".to_string()),
        output.display()
    );

    dialog.close();
    Ok(())
}
