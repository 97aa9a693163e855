use std::path::{Path, PathBuf};
use std::process::Stdio;

use clap::{Parser, Subcommand};
use formats::{PayloadSummary, payload_json};
use foundation::LatLng;
use layers::PointLayerConfig;
use streaming::{TagRequest, TaggerLine};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command as ProcessCommand;
use tokio::sync::mpsc;
use tools::{
    ConfigOverrides, OpenLayer, TagSession, nearest_report, open_layer, parse_bounds,
    parse_filters, reload_layer, resolve_config,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect, filter and query panorama point payloads")]
struct Args {
    /// JSON config file for the point layer
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Render cap override
    #[arg(long, global = true)]
    cap: Option<usize>,

    /// Seed for the load shuffle and sampling
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print name, size, schema, bounds and content hash
    Inspect { file: PathBuf },

    /// Apply filters and report what passes
    Filter {
        file: PathBuf,

        /// Predicate `<attribute> <operator> <value>`; repeat to AND
        #[arg(short = 'w', long = "where")]
        filters: Vec<String>,

        /// Print the filtered records as a payload
        #[arg(long)]
        json: bool,
    },

    /// Resolve a pointer position to the nearest filtered point
    #[command(allow_negative_numbers = true)]
    Nearest {
        file: PathBuf,
        lat: f64,
        lng: f64,

        #[arg(long, default_value_t = 9.0)]
        zoom: f64,

        #[arg(short = 'w', long = "where")]
        filters: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// Compute the render set for a viewport
    Render {
        file: PathBuf,

        /// Viewport: south,west,north,east
        #[arg(long, allow_hyphen_values = true)]
        bounds: String,

        #[arg(short = 'w', long = "where")]
        filters: Vec<String>,

        /// Records to print
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Print the panorama link of the point nearest to a position
    #[command(allow_negative_numbers = true)]
    Link {
        file: PathBuf,
        lat: f64,
        lng: f64,

        #[arg(short = 'w', long = "where")]
        filters: Vec<String>,
    },

    /// Run the external tagger on a payload and load its output
    Tag {
        file: PathBuf,

        #[arg(long, default_value = TagRequest::DEFAULT_PROGRAM)]
        program: String,

        #[arg(long, default_value = TagRequest::DEFAULT_SCRIPT)]
        script: PathBuf,

        /// Options passed through to the tagger
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        options: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = real_main().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn real_main() -> Result<(), String> {
    let args = Args::parse();
    let config = resolve_config(
        args.config.as_deref(),
        &ConfigOverrides {
            render_cap: args.cap,
            seed: args.seed,
        },
    )?;

    match args.command {
        Command::Inspect { file } => cmd_inspect(&file, config),
        Command::Filter {
            file,
            filters,
            json,
        } => cmd_filter(&file, config, &filters, json),
        Command::Nearest {
            file,
            lat,
            lng,
            zoom,
            filters,
            json,
        } => cmd_nearest(&file, config, LatLng::new(lat, lng), zoom, &filters, json),
        Command::Render {
            file,
            bounds,
            filters,
            limit,
        } => cmd_render(&file, config, &bounds, &filters, limit),
        Command::Link {
            file,
            lat,
            lng,
            filters,
        } => cmd_link(&file, config, LatLng::new(lat, lng), &filters),
        Command::Tag {
            file,
            program,
            script,
            options,
        } => {
            let request = TagRequest {
                program,
                script,
                file,
                options,
            };
            cmd_tag(request, config).await
        }
    }
}

fn open_filtered(
    file: &Path,
    config: PointLayerConfig,
    filters: &[String],
) -> Result<OpenLayer, String> {
    let chain = parse_filters(filters)?;
    let mut open = open_layer(file, config)?;
    if !chain.is_empty() {
        open.layer.set_filters(chain).map_err(|e| e.to_string())?;
    }
    Ok(open)
}

fn print_summary(open: &OpenLayer) -> Result<(), String> {
    let dataset = open.layer.dataset().map_err(|e| e.to_string())?;
    let summary = PayloadSummary::new(dataset, open.content_hash.clone());
    let text = serde_json::to_string_pretty(&summary).map_err(|e| format!("json: {e}"))?;
    println!("{text}");
    Ok(())
}

fn cmd_inspect(file: &Path, config: PointLayerConfig) -> Result<(), String> {
    let open = open_layer(file, config)?;
    print_summary(&open)
}

fn cmd_filter(
    file: &Path,
    config: PointLayerConfig,
    filters: &[String],
    json: bool,
) -> Result<(), String> {
    let open = open_filtered(file, config, filters)?;
    let layer = &open.layer;
    let dataset = layer.dataset().map_err(|e| e.to_string())?;
    let view = layer.view().map_err(|e| e.to_string())?;

    if json {
        let doc = payload_json(dataset.name(), view.points(dataset).map(|(_, p)| p));
        let text = serde_json::to_string_pretty(&doc).map_err(|e| format!("json: {e}"))?;
        println!("{text}");
    } else {
        println!("{} of {} points pass", view.len(), dataset.len());
    }
    Ok(())
}

fn cmd_nearest(
    file: &Path,
    config: PointLayerConfig,
    pointer: LatLng,
    zoom: f64,
    filters: &[String],
    json: bool,
) -> Result<(), String> {
    let mut open = open_filtered(file, config, filters)?;
    let Some(report) = nearest_report(&mut open.layer, pointer, zoom)? else {
        println!("no points");
        return Ok(());
    };

    if json {
        let text = serde_json::to_string_pretty(&report).map_err(|e| format!("json: {e}"))?;
        println!("{text}");
        return Ok(());
    }

    println!(
        "#{} at {:.6},{:.6} distance_sq={:.6} pixels={:.1} in_range={} on_marker={}",
        report.index,
        report.lat,
        report.lng,
        report.distance_sq,
        report.pixel_distance,
        report.in_range,
        report.on_marker
    );
    for line in &report.tooltip {
        println!("  {line}");
    }
    if let Some(link) = &report.link {
        println!("  {link}");
    }
    Ok(())
}

fn cmd_render(
    file: &Path,
    config: PointLayerConfig,
    bounds: &str,
    filters: &[String],
    limit: usize,
) -> Result<(), String> {
    let bounds = parse_bounds(bounds)?;
    let mut open = open_filtered(file, config, filters)?;
    let cap = open.layer.config().render_cap;
    let points = open.layer.render(&bounds).map_err(|e| e.to_string())?;

    let sampled = points.first().is_some_and(|p| p.priority.is_some());
    println!(
        "{} points to render (cap {cap}{})",
        points.len(),
        if sampled { ", sampled" } else { "" }
    );
    for p in points.iter().take(limit) {
        match p.priority {
            Some(priority) => println!(
                "  #{} {:.6},{:.6} priority={priority:.4}",
                p.index, p.lat, p.lng
            ),
            None => println!("  #{} {:.6},{:.6}", p.index, p.lat, p.lng),
        }
    }
    eprintln!("{}", open.layer.metrics());
    Ok(())
}

fn cmd_link(
    file: &Path,
    config: PointLayerConfig,
    pointer: LatLng,
    filters: &[String],
) -> Result<(), String> {
    let mut open = open_filtered(file, config, filters)?;
    let zoom = open.layer.config().reference_zoom;
    let report = nearest_report(&mut open.layer, pointer, zoom)?
        .ok_or_else(|| "no points".to_string())?;
    let link = report
        .link
        .ok_or_else(|| format!("point #{} has no panoId", report.index))?;
    println!("{link}");
    Ok(())
}

async fn cmd_tag(request: TagRequest, config: PointLayerConfig) -> Result<(), String> {
    // Load first so a broken input fails before the tagger runs.
    let mut open = open_layer(&request.file, config)?;

    let args = request.args();
    info!(program = %request.program, ?args, "starting tagger");
    let mut child = ProcessCommand::new(&request.program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("spawn {}: {e}", request.program))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| "tagger stdout not captured".to_string())?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| "tagger stderr not captured".to_string())?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let out_task = tokio::spawn(forward_lines(stdout, tx.clone()));
    let err_task = tokio::spawn(forward_lines(stderr, tx));

    let mut session = TagSession::default();
    while let Some(line) = rx.recv().await {
        session.observe(line);
    }

    for task in [out_task, err_task] {
        task.await
            .map_err(|e| format!("tagger reader: {e}"))?
            .map_err(|e| format!("read tagger output: {e}"))?;
    }
    let status = child
        .wait()
        .await
        .map_err(|e| format!("wait for tagger: {e}"))?;
    info!(%status, "tagger exited");

    let saved = session.finish(status.success())?;
    reload_layer(&mut open, &saved)?;
    print_summary(&open)
}

/// Split a tagger stream at `\r` so progress redraws arrive as they happen.
async fn forward_lines<R>(
    reader: R,
    tx: mpsc::UnboundedSender<TaggerLine>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut segments = BufReader::new(reader).split(b'\r');
    while let Some(segment) = segments.next_segment().await? {
        for line in TaggerLine::parse_chunk(&String::from_utf8_lossy(&segment)) {
            if tx.send(line).is_err() {
                return Ok(());
            }
        }
    }
    Ok(())
}
