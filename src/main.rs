//
// cargo run -- --label 62 --threshold 70 label.png
//
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};
use ql_raster::{submit, ConvertOptions, Device, Error, Feed, LabelSpec, Model, UsbTransport};

/// Print an image on a Brother QL label printer.
#[derive(Parser, Debug)]
#[command(name = "ql-print", version)]
struct Args {
    /// Image file to print
    #[arg(env = "IMAGE")]
    image: PathBuf,

    /// Label size (width in millimeters)
    #[arg(short, long, env = "LABEL", default_value = "62", value_parser = parse_label)]
    label: LabelSpec,

    /// Rotate image counter clock wise before printing
    #[arg(short, long, env = "ROTATE", default_value_t = 0, allow_negative_numbers = true)]
    rotate: i32,

    /// Threshold (percent) to differentiate between black and white pixels
    #[arg(short, long, env = "THRESHOLD", default_value_t = 70.0)]
    threshold: f64,

    /// Do not print, but write the generated image as preview
    #[arg(short, long, env = "PREVIEW")]
    preview: bool,

    /// Where the preview image is written
    #[arg(short = 'o', long, env = "PREVIEW_OUT", default_value = "preview.png")]
    preview_out: PathBuf,

    /// Printer model
    #[arg(short, long, env = "MODEL", default_value = "ql500")]
    model: Model,

    /// Serial number, when several printers of one model are connected
    #[arg(short, long, env = "SERIAL")]
    serial: Option<String>,

    /// Control logging level
    #[arg(
        short = 'v',
        long = "level",
        env = "LEVEL",
        default_value = "warning",
        value_parser = ["debug", "info", "warn", "warning", "error"]
    )]
    level: String,
}

fn parse_label(s: &str) -> Result<LabelSpec, String> {
    s.parse::<LabelSpec>().map_err(|_| {
        format!(
            "unknown label {:?}, expected one of {}",
            s,
            LabelSpec::ids().collect::<Vec<_>>().join(", ")
        )
    })
}

fn level_filter(name: &str) -> LevelFilter {
    match name {
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" | "warning" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Debug,
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(level_filter(&args.level))
        .format(|buf, record| {
            writeln!(
                buf,
                "| {} | {} [{}:{}]\n{}",
                record.level(),
                record.target(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .init();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{:?}", err);
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<bool, Error> {
    info!("Using label: {}", args.label);

    let image = image::open(&args.image)?;
    let options = ConvertOptions::new()
        .rotate(args.rotate)
        .threshold(args.threshold)
        .preview(args.preview);

    let frame = match args.model.feed(&image, &args.label, &options)? {
        Feed::Preview(preview) => {
            preview.save(&args.preview_out)?;
            println!("Preview written to {}", args.preview_out.display());
            return Ok(true);
        }
        Feed::Job(frame) => frame,
    };

    let transport = match UsbTransport::open(args.model, args.serial.as_deref()) {
        Ok(transport) => transport,
        Err(err) => {
            eprintln!("Printer not found, check connection!");
            return Err(err);
        }
    };
    println!("Using printer: {}", args.model);

    let trace = submit(&transport, &frame)?.ok_or(Error::ReadStatusTimeout)?;
    if !trace.is_valid() {
        warn!("unexpected status report:\n{}", trace);
        return Ok(false);
    }

    let status = trace.status();
    debug!("Parsed Status struct: {:?}", status);
    status.check_error()?;
    if !status.matches_label(&args.label) {
        warn!(
            "installed media ({}mm, {:?}) does not match {}",
            status.media_width, status.media_type, args.label
        );
    }

    Ok(true)
}
