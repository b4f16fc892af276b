//
// cargo run -- ABC123 "Widget" --copies 2
//
// Printer address, media and font come from the environment (a local
// .env file is honored):
//
//   PRINTER_URI=usb://04f9:209b
//   LABEL_MEDIA=29
//   LABEL_ROTATE=0
//   LABEL_FONT=/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf
//
use std::env;
use std::path::PathBuf;

use ql_qr_print::{
    DeviceTarget, FontSource, Media, Pipeline, PipelineConfig, PrintRequest, RasterOptions,
    Rotation, UsbPrinter,
};

const DEMO_PAYLOAD: &str = "https://example.com/demo-label";
const DEMO_CAPTION: &str = "Hier koennte Ihre Werbung stehen!";

fn print_usage() {
    println!("Usage: ql-qr-print [--copies N] <payload> [caption]");
    println!("       ql-qr-print --demo [--copies N]");
    println!();
    println!("Environment: PRINTER_URI, LABEL_MEDIA, LABEL_ROTATE, LABEL_FONT");
}

fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{}:{}] {} - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.level(),
                record.args()
            )
        })
        .init();

    let request = match parse_args(env::args().skip(1).collect()) {
        Some(request) => request,
        None => {
            print_usage();
            return;
        }
    };

    match run(request) {
        Ok(copies) => println!("print successfully completed ({} copies)", copies),
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(1);
        }
    }
}

fn parse_args(args: Vec<String>) -> Option<PrintRequest> {
    let mut copies: u32 = 1;
    let mut demo = false;
    let mut positional: Vec<String> = Vec::new();

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return None,
            "--demo" => demo = true,
            "--copies" => match iter.next().and_then(|n| n.parse().ok()) {
                Some(n) => copies = n,
                None => {
                    eprintln!("error: --copies expects a number");
                    return None;
                }
            },
            _ => positional.push(arg),
        }
    }

    if demo {
        return Some(PrintRequest {
            payload: DEMO_PAYLOAD.to_string(),
            caption: DEMO_CAPTION.to_string(),
            copies,
        });
    }

    let mut positional = positional.into_iter();
    let payload = positional.next()?;
    let caption = positional.next().unwrap_or_default();
    Some(PrintRequest {
        payload,
        caption,
        copies,
    })
}

fn run(request: PrintRequest) -> Result<u32, Box<dyn std::error::Error>> {
    let uri = env::var("PRINTER_URI").unwrap_or_else(|_| "usb://04f9:209b".to_string());
    let target: DeviceTarget = uri.parse()?;

    let media_code = env::var("LABEL_MEDIA").unwrap_or_else(|_| "29".to_string());
    let media = Media::from_code(&media_code)?;

    let rotate: u32 = env::var("LABEL_ROTATE")
        .ok()
        .and_then(|r| r.parse().ok())
        .unwrap_or(0);
    let rotation = Rotation::from_degrees(rotate)
        .ok_or_else(|| format!("LABEL_ROTATE must be one of 0, 90, 180, 270; got {}", rotate))?;

    let font = match env::var("LABEL_FONT") {
        Ok(path) => FontSource::File(PathBuf::from(path)),
        Err(_) => FontSource::System,
    };

    let printer = UsbPrinter::open(&target, media, rotation, RasterOptions::default())?;
    let config = PipelineConfig {
        font,
        ..Default::default()
    };

    let mut pipeline = Pipeline::new(config, printer);
    Ok(pipeline.run(&request)?)
}
