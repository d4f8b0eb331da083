use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use serde_json::json;

use vid_preview::backend::ffmpeg::FfmpegBackend;
use vid_preview::{ConvertRequest, Converter, FrameSize, TaskEvent};

const USAGE: &str = "usage: vid-preview <source> <dest> <max-width> <max-height> [--json]";

#[derive(Debug)]
struct CliArgs {
    source: PathBuf,
    dest: PathBuf,
    bounds: FrameSize,
    json: bool,
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut positional = Vec::new();
    let mut json = false;
    for arg in args {
        match arg.as_str() {
            "--json" => json = true,
            other if other.starts_with("--") => {
                return Err(format!("unknown option: {}", other));
            }
            _ => positional.push(arg.clone()),
        }
    }
    if positional.len() != 4 {
        return Err(format!(
            "expected 4 arguments, got {}",
            positional.len()
        ));
    }
    let width: u32 = positional[2]
        .parse()
        .map_err(|_| format!("invalid max-width: {}", positional[2]))?;
    let height: u32 = positional[3]
        .parse()
        .map_err(|_| format!("invalid max-height: {}", positional[3]))?;
    if width == 0 || height == 0 {
        return Err("bounding box dimensions must be positive".to_string());
    }
    Ok(CliArgs {
        source: PathBuf::from(&positional[0]),
        dest: PathBuf::from(&positional[1]),
        bounds: FrameSize::new(width, height),
        json,
    })
}

fn emit_json_event(value: serde_json::Value) {
    println!("{}", value);
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(msg) => {
            eprintln!("{}", msg);
            eprintln!("{}", USAGE);
            return ExitCode::from(2);
        }
    };
    let json = cli.json;

    let converter = Converter::new(Arc::new(FfmpegBackend));
    let handle = match converter.start_conversion(ConvertRequest::new(
        cli.source, cli.dest, cli.bounds,
    )) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut outcome = ExitCode::FAILURE;
    for event in handle.events().iter() {
        match event {
            TaskEvent::Progress(percent) => {
                if json {
                    emit_json_event(json!({ "event": "progress", "percent": percent }));
                } else {
                    eprint!("\r{:3}%", percent);
                }
            }
            TaskEvent::Finished(result) => {
                if json {
                    emit_json_event(json!({
                        "event": "finished",
                        "error": result.as_ref().err(),
                    }));
                } else {
                    eprintln!();
                }
                match result {
                    Ok(()) => outcome = ExitCode::SUCCESS,
                    Err(e) => {
                        if !json {
                            eprintln!("{}", e);
                        }
                        outcome = ExitCode::FAILURE;
                    }
                }
                break;
            }
        }
    }
    outcome
}
