use anyhow::Result;
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use statemap::commons::basic_functions::{title_case, validate_state_name};
use statemap::{MapError, PipelineConfig, StateMap};

/// Contour-line SVG map of a US state from SRTM elevation tiles
#[derive(Parser, Debug)]
#[command(name = "statemap", version)]
struct Args {
    /// State name, e.g. "texas" or "new mexico"
    state_name: String,
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Tile cache directory (default: $HOME/.cache/elevation/SRTM1)
    #[arg(long)]
    cache_root: Option<PathBuf>,
    /// Directory receiving the state folder, mosaic and SVG files
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Keep the clipped tiles in the cache after the run
    #[arg(long, default_value_t = false)]
    keep_clipped: bool,
}

/// Why the command line stops before running the pipeline
#[derive(Debug)]
enum Stop {
    /// Help, version or a usage error, printed by clap
    Usage(clap::Error),
    InvalidState(MapError),
}

impl Stop {
    fn exit_code(&self) -> u8 {
        match self {
            Stop::Usage(e) if !e.use_stderr() => 0,
            _ => 1,
        }
    }

    fn report(&self) {
        match self {
            Stop::Usage(e) => {
                let _ = e.print();
            }
            Stop::InvalidState(e) => println!("{}", e),
        }
    }
}

/// Parse the command line and title-case the state name
fn parse_args<I, T>(argv: I) -> std::result::Result<(Args, String), Stop>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = Args::try_parse_from(argv).map_err(Stop::Usage)?;
    let state_name = title_case(&args.state_name);
    if !validate_state_name(&state_name) {
        return Err(Stop::InvalidState(MapError::InvalidStateName(state_name)));
    }
    Ok((args, state_name))
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(cache_root) = &args.cache_root {
        config.cache_root = cache_root.clone();
    }
    if let Some(output_dir) = &args.output_dir {
        config.output_dir = output_dir.clone();
    }
    if args.keep_clipped {
        config.keep_clipped_tiles = true;
    }
    Ok(config)
}

fn run(args: &Args, state_name: &str) -> Result<()> {
    let config = load_config(args)?;
    let summary = StateMap::from_config(config)?.run(state_name)?;

    println!("Clipped tiles: {}", summary.tiles.len());
    println!("Boundary SVG saved to {}", summary.boundary_svg.display());
    println!("Merged TIFF saved to {}", summary.merged_tif.display());
    if let Some(shp) = &summary.contours_shp {
        println!("Contour shapefile saved to {}", shp.display());
    }
    println!(
        "Contour SVG saved to {} ({} lines, {}x{})",
        summary.contours_svg.display(),
        summary.contour_count,
        summary.svg_size.0,
        summary.svg_size.1
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (args, state_name) = match parse_args(std::env::args_os()) {
        Ok(parsed) => parsed,
        Err(stop) => {
            stop.report();
            return ExitCode::from(stop.exit_code());
        }
    };

    match run(&args, &state_name) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_state_name_is_title_cased() {
        let (args, state_name) = parse_args(["statemap", "new mexico"]).unwrap();
        assert_eq!(args.state_name, "new mexico");
        assert_eq!(state_name, "New Mexico");
    }

    #[test]
    fn test_missing_state_name_exits_with_one() {
        let stop = parse_args(["statemap"]).unwrap_err();
        assert!(matches!(&stop, Stop::Usage(e) if e.kind() == ErrorKind::MissingRequiredArgument));
        assert_eq!(stop.exit_code(), 1);
    }

    #[test]
    fn test_unknown_state_exits_with_one() {
        let stop = parse_args(["statemap", "atlantis"]).unwrap_err();
        let Stop::InvalidState(err) = &stop else {
            panic!("expected an invalid state, got {:?}", stop);
        };
        assert_eq!(err.to_string(), "'Atlantis' is not a valid US state name.");
        assert_eq!(stop.exit_code(), 1);
    }

    #[test]
    fn test_help_exits_with_zero() {
        let stop = parse_args(["statemap", "--help"]).unwrap_err();
        assert_eq!(stop.exit_code(), 0);
    }

    #[test]
    fn test_flags_override_config() {
        let (args, _) = parse_args([
            "statemap",
            "ohio",
            "--cache-root",
            "/tmp/tiles",
            "--output-dir",
            "/tmp/maps",
            "--keep-clipped",
        ])
        .unwrap();
        let config = load_config(&args).unwrap();
        assert_eq!(config.cache_root, PathBuf::from("/tmp/tiles"));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/maps"));
        assert!(config.keep_clipped_tiles);
    }
}
