use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "glowline",
    author,
    version,
    about = "Glowing line-art visualizer with bloom and afterglow trails"
)]
pub struct Args {
    /// TOML configuration file (layers, draw parameters, window, timing).
    #[arg(long, value_name = "PATH", env = "GLOWLINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the window or headless render size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<(u32, u32)>,

    /// Override the afterglow factor (0 disables trails).
    #[arg(long, value_name = "FACTOR")]
    pub after_glow: Option<f32>,

    /// Text to lay out on the first layer; requires `--font`.
    #[arg(long, value_name = "TEXT", requires = "font")]
    pub text: Option<String>,

    /// Hershey `.jhf` font used for `--text`.
    #[arg(long, value_name = "PATH")]
    pub font: Option<PathBuf>,

    /// Render without a window and exit after `--frames` frames.
    #[arg(long)]
    pub headless: bool,

    /// Number of frames to render in headless mode.
    #[arg(long, value_name = "COUNT", default_value_t = 60)]
    pub frames: u32,

    /// Write the final headless frame to this PNG file.
    #[arg(long, value_name = "PATH", requires = "headless")]
    pub output: Option<PathBuf>,

    /// Use the CPU reference renderer instead of the GPU (headless only).
    #[arg(long)]
    pub software: bool,
}

pub fn parse() -> Args {
    Args::parse()
}

pub fn parse_surface_size(spec: &str) -> Result<(u32, u32)> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| anyhow::anyhow!("expected WxH format, e.g. 1920x1080"))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid width in size specification"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid height in size specification"))?;

    if width == 0 || height == 0 {
        anyhow::bail!("surface dimensions must be greater than zero");
    }

    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_surface_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_surface_size(" 64 X 32 ").unwrap(), (64, 32));
        assert_eq!(parse_surface_size("800×600").unwrap(), (800, 600));
        assert!(parse_surface_size("1280").is_err());
        assert!(parse_surface_size("0x720").is_err());
        assert!(parse_surface_size("widexhigh").is_err());
    }

    #[test]
    fn parses_headless_run() {
        let args = Args::try_parse_from([
            "glowline",
            "--headless",
            "--frames",
            "4",
            "--size",
            "320x200",
            "--software",
            "--output",
            "out.png",
        ])
        .unwrap();
        assert!(args.headless);
        assert!(args.software);
        assert_eq!(args.frames, 4);
        assert_eq!(args.size, Some((320, 200)));
        assert_eq!(args.output, Some(PathBuf::from("out.png")));
    }

    #[test]
    fn defaults_to_a_window() {
        let args = Args::try_parse_from(["glowline", "--after-glow", "0.3"]).unwrap();
        assert!(!args.headless);
        assert_eq!(args.after_glow, Some(0.3));
        assert_eq!(args.frames, 60);
    }

    #[test]
    fn dependent_flags_need_their_partner() {
        assert!(Args::try_parse_from(["glowline", "--text", "hi"]).is_err());
        assert!(Args::try_parse_from(["glowline", "--output", "x.png"]).is_err());
    }
}
