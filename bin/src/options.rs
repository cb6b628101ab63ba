//! Command line options

use clap::Parser;
use device::KernelIsa;
use log::LevelFilter;
use std::str::FromStr;

lazy_static! {
    /// The global application options.
    pub static ref OPTIONS: Options = Options::parse();
}

/// Image size given as `WIDTHxHEIGHT`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub width: usize,
    pub height: usize,
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(|c| c == 'x' || c == 'X')
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| format!("invalid dimension '{v}'"))
        };
        Ok(Self {
            width: parse(w)?,
            height: parse(h)?,
        })
    }
}

/// System wide options.
#[derive(Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Options {
    /// Number of threads to use for rendering.
    #[clap(
        long = "nthreads",
        short = 't',
        value_name = "NUM",
        default_value_t = 0,
        help = "Use specified number of threads for rendering (0 uses all logical cores)."
    )]
    n_threads: usize,

    /// Tile size.
    #[clap(
        long = "tilesize",
        short = 'p',
        value_name = "NUM",
        default_value_t = 32,
        help = "Size in pixels of square tiles rendered per thread."
    )]
    pub tile_size: usize,

    /// Samples per pixel.
    #[clap(
        long = "spp",
        short = 's',
        value_name = "NUM",
        default_value_t = 16,
        help = "Number of samples per pixel."
    )]
    pub samples: u32,

    /// Image size.
    #[clap(
        long = "resolution",
        value_name = "WxH",
        default_value = "640x360",
        help = "Image resolution in pixels."
    )]
    pub resolution: Resolution,

    /// Hard bounce limit.
    #[clap(
        long = "max-bounce",
        value_name = "NUM",
        default_value_t = 8,
        help = "Maximum number of bounces of a path."
    )]
    pub max_bounce: u32,

    /// Bounces before Russian roulette.
    #[clap(
        long = "min-bounce",
        value_name = "NUM",
        default_value_t = 3,
        help = "Number of bounces before paths may be terminated early."
    )]
    pub min_bounce: u32,

    /// Path to the image file.
    #[clap(
        long = "outfile",
        short = 'o',
        value_name = "FILE",
        default_value = "lumen.png",
        help = "Write the final image to the given filename (.png or .exr)."
    )]
    pub image_file: String,

    /// Kernel tier override.
    #[clap(
        long = "isa",
        value_name = "ISA",
        help = "Use the kernels of the given instruction set (scalar, sse2, sse3, sse41, avx, avx2)."
    )]
    pub isa: Option<KernelIsa>,

    /// Render time limit in seconds.
    #[clap(
        long = "time-limit",
        value_name = "SECONDS",
        help = "Stop rendering after the given number of seconds."
    )]
    pub time_limit: Option<f64>,

    /// Write denoising feature passes.
    #[clap(long = "denoising-passes", help = "Write denoising feature passes.")]
    pub denoising_passes: bool,

    /// Write light passes.
    #[clap(
        long = "light-passes",
        help = "Write emission, background and per-closure direct and indirect light passes."
    )]
    pub light_passes: bool,

    /// Cryptomatte depth.
    #[clap(
        long = "cryptomatte-depth",
        value_name = "NUM",
        default_value_t = 0,
        help = "Number of cryptomatte (id, coverage) pairs per layer; 0 disables cryptomatte."
    )]
    pub cryptomatte_depth: usize,

    /// Image file for the floor colour.
    #[clap(long = "texture", value_name = "FILE", help = "Use the image as the floor colour.")]
    pub texture: Option<String>,

    /// Log level.
    #[clap(
        long = "log-level",
        value_name = "LEVEL",
        help = "Log level (off, error, warn, info, debug, trace); overrides RUST_LOG."
    )]
    pub log_level: Option<LevelFilter>,

    /// Suppress all text output other than error messages.
    #[clap(long, help = "Suppress all text output other than error messages.")]
    pub quiet: bool,
}

impl Options {
    /// Returns the number of threads to use; 0 uses every logical core.
    pub fn threads(&self) -> usize {
        let max_threads = num_cpus::get();
        match self.n_threads {
            0 => max_threads,
            n if n > max_threads => {
                warn!("Num threads > max logical CPUs {}", max_threads);
                max_threads
            }
            n => n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_parses() {
        assert_eq!(
            "320x240".parse::<Resolution>(),
            Ok(Resolution {
                width: 320,
                height: 240
            })
        );
        assert!("320".parse::<Resolution>().is_err());
        assert!("0x240".parse::<Resolution>().is_err());
    }

    #[test]
    fn flags_parse() {
        let options = Options::parse_from([
            "lumen",
            "-t",
            "2",
            "-s",
            "4",
            "--resolution",
            "64x32",
            "--isa",
            "sse2",
            "--time-limit",
            "1.5",
            "--cryptomatte-depth",
            "4",
            "--light-passes",
            "-o",
            "out.exr",
        ]);
        assert_eq!(options.samples, 4);
        assert_eq!(options.resolution.width, 64);
        assert_eq!(options.isa, Some(KernelIsa::Sse2));
        assert_eq!(options.time_limit, Some(1.5));
        assert_eq!(options.image_file, "out.exr");
        assert!(options.light_passes);
        assert!(options.threads() >= 1);
    }
}
