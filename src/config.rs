use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tuning knobs of a [`Tileset`](crate::Tileset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TilesetOptions {
    /// Pixels of error above which a tile is refined.
    pub maximum_screen_space_error: f64,
    /// Cap on loads between dispatch and completion.
    pub maximum_simultaneous_tile_loads: u32,
    /// Queue the ancestors of rendered tiles at low priority.
    pub preload_ancestors: bool,
    /// Queue culled siblings of visited tiles at medium priority.
    pub preload_siblings: bool,
    /// Unrenderable descendants a tile may wait on before it is loaded and
    /// rendered in their place.
    pub loading_descendant_limit: u32,
}

impl Default for TilesetOptions {
    fn default() -> Self {
        Self {
            maximum_screen_space_error: 16.0,
            maximum_simultaneous_tile_loads: 10,
            preload_ancestors: true,
            preload_siblings: false,
            loading_descendant_limit: 20,
        }
    }
}

impl TilesetOptions {
    /// Read options from a JSON file; missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Log output format of the host binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[value(name = "text")]
    Text,
    #[value(name = "json")]
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Where the viewer stands. Missing position or target are derived from
/// the root tile once it is known.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    pub position: Option<DVec3>,
    pub target: Option<DVec3>,
    pub up: DVec3,
    pub viewport: DVec2,
    /// Full horizontal field of view in radians.
    pub horizontal_fov: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: None,
            target: None,
            up: DVec3::Z,
            viewport: DVec2::new(1920.0, 1080.0),
            horizontal_fov: 60f64.to_radians(),
        }
    }
}

/// Option values given on the command line, applied on top of the options
/// file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionOverrides {
    pub maximum_screen_space_error: Option<f64>,
    pub maximum_simultaneous_tile_loads: Option<u32>,
    pub loading_descendant_limit: Option<u32>,
    pub no_preload_ancestors: bool,
    pub preload_siblings: bool,
}

/// Fully resolved host configuration (constructed from CLI args).
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub tileset: String,
    pub options_file: Option<PathBuf>,
    pub overrides: OptionOverrides,
    pub camera: CameraConfig,
    pub frames: u32,
    pub frame_interval: Duration,
    pub log_format: LogFormat,
    pub verbose: bool,
    pub threads: Option<usize>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            tileset: String::new(),
            options_file: None,
            overrides: OptionOverrides::default(),
            camera: CameraConfig::default(),
            frames: 600,
            frame_interval: Duration::from_millis(16),
            log_format: LogFormat::Text,
            verbose: false,
            threads: None,
        }
    }
}

impl ViewerConfig {
    /// Options from the file (or defaults) with command-line overrides applied.
    pub fn tileset_options(&self) -> Result<TilesetOptions> {
        let mut options = match &self.options_file {
            Some(path) => TilesetOptions::from_json_file(path)?,
            None => TilesetOptions::default(),
        };

        let o = &self.overrides;
        if let Some(v) = o.maximum_screen_space_error {
            options.maximum_screen_space_error = v;
        }
        if let Some(v) = o.maximum_simultaneous_tile_loads {
            options.maximum_simultaneous_tile_loads = v;
        }
        if let Some(v) = o.loading_descendant_limit {
            options.loading_descendant_limit = v;
        }
        if o.no_preload_ancestors {
            options.preload_ancestors = false;
        }
        if o.preload_siblings {
            options.preload_siblings = true;
        }
        Ok(options)
    }
}

/// CLI argument definition (clap derive).
#[derive(Parser, Debug)]
#[command(
    name = "tile-streamer",
    about = "Stream a 3D Tiles tileset and report level-of-detail selection per frame",
    version
)]
pub struct CliArgs {
    /// Path or file:// URL of tileset.json
    #[arg(short = 't', long)]
    pub tileset: String,

    /// JSON file with tileset options (camelCase keys)
    #[arg(long)]
    pub options: Option<PathBuf>,

    /// Maximum screen-space error in pixels
    #[arg(long)]
    pub max_sse: Option<f64>,

    /// Maximum simultaneous tile loads
    #[arg(long)]
    pub max_loads: Option<u32>,

    /// Loading descendant limit
    #[arg(long)]
    pub loading_descendant_limit: Option<u32>,

    /// Do not preload ancestors of rendered tiles
    #[arg(long)]
    pub no_preload_ancestors: bool,

    /// Preload culled siblings of visited tiles
    #[arg(long)]
    pub preload_siblings: bool,

    /// Camera position x,y,z (default: derived from the root tile)
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub position: Option<Vec<f64>>,

    /// Camera target x,y,z (default: root tile centre)
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub target: Option<Vec<f64>>,

    /// Camera up vector x,y,z
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub up: Option<Vec<f64>>,

    /// Viewport width in pixels
    #[arg(long, default_value_t = 1920)]
    pub width: u32,

    /// Viewport height in pixels
    #[arg(long, default_value_t = 1080)]
    pub height: u32,

    /// Horizontal field of view in degrees
    #[arg(long, default_value_t = 60.0)]
    pub fov: f64,

    /// Maximum number of frames to run
    #[arg(long, default_value_t = 600)]
    pub frames: u32,

    /// Milliseconds between frames
    #[arg(long, default_value_t = 16)]
    pub frame_interval_ms: u64,

    /// Log format: text or json
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Decoder thread count (default: rayon global pool)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,
}

fn to_vec3(values: Option<Vec<f64>>) -> Option<DVec3> {
    match values.as_deref() {
        Some([x, y, z]) => Some(DVec3::new(*x, *y, *z)),
        _ => None,
    }
}

impl From<CliArgs> for ViewerConfig {
    fn from(args: CliArgs) -> Self {
        ViewerConfig {
            tileset: args.tileset,
            options_file: args.options,
            overrides: OptionOverrides {
                maximum_screen_space_error: args.max_sse,
                maximum_simultaneous_tile_loads: args.max_loads,
                loading_descendant_limit: args.loading_descendant_limit,
                no_preload_ancestors: args.no_preload_ancestors,
                preload_siblings: args.preload_siblings,
            },
            camera: CameraConfig {
                position: to_vec3(args.position),
                target: to_vec3(args.target),
                up: to_vec3(args.up).unwrap_or(DVec3::Z),
                viewport: DVec2::new(f64::from(args.width), f64::from(args.height)),
                horizontal_fov: args.fov.to_radians(),
            },
            frames: args.frames,
            frame_interval: Duration::from_millis(args.frame_interval_ms),
            log_format: args.log_format,
            verbose: args.verbose,
            threads: args.threads,
        }
    }
}
