use clap::{Parser, Subcommand};
use terrain_core::io::binary::{load_binary, save_binary, RecordLayout};
use terrain_core::io::project::{read_terrain_json, write_terrain_json, TerrainDocument};
use terrain_core::io::read_to_string;
use terrain_core::{
    InterpolationMethod, Point3, PointMatch, Result, TerrainConfig, TerrainError, TerrainModel,
    TerrainPoint,
};

/// Command line interface for terrain point clouds.
#[derive(Parser)]
#[command(name = "terrain_cli", version)]
struct Cli {
    /// JSON file with interpolation and triangulation settings
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print surface statistics of a terrain JSON file.
    Stats {
        path: String,
        /// Base elevation for the volume (defaults to the lowest point)
        #[arg(long, allow_hyphen_values = true)]
        base: Option<f64>,
        /// Print the statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interpolate the elevation at x,y.
    Interpolate {
        path: String,
        #[arg(allow_hyphen_values = true)]
        x: f64,
        #[arg(allow_hyphen_values = true)]
        y: f64,
        /// barycentric or idw
        #[arg(long, default_value = "barycentric")]
        method: String,
    },
    /// List the k points nearest to x,y,z.
    Nearest {
        path: String,
        #[arg(allow_hyphen_values = true)]
        x: f64,
        #[arg(allow_hyphen_values = true)]
        y: f64,
        #[arg(allow_hyphen_values = true)]
        z: f64,
        #[arg(short, long, default_value_t = 1)]
        k: usize,
    },
    /// List the points within a radius of x,y,z.
    Radius {
        path: String,
        #[arg(allow_hyphen_values = true)]
        x: f64,
        #[arg(allow_hyphen_values = true)]
        y: f64,
        #[arg(allow_hyphen_values = true)]
        z: f64,
        radius: f64,
    },
    /// Sample the surface on a regular grid and write id,x,y,z rows.
    Grid {
        path: String,
        output: String,
        /// Grid spacing (defaults to an estimate from the point spacing)
        #[arg(long)]
        resolution: Option<f64>,
    },
    /// Convert an id,x,y,z CSV file to a terrain JSON file.
    ImportCsv {
        input: String,
        output: String,
        #[arg(long, default_value = "terrain")]
        name: String,
    },
    /// Write the points of a terrain JSON file as a binary point cloud.
    Encode {
        input: String,
        output: String,
        /// Use 10-byte centimetric records instead of 32-byte exact ones
        #[arg(long)]
        quantized: bool,
    },
    /// Convert a binary point cloud to a terrain JSON file.
    Decode {
        input: String,
        output: String,
        #[arg(long)]
        quantized: bool,
        #[arg(long, default_value = "terrain")]
        name: String,
    },
}

fn layout(quantized: bool) -> RecordLayout {
    if quantized {
        RecordLayout::Quantized
    } else {
        RecordLayout::Full
    }
}

fn load_model(path: &str, config: &TerrainConfig) -> Result<TerrainModel> {
    let model: TerrainModel = read_terrain_json(path)?.into_model(config.clone())?;
    log::info!(
        "loaded {} points and {} break lines from {}",
        model.len(),
        model.break_lines().len(),
        path
    );
    Ok(model)
}

fn read_points_csv(path: &str) -> Result<Vec<TerrainPoint>> {
    let contents = read_to_string(path)?;
    let mut pts = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(TerrainError::Format(format!(
                "line {}: expected id,x,y,z",
                idx + 1
            )));
        }
        let id = parts[0]
            .parse::<u64>()
            .map_err(|e| TerrainError::Format(format!("line {}: {}", idx + 1, e)))?;
        let mut coords = [0.0; 3];
        for (c, part) in coords.iter_mut().zip(&parts[1..]) {
            *c = part
                .parse::<f64>()
                .map_err(|e| TerrainError::Format(format!("line {}: {}", idx + 1, e)))?;
        }
        pts.push(TerrainPoint::new(id, coords[0], coords[1], coords[2])?);
    }
    Ok(pts)
}

fn write_points_csv(path: &str, points: &[TerrainPoint]) -> Result<()> {
    let mut out = String::new();
    for p in points {
        out.push_str(&format!("{},{},{},{}\n", p.id(), p.x(), p.y(), p.z()));
    }
    terrain_core::io::write_string(path, &out)?;
    Ok(())
}

fn print_match(m: &PointMatch) {
    println!(
        "{},{:.3},{:.3},{:.3},{:.3}",
        m.point.id(),
        m.point.x(),
        m.point.y(),
        m.point.z(),
        m.distance
    );
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => TerrainConfig::load(path)?,
        None => TerrainConfig::default(),
    };
    match cli.command {
        Commands::Stats { path, base, json } => {
            let stats = load_model(&path, &config)?.statistics(base)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Points: {}", stats.point_count);
                println!("Triangles: {}", stats.triangle_count);
                println!("Surface area: {:.3}", stats.surface_area);
                println!("Projected area: {:.3}", stats.projected_area);
                println!("Volume: {:.3}", stats.volume);
                println!("Mean slope: {:.3}", stats.mean_slope_deg);
                println!("Max slope: {:.3}", stats.max_slope_deg);
                println!("Mean elevation: {:.3}", stats.mean_elevation);
                println!("Rugosity: {:.3}", stats.rugosity);
            }
        }
        Commands::Interpolate { path, x, y, method } => {
            let method: InterpolationMethod = method.parse()?;
            let z = load_model(&path, &config)?.interpolate(x, y, method)?;
            println!("Elevation: {:.3}", z);
        }
        Commands::Nearest { path, x, y, z, k } => {
            for m in load_model(&path, &config)?.nearest(Point3::new(x, y, z), k)? {
                print_match(&m);
            }
        }
        Commands::Radius {
            path,
            x,
            y,
            z,
            radius,
        } => {
            for m in load_model(&path, &config)?.within_radius(Point3::new(x, y, z), radius)? {
                print_match(&m);
            }
        }
        Commands::Grid {
            path,
            output,
            resolution,
        } => {
            let model = load_model(&path, &config)?;
            let resolution = resolution.unwrap_or_else(|| model.estimate_resolution());
            let grid = model.dense_grid(resolution)?;
            write_points_csv(&output, &grid)?;
            println!("Wrote {} grid points to {}", grid.len(), output);
        }
        Commands::ImportCsv {
            input,
            output,
            name,
        } => {
            let points = read_points_csv(&input)?;
            let doc = TerrainDocument {
                name,
                points,
                break_lines: Vec::new(),
            };
            // validates ids before writing
            let model: TerrainModel = doc.clone().into_model(config)?;
            write_terrain_json(&output, &doc)?;
            println!("Imported {} points to {}", model.len(), output);
        }
        Commands::Encode {
            input,
            output,
            quantized,
        } => {
            let model = load_model(&input, &config)?;
            save_binary(&output, model.store(), layout(quantized))?;
            println!("Encoded {} points to {}", model.len(), output);
        }
        Commands::Decode {
            input,
            output,
            quantized,
            name,
        } => {
            let store: terrain_core::PointStore = load_binary(&input, layout(quantized))?;
            let doc = TerrainDocument {
                name,
                points: store.iter().collect(),
                break_lines: Vec::new(),
            };
            write_terrain_json(&output, &doc)?;
            println!("Decoded {} points to {}", store.len(), output);
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
