use clap::Parser;
use regiongen::{GeneratorConfig, NoiseSampler, Progress, RegionCanvas, RegionGenerator, partition_grid};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Разбиение мира на регионы по рельефу и биомам
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Путь к конфигурационному файлу в формате TOML
    #[arg(short, long)]
    config: PathBuf,

    /// Куда сохранить регионы в JSON (по умолчанию: ./regions.json)
    #[arg(short, long, default_value = "regions.json")]
    output: PathBuf,

    /// PNG-превью регионов
    #[arg(long)]
    png: Option<PathBuf>,

    /// PNG с картой высот после выборки
    #[arg(long)]
    elevation_png: Option<PathBuf>,

    /// Переопределяет `seed` из конфигурации
    #[arg(long)]
    seed: Option<u64>,

    /// Пикселей на шаг сетки в превью
    #[arg(long, default_value_t = 4)]
    pixels_per_cell: u32,
}

fn path_str(path: &Path) -> Result<&str, Box<dyn std::error::Error>> {
    Ok(path.to_str().ok_or("path is not valid UTF-8")?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    println!("🔍 Загрузка конфигурации...");
    let mut config = GeneratorConfig::from_toml_file(&cli.config)?;
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    let generator = RegionGenerator::new(config)?;
    let sampler = NoiseSampler::new(generator.config().seed, generator.config().max_height);

    println!(
        "Выборка высот (радиус {}, шаг {})...",
        generator.config().radius,
        generator.config().sample_spacing
    );
    let grid = generator
        .sample(sampler, |percent| println!("  {percent}%"))
        .await?;

    if let Some(path) = &cli.elevation_png {
        println!("Сохранение карты высот в {path:?}");
        grid.save_elevation_png(path_str(path)?)?;
    }

    let domain = grid.domain.clone();
    let regions = partition_grid(grid, generator.config(), |progress| {
        if let Progress::Stage(stage) = progress {
            println!("▶ {stage:?}");
        }
    })
    .await?;

    println!("Сохранение {} регионов в {:?}", regions.len(), cli.output);
    std::fs::write(&cli.output, serde_json::to_string_pretty(&regions)?)?;

    if let Some(path) = &cli.png {
        println!("Сохранение превью в {path:?}");
        RegionCanvas::new(&domain, cli.pixels_per_cell).save_as_png(&regions, path_str(path)?)?;
    }

    println!("\nГотово!");
    Ok(())
}
