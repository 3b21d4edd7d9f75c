use clap::{Parser, Subcommand};
use meshstream::config::AppConfig;
use meshstream::metadata::HttpMetadata;
use meshstream::server::Listener;
use meshstream::source::{HttpSource, RawMeshDecoder, TimestepSource};
use meshstream::{ViewingSession, logger};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "meshstream", version, about = "Range file server and prefetching timestep client", long_about = None)]
struct Cli {
    #[arg(long, help = "Path to a config file (TOML). If omitted, the usual locations are searched.")]
    config: Option<PathBuf>,
    #[arg(long, help = "Write rolling log files to this directory instead of stderr")]
    log_dir: Option<PathBuf>,
    #[arg(long, help = "Log level: error|warn|info|debug|trace")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Serve snapshot files from a data directory with byte-range support")]
    Serve {
        #[arg(long, help = "Directory holding the snapshot files")]
        data_root: Option<PathBuf>,
        #[arg(long, help = "Address to listen on (e.g., 127.0.0.1:3000)")]
        bind: Option<SocketAddr>,
        #[arg(long, help = "JSON file served at /api/metadata")]
        metadata: Option<PathBuf>,
    },
    #[command(about = "Play through timesteps from a server and report cache behavior")]
    Fetch {
        #[arg(long, help = "Server base URL (e.g., http://127.0.0.1:3000)")]
        base_url: Option<String>,
        #[arg(long, default_value_t = 0, help = "First timestep to load")]
        start: usize,
        #[arg(long, default_value_t = 10, help = "Number of timesteps to step through")]
        steps: usize,
        #[arg(long, help = "Wrap around at the last timestep")]
        looping: bool,
    },
    #[command(about = "Print the effective configuration as TOML")]
    Config,
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut cfg = match AppConfig::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };
    if cli.log_dir.is_some() {
        cfg.logging.dir = cli.log_dir.clone();
    }
    if cli.log_level.is_some() {
        cfg.logging.level = cli.log_level.clone();
    }
    init_logging(&cfg);

    let r = match cli.command {
        Commands::Serve { data_root, bind, metadata } => {
            if let Some(root) = data_root {
                cfg.server.data_root = root;
            }
            if let Some(addr) = bind {
                cfg.server.bind = addr;
            }
            if metadata.is_some() {
                cfg.server.metadata_file = metadata;
            }
            serve(&cfg).await
        }
        Commands::Fetch { base_url, start, steps, looping } => {
            if let Some(url) = base_url {
                cfg.client.base_url = url;
            }
            fetch(&cfg, start, steps, looping).await
        }
        Commands::Config => cfg.to_toml_string().map(|s| print!("{s}")).map_err(Into::into),
    };
    if let Err(e) = r {
        log::error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(cfg: &AppConfig) {
    let level = cfg.logging.level.as_deref().unwrap_or("info");
    let res = match &cfg.logging.dir {
        Some(dir) => logger::configure_logging(Some(dir), Some(level), cfg.logging.retention),
        None => logger::init_console(level),
    };
    if let Err(e) = res {
        eprintln!("warning: logging not initialized: {e}");
    }
}

async fn serve(cfg: &AppConfig) -> CliResult {
    let listener = Listener::bind(&cfg.server).await?;
    println!("Serving {} on http://{}", cfg.server.data_root.display(), listener.local_addr()?);
    listener
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

async fn fetch(cfg: &AppConfig, start: usize, steps: usize, looping: bool) -> CliResult {
    let source: Arc<dyn TimestepSource> = Arc::new(HttpSource::with_config(&cfg.client)?);
    let metadata = HttpMetadata::new(&cfg.client.base_url);
    let mut session = ViewingSession::start(cfg.cache.clone(), source, RawMeshDecoder, &metadata).await?;
    session.set_looping(looping);
    println!("{} timesteps available", session.metadata().total_timesteps);

    let began = Instant::now();
    let mut shown = 0;
    let mut next = Some(session.seek(start).await);
    while let Some(loaded) = next {
        let mesh = loaded?;
        println!(
            "timestep {:>5}  {:>10} bytes  t+{:.1} ms",
            mesh.index,
            mesh.bytes.len(),
            began.elapsed().as_secs_f64() * 1000.0
        );
        shown += 1;
        if shown >= steps {
            break;
        }
        next = session.step_forward().await;
    }

    let m = session.end();
    println!(
        "hits={} misses={} hit_rate={:.2} fetches={} deduplicated={} prefetched={} evictions={} bytes={}",
        m.hits,
        m.misses,
        m.hit_rate(),
        m.fetches,
        m.deduplicated,
        m.prefetch_scheduled,
        m.evictions,
        m.bytes_fetched
    );
    Ok(())
}
