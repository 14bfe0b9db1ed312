use std::path::PathBuf;

use clap::{Parser, Subcommand};
use common::{
    bench::bench_reader_by_name,
    config::FormatterConfig,
    event::{Event, EventSink},
    sensor::resource_reader_by_name,
};
use eyre::{Context, Result, bail};
use formatter::{
    Formatter, RunStatus,
    artifact::{latency_throughput, resource_details},
};
use tokio::fs::read_to_string;
use tracing::error;
use tracing_subscriber::{
    EnvFilter,
    fmt::{layer, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const MODULES: &[&str] = &["formatter", "common", "fio", "fio_cpu", "collectl"];

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long)]
    log: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarise every test run in an archive
    Format {
        /// Root of the benchmark archive
        #[arg(short, long)]
        archive: PathBuf,
        #[arg(short, long)]
        config_file: Option<PathBuf>,
        /// Shards are named `<filename_root>.<N>`
        #[arg(long)]
        filename_root: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Regenerate summaries that already exist
        #[arg(long, default_value_t = false)]
        force_refresh: bool,
        /// Benchmark reader, ie. Fio
        #[arg(long)]
        benchmark: Option<String>,
        /// Resource reader, ie. FioCpu or Collectl
        #[arg(long)]
        resource: Option<String>,
    },
    /// Print the headline figures of a summary
    Show {
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or("info".to_owned());
    let args = Cli::parse();
    let file_appender = tracing_appender::rolling::never(".", "log.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let mut env_filter = EnvFilter::new(format!("bench_summary={log_level}"));

    if !args.log.is_empty() {
        for log in &args.log {
            env_filter = env_filter.add_directive(log.parse()?);
        }
    }

    for module in MODULES {
        if !args.log.iter().any(|x| x.starts_with(module)) {
            env_filter = env_filter.add_directive(format!("{module}={log_level}").parse()?);
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            layer()
                .with_timer(ChronoLocal::new("%v %k:%M:%S %z".to_owned()))
                .compact(),
        )
        .with(layer().with_writer(non_blocking))
        .init();

    formatter::init_readers();

    match args.command {
        Commands::Format {
            archive,
            config_file,
            filename_root,
            output,
            force_refresh,
            benchmark,
            resource,
        } => {
            let mut config = match config_file {
                Some(file) => load_config(&file).await?,
                None => FormatterConfig::default(),
            };
            if let Some(filename_root) = filename_root {
                config.filename_root = filename_root;
            }
            if output.is_some() {
                config.output_directory = output;
            }
            config.force_refresh |= force_refresh;
            if let Some(name) = benchmark {
                config.benchmark = Some(bench_reader_by_name(&name)?);
            }
            if let Some(name) = resource {
                config.resource = Some(resource_reader_by_name(&name)?);
            }

            if let Err(err) = format(archive, config).await {
                error!("{err:#?}");
                return Err(err);
            }
        }
        Commands::Show { file } => show(&file)?,
    };

    Ok(())
}

async fn load_config(file: &PathBuf) -> Result<FormatterConfig> {
    let contents = read_to_string(file)
        .await
        .wrap_err_with(|| format!("Could not read {}", file.display()))?;
    serde_yml::from_str(&contents).wrap_err_with(|| format!("Invalid config {}", file.display()))
}

async fn format(archive: PathBuf, config: FormatterConfig) -> Result<()> {
    let (tx, rx) = flume::unbounded();
    let formatter = Formatter::new(archive, config, EventSink::new(tx));
    let outcomes = formatter.convert_all().await?;

    let skipped = rx
        .drain()
        .filter(|x| {
            matches!(
                x,
                Event::EmptyFile { .. } | Event::PreconditionFile { .. } | Event::SkippedFile { .. }
            )
        })
        .count();

    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.status {
            Ok(RunStatus::Written(path)) => println!("{} -> {}", outcome.identity, path.display()),
            Ok(RunStatus::Skipped(path)) => {
                println!("{} -> {} (exists)", outcome.identity, path.display())
            }
            Err(_) => failed += 1,
        }
    }
    println!(
        "{} test runs, {failed} failed, {skipped} files skipped",
        outcomes.len()
    );

    if failed > 0 {
        bail!("{failed} test runs could not be summarised");
    }
    Ok(())
}

fn show(file: &PathBuf) -> Result<()> {
    let (throughput, latency) = latency_throughput(file)?;
    let (cpu, memory) = resource_details(file)?;
    println!("Throughput: {throughput}");
    println!("Latency: {latency} ms");
    println!("CPU: {cpu}%");
    println!("Memory: {memory} MB");
    Ok(())
}
