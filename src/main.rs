//! graphite-render CLI
//!
//! - `serve`: run the HTTP render API
//! - `render`: evaluate targets once and print the result
//! - `find`: list nodes matching a pattern
//! - `config`: print or write a default configuration file

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use graphite_render::api::{serve, AppState};
use graphite_render::config::{generate_default_config, init_logging, Config};
use graphite_render::query::{args_from_params, consolidate_to_max_points, Evaluator};
use graphite_render::render::{serialize, OutputFormat, SerializeOptions};

#[derive(Parser)]
#[command(name = "graphite-render")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Graphite-compatible render API over pluggable metric finders")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: $GRAPHITE_RENDER_CONFIG or the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        /// Override the configured host
        #[arg(long)]
        host: Option<String>,
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Evaluate targets and print the result
    Render {
        /// Target expressions
        #[arg(required = true)]
        targets: Vec<String>,
        /// Start of the window (e.g. -1h, 07:00_20140226)
        #[arg(long, default_value = "-1d")]
        from: String,
        /// End of the window
        #[arg(long, default_value = "now")]
        until: String,
        /// Timezone for the window and csv output
        #[arg(long)]
        tz: Option<String>,
        /// Output format (json, raw, csv, dygraph, rickshaw)
        #[arg(short, long, default_value = "json")]
        format: String,
        /// Consolidate each series to at most this many points
        #[arg(long)]
        max_data_points: Option<usize>,
        /// Template bindings in key=value form
        #[arg(short = 'T', long = "template")]
        templates: Vec<String>,
    },

    /// List nodes matching a pattern
    Find {
        /// Metric path pattern
        pattern: String,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content).with_context(|| format!("writing {:?}", path))?;
                println!("Config written to {:?}", path);
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default()?,
    };
    init_logging(&config.logging);

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.api.host = host;
            }
            if let Some(port) = port {
                config.api.port = port;
            }

            tracing::info!("Starting graphite-render v{}", env!("CARGO_PKG_VERSION"));
            let evaluator = Arc::new(config.build_evaluator()?);
            tracing::info!(
                finders = ?evaluator.store().finder_names(),
                functions = evaluator.registry().len(),
                "store ready"
            );

            let state = AppState::new(evaluator, config.resolver()?, config.api.clone());
            serve(state, &config.api).await?;
        }

        Commands::Render {
            targets,
            from,
            until,
            tz,
            format,
            max_data_points,
            templates,
        } => {
            let format = match OutputFormat::parse(&format) {
                Some(f) if !f.is_image() => f,
                _ => bail!("unsupported output format '{}'", format),
            };

            let mut bindings = Vec::with_capacity(templates.len());
            for binding in &templates {
                let Some((key, value)) = binding.split_once('=') else {
                    bail!("template binding '{}' is not key=value", binding);
                };
                bindings.push((key, value));
            }

            let evaluator = config.build_evaluator()?;
            let window = config
                .resolver()?
                .resolve(Some(from.as_str()), Some(until.as_str()), tz.as_deref(), Utc::now())?;

            let template_args = args_from_params(bindings);
            let exprs = targets
                .iter()
                .map(|t| Evaluator::prepare(t, &template_args))
                .collect::<Result<Vec<_>, _>>()?;
            let mut series = evaluator.evaluate_all(&exprs, &window).await?;
            if let Some(max) = max_data_points.filter(|m| *m > 0) {
                series = series.iter().map(|s| consolidate_to_max_points(s, max)).collect();
            }

            let options = SerializeOptions {
                tz: window.tz,
                ..Default::default()
            };
            let rendered = serialize(format, &series, &options)?;
            println!("{}", rendered.text());
        }

        Commands::Find { pattern } => {
            let store = config.build_store()?;
            for node in store.find(&pattern).await? {
                let kind = if node.is_leaf { "leaf" } else { "branch" };
                println!("{}\t{}", kind, node.path);
            }
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}
