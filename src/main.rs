use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{Attribute, Cell, Table};
use scholar_hub::config::{find_config_file, load_config, Config, LogFormat};
use scholar_hub::mcp::McpServer;
use scholar_hub::models::{CitationNetwork, Paper};
use scholar_hub::service::{Lookup, PaperService, ServiceStatus};
use std::io::IsTerminal;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Scholar Hub - aggregate academic papers and citation networks from multiple sources
#[derive(Parser, Debug)]
#[command(name = "scholar-hub")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Aggregate academic papers and citation networks from multiple sources", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, short, value_enum, global = true, default_value_t = OutputFormat::Auto)]
    output: OutputFormat,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Automatic based on terminal (table if TTY, JSON otherwise)
    Auto,
    /// Table format (human-readable)
    Table,
    /// JSON format (machine-readable)
    Json,
    /// Plain text format
    Plain,
}

impl OutputFormat {
    fn resolve(self) -> Self {
        match self {
            OutputFormat::Auto if std::io::stdout().is_terminal() => OutputFormat::Table,
            OutputFormat::Auto => OutputFormat::Json,
            other => other,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch one paper by id (DOI, Semantic Scholar id, OpenAlex id, arXiv:...)
    #[command(alias = "p")]
    Paper {
        id: String,

        /// DOI hint for sources that do not know the id
        #[arg(long)]
        doi: Option<String>,
    },

    /// Show the papers citing and cited by a paper
    #[command(alias = "c")]
    Citations {
        id: String,

        #[arg(long)]
        doi: Option<String>,
    },

    /// Search every source and merge duplicates
    #[command(alias = "s")]
    Search {
        query: String,

        /// Maximum number of merged results
        #[arg(long, short, default_value_t = 10)]
        limit: usize,
    },

    /// Resolve the input as an id when it looks like one, otherwise search
    Lookup {
        input: String,

        #[arg(long, short, default_value_t = 10)]
        limit: usize,
    },

    /// List configured sources and their capabilities
    Sources,

    /// Print the effective configuration as TOML
    Config,

    /// Serve the HTTP API, or MCP over stdio with --mcp
    Serve {
        /// Speak MCP on stdin/stdout instead of HTTP
        #[arg(long)]
        mcp: bool,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(find_config_file);
    let config = load_config(config_path.as_deref()).context("loading configuration")?;

    init_tracing(&cli, &config);
    if let Some(path) = &config_path {
        tracing::debug!("Using config file: {}", path.display());
    }

    if let Commands::Config = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let service = PaperService::from_config(&config).context("building HTTP client")?;
    let format = cli.output.resolve();

    match cli.command {
        Commands::Paper { id, doi } => {
            let paper = service.get_paper(&id, doi.as_deref()).await?;
            output_paper(&paper, format)?;
        }
        Commands::Citations { id, doi } => {
            let network = service.get_citation_network(&id, doi.as_deref()).await?;
            output_network(&network, format)?;
        }
        Commands::Search { query, limit } => {
            let results = service.search(&query, limit).await?;
            if !results.failed_sources.is_empty() {
                tracing::warn!("Sources unavailable: {}", results.failed_sources.join(", "));
            }
            output_papers(&results.papers, format)?;
        }
        Commands::Lookup { input, limit } => match service.lookup(&input, limit).await? {
            Lookup::Paper(paper) => output_paper(&paper, format)?,
            Lookup::Search(results) => output_papers(&results.papers, format)?,
        },
        Commands::Sources => output_status(&service.status(), format)?,
        Commands::Serve { mcp: true, .. } => {
            let server = McpServer::new(&service)?;
            server.run().await?;
        }
        Commands::Serve { host, port, .. } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let addr: SocketAddr = format!("{}:{}", host, port)
                .parse()
                .with_context(|| format!("invalid listen address {}:{}", host, port))?;
            scholar_hub::api::serve(service, addr).await?;
        }
        Commands::Config => {}
    }

    Ok(())
}

/// Logs go to stderr so stdout stays clean for results and MCP frames.
fn init_tracing(cli: &Cli, config: &Config) {
    let level = if cli.quiet {
        "error".to_string()
    } else {
        match cli.verbose {
            0 => config.logging.level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("scholar_hub={},tower_http={}", level, level)));

    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

fn author_list(paper: &Paper) -> String {
    paper
        .authors
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn output_paper(paper: &Paper, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(paper)?),
        OutputFormat::Table => {
            let mut table = Table::new();
            table.load_preset(comfy_table::presets::UTF8_FULL);
            let year = paper.year().map(|y| y.to_string()).unwrap_or_default();
            let fields = paper
                .fields_of_study
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            let rows = [
                ("Title", paper.title.clone()),
                ("Authors", author_list(paper)),
                ("Year", year),
                ("Venue", paper.venue.clone().unwrap_or_default()),
                ("DOI", paper.doi.clone().unwrap_or_default()),
                ("Citations", paper.citation_count.to_string()),
                ("References", paper.reference_count.to_string()),
                ("Fields", fields),
                ("PDF", paper.pdf_url.clone().unwrap_or_default()),
                ("Source", paper.source.to_string()),
            ];
            for (name, value) in rows {
                table.add_row(vec![Cell::new(name).add_attribute(Attribute::Bold), Cell::new(value)]);
            }
            println!("{table}");
            if let Some(abstract_text) = &paper.abstract_text {
                println!("\n{}", abstract_text);
            }
        }
        _ => print_plain(paper),
    }
    Ok(())
}

fn print_plain(paper: &Paper) {
    println!("{} - {} ({})", paper.title, author_list(paper), paper.source);
    if let Some(ref doi) = paper.doi {
        println!("  DOI: {}", doi);
    }
    if let Some(ref pdf_url) = paper.pdf_url {
        println!("  PDF: {}", pdf_url);
    }
    println!();
}

fn output_papers(papers: &[Paper], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(papers)?),
        OutputFormat::Table => println!("{}", papers_table(papers)),
        _ => papers.iter().for_each(print_plain),
    }
    Ok(())
}

fn papers_table(papers: &[Paper]) -> Table {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Title", "Authors", "Year", "Citations", "Source"]);

    for paper in papers {
        table.add_row(vec![
            Cell::new(truncate(&paper.title, 50)).add_attribute(Attribute::Bold),
            Cell::new(truncate(&author_list(paper), 30)),
            Cell::new(paper.year().map(|y| y.to_string()).unwrap_or_default()),
            Cell::new(paper.citation_count),
            Cell::new(paper.source.to_string()),
        ]);
    }
    table
}

fn output_network(network: &CitationNetwork, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(network)?),
        OutputFormat::Table => {
            println!("{}\n", network.root.title);
            println!("Cited by ({}):\n{}", network.citing.len(), papers_table(&network.citing));
            println!("References ({}):\n{}", network.cited.len(), papers_table(&network.cited));
        }
        _ => {
            print_plain(&network.root);
            for edge in &network.edges {
                match edge.context() {
                    Some(context) => println!(
                        "{} -> {}  \"{}\"",
                        edge.citing_paper_id(),
                        edge.cited_paper_id(),
                        truncate(context, 80)
                    ),
                    None => println!("{} -> {}", edge.citing_paper_id(), edge.cited_paper_id()),
                }
            }
        }
    }
    Ok(())
}

fn output_status(status: &ServiceStatus, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(status)?),
        _ => {
            let mut table = Table::new();
            table.load_preset(comfy_table::presets::UTF8_FULL);
            table.set_header(vec!["ID", "Name", "Capabilities", "Circuit"]);
            for source in &status.sources {
                table.add_row(vec![
                    Cell::new(&source.id).add_attribute(Attribute::Bold),
                    Cell::new(&source.name),
                    Cell::new(source.capabilities.join(", ")),
                    Cell::new(format!("{:?}", source.circuit)),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}
