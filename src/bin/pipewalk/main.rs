//! Command-line front end: loads a graph document and runs canned traversals.
#![forbid(unsafe_code)]

mod config;
mod report;
mod ui;

use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use pipewalk::graph::{GraphAccess, GraphDocument, MemoryGraph};
use pipewalk::pipe::profile_snapshot;
use pipewalk::{
    Element, Order, Traversal, TraversalConfig, TraversalError, TraversalSource, Value, Vertices,
};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;
use crate::report::{PathsReport, StatsReport, VertexEntry};
use crate::ui::{format_duration, Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "pipewalk",
    version,
    about = "Run lazy traversals over a JSON graph document",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "PIPEWALK_GRAPH",
        value_name = "FILE",
        help = "Graph document to load (defaults to the built-in demo graph)"
    )]
    graph: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "PIPEWALK_CONFIG",
        value_name = "FILE",
        help = "CLI config file"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for results"
    )]
    format: OutputFormat,

    #[arg(long, global = true, value_enum, default_value_t = Theme::Auto)]
    theme: Theme,

    #[arg(long, short, global = true, help = "Only print results")]
    quiet: bool,

    #[arg(long, global = true, help = "Seed for random steps")]
    seed: Option<u64>,

    #[arg(long, global = true, help = "Cap every loop at this many passes")]
    max_loop_depth: Option<usize>,

    #[arg(long, global = true, help = "Keep every step as a separate stage")]
    no_optimize: bool,

    #[arg(
        long,
        global = true,
        help = "Print step timings afterwards (requires PIPEWALK_PROFILE)"
    )]
    profile: bool,

    #[arg(short, long, global = true, action = ArgAction::Count, help = "Raise log verbosity")]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Vertex, edge and per-label edge counts.
    Stats,
    /// Vertices reachable from a start vertex within a number of hops.
    Reach {
        #[arg(long, value_name = "ID")]
        from: u64,
        #[arg(long, default_value_t = 2)]
        depth: usize,
        #[arg(long = "label", value_name = "LABEL")]
        labels: Vec<String>,
        #[arg(long, value_enum, default_value_t = DirectionArg::Out)]
        direction: DirectionArg,
    },
    /// Vertices with the most incident edges.
    Top {
        #[arg(long, default_value_t = 5)]
        limit: usize,
        #[arg(long = "label", value_name = "LABEL")]
        labels: Vec<String>,
        #[arg(long, value_enum, default_value_t = DirectionArg::Both)]
        direction: DirectionArg,
    },
    /// Simple paths between two vertices.
    Paths {
        #[arg(long, value_name = "ID")]
        from: u64,
        #[arg(long, value_name = "ID")]
        to: u64,
        #[arg(long, default_value_t = 4)]
        max_depth: usize,
        #[arg(long = "label", value_name = "LABEL")]
        labels: Vec<String>,
    },
    /// Writes a starter config file.
    InitConfig,
    /// Prints shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum DirectionArg {
    Out,
    In,
    Both,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let ui = Ui::new(cli.theme, cli.quiet || cli.format == OutputFormat::Json);

    match &cli.command {
        Command::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(*shell, &mut command, "pipewalk", &mut io::stdout());
            return Ok(());
        }
        Command::InitConfig => {
            let config = CliConfig::load(cli.config.clone())?;
            let path = config.init()?;
            ui.success(&format!("wrote {}", path.display()));
            return Ok(());
        }
        _ => {}
    }

    let config = CliConfig::load(cli.config.clone())?;
    let traversal_config = traversal_config(&cli, &config);
    let graph = load_graph(&cli, &config, &ui)?;
    let g = TraversalSource::with_config(graph, traversal_config);

    match &cli.command {
        Command::Stats => {
            let report = stats(&g)?;
            emit(cli.format, &report, || ui.stats(&report))?;
        }
        Command::Reach {
            from,
            depth,
            labels,
            direction,
        } => {
            let entries = reach(&g, *from, *depth, labels, *direction)?;
            emit(cli.format, &entries, || {
                ui.vertices(&format!("reachable from {from} within {depth} hops"), &entries)
            })?;
        }
        Command::Top {
            limit,
            labels,
            direction,
        } => {
            let entries = top_degree(&g, *limit, labels, *direction)?;
            emit(cli.format, &entries, || ui.vertices("highest degree", &entries))?;
        }
        Command::Paths {
            from,
            to,
            max_depth,
            labels,
        } => {
            let report = paths(&g, *from, *to, *max_depth, labels)?;
            emit(cli.format, &report, || ui.paths(&report))?;
        }
        Command::InitConfig | Command::Completions { .. } => {}
    }

    if cli.profile {
        match profile_snapshot(true) {
            Some(snapshot) => match cli.format {
                OutputFormat::Json => eprintln!("{}", serde_json::to_string(&snapshot)?),
                OutputFormat::Text => ui.profile(&snapshot),
            },
            None => ui.warn("profiling is off; set PIPEWALK_PROFILE=1"),
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "pipewalk=warn",
        1 => "pipewalk=info",
        2 => "pipewalk=debug",
        _ => "pipewalk=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .try_init();
}

/// Config file values overridden by flags.
fn traversal_config(cli: &Cli, config: &CliConfig) -> TraversalConfig {
    let mut merged = config.traversal().clone();
    if let Some(seed) = cli.seed {
        merged.seed = Some(seed);
    }
    if let Some(depth) = cli.max_loop_depth {
        merged.max_loop_depth = Some(depth);
    }
    if cli.no_optimize {
        merged.optimize = false;
    }
    debug!(?merged, config = ?config.path(), "traversal config resolved");
    merged
}

fn load_graph(cli: &Cli, config: &CliConfig, ui: &Ui) -> Result<Arc<MemoryGraph>, Box<dyn Error>> {
    let Some(path) = cli.graph.as_ref().or(config.default_graph()) else {
        info!("no graph document given; using the demo graph");
        return Ok(Arc::new(MemoryGraph::classic()));
    };
    let task = ui.loading(path);
    let graph = GraphDocument::read(path)?.into_graph()?;
    let elapsed = task.finish();
    info!(
        path = %path.display(),
        vertices = graph.vertex_count(),
        edges = graph.edge_count(),
        elapsed = %format_duration(elapsed),
        "graph loaded"
    );
    Ok(Arc::new(graph))
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn label_refs(labels: &[String]) -> Vec<&str> {
    labels.iter().map(String::as_str).collect()
}

fn step<M>(t: Traversal<Vertices, M>, direction: DirectionArg, labels: &[&str]) -> Traversal<Vertices, M> {
    match direction {
        DirectionArg::Out => t.out(labels),
        DirectionArg::In => t.in_(labels),
        DirectionArg::Both => t.both(labels),
    }
}

fn entry(graph: &dyn GraphAccess, value: &Value, degree: Option<i64>) -> pipewalk::Result<VertexEntry> {
    let vertex = value
        .as_vertex()
        .ok_or(TraversalError::NotAnElement { op: "describe" })?;
    let name = graph
        .property(Element::Vertex(vertex), "name")?
        .and_then(|name| name.as_str().map(str::to_owned));
    Ok(VertexEntry {
        id: vertex.0,
        name,
        degree,
    })
}

fn stats(g: &TraversalSource) -> pipewalk::Result<StatsReport> {
    let vertices = g.v().count()?;
    let edges = g.e().count()?;
    let counts = g.e().label().group_count().cap()?;
    let labels = counts
        .as_map()
        .into_iter()
        .flatten()
        .filter_map(|(label, count)| {
            let count = u64::try_from(count.as_int()?).ok()?;
            Some((label.as_str()?.to_owned(), count))
        })
        .collect();
    Ok(StatsReport {
        vertices,
        edges,
        labels,
    })
}

fn reach(
    g: &TraversalSource,
    from: u64,
    depth: usize,
    labels: &[String],
    direction: DirectionArg,
) -> pipewalk::Result<Vec<VertexEntry>> {
    let labels = label_refs(labels);
    let reached = g
        .v_ids([from])
        .loop_with(
            |body| step(body, direction, &labels),
            move |state| state.depth() < depth,
            |state| state.depth() > 0,
        )
        .except([Value::from(pipewalk::VertexId(from))])
        .dedup()
        .to_list()?;
    reached
        .iter()
        .map(|value| entry(g.graph().as_ref(), value, None))
        .collect()
}

fn top_degree(
    g: &TraversalSource,
    limit: usize,
    labels: &[String],
    direction: DirectionArg,
) -> pipewalk::Result<Vec<VertexEntry>> {
    let labels = label_refs(labels);
    let incident = g.v();
    let incident = match direction {
        DirectionArg::Out => incident.out_e(&labels),
        DirectionArg::In => incident.in_e(&labels),
        DirectionArg::Both => incident.both_e(&labels),
    };
    let counts = incident
        .path()
        .group_count_by(|path| path.as_list().and_then(<[Value]>::first).cloned().unwrap_or(Value::Null))
        .cap()?;
    let ranked = g.start(counts.clone()).order_map(Order::Decr).limit(limit).to_list()?;
    let degrees = counts.as_map().cloned().unwrap_or_default();
    ranked
        .iter()
        .map(|vertex| {
            let degree = degrees.get(vertex).and_then(Value::as_int);
            entry(g.graph().as_ref(), vertex, degree)
        })
        .collect()
}

fn paths(
    g: &TraversalSource,
    from: u64,
    to: u64,
    max_depth: usize,
    labels: &[String],
) -> pipewalk::Result<PathsReport> {
    let labels = label_refs(labels);
    let target = Value::from(pipewalk::VertexId(to));
    let stop = target.clone();
    let found = target.clone();
    let mut walks = g
        .v_ids([from])
        .loop_with(
            |body| body.out(&labels).simple_path(),
            move |state| state.depth() < max_depth && state.value() != &stop,
            |_| false,
        )
        .filter(move |value| value == &found)
        .path();
    let mut paths = Vec::new();
    for walk in walks.iter() {
        let walk = walk?;
        let ids = walk
            .as_list()
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_vertex)
            .map(|vertex| vertex.0)
            .collect();
        paths.push(ids);
    }
    Ok(PathsReport { from, to, paths })
}
