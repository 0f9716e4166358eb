//! TQ-015: CLI subcommands — query, plan, validate, types, path, init, schema, completions.

use crate::core::config::{self, LoadedConfig, DEFAULT_CONFIG_FILE};
use crate::core::engine::Engine;
use crate::core::schema;
use crate::core::topology::{ReaderTopologyLoader, Topology, TopologyLoader};
use crate::core::types::{NamespacedType, OutputFormat, Verbosity};
use crate::error::{ConfigError, Error, Result};
use crate::query;
use crate::reader::file::{DATA_DIR, ITEM_SCHEMA_FILE, LINK_SCHEMA_FILE, MANIFEST_FILE};
use crate::reader::Reader;
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "topoquery",
    version,
    about = "Topology-aware path queries over typed remote resources"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command that reads the config.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to topoquery.yaml (default: ./topoquery.yaml)
    #[arg(short, long, env = "TOPOQUERY_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a query and print the result tree
    Query {
        /// Query text, e.g. `in dev vpc :id,cidr - instance ?state eq 'running'`
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        #[command(flatten)]
        config: ConfigArgs,

        /// Worker threads (overrides pool_size)
        #[arg(short = 'j', long)]
        pool_size: Option<usize>,

        /// Include internal ids and link errors
        #[arg(long)]
        debug: bool,

        /// Output format (overrides output)
        #[arg(short, long, value_enum)]
        output: Option<OutputFormat>,
    },

    /// Show the execution plan for a query without running it
    Plan {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Validate the config, reader manifests and schema documents
    Validate {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// List known types, or the attributes and links of one type
    Types {
        /// `type` or `namespace.type`
        name: Option<String>,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Show the shortest link chain between two types
    Path {
        from: String,
        to: String,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Create a config and a sample reader directory
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Print JSON Schemas of the config and schema documents
    Schema,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Query {
            query,
            config,
            pool_size,
            debug,
            output,
        } => cmd_query(&query.join(" "), &config, pool_size, debug, output),
        Commands::Plan { query, config } => cmd_plan(&query.join(" "), &config),
        Commands::Validate { config } => cmd_validate(&config),
        Commands::Types { name, config } => cmd_types(name.as_deref(), &config),
        Commands::Path { from, to, config } => cmd_path(&from, &to, &config),
        Commands::Init { path } => cmd_init(&path),
        Commands::Schema => cmd_schema(),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "topoquery", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Load the config and open its readers.
fn load_readers(args: &ConfigArgs) -> Result<(LoadedConfig, Vec<Arc<dyn Reader>>)> {
    let loaded = config::load(args.config.as_deref())?;
    let readers = config::resolve_readers(&loaded.config, &loaded.base_dir)?;
    Ok((loaded, readers))
}

fn load_topology(readers: &[Arc<dyn Reader>]) -> Result<Topology> {
    ReaderTopologyLoader::new(readers.to_vec()).load()
}

fn cmd_query(
    text: &str,
    args: &ConfigArgs,
    pool_size: Option<usize>,
    debug: bool,
    output: Option<OutputFormat>,
) -> Result<()> {
    let ast = query::parse(text)?;
    let (loaded, readers) = load_readers(args)?;
    let pool_size = pool_size.unwrap_or(loaded.config.pool_size);
    let output = output.unwrap_or(loaded.config.output);
    let verbosity = if debug {
        Verbosity::Debug
    } else {
        loaded.config.verbosity
    };
    Engine::with_defaults(&readers, pool_size, output).run(&ast, &readers, verbosity)?;
    Ok(())
}

fn cmd_plan(text: &str, args: &ConfigArgs) -> Result<()> {
    let ast = query::parse(text)?;
    let (loaded, readers) = load_readers(args)?;
    let engine = Engine::with_defaults(&readers, loaded.config.pool_size, loaded.config.output);
    let plan = engine.plan_only(&ast, &readers)?;
    print!("{}", plan.describe());
    Ok(())
}

/// Collect every problem instead of stopping at the first.
fn validation_errors(readers: &[Arc<dyn Reader>]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut items = Vec::new();
    let mut links = Vec::new();
    for reader in readers {
        let ns = reader.namespace();
        match schema::load_item_schema(&reader.item_schema()) {
            Ok(doc) => {
                for decl in &doc.items {
                    if let Ok(nt) = NamespacedType::parse(&decl.item_type) {
                        if nt.namespace != ns {
                            errors.push(format!(
                                "reader \"{}\" declares type {} outside its namespace",
                                ns, nt
                            ));
                        }
                    }
                }
                items.push(doc);
            }
            Err(e) => errors.push(e.to_string()),
        }
        match schema::load_link_schema(&reader.link_schema()) {
            Ok(doc) => links.push(doc),
            Err(e) => errors.push(e.to_string()),
        }
    }
    if errors.is_empty() {
        if let Err(e) = Topology::build(&items, &links) {
            errors.push(e.to_string());
        }
    }
    errors
}

fn cmd_validate(args: &ConfigArgs) -> Result<()> {
    let (loaded, readers) = load_readers(args)?;
    let errors = validation_errors(&readers);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        return Err(ConfigError::Invalid(errors).into());
    }
    let topology = load_topology(&readers)?;
    let source = loaded
        .path
        .as_ref()
        .map_or_else(|| "defaults".to_string(), |p| p.display().to_string());
    println!(
        "OK: {} ({} readers, {} types, {} links)",
        source,
        readers.len(),
        topology.len(),
        topology.edge_count()
    );
    Ok(())
}

/// One line per type, or the detail of the types matching `name`.
fn describe_types(topology: &Topology, name: Option<&str>) -> Result<String> {
    let mut out = String::new();
    let Some(name) = name else {
        for node in topology.types() {
            let _ = writeln!(out, "{}", node.node_type);
        }
        return Ok(out);
    };
    let matches: Vec<NamespacedType> = match NamespacedType::parse(name) {
        Ok(nt) if topology.contains(&nt) => vec![nt],
        _ => topology
            .namespaces_for_type(name)?
            .into_iter()
            .map(|ns| NamespacedType::new(ns, name))
            .collect(),
    };
    for nt in matches {
        let _ = writeln!(out, "{}", nt);
        let attrs: Vec<&str> = topology
            .attrs(&nt)
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        let _ = writeln!(out, "  attrs: {}", attrs.join(", "));
        for (target, mapping) in topology.links_from(&nt) {
            let _ = writeln!(
                out,
                "  -> {}  on {} = {}",
                target, mapping.from_attr, mapping.to_attr
            );
        }
    }
    Ok(out)
}

fn cmd_types(name: Option<&str>, args: &ConfigArgs) -> Result<()> {
    let (_, readers) = load_readers(args)?;
    let topology = load_topology(&readers)?;
    print!("{}", describe_types(&topology, name)?);
    Ok(())
}

fn resolve_name(topology: &Topology, name: &str) -> Result<NamespacedType> {
    let type_ref = match name.split_once('.') {
        Some((ns, ty)) => query::ast::TypeRef::Qualified {
            namespace: ns.to_string(),
            type_name: ty.to_string(),
        },
        None => query::ast::TypeRef::Unqualified(name.to_string()),
    };
    Ok(crate::core::planner::resolve_type(&type_ref, topology)?)
}

fn describe_path(topology: &Topology, from: &str, to: &str) -> Result<String> {
    let from = resolve_name(topology, from)?;
    let to = resolve_name(topology, to)?;
    let path = topology.shortest_path(&from, &to)?;
    let mut out = String::new();
    let _ = writeln!(out, "{}", path[0]);
    for pair in path.windows(2) {
        let mapping = topology.edge(&pair[0], &pair[1])?;
        let _ = writeln!(
            out,
            "  -> {}  on {} = {}",
            pair[1], mapping.from_attr, mapping.to_attr
        );
    }
    Ok(out)
}

fn cmd_path(from: &str, to: &str, args: &ConfigArgs) -> Result<()> {
    let (_, readers) = load_readers(args)?;
    let topology = load_topology(&readers)?;
    print!("{}", describe_path(&topology, from, to)?);
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# topoquery configuration
readers:
  - readers/*
pool_size: 10
verbosity: normal
output: yaml
"#;

const SAMPLE_MANIFEST: &str = "namespace: demo\nprofiles: [dev]\n";

const SAMPLE_ITEMS: &str = r#"{
  "items": [
    {"type": "demo.vpc", "attrs": [{"field": "id"}, {"field": "cidr"}]},
    {"type": "demo.subnet", "attrs": [{"field": "id"}, {"field": "vpc_id"}, {"field": "zone"}]},
    {"type": "demo.instance", "attrs": [{"field": "id"}, {"field": "subnet_id"}, {"field": "state"}]}
  ]
}
"#;

const SAMPLE_LINKS: &str = r#"{
  "links": [
    {"from": "demo.vpc", "to": "demo.subnet", "mapping": {"from": "id", "to": "vpc_id"}},
    {"from": "demo.subnet", "to": "demo.instance", "mapping": {"from": "id", "to": "subnet_id"}}
  ]
}
"#;

const SAMPLE_DATA: &[(&str, &str)] = &[
    ("vpc", r#"[{"id": "vpc-1", "cidr": "10.0.0.0/16"}]"#),
    (
        "subnet",
        r#"[{"id": "subnet-a", "vpc_id": "vpc-1", "zone": "a"}, {"id": "subnet-b", "vpc_id": "vpc-1", "zone": "b"}]"#,
    ),
    (
        "instance",
        r#"[{"id": "i-1", "subnet_id": "subnet-a", "state": "running"}, {"id": "i-2", "subnet_id": "subnet-b", "state": "stopped"}]"#,
    ),
];

fn write_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn cmd_init(path: &Path) -> Result<()> {
    let config_path = path.join(DEFAULT_CONFIG_FILE);
    if config_path.exists() {
        return Err(Error::Io {
            path: config_path,
            source: std::io::Error::new(std::io::ErrorKind::AlreadyExists, "already exists"),
        });
    }

    let reader_dir = path.join("readers").join("demo");
    let data_dir = reader_dir.join(DATA_DIR).join("dev");
    create_dir(&data_dir)?;
    write_file(&config_path, SAMPLE_CONFIG)?;
    write_file(&reader_dir.join(MANIFEST_FILE), SAMPLE_MANIFEST)?;
    write_file(&reader_dir.join(ITEM_SCHEMA_FILE), SAMPLE_ITEMS)?;
    write_file(&reader_dir.join(LINK_SCHEMA_FILE), SAMPLE_LINKS)?;
    for (item_type, rows) in SAMPLE_DATA {
        write_file(&data_dir.join(format!("{}.json", item_type)), rows)?;
    }

    println!("Initialized topoquery project at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}/", reader_dir.display());
    println!("Try: topoquery query \"vpc - instance :id,state\"");
    Ok(())
}

fn cmd_schema() -> Result<()> {
    let mut schemas = serde_json::Map::new();
    schemas.insert(
        "config".to_string(),
        serde_json::to_value(schemars::schema_for!(config::Config))
            .map_err(crate::error::RenderError::from)?,
    );
    for (name, root) in schema::json_schemas() {
        schemas.insert(
            name.to_string(),
            serde_json::to_value(root).map_err(crate::error::RenderError::from)?,
        );
    }
    let text = serde_json::to_string_pretty(&schemas).map_err(crate::error::RenderError::from)?;
    println!("{}", text);
    Ok(())
}
