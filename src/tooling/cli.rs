//! CLI Tooling
//!
//! Command-line front end over a sled-backed store. Collections are named by
//! id or name and entries by id or path; matching is case-insensitive.

use crate::collection::{CollectionRoot, Layout};
use crate::config::{ConfigLoader, OrchardConfig};
use crate::drag::{DragSource, DropTarget, Instruction, Operation};
use crate::error::{ApiError, StorageError, TreeError};
use crate::forest::Forest;
use crate::logging::{LogFormat, LogOutput, LoggingConfig};
use crate::service::{EntryStore, PersistenceService, SledBackend};
use crate::tooling::format::{format_collections_text, format_tree_text};
use crate::tree::{names_collide, CollectionTree, EntryClass, EntryPath, NewEntry, ParentRef};
use crate::types::{CollectionId, EntryId};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Runtime;
use tracing::info;

/// Orchard CLI - ordered collection trees
#[derive(Parser)]
#[command(name = "orchard")]
#[command(about = "Manage ordered, path-addressed collection trees")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides layered config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Store directory (overrides `store.path`)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<LogFormat>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<LogOutput>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// `base` with the command-line logging flags applied.
    pub fn logging_config(&self, base: &LoggingConfig) -> LoggingConfig {
        let mut config = base.clone();
        if let Some(level) = &self.log_level {
            config.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.format = format;
        }
        if let Some(output) = self.log_output {
            config.output = output;
        }
        if let Some(file) = &self.log_file {
            config.file = Some(file.clone());
        }
        config
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage collections
    Collections {
        #[command(subcommand)]
        command: CollectionCommands,
    },
    /// Print a collection's tree
    Tree {
        collection: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Add a directory or item
    Add {
        collection: String,
        name: String,
        /// Parent directory (path or id); the top level when omitted
        #[arg(long)]
        parent: Option<String>,
        /// Create a directory instead of an item
        #[arg(long)]
        dir: bool,
        #[arg(long, value_enum, default_value_t = ClassArg::Request)]
        class: ClassArg,
        /// Protocol tag for items, e.g. Get or Post
        #[arg(long)]
        protocol: Option<String>,
    },
    /// Rename an entry
    Rename {
        collection: String,
        entry: String,
        name: String,
    },
    /// Delete an entry and everything below it
    Rm { collection: String, entry: String },
    /// Move an entry
    Mv {
        collection: String,
        entry: String,
        /// Entry to drop on; the collection row when omitted
        target: Option<String>,
        /// Destination collection (defaults to the source collection)
        #[arg(long)]
        to: Option<String>,
        #[arg(long, value_enum, default_value_t = Placement::Inside)]
        position: Placement,
    },
    /// Expand a directory, every directory (--all) or the collection row
    Expand {
        collection: String,
        entry: Option<String>,
        #[arg(long)]
        all: bool,
    },
    /// Collapse a directory, every directory (--all) or the collection row
    Collapse {
        collection: String,
        entry: Option<String>,
        #[arg(long)]
        all: bool,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
pub enum CollectionCommands {
    /// List collections in display order
    List {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Create a collection
    Create {
        name: String,
        /// One category directory per class
        #[arg(long)]
        partitioned: bool,
    },
    /// Move a collection before or after another
    Move {
        collection: String,
        target: String,
        #[arg(long, value_enum, default_value_t = Side::Before)]
        position: Side,
    },
    /// Delete a collection and its entries
    Delete { collection: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClassArg {
    Request,
    Endpoint,
    Component,
    Schema,
}

impl From<ClassArg> for EntryClass {
    fn from(value: ClassArg) -> Self {
        match value {
            ClassArg::Request => EntryClass::Request,
            ClassArg::Endpoint => EntryClass::Endpoint,
            ClassArg::Component => EntryClass::Component,
            ClassArg::Schema => EntryClass::Schema,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Placement {
    Before,
    After,
    Inside,
}

impl From<Placement> for Operation {
    fn from(value: Placement) -> Self {
        match value {
            Placement::Before => Operation::ReorderBefore,
            Placement::After => Operation::ReorderAfter,
            Placement::Inside => Operation::Combine,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Side {
    Before,
    After,
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Collections { command } => match command {
            CollectionCommands::List { .. } => "collections list",
            CollectionCommands::Create { .. } => "collections create",
            CollectionCommands::Move { .. } => "collections move",
            CollectionCommands::Delete { .. } => "collections delete",
        },
        Commands::Tree { .. } => "tree",
        Commands::Add { .. } => "add",
        Commands::Rename { .. } => "rename",
        Commands::Rm { .. } => "rm",
        Commands::Mv { .. } => "mv",
        Commands::Expand { .. } => "expand",
        Commands::Collapse { .. } => "collapse",
        Commands::Config => "config",
    }
}

/// Load configuration the way the CLI does: an explicit file wins over the
/// layered sources.
pub fn load_config(cli: &Cli) -> Result<OrchardConfig, ApiError> {
    match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(&cli.workspace),
    }
}

/// CLI context: one runtime and one forest over the workspace store.
pub struct CliContext {
    runtime: Runtime,
    forest: Forest,
    config: OrchardConfig,
    store_path: PathBuf,
}

impl CliContext {
    pub fn new(
        workspace_root: PathBuf,
        config: OrchardConfig,
        store_override: Option<PathBuf>,
    ) -> Result<Self, ApiError> {
        let store_path = match store_override {
            Some(path) => path,
            None => config.store.resolve_path(&workspace_root)?,
        };
        std::fs::create_dir_all(&store_path).map_err(StorageError::IoError)?;
        let backend = SledBackend::open(&store_path)?;
        let service: Arc<dyn PersistenceService> = Arc::new(EntryStore::new(backend));
        let forest = Forest::new(service, &config.drag);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(StorageError::IoError)?;
        runtime.block_on(forest.load())?;

        Ok(Self {
            runtime,
            forest,
            config,
            store_path,
        })
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn store_path(&self) -> &PathBuf {
        &self.store_path
    }

    /// Execute a CLI command and return its printable output.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let started = Instant::now();
        let result = self.execute_inner(command);
        info!(
            command = command_name(command),
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    fn execute_inner(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Collections { command } => self.execute_collections(command),
            Commands::Tree { collection, format } => {
                let root = self.collection(collection)?;
                let view = self.forest.view(&root.id)?;
                if format == "json" {
                    return Ok(serde_json::to_string_pretty(&view)?);
                }
                Ok(format_tree_text(&root, &view))
            }
            Commands::Add {
                collection,
                name,
                parent,
                dir,
                class,
                protocol,
            } => {
                let root = self.collection(collection)?;
                let tree = self.forest.get_tree(&root.id)?;
                let class = EntryClass::from(*class);
                let parent = match parent {
                    Some(raw) => ParentRef::Dir(find_entry(&tree, raw)?),
                    None => default_parent(&tree, class),
                };
                let mut entry = if *dir {
                    NewEntry::dir(name.as_str(), class)
                } else {
                    NewEntry::item(name.as_str(), class)
                };
                if let Some(protocol) = protocol {
                    entry = entry.with_protocol(protocol.as_str());
                }
                let id = self
                    .runtime
                    .block_on(self.forest.add_entry(&root.id, &parent, entry))?;
                Ok(format!("Added {}", id))
            }
            Commands::Rename {
                collection,
                entry,
                name,
            } => {
                let root = self.collection(collection)?;
                let tree = self.forest.get_tree(&root.id)?;
                let id = find_entry(&tree, entry)?;
                self.runtime
                    .block_on(self.forest.rename_entry(&root.id, &id, name))?;
                let path = self.forest.get_tree(&root.id)?.node(&id)?.path.raw();
                Ok(format!("Renamed {} to {}", id, path))
            }
            Commands::Rm { collection, entry } => {
                let root = self.collection(collection)?;
                let tree = self.forest.get_tree(&root.id)?;
                let id = find_entry(&tree, entry)?;
                let removed = tree.flatten(&id).len();
                self.runtime
                    .block_on(self.forest.delete_entry(&root.id, &id))?;
                Ok(format!("Deleted {} ({} entries)", id, removed))
            }
            Commands::Mv {
                collection,
                entry,
                target,
                to,
                position,
            } => {
                let source_root = self.collection(collection)?;
                let source_tree = self.forest.get_tree(&source_root.id)?;
                let source = DragSource {
                    collection_id: source_root.id.clone(),
                    entry: find_entry(&source_tree, entry)?,
                };
                let target_root = match to {
                    Some(raw) => self.collection(raw)?,
                    None => source_root,
                };
                let drop_target = match target {
                    Some(raw) => {
                        let target_tree = self.forest.get_tree(&target_root.id)?;
                        DropTarget::Entry {
                            collection_id: target_root.id.clone(),
                            entry: find_entry(&target_tree, raw)?,
                        }
                    }
                    None if *position == Placement::Inside => {
                        DropTarget::Collection(target_root.id.clone())
                    }
                    None => {
                        return Err(ApiError::InvalidArgument(
                            "--position before/after needs a target entry".to_string(),
                        ))
                    }
                };
                let instruction = Instruction::available(Operation::from(*position));
                let outcome = self.runtime.block_on(self.forest.apply_instruction(
                    &source,
                    &drop_target,
                    Some(instruction),
                ))?;
                match outcome {
                    Some(outcome) => Ok(format!(
                        "Moved {} to {} (position {})",
                        outcome.moved,
                        outcome.target_collection,
                        outcome.index + 1
                    )),
                    None => Ok("Nothing moved".to_string()),
                }
            }
            Commands::Expand {
                collection,
                entry,
                all,
            } => self.set_expanded(collection, entry.as_deref(), *all, true),
            Commands::Collapse {
                collection,
                entry,
                all,
            } => self.set_expanded(collection, entry.as_deref(), *all, false),
            Commands::Config => ConfigLoader::to_toml(&self.config),
        }
    }

    fn execute_collections(&self, command: &CollectionCommands) -> Result<String, ApiError> {
        match command {
            CollectionCommands::List { format } => {
                let collections = self.forest.collections();
                if format == "json" {
                    return Ok(serde_json::to_string_pretty(&collections)?);
                }
                Ok(format_collections_text(&collections))
            }
            CollectionCommands::Create { name, partitioned } => {
                let layout = if *partitioned {
                    Layout::Partitioned
                } else {
                    Layout::Flat
                };
                let root = self
                    .runtime
                    .block_on(self.forest.create_collection(name, layout))?;
                Ok(format!("Created collection {} ({})", root.name, root.id))
            }
            CollectionCommands::Move {
                collection,
                target,
                position,
            } => {
                let source = self.collection(collection)?;
                let target = self.collection(target)?;
                let operation = match position {
                    Side::Before => Operation::ReorderBefore,
                    Side::After => Operation::ReorderAfter,
                };
                let collections = self.runtime.block_on(self.forest.reorder_collection(
                    &source.id,
                    &target.id,
                    operation,
                ))?;
                Ok(format_collections_text(&collections))
            }
            CollectionCommands::Delete { collection } => {
                let root = self.collection(collection)?;
                self.runtime
                    .block_on(self.forest.delete_collection(&root.id))?;
                Ok(format!("Deleted collection {} ({})", root.name, root.id))
            }
        }
    }

    fn set_expanded(
        &self,
        collection: &str,
        entry: Option<&str>,
        all: bool,
        expanded: bool,
    ) -> Result<String, ApiError> {
        let root = self.collection(collection)?;
        let verb = if expanded { "Expanded" } else { "Collapsed" };
        if all {
            let changed = self
                .runtime
                .block_on(self.forest.set_all_expanded(&root.id, expanded))?;
            return Ok(format!("{} {} directories", verb, changed.len()));
        }
        match entry {
            Some(raw) => {
                let tree = self.forest.get_tree(&root.id)?;
                let id = find_entry(&tree, raw)?;
                let changed = self
                    .runtime
                    .block_on(self.forest.set_expanded(&root.id, &id, expanded))?;
                Ok(if changed {
                    format!("{} {}", verb, id)
                } else {
                    format!("{} already {}", id, verb.to_lowercase())
                })
            }
            None => {
                self.runtime
                    .block_on(self.forest.set_collection_expanded(&root.id, expanded))?;
                Ok(format!("{} collection {}", verb, root.name))
            }
        }
    }

    /// A collection by id, else by name.
    fn collection(&self, raw: &str) -> Result<CollectionRoot, ApiError> {
        let collections = self.forest.collections();
        collections
            .iter()
            .find(|c| c.id.as_str() == raw)
            .or_else(|| collections.iter().find(|c| names_collide(&c.name, raw)))
            .cloned()
            .ok_or_else(|| ApiError::UnknownCollection(CollectionId::new(raw)))
    }
}

/// An entry by id, else by path.
fn find_entry(tree: &CollectionTree, raw: &str) -> Result<EntryId, ApiError> {
    let id = EntryId::new(raw);
    if tree.contains(&id) {
        return Ok(id);
    }
    let path = EntryPath::parse(raw);
    tree.entries()
        .into_iter()
        .find(|entry| {
            entry.path.len() == path.len()
                && entry
                    .path
                    .segments()
                    .iter()
                    .zip(path.segments())
                    .all(|(a, b)| names_collide(a, b))
        })
        .map(|entry| entry.id)
        .ok_or_else(|| ApiError::Tree(TreeError::NotFound(id)))
}

/// Top level for flat collections, the class's category root otherwise.
fn default_parent(tree: &CollectionTree, class: EntryClass) -> ParentRef {
    match tree.layout() {
        Layout::Flat => ParentRef::Root,
        Layout::Partitioned => tree
            .category_root(class)
            .map(|node| ParentRef::Dir(node.id.clone()))
            .unwrap_or(ParentRef::Root),
    }
}
