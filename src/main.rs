//! # onec-index CLI (`ocx`)
//!
//! The `ocx` binary ingests 1C:Enterprise configuration exports into SQLite
//! index databases and queries them. Query results are printed as pretty
//! JSON on stdout; progress goes to stderr.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ocx init` | Create an index database and its schema |
//! | `ocx ingest` | Ingest a configuration export into a database |
//! | `ocx search "<query>"` | Full-text search over module source |
//! | `ocx object find/structure/list` | Metadata object lookups |
//! | `ocx module code/procedures` | Module source and declarations |
//! | `ocx procedure <object> <name>` | One procedure's source |
//! | `ocx form find/structure/element` | Form lookups |
//! | `ocx options <object>` | Functional options gating an object |
//! | `ocx attribute <name>` | Attribute lookup across objects |
//! | `ocx project ...` | Manage the project registry |
//! | `ocx database ...` | Manage databases registered under a project |
//!
//! ## Examples
//!
//! ```bash
//! ocx init --database erp.db
//! ocx ingest --database erp.db --export ./УправлениеТорговлей
//! ocx search "РассчитатьСкидку" --database erp.db
//! ocx object structure Контрагенты --database erp.db
//! ocx procedure Контрагенты ПриЗаписи --module-type Object --database erp.db
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::PathBuf;

use onec_index::config::{self, Config};
use onec_index::models::ModuleType;
use onec_index::progress::ProgressMode;
use onec_index::registry::ProjectRegistry;
use onec_index::{db, ingest, migrate, query};

/// onec-index CLI — indexes 1C:Enterprise configuration exports into SQLite
/// for structured and full-text queries.
#[derive(Parser)]
#[command(
    name = "ocx",
    about = "Index 1C:Enterprise configuration exports into SQLite and query them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults to `~/.ocx/ocx.toml`;
    /// built-in defaults apply when the default file is absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Index database file. Either this or `--project`/`--db` must identify
    /// a database for commands that read or write one.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Project name from the registry (used with `--db`).
    #[arg(long, global = true)]
    project: Option<String>,

    /// Database name within `--project`.
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index database and its schema. Idempotent.
    Init,

    /// Ingest a configuration export into the database.
    ///
    /// Rebuilds the index from scratch: pass 1 loads objects, modules and
    /// functional-option definitions; pass 2 loads forms and resolves
    /// cross-references. Prints the ingest report as JSON.
    Ingest {
        /// Configuration export directory (holds `Configuration.xml`).
        #[arg(long)]
        export: PathBuf,

        /// Progress output: `auto` (human when stderr is a TTY), `human`,
        /// `json`, or `off`.
        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// Full-text search over module source.
    ///
    /// Plain queries use the FTS5 index; queries containing FTS special
    /// characters, or combined with filters, fall back to a LIKE scan.
    Search {
        /// The search query string.
        query: String,

        /// Restrict to modules of objects whose name matches (partial).
        #[arg(long)]
        object: Option<String>,

        /// Restrict to one module type: Common, Manager, Object, or Form.
        #[arg(long)]
        module_type: Option<String>,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Metadata object lookups.
    Object {
        #[command(subcommand)]
        action: ObjectAction,
    },

    /// Module source and procedure declarations.
    Module {
        #[command(subcommand)]
        action: ModuleAction,
    },

    /// Print one procedure's source, sliced out of its module by the
    /// recorded line span.
    Procedure {
        /// Owning object name (exact).
        object: String,
        /// Procedure or function name (exact).
        name: String,
        /// Module type: Common, Manager, Object, or Form.
        #[arg(long, default_value = "Object")]
        module_type: String,
        /// Form name, required when `--module-type Form`.
        #[arg(long)]
        form: Option<String>,
    },

    /// Form lookups.
    Form {
        #[command(subcommand)]
        action: FormAction,
    },

    /// Functional options gating an object, or bound to one of its form
    /// elements.
    Options {
        /// Object name (exact).
        object: String,
        /// Narrow to form elements whose name matches (partial).
        #[arg(long)]
        element: Option<String>,
    },

    /// Attribute lookup across object attributes and tabular-section
    /// columns.
    Attribute {
        /// Attribute name (partial, case-insensitive).
        name: String,
        /// Maximum number of results.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Manage the project registry.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Manage databases registered under a project.
    Database {
        #[command(subcommand)]
        action: DatabaseAction,
    },
}

#[derive(Subcommand)]
enum ObjectAction {
    /// Find objects by name (partial, case-insensitive).
    Find {
        name: String,
        /// Restrict to one object type tag, e.g. `Catalog`.
        #[arg(long = "type")]
        object_type: Option<String>,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Full structure of one object: exact name match first, then partial.
    /// Several partial matches come back as a candidate list.
    Structure { name: String },
    /// Object inventory grouped by type.
    List {
        #[arg(long = "type")]
        object_type: Option<String>,
        /// Names listed per type before truncation.
        #[arg(long)]
        limit: Option<i64>,
    },
}

#[derive(Subcommand)]
enum ModuleAction {
    /// Print a module's full source.
    Code {
        /// Owning object name (exact).
        object: String,
        /// Module type: Common, Manager, Object, or Form.
        #[arg(long, default_value = "Object")]
        module_type: String,
        /// Form name, required when `--module-type Form`.
        #[arg(long)]
        form: Option<String>,
    },
    /// List a module's procedure declarations in source order.
    Procedures {
        object: String,
        #[arg(long, default_value = "Object")]
        module_type: String,
        #[arg(long)]
        form: Option<String>,
    },
}

#[derive(Subcommand)]
enum FormAction {
    /// Find forms by name and/or owning object (partial).
    Find {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        object: Option<String>,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Full structure of one form, including the depth-annotated item tree.
    Structure { object: String, form: String },
    /// Find form items by name and/or data path.
    Element {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        data_path: Option<String>,
        #[arg(long)]
        object: Option<String>,
        #[arg(long)]
        limit: Option<i64>,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Create a project.
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List all projects and their databases.
    List,
    /// Mark a project as active.
    Use { name: String },
    /// Remove a project from the registry (databases files stay on disk).
    Remove { name: String },
}

#[derive(Subcommand)]
enum DatabaseAction {
    /// Register a database under a project.
    Add {
        /// Project name.
        project: String,
        /// Database name within the project.
        name: String,
        /// Configuration export directory this database indexes.
        #[arg(long)]
        export: PathBuf,
        /// Database file; defaults to `<databases_dir>/<project>/<name>.db`.
        #[arg(long)]
        store: Option<PathBuf>,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Update a registered database's description or export path.
    Update {
        project: String,
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Remove a database from the registry (the file stays on disk).
    Remove { project: String, name: String },
}

fn parse_module_type(s: &str) -> Result<ModuleType> {
    ModuleType::parse(s)
        .ok_or_else(|| anyhow::anyhow!("unknown module type '{s}'; use Common, Manager, Object, or Form"))
}

fn parse_progress_mode(s: &str) -> Result<ProgressMode> {
    match s {
        "auto" => Ok(ProgressMode::default_for_tty()),
        "human" => Ok(ProgressMode::Human),
        "json" => Ok(ProgressMode::Json),
        "off" => Ok(ProgressMode::Off),
        other => bail!("unknown progress mode '{other}'; use auto, human, json, or off"),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolves the database file for this invocation: `--database` wins,
/// otherwise `--project`/`--db` through the registry.
fn resolve_store_path(cli: &Cli, cfg: &Config) -> Result<PathBuf> {
    if let Some(path) = &cli.database {
        return Ok(path.clone());
    }
    let (Some(project), Some(db_name)) = (&cli.project, &cli.db) else {
        bail!("no database selected; pass --database <path> or --project <name> --db <name>");
    };
    let registry = ProjectRegistry::load(&cfg.registry.projects_file)?;
    let entry = registry
        .find_database(project, db_name)
        .ok_or_else(|| anyhow::anyhow!("database '{db_name}' not found in project '{project}'"))?;
    Ok(entry.store_path.clone())
}

async fn open_store(cli: &Cli, cfg: &Config) -> Result<SqlitePool> {
    db::connect(&resolve_store_path(cli, cfg)?).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match &cli.command {
        Commands::Init => {
            let pool = open_store(&cli, &cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }

        Commands::Ingest { export, progress } => {
            let mode = parse_progress_mode(progress)?;
            let reporter = mode.reporter();
            let pool = open_store(&cli, &cfg).await?;
            let report = ingest::run_ingest(&pool, export, reporter.as_ref()).await?;
            pool.close().await;
            print_json(&report)?;
        }

        Commands::Search {
            query: search_query,
            object,
            module_type,
            limit,
        } => {
            let module_type = module_type.as_deref().map(parse_module_type).transpose()?;
            let pool = open_store(&cli, &cfg).await?;
            let hits = query::search_code(
                &pool,
                search_query,
                object.as_deref(),
                module_type,
                limit.unwrap_or(cfg.query.search_limit),
            )
            .await?;
            pool.close().await;
            print_json(&hits)?;
        }

        Commands::Object { action } => {
            let pool = open_store(&cli, &cfg).await?;
            match action {
                ObjectAction::Find {
                    name,
                    object_type,
                    limit,
                } => {
                    let results = query::find_objects(
                        &pool,
                        name,
                        object_type.as_deref(),
                        limit.unwrap_or(cfg.query.search_limit),
                    )
                    .await?;
                    print_json(&results)?;
                }
                ObjectAction::Structure { name } => {
                    let result = query::object_structure(&pool, name).await?;
                    print_json(&result)?;
                }
                ObjectAction::List { object_type, limit } => {
                    let groups = query::list_objects(
                        &pool,
                        object_type.as_deref(),
                        limit.unwrap_or(cfg.query.list_limit),
                    )
                    .await?;
                    print_json(&groups)?;
                }
            }
            pool.close().await;
        }

        Commands::Module { action } => {
            let pool = open_store(&cli, &cfg).await?;
            match action {
                ModuleAction::Code {
                    object,
                    module_type,
                    form,
                } => {
                    let module_type = parse_module_type(module_type)?;
                    match query::module_code(&pool, object, module_type, form.as_deref()).await? {
                        Some(code) => println!("{code}"),
                        None => println!("Module not found."),
                    }
                }
                ModuleAction::Procedures {
                    object,
                    module_type,
                    form,
                } => {
                    let module_type = parse_module_type(module_type)?;
                    let procedures =
                        query::module_procedures(&pool, object, module_type, form.as_deref())
                            .await?;
                    print_json(&procedures)?;
                }
            }
            pool.close().await;
        }

        Commands::Procedure {
            object,
            name,
            module_type,
            form,
        } => {
            let module_type = parse_module_type(module_type)?;
            let pool = open_store(&cli, &cfg).await?;
            let result =
                query::procedure_code(&pool, object, name, module_type, form.as_deref()).await?;
            pool.close().await;
            match result {
                Some(procedure) => print_json(&procedure)?,
                None => println!("Procedure not found."),
            }
        }

        Commands::Form { action } => {
            let pool = open_store(&cli, &cfg).await?;
            match action {
                FormAction::Find {
                    name,
                    object,
                    limit,
                } => {
                    let forms = query::find_forms(
                        &pool,
                        name.as_deref(),
                        object.as_deref(),
                        limit.unwrap_or(cfg.query.search_limit),
                    )
                    .await?;
                    print_json(&forms)?;
                }
                FormAction::Structure { object, form } => {
                    match query::form_structure(&pool, object, form).await? {
                        Some(structure) => print_json(&structure)?,
                        None => println!("Form not found."),
                    }
                }
                FormAction::Element {
                    name,
                    data_path,
                    object,
                    limit,
                } => {
                    let elements = query::find_form_elements(
                        &pool,
                        name.as_deref(),
                        data_path.as_deref(),
                        object.as_deref(),
                        limit.unwrap_or(cfg.query.search_limit),
                    )
                    .await?;
                    print_json(&elements)?;
                }
            }
            pool.close().await;
        }

        Commands::Options { object, element } => {
            let pool = open_store(&cli, &cfg).await?;
            let usages = query::functional_options(&pool, object, element.as_deref()).await?;
            pool.close().await;
            print_json(&usages)?;
        }

        Commands::Attribute { name, limit } => {
            let pool = open_store(&cli, &cfg).await?;
            let hits =
                query::find_attributes(&pool, name, limit.unwrap_or(cfg.query.search_limit))
                    .await?;
            pool.close().await;
            print_json(&hits)?;
        }

        Commands::Project { action } => {
            let mut registry = ProjectRegistry::load(&cfg.registry.projects_file)?;
            match action {
                ProjectAction::Create { name, description } => {
                    registry.create_project(name, description)?;
                    println!("Created project '{name}'.");
                }
                ProjectAction::List => {
                    print_json(&registry.projects())?;
                }
                ProjectAction::Use { name } => {
                    registry.set_active(name)?;
                    println!("Active project is now '{name}'.");
                }
                ProjectAction::Remove { name } => {
                    registry.remove_project(name)?;
                    println!("Removed project '{name}'.");
                }
            }
        }

        Commands::Database { action } => {
            let mut registry = ProjectRegistry::load(&cfg.registry.projects_file)?;
            match action {
                DatabaseAction::Add {
                    project,
                    name,
                    export,
                    store,
                    description,
                } => {
                    let store_path = store.clone().unwrap_or_else(|| {
                        cfg.registry
                            .databases_dir
                            .join(project)
                            .join(format!("{name}.db"))
                    });
                    registry.add_database(project, name, description, &store_path, export)?;
                    println!(
                        "Registered database '{name}' in project '{project}' at {}.",
                        store_path.display()
                    );
                }
                DatabaseAction::Update {
                    project,
                    name,
                    description,
                    export,
                } => {
                    registry.update_database(
                        project,
                        name,
                        description.as_deref(),
                        export.as_deref(),
                    )?;
                    println!("Updated database '{name}' in project '{project}'.");
                }
                DatabaseAction::Remove { project, name } => {
                    registry.remove_database(project, name)?;
                    println!("Removed database '{name}' from project '{project}'.");
                }
            }
        }
    }

    Ok(())
}
