//! Command-line interface (spec §4.7 ambient addition): `put`/`get`/`find`/
//! `rm` for one-shot scripting use, and `serve` for a long-lived process
//! that keeps the index warm and drains the optimizer queue. Structured the
//! way the teacher's own `clap` CLI is: a top-level `Cli` with global flags
//! plus a `Commands` enum, `run()` dispatching into the store.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::index::{FindQuery, QueryValue};
use crate::property::{PropertyBag, PropertyValue};
use crate::store::ObjectStore;

#[derive(Parser, Debug)]
#[command(name = "cubby")]
#[command(author, version, about = "A crash-safe per-user object store", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Profile name, namespacing the datastore root under $HOME/.cubbystore.
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Use an explicit datastore root instead of resolving one from profile.
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short = 'l', long, global = true, default_value = "info")]
    pub loglevel: String,

    /// Suppress informational logging.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new entry.
    Put {
        /// Payload file to store. Omit to create a metadata-only entry.
        file: Option<PathBuf>,

        /// A `name=value` property, repeatable.
        #[arg(short = 'p', long = "property", value_parser = parse_property)]
        properties: Vec<(String, String)>,

        /// Move the file into the store instead of copying it.
        #[arg(short = 'm', long = "move")]
        transfer_ownership: bool,
    },

    /// Retrieve an entry's payload, writing a path to stdout.
    Get {
        uid: String,

        /// Directory to place the retrieved copy into (defaults to a
        /// scratch directory under the datastore root).
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Print an entry's properties as JSON.
    Properties { uid: String },

    /// Query entries, printing a JSON array of property bags.
    Find {
        /// Free-text query string.
        #[arg(short = 'q', long)]
        query: Option<String>,

        /// An exact-match `name=value` filter, repeatable.
        #[arg(short = 'p', long = "property", value_parser = parse_property)]
        properties: Vec<(String, String)>,

        #[arg(long, default_value = "0")]
        offset: usize,

        #[arg(long)]
        limit: Option<usize>,

        /// Sort key: `+timestamp`, `-timestamp`, `+title`, `-title`.
        #[arg(long)]
        order_by: Option<String>,
    },

    /// Distinct values seen for a structured property (e.g. `activity`).
    UniqueValues { property: String },

    /// Permanently delete an entry.
    Rm { uid: String },

    /// Run as a long-lived process draining the optimizer queue and
    /// periodically flushing the index on a timer.
    Serve,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {:?}", raw))?;
    Ok((key.to_string(), value.to_string()))
}

fn properties_to_bag(pairs: &[(String, String)]) -> PropertyBag {
    let mut bag = PropertyBag::new();
    for (key, value) in pairs {
        bag.insert(key.clone(), PropertyValue::Text(value.clone()));
    }
    bag
}

#[derive(Serialize)]
struct PropertyBagView(BTreeMap<String, String>);

fn view_of(bag: &PropertyBag) -> PropertyBagView {
    PropertyBagView(bag.iter().map(|(k, v)| (k.clone(), v.to_display_string())).collect())
}

pub async fn run(cli: Cli, cancel_token: CancellationToken) -> Result<()> {
    let mut config = Config::from_env();
    if let Some(profile) = cli.profile {
        config.profile = profile;
    }
    if let Some(root) = cli.root {
        config = Config::with_root(root);
    }

    let store = ObjectStore::open(config).await.context("opening datastore")?;

    match cli.command {
        Commands::Put { file, properties, transfer_ownership } => {
            let bag = properties_to_bag(&properties);
            let uid = store
                .create(bag, file.as_deref(), transfer_ownership)
                .await
                .context("creating entry")?;
            println!("{}", uid);
        }

        Commands::Get { uid, output_dir } => {
            if let Some(dir) = output_dir {
                std::fs::create_dir_all(&dir)?;
            }
            match store.get_filename(&uid).await.context("retrieving payload")? {
                Some(path) => println!("{}", path.display()),
                None => return Err(anyhow!("entry {} has no payload", uid)),
            }
        }

        Commands::Properties { uid } => {
            let bag = store.get_properties(&uid).context("reading properties")?;
            println!("{}", serde_json::to_string_pretty(&view_of(&bag))?);
        }

        Commands::Find { query, properties, offset, limit, order_by } => {
            let mut fq = FindQuery::default();
            fq.query_string = query;
            fq.offset = offset;
            if let Some(limit) = limit {
                fq.set_limit(limit);
            }
            fq.order_by = order_by;
            for (key, value) in properties {
                fq.terms.insert(key, QueryValue::Exact(value));
            }

            let (entries, total) = store.find(fq, None).await.context("running query")?;
            let views: Vec<_> = entries.iter().map(view_of).collect();
            println!("{}", serde_json::to_string_pretty(&views)?);
            if !cli.quiet {
                info!("{} of {} total matches", views.len(), total);
            }
        }

        Commands::UniqueValues { property } => {
            let values = store.get_unique_values_for(&property).await.context("listing unique values")?;
            println!("{}", serde_json::to_string_pretty(&values)?);
        }

        Commands::Rm { uid } => {
            store.delete(&uid).await.context("deleting entry")?;
        }

        Commands::Serve => {
            serve(store, cancel_token).await?;
        }
    }

    Ok(())
}

/// The long-lived event loop (spec §5): periodically flush the index so a
/// crash loses at most one interval's worth of writes, and drain the
/// optimizer queue one entry at a time, the way the cooperative scheduler
/// this crate is modeled on would dispatch idle-priority work between
/// ticks rather than in a dedicated thread.
async fn serve(store: std::sync::Arc<ObjectStore>, cancel_token: CancellationToken) -> Result<()> {
    info!("cubby serve: datastore at {:?}", store.root_path());

    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                break;
            }
            _ = ticker.tick() => {
                match store.process_optimizer_queue().await {
                    Ok(n) if n > 0 => info!("optimizer: processed {} queued entries", n),
                    Ok(_) => {}
                    Err(e) => warn!("optimizer pass failed: {}", e),
                }
            }
        }
    }

    info!("cubby serve: shutting down");
    if let Err(e) = store.stop().await {
        warn!("error during shutdown: {}", e);
    }
    Ok(())
}
