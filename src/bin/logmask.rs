use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use logmask::engine::{EngineConfig, MaskingEngine, MaskingServices};
use logmask::fields::FieldSpec;
use logmask::remote::RemoteMaskingApi;

#[derive(Parser, Debug)]
#[command(name = "logmask", version, about = "Field masking rule sync & preview")]
struct Cli {
    /// Base URL of the masking service API
    #[arg(long = "base-url")]
    base_url: String,

    /// Space identifier forwarded to the pattern matcher
    #[arg(long = "space-uid")]
    space_uid: String,

    /// Field set (index set) whose saved config is loaded and saved
    #[arg(long = "fieldset-id")]
    fieldset_id: i64,

    /// JSON file with the flat field descriptor list
    #[arg(long = "fields")]
    fields: String,

    /// Built-in field names. May be repeated.
    #[arg(long = "built-in")]
    built_in: Vec<String>,

    /// JSON file with an array of sample log documents
    #[arg(long = "samples")]
    samples: Option<String>,

    /// One-click rule generation from recommendations after loading
    #[arg(long = "generate", default_value_t = false)]
    generate: bool,

    /// Accept every drifted rule before printing
    #[arg(long = "sync-all", default_value_t = false)]
    sync_all: bool,

    /// Print only fields whose name contains this string
    #[arg(long = "search")]
    search: Option<String>,

    /// Persist the resulting table
    #[arg(long = "save", default_value_t = false)]
    save: bool,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let file = File::open(path).with_context(|| format!("opening {}", path))?;
    serde_json::from_reader(BufReader::new(file)).with_context(|| format!("parsing {}", path))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let specs: Vec<FieldSpec> = read_json(&cli.fields)?;
    let samples: Vec<Value> = match &cli.samples {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };

    let api = Arc::new(RemoteMaskingApi::new(&cli.base_url)?);
    let services = MaskingServices {
        matcher: api.clone(),
        renderer: api.clone(),
        store: api,
    };
    let config = EngineConfig {
        space_uid: cli.space_uid,
        fieldset_id: cli.fieldset_id,
    };

    let built_in: HashSet<String> = cli.built_in.into_iter().collect();
    let mut engine = MaskingEngine::new(services, config, specs, built_in);
    if !samples.is_empty() {
        engine.set_samples(samples).await;
    }
    engine.load().await?;

    if cli.generate {
        engine.generate_rules().await;
    }
    if cli.sync_all {
        engine.sync_all(None).await;
    }
    if cli.save {
        engine.save().await?;
    }

    let view = match &cli.search {
        Some(query) => engine.filtered_view(query),
        None => engine.table().to_vec(),
    };
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
