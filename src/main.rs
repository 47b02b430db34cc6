use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use versebert::{
    ConfigDb,
    DataDir,
    EmbedderSpec,
    Retriever,
    VerseIndex,
    config_db::MODEL_SETTING,
    embedder_spec::{self, ModelSource},
    embedding::InputPolicy,
    error::{self, Error},
    indexer::{self, BuildOptions},
    mcp,
    search,
};

mod cli;

use cli::{Cli, Command, ModelAction};

const LOG_ENV_VAR: &str = "VERSEBERT_LOG";

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var(LOG_ENV_VAR) {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;
    let model = cli.model.as_deref();

    match cli.command {
        Command::Index(args) => {
            cmd_index(&config_db, &data_dir, model, &args, cli.quiet)?;
        }
        Command::Search(args) => {
            let retriever =
                open_retriever(&config_db, &data_dir, model, args.index.as_deref())?;
            let results = retriever.query(&args.query, args.count)?;
            if args.json {
                search::format_json(&results, &args.query)?;
            } else {
                search::format_human(&results);
            }
        }
        Command::Get(args) => {
            cmd_get(&data_dir, &args)?;
        }
        Command::Status(args) => {
            cmd_status(&config_db, &data_dir, model, &args)?;
        }
        Command::Mcp(args) => {
            let retriever =
                open_retriever(&config_db, &data_dir, model, args.index.as_deref())?;
            mcp::run_mcp(retriever)?;
        }
        Command::Model { action } => match action {
            ModelAction::Show { json } => {
                model_show(&config_db, model, json)?;
            }
            ModelAction::Set { model } => {
                let spec: EmbedderSpec = model.parse()?;
                config_db.set_setting(MODEL_SETTING, &spec.to_string())?;
                println!("Default model set to '{spec}'");
            }
            ModelAction::Clear => {
                if config_db.remove_setting(MODEL_SETTING)? {
                    println!("Cleared stored model setting");
                } else {
                    println!("No stored model setting");
                }
            }
        },
        Command::Completions(_) => {}
    }

    Ok(())
}

fn index_path(data_dir: &DataDir, explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(|| data_dir.index_path(), Path::to_path_buf)
}

/// Load the index and bind the embedder that will encode queries.
///
/// Without an explicit model choice the index's own recorded embedder is
/// used, so a plain `search` always matches whatever `index` built.
fn open_retriever(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    model: Option<&str>,
    explicit_index: Option<&Path>,
) -> error::Result<Retriever> {
    let path = index_path(data_dir, explicit_index);
    let index = VerseIndex::load(&path)?;

    let resolution = embedder_spec::resolve_model(model, config_db)?;
    let spec = if resolution.source == ModelSource::Default {
        EmbedderSpec::from_descriptor(&index.binding().embedder)
    } else {
        resolution.spec
    };
    info!(model = %spec, "binding query embedder");

    Retriever::new(index, spec.build()?)
}

fn cmd_index(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    model: Option<&str>,
    args: &cli::IndexArgs,
    quiet: bool,
) -> error::Result<()> {
    let resolution = embedder_spec::resolve_model(model, config_db)?;
    let embedder = resolution.spec.build()?;
    let dest = index_path(data_dir, args.output.as_deref());

    let options = BuildOptions {
        batch_size: args.batch_size,
        input: InputPolicy {
            max_chars: args.max_chars,
            overlong: args.overlong.into(),
        },
        progress: !args.no_progress && !quiet,
    };

    info!(
        corpus = %args.corpus.display(),
        model = %resolution.spec,
        source = resolution.source.as_str(),
        "building index"
    );
    let stats =
        indexer::index_corpus_file(&args.corpus, embedder.as_ref(), &dest, &options)?;

    eprintln!(
        "Indexed {} verses with {} (dimension {}) in {:.1}s -> {}",
        stats.passages,
        stats.model_id,
        stats.dimension,
        stats.elapsed.as_secs_f64(),
        dest.display()
    );
    Ok(())
}

fn cmd_get(data_dir: &DataDir, args: &cli::GetArgs) -> error::Result<()> {
    let index = VerseIndex::load(&index_path(data_dir, args.index.as_deref()))?;
    let passage = index.find(&args.citation)?;

    if args.json {
        let value = json!({
            "citation": passage.citation(),
            "collection": passage.source_ref.collection,
            "chapter": passage.source_ref.major,
            "verse": passage.source_ref.minor,
            "text": passage.text,
        });
        println!("{value}");
    } else {
        println!("{}: {}", passage.citation(), passage.text);
    }
    Ok(())
}

fn cmd_status(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    model: Option<&str>,
    args: &cli::StatusArgs,
) -> error::Result<()> {
    let resolution = embedder_spec::resolve_model(model, config_db)?;
    let path = index_path(data_dir, args.index.as_deref());

    let index = match VerseIndex::load(&path) {
        Ok(index) => Some(index),
        Err(Error::IndexNotFound(_)) => None,
        Err(e) => {
            warn!("{e}");
            None
        }
    };

    if args.json {
        let index_json = index.as_ref().map(|index| {
            json!({
                "passages": index.len(),
                "model": index.binding().embedder.model_id,
                "dimension": index.dimension(),
                "max_chars": index.binding().input.max_chars,
                "overlong": index.binding().input.overlong,
            })
        });
        let value = json!({
            "data_dir": data_dir.root().display().to_string(),
            "model": resolution.spec.to_string(),
            "model_source": resolution.source.as_str(),
            "index_path": path.display().to_string(),
            "index": index_json,
        });
        println!("{value}");
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!(
            "Model: {} ({})",
            resolution.spec,
            resolution.source.as_str()
        );
        println!("Index: {}", path.display());
        match &index {
            Some(index) => {
                let binding = index.binding();
                println!("  Verses: {}", index.len());
                println!(
                    "  Built with: {} (dimension {})",
                    binding.embedder.model_id, binding.embedder.dimension
                );
                println!(
                    "  Input limit: {} chars ({})",
                    binding.input.max_chars, binding.input.overlong
                );
            }
            None => println!("  not built (run `versebert index <corpus>`)"),
        }
    }
    Ok(())
}

fn model_show(
    config_db: &ConfigDb,
    model: Option<&str>,
    json: bool,
) -> error::Result<()> {
    let resolution = embedder_spec::resolve_model(model, config_db)?;
    let stored = config_db.get_setting(MODEL_SETTING)?;

    if json {
        let value = json!({
            "model": resolution.spec.to_string(),
            "source": resolution.source.as_str(),
            "stored": stored,
        });
        println!("{value}");
    } else {
        println!("{} ({})", resolution.spec, resolution.source.as_str());
        if let Some(stored) = stored
            && resolution.source != ModelSource::Config
        {
            println!("stored setting: {stored}");
        }
    }
    Ok(())
}
