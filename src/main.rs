use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use raglab::{
    config::Config,
    embedding::embedding_client,
    generation::generation_client,
    logging,
    qdrant::{ConstraintSpec, FieldSchema, QdrantService},
    retrieval::RetrievalService,
};
use serde_json::{Map, Value, json};

#[derive(Parser)]
#[command(
    name = "raglab",
    about = "Retrieval experimentation harness over Qdrant"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage Qdrant collections.
    Collections {
        #[command(subcommand)]
        command: CollectionsCommand,
    },
    /// Embed texts and upsert them into a collection.
    Index {
        /// Target collection (defaults to QDRANT_COLLECTION_NAME).
        #[arg(long)]
        collection: Option<String>,
        /// Text to index; repeatable.
        #[arg(long = "text", required = true)]
        texts: Vec<String>,
        /// JSON payload paired with each text; repeatable.
        #[arg(long = "payload")]
        payloads: Vec<String>,
    },
    /// Run a filtered similarity search.
    Search {
        /// Query text to embed.
        query: String,
        /// Target collection (defaults to QDRANT_COLLECTION_NAME).
        #[arg(long)]
        collection: Option<String>,
        /// Constraint spec as JSON, e.g. '{"must": {"location": "london"}}'.
        #[arg(long)]
        filter: Option<String>,
        /// Maximum number of results.
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Answer a question over retrieved context.
    Ask {
        /// Question to answer.
        question: String,
        /// Target collection (defaults to QDRANT_COLLECTION_NAME).
        #[arg(long)]
        collection: Option<String>,
        /// Constraint spec as JSON.
        #[arg(long)]
        filter: Option<String>,
        /// Maximum number of context hits.
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum CollectionsCommand {
    /// List collections present in Qdrant.
    List,
    /// Create a collection sized to the embedding dimension.
    Create {
        /// Collection name.
        name: String,
    },
    /// Delete a collection.
    Delete {
        /// Collection name.
        name: String,
    },
    /// Create a payload field index on a collection.
    IndexField {
        /// Collection name.
        name: String,
        /// Payload field to index.
        field: String,
        /// Field schema: keyword, integer, float, bool, or datetime.
        #[arg(long, default_value = "keyword")]
        schema: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;

    let qdrant = QdrantService::from_config(&config).context("failed to build Qdrant client")?;
    let service = RetrievalService::new(
        embedding_client(&config),
        generation_client(&config),
        qdrant,
    );

    match cli.command {
        Command::Collections { command } => run_collections(&service, command).await,
        Command::Index {
            collection,
            texts,
            payloads,
        } => {
            let collection = collection.unwrap_or_else(|| config.qdrant_collection_name.clone());
            let payloads = parse_payloads(&texts, payloads)?;
            service.ensure_collection(&collection).await?;
            let count = service.index_texts(&collection, texts, payloads).await?;
            println!("Indexed {count} texts into `{collection}`.");
            Ok(())
        }
        Command::Search {
            query,
            collection,
            filter,
            limit,
        } => {
            let collection = collection.unwrap_or_else(|| config.qdrant_collection_name.clone());
            let spec = parse_filter(filter.as_deref())?;
            let hits = service
                .search(&collection, &query, limit, spec.as_ref())
                .await?;
            let rendered: Vec<Value> = hits
                .into_iter()
                .map(|hit| {
                    json!({
                        "id": hit.id,
                        "score": hit.score,
                        "payload": hit.payload,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rendered)?);
            Ok(())
        }
        Command::Ask {
            question,
            collection,
            filter,
            limit,
        } => {
            let collection = collection.unwrap_or_else(|| config.qdrant_collection_name.clone());
            let spec = parse_filter(filter.as_deref())?;
            let answer = service
                .answer(&collection, &question, limit, spec.as_ref())
                .await?;
            println!("{}", answer.text);
            Ok(())
        }
    }
}

async fn run_collections(service: &RetrievalService, command: CollectionsCommand) -> Result<()> {
    match command {
        CollectionsCommand::List => {
            for name in service.list_collections().await? {
                println!("{name}");
            }
            Ok(())
        }
        CollectionsCommand::Create { name } => {
            service.ensure_collection(&name).await?;
            println!("Collection `{name}` ready.");
            Ok(())
        }
        CollectionsCommand::Delete { name } => {
            service.delete_collection(&name).await?;
            println!("Collection `{name}` deleted.");
            Ok(())
        }
        CollectionsCommand::IndexField {
            name,
            field,
            schema,
        } => {
            let schema = parse_schema(&schema)?;
            service.create_field_index(&name, &field, schema).await?;
            println!("Index on `{field}` ready for `{name}`.");
            Ok(())
        }
    }
}

/// Parse repeatable `--payload` JSON objects and pair them with the texts.
///
/// Missing payloads default to empty objects; the indexed text is stored
/// under the `text` field unless the payload already sets one.
fn parse_payloads(texts: &[String], raw: Vec<String>) -> Result<Vec<Map<String, Value>>> {
    if !raw.is_empty() && raw.len() != texts.len() {
        bail!(
            "{} payloads supplied for {} texts; counts must match",
            raw.len(),
            texts.len()
        );
    }

    let mut payloads = Vec::with_capacity(texts.len());
    for (index, text) in texts.iter().enumerate() {
        let mut payload = match raw.get(index) {
            Some(source) => {
                let value: Value = serde_json::from_str(source)
                    .with_context(|| format!("failed to parse payload #{}", index + 1))?;
                match value {
                    Value::Object(map) => map,
                    other => bail!("payload #{} must be a JSON object, got {other}", index + 1),
                }
            }
            None => Map::new(),
        };
        payload
            .entry("text".to_string())
            .or_insert_with(|| Value::String(text.clone()));
        payloads.push(payload);
    }
    Ok(payloads)
}

fn parse_filter(raw: Option<&str>) -> Result<Option<ConstraintSpec>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(raw).context("failed to parse filter JSON")?;
    let spec = ConstraintSpec::from_value(&value).context("invalid constraint spec")?;
    Ok(Some(spec))
}

fn parse_schema(token: &str) -> Result<FieldSchema> {
    match token.to_lowercase().as_str() {
        "keyword" => Ok(FieldSchema::Keyword),
        "integer" => Ok(FieldSchema::Integer),
        "float" => Ok(FieldSchema::Float),
        "bool" => Ok(FieldSchema::Bool),
        "datetime" => Ok(FieldSchema::Datetime),
        other => bail!("unknown field schema `{other}`"),
    }
}
