use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::sync::Arc;

use ragify::config::{EmbedderKind, Settings};
use ragify::source::is_remote;
use ragify::{
    logging, ArtifactLocator, Embedder, HashingEmbedder, IndexStore, RetrievalService,
    SearchResponse,
};

#[derive(Parser)]
#[command(name = "ragify")]
#[command(version = "0.1")]
#[command(about = "Turn documents into searchable vector indexes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, embed and persist a document (local path or http(s) URL)
    Ingest { source: String },
    /// Query an artifact by name or by path to its .meta file
    Search {
        artifact: String,
        query: String,
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// List artifacts in the store directory
    List,
    /// Print the pages stored in an artifact
    Inspect { artifact: String },
    /// Print the effective configuration
    Config,
}

fn build_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    match settings.embedder {
        EmbedderKind::Hashing => Ok(Arc::new(HashingEmbedder::new(settings.dimensions))),
        #[cfg(feature = "fastembed")]
        EmbedderKind::FastEmbed => {
            let embedder = ragify::FastEmbedder::from_name(&settings.model)
                .with_context(|| format!("Failed to load fastembed model '{}'", settings.model))?;
            Ok(Arc::new(embedder))
        }
        #[cfg(not(feature = "fastembed"))]
        EmbedderKind::FastEmbed => {
            anyhow::bail!("ragify was built without the 'fastembed' feature")
        }
    }
}

fn read_source(source: &str) -> Result<Vec<u8>> {
    if is_remote(source) {
        let response = reqwest::blocking::get(source)
            .with_context(|| format!("Failed to fetch '{}'", source))?
            .error_for_status()
            .with_context(|| format!("Server rejected request for '{}'", source))?;
        let bytes = response
            .bytes()
            .with_context(|| format!("Failed to read body of '{}'", source))?;
        Ok(bytes.to_vec())
    } else {
        fs::read(source).with_context(|| format!("Failed to read '{}'", source))
    }
}

fn ingest_command(service: &RetrievalService, source: &str) -> Result<()> {
    let bytes = read_source(source)?;
    let report = service
        .ingest(&bytes, source)
        .with_context(|| format!("Failed to ingest '{}'", source))?;

    let output = serde_json::json!({
        "status": "success",
        "artifact": report.locator.name,
        "meta_path": report.locator.meta_path(),
        "vectors_path": report.locator.vectors_path(),
        "page_count": report.page_count,
        "dimension": report.dimension,
    });
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn search_command(
    service: &RetrievalService,
    settings: &Settings,
    artifact: &str,
    query: &str,
    k: Option<usize>,
) -> Result<()> {
    let top_k = k.unwrap_or(settings.top_k);
    let locator = service.store().resolve(artifact);
    let response = service
        .search(query, &locator, top_k)
        .with_context(|| format!("Search against '{}' failed", locator))?;

    let output = search_output(&response, &locator, top_k);
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn search_output(
    response: &SearchResponse,
    locator: &ArtifactLocator,
    requested: usize,
) -> serde_json::Value {
    serde_json::json!({
        "query": response.query,
        "artifact": locator.name,
        "record_count": response.record_count,
        "requested_results_count": requested,
        "actual_results_count": response.results.len(),
        "results": response.results,
    })
}

fn list_command(store: &IndexStore) -> Result<()> {
    for name in store.list()? {
        println!("{}", name);
    }
    Ok(())
}

fn inspect_command(store: &IndexStore, artifact: &str) -> Result<()> {
    let locator = store.resolve(artifact);
    let artifact = store
        .load(&locator)
        .with_context(|| format!("Failed to load '{}'", locator))?;

    let output = serde_json::json!({
        "artifact": locator.name,
        "model": artifact.model_id,
        "dimension": artifact.index.dimension(),
        "record_count": artifact.index.len(),
        "pages": artifact.pages,
    });
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = Settings::new()?;
    logging::init(&settings.log_level);

    let store = IndexStore::new(&settings.store_dir);

    match args.command {
        Commands::Ingest { source } => {
            let service = RetrievalService::new(build_embedder(&settings)?, store);
            ingest_command(&service, &source)?
        }
        Commands::Search { artifact, query, k } => {
            let service = RetrievalService::new(build_embedder(&settings)?, store);
            search_command(&service, &settings, &artifact, &query, k)?
        }
        Commands::List => list_command(&store)?,
        Commands::Inspect { artifact } => inspect_command(&store, &artifact)?,
        Commands::Config => settings.print_config(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragify::SearchResult;

    #[test]
    fn search_output_reports_artifact_size_and_counts() {
        let locator = IndexStore::new("store").locate("lecture");
        let response = SearchResponse {
            query: "alpha".to_string(),
            record_count: 12,
            results: vec![SearchResult {
                page_number: 3,
                text: "alpha beta".to_string(),
                similarity_score: 0.25,
            }],
        };

        let output = search_output(&response, &locator, 5);
        let object = output.as_object().unwrap();
        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "actual_results_count",
                "artifact",
                "query",
                "record_count",
                "requested_results_count",
                "results",
            ]
        );
        assert_eq!(output["record_count"], 12);
        assert_eq!(output["requested_results_count"], 5);
        assert_eq!(output["actual_results_count"], 1);
        assert_eq!(output["artifact"], "lecture");
        assert_eq!(output["results"][0]["page_number"], 3);
    }
}
