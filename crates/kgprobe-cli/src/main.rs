//! kgprobe — smoke test for the local knowledge-graph pipeline.

use std::path::{Path, PathBuf};

use tracing::info;
use tracing_subscriber::EnvFilter;

use kgprobe_core::{DataPaths, ProbeConfig};
use kgprobe_runtime::{GraphMemory, ProbeRun};
use kgprobe_store::SqliteStore;

const DEFAULT_DATA_DIR: &str = ".kgprobe";

fn resolve_data_dir() -> PathBuf {
    std::env::var("KGPROBE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR))
}

/// Report store contents without contacting the model server.
fn print_stats(data_dir: &Path) -> anyhow::Result<()> {
    let paths = DataPaths::new(data_dir)?;
    let store = SqliteStore::open(&paths.system)
        .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;
    let stats = store.get_stats()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    if let Some(run) = store.latest_pipeline_run(kgprobe_runtime::memory::COGNIFY_PIPELINE)? {
        println!("{}", serde_json::to_string_pretty(&run)?);
    }
    Ok(())
}

async fn print_models(config: &ProbeConfig) -> anyhow::Result<()> {
    let client = kgprobe_infer::OllamaClient::new(&config.llm)?;
    let models = client.list_models().await?;
    println!("Models at {}:", client.endpoint());
    for name in &models {
        let marker = if *name == config.llm.model || *name == config.llm.embedding_model {
            "*"
        } else {
            " "
        };
        println!("  {} {}", marker, name);
    }
    if models.is_empty() {
        println!("  (none pulled)");
    }
    Ok(())
}

async fn run_probe(config: ProbeConfig) -> anyhow::Result<()> {
    let (llm, embedder) = kgprobe_infer::create_backends(&config.llm)?;
    let memory = GraphMemory::open(config.data_paths, llm, embedder)?;

    let mut probe = ProbeRun::default();
    let mut stdout = std::io::stdout().lock();
    let outcome = probe.execute(&memory, &mut stdout).await?;
    info!("Probe outcome: {:?}", outcome);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout is the probe report
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let data_dir = resolve_data_dir();

    if args.len() > 1 {
        match args[1].as_str() {
            "stats" => return print_stats(&data_dir),
            "models" => {
                let config = ProbeConfig::from_env(&data_dir)?;
                return print_models(&config).await;
            }
            "--help" | "-h" | "help" => {
                println!("kgprobe — knowledge-graph pipeline smoke test");
                println!();
                println!("Usage: kgprobe [command]");
                println!();
                println!("Commands:");
                println!("  (none)    Reset, add a sample text, cognify, then search \"AI\"");
                println!("  stats     Print store statistics as JSON");
                println!("  models    List models available on the LLM endpoint");
                println!("  help      Show this help message");
                println!();
                println!("Environment:");
                println!("  KGPROBE_DATA_DIR       Data directory (default ./{})", DEFAULT_DATA_DIR);
                println!("  LLM_ENDPOINT           Ollama base URL");
                println!("  LLM_MODEL              Chat model");
                println!("  EMBEDDING_MODEL        Embedding model");
                println!("  EMBEDDING_DIMENSIONS   Embedding vector size");
                println!("  LLM_TIMEOUT_SECS       Per-request timeout");
                println!("  EMBEDDINGS_ENABLED     false for keyword and graph search only");
                println!("  RUST_LOG               Log filter (default error)");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'kgprobe help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    info!("Data directory: {}", data_dir.display());
    let config = ProbeConfig::from_env(&data_dir)?;
    run_probe(config).await
}
