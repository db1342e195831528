use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use kb_rag_core::{
    IngestionOptions, IngestionReport, ModelServiceConfig, PdfConverterKind, RagConfig,
    RagPipeline, RetrievalOptions, SearchError, SearchStoreConfig,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "kb-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    models: ModelArgs,

    #[command(flatten)]
    search: SearchArgs,

    #[command(flatten)]
    ingestion: IngestionArgs,
}

#[derive(Args)]
struct ModelArgs {
    /// Base URL of the OpenAI-compatible model API
    #[arg(long, env = "RAG_BASE_URL", default_value = "https://api.siliconflow.cn/v1")]
    base_url: String,

    /// Bearer token for the model API
    #[arg(long, env = "RAG_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "RAG_EMBEDDING_MODEL", default_value = "BAAI/bge-m3")]
    embedding_model: String,

    #[arg(long, env = "RAG_RERANK_MODEL", default_value = "BAAI/bge-reranker-v2-m3")]
    rerank_model: String,

    #[arg(long, env = "RAG_CHAT_MODEL", default_value = "deepseek-ai/DeepSeek-V3")]
    chat_model: String,

    #[arg(long, env = "RAG_VISION_MODEL", default_value = "Qwen/Qwen2-VL-72B-Instruct")]
    vision_model: String,
}

#[derive(Args)]
struct SearchArgs {
    /// Elasticsearch base URL
    #[arg(long, env = "RAG_ES_URL", default_value = "https://localhost:9200")]
    es_url: String,

    #[arg(long, env = "RAG_ES_USER", default_value = "elastic")]
    es_user: String,

    #[arg(long, env = "RAG_ES_PASSWORD", hide_env_values = true)]
    es_password: Option<String>,

    /// Reject self-signed cluster certificates
    #[arg(long, default_value_t = false)]
    strict_tls: bool,
}

#[derive(Args)]
struct IngestionArgs {
    /// Embedding vector length of the index mapping
    #[arg(long, env = "RAG_EMBEDDING_DIMENSIONS", default_value = "1024")]
    dimensions: usize,

    /// Parallel image descriptions per document
    #[arg(long, default_value = "5")]
    image_concurrency: usize,

    /// PDF to markdown command; `{input}` and `{output}` are substituted
    #[arg(long, env = "RAG_PDF_COMMAND", default_value = "magic-pdf")]
    pdf_command: String,

    /// Use the built-in text-only PDF converter instead of the command
    #[arg(long, default_value_t = false)]
    builtin_pdf: bool,

    /// Directory for converted PDF output
    #[arg(long, env = "RAG_PDF_OUTPUT")]
    pdf_output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// List knowledge bases and the files they contain.
    List,
    /// Create a knowledge base from a file or folder.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        path: PathBuf,
    },
    /// Add a file or folder to an existing knowledge base.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        path: PathBuf,
    },
    /// Answer a question from every knowledge base.
    Ask {
        #[arg(long)]
        question: String,
        /// Print the reranked sources after the answer.
        #[arg(long, default_value_t = false)]
        show_sources: bool,
    },
    /// Hybrid retrieval only, printing scored hits.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "10")]
        top_k: usize,
    },
}

impl Cli {
    fn config(&self) -> RagConfig {
        let pdf_converter = if self.ingestion.builtin_pdf {
            PdfConverterKind::Builtin
        } else {
            match PdfConverterKind::default() {
                PdfConverterKind::Command { args, .. } => PdfConverterKind::Command {
                    program: self.ingestion.pdf_command.clone(),
                    args,
                },
                builtin => builtin,
            }
        };

        RagConfig {
            models: ModelServiceConfig {
                base_url: self.models.base_url.clone(),
                api_key: self.models.api_key.clone(),
                embedding_model: self.models.embedding_model.clone(),
                rerank_model: self.models.rerank_model.clone(),
                chat_model: self.models.chat_model.clone(),
                vision_model: self.models.vision_model.clone(),
                ..ModelServiceConfig::default()
            },
            search: SearchStoreConfig {
                url: self.search.es_url.clone(),
                username: self.search.es_user.clone(),
                password: self.search.es_password.clone(),
                accept_invalid_certs: !self.search.strict_tls,
                timeout: Duration::from_secs(30),
            },
            ingestion: IngestionOptions {
                embedding_dimensions: self.ingestion.dimensions,
                image_concurrency: self.ingestion.image_concurrency,
                pdf_converter,
                pdf_output_root: self.ingestion.pdf_output.clone(),
                ..IngestionOptions::default()
            },
            retrieval: RetrievalOptions::default(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let pipeline = RagPipeline::from_config(&cli.config())?;
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "kb-rag boot"
    );

    match cli.command {
        Command::List => {
            let knowledge_bases = pipeline.knowledge_bases().await?;
            if knowledge_bases.is_empty() {
                println!("no knowledge bases yet");
            }
            for (position, knowledge_base) in knowledge_bases.iter().enumerate() {
                println!("{}. {}", position + 1, knowledge_base.name);
                if knowledge_base.files.is_empty() {
                    println!("   (no files)");
                }
                for file in &knowledge_base.files {
                    println!("   - {file}");
                }
            }
        }
        Command::Create { name, path } => {
            let report = pipeline.create_knowledge_base(&name, &path).await?;
            print_report(&report);
        }
        Command::Add { name, path } => {
            let report = pipeline.add_documents(&name, &path).await?;
            print_report(&report);
        }
        Command::Ask {
            question,
            show_sources,
        } => match pipeline.query(&question).await {
            Ok(answer) => {
                println!("{}", answer.text);
                if show_sources {
                    println!("\nsources (knowledge base {}):", answer.primary_index);
                    for (position, source) in answer.sources.iter().enumerate() {
                        println!(
                            "[{}] relevance={:.4} file={} header={}",
                            position + 1,
                            source.relevance_score,
                            source.result.metadata.file_name,
                            source.result.metadata.chunk_header
                        );
                    }
                }
            }
            Err(SearchError::NoIndicesAvailable) => {
                println!("no knowledge base exists yet, create one with `kb-rag create`");
            }
            Err(error) => return Err(error.into()),
        },
        Command::Search { query, top_k } => {
            let outcome = pipeline.search(&query, top_k).await?;
            println!("query: {query}");
            println!("primary knowledge base: {}", outcome.primary_index);
            for hit in outcome.results {
                println!(
                    "[{}] score={:.4} id={} file={}",
                    hit.index_name, hit.score, hit.id, hit.metadata.file_name
                );
                if let Some(img_url) = &hit.metadata.img_url {
                    println!("  img_url={img_url}");
                }
                println!("  {}", hit.content);
            }
        }
    }

    Ok(())
}

fn print_report(report: &IngestionReport) {
    for skipped in &report.skipped_files {
        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped file");
    }
    if !report.failed_writes.is_empty() {
        warn!(
            failed = report.failed_writes.len(),
            index = %report.index_name,
            "some chunks were not written"
        );
    }
    println!(
        "{} chunks from {} file(s) indexed into {} at {} ({} skipped)",
        report.chunks_indexed,
        report.files_ingested,
        report.index_name,
        Utc::now().to_rfc3339(),
        report.skipped_files.len()
    );
}
