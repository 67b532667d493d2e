use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use dqa_cli::{
    EvaluationDataset, Session, display_banner, handle_input_with_history, print_help,
    run_evaluation, ui,
};
use dqa_core::{EmbeddingProvider, Error, StyleOptions, Tone};
use dqa_ollama::{OllamaClient, OllamaConfig};
use dqa_rag::{
    CrossEncoderReranker, EmbeddingBackend, HashingEmbeddings, QaResponse, RerankerConfig,
    RetrievalConfig, SummaryStrategy, TeiCrossEncoder,
};

#[derive(Parser)]
#[command(name = "docqa", version)]
#[command(about = "Ask questions about your documents with a local language model", long_about = None)]
struct Cli {
    /// Answer from raw similarity results without cross-encoder re-ranking
    #[arg(long, global = true)]
    no_rerank: bool,

    /// Print answers token by token as they are generated
    #[arg(long, global = true)]
    stream: bool,

    /// Answer tone: neutral, professional, friendly, concise or detailed
    #[arg(long, global = true)]
    tone: Option<Tone>,

    /// Language answers are written in
    #[arg(long, global = true)]
    language: Option<String>,

    /// Log pipeline progress
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat interactively about a set of documents
    Chat {
        files: Vec<PathBuf>,
    },
    /// Answer a single question and exit
    Ask {
        files: Vec<PathBuf>,
        #[arg(short, long)]
        question: String,
    },
    /// Summarize documents and exit
    Summarize {
        files: Vec<PathBuf>,
        /// stuff (quick, samples the start and end) or refine (reads everything)
        #[arg(short, long, default_value = "stuff")]
        strategy: SummaryStrategy,
    },
    /// Score answers for a question set against expected answers
    Eval {
        file: PathBuf,
        /// JSON list of {question, ground_truth}; defaults to the Transformer paper questions
        #[arg(long)]
        dataset: Option<PathBuf>,
        /// Write the full report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut session = build_session(&cli).await?;

    match cli.command.unwrap_or(Commands::Chat { files: Vec::new() }) {
        Commands::Chat { files } => chat(&mut session, &files, cli.stream).await,
        Commands::Ask { files, question } => {
            if !process(&mut session, &files).await {
                return Ok(());
            }
            answer(&mut session, &question, cli.stream).await
        }
        Commands::Summarize { files, strategy } => {
            if !process(&mut session, &files).await {
                return Ok(());
            }
            summarize(&session, strategy).await
        }
        Commands::Eval { file, dataset, output } => {
            evaluate(&mut session, &file, dataset.as_deref(), output.as_deref()).await
        }
    }
}

async fn build_session(cli: &Cli) -> Result<Session> {
    let ollama = OllamaConfig::from_env()?;
    let retrieval = RetrievalConfig::from_env()?;
    let reranker_config = RerankerConfig::from_env()?;

    let client = Arc::new(OllamaClient::new(ollama)?);
    match client.health_check().await {
        Ok(models) if !models.chat_model => ui::warning(&format!(
            "Model '{}' is not pulled yet. Run: ollama pull {}",
            client.config().chat_model,
            client.config().chat_model
        )),
        Ok(_) => {}
        Err(e) => ui::warning(&format!("Ollama is not reachable: {}", e)),
    }

    let embedder: Arc<dyn EmbeddingProvider> = match retrieval.embedding_backend {
        EmbeddingBackend::Ollama => client.clone() as Arc<dyn EmbeddingProvider>,
        EmbeddingBackend::Hashing => Arc::new(HashingEmbeddings::default()),
    };

    let mut style = StyleOptions::default();
    if let Some(tone) = cli.tone {
        style.tone = tone;
    }
    if let Some(language) = &cli.language {
        style.language = language.clone();
    }

    let mut session = Session::new(client, embedder, retrieval)?.with_style(style);

    if reranker_config.enabled && !cli.no_rerank {
        let top_n = reranker_config.top_n;
        let encoder = TeiCrossEncoder::new(reranker_config)?;
        session = session.with_reranker(CrossEncoderReranker::new(Arc::new(encoder), top_n));
    }

    Ok(session)
}

/// Read and index `paths`, replacing whatever was processed before
///
/// Returns false when the session is left without an index.
async fn process(session: &mut Session, paths: &[PathBuf]) -> bool {
    if !paths.is_empty() {
        ui::progress(&format!("Processing {} document(s)...", paths.len()));
    }

    match session.process_paths(paths).await {
        Ok(report) => {
            ui::success(&format!(
                "Processed {} file(s), {} page(s), {} chunk(s). You can now ask questions.",
                report.files, report.pages, report.chunks
            ));
            true
        }
        Err(Error::NoDocuments(_)) if paths.is_empty() => {
            ui::warning("Please provide at least one document to process.");
            false
        }
        Err(e) => {
            ui::error(&format!("Processing failed: {}", e));
            false
        }
    }
}

async fn answer(session: &mut Session, question: &str, stream: bool) -> Result<()> {
    let result: Result<QaResponse, Error> = if stream {
        println!();
        let response = session.ask_stream(question, ui::print_token).await;
        println!();
        response
    } else {
        ui::progress("Thinking...");
        session.ask(question).await
    };

    match result {
        Ok(response) => {
            if !stream {
                println!();
                println!("{}", ui::render_markdown(&response.answer));
            }
            println!();
            ui::print_sources(&response.citations());
        }
        Err(e) => ui::error(&format!("Could not answer: {}", e)),
    }

    Ok(())
}

async fn summarize(session: &Session, strategy: SummaryStrategy) -> Result<()> {
    ui::progress(&format!("Writing a {} summary...", strategy));
    match session.summarize(strategy).await {
        Ok(summary) => {
            println!();
            println!("{}", "📝 Summary".bold());
            println!("{}", ui::render_markdown(&summary));
        }
        Err(e) => ui::error(&format!("Could not summarize: {}", e)),
    }
    Ok(())
}

async fn chat(session: &mut Session, files: &[PathBuf], stream: bool) -> Result<()> {
    display_banner();

    let mut loaded: Vec<PathBuf> = files.to_vec();
    process(session, &loaded).await;

    let mut history = Vec::new();

    loop {
        let input = handle_input_with_history(&mut history).await?;

        if input.is_empty() {
            continue;
        }

        let input_lower = input.to_lowercase();

        if input_lower == "exit" || input_lower == "quit" {
            println!("{}", "👋 Goodbye!".green());
            break;
        }

        if input_lower == "help" {
            print_help();
            continue;
        }

        if let Some(rest) = input.strip_prefix('/') {
            let mut parts = rest.split_whitespace();
            let command = parts.next().unwrap_or_default().to_lowercase();
            let args: Vec<&str> = parts.collect();

            match command.as_str() {
                "process" => {
                    if !args.is_empty() {
                        loaded = args.iter().map(|arg| PathBuf::from(*arg)).collect();
                    }
                    process(session, &loaded).await;
                }
                "summary" => match args.first().map(|s| s.parse::<SummaryStrategy>()) {
                    None => summarize(session, SummaryStrategy::Stuff).await?,
                    Some(Ok(strategy)) => summarize(session, strategy).await?,
                    Some(Err(e)) => ui::error(&e.to_string()),
                },
                "sources" => match session.last_sources() {
                    Some(sources) => ui::print_sources(sources),
                    None => ui::warning("Ask a question first."),
                },
                "style" => set_style(session, &args),
                "reset" => {
                    session.reset();
                    ui::success("Conversation cleared.");
                }
                _ => ui::warning(&format!("Unknown command '/{}'. Type 'help' for commands.", command)),
            }
            continue;
        }

        answer(session, &input, stream).await?;
    }

    Ok(())
}

fn set_style(session: &mut Session, args: &[&str]) {
    let Some(tone) = args.first() else {
        let style = session.style();
        println!("Tone: {}, language: {}", style.tone.to_string().bold(), style.language.bold());
        return;
    };

    match tone.parse::<Tone>() {
        Ok(tone) => {
            let mut style = session.style().clone();
            style.tone = tone;
            if args.len() > 1 {
                style.language = args[1..].join(" ");
            }
            ui::success(&format!("Answering in a {} tone, in {}.", style.tone, style.language));
            session.set_style(style);
        }
        Err(e) => ui::error(&e.to_string()),
    }
}

async fn evaluate(
    session: &mut Session,
    file: &Path,
    dataset: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let dataset = match dataset {
        Some(path) => EvaluationDataset::load(path)
            .with_context(|| format!("cannot load dataset {}", path.display()))?,
        None => EvaluationDataset::default(),
    };

    if !process(session, &[file.to_path_buf()]).await {
        return Ok(());
    }

    ui::progress(&format!("Running {} evaluation question(s)...", dataset.len()));
    let report = run_evaluation(session, &dataset).await?;

    for record in &report.records {
        println!();
        println!("{} {}", "Q:".bold(), record.question);
        println!("{} {}", "A:".bold(), record.answer);
        println!(
            "   context recall {:.2}, answer overlap {:.2}, faithfulness {:.2}, answer relevancy {:.2}",
            record.context_recall, record.answer_overlap, record.faithfulness, record.answer_relevancy
        );
    }

    println!();
    println!(
        "{} context recall {:.2}, answer overlap {:.2}, faithfulness {:.2}, answer relevancy {:.2}",
        "Mean:".bold(),
        report.mean_context_recall,
        report.mean_answer_overlap,
        report.mean_faithfulness,
        report.mean_answer_relevancy
    );

    if let Some(path) = output {
        report.write(path)?;
        ui::success(&format!("Report written to {}", path.display()));
    }

    Ok(())
}
