use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use grove_rag::openai::OpenAIClient;
use grove_rag::{BuildReport, Corpus, Language, Persona, RagConfig, RagConfigBuilder, RagPipeline};
use tracing::{info, warn};

const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

pub fn load_config(path: Option<&Path>) -> Result<RagConfig> {
    let Some(path) = path else {
        return Ok(RagConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: RagConfig = serde_json::from_str(&raw)
        .with_context(|| format!("parsing config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

pub fn with_chunking(
    config: RagConfig,
    max_tokens: Option<usize>,
    overlap_tokens: Option<usize>,
) -> Result<RagConfig> {
    let mut builder = RagConfigBuilder::from_config(config);
    if let Some(max) = max_tokens {
        builder = builder.max_tokens(max);
    }
    if let Some(overlap) = overlap_tokens {
        builder = builder.overlap_tokens(overlap);
    }
    Ok(builder.build()?)
}

pub fn load_persona(
    path: Option<&Path>,
    preset: Option<&str>,
    language: Option<&str>,
) -> Result<Persona> {
    let mut persona = match (path, preset) {
        (Some(path), _) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading persona {}", path.display()))?;
            serde_json::from_str::<Persona>(&raw)
                .with_context(|| format!("parsing persona {}", path.display()))?
        }
        (None, Some(name)) => match Persona::preset(name) {
            Some(persona) => persona,
            None => bail!("unknown persona preset '{name}' (expected default or dr_c)"),
        },
        (None, None) => Persona::default(),
    };
    if let Some(language) = language {
        persona.language = language.parse::<Language>()?;
    }
    Ok(persona)
}

fn pipeline(config: RagConfig) -> Result<RagPipeline> {
    let client = Arc::new(
        OpenAIClient::from_env()?
            .with_embedding_model(&config.embedding_model)
            .with_chat_model(&config.chat_model),
    );
    Ok(RagPipeline::builder().config(config).embedding_provider(client.clone()).chat_model(client).build()?)
}

/// Expand directories into the supported files they contain, sorted by name.
fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }
        let mut found: Vec<PathBuf> = std::fs::read_dir(input)
            .with_context(|| format!("listing {}", input.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| SUPPORTED_EXTENSIONS.iter().any(|s| e.eq_ignore_ascii_case(s)))
            })
            .collect();
        found.sort();
        if found.is_empty() {
            warn!(dir = %input.display(), "no supported documents in directory");
        }
        files.extend(found);
    }
    if files.is_empty() {
        bail!("no input documents");
    }
    Ok(files)
}

fn print_report(report: &BuildReport, corpus: &Corpus) {
    for doc in &report.documents {
        println!("{:>6}  {}", doc.segment_count, doc.source_id);
    }
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    println!("{} segments added, {} in corpus", report.segment_count, corpus.len());
}

pub async fn build(config: RagConfig, corpus_dir: &Path, inputs: &[PathBuf]) -> Result<()> {
    let files = collect_inputs(inputs)?;
    let pipeline = pipeline(config)?;
    let (corpus, report) = pipeline.build_corpus_from_paths(&files).await?;
    corpus.save(corpus_dir)?;
    info!(path = %corpus_dir.display(), segment_count = corpus.len(), "corpus built");
    print_report(&report, &corpus);
    Ok(())
}

pub async fn append(config: RagConfig, corpus_dir: &Path, inputs: &[PathBuf]) -> Result<()> {
    let files = collect_inputs(inputs)?;
    let mut corpus = Corpus::load_for_model(corpus_dir, &config.embedding_model)?;
    let pipeline = pipeline(config)?;
    let report = pipeline.append_paths(&mut corpus, &files).await?;
    corpus.save(corpus_dir)?;
    print_report(&report, &corpus);
    Ok(())
}

pub async fn search(
    config: RagConfig,
    corpus_dir: &Path,
    query: &str,
    k: Option<usize>,
    json: bool,
) -> Result<()> {
    let corpus = Corpus::load_for_model(corpus_dir, &config.embedding_model)?;
    let k = k.unwrap_or(config.top_k);
    let pipeline = pipeline(config)?;
    let results = pipeline.retriever(&corpus).retrieve_with_k(query, k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. [{}] {:.4}  {}",
            rank + 1,
            result.record.source_id,
            result.similarity_score,
            result.record.preview
        );
    }
    Ok(())
}

pub async fn ask(
    config: RagConfig,
    corpus_dir: &Path,
    question: &str,
    k: Option<usize>,
    persona: &Persona,
    json: bool,
) -> Result<()> {
    let corpus = Corpus::load_for_model(corpus_dir, &config.embedding_model)?;
    let k = k.unwrap_or(config.top_k);
    let pipeline = pipeline(config)?;
    let results = pipeline.retriever(&corpus).retrieve_with_k(question, k).await?;
    let answer = pipeline.composer()?.compose_answer(question, &results, persona).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        println!("{answer}");
    }
    Ok(())
}

pub fn inspect(corpus_dir: &Path, json: bool) -> Result<()> {
    let corpus = Corpus::load(corpus_dir)?;
    let stats = corpus.stats();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("model:     {}", stats.embedding_model);
    match stats.dimension {
        Some(dim) => println!("dimension: {dim}"),
        None => println!("dimension: -"),
    }
    println!("segments:  {}", stats.segment_count);
    for (source, count) in &stats.segments_per_source {
        println!("{count:>6}  {source}");
    }
    Ok(())
}
