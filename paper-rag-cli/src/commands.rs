//! Subcommand handlers.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use paper_rag::openai::{MAX_BATCH_INPUTS, OpenAIChatProvider, OpenAIEmbeddingProvider};
use paper_rag::pdf::extract_pdf_pages;
use paper_rag::pgvector::PgStore;
use paper_rag::{
    AnswerEngine, BatchEmbedder, HnswParams, IndexState, IngestOutcome, IngestPipeline, NewPaper,
    PaperRepository, ParagraphChunker, ParameterTuner, RagError, RetrievalEngine, TuningConfig,
    VectorIndexManager, VectorStore, split_pages,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Settings;
use crate::output;
use crate::{AskArgs, IndexAction, SearchArgs, SearchMode, TuneArgs};

/// One entry of an ingest metadata file.
#[derive(Debug, Deserialize)]
struct IngestEntry {
    #[serde(flatten)]
    paper: NewPaper,
    /// Extracted text with form-feed page breaks, relative to the metadata file.
    #[serde(default)]
    text_file: Option<PathBuf>,
    /// The paper's PDF, relative to the PDF directory. Used when `text_file`
    /// is absent. Omit both for metadata-only papers.
    #[serde(default)]
    file_name: Option<PathBuf>,
}

/// Connected store and index, shared by every command.
pub struct App {
    settings: Settings,
    store: Arc<PgStore>,
    index: Arc<VectorIndexManager>,
}

impl App {
    pub async fn connect(settings: Settings) -> Result<Self> {
        let store = Arc::new(
            PgStore::new(&settings.database_url, settings.database_max_connections)
                .await
                .context("could not connect to the database")?,
        );
        let index = Arc::new(VectorIndexManager::new(
            store.clone(),
            settings.rag.index_spec()?,
            settings.rag.ef_search,
        )?);
        Ok(Self { settings, store, index })
    }

    fn embedder(&self) -> Result<BatchEmbedder> {
        let mut provider = OpenAIEmbeddingProvider::new(self.settings.require_api_key()?)?
            .with_model(&self.settings.embedding_model)
            .with_native_dimensions(self.settings.embedding_dimensions);
        if let Some(base_url) = &self.settings.openai_base_url {
            provider = provider.with_base_url(base_url);
        }
        let batch_size = self.settings.rag.embedding_batch_size.min(MAX_BATCH_INPUTS);
        Ok(BatchEmbedder::new(Arc::new(provider), batch_size))
    }

    fn engine(&self) -> Result<RetrievalEngine> {
        Ok(RetrievalEngine::builder()
            .config(self.settings.rag.clone())
            .repository(self.store.clone())
            .index_manager(self.index.clone())
            .embedder(self.embedder()?)
            .build()?)
    }

    fn pipeline(&self) -> Result<IngestPipeline> {
        Ok(IngestPipeline::builder()
            .chunker(Arc::new(ParagraphChunker::new(self.settings.rag.chunk_size)))
            .embedder(self.embedder()?)
            .repository(self.store.clone())
            .build()?)
    }

    pub async fn init(&self) -> Result<()> {
        self.store.ensure_schema(self.settings.embedding_dimensions).await?;
        println!("Schema ready ({} dimensions).", self.settings.embedding_dimensions);
        self.create_index().await
    }

    async fn create_index(&self) -> Result<()> {
        match self.index.ensure_index().await {
            Ok(_) => {
                let spec = self.index.spec();
                println!("Index {} ready ({}, {}).", spec.name, spec.metric, spec.params);
                Ok(())
            }
            Err(e @ RagError::IndexUnavailable { .. }) => {
                println!("Index unavailable, searches will use exact scan: {e}");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn ingest(&self, metadata: &Path, pdf_dir: Option<&Path>) -> Result<()> {
        let raw = std::fs::read_to_string(metadata)
            .with_context(|| format!("could not read {}", metadata.display()))?;
        let entries: Vec<IngestEntry> = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a JSON array of papers", metadata.display()))?;
        let base = metadata.parent().unwrap_or_else(|| Path::new("."));
        let pdf_dir = pdf_dir.unwrap_or(base);

        let mut papers = Vec::with_capacity(entries.len());
        for IngestEntry { mut paper, text_file, file_name } in entries {
            let pages = match (text_file, file_name) {
                (Some(path), _) => read_pages(&base.join(path)).await?,
                (None, Some(name)) => {
                    let pdf = pdf_dir.join(name);
                    if !pdf.exists() {
                        warn!(title = %paper.title, pdf = %pdf.display(), "PDF not found, skipping paper");
                        continue;
                    }
                    paper.pdf_path.get_or_insert_with(|| pdf.display().to_string());
                    match extract_pdf_pages(&pdf).await {
                        Ok(pages) => pages,
                        Err(e) => {
                            warn!(title = %paper.title, error = %e, "PDF text extraction failed, storing metadata only");
                            Vec::new()
                        }
                    }
                }
                (None, None) => Vec::new(),
            };
            papers.push((paper, pages));
        }
        info!(papers = papers.len(), file = %metadata.display(), "ingesting");

        let outcomes = self.pipeline()?.ingest_batch(papers).await?;
        let mut ingested = 0;
        for outcome in &outcomes {
            match outcome {
                IngestOutcome::Ingested { paper, chunk_count } => {
                    ingested += 1;
                    println!("ingested  #{:<6} {} ({chunk_count} chunks)", paper.id, paper.title);
                }
                IngestOutcome::Skipped { paper } => {
                    println!("skipped   #{:<6} {} (already present)", paper.id, paper.title);
                }
            }
        }
        println!("{ingested} of {} papers ingested.", outcomes.len());
        Ok(())
    }

    pub async fn reingest(&self, paper_id: i64, source: &Path) -> Result<()> {
        let pages = read_pages(source).await?;
        let chunks = self.pipeline()?.reingest(paper_id, &pages).await?;
        println!("Paper #{paper_id} now has {} chunks.", chunks.len());
        Ok(())
    }

    pub async fn search(&self, args: SearchArgs) -> Result<()> {
        let engine = self.engine()?;
        let limit = args.limit.unwrap_or(engine.config().default_limit);
        let results = match args.mode {
            SearchMode::Semantic => {
                engine.semantic_search_with(&args.query, limit, args.threshold, args.ef_search).await?
            }
            SearchMode::Text => engine.text_search(&args.query, limit).await?,
            SearchMode::Hybrid => {
                engine
                    .hybrid_search(&args.query, args.semantic_weight, args.lexical_weight, limit)
                    .await?
            }
        };

        if args.json {
            println!("{}", output::format_json(&args.query, &results)?);
        } else {
            println!("{}", output::format_human(&args.query, &results));
        }
        Ok(())
    }

    pub async fn ask(&self, args: AskArgs) -> Result<()> {
        let mut chat = OpenAIChatProvider::new(self.settings.require_api_key()?)?
            .with_model(&self.settings.chat_model);
        if let Some(base_url) = &self.settings.openai_base_url {
            chat = chat.with_base_url(base_url);
        }
        let answers = AnswerEngine::builder()
            .retrieval(Arc::new(self.engine()?))
            .chat(Arc::new(chat))
            .context_chunks(args.context_chunks)
            .build()?;

        if args.json {
            let answer = answers.answer(&args.question).await?;
            println!("{}", serde_json::to_string_pretty(&answer)?);
            return Ok(());
        }

        let mut stdout = std::io::stdout();
        let answer = answers
            .answer_streaming(&args.question, &mut |delta: &str| {
                let _ = stdout.write_all(delta.as_bytes());
                let _ = stdout.flush();
            })
            .await?;
        match &answer.answer {
            Some(_) => println!("\n\n{}", output::format_sources(&answer.sources)),
            None => println!("No relevant information found."),
        }
        Ok(())
    }

    pub async fn suggest(&self, partial: &str, limit: usize) -> Result<()> {
        let suggestions = self.engine()?.suggest(partial, limit).await;
        for suggestion in suggestions {
            println!("{suggestion}");
        }
        Ok(())
    }

    pub async fn index(&self, action: IndexAction) -> Result<()> {
        match action {
            IndexAction::Status => {
                let state = self.index.status().await?;
                let spec = self.index.spec();
                let size = self.store_size(&spec.name, state).await?;
                println!("{}: {}", spec.name, output::index_state(state));
                if state == IndexState::Ready {
                    println!("  size: {}", output::human_bytes(size));
                }
            }
            IndexAction::Create => self.create_index().await?,
            IndexAction::Drop => {
                self.index.drop_index().await?;
                println!("Index {} dropped.", self.index.spec().name);
            }
            IndexAction::Rebuild { m, ef_construction } => {
                self.index.rebuild(HnswParams::new(m, ef_construction)).await?;
                let spec = self.index.spec();
                println!("Index {} rebuilt with {}.", spec.name, spec.params);
            }
        }
        Ok(())
    }

    async fn store_size(&self, name: &str, state: IndexState) -> Result<u64> {
        if state != IndexState::Ready {
            return Ok(0);
        }
        Ok(self.store.index_size_bytes(name).await?)
    }

    pub async fn tune(&self, args: TuneArgs) -> Result<()> {
        let config = TuningConfig {
            sample_size: args.sample_size,
            top_k: args.top_k,
            ..TuningConfig::default()
        };
        let tuner = ParameterTuner::new(self.store.clone(), self.settings.rag.metric, config);
        let report = tuner.run().await?;

        let json = serde_json::to_string_pretty(&report)?;
        match &args.output {
            Some(path) => {
                std::fs::write(path, &json)
                    .with_context(|| format!("could not write {}", path.display()))?;
                println!("Report written to {}.", path.display());
            }
            None => println!("{json}"),
        }
        eprintln!("{}", output::format_tuning_summary(&report));
        Ok(())
    }

    pub async fn stats(&self, json: bool) -> Result<()> {
        let stats = self.store.stats().await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!("papers:          {}", stats.total_papers);
            println!(
                "  with PDF:      {} ({:.1}%)",
                stats.papers_with_pdf,
                stats.pdf_coverage_percentage()
            );
            println!("chunks:          {}", stats.total_chunks);
            println!("  embedded:      {}", stats.embedded_chunks);
        }
        Ok(())
    }
}

/// Pages of a `.pdf` file, or of a text file with form-feed page breaks.
async fn read_pages(path: &Path) -> Result<Vec<String>> {
    let is_pdf = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        return Ok(extract_pdf_pages(path).await?);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;
    Ok(split_pages(&text))
}
