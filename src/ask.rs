//! `ask`, `signals` and `repl` commands.
//!
//! These are the only functions in the crate that print to stdout; logs go
//! to stderr through `tracing`.

use anyhow::{bail, Context, Result};
use finrag_core::retrieve::Attempt;
use finrag_core::{
    Embedder, Evidence, FilterOverride, InMemoryIndex, RetrievalFilter, Retrieval,
    RetrieveRequest, Retriever, SignalMatch, VectorIndex,
};
use std::fmt::Write as _;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::snapshot::load_snapshot;

const SNIPPET_CHARS: usize = 240;
const EXIT_WORDS: [&str; 3] = ["exit", "salir", "quit"];

/// Options for a single `ask` invocation.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub top_k: Option<usize>,
    pub filter_override: Option<FilterOverride>,
    pub debug: bool,
    pub json: bool,
}

/// Wire up lexicon, embedding client and index snapshot from config.
pub fn build_retriever(cfg: &Config) -> Result<Retriever<EmbeddingClient, InMemoryIndex>> {
    let lexicon = cfg.lexicon.load()?;
    let index = load_snapshot(&cfg.index.snapshot)?;
    let embedder = EmbeddingClient::new(&cfg.embedding)?;

    if let (Some(expected), Some(actual)) = (embedder.dims(), index.dims()) {
        if embedder.provider() != "disabled" && expected != actual {
            bail!(
                "embedding.dims is {} but the index snapshot holds {}-dim vectors",
                expected,
                actual
            );
        }
    }

    Ok(Retriever::new(
        lexicon,
        embedder,
        index,
        cfg.retrieval.baseline_year(),
    ))
}

/// Parse a `--where` JSON object into a filter.
pub fn parse_where(json: &str) -> Result<RetrievalFilter> {
    serde_json::from_str(json).with_context(|| {
        format!(
            "Invalid --where filter (expected a JSON object of string, integer or bool values): {}",
            json
        )
    })
}

pub async fn run_ask(cfg: &Config, question: &str, opts: AskOptions) -> Result<()> {
    let retriever = build_retriever(cfg)?;
    let top_k = opts.top_k.unwrap_or(cfg.retrieval.top_k);

    let mut request = RetrieveRequest::new(question, top_k);
    request.filter_override = opts.filter_override;

    let retrieval = retriever.retrieve(&request).await?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&retrieval)?);
        return Ok(());
    }

    if opts.debug {
        print!("{}", format_trace(&retrieval));
    }
    print!("{}", format_evidence(&retrieval.evidence));
    Ok(())
}

/// Print the signal trace for a question. Needs no embedding or index.
pub fn run_signals(cfg: &Config, question: &str) -> Result<()> {
    let lexicon = cfg.lexicon.load()?;
    let signal = finrag_core::detect_signals(question, &lexicon, cfg.retrieval.baseline_year());
    println!("{}", serde_json::to_string_pretty(&signal)?);
    Ok(())
}

pub async fn run_repl(cfg: &Config, top_k: Option<usize>) -> Result<()> {
    let retriever = build_retriever(cfg)?;
    let top_k = top_k.unwrap_or(cfg.retrieval.top_k);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    repl_loop(&retriever, stdin, &mut std::io::stdout(), top_k).await
}

/// Question loop over any line source.
///
/// Blank lines are skipped; `exit`, `salir` or `quit` (any case) and end of
/// input stop the loop. A failing question is reported and the loop goes on.
pub async fn repl_loop<E, I, R, W>(
    retriever: &Retriever<E, I>,
    reader: R,
    out: &mut W,
    top_k: usize,
) -> Result<()>
where
    E: Embedder,
    I: VectorIndex,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = reader.lines();

    loop {
        write!(out, "Pregunta: ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&question.to_lowercase().as_str()) {
            break;
        }

        match retriever.retrieve(&RetrieveRequest::new(question, top_k)).await {
            Ok(retrieval) => {
                write!(out, "{}", format_signal_line(&retrieval.signal))?;
                write!(out, "{}", format_evidence(&retrieval.evidence))?;
            }
            Err(e) => {
                writeln!(out, "Error: {:#}", anyhow::Error::from(e))?;
            }
        }
    }

    Ok(())
}

/// Numbered evidence lines, or `No evidence.` for an empty list.
pub fn format_evidence(evidence: &[Evidence]) -> String {
    let mut s = String::new();
    if evidence.is_empty() {
        s.push_str("No evidence.\n");
        return s;
    }

    for (i, ev) in evidence.iter().enumerate() {
        let _ = writeln!(
            s,
            "[{}] {} pág.{} | dist={:.4}",
            i + 1,
            ev.metadata.doc_id,
            ev.metadata.page_number,
            ev.distance
        );
        let _ = writeln!(s, "    chunk_id={}", ev.chunk_id);
        let snippet: String = ev.text.chars().take(SNIPPET_CHARS).collect();
        let _ = writeln!(s, "    {}", snippet.replace('\n', " "));
    }
    s
}

fn format_signal_line(signal: &SignalMatch) -> String {
    format!(
        "signal={} score={} where={}\n",
        signal.key, signal.score, signal.filter
    )
}

fn format_attempt(n: usize, attempt: &Attempt) -> String {
    let stage = serde_json::to_value(attempt.stage)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    format!(
        "  attempt {} [{}] where={} -> {} hits\n",
        n, stage, attempt.filter, attempt.hits
    )
}

/// Human-readable signal and attempt trace for `ask --debug`.
pub fn format_trace(retrieval: &Retrieval) -> String {
    let signal = &retrieval.signal;
    let debug = &signal.debug;
    let mut s = format_signal_line(signal);

    if let Some(reason) = &debug.reason {
        let _ = writeln!(s, "  reason: {}", reason);
    }
    if !debug.phrase_hits.is_empty() {
        let _ = writeln!(s, "  phrases: {}", debug.phrase_hits.join(", "));
    }
    if !debug.word_hits.is_empty() {
        let _ = writeln!(s, "  words: {}", debug.word_hits.join(", "));
    }
    if let Some(year) = debug.year {
        let _ = writeln!(
            s,
            "  year: {} ({:?} via {:?}, baseline {})",
            year,
            debug.year_source,
            debug.year_trigger.as_deref().unwrap_or(""),
            debug.baseline_year
        );
    }
    if let Some(period) = &debug.period {
        let _ = writeln!(s, "  period: {}", period);
    }
    if let Some(tie) = debug.tie_break {
        let _ = writeln!(s, "  tie-break: {:?}", tie);
    }
    if let Some(p) = &debug.period_signal {
        let _ = writeln!(s, "  period signal: {} ({})", p.label, p.trigger);
    }
    for t in &debug.topic_signals {
        let _ = writeln!(s, "  topic: {} ({})", t.label, t.triggers.join(", "));
    }
    for (i, attempt) in retrieval.attempts.iter().enumerate() {
        s.push_str(&format_attempt(i + 1, attempt));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use finrag_core::{ChunkRecord, ChunkType, Lexicon};

    struct ConstEmbedder;

    #[async_trait]
    impl Embedder for ConstEmbedder {
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("service unavailable")
        }
    }

    fn index() -> InMemoryIndex {
        let idx = InMemoryIndex::new();
        idx.insert(
            ChunkRecord {
                doc_id: "eeff_2024".to_string(),
                source_path: "data/raw/eeff_2024.pdf".to_string(),
                year: Some(2024),
                doc_type: "financial_statements".to_string(),
                audited: true,
                period: "no_definido".to_string(),
                page_number: 7,
                chunk_id: ChunkRecord::derive_chunk_id("eeff_2024", 7, ChunkType::Text, 0),
                chunk_index: 0,
                chunk_text: "Utilidad neta del ejercicio".to_string(),
                chunk_type: ChunkType::Text,
            },
            vec![1.0, 0.0],
        )
        .unwrap();
        idx
    }

    #[test]
    fn test_parse_where() {
        let f = parse_where(r#"{"doc_type":"important_facts","year":2023}"#).unwrap();
        assert_eq!(f.len(), 2);
        assert!(parse_where("[1,2]").is_err());
        assert!(parse_where(r#"{"year":null}"#).is_err());
    }

    #[test]
    fn test_format_evidence_empty() {
        assert_eq!(format_evidence(&[]), "No evidence.\n");
    }

    #[tokio::test]
    async fn test_format_evidence_lines() {
        let r = Retriever::new(Lexicon::builtin(), ConstEmbedder, index(), 2025);
        let out = r
            .retrieve(&RetrieveRequest::new("utilidad neta 2024", 3))
            .await
            .unwrap();
        let text = format_evidence(&out.evidence);
        assert!(text.starts_with("[1] eeff_2024 pág.7 | dist=0.0000\n"));
        assert!(text.contains("chunk_id=eeff_2024_p007_c_000"));

        let trace = format_trace(&out);
        assert!(trace.contains("signal=financial_statements"));
        assert!(trace.contains("attempt 1 [initial]"));
    }

    #[tokio::test]
    async fn test_repl_loop() {
        let r = Retriever::new(Lexicon::builtin(), ConstEmbedder, index(), 2025);
        let input: &[u8] = b"   \nutilidad del a\xc3\xb1o pasado\nSALIR\nventas\n";
        let mut out = Vec::new();
        repl_loop(&r, input, &mut out, 3).await.unwrap();
        let out = String::from_utf8(out).unwrap();

        assert_eq!(out.matches("Pregunta: ").count(), 3);
        assert_eq!(out.matches("[1] eeff_2024").count(), 1);
        assert!(out.contains(r#"where={"doc_type":"financial_statements","year":2024}"#));
    }

    #[tokio::test]
    async fn test_repl_continues_after_error() {
        let r = Retriever::new(Lexicon::builtin(), DownEmbedder, index(), 2025);
        let input: &[u8] = b"ventas\nutilidad\n";
        let mut out = Vec::new();
        repl_loop(&r, input, &mut out, 3).await.unwrap();
        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.matches("Error: ").count(), 2);
        assert!(out.contains("service unavailable"));
    }
}
