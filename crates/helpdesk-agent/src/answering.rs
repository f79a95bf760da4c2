//! Retrieval-augmented answering pipeline.
//!
//! question → top-k search → context → fixed prompt → generator → labelled
//! answer. Every retrieval or generation failure is turned into a
//! user-facing apology carrying the error detail; nothing escapes.

use helpdesk_core::config::{ContextMode, HelpdeskConfig};
use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::traits::{GenerateParams, Generator};
use helpdesk_core::types::RetrievedChunk;
use helpdesk_knowledge::KnowledgeRetriever;
use std::sync::Arc;
use std::time::Duration;

use crate::history::SessionHistories;

pub const GENERAL_LABEL: &str = "**[Agente de Pesquisa]**";
pub const JOURNEY_LABEL: &str = "**[Agente Journey]**";
pub const EMPTY_ANSWER: &str = "Não foi possível gerar uma resposta para sua consulta.";
/// Session used by callers that don't track one.
pub const DEFAULT_SESSION: &str = "default";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Fill the instructional template with the question and retrieved context.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "Você é um assistente especializado. Sua tarefa é fornecer informações precisas, \
detalhadas e bem estruturadas sobre o tópico solicitado.

Diretrizes:
- Você deve usar somente os dados enviados no contexto a seguir.
- Forneça informações factuais e precisas
- Estruture a resposta de forma clara e organizada
- Se não souber algo, indique claramente

Pergunta: {question}

Contexto: {context}

Resposta:"
    )
}

/// Prefix the label, or fall back to a fixed message for blank output.
pub fn format_response(label: &str, raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return EMPTY_ANSWER.to_string();
    }
    format!("{label}\n\n{raw}")
}

pub fn format_failure(label: &str, err: &HelpdeskError) -> String {
    format!("🔬 {label}\n\nErro ao processar consulta: {err}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// URLs of the chunks used as context.
    pub sources: Vec<String>,
    pub failed: bool,
}

pub struct AnsweringPipeline {
    retriever: Arc<KnowledgeRetriever>,
    generator: Arc<dyn Generator>,
    histories: Arc<SessionHistories>,
    params: GenerateParams,
    top_k: usize,
    context_mode: ContextMode,
    context_budget: usize,
    generation_timeout: Duration,
}

impl AnsweringPipeline {
    pub fn new(
        retriever: Arc<KnowledgeRetriever>,
        generator: Arc<dyn Generator>,
        histories: Arc<SessionHistories>,
        cfg: &HelpdeskConfig,
    ) -> Self {
        Self {
            retriever,
            generator,
            histories,
            params: GenerateParams::from(&cfg.llm),
            top_k: cfg.knowledge.top_k.max(1),
            context_mode: cfg.knowledge.context_mode,
            context_budget: cfg.knowledge.context_budget_chars.max(1),
            generation_timeout: Duration::from_secs(cfg.llm.timeout_secs.max(1)),
        }
    }

    pub fn retriever(&self) -> &Arc<KnowledgeRetriever> {
        &self.retriever
    }

    pub fn histories(&self) -> &Arc<SessionHistories> {
        &self.histories
    }

    pub async fn answer(&self, question: &str) -> String {
        self.answer_for(DEFAULT_SESSION, question).await
    }

    pub async fn answer_for(&self, session: &str, question: &str) -> String {
        self.respond(session, question, GENERAL_LABEL).await.text
    }

    /// Answer and record the exchange in the session history. Never fails.
    pub async fn respond(&self, session: &str, question: &str, label: &str) -> Answer {
        match self.try_answer(question, label).await {
            Ok((text, sources)) => {
                self.histories.record(session, question, &text).await;
                Answer {
                    text,
                    sources,
                    failed: false,
                }
            }
            Err(e) => {
                if e.is_recoverable() {
                    tracing::warn!("⚠️ Answering failed ({:?}): {}", e.class(), e);
                } else {
                    tracing::error!("❌ Answering failed ({:?}): {}", e.class(), e);
                }
                Answer {
                    text: format_failure(label, &e),
                    sources: vec![],
                    failed: true,
                }
            }
        }
    }

    async fn try_answer(&self, question: &str, label: &str) -> Result<(String, Vec<String>)> {
        let hits = self.retriever.search(question, self.top_k).await?;
        let (context, sources) = self.assemble_context(&hits);
        let prompt = build_prompt(question, &context);
        tracing::debug!(
            "📝 prompt {} chars ({} hits, {} context chars)",
            prompt.chars().count(),
            hits.len(),
            context.chars().count()
        );

        let raw = tokio::time::timeout(
            self.generation_timeout,
            self.generator.generate(&prompt, &self.params),
        )
        .await
        .map_err(|_| {
            HelpdeskError::Timeout(format!(
                "{} did not answer within {}s",
                self.generator.name(),
                self.generation_timeout.as_secs()
            ))
        })??;

        Ok((format_response(label, &raw), sources))
    }

    fn assemble_context(&self, hits: &[RetrievedChunk]) -> (String, Vec<String>) {
        let used: Vec<&RetrievedChunk> = match self.context_mode {
            ContextMode::Single => hits.iter().take(1).collect(),
            ContextMode::Aggregate => {
                let mut used: Vec<&RetrievedChunk> = Vec::new();
                let mut total = 0usize;
                for hit in hits {
                    if used.iter().any(|u| u.content == hit.content) {
                        continue;
                    }
                    let len = hit.content.chars().count();
                    let extra = if used.is_empty() {
                        len
                    } else {
                        len + CONTEXT_SEPARATOR.len()
                    };
                    if !used.is_empty() && total + extra > self.context_budget {
                        break;
                    }
                    used.push(hit);
                    total += extra;
                }
                used
            }
        };

        let mut context = used
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);
        if self.context_mode == ContextMode::Aggregate
            && context.chars().count() > self.context_budget
        {
            context = context.chars().take(self.context_budget).collect();
        }

        let mut sources: Vec<String> = Vec::new();
        for c in &used {
            if !c.source_url.is_empty() && !sources.contains(&c.source_url) {
                sources.push(c.source_url.clone());
            }
        }
        (context, sources)
    }
}
