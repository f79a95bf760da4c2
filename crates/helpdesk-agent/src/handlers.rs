//! The closed set of message handlers.

use async_trait::async_trait;
use helpdesk_core::config::RoutingConfig;
use helpdesk_core::error::Result;
use helpdesk_core::types::{ChatResponse, Context, HandlerKind};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::answering::{AnsweringPipeline, GENERAL_LABEL, JOURNEY_LABEL};
use crate::history::SessionHistories;
use crate::scoring::KeywordRule;

pub const HANDOFF_MESSAGE: &str = "👤 **[Atendimento Humano]**\n\n\
Entendi que você precisa falar com uma pessoa. Sua conversa foi encaminhada \
para um de nossos atendentes, que continuará o atendimento em breve.";

/// A specialised responder.
#[async_trait]
pub trait Handler: Send + Sync {
    fn kind(&self) -> HandlerKind;

    /// How well this handler fits `message`, in [0, 1].
    fn confidence(&self, message: &str, ctx: &Context) -> f64;

    async fn respond(&self, message: &str, ctx: &mut Context) -> Result<ChatResponse>;

    async fn is_healthy(&self) -> bool {
        true
    }
}

fn sources(urls: Vec<String>) -> Option<Vec<String>> {
    if urls.is_empty() { None } else { Some(urls) }
}

// ─── Human handoff ───────────────────────────────────────────────────────────

pub struct HumanHandoffHandler {
    indicators: KeywordRule,
    urgency_keywords: Vec<String>,
    frustration_markers: Vec<String>,
    max_handler_visits: u32,
    histories: Arc<SessionHistories>,
}

impl HumanHandoffHandler {
    pub fn new(cfg: &RoutingConfig, histories: Arc<SessionHistories>) -> Self {
        Self {
            indicators: KeywordRule::new(&cfg.handoff_indicators, cfg.handoff_weight),
            urgency_keywords: cfg.urgency_keywords.iter().map(|k| k.to_lowercase()).collect(),
            frustration_markers: cfg.frustration_markers.clone(),
            max_handler_visits: cfg.max_handler_visits,
            histories,
        }
    }

    /// Escalation signal independent of the routing decision: an urgency
    /// keyword, a frustration marker, or too many handler visits.
    pub fn needs_escalation(&self, message: &str, ctx: &Context) -> bool {
        let lowered = message.to_lowercase();
        if self
            .urgency_keywords
            .iter()
            .any(|k| !k.is_empty() && lowered.contains(k.as_str()))
        {
            return true;
        }
        if self
            .frustration_markers
            .iter()
            .any(|m| !m.is_empty() && message.contains(m.as_str()))
        {
            return true;
        }
        ctx.handler_visits > self.max_handler_visits
    }
}

#[async_trait]
impl Handler for HumanHandoffHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::HumanHandoff
    }

    fn confidence(&self, message: &str, _ctx: &Context) -> f64 {
        self.indicators.score(&message.to_lowercase())
    }

    async fn respond(&self, message: &str, ctx: &mut Context) -> Result<ChatResponse> {
        tracing::info!("👤 Session {} handed off to a human", ctx.session_id);
        self.histories
            .record(&ctx.session_id, message, HANDOFF_MESSAGE)
            .await;
        Ok(ChatResponse {
            response_text: HANDOFF_MESSAGE.to_string(),
            handler_used: HandlerKind::HumanHandoff.to_string(),
            session_id: ctx.session_id.clone(),
            escalated: true,
            sources: None,
        })
    }
}

// ─── Journey topic ───────────────────────────────────────────────────────────

pub struct JourneyHandler {
    rule: KeywordRule,
    pipeline: Arc<AnsweringPipeline>,
}

impl JourneyHandler {
    pub fn new(cfg: &RoutingConfig, pipeline: Arc<AnsweringPipeline>) -> Self {
        Self {
            rule: KeywordRule::new(&cfg.journey_indicators, cfg.topic_weight),
            pipeline,
        }
    }
}

#[async_trait]
impl Handler for JourneyHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Journey
    }

    fn confidence(&self, message: &str, _ctx: &Context) -> f64 {
        self.rule.score(&message.to_lowercase())
    }

    async fn respond(&self, message: &str, ctx: &mut Context) -> Result<ChatResponse> {
        let answer = self
            .pipeline
            .respond(&ctx.session_id, message, JOURNEY_LABEL)
            .await;
        Ok(ChatResponse {
            response_text: answer.text,
            handler_used: HandlerKind::Journey.to_string(),
            session_id: ctx.session_id.clone(),
            escalated: false,
            sources: sources(answer.sources),
        })
    }
}

// ─── General knowledge ───────────────────────────────────────────────────────

pub struct GeneralKnowledgeHandler {
    pipeline: Arc<AnsweringPipeline>,
    baseline: f64,
}

impl GeneralKnowledgeHandler {
    pub fn new(cfg: &RoutingConfig, pipeline: Arc<AnsweringPipeline>) -> Self {
        Self {
            pipeline,
            baseline: cfg.default_confidence.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl Handler for GeneralKnowledgeHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::GeneralKnowledge
    }

    fn confidence(&self, _message: &str, _ctx: &Context) -> f64 {
        self.baseline
    }

    async fn respond(&self, message: &str, ctx: &mut Context) -> Result<ChatResponse> {
        let answer = self
            .pipeline
            .respond(&ctx.session_id, message, GENERAL_LABEL)
            .await;
        Ok(ChatResponse {
            response_text: answer.text,
            handler_used: HandlerKind::GeneralKnowledge.to_string(),
            session_id: ctx.session_id.clone(),
            escalated: false,
            sources: sources(answer.sources),
        })
    }

    async fn is_healthy(&self) -> bool {
        self.pipeline.retriever().is_ready().await
    }
}

// ─── Dispatch ────────────────────────────────────────────────────────────────

/// One handler per `HandlerKind`.
pub struct HandlerSet {
    human_handoff: Arc<HumanHandoffHandler>,
    journey: Arc<dyn Handler>,
    general_knowledge: Arc<dyn Handler>,
}

impl HandlerSet {
    pub fn new(
        cfg: &RoutingConfig,
        pipeline: Arc<AnsweringPipeline>,
        histories: Arc<SessionHistories>,
    ) -> Self {
        Self {
            human_handoff: Arc::new(HumanHandoffHandler::new(cfg, histories)),
            journey: Arc::new(JourneyHandler::new(cfg, pipeline.clone())),
            general_knowledge: Arc::new(GeneralKnowledgeHandler::new(cfg, pipeline)),
        }
    }

    pub fn from_parts(
        human_handoff: Arc<HumanHandoffHandler>,
        journey: Arc<dyn Handler>,
        general_knowledge: Arc<dyn Handler>,
    ) -> Self {
        Self {
            human_handoff,
            journey,
            general_knowledge,
        }
    }

    pub fn get(&self, kind: HandlerKind) -> &dyn Handler {
        match kind {
            HandlerKind::HumanHandoff => self.human_handoff.as_ref(),
            HandlerKind::Journey => self.journey.as_ref(),
            HandlerKind::GeneralKnowledge => self.general_knowledge.as_ref(),
        }
    }

    pub fn human_handoff(&self) -> &HumanHandoffHandler {
        &self.human_handoff
    }

    pub async fn dispatch(
        &self,
        kind: HandlerKind,
        message: &str,
        ctx: &mut Context,
    ) -> Result<ChatResponse> {
        self.get(kind).respond(message, ctx).await
    }

    /// Confidence of every handler for `message`.
    pub fn confidences(&self, message: &str, ctx: &Context) -> BTreeMap<HandlerKind, f64> {
        HandlerKind::ALL
            .into_iter()
            .map(|k| (k, self.get(k).confidence(message, ctx)))
            .collect()
    }

    pub async fn health(&self) -> BTreeMap<String, bool> {
        let checks = HandlerKind::ALL.into_iter().map(|k| async move {
            let handler = self.get(k);
            // a handler whose confidence is not a finite score is broken
            let scores = handler
                .confidence("test message", &Context::default())
                .is_finite();
            (k.to_string(), scores && handler.is_healthy().await)
        });
        futures::future::join_all(checks).await.into_iter().collect()
    }
}
