//! Coordinator: the single entry point for a chat message.
//!
//! router → decision recorded into context → handler dispatch → response.
//! Anything that escapes a handler is converted into an escalation response
//! here; callers never see an error.

use helpdesk_core::config::{DispatchMode, HelpdeskConfig};
use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::traits::Generator;
use helpdesk_core::types::{ChatResponse, Context, HandlerKind, HistoryTurn, RoutingDecision};
use helpdesk_knowledge::KnowledgeRetriever;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::answering::AnsweringPipeline;
use crate::handlers::HandlerSet;
use crate::history::SessionHistories;
use crate::router::Router;

pub const ERROR_HANDLER: &str = "error_handler";

pub struct Coordinator {
    router: Router,
    handlers: HandlerSet,
    dispatch: DispatchMode,
    histories: Arc<SessionHistories>,
    retriever: Arc<KnowledgeRetriever>,
    generator: Arc<dyn Generator>,
}

impl Coordinator {
    /// Wire the full dependency graph from config.
    pub fn new(
        cfg: &HelpdeskConfig,
        generator: Arc<dyn Generator>,
        retriever: Arc<KnowledgeRetriever>,
    ) -> Self {
        let histories = Arc::new(SessionHistories::from_config(&cfg.history));
        let pipeline = Arc::new(AnsweringPipeline::new(
            retriever.clone(),
            generator.clone(),
            histories.clone(),
            cfg,
        ));
        let handlers = HandlerSet::new(&cfg.routing, pipeline, histories.clone());
        Self::with_handlers(cfg, handlers, histories, retriever, generator)
    }

    pub fn with_handlers(
        cfg: &HelpdeskConfig,
        handlers: HandlerSet,
        histories: Arc<SessionHistories>,
        retriever: Arc<KnowledgeRetriever>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        tracing::info!("🧭 Coordinator ready (dispatch: {:?})", cfg.routing.dispatch);
        Self {
            router: Router::from_config(&cfg.routing),
            handlers,
            dispatch: cfg.routing.dispatch,
            histories,
            retriever,
            generator,
        }
    }

    pub fn retriever(&self) -> &Arc<KnowledgeRetriever> {
        &self.retriever
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        self.dispatch
    }

    pub fn route(&self, message: &str) -> RoutingDecision {
        self.router.route(message)
    }

    /// Handle one message. Never fails.
    pub async fn handle(&self, message: &str, context: Option<Context>) -> ChatResponse {
        let mut ctx = context.unwrap_or_default();
        ctx.ensure_session();

        match self.try_handle(message, &mut ctx).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!("❌ Session {}: {}", ctx.session_id, e);
                error_response(&ctx.session_id, &e)
            }
        }
    }

    async fn try_handle(&self, message: &str, ctx: &mut Context) -> Result<ChatResponse> {
        let decision = self.router.route(message);
        let target = match self.dispatch {
            DispatchMode::Routed => decision.handler,
            DispatchMode::Forced => HandlerKind::GeneralKnowledge,
        };
        tracing::debug!(
            "🧭 {} → {} ({:.2}, {}); dispatching to {}",
            ctx.session_id,
            decision.handler,
            decision.confidence,
            decision.reasoning,
            target
        );
        tracing::debug!(
            "🧭 {} handler confidences: {:?}",
            ctx.session_id,
            self.handlers.confidences(message, ctx)
        );
        ctx.record_decision(decision);

        let mut resp = self.handlers.dispatch(target, message, ctx).await?;
        if self.dispatch == DispatchMode::Routed
            && !resp.escalated
            && self.handlers.human_handoff().needs_escalation(message, ctx)
        {
            tracing::info!("🚩 Session {} flagged for escalation", ctx.session_id);
            resp.escalated = true;
        }
        resp.session_id = ctx.session_id.clone();
        Ok(resp)
    }

    /// Per-handler health, the generative service (`llm`) and the router,
    /// which is always healthy.
    pub async fn health_check(&self) -> BTreeMap<String, bool> {
        let mut status = self.handlers.health().await;
        let llm = match self.generator.health_check().await {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!("⚠️ {} health check failed: {}", self.generator.name(), e);
                false
            }
        };
        status.insert("llm".into(), llm);
        status.insert("router".into(), true);
        status
    }

    pub async fn history(&self, session: &str) -> Vec<HistoryTurn> {
        self.histories.history(session).await
    }

    pub async fn clear_history(&self, session: &str) -> bool {
        self.histories.clear(session).await
    }

    pub async fn session_count(&self) -> usize {
        self.histories.session_count().await
    }
}

pub fn error_response(session_id: &str, err: &HelpdeskError) -> ChatResponse {
    ChatResponse {
        response_text: format!(
            "Desculpe, ocorreu um erro inesperado: {err}. Por favor, tente novamente."
        ),
        handler_used: ERROR_HANDLER.into(),
        session_id: session_id.to_string(),
        escalated: true,
        sources: Some(vec![]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answering::GENERAL_LABEL;
    use crate::handlers::{Handler, HumanHandoffHandler};
    use crate::testing::{ScriptedGenerator, ready_retriever};
    use async_trait::async_trait;

    async fn coordinator(
        dispatch: DispatchMode,
        generator: Arc<ScriptedGenerator>,
    ) -> (Coordinator, tempfile::TempDir) {
        let (retriever, dir) = ready_retriever().await;
        let mut cfg = HelpdeskConfig::default();
        cfg.routing.dispatch = dispatch;
        (Coordinator::new(&cfg, generator, retriever), dir)
    }

    struct Exploding(HandlerKind);

    #[async_trait]
    impl Handler for Exploding {
        fn kind(&self) -> HandlerKind {
            self.0
        }
        fn confidence(&self, _message: &str, _ctx: &Context) -> f64 {
            0.0
        }
        async fn respond(&self, _message: &str, _ctx: &mut Context) -> Result<ChatResponse> {
            Err(HelpdeskError::Other("handler exploded".into()))
        }
    }

    #[tokio::test]
    async fn test_session_generated_when_absent() {
        let (c, _dir) = coordinator(DispatchMode::Routed, ScriptedGenerator::replying("ok")).await;
        let resp = c.handle("Como pedir reembolso?", None).await;
        assert!(!resp.session_id.is_empty());

        let resp = c
            .handle("Como pedir reembolso?", Some(Context::for_session("abc")))
            .await;
        assert_eq!(resp.session_id, "abc");
    }

    #[tokio::test]
    async fn test_routed_dispatch_follows_decision() {
        let (c, _dir) = coordinator(DispatchMode::Routed, ScriptedGenerator::replying("ok")).await;

        let resp = c.handle("Quero falar com um atendente, isso é urgente!!!", None).await;
        assert_eq!(resp.handler_used, "human_handoff");
        assert!(resp.escalated);

        let resp = c.handle("Sou elegível ao tier Stars do Journey?", None).await;
        assert_eq!(resp.handler_used, "journey");

        let resp = c.handle("O que é o programa de benefícios?", None).await;
        assert_eq!(resp.handler_used, "general_knowledge");
        assert!(!resp.escalated);
        assert!(resp.response_text.starts_with(GENERAL_LABEL));
    }

    #[tokio::test]
    async fn test_forced_dispatch_always_general() {
        let (c, _dir) = coordinator(DispatchMode::Forced, ScriptedGenerator::replying("ok")).await;
        let resp = c.handle("Quero falar com um atendente, isso é urgente!!!", None).await;
        assert_eq!(resp.handler_used, "general_knowledge");
        assert!(!resp.escalated);
    }

    #[tokio::test]
    async fn test_escalation_signal_in_routed_mode() {
        let (c, _dir) = coordinator(DispatchMode::Routed, ScriptedGenerator::replying("ok")).await;
        // routes to general knowledge but mentions an error
        let resp = c.handle("Apareceu um erro no checkout", None).await;
        assert_eq!(resp.handler_used, "general_knowledge");
        assert!(resp.escalated);
    }

    #[tokio::test]
    async fn test_visit_counter_escalates_repeat_context() {
        let (c, _dir) = coordinator(DispatchMode::Routed, ScriptedGenerator::replying("ok")).await;
        let mut ctx = Context::for_session("loop");
        ctx.handler_visits = 2;
        // this visit makes it 3
        let resp = c.handle("Como acesso meu curso", Some(ctx)).await;
        assert!(resp.escalated);
    }

    #[tokio::test]
    async fn test_generation_failure_is_absorbed_by_handler() {
        let (c, _dir) = coordinator(DispatchMode::Routed, ScriptedGenerator::failing("503 upstream")).await;
        let resp = c.handle("Como pedir reembolso", None).await;
        assert_eq!(resp.handler_used, "general_knowledge");
        assert!(resp.response_text.contains("503 upstream"));
    }

    #[tokio::test]
    async fn test_escaped_error_becomes_escalation_response() {
        let (retriever, _dir) = ready_retriever().await;
        let cfg = HelpdeskConfig::default();
        let histories = Arc::new(SessionHistories::from_config(&cfg.history));
        let handlers = HandlerSet::from_parts(
            Arc::new(HumanHandoffHandler::new(&cfg.routing, histories.clone())),
            Arc::new(Exploding(HandlerKind::Journey)),
            Arc::new(Exploding(HandlerKind::GeneralKnowledge)),
        );
        let c = Coordinator::with_handlers(
            &cfg,
            handlers,
            histories,
            retriever,
            ScriptedGenerator::replying("unused"),
        );

        let resp = c.handle("Como pedir reembolso", Some(Context::for_session("x"))).await;
        assert_eq!(resp.handler_used, ERROR_HANDLER);
        assert!(resp.escalated);
        assert_eq!(resp.session_id, "x");
        assert!(resp.response_text.starts_with("Desculpe, ocorreu um erro inesperado"));
        assert!(resp.response_text.contains("handler exploded"));
    }

    #[tokio::test]
    async fn test_health_check_includes_router() {
        let (c, _dir) = coordinator(DispatchMode::Routed, ScriptedGenerator::replying("ok")).await;
        let health = c.health_check().await;
        assert_eq!(health.len(), 5);
        assert!(health.values().all(|v| *v));
        assert_eq!(health["router"], true);
        assert_eq!(health["llm"], true);
    }

    #[tokio::test]
    async fn test_health_check_reports_unreachable_llm() {
        let (c, _dir) = coordinator(DispatchMode::Routed, ScriptedGenerator::failing("dns error")).await;
        let health = c.health_check().await;
        assert_eq!(health["llm"], false);
        assert_eq!(health["router"], true);
        assert_eq!(health["general_knowledge"], true);
    }

    #[tokio::test]
    async fn test_history_and_clear() {
        let (c, _dir) = coordinator(DispatchMode::Routed, ScriptedGenerator::replying("ok")).await;
        c.handle("Como pedir reembolso", Some(Context::for_session("h"))).await;
        assert_eq!(c.history("h").await.len(), 2);
        assert_eq!(c.session_count().await, 1);
        assert!(c.clear_history("h").await);
        assert!(c.history("h").await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_sessions_isolated() {
        let (c, _dir) = coordinator(DispatchMode::Routed, ScriptedGenerator::replying("ok")).await;
        let c = Arc::new(c);
        let mut tasks = Vec::new();
        for i in 0..8 {
            let c = c.clone();
            tasks.push(tokio::spawn(async move {
                let ctx = Context::for_session(format!("s{i}"));
                c.handle(&format!("pergunta {i} sobre reembolso"), Some(ctx)).await
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        for i in 0..8 {
            let turns = c.history(&format!("s{i}")).await;
            assert_eq!(turns.len(), 2);
            assert_eq!(turns[0].content, format!("pergunta {i} sobre reembolso"));
        }
    }
}
