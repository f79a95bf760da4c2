//! Keyword router.
//!
//! Rules run in strict priority order: human handoff, then the journey
//! topic, else the general-knowledge default. Comparisons against the
//! thresholds are strict.

use helpdesk_core::config::RoutingConfig;
use helpdesk_core::types::{HandlerKind, RoutingDecision};

use crate::scoring::KeywordRule;

pub const HANDOFF_REASONING: &str = "Mensagem indica necessidade de atendimento humano";
pub const TOPIC_REASONING: &str = "Mensagem relacionada ao Hotmart Journey";
pub const DEFAULT_REASONING: &str = "Consulta geral - direcionando para base de conhecimento";

#[derive(Debug, Clone)]
pub struct Router {
    handoff: KeywordRule,
    topic: KeywordRule,
    handoff_threshold: f64,
    topic_threshold: f64,
    default_confidence: f64,
}

impl Router {
    pub fn from_config(cfg: &RoutingConfig) -> Self {
        Self {
            handoff: KeywordRule::new(&cfg.handoff_keywords, cfg.handoff_weight)
                .with_boost(&cfg.frustration_markers, cfg.punctuation_boost),
            topic: KeywordRule::new(&cfg.topic_keywords, cfg.topic_weight),
            handoff_threshold: cfg.handoff_threshold,
            topic_threshold: cfg.topic_threshold,
            default_confidence: cfg.default_confidence.clamp(0.0, 1.0),
        }
    }

    pub fn handoff_score(&self, message: &str) -> f64 {
        self.handoff.score(&message.to_lowercase())
    }

    pub fn topic_score(&self, message: &str) -> f64 {
        self.topic.score(&message.to_lowercase())
    }

    /// Never fails; falls back to the general-knowledge decision.
    pub fn route(&self, message: &str) -> RoutingDecision {
        let lowered = message.to_lowercase();

        let handoff = self.handoff.score(&lowered);
        if handoff > self.handoff_threshold {
            tracing::debug!(
                "🧭 handoff score {handoff:.2} (hits {:?})",
                self.handoff.hits(&lowered)
            );
            return RoutingDecision {
                handler: HandlerKind::HumanHandoff,
                confidence: handoff,
                reasoning: HANDOFF_REASONING.into(),
            };
        }

        let topic = self.topic.score(&lowered);
        if topic > self.topic_threshold {
            tracing::debug!("🧭 topic score {topic:.2} (hits {:?})", self.topic.hits(&lowered));
            return RoutingDecision {
                handler: HandlerKind::Journey,
                confidence: topic,
                reasoning: TOPIC_REASONING.into(),
            };
        }

        tracing::debug!("🧭 default route (handoff {handoff:.2}, topic {topic:.2})");
        RoutingDecision {
            handler: HandlerKind::GeneralKnowledge,
            confidence: self.default_confidence,
            reasoning: DEFAULT_REASONING.into(),
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::from_config(&RoutingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_triggers_default_decision() {
        let router = Router::default();
        for msg in [
            "Como faço para acessar meu curso?",
            "Onde encontro a nota fiscal da compra",
            "Olá, bom dia",
            "",
            "1234 5678",
        ] {
            let d = router.route(msg);
            assert_eq!(d.handler, HandlerKind::GeneralKnowledge, "{msg}");
            assert_eq!(d.confidence, 0.8);
            assert_eq!(d.reasoning, DEFAULT_REASONING);
        }
    }

    #[test]
    fn test_three_handoff_keywords_route_to_handoff() {
        let router = Router::default();
        let d = router.route("Quero cancelar, pedir reembolso e registrar uma reclamação");
        assert_eq!(d.handler, HandlerKind::HumanHandoff);
        assert!((d.confidence - 0.9).abs() < 1e-9);
        assert_eq!(d.reasoning, HANDOFF_REASONING);
    }

    #[test]
    fn test_two_handoff_keywords_fall_through() {
        let router = Router::default();
        let msg = "quero cancelar e pedir reembolso";
        assert!((router.handoff_score(msg) - 0.6).abs() < 1e-9);
        assert_eq!(router.route(msg).handler, HandlerKind::GeneralKnowledge);

        // falls through to the topic check, which can still win
        let msg = "quero cancelar e pedir reembolso do journey stars legacy tier";
        assert_eq!(router.route(msg).handler, HandlerKind::Journey);
    }

    #[test]
    fn test_exact_threshold_does_not_escalate() {
        let router = Router::default();
        // one keyword (0.3) plus both punctuation boosts (0.2 + 0.2)
        let msg = "atendente??? !!!";
        assert_eq!(router.handoff_score(msg), 0.7);
        assert_ne!(router.route(msg).handler, HandlerKind::HumanHandoff);

        // "falar com" alone is one hit; the nested "falar com humano" is absent
        let msg = "quero falar com alguém??? !!!";
        assert_eq!(router.handoff_score(msg), 0.7);
        assert_ne!(router.route(msg).handler, HandlerKind::HumanHandoff);
    }

    #[test]
    fn test_exact_threshold_with_custom_weights() {
        let cfg = RoutingConfig {
            handoff_keywords: vec!["a1".into(), "b2".into()],
            handoff_weight: 0.35,
            ..Default::default()
        };
        let router = Router::from_config(&cfg);
        assert_eq!(router.handoff_score("a1 b2"), 0.7);
        assert_eq!(router.route("a1 b2").handler, HandlerKind::GeneralKnowledge);
    }

    #[test]
    fn test_urgent_attendant_scenario() {
        let router = Router::default();
        let d = router.route("Quero falar com um atendente, isso é urgente!!!");
        assert!(d.confidence >= 0.9);
        // falar com + atendente + urgente (0.9) plus the !!! boost, capped
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.handler, HandlerKind::HumanHandoff);
    }

    #[test]
    fn test_nested_keywords_count_separately() {
        let router = Router::default();
        // "falar com" and "urgente" sit inside "falar com humano" and
        // "problema urgente"; each phrase is a distinct hit
        assert_eq!(router.handoff_score("quero falar com humano"), 0.6);
        assert_eq!(router.handoff_score("tenho um problema urgente"), 0.6);
        assert_ne!(
            router.route("quero falar com humano").handler,
            HandlerKind::HumanHandoff
        );
        assert_eq!(router.handoff_score("falar com humano, urgente"), 0.9);
        assert_eq!(
            router.route("falar com humano, urgente").handler,
            HandlerKind::HumanHandoff
        );
    }

    #[test]
    fn test_benefits_program_scenario() {
        let router = Router::default();
        let msg = "O que é o programa de benefícios?";
        assert!((router.topic_score(msg) - 0.4).abs() < 1e-9);
        let d = router.route(msg);
        assert_eq!(d.handler, HandlerKind::GeneralKnowledge);
        assert_eq!(d.confidence, 0.8);
    }

    #[test]
    fn test_topic_route() {
        let router = Router::default();
        let d = router.route("Sou elegível ao tier Stars do Journey?");
        assert_eq!(d.handler, HandlerKind::Journey);
        assert!(d.confidence > 0.6);
        assert_eq!(d.reasoning, TOPIC_REASONING);
    }

    #[test]
    fn test_case_insensitive() {
        let router = Router::default();
        assert_eq!(
            router.route("CANCELAR REEMBOLSO RECLAMAÇÃO").handler,
            HandlerKind::HumanHandoff
        );
    }

    #[test]
    fn test_confidence_always_in_range() {
        let router = Router::default();
        let msg = "falar com humano atendente pessoa real urgente cancelar reembolso bug!!!???";
        let d = router.route(msg);
        assert!((0.0..=1.0).contains(&d.confidence));
        assert_eq!(d.confidence, 1.0);
    }
}
