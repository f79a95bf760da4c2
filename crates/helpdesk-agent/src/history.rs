//! Per-session conversation history.
//!
//! Bounded three ways: turns per session, idle lifetime, and total
//! session count (least recently used evicted first).

use chrono::Utc;
use helpdesk_core::config::HistoryConfig;
use helpdesk_core::types::{HistoryTurn, Role};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct SessionLog {
    turns: VecDeque<HistoryTurn>,
    last_seen: Instant,
}

pub struct SessionHistories {
    sessions: Mutex<HashMap<String, SessionLog>>,
    /// (user, assistant) pairs kept per session.
    max_turns: usize,
    max_sessions: usize,
    idle_ttl: Duration,
}

impl SessionHistories {
    pub fn new(max_turns: usize, max_sessions: usize, idle_ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_turns: max_turns.max(1),
            max_sessions: max_sessions.max(1),
            idle_ttl,
        }
    }

    pub fn from_config(cfg: &HistoryConfig) -> Self {
        Self::new(
            cfg.max_turns,
            cfg.max_sessions,
            Duration::from_secs(cfg.idle_ttl_secs),
        )
    }

    fn evict_idle(&self, sessions: &mut HashMap<String, SessionLog>, now: Instant) {
        let before = sessions.len();
        sessions.retain(|_, log| now.duration_since(log.last_seen) <= self.idle_ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::debug!("🧹 Evicted {evicted} idle sessions");
        }
    }

    /// Append a (question, answer) pair to a session.
    pub async fn record(&self, session: &str, question: &str, answer: &str) {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        self.evict_idle(&mut sessions, now);

        let log = sessions
            .entry(session.to_string())
            .or_insert_with(|| SessionLog {
                turns: VecDeque::new(),
                last_seen: now,
            });
        let at = Utc::now();
        log.turns.push_back(HistoryTurn {
            role: Role::User,
            content: question.to_string(),
            at,
        });
        log.turns.push_back(HistoryTurn {
            role: Role::Assistant,
            content: answer.to_string(),
            at,
        });
        while log.turns.len() > self.max_turns * 2 {
            log.turns.pop_front();
        }
        log.last_seen = now;

        if sessions.len() > self.max_sessions {
            let oldest = sessions
                .iter()
                .filter(|(id, _)| id.as_str() != session)
                .min_by_key(|(_, log)| log.last_seen)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                sessions.remove(&id);
                tracing::debug!("🧹 Evicted least recently used session {id}");
            }
        }
    }

    /// Snapshot of a session, oldest first. Empty for unknown sessions.
    pub async fn history(&self, session: &str) -> Vec<HistoryTurn> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        self.evict_idle(&mut sessions, now);
        match sessions.get_mut(session) {
            Some(log) => {
                log.last_seen = now;
                log.turns.iter().cloned().collect()
            }
            None => vec![],
        }
    }

    /// Returns whether the session existed.
    pub async fn clear(&self, session: &str) -> bool {
        self.sessions.lock().await.remove(session).is_some()
    }

    pub async fn session_count(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        self.evict_idle(&mut sessions, Instant::now());
        sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_record_and_read() {
        let h = SessionHistories::from_config(&HistoryConfig::default());
        h.record("s1", "Oi?", "Olá!").await;
        let turns = h.history("s1").await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "Oi?");
        assert_eq!(turns[1].role, Role::Assistant);
        assert!(h.history("other").await.is_empty());
    }

    #[tokio::test]
    async fn test_sessions_do_not_bleed() {
        let h = SessionHistories::new(10, 10, Duration::from_secs(60));
        h.record("a", "pergunta a", "resposta a").await;
        h.record("b", "pergunta b", "resposta b").await;
        let a = h.history("a").await;
        assert!(a.iter().all(|t| !t.content.ends_with('b')));
        assert_eq!(h.session_count().await, 2);
    }

    #[tokio::test]
    async fn test_max_turns_drops_oldest() {
        let h = SessionHistories::new(2, 10, Duration::from_secs(60));
        for i in 0..5 {
            h.record("s", &format!("q{i}"), &format!("a{i}")).await;
        }
        let turns = h.history("s").await;
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].content, "q3");
        assert_eq!(turns[3].content, "a4");
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let h = SessionHistories::new(5, 2, Duration::from_secs(60));
        let tick = || tokio::time::sleep(Duration::from_millis(5));
        h.record("a", "q", "r").await;
        tick().await;
        h.record("b", "q", "r").await;
        tick().await;
        // touch a so b becomes least recently used
        h.history("a").await;
        tick().await;
        h.record("c", "q", "r").await;
        assert_eq!(h.session_count().await, 2);
        assert!(h.history("b").await.is_empty());
        assert!(!h.history("a").await.is_empty());
    }

    #[tokio::test]
    async fn test_idle_sessions_expire() {
        let h = SessionHistories::new(5, 10, Duration::from_millis(20));
        h.record("s", "q", "r").await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(h.history("s").await.is_empty());
        assert_eq!(h.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_clear() {
        let h = SessionHistories::new(5, 10, Duration::from_secs(60));
        h.record("s", "q", "r").await;
        assert!(h.clear("s").await);
        assert!(!h.clear("s").await);
        assert!(h.history("s").await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_records_serialized() {
        let h = Arc::new(SessionHistories::new(100, 10, Duration::from_secs(60)));
        let mut tasks = Vec::new();
        for i in 0..20 {
            let h = h.clone();
            tasks.push(tokio::spawn(async move {
                h.record("shared", &format!("q{i}"), &format!("a{i}")).await;
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        let turns = h.history("shared").await;
        assert_eq!(turns.len(), 40);
        // pairs stay adjacent
        for pair in turns.chunks(2) {
            assert_eq!(pair[0].content[1..], pair[1].content[1..]);
        }
    }
}
