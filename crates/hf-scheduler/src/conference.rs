//! Conference mode (spec.md §4.9(h)): Colony-to-Colony coordination
//! sessions with opinion collection and deterministic vote tallying.

use hf_core::EventId;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConferenceStatus {
    Pending,
    InProgress,
    Voting,
    Concluded,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteType {
    Approve,
    Reject,
    Abstain,
}

#[derive(Debug, Clone)]
pub struct Opinion {
    pub colony_id: String,
    pub content: String,
    pub rationale: String,
}

#[derive(Debug, Clone)]
pub struct Vote {
    pub colony_id: String,
    pub vote_type: VoteType,
    pub comment: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConferenceAgenda {
    pub title: String,
    pub requires_consensus: bool,
}

#[derive(Debug, Clone)]
pub struct ConferenceSession {
    pub id: String,
    pub hive_id: String,
    pub topic: String,
    pub agenda: Option<ConferenceAgenda>,
    pub status: ConferenceStatus,
    pub participants: Vec<String>,
    pub opinions: Vec<Opinion>,
    pub votes: Vec<Vote>,
    pub conclusion: String,
}

impl ConferenceSession {
    pub fn is_active(&self) -> bool {
        matches!(self.status, ConferenceStatus::InProgress | ConferenceStatus::Voting)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteSummary {
    pub approve: usize,
    pub reject: usize,
    pub abstain: usize,
    pub verdict: String,
}

fn summarize(session: &ConferenceSession) -> VoteSummary {
    let approve = session.votes.iter().filter(|v| v.vote_type == VoteType::Approve).count();
    let reject = session.votes.iter().filter(|v| v.vote_type == VoteType::Reject).count();
    let abstain = session.votes.iter().filter(|v| v.vote_type == VoteType::Abstain).count();
    let total = session.participants.len();

    let requires_consensus = session.agenda.as_ref().is_some_and(|a| a.requires_consensus);
    let verdict = if requires_consensus {
        if approve == total {
            "consensus reached: approved".to_string()
        } else if reject > 0 {
            format!("no consensus: {reject} rejections")
        } else {
            format!("no consensus: {abstain} abstentions")
        }
    } else if approve > reject {
        format!("approved ({approve}/{total})")
    } else if reject > approve {
        format!("rejected ({reject}/{total})")
    } else {
        format!("tied ({approve}/{total})")
    };

    VoteSummary { approve, reject, abstain, verdict }
}

#[derive(Default)]
pub struct ConferenceManager {
    sessions: Mutex<HashMap<String, ConferenceSession>>,
}

impl ConferenceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_session(
        &self,
        hive_id: &str,
        topic: &str,
        participants: Vec<String>,
        agenda: Option<ConferenceAgenda>,
    ) -> ConferenceSession {
        let session = ConferenceSession {
            id: EventId::new().to_string(),
            hive_id: hive_id.to_string(),
            topic: topic.to_string(),
            agenda,
            status: ConferenceStatus::Pending,
            participants,
            opinions: Vec::new(),
            votes: Vec::new(),
            conclusion: String::new(),
        };
        self.sessions.lock().await.insert(session.id.clone(), session.clone());
        session
    }

    pub async fn start_session(&self, id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(id) else { return false };
        if session.status != ConferenceStatus::Pending {
            return false;
        }
        session.status = ConferenceStatus::InProgress;
        true
    }

    pub async fn submit_opinion(&self, id: &str, colony_id: &str, content: &str, rationale: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(id) else { return false };
        if !session.is_active() || !session.participants.iter().any(|p| p == colony_id) {
            return false;
        }
        session.opinions.push(Opinion {
            colony_id: colony_id.to_string(),
            content: content.to_string(),
            rationale: rationale.to_string(),
        });
        true
    }

    pub async fn start_voting(&self, id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(id) else { return false };
        if session.status != ConferenceStatus::InProgress {
            return false;
        }
        session.status = ConferenceStatus::Voting;
        true
    }

    pub async fn cast_vote(&self, id: &str, colony_id: &str, vote_type: VoteType, comment: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(id) else { return false };
        if session.status != ConferenceStatus::Voting || !session.participants.iter().any(|p| p == colony_id) {
            return false;
        }
        session.votes.retain(|v| v.colony_id != colony_id);
        session.votes.push(Vote {
            colony_id: colony_id.to_string(),
            vote_type,
            comment: comment.to_string(),
        });
        true
    }

    pub async fn conclude_session(&self, id: &str) -> Option<VoteSummary> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(id)?;
        if !session.is_active() {
            return None;
        }
        let summary = summarize(session);
        session.conclusion = summary.verdict.clone();
        session.status = ConferenceStatus::Concluded;
        Some(summary)
    }

    pub async fn cancel_session(&self, id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(id) else { return false };
        if session.status == ConferenceStatus::Concluded {
            return false;
        }
        session.status = ConferenceStatus::Cancelled;
        true
    }

    pub async fn get_session(&self, id: &str) -> Option<ConferenceSession> {
        self.sessions.lock().await.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_moves_through_lifecycle_to_consensus() {
        let mgr = ConferenceManager::new();
        let session = mgr
            .create_session(
                "h1",
                "proceed?",
                vec!["c1".to_string(), "c2".to_string()],
                Some(ConferenceAgenda { title: "proceed".to_string(), requires_consensus: true }),
            )
            .await;
        assert!(mgr.start_session(&session.id).await);
        assert!(mgr.submit_opinion(&session.id, "c1", "looks fine", "").await);
        assert!(mgr.start_voting(&session.id).await);
        assert!(mgr.cast_vote(&session.id, "c1", VoteType::Approve, "").await);
        assert!(mgr.cast_vote(&session.id, "c2", VoteType::Approve, "").await);

        let summary = mgr.conclude_session(&session.id).await.unwrap();
        assert_eq!(summary.verdict, "consensus reached: approved");
    }

    #[tokio::test]
    async fn majority_vote_without_consensus_requirement() {
        let mgr = ConferenceManager::new();
        let session = mgr
            .create_session("h1", "topic", vec!["c1".to_string(), "c2".to_string(), "c3".to_string()], None)
            .await;
        mgr.start_session(&session.id).await;
        mgr.start_voting(&session.id).await;
        mgr.cast_vote(&session.id, "c1", VoteType::Approve, "").await;
        mgr.cast_vote(&session.id, "c2", VoteType::Approve, "").await;
        mgr.cast_vote(&session.id, "c3", VoteType::Reject, "").await;
        let summary = mgr.conclude_session(&session.id).await.unwrap();
        assert_eq!(summary.verdict, "approved (2/3)");
    }

    #[tokio::test]
    async fn tied_vote_is_reported_as_tied() {
        let mgr = ConferenceManager::new();
        let session = mgr.create_session("h1", "topic", vec!["c1".to_string(), "c2".to_string()], None).await;
        mgr.start_session(&session.id).await;
        mgr.start_voting(&session.id).await;
        mgr.cast_vote(&session.id, "c1", VoteType::Approve, "").await;
        mgr.cast_vote(&session.id, "c2", VoteType::Reject, "").await;
        let summary = mgr.conclude_session(&session.id).await.unwrap();
        assert_eq!(summary.verdict, "tied (1/2)");
    }

    #[tokio::test]
    async fn revote_overwrites_previous_vote() {
        let mgr = ConferenceManager::new();
        let session = mgr.create_session("h1", "topic", vec!["c1".to_string()], None).await;
        mgr.start_session(&session.id).await;
        mgr.start_voting(&session.id).await;
        mgr.cast_vote(&session.id, "c1", VoteType::Reject, "").await;
        mgr.cast_vote(&session.id, "c1", VoteType::Approve, "changed my mind").await;
        let stored = mgr.get_session(&session.id).await.unwrap();
        assert_eq!(stored.votes.len(), 1);
        assert_eq!(stored.votes[0].vote_type, VoteType::Approve);
    }

    #[tokio::test]
    async fn non_participant_cannot_vote() {
        let mgr = ConferenceManager::new();
        let session = mgr.create_session("h1", "topic", vec!["c1".to_string()], None).await;
        mgr.start_session(&session.id).await;
        mgr.start_voting(&session.id).await;
        assert!(!mgr.cast_vote(&session.id, "outsider", VoteType::Approve, "").await);
    }

    #[tokio::test]
    async fn concluded_session_cannot_be_cancelled() {
        let mgr = ConferenceManager::new();
        let session = mgr.create_session("h1", "topic", vec!["c1".to_string()], None).await;
        mgr.start_session(&session.id).await;
        mgr.start_voting(&session.id).await;
        mgr.cast_vote(&session.id, "c1", VoteType::Approve, "").await;
        mgr.conclude_session(&session.id).await;
        assert!(!mgr.cancel_session(&session.id).await);
    }
}
