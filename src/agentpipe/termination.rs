//! Pluggable strategies deciding when a group chat stage is done.
//!
//! A [`TerminationStrategy`] is evaluated by the [`GroupChat`](crate::group_chat::GroupChat)
//! after every turn, with the identity of the agent that just spoke. It also
//! carries the hard iteration cap that bounds the chat.
//!
//! ```text
//! GroupChat
//!   └─ TerminationStrategy
//!        ├─ maximum_iterations()                 // hard cap, enforced by the chat
//!        └─ should_terminate(agent, &history)    // "is this stage done?"
//! ```
//!
//! Two strategies are provided:
//!
//! - [`AlwaysContinue`]: never signals; the chat runs until the cap.
//! - [`KeywordApproval`]: signals when an authorized agent's message contains
//!   the approval keyword (case-insensitive substring match).

use crate::history::ChatHistory;
use std::collections::HashSet;

/// Default keyword looked for by [`KeywordApproval`].
pub const DEFAULT_APPROVAL_KEYWORD: &str = "approved";

/// Decision function evaluated after each group-chat turn.
pub trait TerminationStrategy: Send + Sync {
    /// Upper bound on the number of turns in one chat run. Must be positive.
    fn maximum_iterations(&self) -> usize;

    /// Return `true` when the stage is complete.
    ///
    /// `acting_agent` is the id of the participant whose message was just
    /// appended. Implementations must treat an empty history as
    /// non-terminating.
    fn should_terminate(&self, acting_agent: &str, history: &ChatHistory) -> bool;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &str;
}

/// Base strategy: never terminates early.
#[derive(Debug, Clone)]
pub struct AlwaysContinue {
    maximum_iterations: usize,
}

impl AlwaysContinue {
    pub fn new(maximum_iterations: usize) -> Self {
        Self { maximum_iterations }
    }
}

impl TerminationStrategy for AlwaysContinue {
    fn maximum_iterations(&self) -> usize {
        self.maximum_iterations
    }

    fn should_terminate(&self, _acting_agent: &str, _history: &ChatHistory) -> bool {
        false
    }

    fn name(&self) -> &str {
        "AlwaysContinue"
    }
}

/// Terminates when an authorized agent's latest message contains a keyword.
///
/// The match is a lower-cased substring test against free-form model output,
/// so `"Approved with notes"` matches and so does `"Not approved"`. Only the
/// agents listed at construction can end the stage; the same word from any
/// other participant is ignored.
///
/// # Examples
///
/// ```
/// use agentpipe::history::{ChatHistory, ChatMessage};
/// use agentpipe::termination::{KeywordApproval, TerminationStrategy};
///
/// let strategy = KeywordApproval::new(["AnalysisChecker"], 10);
///
/// let mut history = ChatHistory::new();
/// history.append(ChatMessage::from_agent("AnalysisChecker", "Approved with notes"));
/// assert!(strategy.should_terminate("AnalysisChecker", &history));
///
/// history.append(ChatMessage::from_agent("DataCleaning", "approved"));
/// assert!(!strategy.should_terminate("DataCleaning", &history));
/// ```
#[derive(Debug, Clone)]
pub struct KeywordApproval {
    authorized_agents: HashSet<String>,
    keyword: String,
    base: AlwaysContinue,
}

impl KeywordApproval {
    /// Create a strategy authorizing `agents`, using the `"approved"` keyword.
    pub fn new<I, S>(agents: I, maximum_iterations: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            authorized_agents: agents.into_iter().map(Into::into).collect(),
            keyword: DEFAULT_APPROVAL_KEYWORD.to_string(),
            base: AlwaysContinue::new(maximum_iterations),
        }
    }

    /// Replace the approval keyword (builder pattern). Stored lower-cased.
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = keyword.into().to_lowercase();
        self
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn is_authorized(&self, agent_id: &str) -> bool {
        self.authorized_agents.contains(agent_id)
    }
}

impl TerminationStrategy for KeywordApproval {
    fn maximum_iterations(&self) -> usize {
        self.base.maximum_iterations()
    }

    fn should_terminate(&self, acting_agent: &str, history: &ChatHistory) -> bool {
        let last = match history.last() {
            Ok(message) => message,
            Err(_) => return false,
        };
        if self.is_authorized(acting_agent)
            && last.content.to_lowercase().contains(&self.keyword)
        {
            return true;
        }
        self.base.should_terminate(acting_agent, history)
    }

    fn name(&self) -> &str {
        "KeywordApproval"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ChatMessage;

    fn history_with(author: &str, content: &str) -> ChatHistory {
        let mut history = ChatHistory::new();
        history.append(ChatMessage::user("seed"));
        history.append(ChatMessage::from_agent(author, content));
        history
    }

    #[test]
    fn test_authorized_agent_with_keyword_terminates() {
        let strategy = KeywordApproval::new(["checker"], 10);
        let history = history_with("checker", "Approved with notes");
        assert!(strategy.should_terminate("checker", &history));
    }

    #[test]
    fn test_unauthorized_agent_cannot_terminate() {
        let strategy = KeywordApproval::new(["checker"], 10);
        let history = history_with("cleaning", "approved");
        assert!(!strategy.should_terminate("cleaning", &history));
    }

    #[test]
    fn test_not_approved_still_matches_substring() {
        // "not approved" contains "approved"; the check is a plain substring test.
        let strategy = KeywordApproval::new(["checker"], 10);
        let history = history_with("checker", "Not approved: row counts differ");
        assert!(strategy.should_terminate("checker", &history));
    }

    #[test]
    fn test_authorized_agent_without_keyword_continues() {
        let strategy = KeywordApproval::new(["checker"], 10);
        let history = history_with("checker", "Failed: statistics missing");
        assert!(!strategy.should_terminate("checker", &history));
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        let strategy = KeywordApproval::new(["checker"], 10);
        let history = history_with("checker", "{\"title\": \"APPROVED\"}");
        assert!(strategy.should_terminate("checker", &history));
    }

    #[test]
    fn test_custom_keyword() {
        let strategy = KeywordApproval::new(["reviewer"], 3).with_keyword("LGTM");
        assert_eq!(strategy.keyword(), "lgtm");
        let history = history_with("reviewer", "lgtm, ship it");
        assert!(strategy.should_terminate("reviewer", &history));
        let history = history_with("reviewer", "approved");
        assert!(!strategy.should_terminate("reviewer", &history));
    }

    #[test]
    fn test_empty_history_never_terminates() {
        let strategy = KeywordApproval::new(["checker"], 10);
        assert!(!strategy.should_terminate("checker", &ChatHistory::new()));
        assert!(!AlwaysContinue::new(1).should_terminate("checker", &ChatHistory::new()));
    }

    #[test]
    fn test_always_continue_never_signals() {
        let strategy = AlwaysContinue::new(4);
        let history = history_with("anyone", "approved");
        assert!(!strategy.should_terminate("anyone", &history));
        assert_eq!(strategy.maximum_iterations(), 4);
    }
}
