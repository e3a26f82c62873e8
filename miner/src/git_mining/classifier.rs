//! Rule-based authorship tagging.

use crate::config::{default_agents, AgentIdentifier};
use provenance_store::{ActorSet, AuthorshipTag};

/// Tags an ActorSet as automated or human from a fixed identifier table.
#[derive(Debug, Clone)]
pub struct AuthorshipClassifier {
    /// (lower-cased fragment, label), in declaration order
    identifiers: Vec<(String, String)>,
}

impl Default for AuthorshipClassifier {
    fn default() -> Self {
        Self::new(&default_agents())
    }
}

impl AuthorshipClassifier {
    pub fn new(agents: &[AgentIdentifier]) -> Self {
        Self {
            identifiers: agents
                .iter()
                .map(|a| (a.identifier.to_lowercase(), a.label.clone()))
                .collect(),
        }
    }

    /// Actors are scanned in order; for each actor the identifiers are tried
    /// in table order and the first substring hit decides the label.
    pub fn classify(&self, actors: &ActorSet) -> AuthorshipTag {
        for actor in actors.iter() {
            let lower = actor.to_lowercase();
            if let Some((_, label)) = self
                .identifiers
                .iter()
                .find(|(fragment, _)| lower.contains(fragment.as_str()))
            {
                return AuthorshipTag::automated(label.clone());
            }
        }
        AuthorshipTag::Human
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provenance_store::Authorship;

    #[test]
    fn test_human_when_nothing_matches() {
        let classifier = AuthorshipClassifier::default();
        for actors in [
            ActorSet::new(["alice"]),
            ActorSet::new(["Bob Smith", "GitHub"]),
            ActorSet::default(),
        ] {
            assert_eq!(classifier.classify(&actors), AuthorshipTag::Human);
        }
    }

    #[test]
    fn test_bot_accounts() {
        let classifier = AuthorshipClassifier::default();
        let tag = classifier.classify(&ActorSet::new(["copilot[bot]"]));
        assert_eq!(tag, AuthorshipTag::automated("copilot"));
        assert_eq!(tag.authorship(), Authorship::Automated);

        let tag = classifier.classify(&ActorSet::new(["devin-ai-integration[bot]"]));
        assert_eq!(tag.agent_label(), "devin");

        let tag = classifier.classify(&ActorSet::new(["Claude"]));
        assert_eq!(tag.agent_label(), "claude");
    }

    #[test]
    fn test_match_in_committer_counts() {
        let classifier = AuthorshipClassifier::default();
        let tag = classifier.classify(&ActorSet::new(["alice", "Cursor Agent"]));
        assert_eq!(tag, AuthorshipTag::automated("cursor"));
    }

    #[test]
    fn test_first_actor_decides() {
        let classifier = AuthorshipClassifier::default();
        let tag = classifier.classify(&ActorSet::new(["claude", "copilot"]));
        assert_eq!(tag.agent_label(), "claude");
    }

    #[test]
    fn test_table_order_breaks_ties_within_a_name() {
        let classifier = AuthorshipClassifier::default();
        // Matches both "cursor" and "claude"; "cursor" is declared first.
        let tag = classifier.classify(&ActorSet::new(["claude-cursor-bridge"]));
        assert_eq!(tag.agent_label(), "cursor");
    }

    #[test]
    fn test_custom_table_is_case_insensitive() {
        let classifier = AuthorshipClassifier::new(&[AgentIdentifier::new("Renovate", "renovate")]);
        let tag = classifier.classify(&ActorSet::new(["RENOVATE[bot]"]));
        assert_eq!(tag, AuthorshipTag::automated("renovate"));
        assert_eq!(
            classifier.classify(&ActorSet::new(["copilot"])),
            AuthorshipTag::Human
        );
    }
}
