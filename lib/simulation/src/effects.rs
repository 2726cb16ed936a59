//! Declarative pulse rules.
//!
//! A rule says "when a node matching `selector` reaches lifecycle point `on`,
//! apply `effects`". Graphs never mention effects; the engine evaluates the
//! rule list against every node it starts or completes.

use flowlab_workflow::{Node, NodeId, NodeType};
use serde::{Deserialize, Serialize};

/// The lifecycle point a rule reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// The node entered `running`.
    Started,
    /// The node entered `completed`.
    Completed,
}

/// Which nodes a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Selector {
    /// `ai`, `agent` and `condition-agent` nodes.
    AiLike,
    OfType(NodeType),
    Node(NodeId),
}

impl Selector {
    #[must_use]
    pub fn matches(&self, node: &Node) -> bool {
        match self {
            Self::AiLike => node.node_type.is_ai_like(),
            Self::OfType(node_type) => node.node_type == *node_type,
            Self::Node(id) => &node.id == id,
        }
    }
}

/// A visual side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// Pulse idle error handlers attached to the node `pending -> skipped`.
    FlashErrorHandlers,
    /// Flip the node's circuit breaker `closed -> half-open -> closed`.
    PulseCircuitBreaker,
    /// Highlight the node's attached tools and MCP servers.
    HighlightTools,
    ClearToolHighlights,
    /// Reveal the node's reasoning steps spread over its running time.
    RevealReasoning,
}

/// One pulse rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectRule {
    pub selector: Selector,
    pub on: Lifecycle,
    pub effects: Vec<Effect>,
}

impl EffectRule {
    #[must_use]
    pub fn new(selector: Selector, on: Lifecycle, effects: Vec<Effect>) -> Self {
        Self {
            selector,
            on,
            effects,
        }
    }

    /// Returns true if this rule fires for `node` at `lifecycle`.
    #[must_use]
    pub fn applies(&self, node: &Node, lifecycle: Lifecycle) -> bool {
        self.on == lifecycle && self.selector.matches(node)
    }
}

/// The built-in rules for AI-like nodes.
#[must_use]
pub fn default_rules() -> Vec<EffectRule> {
    vec![
        EffectRule::new(
            Selector::AiLike,
            Lifecycle::Started,
            vec![Effect::HighlightTools, Effect::RevealReasoning],
        ),
        EffectRule::new(
            Selector::AiLike,
            Lifecycle::Completed,
            vec![
                Effect::FlashErrorHandlers,
                Effect::PulseCircuitBreaker,
                Effect::ClearToolHighlights,
            ],
        ),
    ]
}

/// Collects the effects every matching rule contributes, in rule order.
#[must_use]
pub fn effects_for(rules: &[EffectRule], node: &Node, lifecycle: Lifecycle) -> Vec<Effect> {
    rules
        .iter()
        .filter(|rule| rule.applies(node, lifecycle))
        .flat_map(|rule| rule.effects.iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_target_ai_like_nodes() {
        let rules = default_rules();
        let agent = Node::new("a", NodeType::Agent, "Agent");
        let process = Node::new("p", NodeType::Process, "Process");

        assert_eq!(
            effects_for(&rules, &agent, Lifecycle::Completed),
            vec![
                Effect::FlashErrorHandlers,
                Effect::PulseCircuitBreaker,
                Effect::ClearToolHighlights
            ]
        );
        assert!(effects_for(&rules, &process, Lifecycle::Completed).is_empty());
        assert_eq!(
            effects_for(&rules, &agent, Lifecycle::Started),
            vec![Effect::HighlightTools, Effect::RevealReasoning]
        );
    }

    #[test]
    fn node_selector_matches_by_id() {
        let rule = EffectRule::new(
            Selector::Node(NodeId::from("special")),
            Lifecycle::Completed,
            vec![Effect::PulseCircuitBreaker],
        );
        assert!(rule.applies(&Node::new("special", NodeType::Process, "S"), Lifecycle::Completed));
        assert!(!rule.applies(&Node::new("special", NodeType::Process, "S"), Lifecycle::Started));
        assert!(!rule.applies(&Node::new("other", NodeType::Process, "O"), Lifecycle::Completed));
    }

    #[test]
    fn type_selector() {
        let selector = Selector::OfType(NodeType::Wait);
        assert!(selector.matches(&Node::new("w", NodeType::Wait, "Wait")));
        assert!(!selector.matches(&Node::new("x", NodeType::Iterator, "Iter")));
    }
}
