//! Role status tracking
//!
//! Every pipeline role moves forward through `pending → in_progress →
//! completed`. Transitions are driven purely by which chunk fields are
//! non-empty; a transition that would move a role backwards is ignored.

use agent_core::{AnalystKind, AnalystSet, PipelineChunk, is_truthy, keys};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use tracing::debug;

/// The twelve tracked pipeline roles, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    MarketAnalyst,
    SocialAnalyst,
    NewsAnalyst,
    FundamentalsAnalyst,
    BullResearcher,
    BearResearcher,
    ResearchManager,
    Trader,
    RiskyAnalyst,
    NeutralAnalyst,
    SafeAnalyst,
    PortfolioManager,
}

impl Role {
    pub const ALL: [Role; 12] = [
        Role::MarketAnalyst,
        Role::SocialAnalyst,
        Role::NewsAnalyst,
        Role::FundamentalsAnalyst,
        Role::BullResearcher,
        Role::BearResearcher,
        Role::ResearchManager,
        Role::Trader,
        Role::RiskyAnalyst,
        Role::NeutralAnalyst,
        Role::SafeAnalyst,
        Role::PortfolioManager,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Self::MarketAnalyst => "Market Analyst",
            Self::SocialAnalyst => "Social Analyst",
            Self::NewsAnalyst => "News Analyst",
            Self::FundamentalsAnalyst => "Fundamentals Analyst",
            Self::BullResearcher => "Bull Researcher",
            Self::BearResearcher => "Bear Researcher",
            Self::ResearchManager => "Research Manager",
            Self::Trader => "Trader",
            Self::RiskyAnalyst => "Risky Analyst",
            Self::NeutralAnalyst => "Neutral Analyst",
            Self::SafeAnalyst => "Safe Analyst",
            Self::PortfolioManager => "Portfolio Manager",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Status of one role. Ordered so that a larger value is further along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

/// Full role → status map at one point in time
///
/// Serializes as an object keyed by display name, in role order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusSnapshot {
    statuses: [RoleStatus; 12],
}

impl StatusSnapshot {
    pub fn get(&self, role: Role) -> RoleStatus {
        self.statuses[role.index()]
    }

    /// Iterate over roles and their statuses in display order
    pub fn iter(&self) -> impl Iterator<Item = (Role, RoleStatus)> + '_ {
        Role::ALL.iter().map(|role| (*role, self.get(*role)))
    }

    /// True if no role is behind the same role in `earlier`
    pub fn dominates(&self, earlier: &StatusSnapshot) -> bool {
        self.iter().all(|(role, status)| status >= earlier.get(role))
    }
}

impl Serialize for StatusSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Role::ALL.len()))?;
        for (role, status) in self.iter() {
            map.serialize_entry(role.display_name(), &status)?;
        }
        map.end()
    }
}

/// A condition observed in a chunk that can move role statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    MarketReport,
    SentimentReport,
    NewsReport,
    FundamentalsReport,
    BullHistory,
    BearHistory,
    ResearchJudge,
    TraderPlan,
    RiskyResponse,
    SafeResponse,
    NeutralResponse,
    RiskJudge,
}

impl Trigger {
    /// Triggers fired by one non-empty monitored field, in evaluation order
    pub fn from_field(name: &str, value: &Value) -> Vec<Trigger> {
        match name {
            keys::MARKET_REPORT => vec![Self::MarketReport],
            keys::SENTIMENT_REPORT => vec![Self::SentimentReport],
            keys::NEWS_REPORT => vec![Self::NewsReport],
            keys::FUNDAMENTALS_REPORT => vec![Self::FundamentalsReport],
            keys::TRADER_INVESTMENT_PLAN => vec![Self::TraderPlan],
            keys::INVESTMENT_DEBATE_STATE => sub_triggers(
                value,
                &[
                    (keys::BULL_HISTORY, Self::BullHistory),
                    (keys::BEAR_HISTORY, Self::BearHistory),
                    (keys::JUDGE_DECISION, Self::ResearchJudge),
                ],
            ),
            keys::RISK_DEBATE_STATE => sub_triggers(
                value,
                &[
                    (keys::CURRENT_RISKY_RESPONSE, Self::RiskyResponse),
                    (keys::CURRENT_SAFE_RESPONSE, Self::SafeResponse),
                    (keys::CURRENT_NEUTRAL_RESPONSE, Self::NeutralResponse),
                    (keys::JUDGE_DECISION, Self::RiskJudge),
                ],
            ),
            _ => Vec::new(),
        }
    }

    /// Role transitions this trigger requests, given the selected analysts
    pub fn transitions(self, analysts: &AnalystSet) -> Vec<(Role, RoleStatus)> {
        use RoleStatus::{Completed, InProgress};

        let research_team = [Role::BullResearcher, Role::BearResearcher, Role::ResearchManager];
        let requested = |kind: AnalystKind| analysts.contains(&kind);

        match self {
            Self::MarketReport => {
                let mut t = vec![(Role::MarketAnalyst, Completed)];
                if requested(AnalystKind::Social) {
                    t.push((Role::SocialAnalyst, InProgress));
                }
                t
            }
            Self::SentimentReport => {
                let mut t = vec![(Role::SocialAnalyst, Completed)];
                if requested(AnalystKind::News) {
                    t.push((Role::NewsAnalyst, InProgress));
                }
                t
            }
            Self::NewsReport => {
                let mut t = vec![(Role::NewsAnalyst, Completed)];
                if requested(AnalystKind::Fundamentals) {
                    t.push((Role::FundamentalsAnalyst, InProgress));
                }
                t
            }
            Self::FundamentalsReport => std::iter::once((Role::FundamentalsAnalyst, Completed))
                .chain(research_team.iter().map(|r| (*r, InProgress)))
                .collect(),
            Self::BullHistory | Self::BearHistory => {
                research_team.iter().map(|r| (*r, InProgress)).collect()
            }
            Self::ResearchJudge => research_team
                .iter()
                .map(|r| (*r, Completed))
                .chain(std::iter::once((Role::Trader, InProgress)))
                .collect(),
            Self::TraderPlan => vec![(Role::Trader, Completed), (Role::RiskyAnalyst, InProgress)],
            Self::RiskyResponse => vec![(Role::RiskyAnalyst, InProgress)],
            Self::SafeResponse => vec![(Role::SafeAnalyst, InProgress)],
            Self::NeutralResponse => vec![(Role::NeutralAnalyst, InProgress)],
            Self::RiskJudge => [
                Role::RiskyAnalyst,
                Role::SafeAnalyst,
                Role::NeutralAnalyst,
                Role::PortfolioManager,
            ]
            .iter()
            .map(|r| (*r, Completed))
            .collect(),
        }
    }
}

fn sub_triggers(value: &Value, fields: &[(&str, Trigger)]) -> Vec<Trigger> {
    // A debate state that is not a mapping counts as empty
    let Some(state) = value.as_object() else {
        return Vec::new();
    };
    fields
        .iter()
        .filter(|(field, _)| state.get(*field).is_some_and(is_truthy))
        .map(|(_, trigger)| *trigger)
        .collect()
}

/// Forward-only status state machine for all roles
#[derive(Debug, Clone)]
pub struct StatusTracker {
    analysts: AnalystSet,
    current: StatusSnapshot,
}

impl StatusTracker {
    /// Create a tracker with every role pending
    pub fn new(analysts: AnalystSet) -> Self {
        Self {
            analysts,
            current: StatusSnapshot::default(),
        }
    }

    pub fn get(&self, role: Role) -> RoleStatus {
        self.current.get(role)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.current
    }

    /// Move `role` to `target` if that is a step forward. Returns whether
    /// the status changed.
    pub fn advance(&mut self, role: Role, target: RoleStatus) -> bool {
        let slot = &mut self.current.statuses[role.index()];
        if target > *slot {
            *slot = target;
            true
        } else {
            if target < *slot {
                debug!(
                    role = role.display_name(),
                    from = ?*slot,
                    to = ?target,
                    "Ignoring status regression"
                );
            }
            false
        }
    }

    /// Apply a trigger. Returns whether any role changed.
    pub fn observe(&mut self, trigger: Trigger) -> bool {
        let mut changed = false;
        for (role, target) in trigger.transitions(&self.analysts) {
            changed |= self.advance(role, target);
        }
        changed
    }

    /// Apply every trigger found in a chunk. Returns whether any role changed.
    pub fn observe_chunk(&mut self, chunk: &PipelineChunk) -> bool {
        let mut changed = false;
        for name in keys::MONITORED_FIELDS {
            if let Some(value) = chunk.non_empty(name) {
                for trigger in Trigger::from_field(name, value) {
                    changed |= self.observe(trigger);
                }
            }
        }
        changed
    }
}
