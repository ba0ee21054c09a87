//! Closed role sets for the three hierarchy tiers.
//!
//! Every role that can appear in a plan, a pipeline table or a registry
//! record is a variant here. Lookups keyed on these enums are exhaustive
//! `match`es, so adding a role forces every table to be updated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SwarmError;

/// The three hierarchy levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Top tier: plans the goal and synthesizes the final answer.
    Queen,
    /// Mid tier: one domain lead per planned task.
    Lead,
    /// Leaf tier: specialists running inside a domain pipeline.
    Specialist,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Queen => write!(f, "queen"),
            Tier::Lead => write!(f, "lead"),
            Tier::Specialist => write!(f, "specialist"),
        }
    }
}

/// Mid-tier domains a plan can assign work to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainRole {
    /// Plans, writes, tests and reviews code.
    Coder,
    /// Gathers and verifies information.
    Researcher,
    /// Reasons about data and trade-offs.
    Analyst,
    /// Checks other tiers' output for correctness and completeness.
    Validator,
    /// Plans and carries out concrete actions.
    Executor,
    /// Designs systems; has no specialist pipeline.
    Architect,
}

impl DomainRole {
    /// Every domain, in declaration order.
    pub const ALL: [DomainRole; 6] = [
        DomainRole::Coder,
        DomainRole::Researcher,
        DomainRole::Analyst,
        DomainRole::Validator,
        DomainRole::Executor,
        DomainRole::Architect,
    ];

    /// Wire name of the domain.
    pub fn as_str(self) -> &'static str {
        match self {
            DomainRole::Coder => "coder",
            DomainRole::Researcher => "researcher",
            DomainRole::Analyst => "analyst",
            DomainRole::Validator => "validator",
            DomainRole::Executor => "executor",
            DomainRole::Architect => "architect",
        }
    }
}

impl fmt::Display for DomainRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DomainRole {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        DomainRole::ALL
            .into_iter()
            .find(|r| r.as_str() == needle)
            .ok_or_else(|| SwarmError::Planning(format!("unknown domain role '{s}'")))
    }
}

/// Leaf-tier specialists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistRole {
    /// Breaks a coding task into an implementation plan.
    CodePlanner,
    /// Writes code following the plan.
    CodeWriter,
    /// Writes tests for the produced code.
    CodeTester,
    /// Reviews the produced code.
    CodeReviewer,
    /// Collects raw information.
    WebSearcher,
    /// Condenses raw findings into claims.
    Synthesizer,
    /// Verifies synthesized claims.
    FactVerifier,
    /// Works through a problem step by step.
    Reasoner,
    /// Attacks the reasoning for weaknesses.
    Critiquer,
    /// Summarizes all prior stage outputs.
    Summarizer,
    /// Checks output correctness.
    CorrectnessChecker,
    /// Checks output completeness.
    CompletenessChecker,
    /// Scores overall quality.
    Scorer,
    /// Plans concrete actions.
    ActionPlanner,
    /// Carries out planned actions.
    ActionRunner,
}

impl SpecialistRole {
    /// Every specialist, in declaration order.
    pub const ALL: [SpecialistRole; 15] = [
        SpecialistRole::CodePlanner,
        SpecialistRole::CodeWriter,
        SpecialistRole::CodeTester,
        SpecialistRole::CodeReviewer,
        SpecialistRole::WebSearcher,
        SpecialistRole::Synthesizer,
        SpecialistRole::FactVerifier,
        SpecialistRole::Reasoner,
        SpecialistRole::Critiquer,
        SpecialistRole::Summarizer,
        SpecialistRole::CorrectnessChecker,
        SpecialistRole::CompletenessChecker,
        SpecialistRole::Scorer,
        SpecialistRole::ActionPlanner,
        SpecialistRole::ActionRunner,
    ];

    /// Wire name of the specialist.
    pub fn as_str(self) -> &'static str {
        match self {
            SpecialistRole::CodePlanner => "code_planner",
            SpecialistRole::CodeWriter => "code_writer",
            SpecialistRole::CodeTester => "code_tester",
            SpecialistRole::CodeReviewer => "code_reviewer",
            SpecialistRole::WebSearcher => "web_searcher",
            SpecialistRole::Synthesizer => "synthesizer",
            SpecialistRole::FactVerifier => "fact_verifier",
            SpecialistRole::Reasoner => "reasoner",
            SpecialistRole::Critiquer => "critiquer",
            SpecialistRole::Summarizer => "summarizer",
            SpecialistRole::CorrectnessChecker => "correctness_checker",
            SpecialistRole::CompletenessChecker => "completeness_checker",
            SpecialistRole::Scorer => "scorer",
            SpecialistRole::ActionPlanner => "action_planner",
            SpecialistRole::ActionRunner => "action_runner",
        }
    }

    /// Heading used when this role's output is shown to a later stage.
    pub fn title(self) -> String {
        self.as_str().replace('_', " ").to_uppercase()
    }
}

impl fmt::Display for SpecialistRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpecialistRole {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        SpecialistRole::ALL
            .into_iter()
            .find(|r| r.as_str() == needle)
            .ok_or_else(|| SwarmError::Agent(format!("unknown specialist role '{s}'")))
    }
}

/// The role of any agent in the swarm, across all tiers.
///
/// Serialized as the flat role name (`"queen"`, `"coder"`, `"code_writer"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AgentRole {
    /// The planner.
    Queen,
    /// The final-answer synthesizer; a separate identity from the planner.
    QueenSynthesizer,
    /// A mid-tier domain lead (or a flat-mode worker for that domain).
    Lead(DomainRole),
    /// A leaf specialist.
    Specialist(SpecialistRole),
}

impl AgentRole {
    /// Which hierarchy level this role belongs to.
    pub fn tier(self) -> Tier {
        match self {
            AgentRole::Queen | AgentRole::QueenSynthesizer => Tier::Queen,
            AgentRole::Lead(_) => Tier::Lead,
            AgentRole::Specialist(_) => Tier::Specialist,
        }
    }

    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::Queen => "queen",
            AgentRole::QueenSynthesizer => "queen_synthesizer",
            AgentRole::Lead(d) => d.as_str(),
            AgentRole::Specialist(s) => s.as_str(),
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queen" => return Ok(AgentRole::Queen),
            "queen_synthesizer" => return Ok(AgentRole::QueenSynthesizer),
            _ => {}
        }
        if let Ok(d) = s.parse::<DomainRole>() {
            return Ok(AgentRole::Lead(d));
        }
        s.parse::<SpecialistRole>()
            .map(AgentRole::Specialist)
            .map_err(|_| SwarmError::Agent(format!("unknown agent role '{s}'")))
    }
}

impl TryFrom<String> for AgentRole {
    type Error = SwarmError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AgentRole> for String {
    fn from(role: AgentRole) -> Self {
        role.as_str().to_string()
    }
}

impl From<DomainRole> for AgentRole {
    fn from(role: DomainRole) -> Self {
        AgentRole::Lead(role)
    }
}

impl From<SpecialistRole> for AgentRole {
    fn from(role: SpecialistRole) -> Self {
        AgentRole::Specialist(role)
    }
}
