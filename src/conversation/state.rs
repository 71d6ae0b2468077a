//! Conversation state machine: phases and the funnel selection.

use serde::{Deserialize, Serialize};

use crate::models::Organization;

/// The phases of a user's conversation with the bot.
///
/// Unauthenticated → AwaitingEmail → (link clicked) → AwaitingMenuChoice →
/// AwaitingFunnelOrg → AwaitingFunnelCity → AwaitingFunnelOffice →
/// AwaitingFunnelDepartment → AwaitingPersonSelection → AwaitingMenuChoice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Unauthenticated,
    AwaitingEmail,
    AwaitingMenuChoice,
    AwaitingFunnelOrg,
    AwaitingFunnelCity,
    AwaitingFunnelOffice,
    AwaitingFunnelDepartment,
    AwaitingPersonSelection,
}

impl Phase {
    /// Check if a transition from `self` to `target` is valid.
    /// Staying in the same phase is always valid.
    pub fn can_transition_to(&self, target: Phase) -> bool {
        use Phase::*;
        *self == target
            || matches!(
                (self, target),
                (Unauthenticated, AwaitingEmail)
                    | (Unauthenticated, AwaitingMenuChoice)
                    | (AwaitingEmail, Unauthenticated)
                    | (AwaitingMenuChoice, AwaitingFunnelOrg)
                    | (AwaitingFunnelOrg, AwaitingFunnelCity)
                    | (AwaitingFunnelCity, AwaitingFunnelOffice)
                    | (AwaitingFunnelOffice, AwaitingFunnelDepartment)
                    | (AwaitingFunnelDepartment, AwaitingPersonSelection)
                    | (AwaitingPersonSelection, AwaitingMenuChoice)
            )
    }

    /// The funnel step this phase is collecting, if it is a funnel phase.
    pub fn funnel_step(&self) -> Option<FunnelStep> {
        match self {
            Self::AwaitingFunnelOrg => Some(FunnelStep::Organization),
            Self::AwaitingFunnelCity => Some(FunnelStep::City),
            Self::AwaitingFunnelOffice => Some(FunnelStep::Office),
            Self::AwaitingFunnelDepartment => Some(FunnelStep::Department),
            Self::AwaitingPersonSelection => Some(FunnelStep::Person),
            Self::Unauthenticated | Self::AwaitingEmail | Self::AwaitingMenuChoice => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::AwaitingEmail => "awaiting_email",
            Self::AwaitingMenuChoice => "awaiting_menu_choice",
            Self::AwaitingFunnelOrg => "awaiting_funnel_org",
            Self::AwaitingFunnelCity => "awaiting_funnel_city",
            Self::AwaitingFunnelOffice => "awaiting_funnel_office",
            Self::AwaitingFunnelDepartment => "awaiting_funnel_department",
            Self::AwaitingPersonSelection => "awaiting_person_selection",
        };
        write!(f, "{s}")
    }
}

/// One level of the drill-down, in fill order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunnelStep {
    Organization,
    City,
    Office,
    Department,
    Person,
}

impl FunnelStep {
    /// Phase that collects this step.
    pub fn phase(&self) -> Phase {
        match self {
            Self::Organization => Phase::AwaitingFunnelOrg,
            Self::City => Phase::AwaitingFunnelCity,
            Self::Office => Phase::AwaitingFunnelOffice,
            Self::Department => Phase::AwaitingFunnelDepartment,
            Self::Person => Phase::AwaitingPersonSelection,
        }
    }

    pub fn next(&self) -> Option<FunnelStep> {
        match self {
            Self::Organization => Some(Self::City),
            Self::City => Some(Self::Office),
            Self::Office => Some(Self::Department),
            Self::Department => Some(Self::Person),
            Self::Person => None,
        }
    }
}

/// Drill-down progress. Fields fill strictly left to right; a string field
/// counts as set once non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelSelection {
    pub organization: String,
    pub city: String,
    pub office: String,
    pub department: String,
    pub target_user_id: Option<i64>,
}

impl FunnelSelection {
    fn levels(&self) -> [&str; 4] {
        [
            self.organization.as_str(),
            self.city.as_str(),
            self.office.as_str(),
            self.department.as_str(),
        ]
    }

    /// The first unset field decides the active step. `None` once a target
    /// person has been chosen.
    pub fn current_step(&self) -> Option<FunnelStep> {
        const ORDER: [FunnelStep; 4] = [
            FunnelStep::Organization,
            FunnelStep::City,
            FunnelStep::Office,
            FunnelStep::Department,
        ];
        for (value, step) in self.levels().iter().zip(ORDER) {
            if value.is_empty() {
                return Some(step);
            }
        }
        match self.target_user_id {
            None => Some(FunnelStep::Person),
            Some(_) => None,
        }
    }

    /// No gaps: nothing is set after an unset field.
    pub fn is_ordered(&self) -> bool {
        let levels = self.levels();
        let filled = levels.iter().take_while(|v| !v.is_empty()).count();
        let tail_empty = levels[filled..].iter().all(|v| v.is_empty());
        let target_ok = self.target_user_id.is_none() || filled == levels.len();
        tail_empty && target_ok
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The filled prefix, e.g. `["Gazprom Media", "Moscow"]`.
    pub fn path(&self) -> Vec<&str> {
        self.levels()
            .into_iter()
            .take_while(|v| !v.is_empty())
            .collect()
    }

    /// Copy of `self` with `step` filled in.
    ///
    /// Only the active organization-level step may be filled, with a
    /// non-empty value; anything else returns `None`. The person step goes
    /// through [`FunnelSelection::with_target`].
    pub fn with(&self, step: FunnelStep, value: &str) -> Option<FunnelSelection> {
        if self.current_step() != Some(step) || value.is_empty() {
            return None;
        }
        let mut next = self.clone();
        match step {
            FunnelStep::Organization => next.organization = value.to_string(),
            FunnelStep::City => next.city = value.to_string(),
            FunnelStep::Office => next.office = value.to_string(),
            FunnelStep::Department => next.department = value.to_string(),
            FunnelStep::Person => return None,
        }
        Some(next)
    }

    /// Copy of `self` with the target person chosen. Requires all four
    /// organization fields.
    pub fn with_target(&self, user_id: i64) -> Option<FunnelSelection> {
        if self.current_step() != Some(FunnelStep::Person) {
            return None;
        }
        let mut next = self.clone();
        next.target_user_id = Some(user_id);
        Some(next)
    }

    /// The selected organization once all four levels are set.
    pub fn organization(&self) -> Option<Organization> {
        if self.levels().iter().any(|v| v.is_empty()) {
            return None;
        }
        Some(Organization {
            id: 0,
            name: self.organization.clone(),
            city: self.city.clone(),
            office: self.office.clone(),
            department: self.department.clone(),
        })
    }
}

/// Key of one conversation: a user within one chat transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub channel: String,
    pub user_id: i64,
}

impl ConversationKey {
    pub fn new(channel: impl Into<String>, user_id: i64) -> Self {
        Self {
            channel: channel.into(),
            user_id,
        }
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.channel, self.user_id)
    }
}

/// Per-user conversation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub key: ConversationKey,
    pub phase: Phase,
    pub funnel: FunnelSelection,
}

impl ConversationState {
    /// Fresh state for a user seen for the first time.
    pub fn new(key: ConversationKey) -> Self {
        Self {
            key,
            phase: Phase::default(),
            funnel: FunnelSelection::default(),
        }
    }

    /// Same user, new phase and funnel.
    pub fn with(&self, phase: Phase, funnel: FunnelSelection) -> Self {
        Self {
            key: self.key.clone(),
            phase,
            funnel,
        }
    }

    /// Phase and funnel progress agree: funnel phases collect exactly the
    /// funnel's active step, other phases carry an empty funnel.
    pub fn is_consistent(&self) -> bool {
        if !self.funnel.is_ordered() {
            return false;
        }
        match self.phase.funnel_step() {
            Some(step) => self.funnel.current_step() == Some(step),
            None => self.funnel.is_empty(),
        }
    }
}
