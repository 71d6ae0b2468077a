//! Conversation engine — interprets one inbound message against the
//! sender's current state and decides the next state and the replies.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::auth::AccountService;
use crate::channels::OutgoingResponse;
use crate::conversation::input::{is_valid_email, parse_selection};
use crate::conversation::messages as msg;
use crate::conversation::state::{
    ConversationKey, ConversationState, FunnelSelection, FunnelStep, Phase,
};
use crate::conversation::store::StateStore;
use crate::directory::DirectoryGateway;
use crate::error::AuthError;
use crate::models::ChannelIdentity;
use crate::subscribe::DirectorySearch;

/// Result of one transition: the state to store and the replies to send.
type Transition = (ConversationState, Vec<OutgoingResponse>);

/// The conversation state machine.
///
/// Stateless itself; all per-user data lives in the [`StateStore`]. Every
/// collaborator failure becomes a user-facing reply, and the state is
/// written back once per message after the transition is decided.
pub struct ConversationEngine {
    accounts: Arc<dyn AccountService>,
    directory: Arc<dyn DirectoryGateway>,
    search: Arc<dyn DirectorySearch>,
    states: Arc<dyn StateStore>,
}

impl ConversationEngine {
    pub fn new(
        accounts: Arc<dyn AccountService>,
        directory: Arc<dyn DirectoryGateway>,
        search: Arc<dyn DirectorySearch>,
        states: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            accounts,
            directory,
            search,
            states,
        }
    }

    /// Handle one inbound message from `identity`, returning the reply batch.
    pub async fn handle(&self, identity: &ChannelIdentity, text: &str) -> Vec<OutgoingResponse> {
        let key = ConversationKey::new(identity.channel.clone(), identity.user_id);
        let mut state = self
            .states
            .get(&key)
            .await
            .unwrap_or_else(|| ConversationState::new(key.clone()));

        if !state.is_consistent() {
            error!(
                user = %key,
                phase = %state.phase,
                funnel = ?state.funnel,
                "Phase and funnel disagree, resetting conversation"
            );
            state = ConversationState::new(key.clone());
        }

        let from = state.phase;
        let (next, replies) = self.transition(identity, state, text.trim()).await;

        if !from.can_transition_to(next.phase) {
            error!(user = %key, %from, to = %next.phase, "Unexpected phase transition");
        }
        debug!(user = %key, %from, to = %next.phase, replies = replies.len(), "Message handled");

        self.states.put(key, next).await;
        replies
    }

    async fn transition(
        &self,
        identity: &ChannelIdentity,
        state: ConversationState,
        text: &str,
    ) -> Transition {
        match state.phase {
            Phase::Unauthenticated => self.on_unauthenticated(identity, state).await,
            Phase::AwaitingEmail => self.on_email(identity, state, text).await,
            Phase::AwaitingMenuChoice => self.on_menu_choice(state, text).await,
            Phase::AwaitingFunnelOrg
            | Phase::AwaitingFunnelCity
            | Phase::AwaitingFunnelOffice => self.on_funnel_level(state, text).await,
            Phase::AwaitingFunnelDepartment => self.on_department(state, text).await,
            Phase::AwaitingPersonSelection => self.on_person(identity, state, text).await,
        }
    }

    // ── Authentication ──────────────────────────────────────────────

    async fn on_unauthenticated(
        &self,
        identity: &ChannelIdentity,
        state: ConversationState,
    ) -> Transition {
        match self.accounts.is_activated(identity).await {
            Ok(true) => (
                state.with(Phase::AwaitingMenuChoice, FunnelSelection::default()),
                vec![menu()],
            ),
            Ok(false) => (state, vec![OutgoingResponse::text(msg::CHECK_EMAIL)]),
            Err(AuthError::Database(e)) if e.is_not_found() => (
                state.with(Phase::AwaitingEmail, FunnelSelection::default()),
                vec![
                    OutgoingResponse::text(msg::WELCOME),
                    OutgoingResponse::text(msg::ASK_EMAIL),
                ],
            ),
            Err(e) => {
                warn!(user_id = identity.user_id, error = %e, "Activation check failed");
                (state, vec![OutgoingResponse::text(msg::SERVER_ERROR)])
            }
        }
    }

    async fn on_email(
        &self,
        identity: &ChannelIdentity,
        state: ConversationState,
        text: &str,
    ) -> Transition {
        if !is_valid_email(text) {
            return (state, vec![OutgoingResponse::text(msg::INVALID_EMAIL)]);
        }

        let record = match self.directory.employee(text).await {
            Ok(record) => record,
            Err(e) => {
                debug!(user_id = identity.user_id, error = %e, "Directory lookup failed");
                return (state, vec![OutgoingResponse::text(msg::EMPLOYEE_NOT_FOUND)]);
            }
        };

        let (person, org) = record.into_parts();
        match self.accounts.register_new_user(&person, identity, &org).await {
            Ok(_) => (
                state.with(Phase::Unauthenticated, FunnelSelection::default()),
                vec![OutgoingResponse::text(msg::CHECK_EMAIL)],
            ),
            Err(AuthError::UserExists { email }) => {
                debug!(user_id = identity.user_id, %email, "Email already registered");
                (state, vec![OutgoingResponse::text(msg::ALREADY_REGISTERED)])
            }
            Err(e) => {
                error!(user_id = identity.user_id, error = %e, "Registration failed");
                (state, vec![OutgoingResponse::text(msg::REGISTRATION_FAILED)])
            }
        }
    }

    // ── Menu ────────────────────────────────────────────────────────

    async fn on_menu_choice(&self, state: ConversationState, text: &str) -> Transition {
        match text {
            "1" => match self.search.options(&[]).await {
                Ok(options) if !options.is_empty() => (
                    state.with(Phase::AwaitingFunnelOrg, FunnelSelection::default()),
                    vec![choose(FunnelStep::Organization, options)],
                ),
                Ok(_) => (state, vec![OutgoingResponse::text(msg::DIRECTORY_EMPTY)]),
                Err(e) => {
                    warn!(error = %e, "Listing organizations failed");
                    (state, vec![OutgoingResponse::text(msg::SERVER_ERROR)])
                }
            },
            "2" => (state, vec![OutgoingResponse::text(msg::NOT_IMPLEMENTED)]),
            _ => (state, vec![OutgoingResponse::text(msg::UNKNOWN_COMMAND)]),
        }
    }

    // ── Funnel ──────────────────────────────────────────────────────

    /// Organization, city and office: fill the level, then list the next one.
    async fn on_funnel_level(&self, state: ConversationState, text: &str) -> Transition {
        let Some(step) = state.funnel.current_step() else {
            return (state, vec![OutgoingResponse::text(msg::SERVER_ERROR)]);
        };
        let (Some(candidate), Some(next_step)) = (state.funnel.with(step, text), step.next()) else {
            return (state, vec![OutgoingResponse::text(msg::NO_SUCH_OPTION)]);
        };

        match self.search.options(&candidate.path()).await {
            Ok(options) if !options.is_empty() => {
                let reply = choose(next_step, options);
                (state.with(next_step.phase(), candidate), vec![reply])
            }
            Ok(_) => (state, vec![OutgoingResponse::text(msg::NO_SUCH_OPTION)]),
            Err(e) => {
                warn!(?step, error = %e, "Funnel lookup failed");
                (state, vec![OutgoingResponse::text(msg::SERVER_ERROR)])
            }
        }
    }

    /// Department: fill it, resolve the exact organization and list its members.
    async fn on_department(&self, state: ConversationState, text: &str) -> Transition {
        let Some(candidate) = state.funnel.with(FunnelStep::Department, text) else {
            return (state, vec![OutgoingResponse::text(msg::NO_SUCH_OPTION)]);
        };
        let Some(org) = candidate.organization() else {
            return (state, vec![OutgoingResponse::text(msg::NO_SUCH_OPTION)]);
        };

        match self.search.members(&org).await {
            Ok(members) if !members.is_empty() => {
                let reply = choose(
                    FunnelStep::Person,
                    members.iter().map(|u| u.selection_label()),
                );
                (state.with(Phase::AwaitingPersonSelection, candidate), vec![reply])
            }
            Ok(_) => (state, vec![OutgoingResponse::text(msg::NO_SUCH_OPTION)]),
            Err(e) => {
                warn!(error = %e, "Member lookup failed");
                (state, vec![OutgoingResponse::text(msg::SERVER_ERROR)])
            }
        }
    }

    async fn on_person(
        &self,
        identity: &ChannelIdentity,
        state: ConversationState,
        text: &str,
    ) -> Transition {
        let Some(target_id) = parse_selection(text) else {
            return (state, vec![OutgoingResponse::text(msg::INPUT_ERROR)]);
        };
        let Some(chosen) = state.funnel.with_target(target_id) else {
            return (state, vec![OutgoingResponse::text(msg::SERVER_ERROR)]);
        };
        match self.search.subscribe(identity, target_id).await {
            Ok(subscription_id) => {
                info!(
                    user_id = identity.user_id,
                    target_id,
                    subscription_id,
                    funnel = ?chosen,
                    "Subscribed"
                );
                (
                    state.with(Phase::AwaitingMenuChoice, FunnelSelection::default()),
                    vec![OutgoingResponse::text(msg::SUBSCRIBED), menu()],
                )
            }
            Err(e) if e.is_not_found() => {
                (state, vec![OutgoingResponse::text(msg::NO_SUCH_OPTION)])
            }
            Err(e) => {
                error!(user_id = identity.user_id, target_id, error = %e, "Subscribe failed");
                (state, vec![OutgoingResponse::text(msg::SERVER_ERROR)])
            }
        }
    }
}

fn menu() -> OutgoingResponse {
    OutgoingResponse::text(msg::MENU).with_keyboard(msg::MENU_OPTIONS)
}

fn choose<I, S>(step: FunnelStep, options: I) -> OutgoingResponse
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    OutgoingResponse::text(msg::prompt_for(step)).with_keyboard(options)
}
