//! Account registration and activation.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use tracing::{info, warn};

use crate::auth::token::generate_token;
use crate::error::{AuthError, DatabaseError};
use crate::models::{ChannelIdentity, Organization, Person};
use crate::notify::Notifier;
use crate::store::IdentityStore;

/// Subject line of the activation email.
pub const ACTIVATION_SUBJECT: &str = "Registration";

/// Account operations the conversation engine relies on.
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Activation status of a channel identity.
    ///
    /// An identity that was never registered yields
    /// `AuthError::Database(DatabaseError::NotFound { .. })`.
    async fn is_activated(&self, identity: &ChannelIdentity) -> Result<bool, AuthError>;

    /// Issue a token, mail the activation link and persist the user.
    /// Returns the new user id.
    async fn register_new_user(
        &self,
        person: &Person,
        identity: &ChannelIdentity,
        org: &Organization,
    ) -> Result<i64, AuthError>;
}

/// Store-backed account service that mails activation links.
pub struct AuthService {
    store: Arc<dyn IdentityStore>,
    notifier: Arc<dyn Notifier>,
    public_url: String,
    redirect_url: String,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        notifier: Arc<dyn Notifier>,
        public_url: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            public_url: public_url.into(),
            redirect_url: redirect_url.into(),
        }
    }

    /// Link the user opens to activate `identity`.
    pub fn activation_link(
        &self,
        identity: &ChannelIdentity,
        token: &str,
    ) -> Result<String, AuthError> {
        let base = format!("{}/v1/auth", self.public_url.trim_end_matches('/'));
        let mut url = Url::parse(&base).map_err(|e| AuthError::Link(format!("{base}: {e}")))?;
        url.query_pairs_mut()
            .append_pair("token", token)
            .append_pair("mtype", &identity.channel)
            .append_pair("mid", &identity.user_id.to_string())
            .append_pair("chatid", &identity.chat_id.to_string())
            .append_pair("redirect", &self.redirect_url);
        Ok(url.into())
    }

    /// Consume `token` for `identity`. Unknown, empty and already used tokens
    /// are all `InvalidToken`.
    pub async fn activate_account(
        &self,
        identity: &ChannelIdentity,
        token: &str,
    ) -> Result<(), AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        if self.store.activate(identity, token).await? {
            info!(
                channel = %identity.channel,
                user_id = identity.user_id,
                chat_id = identity.chat_id,
                "Account activated"
            );
            Ok(())
        } else {
            warn!(
                channel = %identity.channel,
                user_id = identity.user_id,
                "Activation rejected"
            );
            Err(AuthError::InvalidToken)
        }
    }
}

#[async_trait]
impl AccountService for AuthService {
    async fn is_activated(&self, identity: &ChannelIdentity) -> Result<bool, AuthError> {
        Ok(self.store.is_activated(identity).await?)
    }

    async fn register_new_user(
        &self,
        person: &Person,
        identity: &ChannelIdentity,
        org: &Organization,
    ) -> Result<i64, AuthError> {
        match self.store.user_by_email(&person.email).await {
            Ok(_) => {
                return Err(AuthError::UserExists {
                    email: person.email.clone(),
                });
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let token = generate_token()?;
        let link = self.activation_link(identity, &token)?;
        let body = format!(
            "Hello, {}!\n\nFollow this link to activate your account:\n{link}\n",
            person.first_name
        );
        self.notifier
            .send_email(&person.email, ACTIVATION_SUBJECT, &body)
            .await?;

        let user_id = self
            .store
            .save_all_user_info(person, identity, &token, org)
            .await
            .map_err(|e| match e {
                DatabaseError::Constraint(_) => AuthError::UserExists {
                    email: person.email.clone(),
                },
                other => AuthError::Database(other),
            })?;

        info!(user_id, email = %person.email, channel = %identity.channel, "User registered");
        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tokio::sync::Mutex;

    use super::*;
    use crate::error::NotifyError;
    use crate::store::LibSqlBackend;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Send("smtp down".into()));
            }
            self.sent
                .lock()
                .await
                .push((to.into(), subject.into(), body.into()));
            Ok(())
        }
    }

    fn person() -> Person {
        Person {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            patronymic: String::new(),
            birth_date: NaiveDate::from_ymd_opt(1990, 3, 14).unwrap(),
            email: "jane@example.com".into(),
        }
    }

    fn org() -> Organization {
        Organization {
            id: 0,
            name: "Gazprom Media".into(),
            city: "Moscow".into(),
            office: "Main Office".into(),
            department: "Go Dev".into(),
        }
    }

    fn identity() -> ChannelIdentity {
        ChannelIdentity::new("telegram", 11, 22)
    }

    async fn service(notifier: Arc<RecordingNotifier>) -> (AuthService, Arc<LibSqlBackend>) {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let svc = AuthService::new(
            store.clone(),
            notifier,
            "http://localhost:2001/",
            "https://t.me/GPMHappyBBot",
        );
        (svc, store)
    }

    fn token_from_body(body: &str) -> String {
        let link = body
            .lines()
            .find(|l| l.starts_with("http"))
            .expect("link line");
        let url = Url::parse(link).unwrap();
        url.query_pairs()
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
            .expect("token param")
    }

    #[tokio::test]
    async fn activation_link_carries_all_params() {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let svc = AuthService::new(
            store,
            Arc::new(RecordingNotifier::default()),
            "http://localhost:2001/",
            "https://t.me/GPMHappyBBot?start=1",
        );
        let link = svc.activation_link(&identity(), "abc").unwrap();
        assert_eq!(
            link,
            "http://localhost:2001/v1/auth?token=abc&mtype=telegram&mid=11&chatid=22\
             &redirect=https%3A%2F%2Ft.me%2FGPMHappyBBot%3Fstart%3D1"
        );
    }

    #[tokio::test]
    async fn register_sends_mail_then_persists() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (svc, store) = service(notifier.clone()).await;

        let user_id = svc.register_new_user(&person(), &identity(), &org()).await.unwrap();

        let sent = notifier.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "jane@example.com");
        assert_eq!(sent[0].1, ACTIVATION_SUBJECT);

        let account = store.channel_account(&identity()).await.unwrap();
        assert_eq!(account.user_id, user_id);
        assert!(!account.is_activated);
        assert_eq!(account.token, token_from_body(&sent[0].2));
        assert!(!svc.is_activated(&identity()).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_email_is_user_exists() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (svc, _store) = service(notifier.clone()).await;
        svc.register_new_user(&person(), &identity(), &org()).await.unwrap();

        let other = ChannelIdentity::new("telegram", 99, 98);
        let err = svc.register_new_user(&person(), &other, &org()).await.unwrap_err();
        assert!(matches!(err, AuthError::UserExists { .. }));
        assert_eq!(notifier.sent.lock().await.len(), 1, "no second mail");
    }

    #[tokio::test]
    async fn mail_failure_persists_nothing() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let (svc, store) = service(notifier).await;

        let err = svc.register_new_user(&person(), &identity(), &org()).await.unwrap_err();
        assert!(matches!(err, AuthError::Notify(_)));
        assert!(store.user_by_email("jane@example.com").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn activation_consumes_token_once() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (svc, _store) = service(notifier.clone()).await;
        svc.register_new_user(&person(), &identity(), &org()).await.unwrap();
        let token = token_from_body(&notifier.sent.lock().await[0].2);

        assert!(matches!(
            svc.activate_account(&identity(), "bogus").await,
            Err(AuthError::InvalidToken)
        ));
        svc.activate_account(&identity(), &token).await.unwrap();
        assert!(svc.is_activated(&identity()).await.unwrap());
        assert!(matches!(
            svc.activate_account(&identity(), &token).await,
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            svc.activate_account(&identity(), "").await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn unknown_identity_reports_not_found() {
        let (svc, _store) = service(Arc::new(RecordingNotifier::default())).await;
        match svc.is_activated(&identity()).await {
            Err(AuthError::Database(e)) => assert!(e.is_not_found()),
            other => panic!("expected not found, got {other:?}"),
        }
    }
}
