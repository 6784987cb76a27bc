//! In-memory user store that announces new users on the broker

use crate::broker::publisher::{Envelope, EventPublisher};
use crate::error::ServiceResult;
use crate::observability::metrics::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Queue consumed by the notification service
pub const NOTIFICATION_QUEUE: &str = "notification-service";

/// Event pattern published after a user is stored
pub const USER_CREATED_PATTERN: &str = "user.created";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    /// Never serialized once cleared
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
}

/// Input for [`UserService::create`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

pub struct UserService<P: EventPublisher> {
    publisher: Arc<P>,
    users: Mutex<Vec<User>>,
}

impl<P: EventPublisher> UserService<P> {
    pub fn new(publisher: Arc<P>) -> Self {
        Self {
            publisher,
            users: Mutex::new(Vec::new()),
        }
    }

    pub fn publisher(&self) -> &Arc<P> {
        &self.publisher
    }

    /// Store the user, then publish `user.created` to the notification queue.
    ///
    /// The user stays stored when the publish fails; the error is returned so
    /// the caller can report the broker as unavailable.
    pub async fn create(&self, input: NewUser) -> ServiceResult<User> {
        let user = {
            let mut users = self.users.lock().await;
            let id = users.last().map_or(1, |last| last.id + 1);
            // Passwords are not kept past this point
            let user = User {
                id,
                name: input.name,
                email: input.email,
                password: String::new(),
            };
            users.push(user.clone());
            user
        };

        metrics().user_created();
        info!(user_id = user.id, "User created");

        let envelope = Envelope::new(USER_CREATED_PATTERN, &user);
        if let Err(e) = self.publisher.publish(NOTIFICATION_QUEUE, &envelope).await {
            warn!(user_id = user.id, error = %e, "Failed to announce created user");
            return Err(e.into());
        }

        Ok(user)
    }

    pub async fn list(&self) -> Vec<User> {
        self.users.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::testing::mocks::MockPublisher;
    use serde_json::json;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            name: name.to_string(),
            email: format!("{name}@example.com"),
            password: "secret".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let service = UserService::new(Arc::new(MockPublisher::new()));

        let first = service.create(new_user("ann")).await.unwrap();
        let second = service.create(new_user("bob")).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(service.list().await.len(), 2);
    }

    #[tokio::test]
    async fn test_create_clears_password() {
        let service = UserService::new(Arc::new(MockPublisher::new()));
        let user = service.create(new_user("ann")).await.unwrap();

        assert!(user.password.is_empty());
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
    }

    #[tokio::test]
    async fn test_create_publishes_user_created() {
        let publisher = Arc::new(MockPublisher::new());
        let service = UserService::new(Arc::clone(&publisher));
        service.create(new_user("ann")).await.unwrap();

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, NOTIFICATION_QUEUE);
        assert_eq!(
            published[0].1,
            json!({
                "pattern": "user.created",
                "data": {"id": 1, "name": "ann", "email": "ann@example.com"}
            })
        );
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_user() {
        let service = UserService::new(Arc::new(MockPublisher::with_failure()));

        let result = service.create(new_user("ann")).await;
        assert!(matches!(result, Err(ServiceError::Broker(_))));
        assert_eq!(service.list().await.len(), 1);

        // The next id still follows the stored user
        service.publisher().set_failing(false);
        let user = service.create(new_user("bob")).await.unwrap();
        assert_eq!(user.id, 2);
    }
}
