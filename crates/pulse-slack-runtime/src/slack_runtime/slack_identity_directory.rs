//! `users.info`-backed identity directory.

use async_trait::async_trait;
use pulse_access::{IdentityDirectory, LookupError, Profile};

use super::slack_api_client::{SlackApiClient, SlackUser};

/// Resolves Slack user ids to profiles through the Web API. Requires the
/// `users:read` and `users:read.email` scopes on the bot token.
#[derive(Clone)]
pub(super) struct SlackIdentityDirectory {
    client: SlackApiClient,
}

impl SlackIdentityDirectory {
    pub(super) fn new(client: SlackApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityDirectory for SlackIdentityDirectory {
    async fn get_profile(&self, id: &str) -> Result<Profile, LookupError> {
        let response = self
            .client
            .users_info(id)
            .await
            .map_err(|error| LookupError::Unreachable(format!("{error:#}")))?;
        if !response.ok {
            let error = response.error.unwrap_or_else(|| "unknown error".to_string());
            return Err(match error.as_str() {
                "user_not_found" | "users_not_found" => LookupError::NotFound(id.to_string()),
                _ => LookupError::Unreachable(format!("slack users.info failed: {error}")),
            });
        }
        let user = response
            .body
            .user
            .ok_or_else(|| LookupError::Unreachable("slack users.info missing user".to_string()))?;
        Ok(profile_from_slack_user(user))
    }
}

fn profile_from_slack_user(user: SlackUser) -> Profile {
    let display_name = [
        user.profile.display_name,
        user.profile.real_name,
        user.real_name,
        user.name,
    ]
    .into_iter()
    .flatten()
    .map(|name| name.trim().to_string())
    .find(|name| !name.is_empty())
    .unwrap_or(user.id);
    Profile {
        display_name,
        email: user.profile.email,
    }
}
