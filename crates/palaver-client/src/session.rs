//! Signed-in user identity.

use serde::{Deserialize, Serialize};

use palaver_net::SignInResponse;
use palaver_shared::types::UserId;

/// The authenticated session, held in memory for the process lifetime.
/// The bearer token itself also lives inside the `ApiClient`, which attaches
/// it to every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub display_name: String,
}

impl From<&SignInResponse> for Session {
    fn from(resp: &SignInResponse) -> Self {
        Self {
            user_id: UserId(resp.user_id.clone()),
            display_name: resp.display_name.clone(),
        }
    }
}
