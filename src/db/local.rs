use async_trait::async_trait;
use uuid::Uuid;

use crate::backend::{AuthProvider, AuthUser};
use crate::error::BackendError;

/// Auth for the embedded backend: a fixed, configured identity.
#[derive(Debug, Clone)]
pub struct LocalAuth {
    user: Option<AuthUser>,
}

impl LocalAuth {
    pub fn signed_in(user_id: Uuid) -> Self {
        Self {
            user: Some(AuthUser {
                id: user_id,
                email: None,
            }),
        }
    }

    pub fn signed_out() -> Self {
        Self { user: None }
    }
}

#[async_trait]
impl AuthProvider for LocalAuth {
    async fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        Ok(self.user.clone())
    }
}
