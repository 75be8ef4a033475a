use serde::{Deserialize, Serialize};

use crate::domain::voucher::PrincipalId;

/// Directory entry used to address employee-facing notifications.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: PrincipalId,
    pub email: String,
    pub full_name: Option<String>,
}

impl Profile {
    /// Name shown in notification bodies, falling back to the e-mail address.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.email)
    }
}
