use std::fmt;

/// The authenticated user on whose behalf uploads and subscriptions run.
///
/// Produced by the auth collaborator and passed explicitly; an empty user id
/// is not an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    user_id: String,
}

impl Identity {
    pub fn from_user_id(user_id: impl Into<String>) -> Option<Self> {
        let user_id = user_id.into().trim().to_string();
        if user_id.is_empty() {
            None
        } else {
            Some(Self { user_id })
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_id)
    }
}
