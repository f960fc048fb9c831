use uuid::Uuid;

use crate::Error;

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewSession {
    /// Either the user name or the email address
    pub login: String,
    pub password: String,
    pub device: String,
}

impl NewSession {
    pub fn new(login: String, password: String, device: String) -> NewSession {
        NewSession {
            login,
            password,
            device,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.login)?;
        crate::validate_string(&self.password)?;
        crate::validate_string(&self.device)?;
        Ok(())
    }

    pub fn is_email_login(&self) -> bool {
        self.login.contains('@')
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthToken(pub Uuid);
