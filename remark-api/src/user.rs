use crate::{Error, STUB_UUID};

use uuid::Uuid;

pub const MAX_NAME_LEN: usize = 64;
pub const MAX_EMAIL_LEN: usize = 254;

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn stub() -> UserId {
        UserId(STUB_UUID)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

/// What a valid session token resolves to
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Identity {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl NewUser {
    pub fn new(name: String, email: String, password: String) -> NewUser {
        NewUser {
            name,
            email,
            password,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.name)?;
        crate::validate_string(&self.email)?;
        crate::validate_string(&self.password)?;
        validate_name(&self.name)?;
        validate_email(&self.email)?;
        let pass_len = self.password.chars().count();
        if !(8..=256).contains(&pass_len) {
            return Err(Error::InvalidPassword);
        }
        Ok(())
    }

    /// Emails are unique regardless of case
    pub fn normalized_email(&self) -> String {
        self.email.to_lowercase()
    }
}

fn validate_name(name: &str) -> Result<(), Error> {
    let valid = !name.is_empty()
        && name.chars().count() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    match valid {
        true => Ok(()),
        false => Err(Error::InvalidName(String::from(name))),
    }
}

fn validate_email(email: &str) -> Result<(), Error> {
    let invalid = || Error::InvalidEmail(String::from(email));
    if email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(invalid()),
    }
}
