use anyhow::Context;
use remark_api::{AuthToken, Identity, NewSession, NewUser, UserId, Uuid};

use crate::{db::Db, Error};

pub async fn register(db: &dyn Db, new: NewUser, bcrypt_cost: u32) -> Result<Identity, Error> {
    new.validate()?;
    let email = new.normalized_email();
    let password = new.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt_cost))
        .await
        .context("joining password hashing task")?
        .context("hashing password")?;

    let id = UserId(Uuid::new_v4());
    db.create_user(id, &new.name, &email, &password_hash).await?;
    tracing::info!(?id, name = %new.name, "registered new user");
    Ok(Identity {
        id,
        name: new.name,
        email,
    })
}

pub async fn login(db: &dyn Db, session: NewSession) -> Result<AuthToken, Error> {
    session.validate()?;
    let by_email = session.is_email_login();
    let login = match by_email {
        true => session.login.to_lowercase(),
        false => session.login.clone(),
    };
    let (user, password_hash) = db
        .fetch_credentials(&login, by_email)
        .await?
        .ok_or_else(Error::unauthenticated)?;

    let password = session.password;
    let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &password_hash))
        .await
        .context("joining password verification task")?
        .with_context(|| format!("checking password hash of {user:?}"))?;
    if !matches {
        tracing::info!(?user, "refused login with wrong password");
        return Err(Error::unauthenticated());
    }

    let token = db.create_session(user, &session.device).await?;
    tracing::debug!(?user, device = %session.device, "opened new session");
    Ok(token)
}

pub async fn logout(db: &dyn Db, token: AuthToken) -> Result<(), Error> {
    match db.logout(token).await? {
        true => Ok(()),
        false => Err(Error::unauthenticated()),
    }
}
