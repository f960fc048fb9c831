use std::{ops::Deref, sync::Arc};

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query,
    },
    http::{self, request},
    Json,
};
use remark_api::{AuthToken, Identity, Uuid};

use crate::{db::Db, Error, PageFeeds};

#[derive(Clone, axum::extract::FromRef)]
pub struct AppState {
    pub db: DbHandle,
    pub feeds: PageFeeds,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(db: Arc<dyn Db>, auth: AuthConfig) -> AppState {
        AppState {
            db: DbHandle(db),
            feeds: PageFeeds::new(),
            auth,
        }
    }
}

#[derive(Clone)]
pub struct DbHandle(Arc<dyn Db>);

impl Deref for DbHandle {
    type Target = dyn Db;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AuthConfig {
    pub bcrypt_cost: u32,
}

/// Bearer token, not yet checked against the session store
pub struct PreAuth(pub AuthToken);

#[async_trait]
impl<S: Sync> FromRequestParts<S> for PreAuth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, _state: &S) -> Result<PreAuth, Error> {
        let auth = req
            .headers
            .get(http::header::AUTHORIZATION)
            .ok_or_else(Error::unauthenticated)?;
        let auth = auth.to_str().map_err(|_| Error::unauthenticated())?;
        let mut auth = auth.split(' ');
        if !auth
            .next()
            .ok_or_else(Error::unauthenticated)?
            .eq_ignore_ascii_case("bearer")
        {
            return Err(Error::unauthenticated());
        }
        let token = auth.next().ok_or_else(Error::unauthenticated)?;
        if auth.next().is_some() {
            return Err(Error::unauthenticated());
        }
        let token = Uuid::try_from(token).map_err(|_| Error::unauthenticated())?;
        Ok(PreAuth(AuthToken(token)))
    }
}

pub struct Auth(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for Auth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &AppState) -> Result<Auth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        Ok(Auth(state.db.recover_session(token).await?))
    }
}

/// `Json` whose rejections are reported as `InvalidRequest` API errors
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S, B> FromRequest<S, B> for ApiJson<T>
where
    Json<T>: FromRequest<S, B, Rejection = JsonRejection>,
    S: Send + Sync,
    B: Send + 'static,
{
    type Rejection = Error;

    async fn from_request(req: http::Request<B>, state: &S) -> Result<ApiJson<T>, Error> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(data)) => Ok(ApiJson(data)),
            Err(rejection) => Err(Error::invalid_request(rejection.body_text())),
        }
    }
}

pub struct ApiPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &S) -> Result<ApiPath<T>, Error> {
        match Path::<T>::from_request_parts(req, state).await {
            Ok(Path(data)) => Ok(ApiPath(data)),
            Err(rejection) => Err(Error::invalid_request(rejection.body_text())),
        }
    }
}

pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &S) -> Result<ApiQuery<T>, Error> {
        match Query::<T>::from_request_parts(req, state).await {
            Ok(Query(data)) => Ok(ApiQuery(data)),
            Err(rejection) => Err(Error::invalid_request(rejection.body_text())),
        }
    }
}
