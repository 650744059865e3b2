use anyhow::Result;
use axum::extract::FromRef;
use chrono::Duration;
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use url::Url;

use presign::{PostPolicySigner, StorageConfig};

use crate::models::FeedItem;
use crate::request_cache::RequestCache;

#[derive(Debug, Clone)]
pub struct AppState {
    pub pool: DBPool,
    pub http: HttpClient,
    pub signer: PostPolicySigner,
    pub feed_cache: RequestCache<Vec<FeedItem>>,
}

impl AppState {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pool: create_db_pool()?,
            http: reqwest::Client::new(),
            signer: create_signer()?,
            feed_cache: RequestCache::new(Duration::minutes(5)),
        })
    }
}

pub type DBPool = Pool<Postgres>;

impl FromRef<AppState> for DBPool {
    fn from_ref(input: &AppState) -> Self {
        input.pool.clone()
    }
}

pub type HttpClient = reqwest::Client;

impl FromRef<AppState> for HttpClient {
    fn from_ref(input: &AppState) -> Self {
        input.http.clone()
    }
}

impl FromRef<AppState> for PostPolicySigner {
    fn from_ref(input: &AppState) -> Self {
        input.signer.clone()
    }
}

impl FromRef<AppState> for RequestCache<Vec<FeedItem>> {
    fn from_ref(input: &AppState) -> Self {
        input.feed_cache.clone()
    }
}

#[derive(Debug, Deserialize)]
struct DbConfig {
    host: String,
    port: u16,
    user: String,
    pass: String,
    database: String,
}

pub(crate) fn create_db_pool() -> Result<DBPool> {
    let config: DbConfig = envy::prefixed("PG_").from_env()?;

    let mut url = Url::parse("postgres://")?;
    url.set_host(Some(&config.host))?;
    url.set_password(Some(&config.pass))
        .expect("password should be accepted");
    url.set_username(&config.user)
        .expect("username should be accepted");
    url.set_port(Some(config.port))
        .expect("port should be accepted");
    url.set_path(&config.database);

    Ok(PgPoolOptions::new().connect_lazy(url.as_ref())?)
}

fn create_signer() -> Result<PostPolicySigner> {
    let config: StorageConfig = envy::prefixed("S3_").from_env()?;
    Ok(PostPolicySigner::new(config)?)
}
