use std::fs::File;
use std::net::SocketAddr;
use std::str::FromStr;
use std::{env, fmt};

use axum::http::HeaderValue;
use dotenv::dotenv;
use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, TermLogger, TerminalMode, WriteLogger};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin};

pub mod db;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub enum Error {
    _MissingEnv(#[from] env::VarError),
    _ParseInt(#[from] std::num::ParseIntError),
    _MongoDB(#[from] mongodb::error::Error),
}

#[derive(Clone)]
pub enum Env {
    Local,
    Dev,
    Stage,
    Production,
}

impl Env {
    pub fn addr(&self) -> SocketAddr {
        match self {
            Env::Local => SocketAddr::from(([127, 0, 0, 1], 8000)),
            Env::Dev | Env::Stage | Env::Production => SocketAddr::from(([0, 0, 0, 0], 8000)),
        }
    }

    pub fn allow_origin(&self) -> AllowOrigin {
        match self {
            Env::Local | Env::Dev => AllowOrigin::any(),
            Env::Stage | Env::Production => {
                let origins = env::var("ALLOW_ORIGIN")
                    .expect("ALLOW_ORIGIN must be set")
                    .split(',')
                    .map(HeaderValue::from_str)
                    .map(|r| r.expect("invalid ALLOW_ORIGIN value"))
                    .collect::<Vec<HeaderValue>>();
                AllowOrigin::list(origins)
            }
        }
    }

    pub fn allow_methods(&self) -> AllowMethods {
        AllowMethods::any()
    }

    pub fn allow_headers(&self) -> AllowHeaders {
        AllowHeaders::any()
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env = match self {
            Env::Local => "local",
            Env::Dev => "dev",
            Env::Stage => "stg",
            Env::Production => "prod",
        };
        write!(f, "{env}")
    }
}

#[derive(Clone)]
pub struct Config {
    pub env: Env,
    pub mongo: db::Config,
    pub jwt_secret: String,
}

impl Default for Config {
    fn default() -> Self {
        dotenv().ok();

        let rust_log = env::var("RUST_LOG").unwrap_or("info".into());
        let level = LevelFilter::from_str(&rust_log).unwrap_or(LevelFilter::Info);
        let log_file = env::var("SERVICE_NAME")
            .map(|pkg| format!("{pkg}.log"))
            .unwrap_or("marketplace_chat.log".into());

        CombinedLogger::init(vec![
            TermLogger::new(
                level,
                simplelog::Config::default(),
                TerminalMode::Mixed,
                ColorChoice::Auto,
            ),
            WriteLogger::new(
                level,
                simplelog::Config::default(),
                File::create(log_file).expect("Failed to create log file"),
            ),
        ])
        .expect("Failed to initialize logger");

        let env = env::var("ENV")
            .map(|env| match env.as_str() {
                "local" => Env::Local,
                "dev" => Env::Dev,
                "stg" => Env::Stage,
                "prod" => Env::Production,
                _ => panic!("Invalid environment: {env}"),
            })
            .unwrap_or(Env::Local);

        let jwt_secret = env::var("ACCESS_TOKEN_SECRET").expect("ACCESS_TOKEN_SECRET must be set");

        Self {
            env,
            mongo: db::Config::env().unwrap_or_default(),
            jwt_secret,
        }
    }
}
