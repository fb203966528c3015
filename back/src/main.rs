mod auth;
mod error;
mod pages;
mod service;
mod v1;

use std::{
    collections::HashMap,
    env, fs, io,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::{sync::Mutex, time};
use uuid::Uuid;

use crate::{
    auth::{GoogleIdentity, IdentityProvider, Session},
    service::TodoRecord,
};

const FLUSH_INTERVAL: time::Duration = time::Duration::from_secs(300);

#[derive(Parser, Debug)]
#[command(name = "todoer", about = "Personal to-do list served over HTTP")]
struct Options {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:7890")]
    addr: SocketAddr,

    /// Path of the snapshot file holding the item table.
    #[arg(long, default_value = "data.ron")]
    data: PathBuf,

    /// TLS certificate in PEM format. Plain HTTP when omitted.
    #[arg(long)]
    cert: Option<PathBuf>,

    /// TLS private key in PEM format.
    #[arg(long)]
    key: Option<PathBuf>,

    /// OAuth redirect URL registered with the identity provider.
    #[arg(long, default_value = "http://localhost:7890/auth/callback")]
    redirect_url: String,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let options = Options::parse();

    let client_id = env::var("GOOGLE_OAUTH_CLIENT_ID")
        .map_err(|_| eyre::eyre!("GOOGLE_OAUTH_CLIENT_ID is not set"))?;
    let client_secret = env::var("GOOGLE_OAUTH_CLIENT_SECRET")
        .map_err(|_| eyre::eyre!("GOOGLE_OAUTH_CLIENT_SECRET is not set"))?;

    let provider = GoogleIdentity::new(client_id, client_secret, options.redirect_url);
    let secure_cookies = options.cert.is_some();
    let state = Arc::new(AppState::load(
        &options.data,
        Arc::new(provider),
        secure_cookies,
    )?);

    tokio::spawn({
        let state = state.clone();
        async move {
            loop {
                time::sleep(FLUSH_INTERVAL).await;
                if !state.dirty() {
                    continue;
                }
                if let Err(err) = state.store().await {
                    tracing::error!("failed to store data: {:?}", err);
                }
            }
        }
    });

    let app = app(state);

    match (options.cert, options.key) {
        (Some(cert), Some(key)) => {
            let config = RustlsConfig::from_pem_file(cert, key).await?;
            axum_server::bind_rustls(options.addr, config)
                .serve(app.into_make_service())
                .await?;
        }
        (None, None) => {
            axum_server::bind(options.addr)
                .serve(app.into_make_service())
                .await?;
        }
        _ => eyre::bail!("--cert and --key must be given together"),
    }

    Ok(())
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(pages::router())
        .merge(auth::router())
        .nest("/api/v1", v1::router())
        .with_state(state)
}

pub struct AppState {
    /// Bumped on every item mutation; drives the snapshot dirty check.
    pub generation: AtomicU64,
    flushed: AtomicU64,
    data_path: PathBuf,
    pub todos: Mutex<HashMap<Uuid, TodoRecord>>,
    pub sessions: Mutex<HashMap<String, Session>>,
    pub auth_states: Mutex<HashMap<String, DateTime<Utc>>>,
    pub provider: Arc<dyn IdentityProvider>,
    pub secure_cookies: bool,
}

impl AppState {
    pub fn load(
        path: &Path,
        provider: Arc<dyn IdentityProvider>,
        secure_cookies: bool,
    ) -> eyre::Result<Self> {
        let todos = match fs::File::open(path) {
            Ok(file) => {
                let data: DataOwned = ron::de::from_reader(file)?;
                match data {
                    DataOwned::V1 { todos } => todos,
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => eyre::bail!(err),
        };

        Ok(Self {
            generation: AtomicU64::new(0),
            flushed: AtomicU64::new(0),
            data_path: path.to_owned(),
            todos: Mutex::new(todos),
            sessions: Mutex::new(HashMap::new()),
            auth_states: Mutex::new(HashMap::new()),
            provider,
            secure_cookies,
        })
    }

    pub fn increment_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed)
    }

    pub fn dirty(&self) -> bool {
        self.generation.load(Ordering::Relaxed) != self.flushed.load(Ordering::Relaxed)
    }

    pub async fn store(&self) -> eyre::Result<()> {
        let generation = self.generation.load(Ordering::Relaxed);
        let todos = self.todos.lock().await;
        let data = DataBorrowd::V1 { todos: &todos };

        let file = fs::File::create(&self.data_path)?;
        let mut ser = ron::Serializer::new(file, Some(Default::default()))?;
        data.serialize(&mut ser)?;

        drop(todos);
        self.flushed.store(generation, Ordering::Relaxed);

        Ok(())
    }
}

#[derive(Serialize)]
enum DataBorrowd<'a> {
    V1 {
        todos: &'a HashMap<Uuid, TodoRecord>,
    },
}

#[derive(Deserialize)]
enum DataOwned {
    V1 {
        todos: HashMap<Uuid, TodoRecord>,
    },
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    test_state_with(Arc::new(auth::testing::FakeIdentity::default()))
}

#[cfg(test)]
pub(crate) fn test_state_with(provider: Arc<dyn IdentityProvider>) -> AppState {
    let path = env::temp_dir().join(format!("todoer-test-{}.ron", Uuid::new_v4()));
    AppState::load(&path, provider, false).expect("fresh state")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_round_trips_records() {
        let state = test_state();
        let todo = state.add_todo("user-a", "- [ ] water plants").await.unwrap();
        state.set_done("user-a", todo.id, true).await.unwrap();
        state.add_todo("user-b", "read").await.unwrap();
        state.store().await.unwrap();

        let provider = state.provider.clone();
        let reloaded = AppState::load(&state.data_path, provider, false).unwrap();
        let todos = reloaded.list_todos("user-a").await;
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].id, todo.id);
        assert_eq!(todos[0].content, "- [ ] water plants");
        assert_eq!(todos[0].created, todo.created);
        assert!(todos[0].is_done());
        assert_eq!(reloaded.list_todos("user-b").await.len(), 1);

        fs::remove_file(&state.data_path).unwrap();
    }

    #[tokio::test]
    async fn flush_tracking_follows_mutations() {
        let state = test_state();
        assert!(!state.dirty());

        state.add_todo("user-a", "pack").await.unwrap();
        assert!(state.dirty());

        state.store().await.unwrap();
        assert!(!state.dirty());

        fs::remove_file(&state.data_path).unwrap();
    }
}
