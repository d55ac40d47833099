use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::task::JoinHandle;

use berth::auth::{ApiKeyGenerator, create_user};
use berth::blob::UrlSigner;
use berth::config::ServerConfig;
use berth::server::{AppState, create_router};
use berth::store::{SqliteStore, Store};
use berth::types::Role;

/// A berth server running inside the test process on an ephemeral port.
pub struct TestServer {
    pub temp_dir: TempDir,
    pub base_url: String,
    pub client: reqwest::Client,
    /// Member who owns the `alice` namespace.
    pub alice_key: String,
    /// Member with no access to `alice`.
    pub bob_key: String,
    pub admin_key: String,
    server_task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let data_dir = temp_dir.path();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let base_url = format!("http://{addr}");

        let config = ServerConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            public_base_url: Some(base_url.clone()),
            ..ServerConfig::load(data_dir).expect("load config")
        };

        let signing_key = UrlSigner::generate_key();
        UrlSigner::write_key(&config.signing_key_path(), &signing_key).expect("write signing key");

        let store = Arc::new(SqliteStore::new(config.db_path()).expect("open database"));
        store.initialize().expect("initialize database");

        let generator = ApiKeyGenerator::new();
        let (_, alice_key) =
            create_user(store.as_ref(), &generator, "alice", Role::Member).expect("create alice");
        let (_, bob_key) =
            create_user(store.as_ref(), &generator, "bob", Role::Member).expect("create bob");
        let (_, admin_key) =
            create_user(store.as_ref(), &generator, "root", Role::Admin).expect("create root");

        let state = AppState::with_local_blobs(store, &config, signing_key);
        let app = create_router(Arc::new(state));

        let server_task = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("build client");

        Self {
            temp_dir,
            base_url,
            client,
            alice_key,
            bob_key,
            admin_key,
            server_task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}
