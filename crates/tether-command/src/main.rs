use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tether_client::{Invoker, InvokerConfig};
use tether_core::registry::parse_peers;
use tether_core::time::now;
use tether_core::{Action, InternalKey, PeerRegistry, SessionStore};
use tether_db::SqliteSessionStore;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Tether Administrative CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, env = "DATABASE_URL", default_value = "tether.db")]
    db: String,

    /// Peers as `name=url,name=url`
    #[arg(long, env = "TETHER_PEERS", default_value = "")]
    peers: String,

    #[arg(long, env = "TETHER_INTERNAL_SECRET")]
    secret: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Session management
    Session {
        #[command(subcommand)]
        sub: SessionCommands,
    },
    /// Call an operation on a peer and print the envelope
    Call {
        peer: String,
        /// create, read, update or delete
        action: Action,
        path: String,
        /// JSON payload
        #[arg(long)]
        data: Option<String>,
        /// Session token sent as Authorization
        #[arg(long)]
        token: Option<String>,
        /// Sign the payload with the internal key instead of a session
        #[arg(long)]
        internal: bool,
    },
    /// Print a fresh internal key
    Key,
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Open a session for a principal document
    Create {
        #[arg(long)]
        principal: String,
        /// Lifetime in seconds
        #[arg(long, env = "TETHER_SESSION_TTL", default_value_t = 3600)]
        ttl: u64,
    },
    /// Print a session
    Show { token: String },
    /// Push a session's expiry out by the TTL
    Extend {
        token: String,
        #[arg(long, env = "TETHER_SESSION_TTL", default_value_t = 3600)]
        ttl: u64,
    },
    /// Remove a session
    Destroy { token: String },
}

fn internal_key(secret: Option<String>) -> Result<InternalKey, Box<dyn std::error::Error>> {
    secret
        .map(InternalKey::new)
        .ok_or_else(|| "TETHER_INTERNAL_SECRET is not set".into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Session { sub } => match sub {
            SessionCommands::Create { principal, ttl } => {
                let principal: Map<String, Value> = serde_json::from_str(&principal)?;
                let store = SqliteSessionStore::new(&cli.db)?.with_ttl(Duration::from_secs(ttl));
                let session = store.create(principal)?;
                println!("Session created: {}", session.token);
                println!("Expires at:      {}", session.expires_at);
            }
            SessionCommands::Show { token } => {
                let store = SqliteSessionStore::new(&cli.db)?;
                match store.resolve(&token)? {
                    Some(session) => {
                        println!("Token:      {}", session.token);
                        println!("Expires in: {}s", session.expires_at.saturating_sub(now()));
                        println!("{}", serde_json::to_string_pretty(&session.principal)?);
                    }
                    None => return Err(format!("No live session for token: {}", token).into()),
                }
            }
            SessionCommands::Extend { token, ttl } => {
                let store = SqliteSessionStore::new(&cli.db)?.with_ttl(Duration::from_secs(ttl));
                let mut session = store
                    .resolve(&token)?
                    .ok_or_else(|| format!("No live session for token: {}", token))?;
                store.extend(&mut session)?;
                println!("Session extended until: {}", session.expires_at);
            }
            SessionCommands::Destroy { token } => {
                let store = SqliteSessionStore::new(&cli.db)?;
                store.destroy(&token)?;
                println!("Session destroyed: {}", token);
            }
        },
        Commands::Call { peer, action, path, data, token, internal } => {
            let registry = Arc::new(PeerRegistry::new(parse_peers(&cli.peers)?));
            let payload = data.map(|d| serde_json::from_str::<Value>(&d)).transpose()?;

            let envelope = if internal {
                let config = InvokerConfig {
                    internal_key: Some(internal_key(cli.secret)?),
                    ..InvokerConfig::default()
                };
                let invoker = Invoker::with_config(registry, config)?;
                invoker
                    .call_internal(&peer, action, &path, payload.unwrap_or(Value::Null))
                    .await?
            } else {
                let invoker = Invoker::new(registry)?;
                invoker
                    .call(&peer, action, &path, payload.as_ref(), token.as_deref())
                    .await?
            };

            let wire: Value = serde_json::from_slice(&envelope.to_wire()?)?;
            println!("{}", serde_json::to_string_pretty(&wire)?);
        }
        Commands::Key => {
            println!("{}", internal_key(cli.secret)?.generate());
        }
    }

    Ok(())
}
