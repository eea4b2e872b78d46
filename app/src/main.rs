mod logging;

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use dbadmin_adapters::memory::{MemoryBackend, MemoryDatabase};
use dbadmin_adapters::mysql::MysqlConnectionBackend;
use dbadmin_core::audit_trail::{FileAuditTrail, AUDIT_FILE_NAME};
use dbadmin_core::connection_manager::{ConnectionBackend, ConnectionManager};
use dbadmin_core::profiles::{
    config_dir, ConnectionProfile, FileProfilesStore, ProfilesError, CONFIG_DIR_ENV,
    PROFILES_FILE_NAME,
};
use dbadmin_core::session::{AdminSession, TableBackend};
use dbadmin_tui::TuiError;
use tokio::runtime::Runtime;

#[derive(Debug, Parser)]
#[command(
    name = "dbadmin",
    version,
    about = "Browse and edit the tables of a MySQL database from the terminal"
)]
struct Cli {
    /// Profile name from profiles.toml. Defaults to the first profile.
    #[arg(long, env = "DBADMIN_PROFILE")]
    profile: Option<String>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    database: Option<String>,
    /// Refuse INSERT, UPDATE and DELETE.
    #[arg(long)]
    read_only: bool,
    #[arg(long, env = CONFIG_DIR_ENV)]
    config_dir: Option<PathBuf>,
    /// Use a built-in sample database instead of MySQL.
    #[arg(long)]
    demo: bool,
}

impl Cli {
    fn resolve_profile(&self, store: &FileProfilesStore) -> Result<ConnectionProfile, ProfilesError> {
        let mut profile = store.select(self.profile.as_deref())?;
        if let Some(host) = &self.host {
            profile.host.clone_from(host);
        }
        if let Some(port) = self.port {
            profile.port = port;
        }
        if let Some(user) = &self.user {
            profile.user.clone_from(user);
        }
        if let Some(database) = &self.database {
            profile.database = Some(database.clone());
        }
        profile.read_only |= self.read_only;
        Ok(profile)
    }
}

fn run_app(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let config_dir = match &cli.config_dir {
        Some(dir) => dir.clone(),
        None => config_dir()?,
    };

    let _log_guard = match logging::init(&config_dir.join("logs")) {
        Ok(guard) => Some(guard),
        Err(error) => {
            eprintln!("dbadmin: logging disabled: {error}");
            None
        }
    };

    let store = FileProfilesStore::load_from_path(config_dir.join(PROFILES_FILE_NAME))?;
    let profile = cli.resolve_profile(&store)?;
    let audit = FileAuditTrail::from_path(config_dir.join(AUDIT_FILE_NAME));
    tracing::info!(
        profile = %profile.name,
        host = %profile.host,
        demo = cli.demo,
        "starting"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    if cli.demo {
        let backend = MemoryBackend::new(MemoryDatabase::movie_theatre());
        run_session(&runtime, backend, profile, audit, dbadmin_tui::run)
    } else {
        run_session(&runtime, MysqlConnectionBackend, profile, audit, dbadmin_tui::run)
    }
}

fn run_session<B, F>(
    runtime: &Runtime,
    backend: B,
    profile: ConnectionProfile,
    audit: FileAuditTrail,
    run_tui: F,
) -> Result<(), Box<dyn Error>>
where
    B: ConnectionBackend,
    B::Connection: TableBackend,
    F: FnOnce(&Runtime, AdminSession<B>) -> Result<AdminSession<B>, TuiError>,
{
    let mut manager = ConnectionManager::new(backend);
    if let Err(error) = runtime.block_on(manager.connect(profile)) {
        tracing::error!(%error, "startup connection failed");
        return Err(error.into());
    }

    let session = AdminSession::new(manager).with_audit_trail(audit);
    let mut session = run_tui(runtime, session)?;
    runtime.block_on(session.shutdown())?;
    tracing::info!("disconnected");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run_app(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("dbadmin: {error}");
            ExitCode::FAILURE
        }
    }
}
