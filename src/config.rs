use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::{env, time::Duration};

use crate::{
    db::{PgClienteRepo, PgColetaRepo, PgMaterialRepo, PgSolicitacaoRepo},
    services::auth::PgAuth,
    services::notificacoes::{Notificador, OneSignalGateway, PushGateway, SdkPush},
    stores::{ClientesStore, ColetasStore, MateriaisStore, SessaoStore, SolicitacoesStore},
};

/// Configuração lida do ambiente. As chaves do OneSignal são opcionais: sem
/// elas o painel sobe com as notificações push desabilitadas.
pub struct Config {
    pub database_url: String,
    pub onesignal: Option<(String, String)>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL deve ser definida"))?;
        let onesignal = match (
            env::var("ONESIGNAL_APP_ID"),
            env::var("ONESIGNAL_REST_API_KEY"),
        ) {
            (Ok(app_id), Ok(chave)) => Some((app_id, chave)),
            _ => None,
        };

        Ok(Self {
            database_url,
            onesignal,
        })
    }
}

pub struct AppState {
    pub db_pool: PgPool,
    pub sessao: Arc<SessaoStore>,
    pub clientes: Arc<ClientesStore>,
    pub materiais: Arc<MateriaisStore>,
    pub coletas: Arc<ColetasStore>,
    pub solicitacoes: Arc<SolicitacoesStore>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // --- Monta o gráfico de dependências ---
        let clientes_repo = Arc::new(PgClienteRepo::new(db_pool.clone()));
        let materiais_repo = Arc::new(PgMaterialRepo::new(db_pool.clone()));
        let coletas_repo = Arc::new(PgColetaRepo::new(db_pool.clone()));
        let solicitacoes_repo = Arc::new(PgSolicitacaoRepo::new(db_pool.clone()));
        let auth = Arc::new(PgAuth::new(db_pool.clone()));

        let gateway: Option<Arc<dyn PushGateway>> = config
            .onesignal
            .map(|(app_id, chave)| {
                Arc::new(OneSignalGateway::new(app_id, chave)) as Arc<dyn PushGateway>
            });
        let notificador = Arc::new(Notificador::new(gateway, clientes_repo.clone()));
        let push = Arc::new(SdkPush::new());

        let sessao = Arc::new(SessaoStore::new(
            auth.clone(),
            clientes_repo.clone(),
            push,
        ));
        let clientes = Arc::new(ClientesStore::new(auth, clientes_repo.clone()));
        let materiais = Arc::new(MateriaisStore::new(materiais_repo));
        let solicitacoes = Arc::new(SolicitacoesStore::new(
            solicitacoes_repo,
            clientes_repo,
            notificador.clone(),
        ));
        let coletas = Arc::new(ColetasStore::new(
            coletas_repo,
            solicitacoes.clone(),
            notificador,
        ));

        Ok(Self {
            db_pool,
            sessao,
            clientes,
            materiais,
            coletas,
            solicitacoes,
        })
    }
}
