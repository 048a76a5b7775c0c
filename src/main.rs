use painel_coletas::config::{AppState, Config};

#[tokio::main]
async fn main() {
    // Inicializa o logger.
    tracing_subscriber::fmt().with_target(false).compact().init();

    // .expect() é bom aqui: se a configuração falhar, a aplicação não deve iniciar.
    let config = Config::from_env().expect("Falha ao carregar a configuração do ambiente.");
    let app_state = AppState::new(config)
        .await
        .expect("Falha ao inicializar o estado da aplicação.");

    // Roda as migrações do SQLx na inicialização
    sqlx::migrate!()
        .run(&app_state.db_pool)
        .await
        .expect("Falha ao rodar as migrações do banco de dados.");

    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    // Resolve a sessão e garante o catálogo padrão antes de atender qualquer
    // tela.
    app_state.sessao.inicializar().await;
    app_state
        .materiais
        .inicializar()
        .await
        .expect("Falha ao semear o catálogo de materiais.");

    // Consulta ao vivo das solicitações pendentes; o handle precisa viver até
    // o desligamento para a assinatura não cair.
    let _assinatura = app_state
        .solicitacoes
        .assinar_pendentes(|pendentes| {
            tracing::info!("Solicitações pendentes: {}", pendentes.len());
        })
        .await
        .expect("Falha ao assinar as solicitações pendentes.");

    tracing::info!("🚀 Painel de coletas pronto!");

    tokio::signal::ctrl_c()
        .await
        .expect("Falha ao escutar o sinal de desligamento.");
    tracing::info!("Encerrando o painel de coletas.");
}
