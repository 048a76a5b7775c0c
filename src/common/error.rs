use thiserror::Error;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
// As variantes de domínio cobrem a taxonomia do painel: falhas remotas são
// logadas e re-levantadas; falhas de autorização derrubam a sessão; a
// ausência de configuração de push nunca chega aqui (vira warning e no-op).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    Validacao(#[from] validator::ValidationErrors),

    #[error("E-mail já cadastrado")]
    EmailJaCadastrado,

    #[error("E-mail ou senha inválidos")]
    CredenciaisInvalidas,

    #[error("Perfil de usuário não encontrado para a identidade autenticada")]
    PerfilNaoEncontrado,

    #[error("Acesso negado. Tipo de usuário: \"{0}\". Apenas administradores podem acessar este painel")]
    AcessoNegado(String),

    #[error("Registro não encontrado")]
    NaoEncontrado,

    #[error("Transição de status inválida: {de} -> {para}")]
    TransicaoInvalida { de: String, para: String },

    #[error("Falha no envio da notificação push: {0}")]
    EnvioPush(String),

    #[error("Erro de banco de dados")]
    BancoDeDados(#[from] sqlx::Error),

    #[error("Erro de Bcrypt: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("Erro de HTTP: {0}")]
    Http(#[from] reqwest::Error),

    // Variante genérica para qualquer outro erro inesperado.
    #[error("Erro interno")]
    Interno(#[from] anyhow::Error),
}
