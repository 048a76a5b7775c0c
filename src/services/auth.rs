//! Seam do provedor de autenticação: entrada por e-mail/senha, provisão de
//! credencial (cadastro), saída, redefinição de senha e o fluxo de eventos de
//! estado de autenticação que a guarda de sessão assina.

use async_trait::async_trait;
use bcrypt::{hash, verify};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{common::error::AppError, models::auth::AuthUser};

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Autentica por e-mail/senha e publica a identidade no fluxo de estado.
    async fn entrar(&self, email: &str, senha: &str) -> Result<AuthUser, AppError>;

    /// Provisão de credencial (cadastro). Não muda a sessão corrente: o
    /// painel cria credenciais de clientes sem trocar o admin logado.
    async fn cadastrar(&self, email: &str, senha: &str) -> Result<AuthUser, AppError>;

    /// Encerra a sessão e publica `None` no fluxo de estado.
    async fn sair(&self) -> Result<(), AppError>;

    /// Dispara o fluxo de redefinição de senha fora de banda.
    async fn redefinir_senha(&self, email: &str) -> Result<(), AppError>;

    /// Fluxo de estado de autenticação. O valor corrente conta como primeiro
    /// evento para quem assina.
    fn estado(&self) -> watch::Receiver<Option<AuthUser>>;
}

async fn hash_senha(senha: &str, custo: u32) -> Result<String, AppError> {
    let senha = senha.to_owned();
    let hash = tokio::task::spawn_blocking(move || hash(&senha, custo))
        .await
        .map_err(|e| anyhow::anyhow!("Falha na task de hashing: {}", e))??;
    Ok(hash)
}

async fn verificar_senha(senha: &str, hash_guardado: &str) -> Result<bool, AppError> {
    let senha = senha.to_owned();
    let hash_guardado = hash_guardado.to_owned();
    let valido = tokio::task::spawn_blocking(move || verify(&senha, &hash_guardado))
        .await
        .map_err(|e| anyhow::anyhow!("Falha na task de verificação de senha: {}", e))??;
    Ok(valido)
}

/// Provedor apoiado no Postgres: credenciais com hash bcrypt na tabela
/// `auth_credenciais`; pedidos de redefinição registrados em
/// `auth_redefinicoes` para um remetente de e-mail externo.
pub struct PgAuth {
    pool: PgPool,
    estado_tx: watch::Sender<Option<AuthUser>>,
}

impl PgAuth {
    pub fn new(pool: PgPool) -> Self {
        let (estado_tx, _) = watch::channel(None);
        Self { pool, estado_tx }
    }
}

#[async_trait]
impl AuthProvider for PgAuth {
    async fn entrar(&self, email: &str, senha: &str) -> Result<AuthUser, AppError> {
        let credencial: Option<(Uuid, String, String)> = sqlx::query_as(
            "SELECT id, email, senha_hash FROM auth_credenciais WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        let (id, email, senha_hash) = credencial.ok_or(AppError::CredenciaisInvalidas)?;

        if !verificar_senha(senha, &senha_hash).await? {
            return Err(AppError::CredenciaisInvalidas);
        }

        let usuario = AuthUser { uid: id, email };
        self.estado_tx.send_replace(Some(usuario.clone()));
        Ok(usuario)
    }

    async fn cadastrar(&self, email: &str, senha: &str) -> Result<AuthUser, AppError> {
        let senha_hash = hash_senha(senha, bcrypt::DEFAULT_COST).await?;

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO auth_credenciais (email, senha_hash) VALUES ($1, $2) RETURNING id",
        )
        .bind(email)
        .bind(&senha_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // Converte violação de chave única num erro mais amigável
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return AppError::EmailJaCadastrado;
                }
            }
            AppError::BancoDeDados(e)
        })?;

        Ok(AuthUser {
            uid: id,
            email: email.to_owned(),
        })
    }

    async fn sair(&self) -> Result<(), AppError> {
        self.estado_tx.send_replace(None);
        Ok(())
    }

    async fn redefinir_senha(&self, email: &str) -> Result<(), AppError> {
        let existe: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM auth_credenciais WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        if existe.is_none() {
            return Err(AppError::NaoEncontrado);
        }

        sqlx::query("INSERT INTO auth_redefinicoes (email) VALUES ($1)")
            .bind(email)
            .execute(&self.pool)
            .await?;

        tracing::info!("Pedido de redefinição de senha registrado para {email}");
        Ok(())
    }

    fn estado(&self) -> watch::Receiver<Option<AuthUser>> {
        self.estado_tx.subscribe()
    }
}

/// Provedor de memória para testes e desenvolvimento local. Mesmo contrato do
/// [`PgAuth`], inclusive hashing bcrypt (com custo mínimo, que basta fora de
/// produção).
pub struct MemAuth {
    contas: Mutex<HashMap<String, (Uuid, String)>>,
    redefinicoes: Mutex<Vec<String>>,
    estado_tx: watch::Sender<Option<AuthUser>>,
}

const CUSTO_BCRYPT_MEM: u32 = 4;

impl MemAuth {
    pub fn new() -> Self {
        let (estado_tx, _) = watch::channel(None);
        Self {
            contas: Mutex::new(HashMap::new()),
            redefinicoes: Mutex::new(Vec::new()),
            estado_tx,
        }
    }

    /// Credencial existe? Usado nos testes do gap de credencial órfã.
    pub fn tem_credencial(&self, email: &str) -> bool {
        self.contas.lock().expect("lock envenenado").contains_key(email)
    }

    pub fn redefinicoes_pedidas(&self) -> Vec<String> {
        self.redefinicoes.lock().expect("lock envenenado").clone()
    }

    /// Publica uma identidade direto no fluxo de estado, como se o provedor
    /// tivesse restaurado uma sessão.
    pub fn publicar_estado(&self, usuario: Option<AuthUser>) {
        self.estado_tx.send_replace(usuario);
    }
}

impl Default for MemAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for MemAuth {
    async fn entrar(&self, email: &str, senha: &str) -> Result<AuthUser, AppError> {
        let guardado = self
            .contas
            .lock()
            .expect("lock envenenado")
            .get(email)
            .cloned();
        let (uid, senha_hash) = guardado.ok_or(AppError::CredenciaisInvalidas)?;

        if !verificar_senha(senha, &senha_hash).await? {
            return Err(AppError::CredenciaisInvalidas);
        }

        let usuario = AuthUser {
            uid,
            email: email.to_owned(),
        };
        self.estado_tx.send_replace(Some(usuario.clone()));
        Ok(usuario)
    }

    async fn cadastrar(&self, email: &str, senha: &str) -> Result<AuthUser, AppError> {
        let senha_hash = hash_senha(senha, CUSTO_BCRYPT_MEM).await?;
        let mut contas = self.contas.lock().expect("lock envenenado");
        if contas.contains_key(email) {
            return Err(AppError::EmailJaCadastrado);
        }
        let uid = Uuid::new_v4();
        contas.insert(email.to_owned(), (uid, senha_hash));
        Ok(AuthUser {
            uid,
            email: email.to_owned(),
        })
    }

    async fn sair(&self) -> Result<(), AppError> {
        self.estado_tx.send_replace(None);
        Ok(())
    }

    async fn redefinir_senha(&self, email: &str) -> Result<(), AppError> {
        if !self.tem_credencial(email) {
            return Err(AppError::NaoEncontrado);
        }
        self.redefinicoes
            .lock()
            .expect("lock envenenado")
            .push(email.to_owned());
        Ok(())
    }

    fn estado(&self) -> watch::Receiver<Option<AuthUser>> {
        self.estado_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entrar_com_senha_errada_falha() {
        let auth = MemAuth::new();
        auth.cadastrar("dono@sucata.com", "segredo1").await.unwrap();

        let erro = auth.entrar("dono@sucata.com", "outra").await.unwrap_err();
        assert!(matches!(erro, AppError::CredenciaisInvalidas));

        // E-mail desconhecido cai no mesmo erro.
        let erro = auth.entrar("ninguem@sucata.com", "x").await.unwrap_err();
        assert!(matches!(erro, AppError::CredenciaisInvalidas));
    }

    #[tokio::test]
    async fn cadastrar_duplicado_falha() {
        let auth = MemAuth::new();
        auth.cadastrar("a@b.com", "123456").await.unwrap();
        let erro = auth.cadastrar("a@b.com", "abcdef").await.unwrap_err();
        assert!(matches!(erro, AppError::EmailJaCadastrado));
    }

    #[tokio::test]
    async fn fluxo_de_estado_publica_entrada_e_saida() {
        let auth = MemAuth::new();
        let mut rx = auth.estado();
        assert!(rx.borrow().is_none());

        let usuario = auth.cadastrar("a@b.com", "123456").await.unwrap();
        // Cadastro não muda a sessão corrente.
        assert!(!rx.has_changed().unwrap());

        let logado = auth.entrar("a@b.com", "123456").await.unwrap();
        assert_eq!(logado, usuario);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().unwrap().uid, usuario.uid);

        auth.sair().await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }

    #[tokio::test]
    async fn redefinir_senha_registra_pedido() {
        let auth = MemAuth::new();
        auth.cadastrar("a@b.com", "123456").await.unwrap();

        auth.redefinir_senha("a@b.com").await.unwrap();
        assert_eq!(auth.redefinicoes_pedidas(), vec!["a@b.com".to_string()]);

        let erro = auth.redefinir_senha("x@y.com").await.unwrap_err();
        assert!(matches!(erro, AppError::NaoEncontrado));
    }
}
