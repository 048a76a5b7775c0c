use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::cliente::{AtualizaCliente, Cliente, Notificacao, TipoUsuario},
};

/// Seam da coleção `users`. Os perfis de clientes e de administradores moram
/// na mesma coleção, discriminados pelo campo `tipo`.
#[async_trait]
pub trait ClienteRepo: Send + Sync {
    /// Lista os perfis com `tipo = cliente`, ordenados por nome.
    async fn listar_clientes(&self) -> Result<Vec<Cliente>, AppError>;

    /// Busca direta por id; retorna perfis inativos também.
    async fn buscar_por_id(&self, id: Uuid) -> Result<Option<Cliente>, AppError>;

    async fn inserir(&self, cliente: &Cliente) -> Result<(), AppError>;

    async fn atualizar(&self, id: Uuid, dados: &AtualizaCliente) -> Result<(), AppError>;

    /// Ativa/desativa o perfil (exclusão lógica dos clientes).
    async fn definir_ativo(&self, id: Uuid, ativo: bool) -> Result<(), AppError>;

    /// Anexa uma entrada ao histórico de notificações do perfil.
    async fn anexar_notificacao(&self, id: Uuid, n: &Notificacao) -> Result<(), AppError>;

    /// Ids dos perfis com `tipo = admin`, para o fan-out de notificações.
    async fn listar_admins(&self) -> Result<Vec<Uuid>, AppError>;
}

// Registro cru do banco; o histórico embutido vem como JSONB.
#[derive(FromRow)]
struct ClienteRow {
    id: Uuid,
    email: String,
    nome: String,
    tipo: TipoUsuario,
    cpf_cnpj: String,
    endereco: String,
    telefone: String,
    ativo: bool,
    notificacoes: Json<Vec<Notificacao>>,
    criado_em: DateTime<Utc>,
    atualizado_em: Option<DateTime<Utc>>,
}

impl From<ClienteRow> for Cliente {
    fn from(row: ClienteRow) -> Self {
        Cliente {
            id: row.id,
            email: row.email,
            nome: row.nome,
            tipo: row.tipo,
            cpf_cnpj: row.cpf_cnpj,
            endereco: row.endereco,
            telefone: row.telefone,
            ativo: row.ativo,
            notificacoes: row.notificacoes.0,
            criado_em: row.criado_em,
            atualizado_em: row.atualizado_em,
        }
    }
}

#[derive(Clone)]
pub struct PgClienteRepo {
    pool: PgPool,
}

impl PgClienteRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClienteRepo for PgClienteRepo {
    async fn listar_clientes(&self) -> Result<Vec<Cliente>, AppError> {
        let rows = sqlx::query_as::<_, ClienteRow>(
            "SELECT * FROM users WHERE tipo = $1 ORDER BY nome ASC",
        )
        .bind(TipoUsuario::Cliente)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Cliente::from).collect())
    }

    async fn buscar_por_id(&self, id: Uuid) -> Result<Option<Cliente>, AppError> {
        let row = sqlx::query_as::<_, ClienteRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Cliente::from))
    }

    async fn inserir(&self, cliente: &Cliente) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, email, nome, tipo, cpf_cnpj, endereco, telefone,
                ativo, notificacoes, criado_em
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(cliente.id)
        .bind(&cliente.email)
        .bind(&cliente.nome)
        .bind(cliente.tipo)
        .bind(&cliente.cpf_cnpj)
        .bind(&cliente.endereco)
        .bind(&cliente.telefone)
        .bind(cliente.ativo)
        .bind(Json(&cliente.notificacoes))
        .bind(cliente.criado_em)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn atualizar(&self, id: Uuid, dados: &AtualizaCliente) -> Result<(), AppError> {
        let resultado = sqlx::query(
            r#"
            UPDATE users SET
                nome     = COALESCE($2, nome),
                cpf_cnpj = COALESCE($3, cpf_cnpj),
                endereco = COALESCE($4, endereco),
                telefone = COALESCE($5, telefone),
                atualizado_em = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&dados.nome)
        .bind(&dados.cpf_cnpj)
        .bind(&dados.endereco)
        .bind(&dados.telefone)
        .execute(&self.pool)
        .await?;

        if resultado.rows_affected() == 0 {
            return Err(AppError::NaoEncontrado);
        }
        Ok(())
    }

    async fn definir_ativo(&self, id: Uuid, ativo: bool) -> Result<(), AppError> {
        let resultado =
            sqlx::query("UPDATE users SET ativo = $2, atualizado_em = now() WHERE id = $1")
                .bind(id)
                .bind(ativo)
                .execute(&self.pool)
                .await?;

        if resultado.rows_affected() == 0 {
            return Err(AppError::NaoEncontrado);
        }
        Ok(())
    }

    async fn anexar_notificacao(&self, id: Uuid, n: &Notificacao) -> Result<(), AppError> {
        let resultado = sqlx::query(
            "UPDATE users SET notificacoes = notificacoes || $2 WHERE id = $1",
        )
        .bind(id)
        .bind(Json(n))
        .execute(&self.pool)
        .await?;

        if resultado.rows_affected() == 0 {
            return Err(AppError::NaoEncontrado);
        }
        Ok(())
    }

    async fn listar_admins(&self) -> Result<Vec<Uuid>, AppError> {
        let ids: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE tipo = $1")
            .bind(TipoUsuario::Admin)
            .fetch_all(&self.pool)
            .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
