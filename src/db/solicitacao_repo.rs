use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgListener;
use sqlx::{FromRow, PgPool, QueryBuilder};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::solicitacao::{FiltroSolicitacoes, Solicitacao, StatusSolicitacao},
};

/// Callback da consulta ao vivo: recebe a lista corrente de pendentes a cada
/// mudança na coleção.
pub type AoMudarPendentes = Arc<dyn Fn(Vec<Solicitacao>) + Send + Sync>;

/// Handle da assinatura da consulta ao vivo. Quem abriu é dono: encerra com
/// [`Assinatura::encerrar`], ou deixa cair — o Drop também interrompe a
/// tarefa. Esquecer o handle vivo mantém a assinatura de pé.
pub struct Assinatura {
    tarefa: JoinHandle<()>,
}

impl Assinatura {
    pub(crate) fn new(tarefa: JoinHandle<()>) -> Self {
        Self { tarefa }
    }

    /// Encerramento explícito da assinatura.
    pub fn encerrar(self) {
        // O Drop aborta a tarefa.
    }
}

impl Drop for Assinatura {
    fn drop(&mut self) {
        self.tarefa.abort();
    }
}

/// Campos gravados numa transição de status. Os carimbos de data são
/// calculados pela store; aqui só persiste.
#[derive(Debug, Clone)]
pub struct MudancaStatus {
    pub status: StatusSolicitacao,
    pub data_agendamento: Option<DateTime<Utc>>,
    pub data_conclusao: Option<DateTime<Utc>>,
    pub coleta_id: Option<Uuid>,
}

/// Seam da coleção `solicitacoes`.
#[async_trait]
pub trait SolicitacaoRepo: Send + Sync {
    /// Lista ordenada por data da solicitação, mais recente primeiro.
    async fn listar(&self, filtro: &FiltroSolicitacoes) -> Result<Vec<Solicitacao>, AppError>;

    async fn buscar_por_id(&self, id: Uuid) -> Result<Option<Solicitacao>, AppError>;

    async fn inserir(&self, solicitacao: &Solicitacao) -> Result<(), AppError>;

    async fn atualizar_status(&self, id: Uuid, mudanca: &MudancaStatus) -> Result<(), AppError>;

    /// Abre a consulta ao vivo das solicitações pendentes. O callback recebe
    /// uma entrega inicial e uma releitura a cada mudança.
    async fn assinar_pendentes(&self, callback: AoMudarPendentes)
        -> Result<Assinatura, AppError>;
}

#[derive(FromRow)]
struct SolicitacaoRow {
    id: Uuid,
    cliente_id: Uuid,
    cliente_nome: String,
    percentual: i32,
    status: StatusSolicitacao,
    data_solicitacao: DateTime<Utc>,
    data_agendamento: Option<DateTime<Utc>>,
    data_conclusao: Option<DateTime<Utc>>,
    coleta_id: Option<Uuid>,
    atualizado_em: Option<DateTime<Utc>>,
}

impl From<SolicitacaoRow> for Solicitacao {
    fn from(row: SolicitacaoRow) -> Self {
        Solicitacao {
            id: row.id,
            cliente_id: row.cliente_id,
            cliente_nome: row.cliente_nome,
            percentual: row.percentual,
            status: row.status,
            data_solicitacao: row.data_solicitacao,
            data_agendamento: row.data_agendamento,
            data_conclusao: row.data_conclusao,
            coleta_id: row.coleta_id,
            atualizado_em: row.atualizado_em,
        }
    }
}

#[derive(Clone)]
pub struct PgSolicitacaoRepo {
    pool: PgPool,
}

impl PgSolicitacaoRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn listar_pendentes(pool: &PgPool) -> Result<Vec<Solicitacao>, AppError> {
    let rows = sqlx::query_as::<_, SolicitacaoRow>(
        "SELECT * FROM solicitacoes WHERE status = $1 ORDER BY data_solicitacao DESC",
    )
    .bind(StatusSolicitacao::Pendente)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Solicitacao::from).collect())
}

#[async_trait]
impl SolicitacaoRepo for PgSolicitacaoRepo {
    async fn listar(&self, filtro: &FiltroSolicitacoes) -> Result<Vec<Solicitacao>, AppError> {
        let mut qb = QueryBuilder::new("SELECT * FROM solicitacoes WHERE TRUE");

        if let Some(status) = filtro.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(cliente_id) = filtro.cliente_id {
            qb.push(" AND cliente_id = ").push_bind(cliente_id);
        }
        if let Some(periodo) = &filtro.periodo {
            qb.push(" AND data_solicitacao >= ").push_bind(periodo.inicio);
            qb.push(" AND data_solicitacao <= ").push_bind(periodo.fim);
        }
        qb.push(" ORDER BY data_solicitacao DESC");
        if let Some(limite) = filtro.limite {
            qb.push(" LIMIT ").push_bind(limite);
        }

        let rows: Vec<SolicitacaoRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Solicitacao::from).collect())
    }

    async fn buscar_por_id(&self, id: Uuid) -> Result<Option<Solicitacao>, AppError> {
        let row = sqlx::query_as::<_, SolicitacaoRow>("SELECT * FROM solicitacoes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Solicitacao::from))
    }

    async fn inserir(&self, solicitacao: &Solicitacao) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO solicitacoes (
                id, cliente_id, cliente_nome, percentual, status, data_solicitacao
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(solicitacao.id)
        .bind(solicitacao.cliente_id)
        .bind(&solicitacao.cliente_nome)
        .bind(solicitacao.percentual)
        .bind(solicitacao.status)
        .bind(solicitacao.data_solicitacao)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn atualizar_status(&self, id: Uuid, mudanca: &MudancaStatus) -> Result<(), AppError> {
        let resultado = sqlx::query(
            r#"
            UPDATE solicitacoes SET
                status           = $2,
                data_agendamento = COALESCE($3, data_agendamento),
                data_conclusao   = COALESCE($4, data_conclusao),
                coleta_id        = COALESCE($5, coleta_id),
                atualizado_em    = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(mudanca.status)
        .bind(mudanca.data_agendamento)
        .bind(mudanca.data_conclusao)
        .bind(mudanca.coleta_id)
        .execute(&self.pool)
        .await?;

        if resultado.rows_affected() == 0 {
            return Err(AppError::NaoEncontrado);
        }
        Ok(())
    }

    async fn assinar_pendentes(
        &self,
        callback: AoMudarPendentes,
    ) -> Result<Assinatura, AppError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen("solicitacoes_pendentes").await?;

        let pool = self.pool.clone();
        let tarefa = tokio::spawn(async move {
            loop {
                match listar_pendentes(&pool).await {
                    Ok(lista) => callback(lista),
                    Err(e) => {
                        tracing::error!("Erro ao reler solicitações pendentes: {e}");
                    }
                }
                if let Err(e) = listener.recv().await {
                    tracing::error!("Assinatura de solicitações interrompida: {e}");
                    break;
                }
            }
        });

        Ok(Assinatura::new(tarefa))
    }
}
