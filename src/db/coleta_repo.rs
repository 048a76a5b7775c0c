use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, QueryBuilder};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::coleta::{Coleta, FiltroColetas, LinhaMaterial, Recipiente, StatusPagamento},
};

/// Seam da coleção `coletas`.
#[async_trait]
pub trait ColetaRepo: Send + Sync {
    /// Lista ordenada por data da coleta, mais recente primeiro. Os filtros
    /// compõem em conjunção.
    async fn listar(&self, filtro: &FiltroColetas) -> Result<Vec<Coleta>, AppError>;

    async fn buscar_por_id(&self, id: Uuid) -> Result<Option<Coleta>, AppError>;

    async fn inserir(&self, coleta: &Coleta) -> Result<(), AppError>;

    async fn atualizar_pagamento(
        &self,
        id: Uuid,
        status: StatusPagamento,
        data_pagamento: Option<DateTime<Utc>>,
    ) -> Result<(), AppError>;
}

#[derive(FromRow)]
struct ColetaRow {
    id: Uuid,
    cliente_id: Uuid,
    coletor_id: Uuid,
    data_coleta: DateTime<Utc>,
    recipiente: Json<Recipiente>,
    materiais: Json<Vec<LinhaMaterial>>,
    valor_total: Decimal,
    status_pagamento: StatusPagamento,
    data_pagamento: Option<DateTime<Utc>>,
    solicitacao_id: Option<Uuid>,
    criado_em: DateTime<Utc>,
    atualizado_em: Option<DateTime<Utc>>,
}

impl From<ColetaRow> for Coleta {
    fn from(row: ColetaRow) -> Self {
        Coleta {
            id: row.id,
            cliente_id: row.cliente_id,
            coletor_id: row.coletor_id,
            data_coleta: row.data_coleta,
            recipiente: row.recipiente.0,
            materiais: row.materiais.0,
            valor_total: row.valor_total,
            status_pagamento: row.status_pagamento,
            data_pagamento: row.data_pagamento,
            solicitacao_id: row.solicitacao_id,
            criado_em: row.criado_em,
            atualizado_em: row.atualizado_em,
        }
    }
}

#[derive(Clone)]
pub struct PgColetaRepo {
    pool: PgPool,
}

impl PgColetaRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ColetaRepo for PgColetaRepo {
    async fn listar(&self, filtro: &FiltroColetas) -> Result<Vec<Coleta>, AppError> {
        let mut qb = QueryBuilder::new("SELECT * FROM coletas WHERE TRUE");

        if let Some(cliente_id) = filtro.cliente_id {
            qb.push(" AND cliente_id = ").push_bind(cliente_id);
        }
        if let Some(periodo) = &filtro.periodo {
            qb.push(" AND data_coleta >= ").push_bind(periodo.inicio);
            qb.push(" AND data_coleta <= ").push_bind(periodo.fim);
        }
        qb.push(" ORDER BY data_coleta DESC");
        if let Some(limite) = filtro.limite {
            qb.push(" LIMIT ").push_bind(limite);
        }

        let rows: Vec<ColetaRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Coleta::from).collect())
    }

    async fn buscar_por_id(&self, id: Uuid) -> Result<Option<Coleta>, AppError> {
        let row = sqlx::query_as::<_, ColetaRow>("SELECT * FROM coletas WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Coleta::from))
    }

    async fn inserir(&self, coleta: &Coleta) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO coletas (
                id, cliente_id, coletor_id, data_coleta, recipiente, materiais,
                valor_total, status_pagamento, data_pagamento, solicitacao_id, criado_em
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(coleta.id)
        .bind(coleta.cliente_id)
        .bind(coleta.coletor_id)
        .bind(coleta.data_coleta)
        .bind(Json(&coleta.recipiente))
        .bind(Json(&coleta.materiais))
        .bind(coleta.valor_total)
        .bind(coleta.status_pagamento)
        .bind(coleta.data_pagamento)
        .bind(coleta.solicitacao_id)
        .bind(coleta.criado_em)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn atualizar_pagamento(
        &self,
        id: Uuid,
        status: StatusPagamento,
        data_pagamento: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        let resultado = sqlx::query(
            r#"
            UPDATE coletas SET
                status_pagamento = $2,
                data_pagamento   = $3,
                atualizado_em    = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(data_pagamento)
        .execute(&self.pool)
        .await?;

        if resultado.rows_affected() == 0 {
            return Err(AppError::NaoEncontrado);
        }
        Ok(())
    }
}
