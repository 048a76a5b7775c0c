use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::material::{AtualizaMaterial, Material},
};

/// Seam da coleção `materiais`.
#[async_trait]
pub trait MaterialRepo: Send + Sync {
    /// Lista apenas os registros vivos (`ativo = true`), ordenados por nome.
    async fn listar_ativos(&self) -> Result<Vec<Material>, AppError>;

    /// Busca direta por id; um material excluído logicamente ainda é retornado.
    async fn buscar_por_id(&self, id: Uuid) -> Result<Option<Material>, AppError>;

    /// Conta todos os registros, inclusive os excluídos. Usado pela semente do
    /// catálogo: uma coleção não-vazia nunca é semeada de novo.
    async fn contar(&self) -> Result<i64, AppError>;

    async fn inserir(&self, material: &Material) -> Result<(), AppError>;

    async fn atualizar(&self, id: Uuid, dados: &AtualizaMaterial) -> Result<(), AppError>;

    /// Grava o preço de um único cliente no mapa de preços personalizados,
    /// sem tocar nas demais chaves.
    async fn definir_preco_cliente(
        &self,
        material_id: Uuid,
        cliente_id: Uuid,
        preco: Decimal,
    ) -> Result<(), AppError>;

    /// Exclusão lógica: `ativo = false` + carimbo de `excluido_em`.
    async fn excluir(&self, id: Uuid) -> Result<(), AppError>;
}

#[derive(FromRow)]
struct MaterialRow {
    id: Uuid,
    nome: String,
    preco_padrao: Decimal,
    precos_personalizados: Json<HashMap<Uuid, Decimal>>,
    ativo: bool,
    criado_em: DateTime<Utc>,
    atualizado_em: Option<DateTime<Utc>>,
    excluido_em: Option<DateTime<Utc>>,
}

impl From<MaterialRow> for Material {
    fn from(row: MaterialRow) -> Self {
        Material {
            id: row.id,
            nome: row.nome,
            preco_padrao: row.preco_padrao,
            precos_personalizados: row.precos_personalizados.0,
            ativo: row.ativo,
            criado_em: row.criado_em,
            atualizado_em: row.atualizado_em,
            excluido_em: row.excluido_em,
        }
    }
}

#[derive(Clone)]
pub struct PgMaterialRepo {
    pool: PgPool,
}

impl PgMaterialRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MaterialRepo for PgMaterialRepo {
    async fn listar_ativos(&self) -> Result<Vec<Material>, AppError> {
        let rows = sqlx::query_as::<_, MaterialRow>(
            "SELECT * FROM materiais WHERE ativo = TRUE ORDER BY nome ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Material::from).collect())
    }

    async fn buscar_por_id(&self, id: Uuid) -> Result<Option<Material>, AppError> {
        let row = sqlx::query_as::<_, MaterialRow>("SELECT * FROM materiais WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Material::from))
    }

    async fn contar(&self) -> Result<i64, AppError> {
        let (total,): (i64,) = sqlx::query_as("SELECT count(*) FROM materiais")
            .fetch_one(&self.pool)
            .await?;

        Ok(total)
    }

    async fn inserir(&self, material: &Material) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO materiais (
                id, nome, preco_padrao, precos_personalizados, ativo, criado_em
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(material.id)
        .bind(&material.nome)
        .bind(material.preco_padrao)
        .bind(Json(&material.precos_personalizados))
        .bind(material.ativo)
        .bind(material.criado_em)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn atualizar(&self, id: Uuid, dados: &AtualizaMaterial) -> Result<(), AppError> {
        let resultado = sqlx::query(
            r#"
            UPDATE materiais SET
                nome         = COALESCE($2, nome),
                preco_padrao = COALESCE($3, preco_padrao),
                atualizado_em = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&dados.nome)
        .bind(dados.preco_padrao)
        .execute(&self.pool)
        .await?;

        if resultado.rows_affected() == 0 {
            return Err(AppError::NaoEncontrado);
        }
        Ok(())
    }

    async fn definir_preco_cliente(
        &self,
        material_id: Uuid,
        cliente_id: Uuid,
        preco: Decimal,
    ) -> Result<(), AppError> {
        // jsonb_set troca uma chave só; o resto do mapa fica intacto.
        let resultado = sqlx::query(
            r#"
            UPDATE materiais SET
                precos_personalizados = jsonb_set(precos_personalizados, ARRAY[$2], $3, TRUE),
                atualizado_em = now()
            WHERE id = $1
            "#,
        )
        .bind(material_id)
        .bind(cliente_id.to_string())
        .bind(Json(preco))
        .execute(&self.pool)
        .await?;

        if resultado.rows_affected() == 0 {
            return Err(AppError::NaoEncontrado);
        }
        Ok(())
    }

    async fn excluir(&self, id: Uuid) -> Result<(), AppError> {
        let resultado = sqlx::query(
            "UPDATE materiais SET ativo = FALSE, excluido_em = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if resultado.rows_affected() == 0 {
            return Err(AppError::NaoEncontrado);
        }
        Ok(())
    }
}
