use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    db::material_repo::MaterialRepo,
    models::material::{AtualizaMaterial, Material, NovoMaterial, MATERIAIS_PADRAO},
    stores::GuiaCarregando,
};

/// Store do catálogo de materiais.
pub struct MateriaisStore {
    repo: Arc<dyn MaterialRepo>,
    lista: RwLock<Vec<Material>>,
    carregando: AtomicBool,
}

impl MateriaisStore {
    pub fn new(repo: Arc<dyn MaterialRepo>) -> Self {
        Self {
            repo,
            lista: RwLock::new(Vec::new()),
            carregando: AtomicBool::new(false),
        }
    }

    pub fn materiais(&self) -> Vec<Material> {
        self.lista.read().expect("lock envenenado").clone()
    }

    pub fn carregando(&self) -> bool {
        self.carregando.load(Ordering::SeqCst)
    }

    /// Relê os materiais vivos (excluídos logicamente ficam de fora).
    pub async fn buscar_materiais(&self) -> Result<(), AppError> {
        let _guia = GuiaCarregando::ligar(&self.carregando);
        let lista = self.repo.listar_ativos().await.map_err(|e| {
            tracing::error!("Erro ao buscar materiais: {e}");
            e
        })?;
        *self.lista.write().expect("lock envenenado") = lista;
        Ok(())
    }

    /// Busca direta; devolve o material mesmo depois de excluído.
    pub async fn obter_material(&self, id: Uuid) -> Result<Option<Material>, AppError> {
        self.repo.buscar_por_id(id).await.map_err(|e| {
            tracing::error!("Erro ao buscar material: {e}");
            e
        })
    }

    pub async fn criar_material(&self, dados: NovoMaterial) -> Result<Uuid, AppError> {
        let _guia = GuiaCarregando::ligar(&self.carregando);
        dados.validate()?;

        let material = Material {
            id: Uuid::new_v4(),
            nome: dados.nome,
            preco_padrao: dados.preco_padrao.unwrap_or(Decimal::ZERO),
            precos_personalizados: HashMap::new(),
            ativo: true,
            criado_em: chrono::Utc::now(),
            atualizado_em: None,
            excluido_em: None,
        };
        self.repo.inserir(&material).await.map_err(|e| {
            tracing::error!("Erro ao criar material: {e}");
            e
        })?;

        self.buscar_materiais().await?;
        Ok(material.id)
    }

    pub async fn atualizar_material(
        &self,
        id: Uuid,
        dados: AtualizaMaterial,
    ) -> Result<(), AppError> {
        let _guia = GuiaCarregando::ligar(&self.carregando);
        self.repo.atualizar(id, &dados).await.map_err(|e| {
            tracing::error!("Erro ao atualizar material: {e}");
            e
        })?;
        self.buscar_materiais().await
    }

    /// Preço por cliente: mexe numa chave só do mapa de preços do material.
    pub async fn definir_preco_personalizado(
        &self,
        material_id: Uuid,
        cliente_id: Uuid,
        preco: Decimal,
    ) -> Result<(), AppError> {
        self.repo
            .definir_preco_cliente(material_id, cliente_id, preco)
            .await
            .map_err(|e| {
                tracing::error!("Erro ao definir preço personalizado: {e}");
                e
            })?;
        self.buscar_materiais().await
    }

    /// Exclusão lógica.
    pub async fn excluir_material(&self, id: Uuid) -> Result<(), AppError> {
        let _guia = GuiaCarregando::ligar(&self.carregando);
        self.repo.excluir(id).await.map_err(|e| {
            tracing::error!("Erro ao deletar material: {e}");
            e
        })?;
        self.buscar_materiais().await
    }

    /// Semente do catálogo: só quando a coleção está vazia (contando os
    /// excluídos), cria uma entrada por nome da lista padrão, com preço zero
    /// e sem preços personalizados. Coleção não-vazia nunca é semeada de novo.
    pub async fn inicializar(&self) -> Result<(), AppError> {
        if self.repo.contar().await? > 0 {
            return self.buscar_materiais().await;
        }

        tracing::info!("Catálogo vazio; semeando os materiais padrão");
        for nome in MATERIAIS_PADRAO {
            let material = Material {
                id: Uuid::new_v4(),
                nome: nome.to_owned(),
                preco_padrao: Decimal::ZERO,
                precos_personalizados: HashMap::new(),
                ativo: true,
                criado_em: chrono::Utc::now(),
                atualizado_em: None,
                excluido_em: None,
            };
            self.repo.inserir(&material).await?;
        }
        self.buscar_materiais().await
    }
}
